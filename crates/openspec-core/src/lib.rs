pub mod change;
pub mod config;
pub mod document;
pub mod error;
pub mod io;
pub mod lane;
pub mod orchestrator;
pub mod paths;
pub mod process;
pub mod progress;
pub mod quality;
pub mod run;
pub mod stage;
pub mod todo;
pub mod types;

pub use error::{Result, WorkflowError};

#[cfg(test)]
pub(crate) mod test_support;
