pub mod change;
pub mod config;
pub mod gate;
pub mod init;
pub mod lane;
pub mod run;
pub mod status;

use anyhow::Context;
use openspec_core::config::Config;
use openspec_core::lane::LaneRegistry;
use openspec_core::WorkflowError;
use std::path::Path;

/// Lane registry from config, or the built-in lanes before `init`.
pub(crate) fn load_lanes(root: &Path) -> anyhow::Result<LaneRegistry> {
    match Config::load(root) {
        Ok(config) => config.lane_registry().context("invalid lane configuration"),
        Err(WorkflowError::NotInitialized) => Ok(LaneRegistry::builtin()),
        Err(e) => Err(e).context("failed to load config"),
    }
}
