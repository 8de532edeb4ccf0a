use crate::error::{Result, WorkflowError};
use crate::lane::{LaneDefinition, LaneRegistry};
use crate::paths;
use crate::quality::QualityTool;
use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ToolCommand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolCommand {
    pub command: String,
    #[serde(default = "default_tool_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_tool_timeout() -> u64 {
    300
}

fn default_enabled() -> bool {
    true
}

impl ToolCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout_seconds: default_tool_timeout(),
            enabled: true,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

// ---------------------------------------------------------------------------
// QualityConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_tools")]
    pub tools: BTreeMap<QualityTool, ToolCommand>,
}

fn default_tools() -> BTreeMap<QualityTool, ToolCommand> {
    QualityTool::all()
        .iter()
        .map(|&t| (t, ToolCommand::new(t.default_command())))
        .collect()
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            tools: default_tools(),
        }
    }
}

impl QualityConfig {
    /// Configured command for `tool`, falling back to the built-in default.
    pub fn command_for(&self, tool: QualityTool) -> ToolCommand {
        self.tools
            .get(&tool)
            .cloned()
            .unwrap_or_else(|| ToolCommand::new(tool.default_command()))
    }
}

// ---------------------------------------------------------------------------
// ScriptConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptConfig {
    pub command: String,
    #[serde(default = "default_script_timeout")]
    pub timeout_seconds: u64,
}

fn default_script_timeout() -> u64 {
    600
}

// ---------------------------------------------------------------------------
// GuardConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_code_extensions")]
    pub code_extensions: Vec<String>,
}

fn default_code_extensions() -> Vec<String> {
    [
        "py", "pyi", "rs", "js", "jsx", "mjs", "cjs", "ts", "tsx", "go", "java", "kt", "kts",
        "scala", "c", "h", "cc", "cpp", "hpp", "cs", "rb", "php", "swift", "m", "sh", "bash",
        "ps1", "sql", "lua", "dart", "ex", "exs", "vue", "svelte",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            code_extensions: default_code_extensions(),
        }
    }
}

impl GuardConfig {
    /// True when `file` ends in one of the configured code extensions
    /// (case-insensitive, leading dots in the config are ignored).
    pub fn is_code_file(&self, file: &str) -> bool {
        let Some(ext) = Path::new(file).extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.code_extensions
            .iter()
            .any(|c| c.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// The entries of `files` that are code files, in their original order.
    pub fn code_files(&self, files: &[String]) -> Vec<String> {
        files
            .iter()
            .filter(|f| self.is_code_file(f))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lanes: Vec<LaneDefinition>,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, ScriptConfig>,
    #[serde(default)]
    pub guard: GuardConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            lanes: Vec::new(),
            quality: QualityConfig::default(),
            scripts: BTreeMap::new(),
            guard: GuardConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(WorkflowError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&data)
            .map_err(|e| WorkflowError::Configuration(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Build the lane registry; invalid custom lanes are a hard error.
    pub fn lane_registry(&self) -> Result<LaneRegistry> {
        LaneRegistry::with_custom(&self.lanes)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Err(e) = self.lane_registry() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: e.to_string(),
            });
        }

        for (key, script) in &self.scripts {
            match Stage::from_str(key) {
                Ok(stage) if key == stage.as_str() => {}
                _ => warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("unknown stage '{key}' in scripts"),
                }),
            }
            if script.command.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("script for stage '{key}' has an empty command"),
                });
            }
            if script.timeout_seconds == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("script for stage '{key}' has timeout_seconds=0"),
                });
            }
        }

        for (tool, cmd) in &self.quality.tools {
            if cmd.enabled && cmd.command.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("quality tool '{tool}' has an empty command"),
                });
            }
            if cmd.timeout_seconds == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("quality tool '{tool}' has timeout_seconds=0"),
                });
            }
        }

        if self.guard.code_extensions.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "guard.code_extensions is empty; the docs lane guard is disabled"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
