//! Compilation configuration
//!
//! Everything a pipeline stage may consult lives in one immutable
//! [`CompilerContext`]. RAM and ROM runs use separate contexts.

use crate::error::BuiltinsResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which initializer variant a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Ram,
    Rom,
}

impl BuildMode {
    pub fn name(self) -> &'static str {
        match self {
            BuildMode::Ram => "RAM",
            BuildMode::Rom => "ROM",
        }
    }
}

/// Version and source control information stamped into the outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    /// Target version as `major * 10000 + minor * 100 + patch`
    pub version: u32,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
    pub git_describe: Option<String>,
}

impl BuildInfo {
    /// `major.minor.patch`
    pub fn version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            self.version / 10000,
            (self.version / 100) % 100,
            self.version % 100
        )
    }
}

/// User facing compile options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub ram_support: bool,
    pub rom_support: bool,
    /// Convert eligible ROM function properties into lightfuncs
    pub rom_auto_lightfunc: bool,
    /// Prefix of every generated C identifier and define
    pub define_prefix: String,
    pub build_info: BuildInfo,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            ram_support: true,
            rom_support: false,
            rom_auto_lightfunc: false,
            define_prefix: "DUK".to_string(),
            build_info: BuildInfo::default(),
        }
    }
}

/// Active configuration options, by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveConfig(serde_json::Map<String, serde_json::Value>);

impl ActiveConfig {
    pub fn from_json_str(text: &str) -> BuiltinsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> BuiltinsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Set a boolean option.
    pub fn set(&mut self, name: &str, enabled: bool) {
        self.0
            .insert(name.to_string(), serde_json::Value::Bool(enabled));
    }

    /// True only when the option is known and false; unknown options and
    /// non-boolean values never disable anything.
    pub fn is_known_false(&self, name: &str) -> bool {
        matches!(self.0.get(name), Some(serde_json::Value::Bool(false)))
    }
}

/// Defines referenced by runtime sources, which decide what gets a stridx.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedDefines {
    #[serde(default)]
    pub used_stridx_defines: Vec<String>,
}

impl UsedDefines {
    pub fn from_json_str(text: &str) -> BuiltinsResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> BuiltinsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Per-run context passed explicitly to every stage.
#[derive(Debug, Clone)]
pub struct CompilerContext {
    pub mode: BuildMode,
    pub rom_auto_lightfunc: bool,
    pub define_prefix: String,
    pub version: u32,
    pub active: ActiveConfig,
    pub used_defines: UsedDefines,
}

impl CompilerContext {
    pub fn new(
        mode: BuildMode,
        options: &CompileOptions,
        active: &ActiveConfig,
        used_defines: &UsedDefines,
    ) -> Self {
        Self {
            mode,
            rom_auto_lightfunc: options.rom_auto_lightfunc,
            define_prefix: options.define_prefix.clone(),
            version: options.build_info.version,
            active: active.clone(),
            used_defines: used_defines.clone(),
        }
    }

    pub fn is_rom(&self) -> bool {
        self.mode == BuildMode::Rom
    }

    /// `<prefix>_<name>`
    pub fn define(&self, name: &str) -> String {
        format!("{}_{}", self.define_prefix, name)
    }
}
