use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tool::ToolKind;

pub const APP_DIR_NAME: &str = ".vault-assist";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("HOME is not set")]
    NoHome,

    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tools: ToolSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub claude_path: String,
    pub gemini_path: String,
    pub default_tool: ToolKind,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            claude_path: ToolKind::Claude.default_program().to_string(),
            gemini_path: ToolKind::Gemini.default_program().to_string(),
            default_tool: ToolKind::default(),
        }
    }
}

impl Settings {
    /// Loads `path`, or `~/.vault-assist/config.toml` when none is given, writing defaults first
    /// if the file does not exist yet.
    pub fn load_or_create(path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        if !path.exists() {
            let defaults = Self::default();
            defaults.save(&path)?;
            tracing::info!(path = %path.display(), "wrote default settings");
            return Ok(defaults);
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let text = toml::to_string(self)?;
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, text).map_err(io_err)
    }

    /// The configured executable for `tool` with a leading `~/` expanded. A blank setting falls
    /// back to the bare program name, which is looked up on `PATH`.
    pub fn program_for(&self, tool: ToolKind) -> String {
        let configured = match tool {
            ToolKind::Claude => self.tools.claude_path.trim(),
            ToolKind::Gemini => self.tools.gemini_path.trim(),
        };
        if configured.is_empty() {
            return tool.default_program().to_string();
        }
        expand_home(configured)
            .map_or_else(|_| configured.to_string(), |path| path.display().to_string())
    }

    #[cfg(test)]
    pub fn set_program(&mut self, tool: ToolKind, program: impl Into<String>) {
        match tool {
            ToolKind::Claude => self.tools.claude_path = program.into(),
            ToolKind::Gemini => self.tools.gemini_path = program.into(),
        }
    }
}

pub fn app_dir() -> Result<PathBuf, SettingsError> {
    Ok(home_dir()?.join(APP_DIR_NAME))
}

pub fn default_config_path() -> Result<PathBuf, SettingsError> {
    Ok(app_dir()?.join(CONFIG_FILE_NAME))
}

pub fn expand_home(raw_path: &str) -> Result<PathBuf, SettingsError> {
    if raw_path == "~" {
        return home_dir();
    }
    if let Some(rest) = raw_path.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(PathBuf::from(raw_path))
}

fn home_dir() -> Result<PathBuf, SettingsError> {
    env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .ok_or(SettingsError::NoHome)
}
