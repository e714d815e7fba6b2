use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CLAUDE_FLAGS: [&str; 3] = [
    "-p",
    "--allowedTools",
    "Edit,Write,Bash,Grep,MultiEdit,WebFetch,TodoRead,TodoWrite,WebSearch",
];
const GEMINI_FLAGS: [&str; 1] = ["--yolo"];

/// Printed by the Gemini CLI on its first line when it reuses stored credentials.
pub const GEMINI_CREDENTIALS_BANNER: &str = "Loaded cached credentials.";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Claude,
    Gemini,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::Claude, ToolKind::Gemini];

    pub fn default_program(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Claude => "Claude Code",
            Self::Gemini => "Gemini CLI",
        }
    }

    /// Flags passed on every invocation. The prompt itself always travels over stdin.
    pub fn capability_flags(self) -> &'static [&'static str] {
        match self {
            Self::Claude => &CLAUDE_FLAGS,
            Self::Gemini => &GEMINI_FLAGS,
        }
    }

    pub fn timeout(self) -> Duration {
        match self {
            Self::Claude => Duration::from_secs(180),
            Self::Gemini => Duration::from_secs(60),
        }
    }

    /// A full output line this tool prints that never belongs in the result view.
    pub fn result_banner(self) -> Option<&'static str> {
        match self {
            Self::Claude => None,
            Self::Gemini => Some(GEMINI_CREDENTIALS_BANNER),
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Claude => Self::Gemini,
            Self::Gemini => Self::Claude,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claude => write!(f, "claude"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown tool `{other}` (expected claude or gemini)")),
        }
    }
}
