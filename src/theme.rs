use std::fs;
use std::path::Path;

use ratatui::style::Color;
use serde::Deserialize;

pub const THEME_FILE_NAME: &str = "theme.toml";

#[derive(Debug, Clone)]
pub struct Theme {
    pub prompt_bg: Color,
    pub result_bg: Color,
    pub log_bg: Color,
    pub context_bg: Color,
    pub status_bg: Color,
    pub text_fg: Color,
    pub muted_fg: Color,
    pub active_fg: Color,
    pub error_fg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            prompt_bg: Color::Rgb(62, 62, 62),
            result_bg: Color::Rgb(48, 48, 48),
            log_bg: Color::Rgb(40, 40, 40),
            context_bg: Color::Rgb(44, 44, 44),
            status_bg: Color::Rgb(36, 36, 36),
            text_fg: Color::Rgb(225, 225, 225),
            muted_fg: Color::Rgb(170, 170, 170),
            active_fg: Color::Rgb(255, 255, 255),
            error_fg: Color::Rgb(235, 110, 100),
        }
    }
}

impl Theme {
    /// Reads `path`, falling back to defaults when it is missing or malformed. A missing file is
    /// the normal case and stays quiet.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path_ref = path.as_ref();
        match fs::read_to_string(path_ref) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(theme) => theme,
                Err(err) => {
                    eprintln!(
                        "Failed to parse theme file '{}': {err}. Using defaults.",
                        path_ref.display()
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                eprintln!(
                    "Failed to read theme file '{}': {err}. Using defaults.",
                    path_ref.display()
                );
                Self::default()
            }
        }
    }

    /// Colors absent from the file keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        let cfg: ThemeToml = toml::from_str(s)?;
        let colors = cfg.colors;
        let base = Self::default();
        let pick = |color: Option<RgbToml>, fallback: Color| color.map_or(fallback, RgbToml::to_color);
        Ok(Self {
            prompt_bg: pick(colors.prompt_bg, base.prompt_bg),
            result_bg: pick(colors.result_bg, base.result_bg),
            log_bg: pick(colors.log_bg, base.log_bg),
            context_bg: pick(colors.context_bg, base.context_bg),
            status_bg: pick(colors.status_bg, base.status_bg),
            text_fg: pick(colors.text_fg, base.text_fg),
            muted_fg: pick(colors.muted_fg, base.muted_fg),
            active_fg: pick(colors.active_fg, base.active_fg),
            error_fg: pick(colors.error_fg, base.error_fg),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ThemeToml {
    #[serde(default)]
    colors: ThemeColorsToml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThemeColorsToml {
    prompt_bg: Option<RgbToml>,
    result_bg: Option<RgbToml>,
    log_bg: Option<RgbToml>,
    context_bg: Option<RgbToml>,
    status_bg: Option<RgbToml>,
    text_fg: Option<RgbToml>,
    muted_fg: Option<RgbToml>,
    active_fg: Option<RgbToml>,
    error_fg: Option<RgbToml>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RgbToml {
    r: u8,
    g: u8,
    b: u8,
}

impl RgbToml {
    fn to_color(self) -> Color {
        Color::Rgb(self.r, self.g, self.b)
    }
}
