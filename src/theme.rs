use std::fs;
use std::path::Path;

use ratatui::style::Color;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Theme {
    pub header_bg: Color,
    pub sidebar_bg: Color,
    pub content_bg: Color,
    pub input_bg: Color,
    pub status_bg: Color,
    pub text_fg: Color,
    pub muted_fg: Color,
    pub accent_fg: Color,
    pub red_card_fg: Color,
    pub black_card_fg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            header_bg: Color::Rgb(28, 36, 52),
            sidebar_bg: Color::Rgb(40, 40, 44),
            content_bg: Color::Rgb(50, 50, 54),
            input_bg: Color::Rgb(62, 62, 66),
            status_bg: Color::Rgb(32, 32, 36),
            text_fg: Color::Rgb(225, 225, 225),
            muted_fg: Color::Rgb(160, 160, 165),
            accent_fg: Color::Rgb(255, 184, 76),
            red_card_fg: Color::Rgb(235, 90, 90),
            black_card_fg: Color::Rgb(235, 235, 235),
        }
    }
}

impl Theme {
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path_ref = path.as_ref();
        match fs::read_to_string(path_ref) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(theme) => theme,
                Err(err) => {
                    warn!(path = %path_ref.display(), "invalid theme file, using defaults: {err}");
                    Self::default()
                }
            },
            Err(err) => {
                warn!(path = %path_ref.display(), "theme file unreadable, using defaults: {err}");
                Self::default()
            }
        }
    }

    /// Colours missing from `[colors]` keep their default value.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        let cfg: ThemeToml = toml::from_str(s)?;
        let colors = cfg.colors;
        let base = Self::default();
        let pick = |value: Option<RgbToml>, fallback: Color| {
            value.map(RgbToml::to_color).unwrap_or(fallback)
        };
        Ok(Self {
            header_bg: pick(colors.header_bg, base.header_bg),
            sidebar_bg: pick(colors.sidebar_bg, base.sidebar_bg),
            content_bg: pick(colors.content_bg, base.content_bg),
            input_bg: pick(colors.input_bg, base.input_bg),
            status_bg: pick(colors.status_bg, base.status_bg),
            text_fg: pick(colors.text_fg, base.text_fg),
            muted_fg: pick(colors.muted_fg, base.muted_fg),
            accent_fg: pick(colors.accent_fg, base.accent_fg),
            red_card_fg: pick(colors.red_card_fg, base.red_card_fg),
            black_card_fg: pick(colors.black_card_fg, base.black_card_fg),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ThemeToml {
    colors: ThemeColorsToml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThemeColorsToml {
    header_bg: Option<RgbToml>,
    sidebar_bg: Option<RgbToml>,
    content_bg: Option<RgbToml>,
    input_bg: Option<RgbToml>,
    status_bg: Option<RgbToml>,
    text_fg: Option<RgbToml>,
    muted_fg: Option<RgbToml>,
    accent_fg: Option<RgbToml>,
    red_card_fg: Option<RgbToml>,
    black_card_fg: Option<RgbToml>,
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
