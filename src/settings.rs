use log::{LevelFilter, debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::viewer::{DEFAULT_RENDER_SCALE, HighlightStyle, RenderParams};

pub const CURRENT_VERSION: u32 = 2;

const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pagelight";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot access settings file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Highlight styles, one per kind of overlay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighlightStyles {
    #[serde(default = "default_selection")]
    pub selection: HighlightStyle,
    #[serde(default = "default_text")]
    pub text: HighlightStyle,
    #[serde(default = "default_image")]
    pub image: HighlightStyle,
    #[serde(default = "default_image_focus")]
    pub image_focus: HighlightStyle,
}

impl Default for HighlightStyles {
    fn default() -> Self {
        Self {
            selection: HighlightStyle::SELECTION,
            text: HighlightStyle::TEXT,
            image: HighlightStyle::IMAGE,
            image_focus: HighlightStyle::IMAGE_FOCUS,
        }
    }
}

fn default_selection() -> HighlightStyle {
    HighlightStyle::SELECTION
}

fn default_text() -> HighlightStyle {
    HighlightStyle::TEXT
}

fn default_image() -> HighlightStyle {
    HighlightStyle::IMAGE
}

fn default_image_focus() -> HighlightStyle {
    HighlightStyle::IMAGE_FOCUS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Points to pixels factor (v1 called it `scale`)
    #[serde(default = "default_render_scale", alias = "scale")]
    pub render_scale: f64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub styles: HighlightStyles,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_render_scale() -> f64 {
    DEFAULT_RENDER_SCALE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            render_scale: default_render_scale(),
            log_level: default_log_level(),
            styles: HighlightStyles::default(),
        }
    }
}

impl Settings {
    /// Render parameters, falling back to the default scale when the
    /// configured one is unusable
    #[must_use]
    pub fn render_params(&self) -> RenderParams {
        if self.render_scale.is_finite() && self.render_scale > 0.0 {
            RenderParams {
                scale: self.render_scale,
            }
        } else {
            warn!(
                "Ignoring render_scale {}, using {DEFAULT_RENDER_SCALE}",
                self.render_scale
            );
            RenderParams::default()
        }
    }

    #[must_use]
    pub fn log_level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            LevelFilter::Info
        })
    }
}

/// `<config dir>/pagelight/config.yaml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `path` (or the default location).
///
/// A missing file is created with defaults. A file that cannot be read or
/// parsed is logged and defaults are used.
#[must_use]
pub fn load_settings(path: Option<&Path>) -> Settings {
    let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
        warn!("Could not determine config directory, using default settings");
        return Settings::default();
    };

    if !path.exists() {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        if let Err(e) = save_settings_to_file(&settings, &path) {
            error!("{e}");
        }
        return settings;
    }

    match read_settings(&path) {
        Ok(mut settings) => {
            debug!("Loaded settings from {path:?}");
            if settings.version < CURRENT_VERSION {
                migrate_settings(&mut settings);
                if let Err(e) = save_settings_to_file(&settings, &path) {
                    error!("{e}");
                }
            }
            settings
        }
        Err(e) => {
            error!("Failed to load settings file {path:?}: {e}");
            Settings::default()
        }
    }
}

/// Read and parse a settings file without any fallback
pub fn read_settings(path: &Path) -> Result<Settings, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_yaml::from_str(&content)?)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    // v1 had no styles section and used `scale`; serde defaults and the alias
    // already cover both
    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    let io_err = |source: std::io::Error| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut content = String::from(SETTINGS_HEADER);
    content.push_str(&serde_yaml::to_string(settings)?);
    fs::write(path, content).map_err(io_err)?;
    debug!("Saved settings to {path:?}");
    Ok(())
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# pagelight settings
# ============================================================================
# render_scale: points to pixels factor used for every page render
# log_level:    off, error, warn, info, debug or trace
# styles:       fill and border of each highlight kind, as "rgba(r, g, b, a)",
#               and shape: bounding_box or outline
#
"#;
