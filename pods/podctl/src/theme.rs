use crate::config::ConfigResult;
use pod_types::Theme;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ThemeFile {
    #[serde(default)]
    theme: Option<Theme>,
}

/// Whether a `COLORFGBG` value (`fg;bg` or `fg;x;bg`) describes a dark background
pub fn prefers_dark(colorfgbg: Option<&str>) -> bool {
    let Some(value) = colorfgbg else {
        return false;
    };
    match value.rsplit(';').next().and_then(|bg| bg.trim().parse::<u8>().ok()) {
        Some(bg) => bg < 7 || bg == 8,
        None => false,
    }
}

/// Terminal background preference from the environment
pub fn system_prefers_dark() -> bool {
    prefers_dark(std::env::var("COLORFGBG").ok().as_deref())
}

/// The persisted theme flag
pub struct ThemeStore {
    path: PathBuf,
}

impl ThemeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored preference, if any. An unreadable file counts as no preference.
    pub fn stored(&self) -> Option<Theme> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read theme file {:?}: {}", self.path, e);
                return None;
            }
        };

        match toml::from_str::<ThemeFile>(&content) {
            Ok(file) => file.theme,
            Err(e) => {
                warn!("Ignoring malformed theme file {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Theme in effect: stored value, otherwise the system preference
    pub fn current(&self, system_prefers_dark: bool) -> Theme {
        Theme::resolve(self.stored(), system_prefers_dark)
    }

    pub fn save(&self, theme: Theme) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&ThemeFile { theme: Some(theme) })?;
        fs::write(&self.path, content)?;
        debug!("Stored theme {} in {:?}", theme, self.path);
        Ok(())
    }

    /// Flip the current theme and persist it
    pub fn toggle(&self, system_prefers_dark: bool) -> ConfigResult<Theme> {
        let next = self.current(system_prefers_dark).toggled();
        self.save(next)?;
        Ok(next)
    }
}
