use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::credentials::is_usable_secret;

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Locally persisted preferences. Read at chat start and after every save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_model: Option<String>,
}

impl Settings {
    pub fn usable_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| is_usable_secret(key))
    }

    pub fn preferred_model(&self) -> Option<&str> {
        self.preferred_model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is the same as empty settings.
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid settings file {}", self.path.display()))
    }

    /// Like `load`, but an unreadable or corrupt file is reported on stderr
    /// and treated as empty so a later save can replace it.
    pub fn load_or_default(&self) -> Settings {
        match self.load() {
            Ok(settings) => settings,
            Err(err) => {
                eprintln!("tutorchat warning: ignoring settings: {err:#}");
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let body = serde_json::to_string_pretty(settings)?;
        let mut file = owner_only_options()
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        // `mode` only applies on create; an older file keeps its bits otherwise.
        restrict_permissions(&self.path)?;
        file.write_all(body.as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn set_api_key(&self, key: &str) -> Result<Settings> {
        let key = key.trim();
        if !is_usable_secret(key) {
            bail!("API key is empty or a placeholder");
        }
        self.update(|settings| settings.api_key = Some(key.to_string()))
    }

    pub fn clear_api_key(&self) -> Result<Settings> {
        self.update(|settings| settings.api_key = None)
    }

    /// `None` or a blank value drops the preference.
    pub fn set_preferred_model(&self, model: Option<&str>) -> Result<Settings> {
        let model = model
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        self.update(|settings| settings.preferred_model = model)
    }

    fn update(&self, apply: impl FnOnce(&mut Settings)) -> Result<Settings> {
        let mut settings = self.load_or_default();
        apply(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

fn owner_only_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Shows only the edges of a secret, e.g. `AIza…9xQ`.
pub fn masked_key(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    if chars.len() <= 8 {
        return "•".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}…{tail}")
}
