use crate::{
    skin::{SkinTypeInfo, Source},
    source::AddressBook,
    store,
};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub const DATA_DIR_ENV: &str = "SKINSMITH_DATA_DIR";
const SETTINGS_FILE: &str = "settings.json";

/// Where the other state files live, plus a couple of session preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub game_info_file: PathBuf,
    pub applied_skins_file: PathBuf,
    pub cached_skins_file: PathBuf,
    #[serde(default = "default_true")]
    pub include_web: bool,
    #[serde(default)]
    pub selected_source: Option<Source>,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl AppSettings {
    pub fn load_or_create() -> Result<Self> {
        let data_dir = base_data_dir()?;
        Self::load_or_create_in(&data_dir)
    }

    pub fn load_or_create_in(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("create app data dir")?;
        let path = data_dir.join(SETTINGS_FILE);
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read settings")?;
            let mut settings: AppSettings =
                serde_json::from_str(&raw).context("parse settings")?;
            settings.data_dir = data_dir.to_path_buf();
            return Ok(settings);
        }

        let settings = AppSettings {
            game_info_file: PathBuf::from("game_info.json"),
            applied_skins_file: PathBuf::from("applied_skins.json"),
            cached_skins_file: PathBuf::from("cached_skins.json"),
            include_web: true,
            selected_source: None,
            data_dir: data_dir.to_path_buf(),
        };
        settings.save()?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("serialize settings")?;
        fs::write(self.data_dir.join(SETTINGS_FILE), raw).context("write settings")?;
        Ok(())
    }

    /// Relative entries are taken relative to the data dir.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn game_info_path(&self) -> PathBuf {
        self.resolve(&self.game_info_file)
    }

    pub fn applied_skins_path(&self) -> PathBuf {
        self.resolve(&self.applied_skins_file)
    }

    pub fn cached_skins_path(&self) -> PathBuf {
        self.resolve(&self.cached_skins_file)
    }

    pub fn address_books_path(&self) -> PathBuf {
        self.data_dir.join("address_books.json")
    }

    pub fn skin_types_path(&self) -> PathBuf {
        self.data_dir.join("skin_types.json")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("skinsmith.log")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub skins_location: PathBuf,
    #[serde(default)]
    pub game_location: PathBuf,
    #[serde(default)]
    pub game_executable: String,
}

impl GameInfo {
    pub fn load_or_create(path: &Path, data_dir: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path).context("read game info")?;
            let info = serde_json::from_str(&raw).context("parse game info")?;
            return Ok(info);
        }

        let info = GameInfo {
            skins_location: data_dir.join("skins"),
            game_location: PathBuf::new(),
            game_executable: String::new(),
        };
        info.save(path)?;
        Ok(info)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create game info dir")?;
        }
        let raw = serde_json::to_string_pretty(self).context("serialize game info")?;
        fs::write(path, raw).context("write game info")?;
        Ok(())
    }

    pub fn is_game_configured(&self) -> bool {
        !self.game_location.as_os_str().is_empty() && self.game_location.is_dir()
    }

    pub fn executable_path(&self) -> Option<PathBuf> {
        if self.game_executable.trim().is_empty() {
            return None;
        }
        Some(self.game_location.join(&self.game_executable))
    }
}

/// Address books are shipped reference data; a missing file means no web sources.
pub fn load_address_books(path: &Path) -> Result<Vec<AddressBook>> {
    store::load_list(path).context("load address books")
}

pub fn load_skin_types(path: &Path) -> Result<Vec<SkinTypeInfo>> {
    store::load_list(path).context("load skin types")
}

pub fn base_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("skinsmith"))
}

fn default_true() -> bool {
    true
}
