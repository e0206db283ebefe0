use crate::skin::{LocalSkin, WebSkin};
use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, path::Path};

pub fn load_web_skins(path: &Path) -> Result<Vec<WebSkin>> {
    load_list(path).context("load cached web skins")
}

pub fn save_web_skins(path: &Path, skins: &[WebSkin]) -> Result<()> {
    save_list(path, skins).context("save cached web skins")
}

/// One entry per occupied slot.
pub fn load_applied_skins(path: &Path) -> Result<Vec<LocalSkin>> {
    load_list(path).context("load applied skins")
}

pub fn save_applied_skins<'a>(
    path: &Path,
    skins: impl IntoIterator<Item = &'a LocalSkin>,
) -> Result<()> {
    let skins: Vec<&LocalSkin> = skins.into_iter().collect();
    save_list(path, &skins).context("save applied skins")
}

/// A JSON list; a file that does not exist yet reads as empty.
pub fn load_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let items = serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(items)
}

/// Writes a temp file and renames it over `path`, so a failed save keeps the old list.
pub fn save_list<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let parent = path.parent().context("state file parent")?;
    fs::create_dir_all(parent).context("create state dir")?;

    let raw = serde_json::to_string_pretty(items).context("serialize list")?;
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, raw).context("write temp file")?;
    fs::rename(&temp, path).with_context(|| format!("finalize {}", path.display()))?;
    Ok(())
}
