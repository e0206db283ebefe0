use crate::{
    file_ops::SCREENSHOTS_DIR,
    skin::{author_from_folder_name, LocalSkin},
    state::ORIGINALS_DIR,
};
use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Reads `{root}/{type}/{subtype}/{skin}` folders into local skins.
///
/// `Originals` holds backups and is never read as a skin, at either level.
/// A `Screenshots` folder beside the skins is shared picture storage, not a skin.
pub fn scan_local_skins(skins_root: &Path) -> Result<Vec<LocalSkin>> {
    if !skins_root.is_dir() {
        bail!("skins folder does not exist: {}", skins_root.display());
    }

    let mut skins = Vec::new();
    for type_dir in sorted_dirs(skins_root)? {
        let skin_type = folder_name(&type_dir);
        for sub_dir in sorted_dirs(&type_dir)? {
            let sub_type = folder_name(&sub_dir);
            if sub_type == ORIGINALS_DIR {
                continue;
            }
            for skin_dir in sorted_dirs(&sub_dir)? {
                let name = folder_name(&skin_dir);
                if name == ORIGINALS_DIR || name == SCREENSHOTS_DIR {
                    continue;
                }
                skins.push(LocalSkin {
                    author: author_from_folder_name(&name),
                    screenshot_file_names: screenshot_files(&skin_dir),
                    name,
                    skin_type: skin_type.clone(),
                    sub_type: sub_type.clone(),
                    location: skin_dir,
                });
            }
        }
    }
    Ok(skins)
}

/// Screenshots of a skin: `{skin}/Screenshots`, else the subtype-level
/// `{subtype}/Screenshots/{skin}`. Unfinished `.part` downloads are left out.
pub fn screenshot_files(skin_dir: &Path) -> Vec<PathBuf> {
    let own = files_in(&skin_dir.join(SCREENSHOTS_DIR));
    if !own.is_empty() {
        return own;
    }
    match (skin_dir.parent(), skin_dir.file_name()) {
        (Some(sub_dir), Some(name)) => files_in(&sub_dir.join(SCREENSHOTS_DIR).join(name)),
        _ => Vec::new(),
    }
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().map_or(true, |ext| ext != "part"))
        .collect();
    files.sort();
    files
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn scan_reads_three_levels_and_skips_originals() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(&root.join("Area/Forest/MySkin_by_Alice/file.dat"));
        touch(&root.join("Area/Forest/Originals/file.dat"));
        touch(&root.join("Area/Originals/Forest/file.dat"));

        let skins = scan_local_skins(root).unwrap();
        assert_eq!(skins.len(), 1);
        let skin = &skins[0];
        assert_eq!(skin.name, "MySkin_by_Alice");
        assert_eq!(skin.skin_type, "Area");
        assert_eq!(skin.sub_type, "Forest");
        assert_eq!(skin.author, "Alice");
        assert_eq!(skin.location, root.join("Area/Forest/MySkin_by_Alice"));
        assert!(skin.screenshot_file_names.is_empty());
    }

    #[test]
    fn screenshots_and_missing_author() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(&root.join("Enemy/Rappy Family/Blue/Screenshots/b.png"));
        touch(&root.join("Enemy/Rappy Family/Blue/Screenshots/a.png"));
        touch(&root.join("Enemy/Rappy Family/Blue/data.xvm"));
        touch(&root.join("Enemy/stray.txt"));

        let skins = scan_local_skins(root).unwrap();
        assert_eq!(skins.len(), 1);
        assert_eq!(skins[0].author, "");
        assert_eq!(
            skins[0].screenshot_file_names,
            vec![
                root.join("Enemy/Rappy Family/Blue/Screenshots/a.png"),
                root.join("Enemy/Rappy Family/Blue/Screenshots/b.png"),
            ]
        );
    }

    #[test]
    fn subtype_screenshots_folder_feeds_its_skins() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(&root.join("Area/Forest/Moss/data.xvm"));
        touch(&root.join("Area/Forest/Fern/data.xvm"));
        touch(&root.join("Area/Forest/Fern/Screenshots/own.png"));
        touch(&root.join("Area/Forest/Screenshots/Moss/1.png"));
        touch(&root.join("Area/Forest/Screenshots/Fern/shared.png"));

        let skins = scan_local_skins(root).unwrap();
        let names: Vec<&str> = skins.iter().map(|skin| skin.name.as_str()).collect();
        assert_eq!(names, vec!["Fern", "Moss"]);
        assert_eq!(
            skins[0].screenshot_file_names,
            vec![root.join("Area/Forest/Fern/Screenshots/own.png")]
        );
        assert_eq!(
            skins[1].screenshot_file_names,
            vec![root.join("Area/Forest/Screenshots/Moss/1.png")]
        );
    }

    #[test]
    fn unfinished_downloads_are_not_screenshots() {
        let tmp = TempDir::new().unwrap();
        let skin = tmp.path().join("Area/Forest/Moss");
        touch(&skin.join("Screenshots/01.png"));
        touch(&skin.join("Screenshots/02.part"));
        assert_eq!(screenshot_files(&skin), vec![skin.join("Screenshots/01.png")]);
    }

    #[test]
    fn missing_root_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = scan_local_skins(&tmp.path().join("absent")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
