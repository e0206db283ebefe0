use crate::skin::SkinTypeInfo;
use filetime::{set_file_mtime, FileTime};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use thiserror::Error;
use time::{Date, Month, PrimitiveDateTime, Time as TimeOfDay};
use walkdir::WalkDir;

pub const SCREENSHOTS_DIR: &str = "Screenshots";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpErrorKind {
    Io,
    MissingDirectory,
    Archive,
    UnsupportedArchive,
    Worker,
}

impl FileOpErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            FileOpErrorKind::Io => "io",
            FileOpErrorKind::MissingDirectory => "missing folder",
            FileOpErrorKind::Archive => "archive",
            FileOpErrorKind::UnsupportedArchive => "unsupported archive",
            FileOpErrorKind::Worker => "worker",
        }
    }
}

#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("archive {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },
    #[error("unsupported archive format: {}", .0.display())]
    UnsupportedArchive(PathBuf),
    #[error("file worker stopped")]
    WorkerStopped,
}

impl FileOpError {
    pub fn kind(&self) -> FileOpErrorKind {
        match self {
            FileOpError::Io { .. } => FileOpErrorKind::Io,
            FileOpError::MissingDirectory(_) => FileOpErrorKind::MissingDirectory,
            FileOpError::Archive { .. } => FileOpErrorKind::Archive,
            FileOpError::UnsupportedArchive(_) => FileOpErrorKind::UnsupportedArchive,
            FileOpError::WorkerStopped => FileOpErrorKind::Worker,
        }
    }
}

pub type FileOpResult<T> = Result<T, FileOpError>;

fn io_error(context: &'static str, path: &Path) -> impl FnOnce(io::Error) -> FileOpError {
    let path = path.to_path_buf();
    move |source| FileOpError::Io {
        context,
        path,
        source,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: usize,
    /// Entries with nothing to back up, or an original that is already saved.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureOutcome {
    Created { folders: usize },
    DirectoryNotEmpty,
}

/// Copies every file of `skin_dir` over `game_dir`, keeping relative paths.
///
/// There is no rollback: a failure part way leaves the files copied so far.
pub fn apply_skin(skin_dir: &Path, game_dir: &Path) -> FileOpResult<CopyReport> {
    require_dir(skin_dir)?;
    require_dir(game_dir)?;
    let mut report = CopyReport::default();
    for rel in skin_files(skin_dir)? {
        copy_file(&skin_dir.join(&rel), &game_dir.join(&rel))?;
        report.copied += 1;
    }
    Ok(report)
}

/// Saves the game files a skin is about to overwrite into `backup_dir`.
///
/// Paths the game does not have are skipped. A file already present in
/// `backup_dir` is the original from an earlier apply and is left alone.
pub fn create_backup(skin_dir: &Path, backup_dir: &Path, game_dir: &Path) -> FileOpResult<CopyReport> {
    require_dir(skin_dir)?;
    require_dir(game_dir)?;
    fs::create_dir_all(backup_dir).map_err(io_error("create backup dir", backup_dir))?;
    let mut report = CopyReport::default();
    for rel in skin_files(skin_dir)? {
        let installed = game_dir.join(&rel);
        let saved = backup_dir.join(&rel);
        if !installed.is_file() || saved.exists() {
            report.skipped += 1;
            continue;
        }
        copy_file(&installed, &saved)?;
        report.copied += 1;
    }
    Ok(report)
}

/// Copies everything under `backup_dir` back over `game_dir`.
pub fn restore_backup(backup_dir: &Path, game_dir: &Path) -> FileOpResult<CopyReport> {
    require_dir(backup_dir)?;
    require_dir(game_dir)?;
    let mut report = CopyReport::default();
    for rel in walk_files(backup_dir, false)? {
        copy_file(&backup_dir.join(&rel), &game_dir.join(&rel))?;
        report.copied += 1;
    }
    Ok(report)
}

/// Lays out `{skins_root}/{type}/{subtype}` for the whole catalog.
///
/// Refuses to touch a root that already has content.
pub fn create_structure(catalog: &[SkinTypeInfo], skins_root: &Path) -> FileOpResult<StructureOutcome> {
    if skins_root.exists() && !dir_is_empty(skins_root)? {
        return Ok(StructureOutcome::DirectoryNotEmpty);
    }
    fs::create_dir_all(skins_root).map_err(io_error("create skins root", skins_root))?;
    let mut folders = 0;
    for skin_type in catalog {
        for sub_type in &skin_type.subtypes {
            let dir = skins_root.join(&skin_type.name).join(sub_type);
            if dir.is_dir() {
                continue;
            }
            fs::create_dir_all(&dir).map_err(io_error("create skin folder", &dir))?;
            folders += 1;
        }
    }
    Ok(StructureOutcome::Created { folders })
}

/// Unpacks a `.zip` or `.7z` into `destination` and returns the file count.
///
/// A destination created here is removed again if extraction fails.
pub fn extract_skin(archive: &Path, destination: &Path) -> FileOpResult<usize> {
    let format = archive
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    let created = !destination.exists();
    fs::create_dir_all(destination).map_err(io_error("create skin folder", destination))?;
    let result = match format.as_deref() {
        Some("zip") => extract_zip(archive, destination),
        Some("7z") => extract_7z(archive, destination),
        _ => Err(FileOpError::UnsupportedArchive(archive.to_path_buf())),
    };
    if result.is_err() && created {
        let _ = fs::remove_dir_all(destination);
    }
    result
}

pub fn dir_is_empty(dir: &Path) -> FileOpResult<bool> {
    let mut entries = fs::read_dir(dir).map_err(io_error("read dir", dir))?;
    Ok(entries.next().is_none())
}

/// True when `dir` holds at least one file at any depth.
pub fn dir_has_files(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.file_type().is_file())
}

fn require_dir(dir: &Path) -> FileOpResult<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(FileOpError::MissingDirectory(dir.to_path_buf()))
    }
}

/// Relative paths a skin installs; its screenshots stay behind.
fn skin_files(skin_dir: &Path) -> FileOpResult<Vec<PathBuf>> {
    walk_files(skin_dir, true)
}

fn walk_files(root: &Path, skip_screenshots: bool) -> FileOpResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            !is_ignored_path(rel, skip_screenshots)
        });
    for entry in walker {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            FileOpError::Io {
                context: "walk",
                path,
                source: err.into(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }
    Ok(files)
}

fn is_ignored_path(rel: &Path, skip_screenshots: bool) -> bool {
    if skip_screenshots && rel.starts_with(SCREENSHOTS_DIR) {
        return true;
    }
    rel.components().any(|component| {
        let part = component.as_os_str().to_string_lossy();
        part.eq_ignore_ascii_case("__MACOSX")
            || part.eq_ignore_ascii_case(".ds_store")
            || part.eq_ignore_ascii_case("thumbs.db")
    })
}

fn copy_file(source: &Path, dest: &Path) -> FileOpResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_error("create dir", parent))?;
    }
    fs::copy(source, dest).map_err(io_error("copy file", source))?;
    preserve_mtime(source, dest);
    Ok(())
}

fn preserve_mtime(source: &Path, dest: &Path) {
    let Ok(meta) = fs::metadata(source) else {
        return;
    };
    let Ok(modified) = meta.modified() else {
        return;
    };
    let Ok(duration) = modified.duration_since(UNIX_EPOCH) else {
        return;
    };
    let mtime = FileTime::from_unix_time(duration.as_secs() as i64, 0);
    let _ = set_file_mtime(dest, mtime);
}

fn extract_zip(path: &Path, dest: &Path) -> FileOpResult<usize> {
    let archive_error = |message: String| FileOpError::Archive {
        path: path.to_path_buf(),
        message,
    };
    let file = fs::File::open(path).map_err(io_error("open archive", path))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| archive_error(err.to_string()))?;

    let mut count = 0;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|err| archive_error(err.to_string()))?;
        let Some(out_path) = file.enclosed_name() else {
            continue;
        };

        let out_path = dest.join(out_path);
        if file.is_dir() {
            fs::create_dir_all(&out_path).map_err(io_error("create dir", &out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(io_error("create dir", parent))?;
        }

        let mut out_file =
            fs::File::create(&out_path).map_err(io_error("write archive entry", &out_path))?;
        io::copy(&mut file, &mut out_file).map_err(io_error("extract archive entry", &out_path))?;
        if let Some(dt) = file.last_modified() {
            if let Some(mtime) = zip_time_to_unix(dt) {
                let _ = set_file_mtime(&out_path, FileTime::from_unix_time(mtime, 0));
            }
        }
        count += 1;
    }

    Ok(count)
}

fn zip_time_to_unix(dt: zip::DateTime) -> Option<i64> {
    let month = Month::try_from(dt.month()).ok()?;
    let date = Date::from_calendar_date(dt.year() as i32, month, dt.day()).ok()?;
    let time = TimeOfDay::from_hms(dt.hour(), dt.minute(), dt.second()).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}

fn extract_7z(path: &Path, dest: &Path) -> FileOpResult<usize> {
    sevenz_rust::decompress_file(path, dest).map_err(|err| FileOpError::Archive {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    Ok(walk_files(dest, false)?.len())
}
