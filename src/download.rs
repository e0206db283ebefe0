use anyhow::{Context, Result};
use blake3::Hasher;
use serde::de::DeserializeOwned;
use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
    time::Duration,
};

const USER_AGENT: &str = concat!("SkinSmith/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PAGE_TIMEOUT: Duration = Duration::from_secs(15);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches a remote file to a local path. Timeouts surface as errors.
pub trait Downloader: Send + Sync {
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpDownloader;

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = agent(DOWNLOAD_TIMEOUT)
            .get(url)
            .set("User-Agent", USER_AGENT)
            .call()
            .with_context(|| format!("download {url}"))?;
        let mut reader = response.into_reader();
        write_streamed(&mut reader, dest).with_context(|| format!("write {url}"))
    }
}

/// Streams into `{dest}.part` and renames it over `dest`; the partial file is
/// removed when the stream breaks off.
pub fn write_streamed(reader: &mut impl Read, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).context("create download dir")?;
    }
    let temp = partial_path(dest);
    let mut file = File::create(&temp).context("create download file")?;
    if let Err(err) = io::copy(reader, &mut file) {
        drop(file);
        let _ = fs::remove_file(&temp);
        return Err(err).context("download interrupted");
    }
    drop(file);
    fs::rename(&temp, dest).context("finalize download")?;
    Ok(())
}

pub fn partial_path(dest: &Path) -> PathBuf {
    dest.with_extension("part")
}

pub fn get_json<T: DeserializeOwned>(url: &str) -> Result<T> {
    let response = agent(PAGE_TIMEOUT)
        .get(url)
        .set("User-Agent", USER_AGENT)
        .call()
        .with_context(|| format!("fetch {url}"))?;
    let value = response
        .into_json()
        .with_context(|| format!("decode {url}"))?;
    Ok(value)
}

fn agent(read_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout_read(read_timeout)
        .timeout_write(read_timeout)
        .build()
}

/// Staging file for `url` under `dir`, stable across runs.
pub fn staging_path(dir: &Path, url: &str) -> PathBuf {
    let mut hasher = Hasher::new();
    hasher.update(url.as_bytes());
    let hash = hasher.finalize().to_hex();
    let name = match url_extension(url) {
        Some(ext) => format!("{}.{ext}", &hash[..16]),
        None => hash[..16].to_string(),
    };
    dir.join(name)
}

/// Lower-cased extension of the last path segment, ignoring query and fragment.
pub fn url_extension(url: &str) -> Option<String> {
    let path = url.split(&['?', '#'][..]).next()?;
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || !ext.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Joins a possibly relative link onto `base`.
pub fn resolve_link(base: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") || base.is_empty() {
        return link.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        link.trim_start_matches('/')
    )
}
