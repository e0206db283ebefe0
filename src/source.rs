use crate::{
    download::{self, resolve_link},
    skin::{Source, WebSkin, UNKNOWN_AUTHOR},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    sync::{mpsc, Arc},
    thread,
};

/// Base URLs a source adapter builds its requests from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    pub source: Source,
    pub main: String,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub base_screenshots: String,
}

/// One type/subtype listing page on a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinTypeSiteInfo {
    pub skin_type: String,
    pub sub_type: String,
    pub address: String,
}

/// One skin entry on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinSiteInfo {
    pub name: String,
    pub address: String,
}

/// A site that lists skins. Authors are normalized to `Unknown` here, not by the engine.
pub trait SkinSource: Send + Sync {
    fn list_skin_types(&self, book: &AddressBook) -> Result<Vec<SkinTypeSiteInfo>>;

    fn list_skins(&self, book: &AddressBook, info: &SkinTypeSiteInfo)
        -> Result<Vec<SkinSiteInfo>>;

    fn fetch_skin_detail(
        &self,
        book: &AddressBook,
        info: &SkinTypeSiteInfo,
        address: &str,
    ) -> Result<WebSkin>;
}

/// Reads a site's JSON catalog: `main` lists type pages, each page lists
/// skins, each skin address serves its detail record.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogSource;

#[derive(Debug, Deserialize)]
struct CatalogDetail {
    name: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    download_links: Vec<String>,
    #[serde(default)]
    screenshot_links: Vec<String>,
}

impl SkinSource for CatalogSource {
    fn list_skin_types(&self, book: &AddressBook) -> Result<Vec<SkinTypeSiteInfo>> {
        let url = resolve_link(&book.base, &book.main);
        let mut types: Vec<SkinTypeSiteInfo> =
            download::get_json(&url).context("list skin types")?;
        for info in &mut types {
            info.address = resolve_link(&book.base, &info.address);
        }
        Ok(types)
    }

    fn list_skins(
        &self,
        book: &AddressBook,
        info: &SkinTypeSiteInfo,
    ) -> Result<Vec<SkinSiteInfo>> {
        let mut skins: Vec<SkinSiteInfo> = download::get_json(&info.address)
            .with_context(|| format!("list skins for {}/{}", info.skin_type, info.sub_type))?;
        for skin in &mut skins {
            skin.address = resolve_link(&book.base, &skin.address);
        }
        Ok(skins)
    }

    fn fetch_skin_detail(
        &self,
        book: &AddressBook,
        info: &SkinTypeSiteInfo,
        address: &str,
    ) -> Result<WebSkin> {
        let detail: CatalogDetail = download::get_json(address).context("fetch skin detail")?;
        let author = detail
            .author
            .map(|author| author.trim().to_string())
            .filter(|author| !author.is_empty())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
        Ok(WebSkin {
            name: detail.name.trim().to_string(),
            skin_type: info.skin_type.clone(),
            sub_type: info.sub_type.clone(),
            address: address.to_string(),
            author,
            download_links: detail
                .download_links
                .iter()
                .map(|link| resolve_link(&book.base, link))
                .collect(),
            screenshot_links: detail
                .screenshot_links
                .iter()
                .map(|link| resolve_link(&book.base_screenshots, link))
                .collect(),
            source: book.source.clone(),
        })
    }
}

/// What one source yielded during a refresh.
#[derive(Debug, Clone)]
pub struct SourceFetch {
    pub skins: Vec<WebSkin>,
    pub warnings: Vec<String>,
}

/// Walks every listing of one source. A page or skin that fails is skipped
/// with a warning; only a failed type listing fails the whole source.
pub fn fetch_source(adapter: &dyn SkinSource, book: &AddressBook) -> Result<SourceFetch> {
    let types = adapter
        .list_skin_types(book)
        .with_context(|| format!("read {}", book.source))?;
    let mut skins = Vec::new();
    let mut warnings = Vec::new();
    for info in &types {
        let listed = match adapter.list_skins(book, info) {
            Ok(listed) => listed,
            Err(err) => {
                warnings.push(format!("{}: {err:#}", book.source));
                continue;
            }
        };
        for entry in listed {
            match adapter.fetch_skin_detail(book, info, &entry.address) {
                Ok(skin) if skin.is_valid() => skins.push(skin),
                Ok(skin) => warnings.push(format!(
                    "{}: skipped {} (no download links)",
                    book.source, skin.name
                )),
                Err(err) => warnings.push(format!("{}: {}: {err:#}", book.source, entry.name)),
            }
        }
    }
    Ok(SourceFetch {
        skins,
        warnings,
    })
}

/// Fetches every source on its own thread and hands the results back in
/// input order, so the caller can merge them one after another.
pub fn fetch_sources(
    adapter: Arc<dyn SkinSource>,
    books: &[AddressBook],
) -> Vec<(Source, Result<SourceFetch>)> {
    let (tx, rx) = mpsc::channel();
    for (index, book) in books.iter().cloned().enumerate() {
        let tx = tx.clone();
        let adapter = Arc::clone(&adapter);
        thread::spawn(move || {
            let result = fetch_source(adapter.as_ref(), &book);
            let _ = tx.send((index, book.source, result));
        });
    }
    drop(tx);

    let mut results: Vec<(usize, Source, Result<SourceFetch>)> = rx.iter().collect();
    results.sort_by_key(|(index, _, _)| *index);
    results
        .into_iter()
        .map(|(_, source, result)| (source, result))
        .collect()
}
