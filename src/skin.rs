use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};

pub const AUTHOR_SEPARATOR: &str = "_by_";
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Name of the web site (address book) a skin was scraped from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Source(pub String);

impl Source {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `(type, subtype)` pair. At most one skin is applied per slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub skin_type: String,
    pub sub_type: String,
}

impl Slot {
    pub fn new(skin_type: &str, sub_type: &str) -> Self {
        Self {
            skin_type: skin_type.to_string(),
            sub_type: sub_type.to_string(),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.skin_type, self.sub_type)
    }
}

/// The triple a skin is addressed by across the web and local collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkinId {
    pub name: String,
    pub skin_type: String,
    pub sub_type: String,
}

impl SkinId {
    pub fn new(name: &str, skin_type: &str, sub_type: &str) -> Self {
        Self {
            name: name.to_string(),
            skin_type: skin_type.to_string(),
            sub_type: sub_type.to_string(),
        }
    }

    pub fn slot(&self) -> Slot {
        Slot::new(&self.skin_type, &self.sub_type)
    }
}

impl fmt::Display for SkinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.skin_type, self.sub_type, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSkin {
    pub name: String,
    pub skin_type: String,
    pub sub_type: String,
    pub address: String,
    pub author: String,
    #[serde(default)]
    pub download_links: Vec<String>,
    #[serde(default)]
    pub screenshot_links: Vec<String>,
    pub source: Source,
}

impl WebSkin {
    pub fn id(&self) -> SkinId {
        SkinId::new(&self.name, &self.skin_type, &self.sub_type)
    }

    pub fn slot(&self) -> Slot {
        Slot::new(&self.skin_type, &self.sub_type)
    }

    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && !self.download_links.is_empty()
    }

    /// First download link that is not a "revert" (restore-originals) package.
    pub fn preferred_download_link(&self) -> Option<&str> {
        self.download_links
            .iter()
            .map(|link| link.as_str())
            .find(|link| !link.to_ascii_lowercase().contains("revert"))
    }

    /// Folder a downloaded copy lives in: `{type}/{subtype}/{name}[_by_{author}]`.
    pub fn local_location(&self, skins_root: &Path) -> PathBuf {
        skins_root
            .join(&self.skin_type)
            .join(&self.sub_type)
            .join(local_folder_name(&self.name, &self.author))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSkin {
    pub name: String,
    pub skin_type: String,
    pub sub_type: String,
    pub location: PathBuf,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub screenshot_file_names: Vec<PathBuf>,
}

impl LocalSkin {
    pub fn id(&self) -> SkinId {
        SkinId::new(&self.name, &self.skin_type, &self.sub_type)
    }

    pub fn slot(&self) -> Slot {
        Slot::new(&self.skin_type, &self.sub_type)
    }
}

/// Either side of the catalog. Type-specific behavior is matched explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skin {
    Web(WebSkin),
    Local(LocalSkin),
}

impl Skin {
    pub fn name(&self) -> &str {
        match self {
            Skin::Web(skin) => &skin.name,
            Skin::Local(skin) => &skin.name,
        }
    }

    pub fn skin_type(&self) -> &str {
        match self {
            Skin::Web(skin) => &skin.skin_type,
            Skin::Local(skin) => &skin.skin_type,
        }
    }

    pub fn sub_type(&self) -> &str {
        match self {
            Skin::Web(skin) => &skin.sub_type,
            Skin::Local(skin) => &skin.sub_type,
        }
    }

    pub fn author(&self) -> &str {
        match self {
            Skin::Web(skin) => &skin.author,
            Skin::Local(skin) => &skin.author,
        }
    }

    pub fn id(&self) -> SkinId {
        SkinId::new(self.name(), self.skin_type(), self.sub_type())
    }

    pub fn slot(&self) -> Slot {
        Slot::new(self.skin_type(), self.sub_type())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Skin::Local(_))
    }

    /// Case-insensitive substring match over name, type and subtype.
    pub fn matches_text(&self, needle_lower: &str) -> bool {
        self.name().to_lowercase().contains(needle_lower)
            || self.skin_type().to_lowercase().contains(needle_lower)
            || self.sub_type().to_lowercase().contains(needle_lower)
    }

    pub fn display(&self) -> DisplaySkin {
        let (origin, screenshots) = match self {
            Skin::Web(skin) => (
                DisplayOrigin::Web(skin.source.clone()),
                skin.screenshot_links.clone(),
            ),
            Skin::Local(skin) => (
                DisplayOrigin::Local,
                skin.screenshot_file_names
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect(),
            ),
        };
        DisplaySkin {
            id: self.id(),
            author: self.author().to_string(),
            origin,
            screenshots,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum DisplayOrigin {
    Web(Source),
    Local,
}

/// What a listing shows for a skin; resolved back through `SkinsState::skin_from_display`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplaySkin {
    pub id: SkinId,
    pub author: String,
    pub origin: DisplayOrigin,
    pub screenshots: Vec<String>,
}

impl DisplaySkin {
    pub fn label(&self) -> String {
        let origin = match &self.origin {
            DisplayOrigin::Web(source) => format!("web:{source}"),
            DisplayOrigin::Local => "local".to_string(),
        };
        if self.author.is_empty() {
            format!("{} [{origin}]", self.id)
        } else {
            format!("{} by {} [{origin}]", self.id, self.author)
        }
    }
}

/// A skin type and the subtypes (slots) it is split into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinTypeInfo {
    pub name: String,
    #[serde(default)]
    pub subtypes: Vec<String>,
}

pub fn author_from_folder_name(folder: &str) -> String {
    folder
        .split(AUTHOR_SEPARATOR)
        .skip(1)
        .last()
        .unwrap_or_default()
        .to_string()
}

pub fn local_folder_name(name: &str, author: &str) -> String {
    let base = sanitize_folder_name(name);
    let author = author.trim();
    if author.is_empty() || author == UNKNOWN_AUTHOR {
        base
    } else {
        format!("{base}{AUTHOR_SEPARATOR}{}", sanitize_folder_name(author))
    }
}

pub fn sanitize_folder_name(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|ch| match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    let cleaned = cleaned.trim_end_matches(&['.', ' '][..]).to_string();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
