use crate::{
    skin::{local_folder_name, DisplaySkin, LocalSkin, Skin, SkinId, Slot, Source, WebSkin},
    source::AddressBook,
};
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

pub const ORIGINALS_DIR: &str = "Originals";

/// Everything the engine knows about skins.
///
/// Updates never touch `self`; each one returns the next state so a
/// workflow can hold on to the previous value until it commits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkinsState {
    web_skins: Vec<WebSkin>,
    local_skins: Vec<LocalSkin>,
    applied_skins: BTreeMap<Slot, LocalSkin>,
    address_books: Vec<AddressBook>,
}

impl SkinsState {
    pub fn new(address_books: Vec<AddressBook>) -> Self {
        Self {
            address_books,
            ..Self::default()
        }
    }

    pub fn web_skins(&self) -> &[WebSkin] {
        &self.web_skins
    }

    pub fn local_skins(&self) -> &[LocalSkin] {
        &self.local_skins
    }

    pub fn applied_skins(&self) -> impl Iterator<Item = &LocalSkin> {
        self.applied_skins.values()
    }

    pub fn applied_skin(&self, slot: &Slot) -> Option<&LocalSkin> {
        self.applied_skins.get(slot)
    }

    pub fn address_books(&self) -> &[AddressBook] {
        &self.address_books
    }

    pub fn address_book(&self, source: &Source) -> Option<&AddressBook> {
        self.address_books.iter().find(|book| &book.source == source)
    }

    /// Merges local skins; a name (or folder) that is already known keeps its first entry.
    pub fn add_local_skins(&self, skins: impl IntoIterator<Item = LocalSkin>) -> Self {
        let mut next = self.clone();
        let mut names: HashSet<String> = next.local_skins.iter().map(|s| s.name.clone()).collect();
        let mut locations: HashSet<PathBuf> =
            next.local_skins.iter().map(|s| s.location.clone()).collect();
        for skin in skins {
            if names.contains(&skin.name) || locations.contains(&skin.location) {
                continue;
            }
            names.insert(skin.name.clone());
            locations.insert(skin.location.clone());
            next.local_skins.push(skin);
        }
        next
    }

    pub fn replace_local_skins(&self, skins: impl IntoIterator<Item = LocalSkin>) -> Self {
        let cleared = Self {
            local_skins: Vec::new(),
            ..self.clone()
        };
        cleared.add_local_skins(skins)
    }

    pub fn add_web_skins(&self, skins: impl IntoIterator<Item = WebSkin>) -> Self {
        let mut next = self.clone();
        let mut names: HashSet<String> = next.web_skins.iter().map(|s| s.name.clone()).collect();
        for skin in skins {
            if names.insert(skin.name.clone()) {
                next.web_skins.push(skin);
            }
        }
        next
    }

    /// Discards every cached web entry; used when all sources answered a full refresh.
    pub fn replace_web_skins(&self, skins: impl IntoIterator<Item = WebSkin>) -> Self {
        let cleared = Self {
            web_skins: Vec::new(),
            ..self.clone()
        };
        cleared.add_web_skins(skins)
    }

    /// Swaps out the entries of one source; other sources are kept as they are.
    pub fn replace_web_skins_from(
        &self,
        source: &Source,
        skins: impl IntoIterator<Item = WebSkin>,
    ) -> Self {
        let mut cleared = self.clone();
        cleared.web_skins.retain(|skin| &skin.source != source);
        cleared.add_web_skins(skins)
    }

    /// Drops web entries that already have a downloaded copy in the same slot.
    pub fn without_materialized_web_skins(&self) -> Self {
        let mut next = self.clone();
        let local: HashSet<(Slot, &str)> = self
            .local_skins
            .iter()
            .map(|skin| (skin.slot(), skin.name.as_str()))
            .collect();
        next.web_skins.retain(|web| {
            let slot = web.slot();
            let folder = local_folder_name(&web.name, &web.author);
            !local.contains(&(slot.clone(), web.name.as_str()))
                && !local.contains(&(slot, folder.as_str()))
        });
        next
    }

    /// Records `skin` as applied, evicting whatever occupied its slot.
    pub fn add_applied_skin(&self, skin: LocalSkin) -> Self {
        let mut next = self.clone();
        next.applied_skins.insert(skin.slot(), skin);
        next
    }

    /// Bulk merge for load time: slots that are already recorded win.
    pub fn add_applied_skins(&self, skins: impl IntoIterator<Item = LocalSkin>) -> Self {
        let mut next = self.clone();
        for skin in skins {
            next.applied_skins.entry(skin.slot()).or_insert(skin);
        }
        next
    }

    pub fn remove_applied_skin(&self, slot: &Slot) -> Self {
        let mut next = self.clone();
        next.applied_skins.remove(slot);
        next
    }

    /// Promotion: the web entry is replaced by a local one at `location`.
    ///
    /// Only call once the files really exist at `location`.
    pub fn change_web_skin_to_local_skin(
        &self,
        web: &WebSkin,
        location: &Path,
        screenshot_file_names: Vec<PathBuf>,
    ) -> Self {
        let local = LocalSkin {
            name: web.name.clone(),
            skin_type: web.skin_type.clone(),
            sub_type: web.sub_type.clone(),
            location: location.to_path_buf(),
            author: web.author.clone(),
            screenshot_file_names,
        };
        let mut next = self.clone();
        let id = web.id();
        next.web_skins.retain(|skin| skin.id() != id);
        next.local_skins
            .retain(|skin| skin.id() != id && skin.location != local.location);
        next.local_skins.push(local);
        next
    }

    pub fn find_local_skin_by_id(&self, id: &SkinId) -> Option<&LocalSkin> {
        self.local_skins.iter().find(|skin| &skin.id() == id)
    }

    /// Resolves an identity triple; web entries are checked first.
    pub fn find_skin(&self, id: &SkinId) -> Option<Skin> {
        if let Some(web) = self.web_skins.iter().find(|skin| &skin.id() == id) {
            return Some(Skin::Web(web.clone()));
        }
        self.find_local_skin_by_id(id).cloned().map(Skin::Local)
    }

    pub fn skin_from_display(&self, display: &DisplaySkin) -> Option<Skin> {
        self.find_skin(&display.id)
    }

    pub fn all_skins(&self) -> impl Iterator<Item = Skin> + '_ {
        self.web_skins
            .iter()
            .cloned()
            .map(Skin::Web)
            .chain(self.local_skins.iter().cloned().map(Skin::Local))
    }

    /// Case-insensitive search; web matches come before local ones.
    pub fn search_skins<'a>(&'a self, text: &str) -> impl Iterator<Item = Skin> + 'a {
        let needle = text.to_lowercase();
        self.all_skins()
            .filter(move |skin| skin.matches_text(&needle))
    }

    pub fn available_skins(&self, skin_type: &str, sub_type: &str, include_web: bool) -> Vec<Skin> {
        let slot = Slot::new(skin_type, sub_type);
        let web = self
            .web_skins
            .iter()
            .filter(|_| include_web)
            .filter(|skin| skin.slot() == slot)
            .cloned()
            .map(Skin::Web);
        let local = self
            .local_skins
            .iter()
            .filter(|skin| skin.slot() == slot)
            .cloned()
            .map(Skin::Local);
        web.chain(local).collect()
    }

    /// Slots known from either collection, sorted.
    pub fn slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self.all_skins().map(|skin| skin.slot()).collect();
        slots.sort();
        slots.dedup();
        slots
    }

    /// `{skins_root}/{type}/Originals/{subtype}` for a known local skin.
    pub fn backup_location(&self, id: &SkinId, skins_root: &Path) -> Option<PathBuf> {
        self.find_local_skin_by_id(id)
            .map(|skin| backup_location_for(&skin.slot(), skins_root))
    }
}

pub fn backup_location_for(slot: &Slot, skins_root: &Path) -> PathBuf {
    skins_root
        .join(&slot.skin_type)
        .join(ORIGINALS_DIR)
        .join(&slot.sub_type)
}
