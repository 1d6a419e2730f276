// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sidebar editing operations.
//!
//! All operations work on an already opened [`SflStore`] in memory. Nothing
//! is written until the caller saves the store, so a batch of operations is
//! persisted with a single atomic write.
//!
//! Adding is duplicate safe. Every existing bookmark is resolved and
//! normalized the same way as the incoming path, and the add is refused if
//! any of them point at the same location.

use crate::{
    archive::{Dict, Node},
    bookmark::{BookmarkError, BookmarkResolver},
    store::{
        catalog::{self, keys, Change},
        SflItem, SflStore, Visibility,
    },
};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Outcome of adding a single path during a batch.
pub type AddOutcome = (PathBuf, Result<()>);

impl SflStore {
    /// Append new item pointing at path.
    ///
    /// The path is made absolute with symlinks resolved before comparing it
    /// against existing items. New items are visible, and receive an explicit
    /// hidden flag of `false` in their custom properties, unless they point
    /// at a Desktop folder.
    ///
    /// # Errors
    ///
    /// - Return [`MutationError::Target`] if path does not exist.
    /// - Return [`MutationError::Duplicate`] if an existing item already
    ///   points at the same location.
    /// - Return [`MutationError::Bookmark`] if bookmark data cannot be made.
    #[instrument(skip(self, path, resolver), level = "debug")]
    pub fn add_item(
        &mut self,
        path: impl AsRef<Path>,
        resolver: &impl BookmarkResolver,
    ) -> Result<&SflItem> {
        let target = normalize(path.as_ref()).map_err(|err| MutationError::Target {
            source: err,
            path: path.as_ref().into(),
        })?;

        for item in &self.items {
            let Some(bookmark) = item.bookmark() else {
                continue;
            };
            match resolver.resolve(bookmark) {
                Ok(resolved) => {
                    let existing = normalize(&resolved.path).unwrap_or(resolved.path);
                    if existing == target {
                        return Err(MutationError::Duplicate { path: target });
                    }
                }
                Err(err) => warn!(
                    "cannot compare against item {}: {err}",
                    item.uuid().unwrap_or("<no uuid>")
                ),
            }
        }

        let bookmark = resolver.create(&target)?;
        let mut custom = Dict::new();

        // INVARIANT: Desktop entries never carry the hidden flag marker.
        //   - Match is by substring of the final component, not exact name.
        if !is_desktop(&target) {
            custom.insert(keys::ITEM_IS_HIDDEN.into(), Node::Bool(false));
        }

        info!("add {:?} to {} store", target.display(), self.kind);
        self.items
            .push(SflItem::new(catalog::new_item_uuid(), Some(bookmark), custom));

        Ok(&self.items[self.items.len() - 1])
    }

    /// Remove every item.
    ///
    /// Returns the number of items removed. Removing from an empty store is
    /// a successful no-op.
    pub fn remove_all(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        debug!("removed {removed} items from {} store", self.kind);

        removed
    }

    /// Replace every item with a new set of paths in the given order.
    ///
    /// Each path is added independently, and its outcome is reported in the
    /// returned listing. A failed path never rolls back paths added before
    /// it, nor stops paths after it from being added.
    pub fn replace_set(
        &mut self,
        paths: impl IntoIterator<Item = impl AsRef<Path>>,
        resolver: &impl BookmarkResolver,
    ) -> Vec<AddOutcome> {
        self.remove_all();

        paths
            .into_iter()
            .map(|path| {
                let outcome = self.add_item(path.as_ref(), resolver).map(|_| ());
                (path.as_ref().to_path_buf(), outcome)
            })
            .collect()
    }

    /// Show or hide every item tagged with special identifier.
    ///
    /// Returns number of matching items. Zero matches is not an error.
    pub fn set_visibility_by_identifier(&mut self, special_id: &str, visible: bool) -> usize {
        let visibility = Visibility::from_visible(visible);
        let mut matched = 0;
        for item in &mut self.items {
            if item.special_identifier() == Some(special_id) {
                item.set_visibility(visibility);
                matched += 1;
            }
        }

        if matched == 0 {
            debug!("no item tagged {special_id:?} in {} store", self.kind);
        }

        matched
    }

    /// Set store-wide flag, creating the property mapping if needed.
    pub fn set_property_flag(&mut self, key: impl Into<String>, value: bool) {
        self.properties
            .get_or_insert_with(Dict::new)
            .insert(key.into(), Node::Bool(value));
    }

    /// Apply a single change.
    ///
    /// Returns number of items affected, or one for property changes.
    pub fn apply(&mut self, change: &Change) -> usize {
        match change {
            Change::Visibility { item, visible } => {
                self.set_visibility_by_identifier(item.identifier(), *visible)
            }
            Change::Property { key, value } => {
                self.set_property_flag(*key, *value);
                1
            }
        }
    }
}

fn normalize(path: &Path) -> std::io::Result<PathBuf> {
    fs::canonicalize(path)
}

fn is_desktop(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().contains("Desktop"))
        .unwrap_or(false)
}

/// Sidebar editing error types.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// Location is already part of the store.
    #[error("{:?} is already present", path.display())]
    Duplicate { path: PathBuf },

    /// Path to add cannot be resolved.
    #[error("cannot resolve {:?}", path.display())]
    Target {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Bookmark data cannot be created for path.
    #[error(transparent)]
    Bookmark(#[from] BookmarkError),
}

/// Friendly result alias :3
pub type Result<T, E = MutationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archive,
        bookmark::BookDataResolver,
        store::{catalog::SpecialItem, ListedItem, StoreKind},
    };
    use pretty_assertions::assert_eq;

    fn empty(kind: StoreKind) -> SflStore {
        SflStore::with_defaults(kind, "unused")
    }

    fn listed_paths(store: &SflStore) -> Vec<PathBuf> {
        store
            .list(&BookDataResolver)
            .into_iter()
            .filter_map(|item| match item {
                ListedItem::Path { path, .. } => Some(path),
                ListedItem::Special { .. } => None,
            })
            .collect()
    }

    #[test]
    fn add_item_twice_is_duplicate() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("Applications");
        fs::create_dir(&target)?;
        let mut store = empty(StoreKind::Favorites);

        store.add_item(&target, &BookDataResolver)?;
        let result = store.add_item(&target, &BookDataResolver);
        assert!(matches!(result, Err(MutationError::Duplicate { .. })));
        assert_eq!(listed_paths(&store), vec![target.canonicalize()?]);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn add_item_through_symlink_is_duplicate() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("Projects");
        let link = dir.path().join("work");
        fs::create_dir(&target)?;
        std::os::unix::fs::symlink(&target, &link)?;
        let mut store = empty(StoreKind::Favorites);

        store.add_item(&target, &BookDataResolver)?;
        let result = store.add_item(&link, &BookDataResolver);
        assert!(matches!(result, Err(MutationError::Duplicate { .. })));

        Ok(())
    }

    #[test]
    fn add_missing_path_fails() {
        let mut store = empty(StoreKind::Favorites);
        let result = store.add_item("/definitely/not/here/sflctl", &BookDataResolver);
        assert!(matches!(result, Err(MutationError::Target { .. })));
        assert!(store.items().is_empty());
    }

    #[test]
    fn desktop_entries_skip_hidden_marker() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let desktop = dir.path().join("Desktop");
        let downloads = dir.path().join("Downloads");
        fs::create_dir(&desktop)?;
        fs::create_dir(&downloads)?;
        let mut store = empty(StoreKind::Favorites);

        let item = store.add_item(&desktop, &BookDataResolver)?;
        assert_eq!(item.hidden_flag(), None);
        assert!(item.visibility().is_visible());

        let item = store.add_item(&downloads, &BookDataResolver)?;
        assert_eq!(item.hidden_flag(), Some(false));
        assert!(item.visibility().is_visible());

        Ok(())
    }

    #[test]
    fn remove_all_is_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = empty(StoreKind::Favorites);
        store.add_item(dir.path(), &BookDataResolver)?;

        assert_eq!(store.remove_all(), 1);
        assert_eq!(store.remove_all(), 0);
        assert!(store.items().is_empty());

        Ok(())
    }

    #[test]
    fn replace_set_keeps_order_and_reports_failures() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let names = ["alice", "Applications", "Downloads"];
        for name in names {
            fs::create_dir(dir.path().join(name))?;
        }
        let mut store = empty(StoreKind::Favorites);
        store.add_item(dir.path(), &BookDataResolver)?;

        let paths = vec![
            dir.path().join("alice"),
            dir.path().join("missing"),
            dir.path().join("Applications"),
            dir.path().join("Downloads"),
        ];
        let outcomes = store.replace_set(&paths, &BookDataResolver);

        let failed = outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .map(|(path, _)| path.clone())
            .collect::<Vec<_>>();
        assert_eq!(failed, vec![dir.path().join("missing")]);

        let expect = names
            .iter()
            .map(|name| dir.path().join(name).canonicalize())
            .collect::<std::io::Result<Vec<_>>>()?;
        assert_eq!(listed_paths(&store), expect);

        Ok(())
    }

    #[test]
    fn visibility_targets_only_tagged_items() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = empty(StoreKind::Favorites);
        store.add_item(dir.path(), &BookDataResolver)?;
        store.items.push(SflItem::special("COMPUTER", SpecialItem::Computer));
        store.items.push(SflItem::special("HOME", SpecialItem::Home));
        let untagged_before = archive::encode(&store.items[0].clone().into_node())?;
        let home_before = store.items[2].clone();

        let matched = store.set_visibility_by_identifier(SpecialItem::Computer.identifier(), false);
        assert_eq!(matched, 1);

        let computer = &store.items()[1];
        assert_eq!(computer.visibility(), Visibility::Hidden);
        assert_eq!(computer.hidden_flag(), Some(true));

        let untagged_after = archive::encode(&store.items[0].clone().into_node())?;
        assert_eq!(untagged_after, untagged_before);
        assert_eq!(store.items[2], home_before);

        let matched = store.set_visibility_by_identifier(SpecialItem::Computer.identifier(), true);
        assert_eq!(matched, 1);
        assert_eq!(store.items()[1].hidden_flag(), Some(false));

        Ok(())
    }

    #[test]
    fn visibility_without_match_is_noop() {
        let mut store = empty(StoreKind::TopSidebarSection);
        let before = store.clone();
        assert_eq!(store.set_visibility_by_identifier("is-nothing", false), 0);
        assert_eq!(store, before);
    }

    #[test]
    fn property_flag_creates_properties() -> anyhow::Result<()> {
        let mut item = Dict::new();
        item.insert("uuid".into(), "A".into());
        let mut root = Dict::new();
        root.insert("items".into(), Node::Array(vec![Node::Dict(item)]));
        let bytes = archive::encode(&Node::Dict(root))?;
        let mut store = SflStore::from_bytes(StoreKind::NetworkBrowser, "unused", &bytes)?;
        assert_eq!(store.properties(), None);

        store.set_property_flag(keys::BONJOUR_ENABLED, false);
        assert_eq!(store.property_flag(keys::BONJOUR_ENABLED), Some(false));

        let reloaded = SflStore::from_bytes(StoreKind::NetworkBrowser, "unused", &store.to_bytes()?)?;
        assert_eq!(reloaded.property_flag(keys::BONJOUR_ENABLED), Some(false));

        Ok(())
    }

    #[test]
    fn apply_setting_changes() {
        let mut store = empty(StoreKind::FavoriteVolumes);
        for change in catalog::Setting::Computer.changes(false) {
            store.apply(&change);
        }

        assert_eq!(store.property_flag(keys::COMPUTER_IS_VISIBLE), Some(false));
        let hidden = store
            .items()
            .iter()
            .filter(|item| !item.visibility().is_visible())
            .filter_map(SflItem::special_identifier)
            .collect::<Vec<_>>();
        assert_eq!(hidden, vec![SpecialItem::Computer.identifier()]);
    }
}
