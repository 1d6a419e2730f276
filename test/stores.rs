// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Store files in the layout Finder writes: mutable class chains, a root
//! that is not the first object, and shared empty containers. Any other
//! `sfl2` or `sfl3` file placed in `test/data` is checked the same way.

use anyhow::Result;
use pretty_assertions::assert_eq;
use sflctl::{
    archive,
    bookmark::BookDataResolver,
    store::{catalog::keys, SflStore, StoreKind},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("test").join("data")
}

fn store_files() -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(data_dir())? {
        let path = entry?.path();
        let is_store = path
            .extension()
            .map(|ext| ext == "sfl2" || ext == "sfl3")
            .unwrap_or(false);
        if is_store {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths)
}

fn open(name: &str, kind: StoreKind) -> Result<SflStore> {
    let path = data_dir().join(name);
    let bytes = fs::read(&path)?;

    Ok(SflStore::from_bytes(kind, path, &bytes)?)
}

#[test]
fn store_files_survive_round_trip() -> Result<()> {
    let paths = store_files()?;
    assert!(!paths.is_empty());

    for path in paths {
        let bytes = fs::read(&path)?;
        let decoded = archive::decode(&bytes)?;
        assert_eq!(archive::decode(&archive::encode(&decoded)?)?, decoded);

        let store = SflStore::from_bytes(StoreKind::Favorites, &path, &bytes)?;
        assert_eq!(archive::decode(&store.to_bytes()?)?, decoded);
    }

    Ok(())
}

#[test]
fn favorites_store_lists_bookmarked_paths() -> Result<()> {
    let store = open(
        "com.apple.LSSharedFileList.FavoriteItems.sfl2",
        StoreKind::Favorites,
    )?;
    let listing = store
        .list(&BookDataResolver)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    assert_eq!(
        listing,
        vec!["/Applications", "/Users/alice/Desktop", "/Users/alice/Downloads"]
    );
    assert_eq!(store.items()[1].hidden_flag(), None);
    assert_eq!(store.items()[2].hidden_flag(), Some(false));

    Ok(())
}

#[test]
fn volumes_store_keeps_flags_and_tags() -> Result<()> {
    let store = open(
        "com.apple.LSSharedFileList.FavoriteVolumes.sfl3",
        StoreKind::FavoriteVolumes,
    )?;
    let listing = store
        .list(&BookDataResolver)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    assert_eq!(
        listing,
        vec![
            "<is-computer>",
            "<is-hard-drives>",
            "<is-network-volumes>",
            "<is-removable-media>",
        ]
    );
    assert_eq!(store.property_flag(keys::SHOW_NETWORK_VOLUMES), Some(false));
    assert_eq!(store.property_flag(keys::COMPUTER_IS_VISIBLE), Some(true));

    Ok(())
}
