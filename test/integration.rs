// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::Sandbox;

use anyhow::Result;
use pretty_assertions::assert_eq;
use sflctl::store::{
    catalog::{keys, SpecialItem},
    FormatPreference, SflStore, StoreKind, StoreLocation, Visibility,
};
use std::{ffi::OsStr, path::PathBuf};

fn display(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|path| path.display().to_string()).collect()
}

#[test]
fn add_same_path_twice_keeps_one_entry() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let target = sandbox.mkdir("Applications")?;

    let first = sandbox.run([OsStr::new("favorites"), OsStr::new("--add"), target.as_os_str()])?;
    assert!(first.success());
    assert_eq!(first.lines()[0], format!("Linked {}", target.display()));

    let second = sandbox.run([OsStr::new("favorites"), OsStr::new("--add"), target.as_os_str()])?;
    assert_eq!(second.code(), Some(1));
    assert!(second.stderr().contains("already present"));

    let list = sandbox.run(["favorites", "--list"])?;
    assert!(list.success());
    assert_eq!(list.lines(), display(&[target]));

    Ok(())
}

#[test]
fn add_succeeds_when_any_path_succeeds() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let target = sandbox.mkdir("Downloads")?;
    let missing = sandbox.store_dir().join("nope");

    let run = sandbox.run([
        OsStr::new("favorites"),
        OsStr::new("--add"),
        missing.as_os_str(),
        target.as_os_str(),
    ])?;
    assert!(run.success());

    Ok(())
}

#[test]
fn set_replaces_items_in_given_order() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let old = sandbox.mkdir("old")?;
    let alice = sandbox.mkdir("alice")?;
    let apps = sandbox.mkdir("Applications")?;
    let downloads = sandbox.mkdir("Downloads")?;

    assert!(sandbox
        .run([OsStr::new("favorites"), OsStr::new("--add"), old.as_os_str()])?
        .success());

    let run = sandbox.run([
        OsStr::new("favorites"),
        OsStr::new("--set"),
        alice.as_os_str(),
        apps.as_os_str(),
        downloads.as_os_str(),
    ])?;
    assert!(run.success());

    let list = sandbox.run(["favorites", "--list"])?;
    assert_eq!(list.lines(), display(&[alice, apps, downloads]));

    Ok(())
}

#[test]
fn set_with_missing_path_fails_but_keeps_the_rest() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let alice = sandbox.mkdir("alice")?;
    let missing = sandbox.store_dir().join("missing");

    let run = sandbox.run([
        OsStr::new("favorites"),
        OsStr::new("--set"),
        missing.as_os_str(),
        alice.as_os_str(),
    ])?;
    assert_eq!(run.code(), Some(1));

    let list = sandbox.run(["favorites", "--list"])?;
    assert_eq!(list.lines(), display(&[alice]));

    Ok(())
}

#[test]
fn remove_all_is_idempotent() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let target = sandbox.mkdir("Projects")?;
    assert!(sandbox
        .run([OsStr::new("favorites"), OsStr::new("--add"), target.as_os_str()])?
        .success());

    assert!(sandbox.run(["favorites", "--removeAll"])?.success());
    assert!(sandbox.run(["favorites", "--remove-all"])?.success());

    let list = sandbox.run(["favorites", "--list"])?;
    assert!(list.success());
    assert!(list.lines().is_empty());

    Ok(())
}

#[test]
fn path_does_not_create_store() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let run = sandbox.run(["top-sidebar", "--path"])?;
    assert!(run.success());

    let expect = sandbox
        .store_dir()
        .join("com.apple.LSSharedFileList.TopSidebarSection.sfl2");
    assert_eq!(run.lines(), display(&[expect.clone()]));
    assert!(!expect.exists());

    Ok(())
}

#[test]
fn volumes_bootstrap_lists_special_items() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let run = sandbox.run(["volumes", "--list"])?;
    assert!(run.success());
    assert_eq!(
        run.lines(),
        vec![
            "<is-computer>",
            "<is-hard-drives>",
            "<is-network-volumes>",
            "<is-removable-media>",
        ]
    );

    Ok(())
}

#[test]
fn sidebar_hides_computer_in_volumes_store() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let run = sandbox.run(["sidebar", "--hide-computer", "--disable-bonjour"])?;
    assert!(run.success());

    let lines = run.lines();
    assert!(lines.contains(&"Hidden Computer".to_string()));
    assert!(lines.contains(&"Disabled Bonjour computers".to_string()));

    let location = StoreLocation::new(sandbox.store_dir(), FormatPreference::Legacy);
    let volumes = SflStore::open(&location, StoreKind::FavoriteVolumes)?;
    let computer = volumes
        .items()
        .iter()
        .find(|item| item.special_identifier() == Some(SpecialItem::Computer.identifier()));
    assert_eq!(computer.map(|item| item.visibility()), Some(Visibility::Hidden));
    assert_eq!(volumes.property_flag(keys::COMPUTER_IS_VISIBLE), Some(false));

    let network = SflStore::open(&location, StoreKind::NetworkBrowser)?;
    assert_eq!(network.property_flag(keys::BONJOUR_ENABLED), Some(false));

    Ok(())
}

#[test]
fn unknown_flag_prints_usage_and_fails() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let run = sandbox.run(["favorites", "--bogus"])?;
    assert_eq!(run.code(), Some(1));
    assert!(run.stdout().contains("Usage"));

    Ok(())
}

#[test]
fn help_exits_cleanly() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let run = sandbox.run(["--help"])?;
    assert!(run.success());
    assert!(run.stdout().contains("favorites"));

    Ok(())
}
