// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use sflctl::{
    bookmark::BookDataResolver,
    config::Settings,
    path::{default_config_path, default_store_dir},
    reload::{ReloadReport, Reloader},
    store::{
        catalog::{Change, Setting},
        FormatPreference, SflStore, StoreError, StoreKind, StoreLocation,
    },
};

use anyhow::Result;
use clap::{error::ErrorKind, ArgGroup, Args, Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  sflctl [options] <store> [store-options]\n  sflctl [options] sidebar [toggles]...\n  sflctl [options] reload [--force]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Directory holding shared file list stores.
    #[arg(long, global = true, env = "SFLCTL_STORE_DIR", value_name = "dir")]
    pub store_dir: Option<PathBuf>,

    /// Store format generation [auto, legacy, current].
    #[arg(long, global = true, value_name = "format")]
    pub format: Option<FormatPreference>,

    /// Path to configuration file.
    #[arg(long, global = true, value_name = "file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<bool> {
        let config = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };
        let settings = Settings::load(config)?;

        let directory = match self.store_dir.or(settings.store.directory.clone()) {
            Some(directory) => directory,
            None => default_store_dir()?,
        };
        let location = StoreLocation::new(directory, self.format.unwrap_or(settings.store.format));
        let reloader = Reloader::new(settings.reload);

        match self.command {
            Command::Favorites(opts) => run_store(StoreKind::Favorites, opts, &location, &reloader),
            Command::TopSidebar(opts) => {
                run_store(StoreKind::TopSidebarSection, opts, &location, &reloader)
            }
            Command::Network(opts) => run_store(StoreKind::NetworkBrowser, opts, &location, &reloader),
            Command::Volumes(opts) => run_store(StoreKind::FavoriteVolumes, opts, &location, &reloader),
            Command::Sidebar(opts) => run_sidebar(opts, &location, &reloader),
            Command::Reload(opts) => run_reload(opts.force, &reloader).map(|_| true),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Edit user favorites section.
    #[command(override_usage = "sflctl favorites [options]")]
    Favorites(StoreOptions),

    /// Edit Recents, Shared, and AirDrop section.
    #[command(override_usage = "sflctl top-sidebar [options]")]
    TopSidebar(StoreOptions),

    /// Edit network browsing section.
    #[command(override_usage = "sflctl network [options]")]
    Network(StoreOptions),

    /// Edit locations section.
    #[command(override_usage = "sflctl volumes [options]")]
    Volumes(StoreOptions),

    /// Show or hide system provided sidebar entries.
    #[command(override_usage = "sflctl sidebar [toggles]... [--reload [--force]]")]
    Sidebar(SidebarOptions),

    /// Restart sidebar processes to pick up store changes.
    #[command(override_usage = "sflctl reload [--force]")]
    Reload(ReloadOptions),
}

#[derive(Args, Clone, Debug)]
#[command(
    group(
        ArgGroup::new("action")
            .args(["list", "add", "remove_all", "set", "path", "reload"])
            .multiple(true)
            .required(true)
    )
)]
struct StoreOptions {
    /// List items in display order.
    #[arg(short, long, group = "edit")]
    pub list: bool,

    /// Append paths to the store.
    #[arg(short, long, num_args = 1.., group = "edit", value_name = "path")]
    pub add: Vec<PathBuf>,

    /// Remove every item from the store.
    #[arg(long = "removeAll", visible_alias = "remove-all", group = "edit")]
    pub remove_all: bool,

    /// Replace every item with paths in given order.
    #[arg(short, long, num_args = 1.., group = "edit", value_name = "path")]
    pub set: Vec<PathBuf>,

    /// Print path to store file.
    #[arg(short, long, group = "edit")]
    pub path: bool,

    /// Reload sidebar afterwards.
    #[arg(short, long)]
    pub reload: bool,

    /// Restart Finder as well when reloading.
    #[arg(short, long, requires = "reload")]
    pub force: bool,
}

#[derive(Args, Clone, Debug)]
struct SidebarOptions {
    /// Hide Recents and Shared entries.
    #[arg(long, conflicts_with = "show_recents_shared")]
    pub hide_recents_shared: bool,

    /// Show Recents and Shared entries.
    #[arg(long)]
    pub show_recents_shared: bool,

    /// Hide AirDrop entry.
    #[arg(long, conflicts_with = "show_airdrop")]
    pub hide_airdrop: bool,

    /// Show AirDrop entry.
    #[arg(long)]
    pub show_airdrop: bool,

    /// Hide iCloud Drive entry.
    #[arg(long = "hide-icloud-drive", conflicts_with = "show_icloud_drive")]
    pub hide_icloud_drive: bool,

    /// Show iCloud Drive entry.
    #[arg(long = "show-icloud-drive")]
    pub show_icloud_drive: bool,

    /// Hide computer entry.
    #[arg(long, conflicts_with = "show_computer")]
    pub hide_computer: bool,

    /// Show computer entry.
    #[arg(long)]
    pub show_computer: bool,

    /// Hide hard drives.
    #[arg(long, conflicts_with = "show_hard_drives")]
    pub hide_hard_drives: bool,

    /// Show hard drives.
    #[arg(long)]
    pub show_hard_drives: bool,

    /// Hide network volumes.
    #[arg(long, conflicts_with = "show_network_volumes")]
    pub hide_network_volumes: bool,

    /// Show network volumes.
    #[arg(long)]
    pub show_network_volumes: bool,

    /// Hide removable media.
    #[arg(long, conflicts_with = "show_removable_media")]
    pub hide_removable_media: bool,

    /// Show removable media.
    #[arg(long)]
    pub show_removable_media: bool,

    /// Stop browsing Bonjour computers.
    #[arg(long, conflicts_with = "enable_bonjour")]
    pub disable_bonjour: bool,

    /// Browse Bonjour computers.
    #[arg(long)]
    pub enable_bonjour: bool,

    /// Hide connected servers.
    #[arg(long, conflicts_with = "show_connected")]
    pub hide_connected: bool,

    /// Show connected servers.
    #[arg(long)]
    pub show_connected: bool,

    /// Hide every system provided entry.
    #[arg(long)]
    pub all_hidden: bool,

    /// Reload sidebar afterwards.
    #[arg(short, long)]
    pub reload: bool,

    /// Restart Finder as well when reloading.
    #[arg(short, long, requires = "reload")]
    pub force: bool,
}

impl SidebarOptions {
    /// Requested settings, explicit toggles overriding the all-hidden bundle.
    fn toggles(&self) -> Vec<(Setting, bool)> {
        let mut toggles = Vec::new();
        if self.all_hidden {
            toggles.extend(Setting::ALL.into_iter().map(|setting| (setting, false)));
        }

        let explicit = [
            (Setting::RecentsShared, self.hide_recents_shared, self.show_recents_shared),
            (Setting::AirDrop, self.hide_airdrop, self.show_airdrop),
            (Setting::ICloudDrive, self.hide_icloud_drive, self.show_icloud_drive),
            (Setting::Computer, self.hide_computer, self.show_computer),
            (Setting::HardDrives, self.hide_hard_drives, self.show_hard_drives),
            (Setting::NetworkVolumes, self.hide_network_volumes, self.show_network_volumes),
            (Setting::RemovableMedia, self.hide_removable_media, self.show_removable_media),
            (Setting::Bonjour, self.disable_bonjour, self.enable_bonjour),
            (Setting::Connected, self.hide_connected, self.show_connected),
        ];
        for (setting, off, on) in explicit {
            if off || on {
                toggles.retain(|(existing, _)| *existing != setting);
                toggles.push((setting, on));
            }
        }

        toggles
    }
}

#[derive(Args, Clone, Debug)]
struct ReloadOptions {
    /// Restart Finder as well.
    #[arg(short, long)]
    pub force: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                let _ = err.print();
                exit(0);
            }
            _ => {
                println!("{}", err.render().to_string().trim_end());
                exit(1);
            }
        },
    };

    match cli.run() {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(error) => {
            error!("{error:?}");
            if let Some(StoreError::Access { path, .. }) = error
                .chain()
                .find_map(|cause| cause.downcast_ref::<StoreError>())
            {
                eprintln!(
                    "cannot access {:?}: grant Full Disk Access to your terminal in \
                     System Settings > Privacy & Security > Full Disk Access, then try again",
                    path.display()
                );
            }
            exit(1);
        }
    }
}

fn run_store(
    kind: StoreKind,
    opts: StoreOptions,
    location: &StoreLocation,
    reloader: &Reloader,
) -> Result<bool> {
    if opts.path {
        println!("{}", location.path_for(kind).display());
        return Ok(true);
    }

    let mut success = true;
    let mut changed = false;
    if opts.list {
        let store = SflStore::open(location, kind)?;
        for item in store.list(&BookDataResolver) {
            println!("{item}");
        }
    } else if !opts.add.is_empty() {
        let mut store = SflStore::open(location, kind)?;
        let mut added = 0;
        for path in &opts.add {
            match store.add_item(path, &BookDataResolver) {
                Ok(_) => {
                    println!("Linked {}", path.display());
                    added += 1;
                }
                Err(err) => error!("cannot add {:?}: {err}", path.display()),
            }
        }
        if added > 0 {
            store.save()?;
            changed = true;
        }
        success = added > 0;
    } else if opts.remove_all {
        let mut store = SflStore::open(location, kind)?;
        let removed = store.remove_all();
        if removed > 0 {
            store.save()?;
            changed = true;
        }
        println!("Removed {removed} items from {kind}");
    } else if !opts.set.is_empty() {
        let mut store = SflStore::open(location, kind)?;
        for (path, outcome) in store.replace_set(&opts.set, &BookDataResolver) {
            match outcome {
                Ok(()) => println!("Linked {}", path.display()),
                Err(err) => {
                    error!("cannot add {:?}: {err}", path.display());
                    success = false;
                }
            }
        }
        store.save()?;
        changed = true;
    }

    finish(changed, opts.reload, opts.force, reloader)?;
    Ok(success)
}

fn run_sidebar(opts: SidebarOptions, location: &StoreLocation, reloader: &Reloader) -> Result<bool> {
    let toggles = opts.toggles();

    let mut changed = false;
    for kind in StoreKind::ALL {
        let toggles = toggles
            .iter()
            .filter(|(setting, _)| setting.kind() == kind)
            .collect::<Vec<_>>();
        if toggles.is_empty() {
            continue;
        }

        let mut store = SflStore::open(location, kind)?;
        for (setting, enabled) in toggles {
            for change in setting.changes(*enabled) {
                let matched = store.apply(&change);
                if let Change::Visibility { item, .. } = change {
                    if matched == 0 {
                        warn!("no {item} entry in {kind} store");
                    }
                }
            }
            println!("{} {setting}", setting.verb(*enabled));
        }
        store.save()?;
        changed = true;
    }

    finish(changed, opts.reload, opts.force, reloader)?;
    Ok(true)
}

fn run_reload(force: bool, reloader: &Reloader) -> Result<()> {
    let ReloadReport { daemon, finder } = reloader.reload(force)?;
    if let Some(signal) = daemon {
        println!("{} {signal}", reloader.settings().daemon);
    }
    if let Some(signal) = finder {
        println!("{} {signal}", reloader.settings().finder);
    }

    Ok(())
}

fn finish(changed: bool, reload: bool, force: bool, reloader: &Reloader) -> Result<()> {
    if reload {
        run_reload(force, reloader)?;
    } else if changed {
        println!("Run again with --reload, or run `sflctl reload`, to refresh the sidebar");
    }

    Ok(())
}
