// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Well-known store vocabulary.
//!
//! Keys, special item identifiers, and sidebar settings understood by
//! Finder, along with the default structure of each store kind.

use crate::{
    archive::{Dict, Node},
    store::{SflItem, StoreKind},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use uuid::Uuid;

/// Archive keys of stores and their items.
pub mod keys {
    pub const ITEMS: &str = "items";
    pub const PROPERTIES: &str = "properties";

    pub const ITEM_UUID: &str = "uuid";
    pub const ITEM_NAME: &str = "Name";
    pub const ITEM_VISIBILITY: &str = "visibility";
    pub const ITEM_BOOKMARK: &str = "Bookmark";
    pub const ITEM_CUSTOM_PROPERTIES: &str = "CustomItemProperties";

    pub const SPECIAL_ITEM_IDENTIFIER: &str = "com.apple.LSSharedFileList.SpecialItemIdentifier";
    pub const ITEM_IS_HIDDEN: &str = "com.apple.LSSharedFileList.ItemIsHidden";

    pub const BONJOUR_ENABLED: &str = "com.apple.NetworkBrowser.bonjourEnabled";
    pub const BACK_TO_MY_MAC_ENABLED: &str = "com.apple.NetworkBrowser.backToMyMacEnabled";
    pub const CONNECTED_ENABLED: &str = "com.apple.NetworkBrowser.connectedEnabled";

    pub const COMPUTER_IS_VISIBLE: &str =
        "com.apple.LSSharedFileList.FavoriteVolumes.ComputerIsVisible";
    pub const SHOW_HARD_DRIVES: &str = "com.apple.LSSharedFileList.FavoriteVolumes.ShowHardDrives";
    pub const SHOW_NETWORK_VOLUMES: &str =
        "com.apple.LSSharedFileList.FavoriteVolumes.ShowNetworkVolumes";
    pub const SHOW_REMOVABLE_MEDIA: &str =
        "com.apple.LSSharedFileList.FavoriteVolumes.ShowRemovableMedia";
}

/// System provided sidebar entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialItem {
    Computer,
    Home,
    ICloudDrive,
    HardDrives,
    NetworkVolumes,
    RemovableMedia,
    Recents,
    Shared,
    AirDrop,
    Bonjour,
    ConnectedServers,
}

impl SpecialItem {
    pub const ALL: [SpecialItem; 11] = [
        Self::Computer,
        Self::Home,
        Self::ICloudDrive,
        Self::HardDrives,
        Self::NetworkVolumes,
        Self::RemovableMedia,
        Self::Recents,
        Self::Shared,
        Self::AirDrop,
        Self::Bonjour,
        Self::ConnectedServers,
    ];

    /// Identifier stored under the special item identifier key.
    pub fn identifier(self) -> &'static str {
        match self {
            Self::Computer => "com.apple.LSSharedFileList.IsComputer",
            Self::Home => "com.apple.LSSharedFileList.IsHome",
            Self::ICloudDrive => "com.apple.LSSharedFileList.IsICloudDrive",
            Self::HardDrives => "com.apple.LSSharedFileList.IsHardDrives",
            Self::NetworkVolumes => "com.apple.LSSharedFileList.IsNetworkVolumes",
            Self::RemovableMedia => "com.apple.LSSharedFileList.IsRemovableMedia",
            Self::Recents => "com.apple.LSSharedFileList.IsRecents",
            Self::Shared => "com.apple.LSSharedFileList.IsShared",
            Self::AirDrop => "com.apple.LSSharedFileList.IsAirDrop",
            Self::Bonjour => "com.apple.LSSharedFileList.IsBonjour",
            Self::ConnectedServers => "com.apple.LSSharedFileList.IsConnectedServers",
        }
    }

    /// Short human readable tag.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Computer => "is-computer",
            Self::Home => "is-home",
            Self::ICloudDrive => "is-icloud-drive",
            Self::HardDrives => "is-hard-drives",
            Self::NetworkVolumes => "is-network-volumes",
            Self::RemovableMedia => "is-removable-media",
            Self::Recents => "is-recents",
            Self::Shared => "is-shared",
            Self::AirDrop => "is-airdrop",
            Self::Bonjour => "is-bonjour",
            Self::ConnectedServers => "is-connected-servers",
        }
    }

    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|item| item.identifier() == identifier)
    }
}

impl FromStr for SpecialItem {
    type Err = UnknownSpecialItem;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|item| item.tag() == data || item.identifier() == data)
            .ok_or_else(|| UnknownSpecialItem(data.into()))
    }
}

impl Display for SpecialItem {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.tag())
    }
}

/// Unknown special item name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown special item {0:?}")]
pub struct UnknownSpecialItem(String);

/// Single edit of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Show or hide every item tagged with a special identifier.
    Visibility { item: SpecialItem, visible: bool },

    /// Set store-wide flag.
    Property { key: &'static str, value: bool },
}

/// User facing sidebar settings.
///
/// Each setting targets exactly one store kind, and expands into one or more
/// [`Change`]s against that store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    RecentsShared,
    AirDrop,
    ICloudDrive,
    Computer,
    HardDrives,
    NetworkVolumes,
    RemovableMedia,
    Bonjour,
    Connected,
}

impl Setting {
    /// Settings turned off by the all-hidden bundle.
    pub const ALL: [Setting; 9] = [
        Self::RecentsShared,
        Self::AirDrop,
        Self::ICloudDrive,
        Self::Computer,
        Self::HardDrives,
        Self::NetworkVolumes,
        Self::RemovableMedia,
        Self::Bonjour,
        Self::Connected,
    ];

    /// Store kind that holds the setting.
    pub fn kind(self) -> StoreKind {
        match self {
            Self::RecentsShared | Self::AirDrop => StoreKind::TopSidebarSection,
            Self::ICloudDrive => StoreKind::Favorites,
            Self::Computer | Self::HardDrives | Self::NetworkVolumes | Self::RemovableMedia => {
                StoreKind::FavoriteVolumes
            }
            Self::Bonjour | Self::Connected => StoreKind::NetworkBrowser,
        }
    }

    /// Expand setting into store changes.
    pub fn changes(self, enabled: bool) -> Vec<Change> {
        let visibility = |item: SpecialItem| Change::Visibility {
            item,
            visible: enabled,
        };
        let property = |key: &'static str| Change::Property {
            key,
            value: enabled,
        };

        match self {
            Self::RecentsShared => vec![
                visibility(SpecialItem::Recents),
                visibility(SpecialItem::Shared),
            ],
            Self::AirDrop => vec![visibility(SpecialItem::AirDrop)],
            Self::ICloudDrive => vec![visibility(SpecialItem::ICloudDrive)],
            Self::Computer => vec![
                visibility(SpecialItem::Computer),
                property(keys::COMPUTER_IS_VISIBLE),
            ],
            Self::HardDrives => vec![
                visibility(SpecialItem::HardDrives),
                property(keys::SHOW_HARD_DRIVES),
            ],
            Self::NetworkVolumes => vec![
                visibility(SpecialItem::NetworkVolumes),
                property(keys::SHOW_NETWORK_VOLUMES),
            ],
            Self::RemovableMedia => vec![
                visibility(SpecialItem::RemovableMedia),
                property(keys::SHOW_REMOVABLE_MEDIA),
            ],
            Self::Bonjour => vec![property(keys::BONJOUR_ENABLED)],
            Self::Connected => vec![property(keys::CONNECTED_ENABLED)],
        }
    }

    /// Verb used when reporting the setting as applied.
    pub fn verb(self, enabled: bool) -> &'static str {
        match (self, enabled) {
            (Self::Bonjour, true) => "Enabled",
            (Self::Bonjour, false) => "Disabled",
            (_, true) => "Shown",
            (_, false) => "Hidden",
        }
    }
}

impl Display for Setting {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::RecentsShared => "Recents and Shared",
            Self::AirDrop => "AirDrop",
            Self::ICloudDrive => "iCloud Drive",
            Self::Computer => "Computer",
            Self::HardDrives => "hard drives",
            Self::NetworkVolumes => "network volumes",
            Self::RemovableMedia => "removable media",
            Self::Bonjour => "Bonjour computers",
            Self::Connected => "connected servers",
        })
    }
}

/// Fresh item identifier in the uppercase form the system writes.
pub fn new_item_uuid() -> String {
    Uuid::new_v4().hyphenated().to_string().to_uppercase()
}

/// Default items and properties of a freshly created store.
pub fn default_structure(kind: StoreKind) -> (Vec<SflItem>, Dict) {
    let mut properties = Dict::new();
    let items = match kind {
        StoreKind::Favorites | StoreKind::TopSidebarSection => Vec::new(),
        StoreKind::NetworkBrowser => {
            for key in [
                keys::BONJOUR_ENABLED,
                keys::BACK_TO_MY_MAC_ENABLED,
                keys::CONNECTED_ENABLED,
            ] {
                properties.insert(key.into(), Node::Bool(true));
            }
            Vec::new()
        }
        StoreKind::FavoriteVolumes => {
            for key in [
                keys::COMPUTER_IS_VISIBLE,
                keys::SHOW_HARD_DRIVES,
                keys::SHOW_NETWORK_VOLUMES,
                keys::SHOW_REMOVABLE_MEDIA,
            ] {
                properties.insert(key.into(), Node::Bool(true));
            }
            [
                SpecialItem::Computer,
                SpecialItem::HardDrives,
                SpecialItem::NetworkVolumes,
                SpecialItem::RemovableMedia,
            ]
            .into_iter()
            .map(|item| SflItem::special(new_item_uuid(), item))
            .collect()
        }
    };

    (items, properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("is-computer", SpecialItem::Computer; "tag")]
    #[test_case("com.apple.LSSharedFileList.IsICloudDrive", SpecialItem::ICloudDrive; "identifier")]
    #[test]
    fn parse_special_item(data: &str, expect: SpecialItem) {
        assert_eq!(data.parse::<SpecialItem>().ok(), Some(expect));
    }

    #[test]
    fn setting_changes_stay_within_one_store() {
        let computer = Setting::Computer.changes(false);
        assert_eq!(
            computer,
            vec![
                Change::Visibility {
                    item: SpecialItem::Computer,
                    visible: false,
                },
                Change::Property {
                    key: keys::COMPUTER_IS_VISIBLE,
                    value: false,
                },
            ]
        );
        assert_eq!(Setting::Bonjour.kind(), StoreKind::NetworkBrowser);
        assert_eq!(Setting::Bonjour.verb(false), "Disabled");
    }

    #[test]
    fn new_item_uuid_is_uppercase() {
        let uuid = new_item_uuid();
        assert_eq!(uuid, uuid.to_uppercase());
        assert_eq!(uuid.len(), 36);
    }

    #[test]
    fn network_browser_defaults_enable_browsing() {
        let (items, properties) = default_structure(StoreKind::NetworkBrowser);
        assert!(items.is_empty());
        assert_eq!(properties.get(keys::BONJOUR_ENABLED), Some(&Node::Bool(true)));
    }
}
