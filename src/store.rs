// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Shared file list store management.
//!
//! Finder keeps the contents of its sidebar in a handful of __shared file
//! list stores__. Each store is a keyed archive whose root dictionary holds
//! an ordered `items` array, i.e., the entries in display order, and a
//! `properties` dictionary of store-wide flags.
//!
//! # Store Layout
//!
//! All stores live in one directory, by default
//! `~/Library/Application Support/com.apple.sharedfilelist`. Each store kind
//! has a fixed file name, and the file extension tells which format
//! generation the system expects: `sfl2` up to macOS 13, and `sfl3` from
//! macOS 14 onward.
//!
//! The store file is owned by `sharedfilelistd` at runtime. Nothing locks
//! it, so every edit here is a short read, modify, and atomic write cycle
//! followed by an explicit reload of the daemon.
//!
//! # See Also
//!
//! - [`catalog`] for well-known keys and identifiers.
//! - [`mutate`] for sidebar editing operations.

pub mod catalog;
pub mod mutate;

use crate::{
    archive::{self, DecodeError, Dict, EncodeError, Node},
    bookmark::BookmarkResolver,
    store::catalog::{keys, SpecialItem},
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
};
use tracing::{debug, info, instrument, warn};

/// Kinds of shared file list stores that back the Finder sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKind {
    /// User favorites section.
    Favorites,

    /// Recents, Shared, and AirDrop entries at the top of the sidebar.
    TopSidebarSection,

    /// Network browsing section.
    NetworkBrowser,

    /// Locations section listing the computer and its volumes.
    FavoriteVolumes,
}

impl StoreKind {
    pub const ALL: [StoreKind; 4] = [
        Self::Favorites,
        Self::TopSidebarSection,
        Self::NetworkBrowser,
        Self::FavoriteVolumes,
    ];

    /// File name of store without extension.
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Favorites => "com.apple.LSSharedFileList.FavoriteItems",
            Self::TopSidebarSection => "com.apple.LSSharedFileList.TopSidebarSection",
            Self::NetworkBrowser => "com.apple.LSSharedFileList.NetworkBrowser",
            Self::FavoriteVolumes => "com.apple.LSSharedFileList.FavoriteVolumes",
        }
    }

    /// Full file name of store for a format generation.
    pub fn file_name(self, version: FormatVersion) -> String {
        format!("{}.{}", self.file_stem(), version.extension())
    }
}

impl Display for StoreKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Favorites => "favorites",
            Self::TopSidebarSection => "top sidebar section",
            Self::NetworkBrowser => "network browser",
            Self::FavoriteVolumes => "favorite volumes",
        })
    }
}

/// Store format generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// `sfl2` stores used up to macOS 13.
    Legacy,

    /// `sfl3` stores used from macOS 14 onward.
    Current,
}

impl FormatVersion {
    /// First major macOS release that reads `sfl3` stores.
    pub const CURRENT_SINCE_MAJOR: u32 = 14;

    pub fn extension(self) -> &'static str {
        match self {
            Self::Legacy => "sfl2",
            Self::Current => "sfl3",
        }
    }

    /// Select format generation from a macOS product version string.
    pub fn for_product_version(version: &str) -> Option<Self> {
        let major = version.trim().split('.').next()?.parse::<u32>().ok()?;
        if major >= Self::CURRENT_SINCE_MAJOR {
            Some(Self::Current)
        } else {
            Some(Self::Legacy)
        }
    }

    /// Detect format generation of running system.
    ///
    /// Falls back to [`FormatVersion::Current`] when the product version
    /// cannot be determined.
    pub fn detect() -> Self {
        let detected = Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| {
                Self::for_product_version(String::from_utf8_lossy(&output.stdout).as_ref())
            });

        match detected {
            Some(version) => version,
            None => {
                debug!("cannot determine system version, assume current store format");
                Self::Current
            }
        }
    }
}

/// Preferred store format generation.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatPreference {
    /// Use whatever exists on disk, otherwise follow system version.
    #[default]
    Auto,

    /// Always use `sfl2` stores.
    Legacy,

    /// Always use `sfl3` stores.
    Current,
}

impl FromStr for FormatPreference {
    type Err = UnknownFormat;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "auto" => Ok(Self::Auto),
            "legacy" | "sfl2" => Ok(Self::Legacy),
            "current" | "sfl3" => Ok(Self::Current),
            other => Err(UnknownFormat(other.into())),
        }
    }
}

/// Unknown store format name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown store format {0:?}, expected auto, legacy, or current")]
pub struct UnknownFormat(String);

/// Location of shared file list stores on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    directory: PathBuf,
    format: FormatPreference,
}

impl StoreLocation {
    /// Construct new store location.
    pub fn new(directory: impl Into<PathBuf>, format: FormatPreference) -> Self {
        Self {
            directory: directory.into(),
            format,
        }
    }

    pub fn directory(&self) -> &Path {
        self.directory.as_path()
    }

    /// Determine absolute path to store file of given kind.
    ///
    /// With [`FormatPreference::Auto`] an existing `sfl3` store wins over an
    /// existing `sfl2` store. If neither exists, the system version decides.
    /// Never creates or touches the store file itself.
    pub fn path_for(&self, kind: StoreKind) -> PathBuf {
        let version = match self.format {
            FormatPreference::Legacy => FormatVersion::Legacy,
            FormatPreference::Current => FormatVersion::Current,
            FormatPreference::Auto => {
                let current = self.directory.join(kind.file_name(FormatVersion::Current));
                let legacy = self.directory.join(kind.file_name(FormatVersion::Legacy));
                if current.exists() {
                    FormatVersion::Current
                } else if legacy.exists() {
                    FormatVersion::Legacy
                } else {
                    FormatVersion::detect()
                }
            }
        };

        self.directory.join(kind.file_name(version))
    }
}

/// Whether an item shows up in the sidebar.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    pub fn from_visible(visible: bool) -> Self {
        if visible {
            Self::Visible
        } else {
            Self::Hidden
        }
    }

    /// Raw value stored under the item `visibility` key.
    pub fn raw(self) -> i64 {
        match self {
            Self::Visible => 0,
            Self::Hidden => 1,
        }
    }

    pub fn is_visible(self) -> bool {
        self == Self::Visible
    }
}

/// Single sidebar entry.
///
/// An item is either a user added favorite addressed by its bookmark, or a
/// system provided entry addressed by its special item identifier. Fields
/// that are not understood are kept untouched across edits.
#[derive(Debug, Clone, PartialEq)]
pub struct SflItem {
    fields: Dict,
}

impl SflItem {
    /// Construct new item from its identifier, bookmark, and custom
    /// properties. The item starts out visible.
    pub fn new(uuid: impl Into<String>, bookmark: Option<Vec<u8>>, custom_properties: Dict) -> Self {
        let mut fields = Dict::new();
        fields.insert(keys::ITEM_UUID.into(), Node::String(uuid.into()));
        fields.insert(
            keys::ITEM_VISIBILITY.into(),
            Node::Integer(Visibility::Visible.raw()),
        );
        if let Some(bookmark) = bookmark {
            fields.insert(keys::ITEM_BOOKMARK.into(), Node::Data(bookmark));
        }
        fields.insert(keys::ITEM_CUSTOM_PROPERTIES.into(), Node::Dict(custom_properties));

        Self { fields }
    }

    /// Construct new system provided item tagged with special identifier.
    pub fn special(uuid: impl Into<String>, item: SpecialItem) -> Self {
        let mut custom = Dict::new();
        custom.insert(
            keys::SPECIAL_ITEM_IDENTIFIER.into(),
            Node::String(item.identifier().into()),
        );
        custom.insert(keys::ITEM_IS_HIDDEN.into(), Node::Bool(false));

        Self::new(uuid, None, custom)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.fields.get(keys::ITEM_UUID).and_then(Node::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get(keys::ITEM_NAME).and_then(Node::as_str)
    }

    pub fn visibility(&self) -> Visibility {
        match self.fields.get(keys::ITEM_VISIBILITY).and_then(Node::as_integer) {
            Some(0) | None => Visibility::Visible,
            Some(_) => Visibility::Hidden,
        }
    }

    pub fn bookmark(&self) -> Option<&[u8]> {
        self.fields.get(keys::ITEM_BOOKMARK).and_then(Node::as_data)
    }

    pub fn custom_properties(&self) -> Option<&Dict> {
        self.fields.get(keys::ITEM_CUSTOM_PROPERTIES).and_then(Node::as_dict)
    }

    /// Raw special item identifier, if item is system provided.
    pub fn special_identifier(&self) -> Option<&str> {
        self.custom_properties()
            .and_then(|custom| custom.get(keys::SPECIAL_ITEM_IDENTIFIER))
            .and_then(Node::as_str)
    }

    /// Hidden flag mirrored into custom properties, if present.
    pub fn hidden_flag(&self) -> Option<bool> {
        self.custom_properties()
            .and_then(|custom| custom.get(keys::ITEM_IS_HIDDEN))
            .and_then(Node::as_bool)
    }

    /// Set visibility, and mirror it into the custom hidden flag.
    ///
    /// Finder consults both fields, so they are always written together.
    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.fields.insert(
            keys::ITEM_VISIBILITY.into(),
            Node::Integer(visibility.raw()),
        );

        let custom = self
            .fields
            .entry(keys::ITEM_CUSTOM_PROPERTIES.into())
            .or_insert_with(Node::empty_dict);
        if custom.as_dict().is_none() {
            *custom = Node::empty_dict();
        }
        if let Some(custom) = custom.as_dict_mut() {
            custom.insert(
                keys::ITEM_IS_HIDDEN.into(),
                Node::Bool(!visibility.is_visible()),
            );
        }
    }

    fn from_node(index: usize, node: Node) -> Result<Self> {
        match node {
            Node::Dict(fields) => Ok(Self { fields }),
            _ => Err(StoreError::Structure {
                reason: format!("item {index} is not a dictionary"),
            }),
        }
    }

    fn into_node(self) -> Node {
        Node::Dict(self.fields)
    }
}

/// Single entry of a store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListedItem {
    /// Item resolved through its bookmark.
    Path { path: PathBuf, is_stale: bool },

    /// System provided item without a bookmark.
    Special { identifier: String, visible: bool },
}

impl Display for ListedItem {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Path { path, .. } => write!(fmt, "{}", path.display()),
            Self::Special { identifier, .. } => {
                let tag = SpecialItem::from_identifier(identifier)
                    .map(SpecialItem::tag)
                    .unwrap_or(identifier.as_str());
                write!(fmt, "<{tag}>")
            }
        }
    }
}

/// Loaded shared file list store.
#[derive(Debug, Clone, PartialEq)]
pub struct SflStore {
    kind: StoreKind,
    path: PathBuf,
    items: Vec<SflItem>,
    properties: Option<Dict>,
    rest: Dict,
}

impl SflStore {
    /// Open store of given kind.
    ///
    /// A missing store is not an error: a fresh store with the default
    /// structure of its kind is written in its place and returned.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Access`] if the store exists but cannot be read,
    ///   typically because Full Disk Access was not granted.
    /// - Return [`StoreError::Decode`] if the store is not a valid archive.
    /// - Return [`StoreError::Structure`] if the archive is not a store.
    /// - Return [`StoreError::Io`] for any other file system failure.
    #[instrument(skip(location), level = "debug")]
    pub fn open(location: &StoreLocation, kind: StoreKind) -> Result<Self> {
        let path = location.path_for(kind);
        debug!("open {kind} store at {:?}", path.display());

        match fs::read(&path) {
            Ok(bytes) => Self::from_bytes(kind, path, &bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("create missing {kind} store at {:?}", path.display());
                let store = Self::with_defaults(kind, path);
                store.save()?;
                Ok(store)
            }
            Err(err) => Err(StoreError::from_io(path, err)),
        }
    }

    /// Construct store of given kind with its default structure.
    pub fn with_defaults(kind: StoreKind, path: impl Into<PathBuf>) -> Self {
        let (items, properties) = catalog::default_structure(kind);
        Self {
            kind,
            path: path.into(),
            items,
            properties: Some(properties),
            rest: Dict::new(),
        }
    }

    /// Construct store from raw archive data.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Decode`] if data is not a valid archive.
    /// - Return [`StoreError::Structure`] if archive is not a store.
    pub fn from_bytes(kind: StoreKind, path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self> {
        let path = path.into();
        let root = archive::decode(bytes).map_err(|err| StoreError::Decode {
            source: err,
            path: path.clone(),
        })?;
        let mut rest = match root {
            Node::Dict(root) => root,
            _ => {
                return Err(StoreError::Structure {
                    reason: "root is not a dictionary".into(),
                })
            }
        };

        let items = match rest.remove(keys::ITEMS) {
            Some(Node::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| SflItem::from_node(index, item))
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(StoreError::Structure {
                    reason: "items is not an array".into(),
                })
            }
            None => {
                return Err(StoreError::Structure {
                    reason: "items are missing".into(),
                })
            }
        };

        let properties = match rest.remove(keys::PROPERTIES) {
            Some(Node::Dict(properties)) => Some(properties),
            Some(_) => {
                return Err(StoreError::Structure {
                    reason: "properties is not a dictionary".into(),
                })
            }
            None => None,
        };

        Ok(Self {
            kind,
            path,
            items,
            properties,
            rest,
        })
    }

    /// Serialize store into raw archive data.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Encode`] if archive serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut root = self.rest.clone();
        root.insert(
            keys::ITEMS.into(),
            Node::Array(self.items.iter().cloned().map(SflItem::into_node).collect()),
        );
        if let Some(properties) = &self.properties {
            root.insert(keys::PROPERTIES.into(), Node::Dict(properties.clone()));
        }

        Ok(archive::encode(&Node::Dict(root))?)
    }

    /// Write store back to disk.
    ///
    /// Data goes to a temporary file in the store directory first, which is
    /// then renamed over the store. Readers never observe a partial store.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Access`] if the store directory is not writable.
    /// - Return [`StoreError::Io`] for any other file system failure.
    #[instrument(skip(self), fields(kind = %self.kind), level = "debug")]
    pub fn save(&self) -> Result<()> {
        let bytes = self.to_bytes()?;
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|err| StoreError::from_io(parent.clone(), err))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".sflctl-")
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(|err| StoreError::from_io(parent.clone(), err))?;
        temp.write_all(&bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|err| StoreError::from_io(temp.path().to_path_buf(), err))?;

        // INVARIANT: Replacing a store keeps its permissions.
        if let Ok(metadata) = fs::metadata(&self.path) {
            temp.as_file()
                .set_permissions(metadata.permissions())
                .map_err(|err| StoreError::from_io(temp.path().to_path_buf(), err))?;
        }
        temp.persist(&self.path)
            .map_err(|err| StoreError::from_io(self.path.clone(), err.error))?;

        debug!("wrote {} bytes to {:?}", bytes.len(), self.path.display());
        Ok(())
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn items(&self) -> &[SflItem] {
        &self.items
    }

    pub fn properties(&self) -> Option<&Dict> {
        self.properties.as_ref()
    }

    /// Get store-wide flag.
    pub fn property_flag(&self, key: &str) -> Option<bool> {
        self.properties
            .as_ref()
            .and_then(|properties| properties.get(key))
            .and_then(Node::as_bool)
    }

    /// List items in display order.
    ///
    /// Items whose bookmark cannot be resolved are skipped with a warning, so
    /// one broken entry never hides the rest of the sidebar.
    pub fn list(&self, resolver: &impl BookmarkResolver) -> Vec<ListedItem> {
        let mut listing = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if let Some(bookmark) = item.bookmark() {
                match resolver.resolve(bookmark) {
                    Ok(resolved) => {
                        if resolved.is_stale {
                            debug!("bookmark of {:?} is stale", resolved.path.display());
                        }
                        listing.push(ListedItem::Path {
                            path: resolved.path,
                            is_stale: resolved.is_stale,
                        });
                    }
                    Err(err) => warn!(
                        "skip item {} of {} store: {err}",
                        item.uuid().unwrap_or("<no uuid>"),
                        self.kind
                    ),
                }
            } else if let Some(identifier) = item.special_identifier() {
                listing.push(ListedItem::Special {
                    identifier: identifier.into(),
                    visible: item.visibility().is_visible(),
                });
            } else {
                warn!(
                    "skip item {} of {} store: neither bookmark nor special identifier",
                    item.uuid().unwrap_or("<no uuid>"),
                    self.kind
                );
            }
        }

        listing
    }
}

/// All possible error types for store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store exists but access was denied.
    #[error("permission denied for {:?}", path.display())]
    Access {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Store is not a valid keyed archive.
    #[error("failed to decode store at {:?}", path.display())]
    Decode {
        #[source]
        source: DecodeError,
        path: PathBuf,
    },

    /// Archive is valid but does not look like a store.
    #[error("archive is not a shared file list store: {reason}")]
    Structure { reason: String },

    /// Store cannot be serialized.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Store cannot be read or written.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl StoreError {
    fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == ErrorKind::PermissionDenied {
            Self::Access { source, path }
        } else {
            Self::Io { source, path }
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
