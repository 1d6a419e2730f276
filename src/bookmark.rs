// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bookmark data handling.
//!
//! Every user added sidebar entry stores the location it points at as
//! __bookmark data__, an opaque blob normally produced by
//! `-[NSURL bookmarkDataWithOptions:]`. Sidebar editing only needs to turn
//! such a blob back into an absolute path, and to mint new blobs for paths
//! being added. Both directions are handled here without any system
//! framework.
//!
//! # Bookmark Layout
//!
//! All integers are little-endian unless noted otherwise.
//!
//! ```text
//! +--------+--------+---------+-------------+---------+
//! | "book" | size   | version | header size | padding |
//! +--------+--------+---------+-------------+---------+
//! | first TOC offset | items... | TOC                 |
//! +------------------+----------+---------------------+
//! ```
//!
//! Offsets inside the data area are relative to the end of the header. Each
//! item is a `length`, a `type` code, and a payload padded to four bytes. A
//! TOC maps well-known keys to item offsets, and may chain to another TOC.
//!
//! # See Also
//!
//! - [`BookmarkResolver`]

use std::{
    cell::Cell,
    collections::BTreeMap,
    fs::{self, Metadata},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, instrument};
use uuid::Uuid;

const MAGIC: &[u8; 4] = b"book";
const VERSION: u32 = 0x1004_0000;
const HEADER_SIZE: u32 = 48;
const TOC_MAGIC: u32 = 0xffff_fffe;
const MAX_TOCS: usize = 32;
const MAX_DEPTH: usize = 16;

const TYPE_MASK: u32 = 0xffff_ff00;
const SUBTYPE_MASK: u32 = 0x0000_00ff;

const TYPE_STRING: u32 = 0x0100;
const TYPE_DATA: u32 = 0x0200;
const TYPE_NUMBER: u32 = 0x0300;
const TYPE_DATE: u32 = 0x0400;
const TYPE_BOOLEAN: u32 = 0x0500;
const TYPE_ARRAY: u32 = 0x0600;
const TYPE_DICT: u32 = 0x0700;
const TYPE_UUID: u32 = 0x0800;
const TYPE_URL: u32 = 0x0900;
const TYPE_NULL: u32 = 0x0a00;

const NUMBER_SINT64: u32 = 4;
const NUMBER_FLOAT64: u32 = 6;
const URL_ABSOLUTE: u32 = 1;
const URL_RELATIVE: u32 = 2;

/// Well-known bookmark TOC keys.
pub mod keys {
    pub const URL: u32 = 0x1003;
    pub const PATH: u32 = 0x1004;
    pub const CNID_PATH: u32 = 0x1005;
    pub const FILE_PROPERTIES: u32 = 0x1010;
    pub const FILE_NAME: u32 = 0x1020;
    pub const FILE_ID: u32 = 0x1030;
    pub const FILE_CREATION_DATE: u32 = 0x1040;
    pub const VOLUME_PATH: u32 = 0x2002;
    pub const VOLUME_URL: u32 = 0x2005;
    pub const VOLUME_NAME: u32 = 0x2010;
    pub const VOLUME_IS_ROOT: u32 = 0x2030;
    pub const CONTAINING_FOLDER: u32 = 0xc001;
    pub const USER_NAME: u32 = 0xc011;
    pub const CREATION_OPTIONS: u32 = 0xd010;
}

const PROPERTY_REGULAR_FILE: u64 = 0x01;
const PROPERTY_DIRECTORY: u64 = 0x02;
const PROPERTY_SYMLINK: u64 = 0x04;
const PROPERTY_VALID_MASK: u64 = 0x0f;
const CREATION_OPTIONS: i64 = 512;

/// Single value stored in bookmark data.
#[derive(Debug, Clone, PartialEq)]
pub enum BookmarkItem {
    String(String),
    Data(Vec<u8>),
    Integer(i64),
    Real(f64),
    /// Seconds since 2001-01-01 00:00:00 UTC.
    Date(f64),
    Bool(bool),
    Array(Vec<BookmarkItem>),
    Dict(Vec<(BookmarkItem, BookmarkItem)>),
    Uuid(Uuid),
    Url(String),
    Null,
    Unknown { type_code: u32, payload: Vec<u8> },
}

/// Parsed bookmark data.
///
/// Only the entries of numbered TOC keys are kept. When several TOCs define
/// the same key, the first one wins.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Bookmark {
    entries: BTreeMap<u32, BookmarkItem>,
}

impl Bookmark {
    /// Construct new empty bookmark.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get item recorded under key.
    pub fn get(&self, key: u32) -> Option<&BookmarkItem> {
        self.entries.get(&key)
    }

    /// Record item under key.
    pub fn insert(&mut self, key: u32, item: BookmarkItem) {
        self.entries.insert(key, item);
    }

    /// Absolute path recorded by bookmark.
    ///
    /// # Errors
    ///
    /// - Return [`BookmarkError::MissingPath`] if no path components exist.
    pub fn path(&self) -> Result<PathBuf> {
        let components = match self.get(keys::PATH) {
            Some(BookmarkItem::Array(components)) => components,
            _ => return Err(BookmarkError::MissingPath),
        };

        let mut path = PathBuf::from("/");
        for component in components {
            match component {
                BookmarkItem::String(name) => path.push(name),
                _ => return Err(BookmarkError::MissingPath),
            }
        }

        Ok(path)
    }

    /// File identifier recorded by bookmark, if any.
    pub fn file_id(&self) -> Option<u64> {
        match self.get(keys::FILE_ID) {
            Some(BookmarkItem::Integer(id)) => u64::try_from(*id).ok(),
            _ => None,
        }
    }

    /// Parse bookmark data.
    ///
    /// # Errors
    ///
    /// - Return [`BookmarkError::Truncated`] if data ends early.
    /// - Return [`BookmarkError::BadMagic`] if data is not bookmark data.
    /// - Return [`BookmarkError::BadHeader`] if header sizes disagree.
    /// - Return [`BookmarkError::BadItem`] if an item cannot be read.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let magic = data.get(0..4).ok_or(BookmarkError::Truncated)?;
        if magic != MAGIC {
            let mut bad = [0; 4];
            bad.copy_from_slice(magic);
            return Err(BookmarkError::BadMagic(bad));
        }

        let size = read_u32(data, 4)? as usize;
        let header_size = read_u32(data, 12)? as usize;
        if header_size < 16 || header_size > size {
            return Err(BookmarkError::BadHeader);
        }
        let data = data.get(..size).ok_or(BookmarkError::Truncated)?;

        // INVARIANT: Every item reference costs at least four bytes of
        // table space, so a well formed bookmark never parses more items
        // than that.
        let reader = Reader {
            data,
            header_size,
            budget: Cell::new(data.len() / 4),
        };
        let mut bookmark = Bookmark::new();
        let mut toc_offset = read_u32(data, header_size)? as usize;

        // INVARIANT: Bound TOC chain length so a self-referencing chain
        // cannot loop forever.
        for _ in 0..MAX_TOCS {
            if toc_offset == 0 {
                break;
            }

            let toc_base = header_size + toc_offset;
            if read_u32(data, toc_base + 4)? != TOC_MAGIC {
                break;
            }
            let next = read_u32(data, toc_base + 12)? as usize;
            let count = read_u32(data, toc_base + 16)? as usize;

            for index in 0..count {
                let entry = toc_base + 20 + 12 * index;
                let key = read_u32(data, entry)?;
                let offset = read_u32(data, entry + 4)?;

                // String keyed entries are not used for path resolution.
                if key & 0x8000_0000 != 0 {
                    continue;
                }

                let item = reader.item(offset, 0)?;
                bookmark.entries.entry(key).or_insert(item);
            }

            toc_offset = next;
        }

        Ok(bookmark)
    }

    /// Serialize bookmark data.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer {
            body: vec![0; 4],
        };

        let mut toc = Vec::with_capacity(self.entries.len());
        for (key, item) in &self.entries {
            toc.push((*key, writer.item(item)));
        }

        let toc_offset = writer.body.len() as u32;
        writer.put_u32(12 + 12 * toc.len() as u32);
        writer.put_u32(TOC_MAGIC);
        writer.put_u32(1);
        writer.put_u32(0);
        writer.put_u32(toc.len() as u32);
        for (key, offset) in toc {
            writer.put_u32(key);
            writer.put_u32(offset);
            writer.put_u32(0);
        }
        writer.body[0..4].copy_from_slice(&toc_offset.to_le_bytes());

        let mut data = Vec::with_capacity(HEADER_SIZE as usize + writer.body.len());
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&(HEADER_SIZE + writer.body.len() as u32).to_le_bytes());
        data.extend_from_slice(&VERSION.to_le_bytes());
        data.extend_from_slice(&HEADER_SIZE.to_le_bytes());
        data.resize(HEADER_SIZE as usize, 0);
        data.extend_from_slice(&writer.body);

        data
    }
}

struct Reader<'a> {
    data: &'a [u8],
    header_size: usize,
    budget: Cell<usize>,
}

impl Reader<'_> {
    fn item(&self, offset: u32, depth: usize) -> Result<BookmarkItem> {
        if depth > MAX_DEPTH {
            return Err(BookmarkError::BadItem(offset));
        }

        match self.budget.get().checked_sub(1) {
            Some(left) => self.budget.set(left),
            None => return Err(BookmarkError::BadItem(offset)),
        }

        let base = self.header_size + offset as usize;
        let length = read_u32(self.data, base)? as usize;
        let type_code = read_u32(self.data, base + 4)?;
        let payload = self
            .data
            .get(base + 8..base + 8 + length)
            .ok_or(BookmarkError::BadItem(offset))?;
        let subtype = type_code & SUBTYPE_MASK;

        let item = match type_code & TYPE_MASK {
            TYPE_STRING => BookmarkItem::String(utf8(payload, offset)?),
            TYPE_DATA => BookmarkItem::Data(payload.to_vec()),
            TYPE_NUMBER => number(payload, subtype).ok_or(BookmarkError::BadItem(offset))?,
            TYPE_DATE => {
                let bytes: [u8; 8] = payload
                    .try_into()
                    .map_err(|_| BookmarkError::BadItem(offset))?;
                BookmarkItem::Date(f64::from_be_bytes(bytes))
            }
            TYPE_BOOLEAN => BookmarkItem::Bool(subtype == 1),
            TYPE_ARRAY => BookmarkItem::Array(
                self.offsets(payload, offset)?
                    .into_iter()
                    .map(|child| self.item(child, depth + 1))
                    .collect::<Result<Vec<_>>>()?,
            ),
            TYPE_DICT => {
                let offsets = self.offsets(payload, offset)?;
                let mut pairs = Vec::with_capacity(offsets.len() / 2);
                for pair in offsets.chunks_exact(2) {
                    pairs.push((self.item(pair[0], depth + 1)?, self.item(pair[1], depth + 1)?));
                }
                BookmarkItem::Dict(pairs)
            }
            TYPE_UUID => BookmarkItem::Uuid(
                Uuid::from_slice(payload).map_err(|_| BookmarkError::BadItem(offset))?,
            ),
            TYPE_URL if subtype == URL_RELATIVE => {
                let parts = self.offsets(payload, offset)?;
                let mut url = String::new();
                for child in parts {
                    if let BookmarkItem::Url(part) | BookmarkItem::String(part) =
                        self.item(child, depth + 1)?
                    {
                        url.push_str(&part);
                    }
                }
                BookmarkItem::Url(url)
            }
            TYPE_URL => BookmarkItem::Url(utf8(payload, offset)?),
            TYPE_NULL => BookmarkItem::Null,
            _ => BookmarkItem::Unknown {
                type_code,
                payload: payload.to_vec(),
            },
        };

        Ok(item)
    }

    fn offsets(&self, payload: &[u8], offset: u32) -> Result<Vec<u32>> {
        if payload.len() % 4 != 0 {
            return Err(BookmarkError::BadItem(offset));
        }

        Ok(payload
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

struct Writer {
    body: Vec<u8>,
}

impl Writer {
    fn put_u32(&mut self, value: u32) {
        self.body.extend_from_slice(&value.to_le_bytes());
    }

    fn record(&mut self, type_code: u32, payload: &[u8]) -> u32 {
        let offset = self.body.len() as u32;
        self.put_u32(payload.len() as u32);
        self.put_u32(type_code);
        self.body.extend_from_slice(payload);

        // INVARIANT: Items always start on four byte boundaries.
        while self.body.len() % 4 != 0 {
            self.body.push(0);
        }

        offset
    }

    fn item(&mut self, item: &BookmarkItem) -> u32 {
        match item {
            BookmarkItem::String(string) => self.record(TYPE_STRING | 1, string.as_bytes()),
            BookmarkItem::Data(data) => self.record(TYPE_DATA | 1, data),
            BookmarkItem::Integer(integer) => {
                self.record(TYPE_NUMBER | NUMBER_SINT64, &integer.to_le_bytes())
            }
            BookmarkItem::Real(real) => self.record(TYPE_NUMBER | NUMBER_FLOAT64, &real.to_le_bytes()),
            BookmarkItem::Date(date) => self.record(TYPE_DATE, &date.to_be_bytes()),
            BookmarkItem::Bool(boolean) => self.record(TYPE_BOOLEAN | u32::from(*boolean), &[]),
            BookmarkItem::Array(items) => {
                let offsets = items
                    .iter()
                    .flat_map(|item| self.item(item).to_le_bytes())
                    .collect::<Vec<_>>();
                self.record(TYPE_ARRAY | 1, &offsets)
            }
            BookmarkItem::Dict(pairs) => {
                let mut offsets = Vec::with_capacity(pairs.len() * 8);
                for (key, value) in pairs {
                    offsets.extend_from_slice(&self.item(key).to_le_bytes());
                    offsets.extend_from_slice(&self.item(value).to_le_bytes());
                }
                self.record(TYPE_DICT | 1, &offsets)
            }
            BookmarkItem::Uuid(uuid) => self.record(TYPE_UUID | 1, uuid.as_bytes()),
            BookmarkItem::Url(url) => self.record(TYPE_URL | URL_ABSOLUTE, url.as_bytes()),
            BookmarkItem::Null => self.record(TYPE_NULL | 1, &[]),
            BookmarkItem::Unknown { type_code, payload } => self.record(*type_code, payload),
        }
    }
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .ok_or(BookmarkError::Truncated)
}

fn utf8(payload: &[u8], offset: u32) -> Result<String> {
    String::from_utf8(payload.to_vec()).map_err(|_| BookmarkError::BadItem(offset))
}

// Number subtypes are CFNumberType values. Only width and float-ness matter.
fn number(payload: &[u8], subtype: u32) -> Option<BookmarkItem> {
    let is_float = matches!(subtype, 5 | 6 | 12 | 13 | 16);
    let item = match (is_float, payload.len()) {
        (true, 4) => BookmarkItem::Real(f64::from(f32::from_le_bytes(payload.try_into().ok()?))),
        (true, 8) => BookmarkItem::Real(f64::from_le_bytes(payload.try_into().ok()?)),
        (false, 1) => BookmarkItem::Integer(i64::from(payload[0] as i8)),
        (false, 2) => BookmarkItem::Integer(i64::from(i16::from_le_bytes(payload.try_into().ok()?))),
        (false, 4) => BookmarkItem::Integer(i64::from(i32::from_le_bytes(payload.try_into().ok()?))),
        (false, 8) => BookmarkItem::Integer(i64::from_le_bytes(payload.try_into().ok()?)),
        _ => return None,
    };

    Some(item)
}

/// Path that bookmark data resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Absolute path recorded by the bookmark.
    pub path: PathBuf,

    /// Recorded target no longer exists, or was replaced by another file.
    pub is_stale: bool,
}

/// Layer of indirection for bookmark handling.
pub trait BookmarkResolver {
    /// Resolve bookmark data into absolute path.
    fn resolve(&self, bookmark: &[u8]) -> Result<Resolved>;

    /// Create bookmark data for existing absolute path.
    fn create(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Bookmark handling through the native bookmark data layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct BookDataResolver;

impl BookmarkResolver for BookDataResolver {
    /// Resolve bookmark data into absolute path.
    ///
    /// The bookmark is stale if its path cannot be found anymore, or if the
    /// file found there has a different file identifier than recorded.
    ///
    /// # Errors
    ///
    /// - Return [`BookmarkError`] if bookmark data cannot be parsed or
    ///   lacks a path.
    fn resolve(&self, bookmark: &[u8]) -> Result<Resolved> {
        let bookmark = Bookmark::from_bytes(bookmark)?;
        let path = bookmark.path()?;
        let is_stale = match fs::symlink_metadata(&path) {
            Ok(metadata) => match (bookmark.file_id(), file_id(&metadata)) {
                (Some(recorded), Some(current)) => recorded != current,
                _ => false,
            },
            Err(_) => true,
        };

        Ok(Resolved { path, is_stale })
    }

    /// Create bookmark data for existing absolute path.
    ///
    /// # Errors
    ///
    /// - Return [`BookmarkError::RelativePath`] if path is not absolute.
    /// - Return [`BookmarkError::Unavailable`] if path cannot be inspected.
    /// - Return [`BookmarkError::NonUtf8Path`] if path is not valid UTF-8.
    #[instrument(skip(self), level = "debug")]
    fn create(&self, path: &Path) -> Result<Vec<u8>> {
        if !path.is_absolute() {
            return Err(BookmarkError::RelativePath(path.into()));
        }

        let metadata = fs::symlink_metadata(path).map_err(|err| BookmarkError::Unavailable {
            source: err,
            path: path.into(),
        })?;

        let mut names = Vec::new();
        for component in path.components() {
            if let Component::Normal(name) = component {
                let name = name
                    .to_str()
                    .ok_or_else(|| BookmarkError::NonUtf8Path(path.into()))?;
                names.push(name.to_owned());
            }
        }

        let mut bookmark = Bookmark::new();
        bookmark.insert(
            keys::PATH,
            BookmarkItem::Array(names.iter().cloned().map(BookmarkItem::String).collect()),
        );

        // INVARIANT: CNID path mirrors path components one to one.
        let mut ancestor = PathBuf::from("/");
        let mut cnids = Vec::with_capacity(names.len());
        for name in &names {
            ancestor.push(name);
            match fs::symlink_metadata(&ancestor).ok().as_ref().and_then(file_id) {
                Some(id) => cnids.push(BookmarkItem::Integer(id as i64)),
                None => break,
            }
        }
        if cnids.len() == names.len() {
            bookmark.insert(keys::CNID_PATH, BookmarkItem::Array(cnids));
        }

        let mut flags = 0;
        if metadata.is_file() {
            flags |= PROPERTY_REGULAR_FILE;
        }
        if metadata.is_dir() {
            flags |= PROPERTY_DIRECTORY;
        }
        if metadata.file_type().is_symlink() {
            flags |= PROPERTY_SYMLINK;
        }
        let mut properties = Vec::with_capacity(24);
        properties.extend_from_slice(&flags.to_le_bytes());
        properties.extend_from_slice(&PROPERTY_VALID_MASK.to_le_bytes());
        properties.extend_from_slice(&0u64.to_le_bytes());
        bookmark.insert(keys::FILE_PROPERTIES, BookmarkItem::Data(properties));

        if let Some(id) = file_id(&metadata) {
            bookmark.insert(keys::FILE_ID, BookmarkItem::Integer(id as i64));
        }
        bookmark.insert(keys::VOLUME_PATH, BookmarkItem::String("/".into()));
        bookmark.insert(keys::VOLUME_URL, BookmarkItem::Url("file:///".into()));
        bookmark.insert(keys::VOLUME_IS_ROOT, BookmarkItem::Bool(true));
        bookmark.insert(
            keys::CONTAINING_FOLDER,
            BookmarkItem::Integer(names.len() as i64 - 2),
        );
        if let Ok(user) = std::env::var("USER") {
            bookmark.insert(keys::USER_NAME, BookmarkItem::String(user));
        }
        bookmark.insert(keys::CREATION_OPTIONS, BookmarkItem::Integer(CREATION_OPTIONS));

        debug!("created bookmark for {:?}", path.display());
        Ok(bookmark.to_bytes())
    }
}

#[cfg(unix)]
fn file_id(metadata: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn file_id(_metadata: &Metadata) -> Option<u64> {
    None
}

/// Bookmark data error types.
#[derive(Debug, thiserror::Error)]
pub enum BookmarkError {
    /// Bookmark data ends before its layout says it should.
    #[error("bookmark data is truncated")]
    Truncated,

    /// Data does not start with bookmark magic.
    #[error("bookmark data has unknown magic {0:?}")]
    BadMagic([u8; 4]),

    /// Header size and total size are inconsistent.
    #[error("bookmark data has inconsistent header")]
    BadHeader,

    /// Item cannot be read at offset.
    #[error("bookmark item at offset {0} is malformed")]
    BadItem(u32),

    /// Bookmark records no path components.
    #[error("bookmark data does not record a path")]
    MissingPath,

    /// Path to bookmark is relative.
    #[error("cannot bookmark relative path {0:?}")]
    RelativePath(PathBuf),

    /// Path to bookmark cannot be inspected.
    #[error("cannot bookmark {:?}", path.display())]
    Unavailable {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Path to bookmark is not valid UTF-8.
    #[error("cannot bookmark non UTF-8 path {0:?}")]
    NonUtf8Path(PathBuf),
}

/// Friendly result alias :3
pub type Result<T, E = BookmarkError> = std::result::Result<T, E>;
