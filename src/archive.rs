// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keyed archive codec.
//!
//! Shared file list stores are binary property lists written by
//! `NSKeyedArchiver`. A __keyed archive__ flattens an object graph into a
//! single `$objects` table where every object refers to its children by
//! UID, i.e., by index into that table. Index zero always holds the string
//! `"$null"` and stands in for nil. Each non-primitive object carries a
//! `$class` UID pointing at a class record that names its class, and the
//! archive root is found through `$top.root`.
//!
//! # Allowed Classes
//!
//! Decoding never instantiates arbitrary classes. The object graph is
//! reduced to the closed set of [`Node`] variants, and any class record
//! outside of the following allow-list is rejected outright:
//!
//! - `NSDictionary`, `NSMutableDictionary`
//! - `NSArray`, `NSMutableArray`
//! - `NSString`, `NSMutableString`
//! - `NSData`, `NSMutableData`
//! - `NSNumber` (normally stored inline as a primitive)
//! - `NSUUID`, `NSDate`, `NSNull`
//!
//! # Encoding Conventions
//!
//! Encoding always produces immutable class names, places the root object
//! at UID 1, and uniques both class records and equal strings the way
//! `NSKeyedArchiver` itself does. Dictionary keys are emitted in sorted
//! order, so encoding is deterministic.

use plist::{Dictionary, Integer, Uid, Value};
use std::{
    collections::{BTreeMap, HashMap},
    io::Cursor,
};
use uuid::Uuid;

/// Name of the archiver recorded in every keyed archive.
pub const ARCHIVER: &str = "NSKeyedArchiver";

/// Archive format version written by the system archiver.
pub const ARCHIVE_VERSION: i64 = 100_000;

const NULL_MARKER: &str = "$null";

// Decoded nodes allowed per object table entry. Archivers may share
// objects such as empty containers, but never enough to multiply the
// graph.
const EXPANSION_FACTOR: usize = 16;
const MIN_NODE_BUDGET: usize = 4096;

/// String keyed dictionary node.
pub type Dict = BTreeMap<String, Node>;

/// Node of a decoded keyed archive object graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Nil reference or `NSNull` instance.
    Null,

    /// Boolean `NSNumber`.
    Bool(bool),

    /// Integral `NSNumber`.
    Integer(i64),

    /// Floating point `NSNumber`.
    Real(f64),

    /// `NSString` instance.
    String(String),

    /// `NSData` instance.
    Data(Vec<u8>),

    /// `NSUUID` instance.
    Uuid(Uuid),

    /// `NSDate` instance as seconds since 2001-01-01 00:00:00 UTC.
    Date(f64),

    /// `NSArray` instance.
    Array(Vec<Node>),

    /// `NSDictionary` instance whose keys are all strings.
    Dict(Dict),
}

impl Node {
    /// Construct empty dictionary node.
    pub fn empty_dict() -> Self {
        Self::Dict(Dict::new())
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Self::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Self::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(integer) => Some(*integer),
            Self::Bool(boolean) => Some(i64::from(*boolean)),
            _ => None,
        }
    }

    /// Interpret node as a boolean.
    ///
    /// Property lists written by different system versions store flags
    /// either as booleans or as integers, so both are accepted.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(boolean) => Some(*boolean),
            Self::Integer(integer) => Some(*integer != 0),
            _ => None,
        }
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for Node {
    fn from(value: Vec<u8>) -> Self {
        Self::Data(value)
    }
}

impl From<Dict> for Node {
    fn from(value: Dict) -> Self {
        Self::Dict(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Self::Array(value)
    }
}

/// Decode keyed archive into object graph.
///
/// # Errors
///
/// - Return [`DecodeError::Plist`] if data is not a property list.
/// - Return [`DecodeError::NotKeyedArchive`] if property list lacks keyed
///   archive layout.
/// - Return [`DecodeError::RootNotDictionary`] if root object is not a
///   dictionary.
/// - Return [`DecodeError::DisallowedClass`] if any object belongs to a
///   class outside the allow-list.
/// - Return [`DecodeError::DanglingReference`], [`DecodeError::Cycle`], or
///   [`DecodeError::Malformed`] if object table is inconsistent.
pub fn decode(bytes: &[u8]) -> Result<Node> {
    let value = Value::from_reader(Cursor::new(bytes))?;
    let archive = value.as_dictionary().ok_or(DecodeError::NotKeyedArchive)?;

    // INVARIANT: Only accept archives produced by the keyed archiver.
    match archive.get("$archiver").and_then(Value::as_string) {
        Some(ARCHIVER) => {}
        _ => return Err(DecodeError::NotKeyedArchive),
    }

    let objects = archive
        .get("$objects")
        .and_then(Value::as_array)
        .ok_or(DecodeError::NotKeyedArchive)?;
    let root = archive
        .get("$top")
        .and_then(Value::as_dictionary)
        .and_then(|top| top.get("root"))
        .and_then(Value::as_uid)
        .ok_or(DecodeError::NotKeyedArchive)?;

    let mut decoder = Decoder {
        objects,
        visiting: Vec::new(),
        budget: objects
            .len()
            .saturating_mul(EXPANSION_FACTOR)
            .max(MIN_NODE_BUDGET),
    };
    match decoder.node(root.get())? {
        node @ Node::Dict(_) => Ok(node),
        _ => Err(DecodeError::RootNotDictionary),
    }
}

/// Encode object graph into keyed archive.
///
/// # Errors
///
/// - Return [`EncodeError`] if binary property list serialization fails.
pub fn encode(root: &Node) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = Encoder {
        objects: vec![Value::String(NULL_MARKER.into())],
        classes: HashMap::new(),
        strings: HashMap::new(),
    };
    let root = encoder.node(root);

    let mut top = Dictionary::new();
    top.insert("root".into(), Value::Uid(Uid::new(root)));

    let mut archive = Dictionary::new();
    archive.insert("$version".into(), Value::Integer(Integer::from(ARCHIVE_VERSION)));
    archive.insert("$archiver".into(), Value::String(ARCHIVER.into()));
    archive.insert("$top".into(), Value::Dictionary(top));
    archive.insert("$objects".into(), Value::Array(encoder.objects));

    let mut bytes = Vec::new();
    Value::Dictionary(archive).to_writer_binary(&mut bytes)?;

    Ok(bytes)
}

struct Decoder<'a> {
    objects: &'a [Value],
    visiting: Vec<u64>,
    budget: usize,
}

impl<'a> Decoder<'a> {
    fn node(&mut self, uid: u64) -> Result<Node> {
        // INVARIANT: Shared references are expanded at every use, so bound
        // the total work instead of trusting the graph to stay small.
        self.budget = self.budget.checked_sub(1).ok_or(DecodeError::Malformed {
            uid,
            reason: "object graph expands far beyond its object table",
        })?;

        if uid == 0 {
            return Ok(Node::Null);
        }

        let object = usize::try_from(uid)
            .ok()
            .and_then(|index| self.objects.get(index))
            .ok_or(DecodeError::DanglingReference(uid))?;

        // INVARIANT: Object graphs of shared file lists are trees, so any
        // revisit along the current path is a cycle.
        if self.visiting.contains(&uid) {
            return Err(DecodeError::Cycle(uid));
        }

        self.visiting.push(uid);
        let node = self.object(uid, object);
        self.visiting.pop();

        node
    }

    fn object(&mut self, uid: u64, object: &'a Value) -> Result<Node> {
        match object {
            Value::String(string) if string == NULL_MARKER => Ok(Node::Null),
            Value::String(string) => Ok(Node::String(string.clone())),
            Value::Boolean(boolean) => Ok(Node::Bool(*boolean)),
            Value::Integer(integer) => integer
                .as_signed()
                .map(Node::Integer)
                .ok_or(DecodeError::Malformed {
                    uid,
                    reason: "integer does not fit into 64 bits",
                }),
            Value::Real(real) => Ok(Node::Real(*real)),
            Value::Data(data) => Ok(Node::Data(data.clone())),
            Value::Dictionary(instance) => self.instance(uid, instance),
            _ => Err(DecodeError::Malformed {
                uid,
                reason: "unexpected primitive in object table",
            }),
        }
    }

    fn instance(&mut self, uid: u64, instance: &'a Dictionary) -> Result<Node> {
        let class_uid = instance
            .get("$class")
            .and_then(Value::as_uid)
            .ok_or(DecodeError::Malformed {
                uid,
                reason: "instance lacks class reference",
            })?;
        let class = self.class_name(class_uid.get())?;

        match class {
            "NSDictionary" | "NSMutableDictionary" => {
                let keys = uid_list(uid, instance, "NS.keys")?;
                let values = uid_list(uid, instance, "NS.objects")?;
                if keys.len() != values.len() {
                    return Err(DecodeError::Malformed {
                        uid,
                        reason: "dictionary key and value counts differ",
                    });
                }

                let mut dict = Dict::new();
                for (key, value) in keys.into_iter().zip(values) {
                    let key = match self.node(key)? {
                        Node::String(key) => key,
                        _ => {
                            return Err(DecodeError::Malformed {
                                uid,
                                reason: "dictionary key is not a string",
                            })
                        }
                    };
                    dict.insert(key, self.node(value)?);
                }

                Ok(Node::Dict(dict))
            }
            "NSArray" | "NSMutableArray" => {
                let items = uid_list(uid, instance, "NS.objects")?;
                let mut array = Vec::with_capacity(items.len());
                for item in items {
                    array.push(self.node(item)?);
                }

                Ok(Node::Array(array))
            }
            "NSString" | "NSMutableString" => instance
                .get("NS.string")
                .and_then(Value::as_string)
                .map(|string| Node::String(string.into()))
                .ok_or(DecodeError::Malformed {
                    uid,
                    reason: "string instance lacks NS.string",
                }),
            "NSData" | "NSMutableData" => instance
                .get("NS.data")
                .and_then(Value::as_data)
                .map(|data| Node::Data(data.to_vec()))
                .ok_or(DecodeError::Malformed {
                    uid,
                    reason: "data instance lacks NS.data",
                }),
            "NSUUID" => instance
                .get("NS.uuidbytes")
                .and_then(Value::as_data)
                .and_then(|bytes| Uuid::from_slice(bytes).ok())
                .map(Node::Uuid)
                .ok_or(DecodeError::Malformed {
                    uid,
                    reason: "uuid instance lacks 16 byte NS.uuidbytes",
                }),
            "NSDate" => instance
                .get("NS.time")
                .and_then(|time| time.as_real().or_else(|| time.as_signed_integer().map(|t| t as f64)))
                .map(Node::Date)
                .ok_or(DecodeError::Malformed {
                    uid,
                    reason: "date instance lacks NS.time",
                }),
            "NSNull" => Ok(Node::Null),
            "NSNumber" => Err(DecodeError::Malformed {
                uid,
                reason: "boxed number instance is not stored inline",
            }),
            other => Err(DecodeError::DisallowedClass(other.into())),
        }
    }

    fn class_name(&self, uid: u64) -> Result<&'a str> {
        usize::try_from(uid)
            .ok()
            .and_then(|index| self.objects.get(index))
            .and_then(Value::as_dictionary)
            .and_then(|class| class.get("$classname"))
            .and_then(Value::as_string)
            .ok_or(DecodeError::Malformed {
                uid,
                reason: "class record lacks $classname",
            })
    }
}

fn uid_list(uid: u64, instance: &Dictionary, key: &'static str) -> Result<Vec<u64>> {
    let malformed = DecodeError::Malformed {
        uid,
        reason: "container references are not a list of UIDs",
    };
    let list = match instance.get(key) {
        Some(list) => list.as_array().ok_or(malformed)?,
        None => return Ok(Vec::new()),
    };

    list.iter()
        .map(|item| {
            item.as_uid().map(|uid| uid.get()).ok_or(DecodeError::Malformed {
                uid,
                reason: "container references are not a list of UIDs",
            })
        })
        .collect()
}

struct Encoder {
    objects: Vec<Value>,
    classes: HashMap<&'static str, u64>,
    strings: HashMap<String, u64>,
}

impl Encoder {
    fn push(&mut self, value: Value) -> u64 {
        self.objects.push(value);
        (self.objects.len() - 1) as u64
    }

    // Containers take their slot before their children so that the root
    // always lands at UID 1.
    fn reserve(&mut self) -> u64 {
        self.push(Value::String(NULL_MARKER.into()))
    }

    fn fill(&mut self, slot: u64, mut instance: Dictionary, class: &'static str) {
        let class = self.class(class);
        instance.insert("$class".into(), Value::Uid(Uid::new(class)));
        self.objects[slot as usize] = Value::Dictionary(instance);
    }

    fn class(&mut self, name: &'static str) -> u64 {
        if let Some(uid) = self.classes.get(name) {
            return *uid;
        }

        let mut record = Dictionary::new();
        record.insert(
            "$classes".into(),
            Value::Array(vec![Value::String(name.into()), Value::String("NSObject".into())]),
        );
        record.insert("$classname".into(), Value::String(name.into()));
        let uid = self.push(Value::Dictionary(record));
        self.classes.insert(name, uid);

        uid
    }

    fn node(&mut self, node: &Node) -> u64 {
        match node {
            Node::Null => 0,
            Node::Bool(boolean) => self.push(Value::Boolean(*boolean)),
            Node::Integer(integer) => self.push(Value::Integer(Integer::from(*integer))),
            Node::Real(real) => self.push(Value::Real(*real)),
            Node::String(string) => {
                if let Some(uid) = self.strings.get(string) {
                    return *uid;
                }
                let uid = self.push(Value::String(string.clone()));
                self.strings.insert(string.clone(), uid);
                uid
            }
            Node::Data(data) => self.push(Value::Data(data.clone())),
            Node::Uuid(uuid) => {
                let slot = self.reserve();
                let mut instance = Dictionary::new();
                instance.insert("NS.uuidbytes".into(), Value::Data(uuid.as_bytes().to_vec()));
                self.fill(slot, instance, "NSUUID");
                slot
            }
            Node::Date(time) => {
                let slot = self.reserve();
                let mut instance = Dictionary::new();
                instance.insert("NS.time".into(), Value::Real(*time));
                self.fill(slot, instance, "NSDate");
                slot
            }
            Node::Array(items) => {
                let slot = self.reserve();
                let objects = items
                    .iter()
                    .map(|item| Value::Uid(Uid::new(self.node(item))))
                    .collect();
                let mut instance = Dictionary::new();
                instance.insert("NS.objects".into(), Value::Array(objects));
                self.fill(slot, instance, "NSArray");
                slot
            }
            Node::Dict(dict) => {
                let slot = self.reserve();
                let mut keys = Vec::with_capacity(dict.len());
                let mut objects = Vec::with_capacity(dict.len());
                for (key, value) in dict {
                    keys.push(Value::Uid(Uid::new(self.node(&Node::String(key.clone())))));
                    objects.push(Value::Uid(Uid::new(self.node(value))));
                }
                let mut instance = Dictionary::new();
                instance.insert("NS.keys".into(), Value::Array(keys));
                instance.insert("NS.objects".into(), Value::Array(objects));
                self.fill(slot, instance, "NSDictionary");
                slot
            }
        }
    }
}

/// Keyed archive decoding error types.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Data is not a readable property list.
    #[error("failed to parse property list")]
    Plist(#[from] plist::Error),

    /// Property list does not have keyed archive layout.
    #[error("property list is not a keyed archive")]
    NotKeyedArchive,

    /// Root object of archive is not a dictionary.
    #[error("archive root object is not a dictionary")]
    RootNotDictionary,

    /// Archive contains instance of class outside the allow-list.
    #[error("archive contains instance of disallowed class {0:?}")]
    DisallowedClass(String),

    /// UID points past the end of the object table.
    #[error("archive object {0} is referenced but does not exist")]
    DanglingReference(u64),

    /// Object graph refers back to one of its own ancestors.
    #[error("archive object {0} is part of a reference cycle")]
    Cycle(u64),

    /// Object exists but does not have the expected shape.
    #[error("archive object {uid} is malformed: {reason}")]
    Malformed { uid: u64, reason: &'static str },
}

/// Keyed archive encoding failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to serialize keyed archive")]
pub struct EncodeError(#[from] plist::Error);

/// Friendly result alias :3
pub type Result<T, E = DecodeError> = std::result::Result<T, E>;
