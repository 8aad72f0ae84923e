//! Caller-supplied values carried in `context` and `metrics`.
//!
//! A [`Field`] is a loosely typed tree, close to `serde_json::Value`, with three
//! additions that callers hand to a logger in practice: file references,
//! opaque resource handles, and shared nodes. Shared nodes can point back at
//! their ancestors, so every walk over a `Field` must be depth-bounded.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Nested key/value mapping used for `context` and `metrics`
pub type Fields = BTreeMap<String, Field>;

/// Replaces any value nested beyond the allowed depth
pub const DEPTH_SENTINEL: &str = "[MAX_DEPTH_REACHED]";

/// Replaces opaque resource handles
pub const RESOURCE_PLACEHOLDER: &str = "[RESOURCE]";

/// Replaces values that cannot be read (e.g. a poisoned shared node)
pub const UNSUPPORTED_PLACEHOLDER: &str = "[UNSUPPORTED]";

/// Hard ceiling on nesting for any walk over a `Field`, including serialization.
pub const MAX_NESTING_DEPTH: usize = 64;

/// A value inside a log entry's context or metrics
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    List(Vec<Field>),
    Map(Fields),
    /// A file the caller wants to mention without inlining it
    File(FileRef),
    /// An opaque handle (socket, stream, lock guard...) described by its kind
    Resource(String),
    /// A node shared with other structures; may form cycles
    Shared(SharedField),
}

impl Field {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Field::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Field::Int(i) => Some(*i as f64),
            Field::UInt(u) => Some(*u as f64),
            Field::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Look up a key if this field is a map
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Convert to a plain JSON value (depth-bounded)
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Reference to a file on disk
#[derive(Debug, Clone, PartialEq)]
pub struct FileRef {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub mime: Option<String>,
}

impl FileRef {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            mime: None,
        }
    }

    /// Build a reference from the file's metadata on disk
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        Ok(Self::new(path, metadata.len()))
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// The final path component, or the whole path when there is none
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

/// A reference-counted, mutable node. Cloning shares the node.
#[derive(Clone)]
pub struct SharedField(Arc<Mutex<Field>>);

impl SharedField {
    pub fn new(field: Field) -> Self {
        Self(Arc::new(Mutex::new(field)))
    }

    /// Replace the node's value
    pub fn set(&self, field: Field) {
        let mut guard = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = field;
    }

    /// Clone the current value out of the node. `None` if the lock is poisoned.
    ///
    /// The clone is shallow for nested shared nodes, so taking a snapshot of a
    /// cyclic structure is cheap and never recurses.
    pub fn snapshot(&self) -> Option<Field> {
        self.0.lock().ok().map(|guard| guard.clone())
    }
}

impl fmt::Debug for SharedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedField({:p})", Arc::as_ptr(&self.0))
    }
}

impl PartialEq for SharedField {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Bounded {
            field: self,
            depth: 0,
        }
        .serialize(serializer)
    }
}

/// Serializes a field while tracking depth, so cyclic input cannot blow the stack.
struct Bounded<'a> {
    field: &'a Field,
    depth: usize,
}

impl Bounded<'_> {
    fn child<'b>(&self, field: &'b Field) -> Bounded<'b> {
        Bounded {
            field,
            depth: self.depth + 1,
        }
    }
}

impl Serialize for Bounded<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.depth > MAX_NESTING_DEPTH {
            return serializer.serialize_str(DEPTH_SENTINEL);
        }

        match self.field {
            Field::Null => serializer.serialize_unit(),
            Field::Bool(b) => serializer.serialize_bool(*b),
            Field::Int(i) => serializer.serialize_i64(*i),
            Field::UInt(u) => serializer.serialize_u64(*u),
            Field::Float(f) => serializer.serialize_f64(*f),
            Field::Str(s) => serializer.serialize_str(s),
            Field::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&self.child(item))?;
                }
                seq.end()
            }
            Field::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, &self.child(value))?;
                }
                out.end()
            }
            Field::File(file) => {
                let mut out = serializer.serialize_map(Some(4))?;
                out.serialize_entry("type", "file")?;
                out.serialize_entry("name", &file.name())?;
                out.serialize_entry("size_bytes", &file.size_bytes)?;
                out.serialize_entry("mime", &file.mime)?;
                out.end()
            }
            Field::Resource(_) => serializer.serialize_str(RESOURCE_PLACEHOLDER),
            Field::Shared(shared) => match shared.snapshot() {
                Some(inner) => self.child(&inner).serialize(serializer),
                None => serializer.serialize_str(UNSUPPORTED_PLACEHOLDER),
            },
        }
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Str(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Str(value)
    }
}

impl From<bool> for Field {
    fn from(value: bool) -> Self {
        Field::Bool(value)
    }
}

impl From<i32> for Field {
    fn from(value: i32) -> Self {
        Field::Int(value as i64)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Int(value)
    }
}

impl From<u16> for Field {
    fn from(value: u16) -> Self {
        Field::UInt(value as u64)
    }
}

impl From<u32> for Field {
    fn from(value: u32) -> Self {
        Field::UInt(value as u64)
    }
}

impl From<u64> for Field {
    fn from(value: u64) -> Self {
        Field::UInt(value)
    }
}

impl From<usize> for Field {
    fn from(value: usize) -> Self {
        Field::UInt(value as u64)
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Float(value)
    }
}

impl From<Vec<Field>> for Field {
    fn from(value: Vec<Field>) -> Self {
        Field::List(value)
    }
}

impl From<Fields> for Field {
    fn from(value: Fields) -> Self {
        Field::Map(value)
    }
}

impl From<FileRef> for Field {
    fn from(value: FileRef) -> Self {
        Field::File(value)
    }
}

impl From<SharedField> for Field {
    fn from(value: SharedField) -> Self {
        Field::Shared(value)
    }
}

impl<T: Into<Field>> From<Option<T>> for Field {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Field::Null)
    }
}

impl From<serde_json::Value> for Field {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Field::Null,
            Value::Bool(b) => Field::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Field::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Field::UInt(u)
                } else {
                    Field::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => Field::Str(s),
            Value::Array(items) => Field::List(items.into_iter().map(Field::from).collect()),
            Value::Object(map) => Field::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

/// Build a `Fields` map from a JSON object.
///
/// Non-object values are stored under the single key `"value"`.
pub fn fields_from_json(value: serde_json::Value) -> Fields {
    match Field::from(value) {
        Field::Map(map) => map,
        Field::Null => Fields::new(),
        other => Fields::from([("value".to_string(), other)]),
    }
}
