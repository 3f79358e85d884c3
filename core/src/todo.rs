//! To-do items and their identifiers.
//!
//! Items are schema-flexible documents: the client owns every field except the
//! identifier, which the store assigns on creation and which never changes.
//!
//! # Identifier Format
//!
//! Identifiers use the 12-byte object-id layout rendered as 24 lowercase hex
//! characters:
//!
//! ```text
//! ┌──────────────┬──────────────────┬─────────────┐
//! │ 4 bytes      │ 5 bytes          │ 3 bytes     │
//! │ unix seconds │ process-random   │ counter     │
//! └──────────────┴──────────────────┴─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use todo_stats_core::todo::TodoId;
//!
//! let id = TodoId::generate();
//! assert_eq!(id.as_str().len(), 24);
//! assert!(TodoId::is_valid(id.as_str()));
//! assert!(!TodoId::is_valid("not-an-id"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Name of the identifier field in item documents.
pub const ID_FIELD: &str = "_id";

/// Name of the completion flag in item documents.
pub const COMPLETED_FIELD: &str = "completed";

/// Client-supplied item fields.
pub type Document = Map<String, Value>;

/// Returned when a string is not a well-formed identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid todo id: {0:?}")]
pub struct InvalidTodoId(pub String);

/// Identifier of a to-do item (24 lowercase hex characters).
///
/// Parsing accepts either case and normalises to lowercase, so two spellings
/// of the same id compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TodoId(String);

impl TodoId {
    /// Length of the textual form.
    pub const LEN: usize = 24;

    /// Generate a fresh identifier.
    ///
    /// Identifiers generated by one process are unique: the trailing counter
    /// starts at a random value and increments per call.
    #[must_use]
    pub fn generate() -> Self {
        static PROCESS_RANDOM: OnceLock<[u8; 5]> = OnceLock::new();
        static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

        let process_random = PROCESS_RANDOM.get_or_init(rand::random);
        let counter = COUNTER
            .get_or_init(|| AtomicU32::new(rand::random()))
            .fetch_add(1, Ordering::Relaxed);

        // Truncation is the format: the timestamp wraps in 2106.
        #[allow(clippy::cast_possible_truncation)]
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs()) as u32;

        let mut bytes = [0_u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process_random);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);

        Self(bytes.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    /// Parse and normalise an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTodoId`] unless `raw` is exactly 24 hex characters.
    pub fn parse(raw: &str) -> Result<Self, InvalidTodoId> {
        if Self::is_valid(raw) {
            Ok(Self(raw.to_ascii_lowercase()))
        } else {
            Err(InvalidTodoId(raw.to_string()))
        }
    }

    /// Whether `raw` is a well-formed identifier.
    #[must_use]
    pub fn is_valid(raw: &str) -> bool {
        raw.len() == Self::LEN && raw.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// The textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TodoId {
    type Err = InvalidTodoId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TodoId {
    type Error = InvalidTodoId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TodoId> for String {
    fn from(id: TodoId) -> Self {
        id.0
    }
}

/// A stored to-do item: identifier plus client fields.
///
/// Serializes as a flat document with the identifier under `_id`:
///
/// ```json
/// { "_id": "65a1f0c2e4b0a1b2c3d4e5f6", "title": "x", "completed": false }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    /// Store-assigned identifier.
    #[serde(rename = "_id")]
    pub id: TodoId,

    /// Client-owned fields (never contains `_id`).
    #[serde(flatten)]
    pub fields: Document,
}

impl Todo {
    /// Create an item from an identifier and client fields.
    ///
    /// Any `_id` entry in `fields` is discarded; the identifier is `id`.
    #[must_use]
    pub fn new(id: TodoId, mut fields: Document) -> Self {
        fields.remove(ID_FIELD);
        Self { id, fields }
    }

    /// Whether the item's `completed` flag is exactly `true`.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        marks_completed(&self.fields)
    }

    /// Shallow-merge `patch` into the item: top-level keys in `patch`
    /// replace existing keys, other keys are kept.
    pub fn merge(&mut self, patch: Document) {
        for (key, value) in patch {
            if key != ID_FIELD {
                self.fields.insert(key, value);
            }
        }
    }

    /// The item as a flat JSON document including `_id`.
    #[must_use]
    pub fn into_document(self) -> Document {
        let mut document = Document::new();
        document.insert(ID_FIELD.to_string(), Value::String(self.id.into()));
        document.extend(self.fields);
        document
    }
}

/// Whether `fields` sets `completed` to exactly the boolean `true`.
///
/// Truthy non-booleans (`1`, `"true"`, `{}`) do not count.
#[must_use]
pub fn marks_completed(fields: &Document) -> bool {
    fields.get(COMPLETED_FIELD) == Some(&Value::Bool(true))
}
