//! Collection and index definitions for the CloudMusic document store.
//!
//! Collections:
//! - `user_profiles` - validated by a `$jsonSchema` rule
//! - `playlists` - no validator
//!
//! Indexes:
//! - `user_profiles { "user_id": 1 }` - unique, one profile per relational user
//! - `user_profiles { "preferences.preferred_genres": 1 }` - genre lookups
//! - `playlists { "owner_id": 1 }` - playlists by owner
//! - `playlists { "tags": 1 }` - playlists by tag

use std::sync::LazyLock;

use mongodb::bson::{doc, Bson, Document};
use regex::Regex;

use crate::error::BootstrapError;

pub const USER_PROFILES: &str = "user_profiles";
pub const PLAYLISTS: &str = "playlists";

static COLLECTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^$\x00]+$").expect("collection name regex"));
static FIELD_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^$.\x00][^.\x00]*$").expect("field segment regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub validator: Option<Document>,
}

impl CollectionSpec {
    pub fn new(name: &str) -> Self {
        CollectionSpec {
            name: name.to_string(),
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Document) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn check(&self) -> Result<(), BootstrapError> {
        check_collection_name(&self.name)
    }
}

/// A secondary index: ordered key spec plus uniqueness.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub collection: String,
    pub keys: Document,
    pub unique: bool,
}

impl IndexSpec {
    pub fn ascending(collection: &str, field: &str) -> Self {
        let mut keys = Document::new();
        keys.insert(field, 1);
        IndexSpec {
            collection: collection.to_string(),
            keys,
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Default server-side name, e.g. `user_id_1` or `a_1_b_-1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, dir)| format!("{}_{}", field, direction_label(dir)))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn check(&self) -> Result<(), BootstrapError> {
        check_collection_name(&self.collection)?;

        if self.keys.is_empty() {
            return Err(BootstrapError::InvalidDefinition(format!(
                "index on `{}` has no keys",
                self.collection
            )));
        }

        for (field, dir) in self.keys.iter() {
            check_field_path(field)?;
            if !matches!(direction(dir), Some(1 | -1)) {
                return Err(BootstrapError::InvalidDefinition(format!(
                    "index field `{}` has unsupported direction {}",
                    field, dir
                )));
            }
        }

        Ok(())
    }
}

fn direction(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

fn direction_label(value: &Bson) -> String {
    match direction(value) {
        Some(d) => d.to_string(),
        None => match value {
            Bson::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

/// Key patterns are equal only field-by-field in order; `1`, `1_i64` and
/// `1.0` are the same direction.
pub fn same_key_pattern(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|((fa, da), (fb, db))| {
            fa == fb
                && match (direction(da), direction(db)) {
                    (Some(x), Some(y)) => x == y,
                    _ => da == db,
                }
        })
}

/// Rewrites numeric directions as `Int32`, keeping field order.
pub fn normalize_keys(keys: Document) -> Document {
    keys.into_iter()
        .map(|(field, dir)| {
            let dir = match direction(&dir).and_then(|d| i32::try_from(d).ok()) {
                Some(d) => Bson::Int32(d),
                None => dir,
            };
            (field, dir)
        })
        .collect()
}

pub fn check_collection_name(name: &str) -> Result<(), BootstrapError> {
    if !COLLECTION_NAME.is_match(name) || name.starts_with("system.") {
        return Err(BootstrapError::InvalidDefinition(format!(
            "invalid collection name `{}`",
            name
        )));
    }
    Ok(())
}

pub fn check_field_path(path: &str) -> Result<(), BootstrapError> {
    if path.split('.').all(|seg| FIELD_SEGMENT.is_match(seg)) {
        Ok(())
    } else {
        Err(BootstrapError::InvalidDefinition(format!(
            "invalid field path `{}`",
            path
        )))
    }
}

pub fn user_profiles_validator() -> Document {
    doc! {
        "$jsonSchema": {
            "bsonType": "object",
            "required": ["user_id", "preferences"],
            "properties": {
                "user_id": { "bsonType": "int", "description": "Matches MySQL user_id" },
                "preferences": {
                    "bsonType": "object",
                    "required": ["preferred_genres", "autoplay_enabled"],
                    "properties": {
                        "preferred_genres": { "bsonType": "array", "items": { "bsonType": "string" } },
                        "autoplay_enabled": { "bsonType": "bool" }
                    }
                },
                "listening_history_summary": { "bsonType": "array" }
            }
        }
    }
}

pub fn user_profiles() -> CollectionSpec {
    CollectionSpec::new(USER_PROFILES).with_validator(user_profiles_validator())
}

pub fn playlists() -> CollectionSpec {
    CollectionSpec::new(PLAYLISTS)
}

pub fn user_profiles_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::ascending(USER_PROFILES, "user_id").unique(),
        IndexSpec::ascending(USER_PROFILES, "preferences.preferred_genres"),
    ]
}

pub fn playlists_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::ascending(PLAYLISTS, "owner_id"),
        IndexSpec::ascending(PLAYLISTS, "tags"),
    ]
}
