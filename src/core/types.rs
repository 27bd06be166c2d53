//! Item data model (spec §3). `DocId`/`FieldValue`/`Document` are kept from
//! the teacher's `core::types` and generalized: `FieldValue` grows every
//! field type spec §3 names, and `Item`/`ItemType` add the primary-key
//! extractor, index descriptor list, and directory path template a real
//! item type declares.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u64);

impl DocId {
    pub fn new(id: u64) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        DocId(id)
    }
}

/// Every field type named in spec §3: "unicode string, signed/unsigned
/// integer (64-bit), IEEE-754 float/double, boolean, byte string, timestamp
/// (milliseconds since epoch), UUID/ULID string, optional of any above,
/// ordered sequence of any above, nested structured value".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Uuid(String),
    Optional(Option<Box<FieldValue>>),
    List(Vec<FieldValue>),
    Struct(HashMap<String, FieldValue>),

    /// Kept for teacher-compatibility in remaining analysis code; equivalent
    /// to `Float`.
    Number(f64),
    /// Kept for teacher-compatibility; equivalent to `Timestamp`.
    Date(DateTime<Utc>),
}

impl FieldValue {
    /// Convert to a `tuple::Element` for key encoding, where the value is
    /// one that can appear in an ordered index key. Compound/optional/list
    /// values are not directly indexable as a single element; callers index
    /// their scalar leaves instead.
    pub fn to_tuple_element(&self) -> Option<crate::tuple::Element> {
        use crate::tuple::Element;
        match self {
            FieldValue::Text(s) => Some(Element::Text(s.clone())),
            FieldValue::Int(i) => Some(Element::Int(*i)),
            FieldValue::UInt(u) => Some(Element::UInt(*u)),
            FieldValue::Float(f) | FieldValue::Number(f) => Some(Element::Float(*f)),
            FieldValue::Boolean(b) => Some(Element::Bool(*b)),
            FieldValue::Bytes(b) => Some(Element::Bytes(b.clone())),
            FieldValue::Timestamp(t) | FieldValue::Date(t) => {
                Some(Element::Int(t.timestamp_millis()))
            }
            FieldValue::Uuid(s) => Some(Element::Text(s.clone())),
            FieldValue::Optional(inner) => inner.as_ref().and_then(|v| v.to_tuple_element()),
            FieldValue::List(_) | FieldValue::Struct(_) => None,
        }
    }
}

/// A record: a primary key plus named fields, as produced by decoding an
/// item's envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: DocId,
    pub item_type: String,
    pub fields: HashMap<String, FieldValue>,
}

impl Item {
    pub fn new(id: DocId, item_type: impl Into<String>) -> Self {
        Item { id, item_type: item_type.into(), fields: HashMap::new() }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Kept as a teacher-compatible alias for older analysis/ index code that
/// still speaks in terms of `Document`.
pub type Document = Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteRule {
    Cascade,
    Deny,
    Nullify,
    NoAction,
}

/// `@Relationship(target, deleteRule)` declaration (spec §4.4).
#[derive(Debug, Clone)]
pub struct RelationshipDescriptor {
    pub field: String,
    pub target_type: String,
    pub delete_rule: DeleteRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Scalar,
    Range,
    Relationship,
    Aggregate,
    Rank,
    Leaderboard,
    Bitmap,
    FullText,
    Vector,
    Graph,
}

/// One index a declared item type carries.
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    pub name: String,
    pub kind: IndexKind,
    pub fields: Vec<String>,
    pub unique: bool,
}

/// A directory path component: either a literal segment or one resolved
/// from a field value at write time (per-tenant/per-shard partitioning).
#[derive(Debug, Clone)]
pub enum PathComponent {
    Literal(String),
    Field(String),
}

/// An item type's full declaration: primary-key extraction, its indexes,
/// and its directory path template.
#[derive(Debug, Clone)]
pub struct ItemType {
    pub name: String,
    pub primary_key_fields: Vec<String>,
    pub indexes: Vec<IndexDescriptor>,
    pub relationships: Vec<RelationshipDescriptor>,
    pub path_template: Vec<PathComponent>,
}

impl ItemType {
    pub fn primary_key(&self, item: &Item) -> Vec<crate::tuple::Element> {
        self.primary_key_fields
            .iter()
            .filter_map(|f| item.get_field(f).and_then(|v| v.to_tuple_element()))
            .collect()
    }

    pub fn directory_path(&self, item: &Item) -> Vec<String> {
        self.path_template
            .iter()
            .map(|c| match c {
                PathComponent::Literal(s) => s.clone(),
                PathComponent::Field(name) => item
                    .get_field(name)
                    .map(|v| format!("{v:?}"))
                    .unwrap_or_default(),
            })
            .collect()
    }
}
