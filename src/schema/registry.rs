//! Item type registry (spec §3/§8): declares each item type's primary key,
//! indexes, relationships, and directory path template, plus the schema's
//! format version for migration gating. Grounded on the teacher's
//! `schema::schema::SchemaWithAnalyzer` builder idiom, generalized from a
//! flat field list to full item type declarations.

use std::collections::HashMap;

use crate::core::types::ItemType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormatVersion(pub u32);

pub struct SchemaRegistry {
    types: HashMap<String, ItemType>,
    version: FormatVersion,
}

impl SchemaRegistry {
    pub fn new(version: FormatVersion) -> Self {
        SchemaRegistry { types: HashMap::new(), version }
    }

    pub fn register(&mut self, item_type: ItemType) {
        self.types.insert(item_type.name.clone(), item_type);
    }

    pub fn get(&self, name: &str) -> Option<&ItemType> {
        self.types.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(|s| s.as_str())
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn set_version(&mut self, version: FormatVersion) {
        self.version = version;
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(FormatVersion(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IndexDescriptor, IndexKind};

    #[test]
    fn registered_type_is_retrievable_by_name() {
        let mut registry = SchemaRegistry::default();
        registry.register(ItemType {
            name: "article".into(),
            primary_key_fields: vec!["id".into()],
            indexes: vec![IndexDescriptor { name: "by_title".into(), kind: IndexKind::Scalar, fields: vec!["title".into()], unique: false }],
            relationships: vec![],
            path_template: vec![],
        });
        assert!(registry.get("article").is_some());
        assert!(registry.get("missing").is_none());
    }
}
