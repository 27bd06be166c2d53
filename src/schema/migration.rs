//! Schema migrations (spec §8): lightweight field add/remove/rename
//! applied in place, or a custom stage for anything that needs real
//! transformation logic. A `MigrationPlan` chains stages and the online
//! indexer (see `online::build`) drives them item-by-item.

use std::sync::Arc;

use crate::core::error::Result;
use crate::core::types::{FieldValue, Item};
use crate::schema::registry::FormatVersion;

pub enum MigrationKind {
    AddField { field: String, default: FieldValue },
    RemoveField(String),
    RenameField { from: String, to: String },
    Custom(Arc<dyn Fn(&mut Item) -> Result<()> + Send + Sync>),
}

pub struct Migration {
    pub from_version: FormatVersion,
    pub to_version: FormatVersion,
    pub description: String,
    pub kind: MigrationKind,
}

impl Migration {
    pub fn add_field(from: u32, to: u32, field: impl Into<String>, default: FieldValue) -> Self {
        let field = field.into();
        Migration {
            from_version: FormatVersion(from),
            to_version: FormatVersion(to),
            description: format!("add field {field}"),
            kind: MigrationKind::AddField { field, default },
        }
    }

    pub fn remove_field(from: u32, to: u32, field: impl Into<String>) -> Self {
        let field = field.into();
        Migration {
            from_version: FormatVersion(from),
            to_version: FormatVersion(to),
            description: format!("remove field {field}"),
            kind: MigrationKind::RemoveField(field),
        }
    }

    pub fn rename_field(from: u32, to: u32, old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        let (old_name, new_name) = (old_name.into(), new_name.into());
        Migration {
            from_version: FormatVersion(from),
            to_version: FormatVersion(to),
            description: format!("rename field {old_name} to {new_name}"),
            kind: MigrationKind::RenameField { from: old_name, to: new_name },
        }
    }

    pub fn apply(&self, item: &mut Item) -> Result<()> {
        match &self.kind {
            MigrationKind::AddField { field, default } => {
                item.fields.entry(field.clone()).or_insert_with(|| default.clone());
            }
            MigrationKind::RemoveField(field) => {
                item.fields.remove(field);
            }
            MigrationKind::RenameField { from, to } => {
                if let Some(value) = item.fields.remove(from) {
                    item.fields.insert(to.clone(), value);
                }
            }
            MigrationKind::Custom(f) => f(item)?,
        }
        Ok(())
    }
}

/// An ordered sequence of migrations, applied from an item's stored format
/// version up to the registry's current version.
pub struct MigrationPlan {
    stages: Vec<Migration>,
}

impl MigrationPlan {
    pub fn new() -> Self {
        MigrationPlan { stages: Vec::new() }
    }

    pub fn push(mut self, migration: Migration) -> Self {
        self.stages.push(migration);
        self
    }

    pub fn apply_from(&self, item: &mut Item, from: FormatVersion) -> Result<FormatVersion> {
        let mut version = from;
        for stage in &self.stages {
            if stage.from_version == version {
                stage.apply(item)?;
                version = stage.to_version;
            }
        }
        Ok(version)
    }
}

impl Default for MigrationPlan {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;

    #[test]
    fn add_field_migration_inserts_default_when_missing() {
        let plan = MigrationPlan::new().push(Migration {
            from_version: FormatVersion(1),
            to_version: FormatVersion(2),
            description: "add status".into(),
            kind: MigrationKind::AddField { field: "status".into(), default: FieldValue::Text("active".into()) },
        });
        let mut item = Item::new(DocId::new(1), "user");
        let to = plan.apply_from(&mut item, FormatVersion(1)).unwrap();
        assert_eq!(to, FormatVersion(2));
        assert_eq!(item.get_field("status"), Some(&FieldValue::Text("active".into())));
    }

    #[test]
    fn rename_field_migration_moves_value() {
        let plan = MigrationPlan::new().push(Migration {
            from_version: FormatVersion(1),
            to_version: FormatVersion(2),
            description: "rename".into(),
            kind: MigrationKind::RenameField { from: "name".into(), to: "full_name".into() },
        });
        let mut item = Item::new(DocId::new(1), "user").with_field("name", FieldValue::Text("Ada".into()));
        plan.apply_from(&mut item, FormatVersion(1)).unwrap();
        assert!(item.get_field("name").is_none());
        assert_eq!(item.get_field("full_name"), Some(&FieldValue::Text("Ada".into())));
    }
}
