//! The item store (spec §4.2): CRUD over typed items, index fan-out, and
//! the security delegate hook. Grounded on the teacher's
//! `core::database::Database::{add_document, delete_document,
//! with_transaction}` CRUD-plus-transaction shape and
//! `writer::index_writer::IndexWriter`'s "one write, fan out to index"
//! idiom.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::config::TransactionConfig;
use crate::core::error::{Error, Result};
use crate::core::transaction::TransactionRunner;
use crate::core::types::{DeleteRule, IndexKind, Item, ItemType};
use crate::index::maintainer::MaintainerRegistry;
use crate::kv::{Database, Transaction};
use crate::storage::serializer::TransformingSerializer;
use crate::storage::split;
use crate::storage::subspaces::Subspaces;
use crate::tuple::{Element, Tuple};

/// Authentication context, read from a task-local by the embedding
/// application and threaded explicitly here rather than via ambient state
/// (spec §4.2: "Authentication context is read from a task-local").
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub principal: Option<String>,
    pub is_admin: bool,
}

/// Observes every store operation and may deny it. The core never invents
/// policy, only routes calls through this delegate (spec §4.2).
#[async_trait]
pub trait SecurityDelegate: Send + Sync {
    async fn evaluate_get(&self, ctx: &AuthContext, item_type: &str, id: &Tuple) -> Result<()>;

    async fn evaluate_list(
        &self,
        ctx: &AuthContext,
        item_type: &str,
        limit: Option<usize>,
        offset: Option<usize>,
        order_by: Option<&str>,
    ) -> Result<()>;

    async fn evaluate_create(&self, ctx: &AuthContext, item: &Item) -> Result<()>;

    async fn evaluate_update(&self, ctx: &AuthContext, old: &Item, new: &Item) -> Result<()>;

    async fn evaluate_delete(&self, ctx: &AuthContext, item: &Item) -> Result<()>;
}

/// Default delegate: denies nothing. Embedding applications supply their
/// own policy.
pub struct AllowAll;

#[async_trait]
impl SecurityDelegate for AllowAll {
    async fn evaluate_get(&self, _ctx: &AuthContext, _item_type: &str, _id: &Tuple) -> Result<()> {
        Ok(())
    }
    async fn evaluate_list(
        &self,
        _ctx: &AuthContext,
        _item_type: &str,
        _limit: Option<usize>,
        _offset: Option<usize>,
        _order_by: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }
    async fn evaluate_create(&self, _ctx: &AuthContext, _item: &Item) -> Result<()> {
        Ok(())
    }
    async fn evaluate_update(&self, _ctx: &AuthContext, _old: &Item, _new: &Item) -> Result<()> {
        Ok(())
    }
    async fn evaluate_delete(&self, _ctx: &AuthContext, _item: &Item) -> Result<()> {
        Ok(())
    }
}

pub struct DeleteRequest {
    pub item_type: String,
    pub primary_key: Tuple,
}

pub struct ItemStore {
    #[allow(dead_code)]
    db: Arc<dyn Database>,
    runner: Arc<TransactionRunner>,
    subspaces: Subspaces,
    serializer: TransformingSerializer,
    split_threshold: usize,
    types: RwLock<HashMap<String, ItemType>>,
    maintainers: RwLock<HashMap<String, MaintainerRegistry>>,
    security: Arc<dyn SecurityDelegate>,
}

impl ItemStore {
    pub fn new(
        db: Arc<dyn Database>,
        runner: Arc<TransactionRunner>,
        serializer: TransformingSerializer,
        split_threshold: usize,
        security: Arc<dyn SecurityDelegate>,
    ) -> Self {
        ItemStore {
            db,
            runner,
            subspaces: Subspaces::new(),
            serializer,
            split_threshold,
            types: RwLock::new(HashMap::new()),
            maintainers: RwLock::new(HashMap::new()),
            security,
        }
    }

    pub fn register_type(&self, item_type: ItemType, registry: MaintainerRegistry) {
        let name = item_type.name.clone();
        self.types.write().insert(name.clone(), item_type);
        self.maintainers.write().insert(name, registry);
    }

    fn item_key(&self, type_name: &str, primary_key: &Tuple) -> Vec<u8> {
        self.subspaces.items_for_type(type_name).key(primary_key)
    }

    fn doc_key(&self, type_name: &str, doc_id: u64) -> Vec<u8> {
        self.subspaces.doc_index_for(type_name).key(&Tuple::new().push(Element::UInt(doc_id)))
    }

    async fn read_primary_key_for_doc(
        &self,
        tx: &dyn Transaction,
        type_name: &str,
        doc_id: u64,
    ) -> Result<Option<Tuple>> {
        match tx.get(&self.doc_key(type_name, doc_id)).await? {
            Some(packed) => Ok(Some(Tuple::unpack(&packed).map_err(Error::internal)?)),
            None => Ok(None),
        }
    }

    fn encode_item(&self, item: &Item) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(item)?;
        self.serializer.serialize(&bytes)
    }

    fn decode_item(&self, bytes: &[u8]) -> Result<Item> {
        let plain = self.serializer.deserialize(bytes)?;
        Ok(bincode::deserialize(&plain)?)
    }

    async fn read_item(
        &self,
        tx: &dyn Transaction,
        type_name: &str,
        primary_key: &Tuple,
    ) -> Result<Option<Item>> {
        let key = self.item_key(type_name, primary_key);
        match split::read(tx, &key).await? {
            Some(bytes) => Ok(Some(self.decode_item(&bytes)?)),
            None => Ok(None),
        }
    }

    /// `get(type, id) -> item?` (spec §4.2).
    pub async fn get(
        &self,
        ctx: &AuthContext,
        type_name: &str,
        primary_key: Tuple,
    ) -> Result<Option<Item>> {
        let config = TransactionConfig::default();
        let type_name = type_name.to_string();
        let primary_key_clone = primary_key.clone();
        let item = self
            .runner
            .run(&config, move |tx| {
                let type_name = type_name.clone();
                let primary_key = primary_key_clone.clone();
                Box::pin(async move {
                    let key = self.item_key_pub(&type_name, &primary_key);
                    match split::read(tx, &key).await? {
                        Some(bytes) => Ok(Some(self.decode_item(&bytes)?)),
                        None => Ok(None),
                    }
                })
            })
            .await?;

        if let Some(item) = &item {
            self.security.evaluate_get(ctx, &item.item_type, &primary_key).await?;
        }
        Ok(item)
    }

    /// `get` by the doc id an index maintainer surfaced rather than by
    /// primary key — every `IndexMaintainer` keys its entries on `Item::id`
    /// (spec §4.3's doc-id-keyed layouts), while `ItemStore` itself keys
    /// items by their primary key tuple, so resolving an index hit back to
    /// an item goes through the `by_doc_id` lookup maintained alongside
    /// every insert/delete.
    pub async fn get_by_doc_id(&self, ctx: &AuthContext, type_name: &str, doc_id: u64) -> Result<Option<Item>> {
        let config = TransactionConfig::default();
        let type_name = type_name.to_string();
        let item = self
            .runner
            .run(&config, move |tx| {
                let type_name = type_name.clone();
                Box::pin(async move {
                    match self.read_primary_key_for_doc(tx, &type_name, doc_id).await? {
                        Some(primary_key) => self.read_item(tx, &type_name, &primary_key).await,
                        None => Ok(None),
                    }
                })
            })
            .await?;

        if let Some(item) = &item {
            let primary_key = self.primary_key_of(item)?;
            self.security.evaluate_get(ctx, &item.item_type, &primary_key).await?;
        }
        Ok(item)
    }

    fn item_key_pub(&self, type_name: &str, primary_key: &Tuple) -> Vec<u8> {
        self.item_key(type_name, primary_key)
    }

    /// `read_item` by doc id, inside a transaction the caller already
    /// holds — the same resolution `get_by_doc_id` does, but without
    /// opening its own `run` (used by the query executor's leaf source,
    /// which is handed a transaction by `exec::operators::execute`).
    pub async fn read_item_by_doc_id(&self, tx: &dyn Transaction, type_name: &str, doc_id: u64) -> Result<Option<Item>> {
        match self.read_primary_key_for_doc(tx, type_name, doc_id).await? {
            Some(primary_key) => self.read_item(tx, type_name, &primary_key).await,
            None => Ok(None),
        }
    }

    /// Every doc id currently registered for `type_name`, via the
    /// `by_doc_id` subspace — the leaf source's `SeqScan` resolution.
    pub async fn doc_ids_for_type(&self, tx: &dyn Transaction, type_name: &str) -> Result<Vec<u64>> {
        let sub = self.subspaces.doc_index_for(type_name);
        let rows = tx
            .get_range(
                crate::kv::KeySelector::first_greater_or_equal(sub.raw_prefix().to_vec()),
                crate::kv::KeySelector::first_greater_or_equal(sub.range_end()),
                crate::kv::RangeOptions::default(),
            )
            .await?;
        let prefix_len = sub.raw_prefix().len();
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let tuple = Tuple::unpack(&row.key[prefix_len..]).map_err(Error::internal)?;
            if let Some(Element::UInt(id)) = tuple.0.first() {
                ids.push(*id);
            }
        }
        Ok(ids)
    }

    /// Looks up a registered maintainer by `(type_name, index_name)` for
    /// the query executor's leaf source.
    pub fn maintainer(&self, type_name: &str, index_name: &str) -> Option<Arc<dyn crate::index::maintainer::IndexMaintainer>> {
        self.maintainers.read().get(type_name).and_then(|registry| registry.get(index_name))
    }

    /// `executeBatch(inserts, deletes)` (spec §4.2): within one transaction,
    /// evaluate policy, write/clear item values, and fan out to every index
    /// maintainer.
    pub async fn execute_batch(
        &self,
        ctx: &AuthContext,
        inserts: Vec<Item>,
        deletes: Vec<DeleteRequest>,
    ) -> Result<()> {
        let config = TransactionConfig::default();

        self.runner
            .run(&config, move |tx| {
                let inserts = inserts.clone();
                let deletes_for_body: Vec<DeleteRequest> = deletes
                    .iter()
                    .map(|d| DeleteRequest { item_type: d.item_type.clone(), primary_key: d.primary_key.clone() })
                    .collect();
                Box::pin(async move {
                    let mut visited = std::collections::HashSet::new();
                    for del in &deletes_for_body {
                        self.delete_item(ctx, tx, &del.item_type, &del.primary_key, &mut visited).await?;
                    }

                    for item in &inserts {
                        let old = self.read_item(tx, &item.item_type, &self.primary_key_of(item)?).await?;
                        match &old {
                            Some(old) => self.security.evaluate_update(ctx, old, item).await?,
                            None => self.security.evaluate_create(ctx, item).await?,
                        }

                        let primary_key = self.primary_key_of(item)?;
                        let key = self.item_key(&item.item_type, &primary_key);
                        let encoded = self.encode_item(item)?;
                        split::write(tx, &key, &encoded, self.split_threshold, self.split_threshold)?;
                        tx.set(&self.doc_key(&item.item_type, item.id.value()), &primary_key.pack())?;

                        if let Some(registry) = self.maintainers.read().get(&item.item_type) {
                            registry.update_all(old.as_ref(), Some(item), tx).await?;
                        }
                    }

                    Ok::<(), Error>(())
                })
            })
            .await
    }

    /// `(childType, indexName, field, deleteRule)` for every relationship
    /// registered against `target_type` — the reverse of how relationships
    /// are declared (on the child type, pointing at the target).
    fn referencing_relationships(&self, target_type: &str) -> Vec<(String, String, String, DeleteRule)> {
        let types = self.types.read();
        let mut out = Vec::new();
        for (child_type_name, item_type) in types.iter() {
            for rel in &item_type.relationships {
                if rel.target_type != target_type {
                    continue;
                }
                if let Some(desc) =
                    item_type.indexes.iter().find(|d| d.kind == IndexKind::Relationship && d.fields == [rel.field.clone()])
                {
                    out.push((child_type_name.clone(), desc.name.clone(), rel.field.clone(), rel.delete_rule));
                }
            }
        }
        out
    }

    /// Enforces every relationship's `DeleteRule` against `deleted`, inside
    /// the same transaction as the delete itself (spec §4.4). `visited`
    /// guards cascades against revisiting an item already deleted earlier
    /// in the same batch, in case of a relationship cycle.
    async fn enforce_delete_rules(
        &self,
        ctx: &AuthContext,
        tx: &dyn Transaction,
        type_name: &str,
        deleted: &Item,
        visited: &mut std::collections::HashSet<(String, u64)>,
    ) -> Result<()> {
        let target = Element::UInt(deleted.id.value());
        for (child_type, index_name, field, rule) in self.referencing_relationships(type_name) {
            let maintainer = {
                let maintainers = self.maintainers.read();
                maintainers.get(&child_type).and_then(|reg| reg.get(&index_name))
            };
            let Some(maintainer) = maintainer else { continue };
            let Some(rel) = maintainer.as_relationship() else { continue };
            let children = rel.referencing_items(tx, &target).await?;
            if children.is_empty() {
                continue;
            }

            match rule {
                DeleteRule::NoAction => {}
                DeleteRule::Deny => {
                    return Err(Error::invalid_argument(format!(
                        "cannot delete {type_name} id {}: referenced by {} {child_type} item(s)",
                        deleted.id.value(),
                        children.len()
                    )));
                }
                DeleteRule::Cascade => {
                    for child_id in children {
                        self.delete_item_by_doc_id(ctx, tx, &child_type, child_id, visited).await?;
                    }
                }
                DeleteRule::Nullify => {
                    for child_id in children {
                        self.nullify_field(ctx, tx, &child_type, &field, child_id).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Deletes one item, enforcing delete rules of whatever references it
    /// first. Entry point for both a batch's own delete requests and
    /// cascades triggered by `enforce_delete_rules`.
    fn delete_item<'a>(
        &'a self,
        ctx: &'a AuthContext,
        tx: &'a dyn Transaction,
        type_name: &'a str,
        primary_key: &'a Tuple,
        visited: &'a mut std::collections::HashSet<(String, u64)>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let Some(old) = self.read_item(tx, type_name, primary_key).await? else { return Ok(()) };
            if !visited.insert((type_name.to_string(), old.id.value())) {
                return Ok(());
            }
            self.security.evaluate_delete(ctx, &old).await?;
            self.enforce_delete_rules(ctx, tx, type_name, &old, visited).await?;

            let key = self.item_key(type_name, primary_key);
            tx.clear_range(&key, &{
                let mut end = key.clone();
                end.push(0xFF);
                end
            })?;
            tx.clear(&self.doc_key(type_name, old.id.value()))?;
            if let Some(registry) = self.maintainers.read().get(type_name) {
                registry.update_all(Some(&old), None, tx).await?;
            }
            Ok(())
        })
    }

    /// Same as `delete_item`, but starting from a doc id surfaced by
    /// `RelationshipMaintainer::referencing_items` rather than a primary
    /// key, resolved via the item store's doc-id index.
    fn delete_item_by_doc_id<'a>(
        &'a self,
        ctx: &'a AuthContext,
        tx: &'a dyn Transaction,
        type_name: &'a str,
        doc_id: u64,
        visited: &'a mut std::collections::HashSet<(String, u64)>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let Some(primary_key) = self.read_primary_key_for_doc(tx, type_name, doc_id).await? else { return Ok(()) };
            self.delete_item(ctx, tx, type_name, &primary_key, visited).await
        })
    }

    /// Clears `field` on the item identified by `doc_id` without touching
    /// the rest of the record (spec §4.4's `nullify` delete rule).
    async fn nullify_field(
        &self,
        ctx: &AuthContext,
        tx: &dyn Transaction,
        type_name: &str,
        field: &str,
        doc_id: u64,
    ) -> Result<()> {
        let Some(primary_key) = self.read_primary_key_for_doc(tx, type_name, doc_id).await? else { return Ok(()) };
        let Some(old) = self.read_item(tx, type_name, &primary_key).await? else { return Ok(()) };
        let mut new = old.clone();
        new.fields.remove(field);
        self.security.evaluate_update(ctx, &old, &new).await?;

        let key = self.item_key(type_name, &primary_key);
        let encoded = self.encode_item(&new)?;
        split::write(tx, &key, &encoded, self.split_threshold, self.split_threshold)?;
        if let Some(registry) = self.maintainers.read().get(type_name) {
            registry.update_all(Some(&old), Some(&new), tx).await?;
        }
        Ok(())
    }

    fn primary_key_of(&self, item: &Item) -> Result<Tuple> {
        let types = self.types.read();
        let item_type = types
            .get(&item.item_type)
            .ok_or_else(|| Error::not_found(format!("unregistered item type {}", item.item_type)))?;
        Ok(Tuple::from_elements(item_type.primary_key(item)))
    }

    /// `clearAll(type)` (spec §4.2): requires admin; clears the item
    /// subtree and all index subtrees for that type.
    pub async fn clear_all(&self, ctx: &AuthContext, type_name: &str) -> Result<()> {
        if !ctx.is_admin {
            return Err(Error::access_denied("clearAll requires admin"));
        }
        let config = TransactionConfig::default();
        let type_name = type_name.to_string();
        self.runner
            .run(&config, move |tx| {
                let type_name = type_name.clone();
                Box::pin(async move {
                    let sub = self.subspaces.items_for_type(&type_name);
                    tx.clear_range(sub.raw_prefix(), &sub.range_end())?;

                    if let Some(registry) = self.maintainers.read().get(&type_name) {
                        for maintainer in registry.all() {
                            let index_sub = self.subspaces.index(maintainer.name());
                            tx.clear_range(index_sub.raw_prefix(), &index_sub.range_end())?;
                        }
                    }
                    Ok::<(), Error>(())
                })
            })
            .await
    }

    /// Called by the query layer before executing a compiled fetch plan
    /// (spec §4.2 `evaluateList`).
    pub async fn authorize_list(
        &self,
        ctx: &AuthContext,
        item_type: &str,
        limit: Option<usize>,
        offset: Option<usize>,
        order_by: Option<&str>,
    ) -> Result<()> {
        self.security.evaluate_list(ctx, item_type, limit, offset, order_by).await
    }

    pub fn subspaces(&self) -> &Subspaces {
        &self.subspaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::read_version_cache::ReadVersionCache;
    use crate::core::types::{DocId, FieldValue, IndexDescriptor, PathComponent, RelationshipDescriptor};
    use crate::index::relationship::RelationshipMaintainer;
    use crate::kv::memory::MemoryDatabase;

    fn post_type() -> ItemType {
        ItemType {
            name: "post".to_string(),
            primary_key_fields: vec!["id".to_string()],
            indexes: Vec::new(),
            relationships: Vec::new(),
            path_template: vec![PathComponent::Literal("post".to_string())],
        }
    }

    fn comment_type(delete_rule: DeleteRule) -> ItemType {
        ItemType {
            name: "comment".to_string(),
            primary_key_fields: vec!["id".to_string()],
            indexes: vec![IndexDescriptor {
                name: "comment_post".to_string(),
                kind: IndexKind::Relationship,
                fields: vec!["post_id".to_string()],
                unique: false,
            }],
            relationships: vec![RelationshipDescriptor {
                field: "post_id".to_string(),
                target_type: "post".to_string(),
                delete_rule,
            }],
            path_template: vec![PathComponent::Literal("comment".to_string())],
        }
    }

    fn post(id: u64) -> Item {
        Item::new(DocId::new(id), "post").with_field("id", FieldValue::UInt(id))
    }

    fn comment(id: u64, post_id: u64) -> Item {
        Item::new(DocId::new(id), "comment")
            .with_field("id", FieldValue::UInt(id))
            .with_field("post_id", FieldValue::UInt(post_id))
    }

    async fn store_with(delete_rule: DeleteRule) -> ItemStore {
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let runner = Arc::new(TransactionRunner::new(db.clone(), Arc::new(ReadVersionCache::new(64))));
        let store = ItemStore::new(db, runner, TransformingSerializer::plain(), 64 * 1024, Arc::new(AllowAll));

        store.register_type(post_type(), MaintainerRegistry::new());

        let mut comment_registry = MaintainerRegistry::new();
        comment_registry.register(Arc::new(RelationshipMaintainer::new("comment_post", "post_id", delete_rule)));
        store.register_type(comment_type(delete_rule), comment_registry);

        store.execute_batch(&AuthContext::default(), vec![post(1), comment(10, 1), comment(11, 1)], Vec::new()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn cascade_deletes_referencing_children() {
        let store = store_with(DeleteRule::Cascade).await;
        let ctx = AuthContext::default();

        store
            .execute_batch(&ctx, Vec::new(), vec![DeleteRequest { item_type: "post".to_string(), primary_key: Tuple::new().push(Element::UInt(1)) }])
            .await
            .unwrap();

        assert!(store.get(&ctx, "post", Tuple::new().push(Element::UInt(1))).await.unwrap().is_none());
        assert!(store.get_by_doc_id(&ctx, "comment", 10).await.unwrap().is_none());
        assert!(store.get_by_doc_id(&ctx, "comment", 11).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deny_rejects_delete_while_children_exist() {
        let store = store_with(DeleteRule::Deny).await;
        let ctx = AuthContext::default();

        let result = store
            .execute_batch(&ctx, Vec::new(), vec![DeleteRequest { item_type: "post".to_string(), primary_key: Tuple::new().push(Element::UInt(1)) }])
            .await;

        assert!(result.is_err());
        assert!(store.get(&ctx, "post", Tuple::new().push(Element::UInt(1))).await.unwrap().is_some());
        assert!(store.get_by_doc_id(&ctx, "comment", 10).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn nullify_clears_the_referencing_field_and_keeps_the_child() {
        let store = store_with(DeleteRule::Nullify).await;
        let ctx = AuthContext::default();

        store
            .execute_batch(&ctx, Vec::new(), vec![DeleteRequest { item_type: "post".to_string(), primary_key: Tuple::new().push(Element::UInt(1)) }])
            .await
            .unwrap();

        let remaining = store.get_by_doc_id(&ctx, "comment", 10).await.unwrap().unwrap();
        assert!(remaining.get_field("post_id").is_none());
    }

    #[tokio::test]
    async fn no_action_deletes_the_target_and_leaves_children_dangling() {
        let store = store_with(DeleteRule::NoAction).await;
        let ctx = AuthContext::default();

        store
            .execute_batch(&ctx, Vec::new(), vec![DeleteRequest { item_type: "post".to_string(), primary_key: Tuple::new().push(Element::UInt(1)) }])
            .await
            .unwrap();

        assert!(store.get(&ctx, "post", Tuple::new().push(Element::UInt(1))).await.unwrap().is_none());
        let dangling = store.get_by_doc_id(&ctx, "comment", 10).await.unwrap().unwrap();
        assert_eq!(dangling.get_field("post_id"), Some(&FieldValue::UInt(1)));
    }
}
