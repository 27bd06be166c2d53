//! End-to-end smoke test of the public surface: register an item type,
//! write a few items through `ItemStore`, then plan and execute a query
//! over them with the Cascades optimizer and the physical executor.

use std::sync::Arc;

use async_trait::async_trait;
use recordkeep::core::read_version_cache::ReadVersionCache;
use recordkeep::core::transaction::TransactionRunner;
use recordkeep::core::types::{DocId, FieldValue, Item, ItemType};
use recordkeep::exec::{execute, LeafSource};
use recordkeep::index::maintainer::MaintainerRegistry;
use recordkeep::index::scalar::ScalarMaintainer;
use recordkeep::kv::memory::MemoryDatabase;
use recordkeep::kv::{Database, Transaction};
use recordkeep::query::ast::{Predicate, Query};
use recordkeep::query::memo::{AvailableIndex, PlanningContext};
use recordkeep::query::{optimize, OptimizerLimits, Statistics};
use recordkeep::storage::serializer::TransformingSerializer;
use recordkeep::storage::store::{AllowAll, AuthContext, ItemStore};

struct SeqScanLeaves {
    rows: Vec<Item>,
}

#[async_trait]
impl LeafSource for SeqScanLeaves {
    async fn fetch(&self, _tx: &dyn Transaction, _plan: &recordkeep::query::plan::PhysicalPlan) -> recordkeep::core::error::Result<Vec<Item>> {
        Ok(self.rows.clone())
    }

    async fn fetch_scored(
        &self,
        _tx: &dyn Transaction,
        _plan: &recordkeep::query::plan::PhysicalPlan,
        _probe: &recordkeep::query::ast::VectorProbe,
    ) -> recordkeep::core::error::Result<Vec<(Item, f64)>> {
        Ok(self.rows.iter().cloned().map(|i| (i, 1.0)).collect())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
    let runner = Arc::new(TransactionRunner::new(db.clone(), Arc::new(ReadVersionCache::new(64))));
    let store = ItemStore::new(db.clone(), runner, TransformingSerializer::plain(), 64 * 1024, Arc::new(AllowAll));

    let widget_type = ItemType {
        name: "widget".to_string(),
        primary_key_fields: vec!["sku".to_string()],
        indexes: Vec::new(),
        relationships: Vec::new(),
        path_template: Vec::new(),
    };
    let mut registry = MaintainerRegistry::new();
    registry.register(Arc::new(ScalarMaintainer::new("by_sku", "sku", true)));
    store.register_type(widget_type, registry);

    let ctx = AuthContext::default();
    let skus = ["A1", "A2", "A3"];
    let rows: Vec<Item> = skus
        .iter()
        .enumerate()
        .map(|(i, sku)| {
            Item::new(DocId::new(i as u64 + 1), "widget")
                .with_field("sku", FieldValue::Text(sku.to_string()))
                .with_field("price", FieldValue::Int(100 + i as i64))
        })
        .collect();
    store.execute_batch(&ctx, rows.clone(), Vec::new()).await?;

    let predicate = Predicate::Eq { field: "sku".to_string(), value: FieldValue::Text("A2".to_string()) };
    let query = Query::new("widget", predicate);
    let stats = Statistics { total_rows: rows.len() as u64, distinct_values: [("sku".to_string(), rows.len() as u64)].into_iter().collect() };
    let indexes = vec![AvailableIndex { name: "by_sku".to_string(), fields: vec!["sku".to_string()] }];
    let planning_ctx = PlanningContext { statistics: &stats, indexes: &indexes };
    let limits = OptimizerLimits { max_plan_enumerations: 1000, max_rule_applications: 5000 };
    let plan = optimize(&query, &planning_ctx, limits)?;
    println!("planned: {}", plan.describe());

    let leaves = SeqScanLeaves { rows };
    let kv_db = MemoryDatabase::new();
    let tx = kv_db.create_transaction().await?;
    let matched = execute(&plan, tx.as_ref(), &leaves).await?;
    for item in matched {
        println!("matched sku={:?} price={:?}", item.get_field("sku"), item.get_field("price"));
    }

    Ok(())
}
