pub mod core;
pub mod exec;
pub mod fulltext;
pub mod graph;
pub mod index;
pub mod kv;
pub mod online;
pub mod query;
pub mod schema;
pub mod storage;
pub mod tuple;
pub mod vector;

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                                  RECORDKEEP ARCHITECTURE                                     │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────────── kv ───────────────────────────────────────────────┐
│  trait Database / Transaction           // ordered transactional key-value substrate        │
│  struct KeySelector, RangeOptions       // FDB-style range reads                             │
│  enum Mutation                          // Set/Clear/Add/Min/Max/ByteMin/ByteMax/Versionstamp│
│  memory::MemoryDatabase                 // in-process reference implementation for tests     │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────────── tuple ─────────────────────────────────────────────┐
│  enum Element                           // order-preserving typed key component              │
│  struct Tuple                           // Vec<Element>, pack()/unpack()                     │
│  struct Subspace                        // directory-style key prefixing                     │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────────── core ─────────────────────────────────────────────┐
│  struct Item / ItemType / FieldValue    // record/item data model (spec §3)                  │
│  struct Config / TransactionConfig      // tunables: batch sizes, cost constants, caps        │
│  enum Error                             // thiserror-derived, retriable vs terminal           │
│  struct TransactionRunner               // retry-with-backoff transaction driver              │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────────── storage ────────────────────────────────────────────┐
│  struct Subspaces                       // R/I/T/M/B/O top-level subspace roots               │
│  split::{write, read}                   // large-value splitting across chunk keys            │
│  struct TransformingSerializer          // compression + optional envelope encryption         │
│  struct ItemStore                       // CRUD + index fan-out + security delegate            │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────────── schema ────────────────────────────────────────────┐
│  schema evolution / migration: format versioning, backward-compatible field changes           │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────────── index ────────────────────────────────────────────┐
│  trait IndexMaintainer                  // index_keys/update/validate_entries/state           │
│  ScalarMaintainer, RelationshipMaintainer, AggregateMaintainer, RankMaintainer,               │
│  LeaderboardMaintainer, BitmapMaintainer                                                       │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────────── fulltext ──────────────────────────────────────────┐
│  BM25 / BlockMax-WAND full-text index family                                                  │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────────── vector ────────────────────────────────────────────┐
│  HNSW graph, product quantization, multi-vector indexing                                      │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────────── graph ────────────────────────────────────────────┐
│  GraphMaintainer                        // Layout: adjacency / tripleStore / hexastore          │
│  Pattern                                // bound/unbound triple-pattern query builder          │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────────── online ───────────────────────────────────────────┐
│  build::{sequential, multi_target, mutual, index_from_index}  // online index build strategies│
│  AdaptiveThrottle                       // batch-size throttling under contention             │
│  scrub                                  // validate_entries + idempotent repair                │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────────── query ────────────────────────────────────────────┐
│  ast::{Query, Predicate}                // query AST over any indexed field                   │
│  cost::{Cost, Statistics}                // per-operator cost formulas                         │
│  memo::Memo, rules                      // Cascades-style memo + transformation/impl rules     │
│  cache::PlanCache                       // plan cache keyed by (predicate, sort, projection)   │
│  fusion::FusionStrategy                  // weighted-sum/RRF/max/geometric-mean result fusion   │
│  in_predicate                            // IN-Join vs IN-Union vs scan-and-filter             │
│  plan::PhysicalPlan                      // optimizer output, consumed by exec                 │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────────── exec ─────────────────────────────────────────────┐
│  operators::execute                     // Scan/Filter/Sort/Limit/InJoin/InUnion/Fusion        │
│  cursor::Cursor                         // stop-reason paging contract over a materialized plan│
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
