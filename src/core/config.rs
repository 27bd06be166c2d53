//! Process-wide tunables. Loading these from a file or environment is out of
//! scope (spec.md §1); callers construct `Config` directly and pass it to
//! `Container`/`Store` constructors.

#[derive(Debug, Clone)]
pub struct Config {
    /// Default transaction configuration used when a caller does not supply
    /// one explicitly to `run`.
    pub transaction: TransactionConfig,

    /// Capacity of the process-wide read-version cache (§4.1, §5).
    pub read_version_cache_capacity: usize,

    /// Plan cache capacity and entry TTL (§4.9).
    pub plan_cache_capacity: usize,
    pub plan_cache_ttl_secs: u64,

    /// Online indexer batch-size bounds (§4.11).
    pub online_min_batch_size: usize,
    pub online_max_batch_size: usize,
    pub online_initial_batch_size: usize,

    /// Large-value split threshold and envelope byte limits (§3).
    pub split_threshold_bytes: usize,

    /// BM25 defaults (§4.5).
    pub bm25_k1: f32,
    pub bm25_b: f32,

    /// BlockMax-WAND defaults (§4.5).
    pub bmw_block_size: usize,
    pub bmw_min_docs_for_bmw: usize,
    pub bmw_epsilon: f64,

    /// HNSW defaults (§4.6).
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,

    /// Query planner limits (§4.9).
    pub max_plan_enumerations: usize,
    pub max_rule_applications: usize,
    pub plan_timeout_ms: u64,

    /// Transaction-size batching policy (§5).
    pub transaction_soft_limit_bytes: usize,
    pub transaction_warn_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Batch,
    Default,
    System,
}

#[derive(Debug, Clone, Copy)]
pub enum CachePolicy {
    Server,
    Cached,
    Stale { max_age_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub id: Option<String>,
    pub log_all: bool,
    pub server_tracing: bool,
    pub tags: Vec<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        TracingConfig { id: None, log_all: false, server_tracing: false, tags: Vec::new() }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionConfig {
    pub priority: Priority,
    pub timeout_ms: u64,
    pub retry_limit: u32,
    pub max_retry_delay_ms: u64,
    pub cache_policy: CachePolicy,
    pub tracing: TracingConfig,
    pub report_conflicting_keys: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        TransactionConfig {
            priority: Priority::Default,
            timeout_ms: 5_000,
            retry_limit: 10,
            max_retry_delay_ms: 1_000,
            cache_policy: CachePolicy::Server,
            tracing: TracingConfig::default(),
            report_conflicting_keys: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            transaction: TransactionConfig::default(),
            read_version_cache_capacity: 1_024,
            plan_cache_capacity: 512,
            plan_cache_ttl_secs: 300,
            online_min_batch_size: 16,
            online_max_batch_size: 4_096,
            online_initial_batch_size: 64,
            split_threshold_bytes: 90 * 1024,
            bm25_k1: 1.2,
            bm25_b: 0.75,
            bmw_block_size: 64,
            bmw_min_docs_for_bmw: 1_000,
            bmw_epsilon: 1e-4,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
            max_plan_enumerations: 10_000,
            max_rule_applications: 50_000,
            plan_timeout_ms: 2_000,
            transaction_soft_limit_bytes: 9 * 1024 * 1024,
            transaction_warn_bytes: 5 * 1024 * 1024,
        }
    }
}
