//! The transaction runner (spec §4.1). Generalizes the teacher's
//! `core::transaction::{Transaction, TransactionManager}` read/write-set +
//! two-phase-commit shape and `core::database::Database::with_transaction`
//! retry-closure idiom into `run<T>(config, body)`: a retry loop around the
//! KV engine's own transactions, with exponential backoff, cache-policy
//! read-version reuse, pre-commit checks, post-commit hooks, and lifecycle
//! listeners.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::core::config::{CachePolicy, TransactionConfig};
use crate::core::error::{Error, Result};
use crate::core::read_version_cache::ReadVersionCache;
use crate::kv::{Database, Transaction};

pub type BodyFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Created,
    Committing,
    Committed { duration_ns: u64 },
    Failed(String),
    Cancelled,
    Closed,
}

pub trait Listener: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

#[async_trait]
pub trait PreCommitCheck: Send + Sync {
    async fn check(&self, tx: &dyn Transaction) -> Result<()>;
}

#[async_trait]
pub trait PostCommitHook: Send + Sync {
    async fn run(&self, committed_version: u64);
}

pub struct TransactionRunner {
    db: Arc<dyn Database>,
    read_version_cache: Arc<ReadVersionCache>,
    listeners: Vec<Arc<dyn Listener>>,
    pre_commit_checks: Vec<Arc<dyn PreCommitCheck>>,
    post_commit_hooks: Vec<Arc<dyn PostCommitHook>>,
}

impl TransactionRunner {
    pub fn new(db: Arc<dyn Database>, read_version_cache: Arc<ReadVersionCache>) -> Self {
        TransactionRunner {
            db,
            read_version_cache,
            listeners: Vec::new(),
            pre_commit_checks: Vec::new(),
            post_commit_hooks: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_pre_commit_check(mut self, check: Arc<dyn PreCommitCheck>) -> Self {
        self.pre_commit_checks.push(check);
        self
    }

    pub fn with_post_commit_hook(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.post_commit_hooks.push(hook);
        self
    }

    fn emit(&self, event: LifecycleEvent) {
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }

    /// Run `body` under a retry loop per spec §4.1. `body` is called with a
    /// fresh transaction on every attempt; its return value is committed
    /// and, on success, becomes `run`'s return value.
    pub async fn run<T, F>(&self, config: &TransactionConfig, mut body: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnMut(&'a dyn Transaction) -> BodyFuture<'a, T>,
    {
        let mut attempt = 0u32;
        let mut delay_ms = 10u64;

        loop {
            self.emit(LifecycleEvent::Created);
            let tx = self.db.create_transaction().await?;

            self.apply_cache_policy(tx.as_ref(), config).await?;

            let attempt_result = tokio::time::timeout(
                Duration::from_millis(config.timeout_ms),
                body(tx.as_ref()),
            )
            .await;

            let body_result = match attempt_result {
                Ok(r) => r,
                Err(_) => Err(Error::timeout("transaction body exceeded timeoutMs")),
            };

            match body_result {
                Ok(value) => match self.try_commit(tx, config).await {
                    Ok(()) => return Ok(value),
                    Err(e) if e.is_retriable() && attempt < config.retry_limit => {
                        attempt += 1;
                        self.backoff(&mut delay_ms, config).await;
                        continue;
                    }
                    Err(e) => {
                        self.emit(LifecycleEvent::Failed(e.to_string()));
                        return Err(e);
                    }
                },
                Err(e) if e.is_retriable() && attempt < config.retry_limit => {
                    attempt += 1;
                    self.backoff(&mut delay_ms, config).await;
                    continue;
                }
                Err(e) => {
                    self.emit(LifecycleEvent::Failed(e.to_string()));
                    return Err(e);
                }
            }
        }
    }

    async fn apply_cache_policy(
        &self,
        tx: &dyn Transaction,
        config: &TransactionConfig,
    ) -> Result<()> {
        match config.cache_policy {
            CachePolicy::Server => Ok(()),
            CachePolicy::Cached => {
                if let Some(v) = self.read_version_cache.get() {
                    tx.set_read_version(v);
                }
                Ok(())
            }
            CachePolicy::Stale { max_age_ms } => {
                if let Some(v) = self.read_version_cache.get_if_fresh(max_age_ms) {
                    tx.set_read_version(v);
                }
                Ok(())
            }
        }
    }

    async fn try_commit(&self, tx: Box<dyn Transaction>, config: &TransactionConfig) -> Result<()> {
        for check in &self.pre_commit_checks {
            check.check(tx.as_ref()).await?;
        }
        self.emit(LifecycleEvent::Committing);
        let started = Instant::now();
        let version = tx.commit().await.map_err(|e| {
            if config.report_conflicting_keys {
                warn!(error = %e, "transaction commit failed");
            }
            e
        })?;
        let duration_ns = started.elapsed().as_nanos() as u64;
        self.read_version_cache.update(version);
        self.emit(LifecycleEvent::Committed { duration_ns });
        for hook in &self.post_commit_hooks {
            hook.run(version).await;
        }
        Ok(())
    }

    async fn backoff(&self, delay_ms: &mut u64, config: &TransactionConfig) {
        let capped = (*delay_ms).min(config.max_retry_delay_ms);
        debug!(delay_ms = capped, "retrying transaction after conflict/timeout");
        tokio::time::sleep(Duration::from_millis(capped)).await;
        *delay_ms = (*delay_ms * 2).min(config.max_retry_delay_ms);
    }
}

impl Drop for TransactionRunner {
    fn drop(&mut self) {
        self.emit(LifecycleEvent::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryDatabase;

    #[tokio::test]
    async fn run_commits_on_first_attempt() {
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let cache = Arc::new(ReadVersionCache::new(16));
        let runner = TransactionRunner::new(db, cache);
        let config = TransactionConfig::default();

        let result = runner
            .run(&config, |tx| {
                Box::pin(async move {
                    tx.set(b"k", b"v")?;
                    Ok::<_, Error>(42)
                })
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn retries_on_conflict_then_succeeds() {
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let cache = Arc::new(ReadVersionCache::new(16));
        let runner = TransactionRunner::new(db.clone(), cache);
        let mut config = TransactionConfig::default();
        config.max_retry_delay_ms = 5;

        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = runner
            .run(&config, move |tx| {
                let attempts = attempts_clone.clone();
                Box::pin(async move {
                    let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    if n == 0 {
                        tx.get(b"anything").await?;
                        return Err(Error::conflict("synthetic first-attempt conflict"));
                    }
                    tx.set(b"k2", b"v2")?;
                    Ok::<_, Error>(())
                })
            })
            .await;

        assert!(result.is_ok());
        assert!(attempts.load(std::sync::atomic::Ordering::SeqCst) >= 2);
    }
}
