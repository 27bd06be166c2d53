//! Process-wide cache of committed versions (spec §4.1 cache policy, §5
//! "The read-version cache is process-wide, guarded by a mutex; updates are
//! monotone"). Grounded on the teacher's
//! `mvcc::controller::MVCCController::current_version` idea, narrowed to
//! just the monotone cache this spec describes — encapsulated as a
//! container-scoped service per DESIGN NOTES §9, not a process `static`.

use parking_lot::Mutex;
use std::time::Instant;

struct Entry {
    version: u64,
    observed_at: Instant,
}

pub struct ReadVersionCache {
    entry: Mutex<Option<Entry>>,
    #[allow(dead_code)]
    capacity_hint: usize,
}

impl ReadVersionCache {
    pub fn new(capacity_hint: usize) -> Self {
        ReadVersionCache { entry: Mutex::new(None), capacity_hint }
    }

    /// Monotone update: never decreases the cached version.
    pub fn update(&self, version: u64) {
        let mut guard = self.entry.lock();
        let should_update = match &*guard {
            Some(e) => version >= e.version,
            None => true,
        };
        if should_update {
            *guard = Some(Entry { version, observed_at: Instant::now() });
        }
    }

    pub fn get(&self) -> Option<u64> {
        self.entry.lock().as_ref().map(|e| e.version)
    }

    pub fn get_if_fresh(&self, max_age_ms: u64) -> Option<u64> {
        let guard = self.entry.lock();
        guard.as_ref().and_then(|e| {
            if e.observed_at.elapsed().as_millis() as u64 <= max_age_ms {
                Some(e.version)
            } else {
                None
            }
        })
    }
}
