//! The plan-execution cursor contract (spec §4.10): `next()` returns an
//! item, an optional continuation token, and — when the cursor stops before
//! the underlying plan is exhausted — a reason why, so a caller can decide
//! whether to resume, page, or give up.

use std::time::{Duration, Instant};

use crate::core::types::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SourceExhausted,
    ReturnLimit,
    TimeLimit,
    ScanLimit,
    ByteLimit,
}

/// Limits a cursor enforces while draining a materialized result set
/// (spec §4.10). `None` means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryLimits {
    pub return_limit: Option<usize>,
    pub time_limit: Option<Duration>,
    pub scan_limit: Option<usize>,
    pub byte_limit: Option<usize>,
}

/// A continuation token opaque to the caller: the offset into the
/// materialized result set to resume from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation(pub usize);

pub struct CursorStep {
    pub item: Option<Item>,
    pub continuation: Option<Continuation>,
    pub stop_reason: Option<StopReason>,
}

/// Drives a materialized `Vec<Item>` (the executor always fully resolves a
/// plan before cursoring over it — sort and fusion are not streamable in
/// this crate) against `QueryLimits`, yielding one `CursorStep` per call.
pub struct Cursor {
    rows: Vec<Item>,
    position: usize,
    returned: usize,
    scanned: usize,
    bytes: usize,
    started: Instant,
    limits: QueryLimits,
}

impl Cursor {
    pub fn new(rows: Vec<Item>, limits: QueryLimits) -> Self {
        Cursor { rows, position: 0, returned: 0, scanned: 0, bytes: 0, started: Instant::now(), limits }
    }

    /// Resumes from a previously issued continuation token instead of the
    /// start of the result set.
    pub fn resume(rows: Vec<Item>, limits: QueryLimits, at: Continuation) -> Self {
        let mut cursor = Self::new(rows, limits);
        cursor.position = at.0;
        cursor
    }

    pub fn next(&mut self) -> CursorStep {
        if let Some(limit) = self.limits.return_limit {
            if self.returned >= limit {
                return self.stop(StopReason::ReturnLimit);
            }
        }
        if let Some(time_limit) = self.limits.time_limit {
            if self.started.elapsed() >= time_limit {
                return self.stop(StopReason::TimeLimit);
            }
        }
        if let Some(scan_limit) = self.limits.scan_limit {
            if self.scanned >= scan_limit {
                return self.stop(StopReason::ScanLimit);
            }
        }
        if let Some(byte_limit) = self.limits.byte_limit {
            if self.bytes >= byte_limit {
                return self.stop(StopReason::ByteLimit);
            }
        }

        self.scanned += 1;
        let Some(item) = self.rows.get(self.position).cloned() else {
            return self.stop(StopReason::SourceExhausted);
        };
        self.position += 1;
        self.returned += 1;
        self.bytes += approximate_size(&item);

        CursorStep { item: Some(item), continuation: Some(Continuation(self.position)), stop_reason: None }
    }

    fn stop(&self, reason: StopReason) -> CursorStep {
        CursorStep { item: None, continuation: Some(Continuation(self.position)), stop_reason: Some(reason) }
    }
}

fn approximate_size(item: &Item) -> usize {
    // Rough byte estimate for the per-page `byte_limit` stop reason; fields
    // are not re-serialized here since the real wire size is already known
    // by the time an item reaches the cursor only after decoding.
    item.fields.len() * 32 + 16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;

    fn item(id: u64) -> Item {
        Item::new(DocId::new(id), "widget")
    }

    #[test]
    fn cursor_stops_at_return_limit() {
        let rows = vec![item(1), item(2), item(3)];
        let mut cursor = Cursor::new(rows, QueryLimits { return_limit: Some(2), ..Default::default() });
        assert!(cursor.next().item.is_some());
        assert!(cursor.next().item.is_some());
        let step = cursor.next();
        assert!(step.item.is_none());
        assert_eq!(step.stop_reason, Some(StopReason::ReturnLimit));
    }

    #[test]
    fn cursor_reports_source_exhausted_when_rows_run_out() {
        let rows = vec![item(1)];
        let mut cursor = Cursor::new(rows, QueryLimits::default());
        assert!(cursor.next().item.is_some());
        let step = cursor.next();
        assert_eq!(step.stop_reason, Some(StopReason::SourceExhausted));
    }

    #[test]
    fn resume_continues_from_the_saved_offset() {
        let rows = vec![item(1), item(2), item(3)];
        let mut cursor = Cursor::resume(rows, QueryLimits::default(), Continuation(1));
        let step = cursor.next();
        assert_eq!(step.item.unwrap().id.value(), 2);
    }
}
