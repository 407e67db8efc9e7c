//! Per-solve instrumentation.
//!
//! Every build-and-solve cycle records when it started and finished on
//! which engine instance. Cycles on the same engine instance must never
//! overlap; [`SolveTimeline::overlapping`] checks exactly that.

use chrono::{DateTime, Utc};
use oilstab_core::ConvergenceStatus;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveRecord {
    pub request_id: Uuid,
    /// Engine instance the cycle ran on.
    pub engine_generation: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: Option<ConvergenceStatus>,
}

impl SolveRecord {
    fn overlaps(&self, other: &SolveRecord) -> bool {
        let now = Utc::now();
        let a_end = self.finished_at.unwrap_or(now);
        let b_end = other.finished_at.unwrap_or(now);
        self.started_at < b_end && other.started_at < a_end
    }
}

/// Bounded log of recent cycles, oldest dropped first.
#[derive(Debug)]
pub struct SolveTimeline {
    records: Mutex<VecDeque<SolveRecord>>,
    capacity: usize,
}

impl Default for SolveTimeline {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SolveTimeline {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SolveRecord>> {
        // Records stay consistent across a worker panic; ignore poisoning.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn start(&self, request_id: Uuid, engine_generation: u64) {
        let mut records = self.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(SolveRecord {
            request_id,
            engine_generation,
            started_at: Utc::now(),
            finished_at: None,
            status: None,
        });
    }

    pub fn finish(&self, request_id: Uuid, status: ConvergenceStatus) {
        let mut records = self.lock();
        if let Some(record) = records
            .iter_mut()
            .rev()
            .find(|r| r.request_id == request_id && r.finished_at.is_none())
        {
            record.finished_at = Some(Utc::now());
            record.status = Some(status);
        }
    }

    pub fn records(&self) -> Vec<SolveRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Pairs of cycles that ran at the same time on the same engine instance.
    pub fn overlapping(&self) -> Vec<(Uuid, Uuid)> {
        let records = self.records();
        let mut pairs = Vec::new();
        for (i, a) in records.iter().enumerate() {
            for b in &records[i + 1..] {
                if a.engine_generation == b.engine_generation && a.overlaps(b) {
                    pairs.push((a.request_id, b.request_id));
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(generation: u64, start_ms: i64, end_ms: i64) -> SolveRecord {
        let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        SolveRecord {
            request_id: Uuid::new_v4(),
            engine_generation: generation,
            started_at: base + Duration::milliseconds(start_ms),
            finished_at: Some(base + Duration::milliseconds(end_ms)),
            status: Some(ConvergenceStatus::Success),
        }
    }

    #[test]
    fn back_to_back_cycles_do_not_overlap() {
        assert!(!record(1, 0, 10).overlaps(&record(1, 10, 20)));
        assert!(record(1, 0, 11).overlaps(&record(1, 10, 20)));
    }

    #[test]
    fn start_then_finish_fills_record() {
        let timeline = SolveTimeline::default();
        let id = Uuid::new_v4();
        timeline.start(id, 1);
        assert!(timeline.records()[0].finished_at.is_none());
        timeline.finish(id, ConvergenceStatus::NonConvergent);

        let records = timeline.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Some(ConvergenceStatus::NonConvergent));
        assert!(records[0].finished_at.unwrap() >= records[0].started_at);
    }

    #[test]
    fn capacity_drops_oldest() {
        let timeline = SolveTimeline::with_capacity(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            timeline.start(*id, 1);
            timeline.finish(*id, ConvergenceStatus::Success);
        }
        let kept: Vec<Uuid> = timeline.records().iter().map(|r| r.request_id).collect();
        assert_eq!(kept, ids[1..].to_vec());
    }

    #[test]
    fn overlap_only_counts_within_one_engine_instance() {
        let timeline = SolveTimeline::default();
        {
            let mut records = timeline.lock();
            records.push_back(record(1, 0, 100));
            records.push_back(record(2, 50, 150));
        }
        assert!(timeline.overlapping().is_empty());

        timeline.lock().push_back(record(2, 120, 200));
        assert_eq!(timeline.overlapping().len(), 1);
    }
}
