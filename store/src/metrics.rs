//! Store/retrieve latency tracking (supplemental feature #2 of
//! SPEC_FULL.md, ported from `sqlite_storage.py::StorageMetrics`).

/// Recorded store/retrieve durations, in milliseconds.
#[derive(Default)]
pub struct StoreMetrics {
    store_times: Vec<f64>,
    retrieve_times: Vec<f64>,
}

/// A point-in-time summary of [`StoreMetrics`], surfaced by the CLI's
/// `stats` command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub store_ops: usize,
    pub retrieve_ops: usize,
    pub avg_store_time_ms: Option<f64>,
    pub p50_store_time_ms: Option<f64>,
    pub p95_store_time_ms: Option<f64>,
    pub p99_store_time_ms: Option<f64>,
    pub avg_retrieve_time_ms: Option<f64>,
    pub p50_retrieve_time_ms: Option<f64>,
    pub p95_retrieve_time_ms: Option<f64>,
    pub p99_retrieve_time_ms: Option<f64>,
}

impl StoreMetrics {
    pub fn record_store_time(&mut self, duration_ms: f64) {
        self.store_times.push(duration_ms);
    }

    pub fn record_retrieve_time(&mut self, duration_ms: f64) {
        self.retrieve_times.push(duration_ms);
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            store_ops: self.store_times.len(),
            retrieve_ops: self.retrieve_times.len(),
            avg_store_time_ms: average(&self.store_times),
            p50_store_time_ms: percentile(&self.store_times, 50.0),
            p95_store_time_ms: percentile(&self.store_times, 95.0),
            p99_store_time_ms: percentile(&self.store_times, 99.0),
            avg_retrieve_time_ms: average(&self.retrieve_times),
            p50_retrieve_time_ms: percentile(&self.retrieve_times, 50.0),
            p95_retrieve_time_ms: percentile(&self.retrieve_times, 95.0),
            p99_retrieve_time_ms: percentile(&self.retrieve_times, 99.0),
        }
    }
}

fn average(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        None
    } else {
        Some(data.iter().sum::<f64>() / data.len() as f64)
    }
}

/// Nearest-rank percentile, matching the original's `idx = size *
/// percentile / 100` clamped into range over a sorted copy of the data.
fn percentile(data: &[f64], percentile: f64) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("metrics are never NaN"));
    let size = sorted.len();
    let idx = ((size as f64 * percentile / 100.0) as usize).clamp(0, size - 1);
    Some(sorted[idx])
}
