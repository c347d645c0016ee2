use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Per-pipeline call counters and cumulative timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatistics {
    pub name: String,
    pub tokenizer_calls: u64,
    pub tokenizer_time: Duration,
    pub inference_calls: u64,
    pub inference_time: Duration,
}

impl PipelineStatistics {
    pub fn mean_inference_time(&self) -> Option<Duration> {
        mean(self.inference_time, self.inference_calls)
    }

    pub fn mean_tokenizer_time(&self) -> Option<Duration> {
        mean(self.tokenizer_time, self.tokenizer_calls)
    }
}

fn mean(total: Duration, calls: u64) -> Option<Duration> {
    (calls > 0).then(|| Duration::from_nanos((total.as_nanos() / calls as u128) as u64))
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    tokenizer_calls: AtomicU64,
    tokenizer_nanos: AtomicU64,
    inference_calls: AtomicU64,
    inference_nanos: AtomicU64,
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl StatsRecorder {
    pub fn record_tokenization(&self, elapsed: Duration) {
        self.tokenizer_calls.fetch_add(1, Ordering::Relaxed);
        self.tokenizer_nanos.fetch_add(nanos(elapsed), Ordering::Relaxed);
    }

    pub fn record_inference(&self, elapsed: Duration) {
        self.inference_calls.fetch_add(1, Ordering::Relaxed);
        self.inference_nanos.fetch_add(nanos(elapsed), Ordering::Relaxed);
    }

    pub fn snapshot(&self, name: &str) -> PipelineStatistics {
        PipelineStatistics {
            name: name.to_string(),
            tokenizer_calls: self.tokenizer_calls.load(Ordering::Relaxed),
            tokenizer_time: Duration::from_nanos(self.tokenizer_nanos.load(Ordering::Relaxed)),
            inference_calls: self.inference_calls.load(Ordering::Relaxed),
            inference_time: Duration::from_nanos(self.inference_nanos.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder() {
        let r = StatsRecorder::default();
        let empty = r.snapshot("p");
        assert_eq!(empty.inference_calls, 0);
        assert_eq!(empty.mean_inference_time(), None);

        r.record_tokenization(Duration::from_millis(2));
        r.record_inference(Duration::from_millis(10));
        r.record_inference(Duration::from_millis(20));
        let s = r.snapshot("p");
        assert_eq!(s.name, "p");
        assert_eq!(s.tokenizer_calls, 1);
        assert_eq!(s.tokenizer_time, Duration::from_millis(2));
        assert_eq!(s.inference_calls, 2);
        assert_eq!(s.inference_time, Duration::from_millis(30));
        assert_eq!(s.mean_inference_time(), Some(Duration::from_millis(15)));
    }
}
