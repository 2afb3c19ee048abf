//! Service counters exposed at /metrics.
//!
//! Hand-rendered Prometheus exposition text; counters are plain atomics,
//! the per-route request map sits behind a mutex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct ServiceMetrics {
    requests: Mutex<HashMap<String, u64>>,
    failed_responses: AtomicU64,
    rate_limit_hits: AtomicU64,
    generation_timeouts: AtomicU64,
    fallback_responses: AtomicU64,
    generation_millis: AtomicU64,
    generation_calls: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished request; 5xx statuses also count as failures.
    pub fn record_request(&self, path: &str, status: u16) {
        *self.requests.lock().entry(path.to_string()).or_insert(0) += 1;
        if status >= 500 {
            self.failed_responses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rate_limited(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.generation_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallback_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generation(&self, elapsed: Duration) {
        self.generation_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.generation_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Render all counters in Prometheus exposition format.
    ///
    /// `index_documents` is sampled by the caller from the live retriever,
    /// so the gauge always reflects the currently served snapshot.
    pub fn render(&self, index_documents: usize) -> String {
        let mut output = String::new();

        output.push_str("# HELP waypost_requests_total Total HTTP requests per route\n");
        output.push_str("# TYPE waypost_requests_total counter\n");
        {
            let requests = self.requests.lock();
            let mut routes: Vec<_> = requests.iter().collect();
            routes.sort_by(|a, b| a.0.cmp(b.0));
            for (path, count) in routes {
                output.push_str(&format!(
                    "waypost_requests_total{{path=\"{}\"}} {}\n",
                    path, count
                ));
            }
        }

        output.push_str("# HELP waypost_failed_responses_total Responses with a 5xx status\n");
        output.push_str("# TYPE waypost_failed_responses_total counter\n");
        output.push_str(&format!(
            "waypost_failed_responses_total {}\n",
            self.failed_responses.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP waypost_rate_limit_hits_total Requests rejected by the rate limiter\n");
        output.push_str("# TYPE waypost_rate_limit_hits_total counter\n");
        output.push_str(&format!(
            "waypost_rate_limit_hits_total {}\n",
            self.rate_limit_hits.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP waypost_generation_timeouts_total Generation calls that hit the deadline\n");
        output.push_str("# TYPE waypost_generation_timeouts_total counter\n");
        output.push_str(&format!(
            "waypost_generation_timeouts_total {}\n",
            self.generation_timeouts.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP waypost_fallback_responses_total Answers produced in fallback mode\n");
        output.push_str("# TYPE waypost_fallback_responses_total counter\n");
        output.push_str(&format!(
            "waypost_fallback_responses_total {}\n",
            self.fallback_responses.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP waypost_generation_seconds Wall-clock time spent in generation calls\n");
        output.push_str("# TYPE waypost_generation_seconds summary\n");
        output.push_str(&format!(
            "waypost_generation_seconds_sum {}\n",
            self.generation_millis.load(Ordering::Relaxed) as f64 / 1000.0
        ));
        output.push_str(&format!(
            "waypost_generation_seconds_count {}\n",
            self.generation_calls.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP waypost_index_documents Documents in the loaded retrieval index\n");
        output.push_str("# TYPE waypost_index_documents gauge\n");
        output.push_str(&format!("waypost_index_documents {}\n", index_documents));

        output
    }
}
