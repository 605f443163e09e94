//! The isolate-local metric snapshot the egress proxy emits on every
//! request path, per the `{adapter, action, outcome, statusClass,
//! denyReason, latencyMs}` shape in §4.6.
//!
//! This is operator-facing, not analytics (the Non-goal on "user-facing
//! analytics" excludes the latter, not the former): a short rolling window
//! `GET /v1/admin/metrics` can summarize, with no durable time-series
//! store behind it.

use std::collections::VecDeque;
use std::sync::Mutex;

/// How the request resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The upstream call completed and its response was returned.
    Allowed,
    /// The request was rejected before any upstream call was made.
    Denied,
    /// The upstream call was attempted but failed or errored.
    Error,
}

/// One recorded proxy call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RequestMetric {
    /// The adapter id.
    pub adapter: String,
    /// The action name.
    pub action: String,
    /// How the call resolved.
    pub outcome: Outcome,
    /// The HTTP status class returned to the caller (`2xx`, `4xx`, `5xx`).
    #[serde(rename = "statusClass")]
    pub status_class: &'static str,
    /// The stable error kind, when `outcome != allowed`.
    #[serde(rename = "denyReason", skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<&'static str>,
    /// Wall-clock time spent handling the call, in milliseconds.
    #[serde(rename = "latencyMs")]
    pub latency_ms: u64,
}

impl RequestMetric {
    /// The HTTP status class label for a concrete status code.
    pub fn status_class_for(status: u16) -> &'static str {
        match status / 100 {
            2 => "2xx",
            3 => "3xx",
            4 => "4xx",
            5 => "5xx",
            _ => "?xx",
        }
    }
}

/// How many recent calls are retained for the admin metrics snapshot.
const WINDOW: usize = 1000;

/// A bounded, in-process ring buffer of recent [`RequestMetric`]s.
#[derive(Default)]
pub struct MetricsSink {
    recent: Mutex<VecDeque<RequestMetric>>,
}

impl MetricsSink {
    /// Construct an empty sink.
    pub fn new() -> Self {
        MetricsSink::default()
    }

    /// Record one call's metric, evicting the oldest entry once the
    /// window is full.
    pub fn record(&self, metric: RequestMetric) {
        let mut recent = self.recent.lock().expect("metrics mutex poisoned");
        if recent.len() >= WINDOW {
            recent.pop_front();
        }
        recent.push_back(metric);
    }

    /// A snapshot of every call currently retained, oldest first.
    pub fn snapshot(&self) -> Vec<RequestMetric> {
        self.recent.lock().expect("metrics mutex poisoned").iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(outcome: Outcome) -> RequestMetric {
        RequestMetric {
            adapter: "youtube".to_owned(),
            action: "list_channel_videos".to_owned(),
            outcome,
            status_class: "2xx",
            deny_reason: None,
            latency_ms: 12,
        }
    }

    #[test]
    fn snapshot_returns_recorded_metrics_in_order() {
        let sink = MetricsSink::new();
        sink.record(metric(Outcome::Allowed));
        sink.record(metric(Outcome::Denied));
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].outcome, Outcome::Allowed);
        assert_eq!(snapshot[1].outcome, Outcome::Denied);
    }

    #[test]
    fn window_is_bounded() {
        let sink = MetricsSink::new();
        for _ in 0..(WINDOW + 10) {
            sink.record(metric(Outcome::Allowed));
        }
        assert_eq!(sink.snapshot().len(), WINDOW);
    }

    #[test]
    fn status_class_buckets_correctly() {
        assert_eq!(RequestMetric::status_class_for(200), "2xx");
        assert_eq!(RequestMetric::status_class_for(404), "4xx");
        assert_eq!(RequestMetric::status_class_for(502), "5xx");
    }
}
