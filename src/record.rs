//! Persisted record formats and the keys they are stored under

use crate::aggregator::WindowSummary;
use crate::probe::ProbeReport;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Success,
    Fail,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Success => write!(f, "success"),
            ProbeStatus::Fail => write!(f, "fail"),
        }
    }
}

/// One probe result, written by the simple sampler on every tick
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimpleLogRecord {
    pub timestamp: DateTime<Utc>,
    pub response_time_nanos: u64,
    pub status: ProbeStatus,
    /// Response body on success, error text on failure
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl SimpleLogRecord {
    pub fn from_report(report: ProbeReport) -> Self {
        let status = if report.outcome.succeeded {
            ProbeStatus::Success
        } else {
            ProbeStatus::Fail
        };

        Self {
            timestamp: report.started_at,
            response_time_nanos: report.outcome.latency_nanos,
            status,
            message: report.message,
            status_code: report.status_code,
        }
    }
}

/// One summary per window, written by the windowed sampler on every flush.
///
/// `avgResponseTime` is in milliseconds. Both ratios are `null` when the
/// window has nothing to divide by.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowRecord {
    pub timestamp: i64,
    pub avg_response_time: Option<f64>,
    pub available: Option<f64>,
    pub samples: usize,
}

impl From<&WindowSummary> for WindowRecord {
    fn from(summary: &WindowSummary) -> Self {
        Self {
            timestamp: summary.window_timestamp_millis,
            avg_response_time: summary.mean_latency_nanos.map(|nanos| nanos / NANOS_PER_MILLI),
            available: summary.available_fraction,
            samples: summary.sample_count,
        }
    }
}

/// Key for a simple sampler record: `string:pinger:{name}:{tick}`
pub fn simple_key(name: &str, tick: DateTime<Utc>) -> String {
    format!(
        "string:pinger:{}:{}",
        name,
        tick.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Key for a window summary: `pingtest:log:{name}:{window}:{timestamp_millis}`
pub fn window_key(name: &str, window: &str, timestamp_millis: i64) -> String {
    format!("pingtest:log:{}:{}:{}", name, window, timestamp_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeOutcome;
    use chrono::TimeZone;

    #[test]
    fn test_simple_record_json_fields() {
        let record = SimpleLogRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            response_time_nanos: 1_500_000,
            status: ProbeStatus::Success,
            message: "ok".to_string(),
            status_code: Some(503),
        };

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["timestamp"], "2024-03-01T12:00:00Z");
        assert_eq!(json["responseTimeNanos"], 1_500_000);
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "ok");
        assert_eq!(json["statusCode"], 503);
    }

    #[test]
    fn test_failed_report_becomes_fail_record() {
        let report = ProbeReport {
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            outcome: ProbeOutcome::failure(),
            status_code: None,
            message: "connection refused".to_string(),
        };

        let record = SimpleLogRecord::from_report(report);
        assert_eq!(record.status, ProbeStatus::Fail);
        assert_eq!(record.response_time_nanos, 0);
        assert_eq!(record.message, "connection refused");

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "fail");
        assert!(json.get("statusCode").is_none());
    }

    #[test]
    fn test_window_record_converts_latency_to_millis() {
        let summary = WindowSummary {
            window_timestamp_millis: 1_700_000_060_000,
            sample_count: 6,
            success_count: 5,
            available_fraction: Some(5.0 / 6.0),
            mean_latency_nanos: Some(30_000_000.0),
        };

        let record = WindowRecord::from(&summary);
        assert_eq!(record.timestamp, 1_700_000_060_000);
        assert_eq!(record.avg_response_time, Some(30.0));
        assert_eq!(record.available, Some(5.0 / 6.0));
        assert_eq!(record.samples, 6);
    }

    #[test]
    fn test_empty_window_serializes_nulls() {
        let summary = WindowSummary {
            window_timestamp_millis: 60_000,
            sample_count: 0,
            success_count: 0,
            available_fraction: None,
            mean_latency_nanos: None,
        };

        let json = serde_json::to_string(&WindowRecord::from(&summary)).unwrap();
        assert_eq!(
            json,
            r#"{"timestamp":60000,"avgResponseTime":null,"available":null,"samples":0}"#
        );
    }

    #[test]
    fn test_keys() {
        let tick = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 5).unwrap();
        assert_eq!(
            simple_key("api", tick),
            "string:pinger:api:2024-03-01T12:00:05.000Z"
        );
        assert_eq!(
            window_key("api", "1m", 1_709_294_405_000),
            "pingtest:log:api:1m:1709294405000"
        );
        assert_eq!(
            window_key("api", "90s", 0),
            "pingtest:log:api:90s:0"
        );
    }
}
