//! Health/readiness report generation and metrics payload post-processing.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::MetricsState;
use crate::models::ChainIdentity;

#[derive(Debug, Clone, Serialize)]
pub struct ChainHealthEntry {
    pub blockchain_name: String,
    pub chain_id_label: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainReadinessEntry {
    pub blockchain_name: String,
    pub chain_id_label: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_timestamp: Option<String>,
}

fn format_timestamp(unix_seconds: f64) -> String {
    let dt = DateTime::<Utc>::from_timestamp(unix_seconds as i64, 0).unwrap_or_else(Utc::now);
    dt.to_rfc3339()
}

fn chain_id_label_for(metrics: &MetricsState, identity: &ChainIdentity) -> String {
    metrics.resolved_chain_id(identity).unwrap_or_else(|| "unknown".to_string())
}

/// Overall status, HTTP status code, and per-chain detail rows.
///
/// - No chains configured: `("ok", 200, [])`.
/// - Chains configured but none has polled yet: `("initializing", 503, [])`.
/// - All healthy: `("ok", 200)`; some healthy: `("degraded", 200)`; none
///   healthy: `("unhealthy", 503)`.
pub fn generate_health_report(metrics: &MetricsState, include_details: bool) -> (&'static str, u16, Vec<ChainHealthEntry>) {
    let health = metrics.all_chain_health();

    if health.is_empty() {
        return ("initializing", 503, Vec::new());
    }

    let healthy_count = health.iter().filter(|(_, healthy)| *healthy).count();
    let status = if healthy_count == health.len() {
        "ok"
    } else if healthy_count > 0 {
        "degraded"
    } else {
        "unhealthy"
    };
    let code = if status == "unhealthy" { 503 } else { 200 };

    let mut entries: Vec<ChainHealthEntry> = if include_details {
        health
            .into_iter()
            .map(|(identity, healthy)| {
                let chain_id_label = chain_id_label_for(metrics, &identity);
                let last_success = metrics.last_success(&identity).map(format_timestamp);
                ChainHealthEntry {
                    blockchain_name: identity.0,
                    chain_id_label,
                    status: if healthy { "healthy".to_string() } else { "unhealthy".to_string() },
                    last_success_timestamp: last_success,
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    entries.sort_by(|a, b| (a.blockchain_name.as_str(), a.chain_id_label.as_str()).cmp(&(b.blockchain_name.as_str(), b.chain_id_label.as_str())));

    (status, code, entries)
}

/// Readiness is per-chain: healthy AND whose last successful poll is within
/// `stale_threshold_seconds` of now.
pub fn generate_readiness_report(
    metrics: &MetricsState,
    now_unix_seconds: f64,
    stale_threshold_seconds: f64,
) -> (bool, Vec<ChainReadinessEntry>) {
    let health = metrics.all_chain_health();
    if health.is_empty() {
        return (true, Vec::new());
    }

    let mut entries = Vec::with_capacity(health.len());
    let mut all_ready = true;

    for (identity, healthy) in health {
        let last_success = metrics.last_success(&identity);
        let ready = healthy
            && last_success
                .map(|ts| ts >= now_unix_seconds - stale_threshold_seconds)
                .unwrap_or(false);
        all_ready = all_ready && ready;

        let chain_id_label = chain_id_label_for(metrics, &identity);
        entries.push(ChainReadinessEntry {
            blockchain_name: identity.0,
            chain_id_label,
            status: if ready { "ready".to_string() } else { "not_ready".to_string() },
            last_success_timestamp: last_success.map(format_timestamp),
        });
    }

    entries.sort_by(|a, b| (a.blockchain_name.as_str(), a.chain_id_label.as_str()).cmp(&(b.blockchain_name.as_str(), b.chain_id_label.as_str())));

    (all_ready, entries)
}

/// Post-process a raw Prometheus text-exposition payload:
/// - drop `# TYPE blockchain_chain_id ...` lines (that series was dropped
///   from the label cache design but some scrapers' relabel rules still
///   reference it defensively),
/// - rewrite scientific-notation sample values to fixed-point, since some
///   downstream scrapers choke on exponents.
pub fn format_metrics_payload(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());

    for line in payload.lines() {
        if line.is_empty() {
            out.push('\n');
            continue;
        }
        if line.starts_with('#') {
            if line.starts_with("# TYPE blockchain_chain_id") {
                continue;
            }
            out.push_str(line);
            out.push('\n');
            continue;
        }

        match line.rsplit_once(' ') {
            Some((metric, value)) if value.to_lowercase().contains('e') => {
                let rewritten = value
                    .parse::<f64>()
                    .ok()
                    .map(|v| format_fixed_point(v))
                    .unwrap_or_else(|| value.to_string());
                out.push_str(metric);
                out.push(' ');
                out.push_str(&rewritten);
                out.push('\n');
            }
            _ => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    out
}

fn format_fixed_point(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_chains_reports_ok() {
        let metrics = MetricsState::new();
        let (status, code, entries) = generate_health_report(&metrics, false);
        assert_eq!(status, "initializing");
        assert_eq!(code, 503);
        assert!(entries.is_empty());
    }

    #[test]
    fn mixed_health_reports_degraded() {
        let metrics = MetricsState::new();
        let healthy = ("a".to_string(), "http://a".to_string());
        let unhealthy = ("b".to_string(), "http://b".to_string());
        metrics.record_poll_success(&healthy, "1");
        metrics.record_poll_failure(&unhealthy, "2");
        let (status, code, _) = generate_health_report(&metrics, false);
        assert_eq!(status, "degraded");
        assert_eq!(code, 200);
    }

    #[test]
    fn readiness_requires_fresh_success() {
        let metrics = MetricsState::new();
        let id = ("a".to_string(), "http://a".to_string());
        metrics.record_poll_success(&id, "1");
        let last = metrics.last_success(&id).unwrap();
        let (ready_now, _) = generate_readiness_report(&metrics, last + 1.0, 300.0);
        assert!(ready_now);
        let (ready_later, _) = generate_readiness_report(&metrics, last + 1000.0, 300.0);
        assert!(!ready_later);
    }

    #[test]
    fn format_metrics_payload_drops_chain_id_type_line() {
        let input = "# TYPE blockchain_chain_id gauge\nblockchain_exporter_up 1\n";
        let output = format_metrics_payload(input);
        assert!(!output.contains("TYPE blockchain_chain_id"));
        assert!(output.contains("blockchain_exporter_up 1"));
    }

    #[test]
    fn format_metrics_payload_rewrites_scientific_notation() {
        let input = "blockchain_account_balance_wei{a=\"b\"} 1.5e21\n";
        let output = format_metrics_payload(input);
        assert!(!output.to_lowercase().contains('e'));
    }
}
