//! One-shot scan of a single pod's recent log.
//!
//! Unlike the monitor, a scan reports every pattern that matches a line, is
//! not deduplicated, and asks for one batched root-cause advisory covering the
//! first few matches.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::advisory::{Advisory, AdvisoryRequester};
use crate::cluster::{ClusterClient, LogRange};
use crate::error::Result;
use crate::patterns::PatternSet;
use crate::types::{MonitorTarget, Severity};

/// Default number of trailing lines fetched by a scan.
pub const DEFAULT_TAIL_LINES: u64 = 100;

/// One (line, pattern) match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMatch {
    /// Name of the matching pattern.
    pub pattern_name: String,
    /// Severity of the matching pattern.
    pub severity: Severity,
    /// The matched line, as read.
    pub line: String,
}

/// Result of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// The scanned pod.
    pub target: MonitorTarget,
    /// Non-blank lines examined.
    pub lines_scanned: usize,
    /// Every match, in line order then pattern order.
    pub matches: Vec<ScanMatch>,
    /// Batched advisory, when requested and obtained.
    pub advisory: Option<Advisory>,
}

impl ScanReport {
    /// Returns true if nothing matched.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Collects every pattern match in `logs`.
#[must_use]
pub fn collect_matches(patterns: &PatternSet, logs: &str) -> (usize, Vec<ScanMatch>) {
    let mut scanned = 0;
    let mut matches = Vec::new();

    for line in logs.lines().filter(|l| !l.trim().is_empty()) {
        scanned += 1;
        matches.extend(patterns.matches(line).into_iter().map(|spec| ScanMatch {
            pattern_name: spec.name.clone(),
            severity: spec.severity,
            line: line.to_string(),
        }));
    }

    (scanned, matches)
}

/// Fetches the last `tail_lines` lines of `target` and classifies them.
///
/// When `advisor` is given and anything matched, a batched advisory is
/// requested; its failure is logged and leaves [`ScanReport::advisory`] empty.
///
/// # Errors
///
/// Returns the fetch error if the log cannot be read.
pub async fn scan_pod(
    cluster: &dyn ClusterClient,
    patterns: &PatternSet,
    target: &MonitorTarget,
    tail_lines: u64,
    advisor: Option<&AdvisoryRequester>,
) -> Result<ScanReport> {
    info!(target = %target, tail_lines, "fetching logs");
    let logs = cluster
        .fetch_logs(target, LogRange::TailLines(tail_lines))
        .await?;

    let (lines_scanned, matches) = collect_matches(patterns, &logs);
    info!(target = %target, lines = lines_scanned, matches = matches.len(), "scan complete");

    let advisory = match advisor {
        Some(advisor) if !matches.is_empty() => {
            let pairs: Vec<(&str, &str)> = matches
                .iter()
                .map(|m| (m.pattern_name.as_str(), m.line.as_str()))
                .collect();
            match advisor.request_batch_advisory(&pairs, &target.pod_name).await {
                Ok(advisory) => Some(advisory),
                Err(e) => {
                    error!(target = %target, error = %e, "LLM error");
                    None
                }
            }
        }
        _ => None,
    };

    Ok(ScanReport {
        target: target.clone(),
        lines_scanned,
        matches,
        advisory,
    })
}
