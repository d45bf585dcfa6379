//! Core types shared across the watcher.
//!
//! - [`Severity`]: how serious a matched signature is
//! - [`MonitorTarget`]: one pod log stream
//! - [`PodInfo`] / [`PodPhase`]: pod discovery results
//! - [`Alert`]: an emitted alert record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The severity attached to an error signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, no action required.
    Info,
    /// Should be investigated.
    #[default]
    #[serde(alias = "warn")]
    Warning,
    /// Something is failing.
    Error,
    /// Requires immediate attention.
    Critical,
}

impl Severity {
    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Returns the upper-cased label used in alert lines.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies one pod log stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorTarget {
    /// Namespace of the pod.
    pub namespace: String,
    /// Pod name.
    pub pod_name: String,
}

impl MonitorTarget {
    /// Creates a new target.
    #[must_use]
    pub fn new(namespace: impl Into<String>, pod_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
        }
    }
}

impl std::fmt::Display for MonitorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod_name)
    }
}

/// Pod lifecycle phase as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    /// Accepted but not all containers are running yet.
    Pending,
    /// Bound to a node with at least one container running.
    Running,
    /// All containers terminated successfully.
    Succeeded,
    /// All containers terminated, at least one in failure.
    Failed,
    /// State could not be obtained.
    #[serde(other)]
    Unknown,
}

impl PodPhase {
    /// Parses the phase string from the Kubernetes API.
    #[must_use]
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// A pod returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    /// Pod name.
    pub name: String,
    /// Current phase.
    pub phase: PodPhase,
}

impl PodInfo {
    /// Creates a pod record.
    #[must_use]
    pub fn new(name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            name: name.into(),
            phase,
        }
    }

    /// Returns true if the pod's logs should be tailed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase == PodPhase::Running
    }
}

/// An alert emitted for a matched log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier.
    pub id: Uuid,
    /// Severity of the matched signature.
    pub severity: Severity,
    /// Name of the matched signature.
    pub pattern_name: String,
    /// Namespace of the pod.
    pub namespace: String,
    /// Pod name.
    pub pod_name: String,
    /// The matched line, trimmed.
    pub log_line: String,
    /// When the alert was emitted.
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Creates an alert for a matched line.
    #[must_use]
    pub fn new(
        target: &MonitorTarget,
        pattern_name: impl Into<String>,
        severity: Severity,
        log_line: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            pattern_name: pattern_name.into(),
            namespace: target.namespace.clone(),
            pod_name: target.pod_name.clone(),
            log_line: log_line.trim().to_string(),
            timestamp,
        }
    }

    /// Returns the headline logged when the alert fires.
    #[must_use]
    pub fn headline(&self) -> String {
        format!(
            "ALERT [{}] - {} | Pod: {}/{}",
            self.severity.label(),
            self.pattern_name,
            self.namespace,
            self.pod_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Severity::Info, "info", "INFO" ; "info")]
    #[test_case(Severity::Warning, "warning", "WARNING" ; "warning")]
    #[test_case(Severity::Error, "error", "ERROR" ; "error")]
    #[test_case(Severity::Critical, "critical", "CRITICAL" ; "critical")]
    fn severity_strings(severity: Severity, lower: &str, upper: &str) {
        assert_eq!(severity.as_str(), lower);
        assert_eq!(severity.label(), upper);
        assert_eq!(severity.to_string(), lower);
    }

    #[test]
    fn severity_deserializes_lowercase_and_warn_alias() {
        let s: Severity = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(s, Severity::Critical);

        let s: Severity = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(s, Severity::Warning);

        assert!(serde_json::from_str::<Severity>("\"fatal\"").is_err());
    }

    #[test]
    fn target_display() {
        let target = MonitorTarget::new("payments", "api-7d9f");
        assert_eq!(target.to_string(), "payments/api-7d9f");
    }

    #[test_case("Running", PodPhase::Running ; "running")]
    #[test_case("Pending", PodPhase::Pending ; "pending")]
    #[test_case("Succeeded", PodPhase::Succeeded ; "succeeded")]
    #[test_case("Failed", PodPhase::Failed ; "failed")]
    #[test_case("Evicted", PodPhase::Unknown ; "unrecognized")]
    fn pod_phase_parse(raw: &str, expected: PodPhase) {
        assert_eq!(PodPhase::parse(raw), expected);
    }

    #[test]
    fn only_running_pods_are_tailed() {
        assert!(PodInfo::new("a", PodPhase::Running).is_running());
        assert!(!PodInfo::new("b", PodPhase::Pending).is_running());
        assert!(!PodInfo::new("c", PodPhase::Succeeded).is_running());
    }

    #[test]
    fn alert_trims_line_and_formats_headline() {
        let target = MonitorTarget::new("default", "worker-1");
        let alert = Alert::new(
            &target,
            "OOMKilled",
            Severity::Critical,
            "  Container main was OOMKilled \n",
            Utc::now(),
        );

        assert_eq!(alert.log_line, "Container main was OOMKilled");
        assert_eq!(
            alert.headline(),
            "ALERT [CRITICAL] - OOMKilled | Pod: default/worker-1"
        );
    }

    #[test]
    fn alert_serializes_to_json() {
        let target = MonitorTarget::new("default", "worker-1");
        let alert = Alert::new(&target, "CrashLoop", Severity::Error, "back-off", Utc::now());
        let json = serde_json::to_value(&alert).unwrap();

        assert_eq!(json["severity"], "error");
        assert_eq!(json["pattern_name"], "CrashLoop");
        assert_eq!(json["pod_name"], "worker-1");
    }
}
