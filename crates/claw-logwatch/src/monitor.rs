//! The polling loop.
//!
//! Each tick lists the pods of every configured namespace, fetches the log
//! lines written since the target's previous checkpoint, and classifies them.
//! A matched line raises an [`Alert`] unless the same (namespace, pod,
//! pattern) alerted within the dedupe window; raised alerts may in turn
//! request an advisory, which is gated by its own cooldown.
//!
//! Failures are contained: a namespace that cannot be listed or a pod whose
//! logs cannot be fetched is logged and skipped for the tick, and each tick
//! runs as its own task so a panic inside one is logged and the loop goes on.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::advisory::{AdvisoryOutcome, AdvisoryRequester};
use crate::clock::SharedClock;
use crate::cluster::{ClusterClient, LogRange};
use crate::cursor::{DEFAULT_SINCE_SECONDS, LogCursor};
use crate::ledger::{AlertKey, AlertLedger, CooldownLedger};
use crate::patterns::PatternSet;
use crate::types::{Alert, MonitorTarget, PodInfo};

/// Default delay between ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default alert dedupe window, in seconds.
pub const DEFAULT_ALERT_DEDUPE_SECONDS: u64 = 60;

/// Monitor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Namespaces to watch, deduplicated, in order.
    pub namespaces: Vec<String>,
    /// Delay between the end of one tick and the start of the next.
    pub poll_interval: Duration,
    /// Window for a target's first fetch, in seconds.
    pub since_seconds: u64,
    /// Alert dedupe window, in seconds.
    pub alert_dedupe_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            namespaces: vec!["default".to_string()],
            poll_interval: DEFAULT_POLL_INTERVAL,
            since_seconds: DEFAULT_SINCE_SECONDS,
            alert_dedupe_secs: DEFAULT_ALERT_DEDUPE_SECONDS,
        }
    }
}

impl MonitorConfig {
    /// Sets the namespaces, trimming names and dropping blanks and repeats.
    #[must_use]
    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for ns in namespaces {
            let ns = ns.as_ref().trim();
            if !ns.is_empty() && !unique.iter().any(|seen| seen == ns) {
                unique.push(ns.to_string());
            }
        }
        self.namespaces = unique;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the first-fetch window.
    #[must_use]
    pub const fn with_since_seconds(mut self, secs: u64) -> Self {
        self.since_seconds = secs;
        self
    }

    /// Sets the alert dedupe window.
    #[must_use]
    pub const fn with_alert_dedupe_secs(mut self, secs: u64) -> Self {
        self.alert_dedupe_secs = secs;
        self
    }
}

/// An alert raised during a tick, with its advisory if one was requested.
#[derive(Debug, Clone)]
pub struct EmittedAlert {
    /// The alert.
    pub alert: Alert,
    /// Advisory outcome, `None` when advisories are disabled.
    pub advisory: Option<AdvisoryOutcome>,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Namespaces polled.
    pub namespaces: usize,
    /// Namespaces whose pod listing failed.
    pub failed_namespaces: usize,
    /// Running pods whose logs were fetched.
    pub pods_scanned: usize,
    /// Running pods whose log fetch failed.
    pub failed_fetches: usize,
    /// Non-blank lines classified.
    pub lines_scanned: usize,
    /// Alerts raised, in emission order per namespace.
    pub alerts: Vec<EmittedAlert>,
}

impl TickReport {
    fn merge(&mut self, other: Self) {
        self.namespaces += other.namespaces;
        self.failed_namespaces += other.failed_namespaces;
        self.pods_scanned += other.pods_scanned;
        self.failed_fetches += other.failed_fetches;
        self.lines_scanned += other.lines_scanned;
        self.alerts.extend(other.alerts);
    }
}

/// Watches pod logs and raises alerts.
pub struct Monitor {
    config: MonitorConfig,
    cluster: Arc<dyn ClusterClient>,
    patterns: Arc<PatternSet>,
    cursor: LogCursor,
    alerts: AlertLedger,
    advisor: Option<AdvisoryRequester>,
    clock: SharedClock,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("patterns", &self.patterns.len())
            .field("cursor", &self.cursor)
            .field("alerts", &self.alerts)
            .field("advisor", &self.advisor)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Creates a monitor with a fresh cursor and alert ledger on `clock`.
    #[must_use]
    pub fn new(
        config: MonitorConfig,
        cluster: Arc<dyn ClusterClient>,
        patterns: Arc<PatternSet>,
        clock: SharedClock,
    ) -> Self {
        let cursor = LogCursor::new(config.since_seconds, Arc::clone(&clock));
        let alerts = CooldownLedger::with_window_secs(config.alert_dedupe_secs, Arc::clone(&clock));
        Self {
            config,
            cluster,
            patterns,
            cursor,
            alerts,
            advisor: None,
            clock,
        }
    }

    /// Enables advisories for raised alerts.
    #[must_use]
    pub fn with_advisor(mut self, advisor: AdvisoryRequester) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Returns the log cursor.
    #[must_use]
    pub const fn cursor(&self) -> &LogCursor {
        &self.cursor
    }

    /// Returns the alert ledger.
    #[must_use]
    pub const fn alert_ledger(&self) -> &AlertLedger {
        &self.alerts
    }

    /// Returns the advisory requester, if advisories are enabled.
    #[must_use]
    pub const fn advisor(&self) -> Option<&AdvisoryRequester> {
        self.advisor.as_ref()
    }

    /// Runs ticks until `shutdown` flips to true or its sender is dropped.
    ///
    /// A tick in progress when shutdown is signalled runs to completion.
    /// Each tick is spawned; a tick that panics is logged and the next one
    /// starts on schedule.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            namespaces = ?self.config.namespaces,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            patterns = self.patterns.len(),
            advisories = self.advisor.is_some(),
            "monitor starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let monitor = Arc::clone(&self);
            match tokio::spawn(async move { monitor.run_tick().await }).await {
                Ok(report) => debug!(
                    pods = report.pods_scanned,
                    lines = report.lines_scanned,
                    alerts = report.alerts.len(),
                    failed_namespaces = report.failed_namespaces,
                    failed_fetches = report.failed_fetches,
                    "tick complete"
                ),
                Err(e) => error!(error = %e, "tick aborted"),
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {
                    info!("shutdown signal received, stopping monitor");
                    break;
                }
            }
        }

        info!("monitor stopped");
    }

    /// Polls every namespace once.
    pub async fn run_tick(&self) -> TickReport {
        let reports = join_all(
            self.config
                .namespaces
                .iter()
                .map(|namespace| self.poll_namespace(namespace)),
        )
        .await;

        let mut report = TickReport::default();
        for namespace_report in reports {
            report.merge(namespace_report);
        }

        let swept = self.alerts.sweep_expired()
            + self.advisor.as_ref().map_or(0, |a| a.ledger().sweep_expired());
        if swept > 0 {
            debug!(swept, "expired cooldown entries removed");
        }

        report
    }

    async fn poll_namespace(&self, namespace: &str) -> TickReport {
        let mut report = TickReport {
            namespaces: 1,
            ..TickReport::default()
        };

        let pods = match self.cluster.list_pods(namespace).await {
            Ok(pods) => pods,
            Err(e) => {
                error!(namespace = %namespace, error = %e, "failed to list pods");
                report.failed_namespaces = 1;
                return report;
            }
        };

        for pod in pods.iter().filter(|p| p.is_running()) {
            self.poll_pod(namespace, pod, &mut report).await;
        }

        report
    }

    async fn poll_pod(&self, namespace: &str, pod: &PodInfo, report: &mut TickReport) {
        let target = MonitorTarget::new(namespace, pod.name.as_str());
        let since = self.cursor.window_for(&target);

        let logs = match self
            .cluster
            .fetch_logs(&target, LogRange::SinceSeconds(since))
            .await
        {
            Ok(logs) => logs,
            Err(e) if e.is_transient() => {
                debug!(target = %target, error = %e, "failed to fetch logs");
                report.failed_fetches += 1;
                return;
            }
            Err(e) => {
                warn!(target = %target, error = %e, "unexpected log fetch failure");
                report.failed_fetches += 1;
                return;
            }
        };
        report.pods_scanned += 1;

        for line in logs.lines().filter(|l| !l.trim().is_empty()) {
            report.lines_scanned += 1;
            if let Some(emitted) = self.process_line(&target, line).await {
                report.alerts.push(emitted);
            }
        }
    }

    async fn process_line(&self, target: &MonitorTarget, line: &str) -> Option<EmittedAlert> {
        let pattern = self.patterns.classify(line)?;

        if !self.alerts.try_fire(AlertKey::new(target, pattern.name.as_str())) {
            return None;
        }

        let alert = Alert::new(target, pattern.name.as_str(), pattern.severity, line, self.clock.now());
        warn!(
            alert_id = %alert.id,
            severity = %alert.severity,
            pattern = %alert.pattern_name,
            namespace = %alert.namespace,
            pod = %alert.pod_name,
            "{}",
            alert.headline()
        );
        info!(alert_id = %alert.id, "Log: {}", alert.log_line);

        let advisory = match &self.advisor {
            Some(advisor) => {
                let outcome = advisor
                    .request_advisory(&pattern.name, line, &target.pod_name)
                    .await;
                info!(
                    alert_id = %alert.id,
                    cost_usd = outcome.advisory().map_or(0.0, |a| a.cost_usd),
                    "Recommendation: {outcome}"
                );
                Some(outcome)
            }
            None => None,
        };

        Some(EmittedAlert { alert, advisory })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::AdvisoryProvider;
    use crate::clock::{Clock, ManualClock};
    use crate::patterns::PatternDefinition;
    use crate::testutil::{FakeCluster, FakeProvider};
    use crate::types::{PodPhase, Severity};

    fn patterns() -> Arc<PatternSet> {
        let set = PatternSet::compile(&[
            PatternDefinition::new("OOMKilled", r"OOMKilled|out of memory", Severity::Critical),
            PatternDefinition::new("CrashLoop", r"CrashLoopBackOff|back-off restarting", Severity::Error),
            PatternDefinition::new("ConnectionRefused", r"connection refused", Severity::Warning),
        ])
        .unwrap();
        Arc::new(set)
    }

    fn monitor(cluster: &Arc<FakeCluster>, clock: &ManualClock, namespaces: &[&str]) -> Monitor {
        let config = MonitorConfig::default().with_namespaces(namespaces.iter().copied());
        Monitor::new(
            config,
            Arc::clone(cluster) as Arc<dyn ClusterClient>,
            patterns(),
            Arc::new(clock.clone()),
        )
    }

    fn advisor(provider: &Arc<FakeProvider>, clock: &ManualClock) -> AdvisoryRequester {
        AdvisoryRequester::new(
            Arc::clone(provider) as Arc<dyn AdvisoryProvider>,
            CooldownLedger::with_window_secs(300, Arc::new(clock.clone())),
        )
    }

    fn pattern_names(report: &TickReport) -> Vec<&str> {
        report
            .alerts
            .iter()
            .map(|a| a.alert.pattern_name.as_str())
            .collect()
    }

    // ==================== Config ====================

    #[test]
    fn config_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.namespaces, vec!["default".to_string()]);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.since_seconds, 60);
        assert_eq!(config.alert_dedupe_secs, 60);
    }

    #[test]
    fn namespaces_are_trimmed_and_deduplicated() {
        let config = MonitorConfig::default().with_namespaces([" prod", "", "staging", "prod "]);
        assert_eq!(config.namespaces, vec!["prod".to_string(), "staging".to_string()]);
    }

    // ==================== Alerting ====================

    #[tokio::test]
    async fn oom_alert_is_deduplicated_then_fires_again() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "worker-1"));
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["default"]);
        let line = "Container main was OOMKilled";

        cluster.push_logs("default", "worker-1", line);
        let first = monitor.run_tick().await;
        assert_eq!(pattern_names(&first), vec!["OOMKilled"]);
        assert_eq!(
            first.alerts[0].alert.headline(),
            "ALERT [CRITICAL] - OOMKilled | Pod: default/worker-1"
        );

        clock.advance_secs(30);
        cluster.push_logs("default", "worker-1", line);
        let suppressed = monitor.run_tick().await;
        assert!(suppressed.alerts.is_empty());
        assert_eq!(suppressed.lines_scanned, 1);

        clock.advance_secs(31);
        cluster.push_logs("default", "worker-1", line);
        let again = monitor.run_tick().await;
        assert_eq!(pattern_names(&again), vec!["OOMKilled"]);
    }

    #[tokio::test]
    async fn fetch_windows_follow_the_cursor() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "worker-1"));
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["default"]);

        monitor.run_tick().await;
        clock.advance_secs(30);
        monitor.run_tick().await;
        clock.advance_secs(31);
        monitor.run_tick().await;

        let ranges: Vec<LogRange> = cluster.fetches().into_iter().map(|(_, r)| r).collect();
        assert_eq!(
            ranges,
            vec![
                LogRange::SinceSeconds(60),
                LogRange::SinceSeconds(30),
                LogRange::SinceSeconds(31),
            ]
        );
    }

    #[tokio::test]
    async fn different_patterns_in_one_batch_both_alert() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "api-0"));
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["default"]);

        cluster.push_logs(
            "default",
            "api-0",
            "fatal: out of memory\nBack-off restarting failed container\n",
        );
        let report = monitor.run_tick().await;

        assert_eq!(pattern_names(&report), vec!["OOMKilled", "CrashLoop"]);
        assert_eq!(monitor.alert_ledger().len(), 2);
    }

    #[tokio::test]
    async fn repeated_line_in_one_batch_alerts_once() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "api-0"));
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["default"]);

        cluster.push_logs("default", "api-0", "OOMKilled\nOOMKilled\nOOMKilled");
        let report = monitor.run_tick().await;

        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.lines_scanned, 3);
    }

    #[tokio::test]
    async fn blank_and_unmatched_lines_raise_nothing() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "api-0"));
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["default"]);

        cluster.push_logs("default", "api-0", "GET /healthz 200\n\n   \nready\n");
        let report = monitor.run_tick().await;

        assert!(report.alerts.is_empty());
        assert_eq!(report.lines_scanned, 2);
        assert_eq!(report.pods_scanned, 1);
    }

    #[tokio::test]
    async fn alert_line_is_trimmed() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "api-0"));
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["default"]);

        cluster.push_logs("default", "api-0", "   dial tcp: connection refused   \n");
        let report = monitor.run_tick().await;

        assert_eq!(report.alerts[0].alert.log_line, "dial tcp: connection refused");
        assert_eq!(report.alerts[0].alert.severity, Severity::Warning);
        assert_eq!(report.alerts[0].alert.timestamp, clock.now());
    }

    #[tokio::test]
    async fn same_pod_name_in_two_namespaces_alerts_separately() {
        let cluster = Arc::new(
            FakeCluster::new()
                .with_running("prod", "web")
                .with_running("staging", "web"),
        );
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["prod", "staging"]);

        cluster.push_logs("prod", "web", "OOMKilled");
        cluster.push_logs("staging", "web", "OOMKilled");
        let report = monitor.run_tick().await;

        assert_eq!(report.alerts.len(), 2);
        assert_eq!(report.namespaces, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_pod_name_requests_one_advisory_across_namespaces() {
        let cluster = Arc::new(
            FakeCluster::new()
                .with_running("prod", "web")
                .with_running("staging", "web"),
        );
        let clock = ManualClock::default();
        let provider = Arc::new(
            FakeProvider::replying("Raise the memory limit.").with_delay(Duration::from_secs(2)),
        );
        let monitor = monitor(&cluster, &clock, &["prod", "staging"]).with_advisor(advisor(&provider, &clock));

        cluster.push_logs("prod", "web", "OOMKilled");
        cluster.push_logs("staging", "web", "OOMKilled");
        let report = monitor.run_tick().await;

        assert_eq!(report.alerts.len(), 2);
        assert_eq!(provider.calls(), 1);
        let outcomes: Vec<_> = report.alerts.iter().map(|a| a.advisory.clone().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|o| o.advisory().is_some()).count(), 1);
        assert!(outcomes.contains(&AdvisoryOutcome::CooldownActive));
    }

    // ==================== Discovery ====================

    #[tokio::test]
    async fn only_running_pods_are_fetched() {
        let cluster = Arc::new(
            FakeCluster::new()
                .with_running("default", "api-0")
                .with_pod("default", "job-1", PodPhase::Succeeded)
                .with_pod("default", "api-1", PodPhase::Pending),
        );
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["default"]);

        let report = monitor.run_tick().await;

        let fetched: Vec<String> = cluster
            .fetches()
            .into_iter()
            .map(|(t, _)| t.pod_name)
            .collect();
        assert_eq!(fetched, vec!["api-0".to_string()]);
        assert_eq!(report.pods_scanned, 1);
        assert_eq!(monitor.cursor().len(), 1);
    }

    #[tokio::test]
    async fn namespace_failure_does_not_stop_others() {
        let cluster = Arc::new(
            FakeCluster::new()
                .failing_namespace("restricted")
                .with_running("default", "api-0"),
        );
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["restricted", "default"]);

        cluster.push_logs("default", "api-0", "OOMKilled");
        let report = monitor.run_tick().await;

        assert_eq!(report.namespaces, 2);
        assert_eq!(report.failed_namespaces, 1);
        assert_eq!(pattern_names(&report), vec!["OOMKilled"]);
    }

    #[tokio::test]
    async fn fetch_failure_skips_only_that_pod() {
        let cluster = Arc::new(
            FakeCluster::new()
                .with_running("default", "broken")
                .with_running("default", "api-0")
                .failing_fetch("default", "broken"),
        );
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["default"]);

        cluster.push_logs("default", "api-0", "connection refused");
        let report = monitor.run_tick().await;

        assert_eq!(report.failed_fetches, 1);
        assert_eq!(report.pods_scanned, 1);
        assert_eq!(pattern_names(&report), vec!["ConnectionRefused"]);
        // The checkpoint advances even though the fetch failed.
        assert!(
            monitor
                .cursor()
                .checkpoint(&MonitorTarget::new("default", "broken"))
                .is_some()
        );
    }

    #[tokio::test]
    async fn duplicate_namespaces_are_polled_once() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "api-0"));
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["default", "default"]);

        monitor.run_tick().await;

        assert_eq!(cluster.list_calls(), 1);
        assert_eq!(cluster.fetches().len(), 1);
    }

    // ==================== Advisories ====================

    #[tokio::test]
    async fn advisories_disabled_leaves_outcome_empty() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "api-0"));
        let clock = ManualClock::default();
        let monitor = monitor(&cluster, &clock, &["default"]);

        cluster.push_logs("default", "api-0", "OOMKilled");
        let report = monitor.run_tick().await;

        assert!(monitor.advisor().is_none());
        assert!(report.alerts[0].advisory.is_none());
    }

    #[tokio::test]
    async fn advisory_cooldown_outlives_alert_dedupe() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "worker-1"));
        let clock = ManualClock::default();
        let provider = Arc::new(FakeProvider::replying("Raise the memory limit."));
        let monitor = monitor(&cluster, &clock, &["default"]).with_advisor(advisor(&provider, &clock));

        cluster.push_logs("default", "worker-1", "OOMKilled");
        let first = monitor.run_tick().await;
        assert!(matches!(
            first.alerts[0].advisory,
            Some(AdvisoryOutcome::Recommendation(_))
        ));

        clock.advance_secs(61);
        cluster.push_logs("default", "worker-1", "OOMKilled");
        let second = monitor.run_tick().await;
        assert_eq!(second.alerts.len(), 1);
        assert_eq!(second.alerts[0].advisory, Some(AdvisoryOutcome::CooldownActive));
        assert_eq!(provider.calls(), 1);

        clock.advance_secs(240);
        cluster.push_logs("default", "worker-1", "OOMKilled");
        let third = monitor.run_tick().await;
        assert!(matches!(
            third.alerts[0].advisory,
            Some(AdvisoryOutcome::Recommendation(_))
        ));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn suppressed_alert_requests_no_advisory() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "worker-1"));
        let clock = ManualClock::default();
        let provider = Arc::new(FakeProvider::failing());
        let monitor = monitor(&cluster, &clock, &["default"]).with_advisor(advisor(&provider, &clock));

        cluster.push_logs("default", "worker-1", "OOMKilled\nOOMKilled");
        let report = monitor.run_tick().await;

        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].advisory, Some(AdvisoryOutcome::Unavailable));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn provider_failure_still_emits_alert() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "worker-1"));
        let clock = ManualClock::default();
        let provider = Arc::new(FakeProvider::failing());
        let monitor = monitor(&cluster, &clock, &["default"]).with_advisor(advisor(&provider, &clock));

        cluster.push_logs("default", "worker-1", "OOMKilled");
        let first = monitor.run_tick().await;
        assert_eq!(first.alerts[0].advisory, Some(AdvisoryOutcome::Unavailable));

        clock.advance_secs(61);
        provider.set_reply("Raise the memory limit.");
        cluster.push_logs("default", "worker-1", "OOMKilled");
        let second = monitor.run_tick().await;
        assert!(matches!(
            second.alerts[0].advisory,
            Some(AdvisoryOutcome::Recommendation(_))
        ));
    }

    // ==================== Housekeeping ====================

    #[tokio::test]
    async fn expired_ledger_entries_are_swept() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "worker-1"));
        let clock = ManualClock::default();
        let provider = Arc::new(FakeProvider::replying("fix"));
        let monitor = monitor(&cluster, &clock, &["default"]).with_advisor(advisor(&provider, &clock));

        cluster.push_logs("default", "worker-1", "OOMKilled");
        monitor.run_tick().await;
        assert_eq!(monitor.alert_ledger().len(), 1);

        clock.advance_secs(120);
        monitor.run_tick().await;
        assert!(monitor.alert_ledger().is_empty());
        assert_eq!(monitor.advisor().map(|a| a.ledger().len()), Some(1));

        clock.advance_secs(300);
        monitor.run_tick().await;
        assert_eq!(monitor.advisor().map(|a| a.ledger().len()), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_until_shutdown() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "api-0"));
        let clock = ManualClock::default();
        let monitor = Arc::new(monitor(&cluster, &clock, &["default"]));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(Arc::clone(&monitor).run(rx));

        // Ticks at t=0, 30 and 60.
        tokio::time::sleep(Duration::from_secs(65)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(cluster.list_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_tick_does_not_stop_the_loop() {
        let cluster = Arc::new(FakeCluster::new().crashing_namespace("default"));
        let clock = ManualClock::default();
        let monitor = Arc::new(monitor(&cluster, &clock, &["default"]));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(Arc::clone(&monitor).run(rx));

        tokio::time::sleep(Duration::from_secs(65)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(cluster.list_calls(), 3);
    }

    #[tokio::test]
    async fn run_returns_immediately_when_already_shut_down() {
        let cluster = Arc::new(FakeCluster::new().with_running("default", "api-0"));
        let clock = ManualClock::default();
        let monitor = Arc::new(monitor(&cluster, &clock, &["default"]));
        let (_tx, rx) = watch::channel(true);

        monitor.run(rx).await;

        assert_eq!(cluster.list_calls(), 0);
    }
}
