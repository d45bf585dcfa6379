//! # claw-logwatch
//!
//! Pod log watcher for Clawbernetes clusters.
//!
//! The watcher tails the logs of every running pod in a set of namespaces,
//! flags lines that match known error signatures, and can ask a language
//! model for a short remediation hint. Two independent cooldowns keep the
//! output quiet: repeat alerts for the same pod and signature are
//! deduplicated, and advisory requests are rate-limited per signature and pod.
//!
//! This crate provides:
//!
//! - [`PatternSet`]: compiled error signatures and line classification
//! - [`LogCursor`]: per-pod checkpoints for incremental fetching
//! - [`CooldownLedger`]: time-windowed suppression, used for alerts and advisories
//! - [`AdvisoryRequester`]: cooldown-gated advisories over an [`AdvisoryProvider`]
//! - [`ClusterClient`]: pod discovery and log fetching, with [`KubeApiClient`]
//! - [`Monitor`]: the polling loop
//! - [`scan_pod`]: a one-shot scan of a single pod
//!
//! ## Example
//!
//! ```rust
//! use claw_logwatch::{PatternDefinition, PatternSet, Severity};
//!
//! let patterns = PatternSet::compile(&[
//!     PatternDefinition::new("OOMKilled", "OOMKilled|out of memory", Severity::Critical),
//!     PatternDefinition::new("CrashLoop", "CrashLoopBackOff", Severity::Error),
//! ])?;
//!
//! let hit = patterns.classify("Container main was oomkilled");
//! assert_eq!(hit.map(|p| p.name.as_str()), Some("OOMKilled"));
//! assert!(patterns.classify("GET /healthz 200").is_none());
//! # Ok::<(), claw_logwatch::WatchError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod advisory;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod cursor;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod openai;
pub mod patterns;
pub mod scan;
pub mod types;

#[cfg(test)]
mod testutil;


// Re-export main types
pub use advisory::{
    Advisory, AdvisoryOutcome, AdvisoryProvider, AdvisoryRequester, Completion, CompletionRequest,
    CostRates, TokenUsage,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use cluster::{ClusterClient, KubeApiClient, KubeApiConfig, LogRange};
pub use config::{Cli, Commands, LogFormat, ScanArgs, WatchArgs};
pub use cursor::LogCursor;
pub use error::{Result, WatchError};
pub use ledger::{
    AdvisoryKey, AdvisoryLedger, AlertKey, AlertLedger, CooldownLedger, CooldownPermit,
};
pub use monitor::{EmittedAlert, Monitor, MonitorConfig, TickReport};
pub use openai::OpenAiProvider;
pub use patterns::{PatternDefinition, PatternSet, PatternSpec};
pub use scan::{ScanMatch, ScanReport, scan_pod};
pub use types::{Alert, MonitorTarget, PodInfo, PodPhase, Severity};
