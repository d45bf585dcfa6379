//! Command-line and environment configuration.
//!
//! Every setting can come from a flag or its environment variable, so the
//! watcher can be configured entirely from a pod manifest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::advisory::AdvisoryRequester;
use crate::clock::SharedClock;
use crate::cluster::{DEFAULT_FETCH_TIMEOUT, KubeApiClient, KubeApiConfig};
use crate::error::{Result, WatchError};
use crate::ledger::CooldownLedger;
use crate::monitor::MonitorConfig;
use crate::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAiProvider};
use crate::patterns::PatternSet;

/// Default pattern document location.
pub const DEFAULT_PATTERNS_FILE: &str = "/config/patterns.json";

/// Default advisory cooldown, in seconds.
pub const DEFAULT_LLM_COOLDOWN_SECONDS: u64 = 300;

/// Watches Kubernetes pod logs for known error signatures.
#[derive(Parser, Debug, Clone)]
#[command(name = "claw-logwatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Continuously watch pod logs and raise alerts.
    Watch(WatchArgs),

    /// Scan one pod's recent log and report every match.
    Scan(ScanArgs),
}

/// Cluster connection settings.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Kubernetes API URL; defaults to the in-cluster endpoint.
    #[arg(long, env = "KUBE_API_URL")]
    pub kube_api_url: Option<String>,

    /// Bearer token; defaults to the mounted service-account token.
    #[arg(long, env = "KUBE_TOKEN", hide_env_values = true)]
    pub kube_token: Option<String>,

    /// Timeout for each cluster API call, in seconds.
    #[arg(long, env = "FETCH_TIMEOUT_SECONDS", default_value_t = DEFAULT_FETCH_TIMEOUT.as_secs())]
    pub fetch_timeout_secs: u64,
}

impl ClusterArgs {
    /// Resolves the API endpoint and credentials.
    pub fn kube_config(&self) -> Result<KubeApiConfig> {
        KubeApiConfig::resolve(
            self.kube_api_url.as_deref(),
            self.kube_token.as_deref(),
            Duration::from_secs(self.fetch_timeout_secs),
        )
    }

    /// Builds the cluster client.
    pub fn client(&self) -> Result<KubeApiClient> {
        KubeApiClient::new(self.kube_config()?)
    }
}

/// Advisory provider settings.
#[derive(Args, Debug, Clone)]
pub struct AdvisoryArgs {
    /// API key for the chat-completions endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of the chat-completions API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// Model used for advisories.
    #[arg(long, env = "ADVISORY_MODEL", default_value = DEFAULT_MODEL)]
    pub advisory_model: String,

    /// Timeout for each advisory request, in seconds.
    #[arg(long, env = "ADVISORY_TIMEOUT_SECONDS", default_value_t = 25)]
    pub advisory_timeout_secs: u64,
}

impl AdvisoryArgs {
    /// Returns the API key if one is set and non-blank.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Builds a requester whose cooldown window is `cooldown_secs`.
    pub fn requester(&self, cooldown_secs: u64, clock: SharedClock) -> Result<AdvisoryRequester> {
        let key = self
            .api_key()
            .ok_or_else(|| WatchError::Config("OPENAI_API_KEY is not set".to_string()))?;
        let timeout = Duration::from_secs(self.advisory_timeout_secs);
        let provider = OpenAiProvider::new(
            self.openai_base_url.as_str(),
            key,
            self.advisory_model.as_str(),
            timeout,
        )?;

        Ok(AdvisoryRequester::new(
            Arc::new(provider),
            CooldownLedger::with_window_secs(cooldown_secs, clock),
        )
        .with_timeout(timeout))
    }
}

/// Arguments for `watch`.
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Comma-separated namespaces to watch.
    #[arg(long = "namespaces", env = "TARGET_NAMESPACES", default_value = "default")]
    pub namespaces: String,

    /// Seconds to wait between polls.
    #[arg(
        long = "poll-interval",
        env = "POLL_INTERVAL_SECONDS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_secs: u64,

    /// How far back the first fetch for a pod reaches, in seconds.
    #[arg(long = "since", env = "SINCE_SECONDS", default_value_t = 60)]
    pub since_seconds: u64,

    /// Window during which repeat alerts are suppressed, in seconds.
    #[arg(long = "alert-dedupe", env = "ALERT_DEDUPE_SECONDS", default_value_t = 60)]
    pub alert_dedupe_secs: u64,

    /// Window during which repeat advisories are suppressed, in seconds.
    #[arg(long = "llm-cooldown", env = "LLM_COOLDOWN_SECONDS", default_value_t = DEFAULT_LLM_COOLDOWN_SECONDS)]
    pub llm_cooldown_secs: u64,

    /// Request a remediation advisory for each alert.
    ///
    /// Only `true` (any case) enables advisories; every other value leaves
    /// them off.
    #[arg(
        long = "enable-llm-recommendations",
        env = "ENABLE_LLM_RECOMMENDATIONS",
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = parse_enabled
    )]
    pub enable_llm: bool,

    /// Pattern document (JSON, or a manifest embedding it).
    #[arg(long, env = "PATTERNS_FILE", default_value = DEFAULT_PATTERNS_FILE)]
    pub patterns_file: PathBuf,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub cluster: ClusterArgs,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub advisory: AdvisoryArgs,
}

impl WatchArgs {
    /// Builds the monitor configuration.
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        Ok(MonitorConfig::default()
            .with_namespaces(parse_namespaces(&self.namespaces)?)
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_since_seconds(self.since_seconds)
            .with_alert_dedupe_secs(self.alert_dedupe_secs))
    }

    /// Builds the advisory requester if advisories are enabled.
    ///
    /// # Errors
    ///
    /// Enabling advisories without an API key is a configuration error.
    pub fn advisor(&self, clock: SharedClock) -> Result<Option<AdvisoryRequester>> {
        if !self.enable_llm {
            return Ok(None);
        }
        self.advisory
            .requester(self.llm_cooldown_secs, clock)
            .map(Some)
    }

    /// Loads the pattern set.
    pub fn load_patterns(&self) -> Result<PatternSet> {
        PatternSet::load(&self.patterns_file)
    }
}

/// Arguments for `scan`.
#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Pod name.
    pub pod: String,

    /// Namespace of the pod.
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Number of trailing log lines to scan.
    #[arg(long, default_value_t = crate::scan::DEFAULT_TAIL_LINES)]
    pub tail: u64,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Pattern document (JSON, or a manifest embedding it).
    #[arg(long, env = "PATTERNS_FILE", default_value = DEFAULT_PATTERNS_FILE)]
    pub patterns_file: PathBuf,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub cluster: ClusterArgs,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub advisory: AdvisoryArgs,
}

impl ScanArgs {
    /// Builds the advisory requester when an API key is available.
    pub fn advisor(&self, clock: SharedClock) -> Result<Option<AdvisoryRequester>> {
        if self.advisory.api_key().is_none() {
            return Ok(None);
        }
        self.advisory
            .requester(DEFAULT_LLM_COOLDOWN_SECONDS, clock)
            .map(Some)
    }

    /// Loads the pattern set.
    pub fn load_patterns(&self) -> Result<PatternSet> {
        PatternSet::load(&self.patterns_file)
    }
}

/// Parses a comma-separated namespace list.
///
/// Names are trimmed; blanks and repeats are dropped.
///
/// # Errors
///
/// Returns a configuration error if no namespace remains.
pub fn parse_namespaces(raw: &str) -> Result<Vec<String>> {
    let namespaces = MonitorConfig::default()
        .with_namespaces(raw.split(','))
        .namespaces;
    if namespaces.is_empty() {
        return Err(WatchError::Config(
            "TARGET_NAMESPACES must name at least one namespace".to_string(),
        ));
    }
    Ok(namespaces)
}

#[allow(clippy::unnecessary_wraps)]
fn parse_enabled(raw: &str) -> std::result::Result<bool, std::convert::Infallible> {
    Ok(raw.eq_ignore_ascii_case("true"))
}
