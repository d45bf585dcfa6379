//! Pod discovery and log fetching.
//!
//! [`ClusterClient`] is the seam between the monitor and the cluster. The
//! [`KubeApiClient`] implementation talks to the Kubernetes REST API with a
//! bearer token, either from the pod's service account or supplied
//! explicitly (for example when pointed at `kubectl proxy`).

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use reqwest::{Certificate, Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{Result, WatchError};
use crate::types::{MonitorTarget, PodInfo, PodPhase};

/// Service-account token mounted into every pod.
pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Cluster CA mounted into every pod.
pub const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Default timeout for cluster API calls.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Which part of a pod's log to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRange {
    /// Lines written in the last N seconds.
    SinceSeconds(u64),
    /// The last N lines.
    TailLines(u64),
}

impl LogRange {
    fn query(self) -> (&'static str, String) {
        match self {
            // The API rejects sinceSeconds=0.
            Self::SinceSeconds(secs) => ("sinceSeconds", secs.max(1).to_string()),
            Self::TailLines(lines) => ("tailLines", lines.to_string()),
        }
    }
}

/// Access to pods and their logs.
pub trait ClusterClient: Send + Sync {
    /// Lists the pods in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Discovery`] if the listing fails.
    fn list_pods<'a>(
        &'a self,
        namespace: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PodInfo>>> + Send + 'a>>;

    /// Fetches raw log text for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Fetch`] or [`WatchError::Timeout`] if the fetch fails.
    fn fetch_logs<'a>(
        &'a self,
        target: &'a MonitorTarget,
        range: LogRange,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// Connection settings for [`KubeApiClient`].
#[derive(Clone)]
pub struct KubeApiConfig {
    /// API server base URL, e.g. `https://10.0.0.1:443`.
    pub base_url: String,
    /// Bearer token, if the endpoint requires one.
    pub token: Option<String>,
    /// PEM-encoded CA bundle to trust in addition to the system roots.
    pub ca_cert_pem: Option<Vec<u8>>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for KubeApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("ca_cert", &self.ca_cert_pem.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl KubeApiConfig {
    /// Creates a configuration for an explicit endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            ca_cert_pem: None,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the in-cluster configuration from the service environment and
    /// the mounted service account.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if not running inside a cluster.
    pub fn in_cluster() -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            WatchError::Config("KUBERNETES_SERVICE_HOST is not set; not running in a cluster".to_string())
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

        let host = if host.contains(':') { format!("[{host}]") } else { host };
        let mut config = Self::new(format!("https://{host}:{port}"));
        config.token = Some(read_token(Path::new(SERVICE_ACCOUNT_TOKEN))?);
        config.ca_cert_pem = std::fs::read(SERVICE_ACCOUNT_CA).ok();
        Ok(config)
    }

    /// Resolves the configuration from explicit overrides, falling back to
    /// in-cluster settings.
    ///
    /// With an explicit `api_url` the mounted service-account token and CA
    /// are still picked up if present. An explicit `token` always wins.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no endpoint can be determined.
    pub fn resolve(api_url: Option<&str>, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut config = match api_url {
            Some(url) => {
                let mut config = Self::new(url);
                config.token = read_token(Path::new(SERVICE_ACCOUNT_TOKEN)).ok();
                config.ca_cert_pem = std::fs::read(SERVICE_ACCOUNT_CA).ok();
                config
            }
            None => Self::in_cluster()?,
        };
        if let Some(token) = token {
            config.token = Some(token.to_string());
        }
        Ok(config.with_timeout(timeout))
    }
}

fn read_token(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path).map_err(|e| {
        WatchError::Config(format!(
            "failed to read service account token '{}': {e}",
            path.display()
        ))
    })?;
    Ok(token.trim().to_string())
}

/// [`ClusterClient`] backed by the Kubernetes REST API.
#[derive(Debug, Clone)]
pub struct KubeApiClient {
    http: Client,
    config: KubeApiConfig,
}

impl KubeApiClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the CA bundle is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: KubeApiConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);
        if let Some(pem) = &config.ca_cert_pem {
            let cert = Certificate::from_pem(pem)
                .map_err(|e| WatchError::Config(format!("invalid cluster CA: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| WatchError::Config(format!("failed to build HTTP client: {e}")))?;

        debug!(base_url = %config.base_url, "cluster client ready");
        Ok(Self { http, config })
    }

    /// Returns the URL listing pods in `namespace`.
    #[must_use]
    pub fn pods_url(&self, namespace: &str) -> String {
        format!("{}/api/v1/namespaces/{namespace}/pods", self.config.base_url)
    }

    /// Returns the log URL for `target`.
    #[must_use]
    pub fn log_url(&self, target: &MonitorTarget) -> String {
        format!(
            "{}/api/v1/namespaces/{}/pods/{}/log",
            self.config.base_url, target.namespace, target.pod_name
        )
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.http.get(url);
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn classify(&self, e: &reqwest::Error) -> Option<WatchError> {
        e.is_timeout()
            .then(|| WatchError::Timeout(self.config.timeout.as_secs()))
    }
}

impl ClusterClient for KubeApiClient {
    fn list_pods<'a>(
        &'a self,
        namespace: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PodInfo>>> + Send + 'a>> {
        Box::pin(async move {
            let discovery_err = |e: reqwest::Error| {
                self.classify(&e).unwrap_or_else(|| WatchError::Discovery {
                    namespace: namespace.to_string(),
                    reason: e.to_string(),
                })
            };

            let body = self
                .get(&self.pods_url(namespace))
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(discovery_err)?
                .text()
                .await
                .map_err(discovery_err)?;

            let pods = parse_pod_list(&body).map_err(|e| WatchError::Discovery {
                namespace: namespace.to_string(),
                reason: e.to_string(),
            })?;
            trace!(namespace = %namespace, pods = pods.len(), "listed pods");
            Ok(pods)
        })
    }

    fn fetch_logs<'a>(
        &'a self,
        target: &'a MonitorTarget,
        range: LogRange,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let fetch_err = |e: reqwest::Error| {
                self.classify(&e).unwrap_or_else(|| WatchError::Fetch {
                    target: target.to_string(),
                    reason: e.to_string(),
                })
            };

            self.get(&self.log_url(target))
                .query(&[range.query()])
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(fetch_err)?
                .text()
                .await
                .map_err(fetch_err)
        })
    }
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMetadata,
    #[serde(default)]
    status: Option<PodStatus>,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
}

/// Parses a `v1/PodList` response body.
///
/// # Errors
///
/// Returns a serialization error if the body is not a pod list.
pub fn parse_pod_list(body: &str) -> Result<Vec<PodInfo>> {
    let list: PodList = serde_json::from_str(body)?;
    Ok(list
        .items
        .into_iter()
        .map(|pod| {
            let phase = pod
                .status
                .and_then(|s| s.phase)
                .map_or(PodPhase::Unknown, |p| PodPhase::parse(&p));
            PodInfo::new(pod.metadata.name, phase)
        })
        .collect())
}
