//! In-memory fakes for the cluster and advisory seams.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::advisory::{AdvisoryProvider, Completion, CompletionRequest, TokenUsage};
use crate::cluster::{ClusterClient, LogRange};
use crate::error::{Result, WatchError};
use crate::types::{MonitorTarget, PodInfo, PodPhase};

/// Provider returning a canned reply, or failing when none is set.
pub struct FakeProvider {
    reply: Mutex<Option<String>>,
    last_max_tokens: Mutex<Option<u32>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeProvider {
    pub const USAGE: TokenUsage = TokenUsage {
        prompt_tokens: 60,
        completion_tokens: 40,
        total_tokens: 100,
    };

    pub fn replying(text: &str) -> Self {
        Self {
            reply: Mutex::new(Some(text.to_string())),
            last_max_tokens: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn failing() -> Self {
        let provider = Self::replying("");
        *provider.reply.lock() = None;
        provider
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_reply(&self, text: &str) {
        *self.reply.lock() = Some(text.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_max_tokens(&self) -> Option<u32> {
        *self.last_max_tokens.lock()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl AdvisoryProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_max_tokens.lock() = Some(request.max_tokens);
            self.prompts.lock().push(request.prompt.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let reply = self.reply.lock().clone();
            reply
                .map(|text| Completion {
                    text,
                    usage: Self::USAGE,
                })
                .ok_or_else(|| WatchError::Provider("fake provider failure".to_string()))
        })
    }
}

/// Cluster with scripted pods and log chunks.
///
/// Each fetch for a target pops the next queued chunk; an empty queue yields
/// an empty log.
#[derive(Default)]
pub struct FakeCluster {
    pods: Mutex<HashMap<String, Vec<PodInfo>>>,
    logs: Mutex<HashMap<MonitorTarget, VecDeque<String>>>,
    failing_namespaces: Mutex<HashSet<String>>,
    failing_targets: Mutex<HashSet<MonitorTarget>>,
    crashing_namespaces: Mutex<HashSet<String>>,
    fetches: Mutex<Vec<(MonitorTarget, LogRange)>>,
    list_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(self, namespace: &str, pod: &str, phase: PodPhase) -> Self {
        self.pods
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .push(PodInfo::new(pod, phase));
        self
    }

    pub fn with_running(self, namespace: &str, pod: &str) -> Self {
        self.with_pod(namespace, pod, PodPhase::Running)
    }

    pub fn failing_namespace(self, namespace: &str) -> Self {
        self.failing_namespaces.lock().insert(namespace.to_string());
        self
    }

    /// Listing this namespace panics, as a bug in a client would.
    pub fn crashing_namespace(self, namespace: &str) -> Self {
        self.crashing_namespaces.lock().insert(namespace.to_string());
        self
    }

    pub fn failing_fetch(self, namespace: &str, pod: &str) -> Self {
        self.failing_targets
            .lock()
            .insert(MonitorTarget::new(namespace, pod));
        self
    }

    pub fn push_logs(&self, namespace: &str, pod: &str, text: &str) {
        self.logs
            .lock()
            .entry(MonitorTarget::new(namespace, pod))
            .or_default()
            .push_back(text.to_string());
    }

    pub fn fetches(&self) -> Vec<(MonitorTarget, LogRange)> {
        self.fetches.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl ClusterClient for FakeCluster {
    #[allow(clippy::panic)]
    fn list_pods<'a>(
        &'a self,
        namespace: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PodInfo>>> + Send + 'a>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.crashing_namespaces.lock().contains(namespace) {
                panic!("listing {namespace} crashed");
            }
            if self.failing_namespaces.lock().contains(namespace) {
                return Err(WatchError::Discovery {
                    namespace: namespace.to_string(),
                    reason: "forbidden".to_string(),
                });
            }
            Ok(self.pods.lock().get(namespace).cloned().unwrap_or_default())
        })
    }

    fn fetch_logs<'a>(
        &'a self,
        target: &'a MonitorTarget,
        range: LogRange,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.fetches.lock().push((target.clone(), range));
            if self.failing_targets.lock().contains(target) {
                return Err(WatchError::Fetch {
                    target: target.to_string(),
                    reason: "container not found".to_string(),
                });
            }
            Ok(self
                .logs
                .lock()
                .get_mut(target)
                .and_then(VecDeque::pop_front)
                .unwrap_or_default())
        })
    }
}
