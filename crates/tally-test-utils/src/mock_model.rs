// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted analysis model for deterministic pipeline tests.
//!
//! Scripts are popped from a FIFO queue, one per `analyze` call. A script
//! can end normally, fail after some fragments, or hang forever.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use tally_core::{
    AdapterType, AnalysisModel, AnalysisRequest, ExpenseAnalysis, FragmentStream, HealthStatus,
    PluginAdapter, TallyError,
};
use tokio::sync::Mutex;

/// One scripted model response.
#[derive(Debug, Clone, Default)]
pub struct ModelScript {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    hang_after: Option<usize>,
    delay: Option<Duration>,
}

impl ModelScript {
    /// Emit `fragments` in order, then end.
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Emit `analysis` as JSON split into `pieces` fragments.
    pub fn analysis(analysis: &ExpenseAnalysis, pieces: usize) -> Self {
        let json = serde_json::to_string(analysis).unwrap_or_default();
        Self::fragments(split_json(&json, pieces))
    }

    /// Yield a provider error after `n` fragments.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Stop producing after `n` fragments without ever ending.
    pub fn hanging_after(mut self, n: usize) -> Self {
        self.hang_after = Some(n);
        self
    }

    /// Sleep before each fragment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Split `json` into `pieces` chunks of roughly equal character count.
pub fn split_json(json: &str, pieces: usize) -> Vec<String> {
    let chars: Vec<char> = json.chars().collect();
    let size = chars.len().div_ceil(pieces.max(1)).max(1);
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

/// Sets a flag when the fragment stream it travels with is dropped.
struct DropFlag(Arc<AtomicUsize>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A mock model returning pre-configured fragment scripts.
pub struct MockAnalysisModel {
    scripts: Arc<Mutex<VecDeque<ModelScript>>>,
    requests: Arc<Mutex<Vec<AnalysisRequest>>>,
    fail_start: AtomicBool,
    calls: AtomicUsize,
    dropped: Arc<AtomicUsize>,
}

impl MockAnalysisModel {
    pub fn new() -> Self {
        Self::with_scripts(Vec::new())
    }

    pub fn with_scripts(scripts: Vec<ModelScript>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::from(scripts))),
            requests: Arc::new(Mutex::new(Vec::new())),
            fail_start: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn add_script(&self, script: ModelScript) {
        self.scripts.lock().await.push_back(script);
    }

    /// Make `analyze` fail before any stream exists.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fragment streams dropped so far, finished or not.
    pub fn streams_dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Every request received, oldest first.
    pub async fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockAnalysisModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockAnalysisModel {
    fn name(&self) -> &str {
        "mock-model"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Model
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        Ok(())
    }
}

#[async_trait]
impl AnalysisModel for MockAnalysisModel {
    async fn analyze(&self, request: AnalysisRequest) -> Result<FragmentStream, TallyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(TallyError::provider("mock model unavailable"));
        }
        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| TallyError::provider("no scripted response left"))?;

        let cut = match (script.fail_after, script.hang_after) {
            (Some(f), Some(h)) => f.min(h),
            (Some(n), None) | (None, Some(n)) => n,
            (None, None) => script.fragments.len(),
        };
        let delay = script.delay;
        let flag = DropFlag(Arc::clone(&self.dropped));

        let body = stream::iter(script.fragments.into_iter().take(cut)).then(move |fragment| {
            async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(fragment)
            }
        });
        let tail: FragmentStream = if script.fail_after.is_some_and(|f| f == cut) {
            stream::once(async { Err(TallyError::provider("mock stream failure")) }).boxed()
        } else if script.hang_after.is_some() {
            stream::pending().boxed()
        } else {
            stream::empty().boxed()
        };

        Ok(body
            .chain(tail)
            .map(move |item| {
                let _keep = &flag;
                item
            })
            .boxed())
    }
}
