//! Scripted in-memory backend for unit tests

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

use super::backend::{FragmentStream, ModelBackend};

/// One step of a scripted generation
#[derive(Debug, Clone)]
pub enum Step {
    Text(String),
    Fail(String),
    /// Never resolves; used to observe cancellation
    Hang,
}

#[derive(Debug)]
pub struct MockBackend {
    dims: usize,
    healthy: AtomicBool,
    failing_probes: AtomicU32,
    probes: AtomicU32,
    embed_calls: AtomicU32,
    fail_embeddings: AtomicBool,
    complete_calls: AtomicU32,
    fail_complete_containing: Mutex<Option<String>>,
    scripts: Mutex<VecDeque<Vec<Step>>>,
    prompts: Mutex<Vec<String>>,
    live_streams: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_dims(8)
    }

    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims,
            healthy: AtomicBool::new(true),
            failing_probes: AtomicU32::new(0),
            probes: AtomicU32::new(0),
            embed_calls: AtomicU32::new(0),
            fail_embeddings: AtomicBool::new(false),
            complete_calls: AtomicU32::new(0),
            fail_complete_containing: Mutex::new(None),
            scripts: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            live_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Fail the next `n` probes, then report healthy
    pub fn fail_probes(&self, n: u32) {
        self.failing_probes.store(n, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn embed_count(&self) -> u32 {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn complete_count(&self) -> u32 {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_embeddings(&self, fail: bool) {
        self.fail_embeddings.store(fail, Ordering::SeqCst);
    }

    /// Make `complete` fail for prompts containing `marker`
    pub fn fail_complete_containing(&self, marker: &str) {
        *self.fail_complete_containing.lock() = Some(marker.to_string());
    }

    /// Queue the steps of the next `generate` call
    pub fn script(&self, steps: Vec<Step>) {
        self.scripts.lock().push_back(steps);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }
}

/// Bag-of-words vector so texts sharing words land close together
pub fn word_vector(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    for word in text.split_whitespace() {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
        v[bucket as usize % dims] += 1.0;
    }
    v
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(Error::llm("embedding backend down"));
        }
        Ok(word_vector(text, self.dims))
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = self.fail_complete_containing.lock().as_deref() {
            if prompt.contains(marker) {
                return Err(Error::llm("completion failed"));
            }
        }
        Ok(format!("generated {}", prompt.len()))
    }

    async fn generate(&self, prompt: &str) -> Result<FragmentStream> {
        self.prompts.lock().push(prompt.to_string());
        let steps = self.scripts.lock().pop_front().unwrap_or_default();

        self.live_streams.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(self.live_streams.clone());

        let stream = async_stream::stream! {
            let _guard = guard;
            for step in steps {
                match step {
                    Step::Text(text) => yield Ok(text),
                    Step::Fail(message) => yield Err(Error::llm(message)),
                    Step::Hang => futures::future::pending::<()>().await,
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_probes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_probes.store(failing - 1, Ordering::SeqCst);
            return Ok(false);
        }
        Ok(self.healthy.load(Ordering::SeqCst))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
