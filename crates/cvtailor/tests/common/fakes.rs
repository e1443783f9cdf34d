//! In-process doubles for the pipeline's collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use cvtailor::blob::{BlobError, BlobStore};
use cvtailor::processor::{DocumentFormat, OcrEngine};
use cvtailor::tailor::{CompletionClient, CompletionError};
use cvtailor::ExtractionError;

/// Blob store backed by a map. Missing paths are `NotFound`.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
    stalled: AtomicBool,
}

impl MemoryBlobStore {
    pub fn put(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.into());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Makes every later fetch hang forever.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                path: path.to_string(),
            })
    }
}

/// OCR engine returning fixed text and counting calls.
pub struct CountingOcr {
    text: String,
    calls: AtomicUsize,
}

impl CountingOcr {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for CountingOcr {
    fn recognize(&self, _bytes: &[u8], _format: DocumentFormat) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Completion client that plays back scripted replies, then echoes the
/// user prompt once the script is exhausted.
#[derive(Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn push_reply(&self, reply: &str) {
        self.script.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn push_failure(&self, error: CompletionError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Ok(format!("# Tailored resume\n\n{}", user_prompt)),
        }
    }
}

/// Completion client that holds every call until the gate is opened.
pub struct GatedCompletion {
    gate: Arc<Semaphore>,
}

impl GatedCompletion {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(1024);
    }
}

#[async_trait]
impl CompletionClient for GatedCompletion {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        Ok(format!("# Tailored resume\n\n{}", user_prompt))
    }
}

/// Completion client that panics on its first call, then echoes.
#[derive(Default)]
pub struct PanicOnceCompletion {
    panicked: AtomicBool,
}

#[async_trait]
impl CompletionClient for PanicOnceCompletion {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError> {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("completion client exploded");
        }
        Ok(format!("# Tailored resume\n\n{}", user_prompt))
    }
}
