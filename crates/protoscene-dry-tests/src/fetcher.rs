// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory resource fetcher for EXTERNPROTO tests.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use bytes::Bytes;
use protoscene_core::{FetchError, Resource, ResourceFetcher};

/// A latch that holds fetches until a test opens it.
///
/// Cloned gates share state, so a test can keep one handle and give the
/// other to a [`MemoryFetcher`].
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    /// A closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the gate and wakes every waiting fetch. Opening twice is fine.
    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cvar.notify_all();
    }

    /// `true` once [`open`](Self::open) was called.
    pub fn is_open(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut open = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*open {
            open = cvar.wait(open).unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate").field("open", &self.is_open()).finish()
    }
}

/// In-memory [`ResourceFetcher`].
///
/// Documents are keyed by URL without fragment. Each call tries the
/// candidates in order and returns the first stored document; the call and
/// the candidates it saw are recorded for later assertions.
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    inner: Arc<Mutex<MemoryFetcherInner>>,
    gate: Option<Gate>,
}

#[derive(Default)]
struct MemoryFetcherInner {
    documents: HashMap<String, Bytes>,
    requests: Vec<Vec<String>>,
}

impl MemoryFetcher {
    /// Empty fetcher: every fetch fails as unreachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document, builder style.
    pub fn with_document(self, url: &str, bytes: impl Into<Bytes>) -> Self {
        self.insert(url, bytes);
        self
    }

    /// Holds every fetch until `gate` opens.
    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Adds or replaces a document.
    pub fn insert(&self, url: &str, bytes: impl Into<Bytes>) {
        self.lock().documents.insert(url.to_owned(), bytes.into());
    }

    /// Number of fetch calls so far (attempted, not successful).
    pub fn fetch_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Candidate lists of every fetch call, in call order.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryFetcherInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for MemoryFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryFetcher")
            .field("documents", &inner.documents.len())
            .field("requests", &inner.requests.len())
            .field("gate", &self.gate)
            .finish()
    }
}

impl ResourceFetcher for MemoryFetcher {
    fn fetch(&self, candidates: &[String]) -> Result<Resource, FetchError> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        let mut inner = self.lock();
        inner.requests.push(candidates.to_vec());
        candidates
            .iter()
            .find_map(|candidate| {
                let document = candidate.split_once('#').map_or(candidate.as_str(), |(d, _)| d);
                inner.documents.get(document).map(|bytes| Resource {
                    url: document.to_owned(),
                    bytes: bytes.clone(),
                })
            })
            .ok_or_else(|| FetchError::Unreachable {
                candidates: candidates.to_vec(),
            })
    }
}
