// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Background resolution of EXTERNPROTO documents.
//!
//! Each EXTERNPROTO class gets one worker thread that fetches the first
//! reachable candidate URL, parses it, and sends exactly one [`Outcome`] back
//! over a channel. Workers own their inputs and the sending half of the
//! channel only; they never see the world. The world applies outcomes on its
//! own thread when it drains the channel.
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::externproto::ExternClassId;
use crate::template::TemplateModel;

/// A fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// URL the bytes actually came from.
    pub url: String,
    /// Raw document bytes.
    pub bytes: Bytes,
}

/// Fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// None of the candidate URLs could be fetched.
    #[error("no candidate could be fetched: {}", .candidates.join(", "))]
    Unreachable {
        /// Candidates tried, in order.
        candidates: Vec<String>,
    },
    /// A transport error on one URL.
    #[error("{url}: {message}")]
    Transport {
        /// Failing URL.
        url: String,
        /// Transport message.
        message: String,
    },
    /// The world was built without a fetcher.
    #[error("no resource fetcher configured")]
    Unavailable,
}

/// Parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{url}: {message}")]
pub struct ParseError {
    /// Document URL.
    pub url: String,
    /// Parser message.
    pub message: String,
}

/// Why an EXTERNPROTO could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Fetching failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Parsing failed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The document parsed but no candidate named a template in it.
    #[error("no PROTO definition at {url}")]
    NoTemplate {
        /// Document URL.
        url: String,
    },
    /// The worker ended without reporting (it panicked).
    #[error("resolver worker for `{0}` stopped without a result")]
    WorkerPanicked(String),
    /// The worker thread could not be started.
    #[error("could not start resolver worker: {0}")]
    Spawn(String),
}

/// Fetches the first reachable of several candidate URLs.
pub trait ResourceFetcher: Send + Sync {
    /// Tries `candidates` in order.
    fn fetch(&self, candidates: &[String]) -> Result<Resource, FetchError>;
}

/// Turns a fetched document into the templates it defines.
pub trait DocumentParser: Send + Sync {
    /// Parses every PROTO in `resource`, in document order.
    fn parse(&self, resource: &Resource) -> Result<Vec<ParsedTemplate>, ParseError>;
}

/// One template from a parsed document.
#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    /// PROTO name inside the document.
    pub name: String,
    /// Definition.
    pub model: Arc<TemplateModel>,
}

/// Every template of one document.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// URL the document came from.
    pub url: String,
    /// Templates in document order.
    pub templates: Vec<ParsedTemplate>,
}

/// Port used when a world has no fetcher or parser.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Unavailable;

impl ResourceFetcher for Unavailable {
    fn fetch(&self, _candidates: &[String]) -> Result<Resource, FetchError> {
        Err(FetchError::Unavailable)
    }
}

impl DocumentParser for Unavailable {
    fn parse(&self, resource: &Resource) -> Result<Vec<ParsedTemplate>, ParseError> {
        Err(ParseError {
            url: resource.url.clone(),
            message: "no document parser configured".to_owned(),
        })
    }
}

/// What a worker reports.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) class: ExternClassId,
    pub(crate) result: Result<ParsedDocument, ResolveError>,
}

/// Sends the worker's single reply; reports `WorkerPanicked` if dropped unsent.
struct Reply {
    class: ExternClassId,
    id: String,
    tx: Sender<Outcome>,
    sent: bool,
}

impl Reply {
    fn send(mut self, result: Result<ParsedDocument, ResolveError>) {
        self.sent = true;
        let outcome = Outcome {
            class: self.class,
            result,
        };
        if self.tx.send(outcome).is_err() {
            debug!(class = %self.id, "world went away before resolution finished");
        }
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if !self.sent {
            let outcome = Outcome {
                class: self.class,
                result: Err(ResolveError::WorkerPanicked(self.id.clone())),
            };
            if self.tx.send(outcome).is_err() {
                debug!(class = %self.id, "world went away before resolution finished");
            }
        }
    }
}

#[instrument(skip_all, fields(class = %reply.id))]
fn resolve(
    reply: Reply,
    candidates: &[String],
    fetcher: &dyn ResourceFetcher,
    parser: &dyn DocumentParser,
) {
    let result = fetcher
        .fetch(candidates)
        .map_err(ResolveError::from)
        .and_then(|resource| {
            debug!(url = %resource.url, bytes = resource.bytes.len(), "fetched");
            let templates = parser.parse(&resource)?;
            Ok(ParsedDocument {
                url: resource.url,
                templates,
            })
        });
    reply.send(result);
}

/// Worker pool plus the receiving end of the outcome channel.
pub(crate) struct Resolver {
    fetcher: Arc<dyn ResourceFetcher>,
    parser: Arc<dyn DocumentParser>,
    tx: Sender<Outcome>,
    rx: Receiver<Outcome>,
    workers: Vec<JoinHandle<()>>,
    outstanding: usize,
    thread_name: String,
}

impl Resolver {
    pub(crate) fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        parser: Arc<dyn DocumentParser>,
        thread_name: String,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            fetcher,
            parser,
            tx,
            rx,
            workers: Vec::new(),
            outstanding: 0,
            thread_name,
        }
    }

    pub(crate) fn spawn(
        &mut self,
        class: ExternClassId,
        id: &str,
        candidates: Vec<String>,
    ) -> Result<(), ResolveError> {
        let reply = Reply {
            class,
            id: id.to_owned(),
            tx: self.tx.clone(),
            sent: false,
        };
        let fetcher = Arc::clone(&self.fetcher);
        let parser = Arc::clone(&self.parser);
        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.thread_name, class.0))
            .spawn(move || resolve(reply, &candidates, fetcher.as_ref(), parser.as_ref()))
            .map_err(|e| ResolveError::Spawn(e.to_string()))?;
        self.workers.push(handle);
        self.outstanding += 1;
        Ok(())
    }

    /// Resolutions still expected on the channel.
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub(crate) fn try_next(&mut self) -> Option<Outcome> {
        match self.rx.try_recv() {
            Ok(outcome) => {
                self.outstanding = self.outstanding.saturating_sub(1);
                Some(outcome)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub(crate) fn next_blocking(&mut self) -> Option<Outcome> {
        if self.outstanding == 0 {
            return None;
        }
        let outcome = self.rx.recv().ok()?;
        self.outstanding = self.outstanding.saturating_sub(1);
        Some(outcome)
    }

    /// Joins workers that have already finished.
    pub(crate) fn reap(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) =
            self.workers.drain(..).partition(|h| h.is_finished());
        self.workers = running;
        join(done);
    }

    /// Joins every worker, waiting for the ones still running.
    pub(crate) fn join_all(&mut self) {
        join(self.workers.drain(..));
    }
}

fn join(handles: impl IntoIterator<Item = JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            warn!("EXTERNPROTO resolver worker panicked");
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("workers", &self.workers.len())
            .field("outstanding", &self.outstanding)
            .field("thread_name", &self.thread_name)
            .finish_non_exhaustive()
    }
}

/// Makes `uri` absolute against `base` (a document URL), RFC 3986 style.
///
/// Absolute URIs, hierarchical or not (`urn:`, `data:`), are kept as
/// written. Without a usable base the reference is returned unchanged.
pub(crate) fn absolutize(base: Option<&str>, uri: &str) -> String {
    if Url::parse(uri).is_ok() {
        return uri.to_owned();
    }
    base.and_then(|base| Url::parse(base).ok())
        .and_then(|base| base.join(uri).ok())
        .map_or_else(|| uri.to_owned(), String::from)
}

/// Splits `uri` into document URL and optional fragment.
///
/// Absolute URLs come back normalized, so two spellings of one document
/// compare equal.
pub(crate) fn split_fragment(uri: &str) -> (String, Option<String>) {
    match Url::parse(uri) {
        Ok(mut url) => {
            let fragment = url.fragment().map(str::to_owned);
            url.set_fragment(None);
            (url.into(), fragment)
        }
        Err(_) => match uri.split_once('#') {
            Some((document, fragment)) => (document.to_owned(), Some(fragment.to_owned())),
            None => (uri.to_owned(), None),
        },
    }
}
