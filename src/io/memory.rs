use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::task::Poll;

use futures::FutureExt;
use futures::future::poll_fn;
use serde_json::json;

use crate::io::fetcher::{FetchError, FetchFuture, FetchResponse, Fetcher};

#[derive(Debug, Clone)]
enum Scripted {
    Response(FetchResponse),
    TransportFailure(String),
}

/// Serves urls from memory. Counts every fetch and can hold back all responses, which makes
/// it the transport of choice for tests and for tooling that already has the bytes.
#[derive(Default)]
pub struct MemoryFetcher {
    files: RwLock<HashMap<String, Scripted>>,
    calls: AtomicUsize,
    paused: Arc<AtomicBool>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.insert_response(url, 200, body);
    }

    pub fn insert_response(&self, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) {
        self.files.write().expect("Files write lock").insert(
            url.into(),
            Scripted::Response(FetchResponse {
                status,
                body: body.into(),
            }),
        );
    }

    pub fn fail_transport(&self, url: impl Into<String>, reason: impl Into<String>) {
        self.files
            .write()
            .expect("Files write lock")
            .insert(url.into(), Scripted::TransportFailure(reason.into()));
    }

    /// While paused, fetches stay pending. They complete on the first poll after resuming.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let url = url.to_string();
        let scripted = self
            .files
            .read()
            .expect("Files read lock")
            .get(&url)
            .cloned();
        let paused = self.paused.clone();

        let mut outcome = Some(match scripted {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::TransportFailure(reason)) => Err(FetchError::TransportFailure { url, reason }),
            None => Ok(FetchResponse {
                status: 404,
                body: json!({ "message": format!("{} not found", url) })
                    .to_string()
                    .into_bytes(),
            }),
        });

        poll_fn(move |_| {
            if paused.load(Ordering::SeqCst) {
                return Poll::Pending;
            }
            match outcome.take() {
                Some(outcome) => Poll::Ready(outcome),
                None => Poll::Pending,
            }
        })
        .boxed()
    }
}
