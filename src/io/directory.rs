use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use log::{trace, warn};
use serde_json::json;
use tokio::runtime::Handle;

use crate::io::fetcher::{FetchError, FetchFuture, FetchResponse, Fetcher};

/// Serves urls from local directories. Reads run as tasks on a tokio runtime, so the scheduler
/// only ever polls the join handle.
pub struct DirectoryFetcher {
    /// Searched in order, the first directory containing the file wins.
    prioritized_roots: Arc<Vec<PathBuf>>,
    runtime: Handle,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>, runtime: Handle) -> Self {
        Self::with_roots(vec![root.into()], runtime)
    }

    pub fn with_roots(prioritized_roots: Vec<PathBuf>, runtime: Handle) -> Self {
        DirectoryFetcher {
            prioritized_roots: Arc::new(prioritized_roots),
            runtime,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.prioritized_roots
    }

    async fn read(roots: &[PathBuf], url: &str) -> Result<FetchResponse, FetchError> {
        let Some(relative) = relative_path(url) else {
            warn!("Refusing to read {} outside of the data directories", url);
            return Ok(FetchResponse {
                status: 403,
                body: json!({ "message": format!("{} is outside of the data directories", url) })
                    .to_string()
                    .into_bytes(),
            });
        };

        for root in roots {
            let path = root.join(&relative);
            match tokio::fs::read(&path).await {
                Ok(body) => {
                    trace!("Loading {} from {}", url, root.display());
                    return Ok(FetchResponse::ok(body));
                }
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(FetchError::TransportFailure {
                        url: url.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        warn!("Could not locate {}!", url);
        Ok(FetchResponse {
            status: 404,
            body: json!({ "message": format!("{} not found", url) })
                .to_string()
                .into_bytes(),
        })
    }
}

/// Only plain names are resolved below a root, `..`, `.` and absolute parts are refused.
fn relative_path(url: &str) -> Option<PathBuf> {
    let relative = Path::new(url.trim_start_matches('/'));
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
        .then(|| relative.to_path_buf())
}

impl Fetcher for DirectoryFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        let roots = self.prioritized_roots.clone();
        let owned_url = url.to_string();
        let task = self
            .runtime
            .spawn(async move { DirectoryFetcher::read(&roots, &owned_url).await });

        let url = url.to_string();
        async move {
            match task.await {
                Ok(result) => result,
                Err(err) => Err(FetchError::TransportFailure {
                    url,
                    reason: err.to_string(),
                }),
            }
        }
        .boxed()
    }
}
