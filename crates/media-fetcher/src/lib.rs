//! `POST /images` download helper.
//!
//! Accepts a JSON array of URLs, downloads each into the configured
//! directory as `<last path segment>.jpeg` and answers `{"status": bool}`.
//! Individual failures are logged and only flip the status to `false`.

pub mod logging;

use std::ffi::OsStr;
use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Json, State};
use axum::routing::post;
use futures::future::join_all;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

pub const PORT: u16 = 8080;
pub const IMAGE_EXTENSION: &str = "jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub status: bool,
}

#[derive(Clone)]
pub struct FetcherState {
    client: Client,
    directory: Arc<PathBuf>,
}

impl FetcherState {
    pub fn new(directory: PathBuf) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build download client")?;
        Ok(Self {
            client,
            directory: Arc::new(directory),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

pub fn router(state: FetcherState) -> Router {
    Router::new()
        .route("/images", post(download_images))
        .with_state(state)
}

pub async fn serve<F>(directory: PathBuf, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::fs::create_dir_all(&directory)
        .await
        .with_context(|| format!("failed to create image directory {}", directory.display()))?;
    let state = FetcherState::new(directory)?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind fetcher listener on {addr}"))?;
    info!(%addr, directory = %state.directory().display(), "media fetcher listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("fetcher server exited")?;
    Ok(())
}

async fn download_images(
    State(state): State<FetcherState>,
    Json(urls): Json<Vec<String>>,
) -> Json<DownloadStatus> {
    let status = download_all(&state.client, &state.directory, &urls).await;
    Json(DownloadStatus { status })
}

/// Download every URL concurrently. Returns `true` only if all succeeded.
///
/// URLs sharing a target file are fetched one after another, so the last
/// successful download wins and a failure never touches a finished file.
pub async fn download_all(client: &Client, directory: &Path, urls: &[String]) -> bool {
    let mut targets: Vec<(PathBuf, Vec<&str>)> = Vec::new();
    for (index, url) in urls.iter().enumerate() {
        let target = directory.join(target_filename(url, index));
        match targets.iter_mut().find(|(existing, _)| *existing == target) {
            Some((_, same)) => {
                warn!(%url, path = %target.display(), "target shared with an earlier url");
                same.push(url.as_str());
            }
            None => targets.push((target, vec![url.as_str()])),
        }
    }

    let downloads = targets.iter().map(|(target, sources)| async move {
        let mut results = Vec::with_capacity(sources.len());
        for &url in sources {
            results.push((url, download(client, url, target).await));
        }
        (target, results)
    });

    let mut failures = 0usize;
    for (target, results) in join_all(downloads).await {
        for (url, result) in results {
            match result {
                Ok(bytes) => info!(%url, path = %target.display(), bytes, "downloaded"),
                Err(err) => {
                    failures += 1;
                    error!(%url, error = ?err, "download failed");
                }
            }
        }
    }

    if failures > 0 {
        error!(failures, total = urls.len(), "image batch incomplete");
    }
    failures == 0
}

/// `<last path segment>.jpeg`, or `image_<index>.jpeg` when the URL has none.
pub fn target_filename(url: &str, index: usize) -> String {
    let stem = Url::parse(url)
        .ok()
        .and_then(|url| url.path_segments()?.next_back().map(str::to_owned))
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| format!("image_{index}"));
    format!("{stem}.{IMAGE_EXTENSION}")
}

/// Stream `url` into `<target>.part`, then rename it over `target`.
async fn download(client: &Client, url: &str, target: &Path) -> Result<u64> {
    let partial = partial_path(target);
    let result = match fetch_into(client, url, &partial).await {
        Ok(written) => tokio::fs::rename(&partial, target)
            .await
            .with_context(|| format!("failed to move download into {}", target.display()))
            .map(|()| written),
        Err(err) => Err(err),
    };
    if result.is_err() {
        discard_partial(&partial).await;
    }
    result
}

async fn fetch_into(client: &Client, url: &str, path: &Path) -> Result<u64> {
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()?;
    let mut file = File::create(path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(OsStr::to_os_string).unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

async fn discard_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => debug!(path = %partial.display(), "removed partial download"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => debug!(path = %partial.display(), "failed to remove partial download: {err}"),
    }
}
