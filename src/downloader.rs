// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_std::{
    fs::{self, File},
    io::WriteExt,
};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::{Client, StatusCode};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::Semaphore,
    time::{timeout_at, Instant},
};

use crate::{
    model::{
        download::{DownloadJob, DownloadResult, PartialCause},
        package::ResourceId,
    },
    settings::DownloadSettings,
    shutdown::Shutdown,
    store, tools,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to build the HTTP client for downloads: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Failed to prepare the data directory: {0}")]
    Io(#[from] io::Error),
}

/// Why a single transfer did not succeed.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("no download URL")]
    NoUrl,
    #[error("'{0}' is a web page, not a data file")]
    WebPage(String),
    #[error("the crawl was interrupted before the download started")]
    NotStarted,
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("server answered with HTTP status {0}")]
    Status(StatusCode),
    #[error("no response within {0:?}")]
    NoResponse(Duration),
    #[error("download did not complete within the time budget")]
    Timeout,
    #[error("reading the response body failed: {0}")]
    Stream(#[source] reqwest::Error),
    #[error("writing the file failed: {0}")]
    Write(#[source] io::Error),
    #[error("the crawl was interrupted")]
    Interrupted,
}

impl TransferError {
    /// Whether this error happened after the server started to deliver data.
    const fn partial_cause(&self) -> Option<PartialCause> {
        match self {
            Self::Timeout => Some(PartialCause::Timeout),
            Self::Stream(_) | Self::Write(_) => Some(PartialCause::Stream),
            Self::Interrupted => Some(PartialCause::Interrupted),
            Self::NoUrl
            | Self::WebPage(_)
            | Self::NotStarted
            | Self::Request(_)
            | Self::Status(_)
            | Self::NoResponse(_) => None,
        }
    }

    const fn caused_by_shutdown(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Interrupted)
    }
}

impl From<TransferError> for DownloadResult {
    fn from(value: TransferError) -> Self {
        value
            .partial_cause()
            .map_or_else(|| Self::Failure(value.to_string()), Self::PartialFailure)
    }
}

/// The results of one call to [`DownloadScheduler::download_all`].
#[derive(Debug, Default)]
pub struct Batch {
    /// Exactly one entry per submitted job, in completion order.
    pub results: Vec<(ResourceId, DownloadResult)>,
    /// Whether at least one job was cut short or skipped because of a shutdown request.
    pub interrupted: bool,
}

/// Downloads resources with bounded concurrency,
/// never leaving a partially written file under its final name.
///
/// The pool of download slots lives as long as the scheduler,
/// and is shared by all batches.
#[derive(Debug, Clone)]
pub struct DownloadScheduler {
    client: Client,
    permits: Arc<Semaphore>,
    data_dir: PathBuf,
    budget: Duration,
    grace_period: Duration,
    shutdown: Shutdown,
}

impl DownloadScheduler {
    /// Creates the scheduler,
    /// removing any partial downloads a previous process left behind in `data_dir`.
    ///
    /// # Errors
    ///
    /// - the HTTP client could not be created
    /// - the data directory could not be created or cleaned
    pub async fn new(
        settings: &DownloadSettings,
        user_agent: &str,
        data_dir: &Path,
        shutdown: Shutdown,
    ) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(settings.connect_timeout)
            .build()?;
        store::ensure_dir_exists(data_dir).await?;
        let swept = sweep_partials(data_dir).await?;
        if swept > 0 {
            tracing::info!(
                "Removed {swept} partial downloads left over in '{}'",
                data_dir.display()
            );
        }
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(settings.concurrency.max(1))),
            data_dir: data_dir.to_path_buf(),
            budget: settings.budget,
            grace_period: settings.grace_period,
            shutdown,
        })
    }

    /// Downloads all jobs, at most `concurrency` at a time,
    /// and returns one result per job.
    pub async fn download_all(&self, jobs: Vec<DownloadJob>) -> Batch {
        let mut pending: FuturesUnordered<_> = jobs
            .into_iter()
            .map(|job| {
                let resource_id = job.resource_id.clone();
                let handle = tokio::spawn(self.clone().run(job));
                async move { (resource_id, handle.await) }
            })
            .collect();

        let mut batch = Batch {
            results: Vec::with_capacity(pending.len()),
            interrupted: false,
        };
        while let Some((resource_id, joined)) = pending.next().await {
            let result = match joined {
                Ok(Ok(path)) => DownloadResult::Success(path),
                Ok(Err(err)) => {
                    tracing::warn!("Download of resource {resource_id} failed: {err}");
                    batch.interrupted |= err.caused_by_shutdown();
                    err.into()
                }
                Err(join_err) => {
                    tracing::error!("Download task of resource {resource_id} died: {join_err}");
                    DownloadResult::Failure(format!("download task died: {join_err}"))
                }
            };
            batch.results.push((resource_id, result));
        }
        batch
    }

    async fn run(self, job: DownloadJob) -> Result<PathBuf, TransferError> {
        if self.shutdown.is_requested() {
            return Err(TransferError::NotStarted);
        }
        let url = job.url.as_deref().ok_or(TransferError::NoUrl)?;
        if tools::is_web_page(url) {
            return Err(TransferError::WebPage(url.to_owned()));
        }

        let _permit = tokio::select! {
            biased;
            () = self.shutdown.requested() => return Err(TransferError::NotStarted),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_closed| TransferError::NotStarted)?
            }
        };

        let final_path = store::data_file(
            &self.data_dir,
            &job.resource_id,
            job.media_type.as_deref(),
        );
        let part_path = store::partial_file(&final_path);
        tracing::debug!("Downloading resource {} from '{url}' ...", job.resource_id);

        let transfer = self.transfer(url, &part_path, &final_path);
        tokio::pin!(transfer);
        let res = tokio::select! {
            res = &mut transfer => res,
            () = self.shutdown.requested() => {
                tracing::debug!(
                    "Giving download of resource {} {:?} to finish ...",
                    job.resource_id,
                    self.grace_period
                );
                tokio::time::timeout(self.grace_period, &mut transfer)
                    .await
                    .unwrap_or(Err(TransferError::Interrupted))
            }
        };

        if res.is_err() {
            remove_partial(&part_path).await;
        } else {
            tracing::debug!("Downloaded resource {}", job.resource_id);
        }
        res
    }

    async fn transfer(
        &self,
        url: &str,
        part_path: &Path,
        final_path: &Path,
    ) -> Result<PathBuf, TransferError> {
        let deadline = Instant::now() + self.budget;
        let mut response = timeout_at(deadline, self.client.get(url).send())
            .await
            .map_err(|_elapsed| TransferError::NoResponse(self.budget))?
            .map_err(TransferError::Request)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status(status));
        }

        let mut file = File::create(part_path)
            .await
            .map_err(TransferError::Write)?;
        while let Some(chunk) = timeout_at(deadline, response.chunk())
            .await
            .map_err(|_elapsed| TransferError::Timeout)?
            .map_err(TransferError::Stream)?
        {
            timeout_at(deadline, file.write_all(&chunk))
                .await
                .map_err(|_elapsed| TransferError::Timeout)?
                .map_err(TransferError::Write)?;
        }
        file.flush().await.map_err(TransferError::Write)?;
        file.sync_all().await.map_err(TransferError::Write)?;
        drop(file);

        // No await point from here on,
        // so a cancelled transfer never leaves a half-done rename behind.
        std::fs::rename(part_path, final_path).map_err(TransferError::Write)?;
        Ok(final_path.to_path_buf())
    }
}

async fn remove_partial(part_path: &Path) {
    match fs::remove_file(part_path).await {
        Ok(()) => tracing::trace!("Removed partial file '{}'", part_path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::error!(
            "Failed to remove partial file '{}': {err}",
            part_path.display()
        ),
    }
}

/// Removes all in-progress download files directly inside `dir`.
async fn sweep_partials(dir: &Path) -> io::Result<usize> {
    let mut entries = fs::read_dir(dir).await?;
    let mut swept = 0;
    while let Some(entry) = entries.next().await {
        let entry = entry?;
        if store::is_partial_file(&entry.file_name()) {
            fs::remove_file(entry.path()).await?;
            swept += 1;
        }
    }
    Ok(swept)
}
