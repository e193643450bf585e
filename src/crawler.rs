// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashSet, fmt, io, path::Path};
use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::{
    adapters::{self, PortalAdapter},
    downloader::{self, DownloadScheduler},
    enumerator::IdEnumerator,
    ledger::ResumeLedger,
    model::{
        download::{DownloadJob, DownloadResult},
        format::{is_eligible, FormatFilter},
        package::{DatasetId, Package, Resource, ResourceId},
    },
    settings::Settings,
    shutdown::Shutdown,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to prepare the output directories: {0}")]
    Bootstrap(#[source] io::Error),
    #[error(transparent)]
    Downloader(#[from] downloader::Error),
    #[error("Failed to enumerate the dataset IDs: {0}")]
    Enumeration(#[from] adapters::Error),
    #[error("Resume ledger I/O failed; can not guarantee resumability: {0}")]
    Ledger(#[source] io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("Got a download result for resource {0}, which is not an eligible resource of the package")]
    UnmatchedResult(ResourceId),
}

/// Where a single dataset is in its processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PackageState {
    Discovered,
    MetadataFetched,
    ResourcesFiltered,
    ResourcesDownloaded,
    LedgerCommitted,
    /// Already committed by a previous run
    Skipped,
}

/// Per-resource counts of a single package.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResourceStats {
    pub downloaded: usize,
    pub partial: usize,
    pub failed: usize,
    /// Resources that did not pass the format filter
    pub recorded: usize,
}

impl ResourceStats {
    fn count(&mut self, result: &DownloadResult) {
        match result {
            DownloadResult::Success(_) => self.downloaded += 1,
            DownloadResult::PartialFailure(_) => self.partial += 1,
            DownloadResult::Failure(_) => self.failed += 1,
        }
    }
}

/// How the processing of a single dataset ended.
#[derive(Debug)]
pub enum PackageOutcome {
    /// Processing terminated and the ID is in the ledger.
    Committed(ResourceStats),
    /// The metadata could not be fetched; retried by the next run.
    MetadataFailed(adapters::Error),
    /// Download results could not be merged; retried by the next run.
    MergeFailed(MergeError),
    /// The download phase was cut short; retried by the next run.
    Interrupted(ResourceStats),
}

/// Splits the resources of a package into the download jobs for the eligible ones,
/// and the number of resources that are only recorded.
///
/// Eligible resources sharing a resource ID result in a single job.
#[must_use]
pub fn partition_resources(
    resources: &[Resource],
    formats: Option<&FormatFilter>,
) -> (Vec<DownloadJob>, usize) {
    let mut scheduled = HashSet::new();
    let mut jobs = Vec::new();
    let mut recorded = 0;
    for resource in resources {
        if !is_eligible(formats, resource.media_type.as_deref()) {
            recorded += 1;
        } else if scheduled.insert(resource.resource_id.as_str()) {
            jobs.push(DownloadJob::from(resource));
        }
    }
    (jobs, recorded)
}

/// Stores the download results in the eligible resources carrying their resource ID.
///
/// # Errors
///
/// If a result matches no eligible resource.
pub fn merge_results(
    package: &mut Package,
    formats: Option<&FormatFilter>,
    results: Vec<(ResourceId, DownloadResult)>,
) -> Result<ResourceStats, MergeError> {
    let mut stats = ResourceStats::default();
    for (resource_id, result) in results {
        let mut matched = false;
        for resource in package.resources.iter_mut().filter(|resource| {
            resource.resource_id == resource_id
                && is_eligible(formats, resource.media_type.as_deref())
        }) {
            resource.path = result.path().map(Path::to_path_buf);
            stats.count(&result);
            matched = true;
        }
        if !matched {
            return Err(MergeError::UnmatchedResult(resource_id));
        }
    }
    Ok(stats)
}

/// The outcome of a whole crawl.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    /// Distinct IDs the portal listed
    pub enumerated: usize,
    pub pages_failed: usize,
    /// IDs committed by previous runs
    pub skipped: usize,
    pub remaining: usize,
    pub committed: usize,
    /// Packages left uncommitted because of metadata or merge failures
    pub failed_packages: usize,
    pub downloaded: usize,
    pub partial: usize,
    pub failed_resources: usize,
    pub recorded: usize,
    pub interrupted: bool,
    /// Whether the ledger was removed, marking the crawl as complete
    pub finalized: bool,
}

impl CrawlReport {
    fn new() -> Self {
        Self {
            started: Utc::now(),
            finished: None,
            enumerated: 0,
            pages_failed: 0,
            skipped: 0,
            remaining: 0,
            committed: 0,
            failed_packages: 0,
            downloaded: 0,
            partial: 0,
            failed_resources: 0,
            recorded: 0,
            interrupted: false,
            finalized: false,
        }
    }

    fn add(&mut self, stats: ResourceStats) {
        self.downloaded += stats.downloaded;
        self.partial += stats.partial;
        self.failed_resources += stats.failed;
        self.recorded += stats.recorded;
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "datasets: {} listed, {} skipped, {} committed, {} failed (of {} remaining)",
            self.enumerated, self.skipped, self.committed, self.failed_packages, self.remaining
        )?;
        writeln!(
            f,
            "resources: {} downloaded, {} partial, {} failed, {} recorded only",
            self.downloaded, self.partial, self.failed_resources, self.recorded
        )?;
        if self.pages_failed > 0 {
            writeln!(f, "pages failed during enumeration: {}", self.pages_failed)?;
        }
        let state = if self.finalized {
            "complete"
        } else if self.interrupted {
            "interrupted"
        } else {
            "incomplete"
        };
        write!(f, "crawl {state}")?;
        if let Some(finished) = self.finished {
            write!(f, " after {}s", (finished - self.started).num_seconds())?;
        }
        Ok(())
    }
}

/// Crawls one portal: lists its datasets,
/// and fetches, filters, downloads, persists and commits them one by one.
pub struct Crawler {
    settings: Settings,
    adapter: Box<dyn PortalAdapter>,
    enumerator: IdEnumerator,
    scheduler: DownloadScheduler,
    ledger: ResumeLedger,
    shutdown: Shutdown,
}

impl Crawler {
    /// Creates the output directories and the download scheduler.
    ///
    /// # Errors
    ///
    /// If the output directories can not be created or cleaned up.
    pub async fn new(
        settings: Settings,
        adapter: Box<dyn PortalAdapter>,
        shutdown: Shutdown,
    ) -> Result<Self, Error> {
        settings
            .layout
            .bootstrap()
            .await
            .map_err(Error::Bootstrap)?;
        let scheduler = DownloadScheduler::new(
            &settings.download,
            &settings.user_agent,
            settings.layout.data_dir(),
            shutdown.clone(),
        )
        .await?;
        Ok(Self {
            enumerator: IdEnumerator::new(settings.enumeration.concurrency),
            ledger: ResumeLedger::for_layout(&settings.layout),
            settings,
            adapter,
            scheduler,
            shutdown,
        })
    }

    /// Runs the whole crawl.
    ///
    /// # Errors
    ///
    /// - the dataset IDs could not be enumerated at all
    /// - the ledger could not be read or written
    pub async fn run(&mut self) -> Result<CrawlReport, Error> {
        let mut report = CrawlReport::new();
        let formats = self.settings.formats.clone();
        tracing::info!(
            "Crawling {} with {}{}",
            self.settings.domain,
            self.adapter,
            formats
                .as_ref()
                .map(|formats| format!(", formats: {formats}"))
                .unwrap_or_default()
        );

        let enumeration = self
            .enumerator
            .enumerate(self.adapter.as_ref(), formats.as_ref())
            .await?;
        report.pages_failed = enumeration.pages_failed;
        report.enumerated = enumeration.ids.iter().collect::<HashSet<_>>().len();

        let done = self.ledger.load().await.map_err(Error::Ledger)?;
        if let Some(done) = &done {
            for id in enumeration.ids.iter().filter(|id| done.contains(*id)) {
                log_state(id, PackageState::Skipped);
            }
        }
        let remaining = ResumeLedger::diff(&enumeration.ids, done.as_ref());
        report.remaining = remaining.len();
        report.skipped = report.enumerated - report.remaining;
        tracing::info!(
            "{} datasets to process, {} already done",
            report.remaining,
            report.skipped
        );

        let mut uncommitted = 0;
        for (index, id) in remaining.iter().enumerate() {
            if self.shutdown.is_requested() {
                tracing::warn!("Stop requested; leaving {} datasets for the next run", report.remaining - index);
                report.interrupted = true;
                break;
            }
            tracing::info!("package {}/{}: {id}", index + 1, report.remaining);
            match self.process_one(id, formats.as_ref()).await? {
                PackageOutcome::Committed(stats) => {
                    report.committed += 1;
                    report.add(stats);
                }
                PackageOutcome::MetadataFailed(err) => {
                    tracing::warn!("Failed to fetch metadata of dataset {id}: {err}");
                    report.failed_packages += 1;
                    uncommitted += 1;
                }
                PackageOutcome::MergeFailed(err) => {
                    tracing::error!("Not committing dataset {id}: {err}");
                    report.failed_packages += 1;
                    uncommitted += 1;
                }
                PackageOutcome::Interrupted(stats) => {
                    tracing::warn!("Downloads of dataset {id} were interrupted; not committing it");
                    report.add(stats);
                    report.interrupted = true;
                    break;
                }
            }
        }

        if enumeration.ids.is_empty() {
            tracing::warn!("The portal listed no datasets; keeping the ledger");
        } else if uncommitted == 0 && !report.interrupted {
            self.ledger.finalize().await.map_err(Error::Ledger)?;
            report.finalized = true;
        } else {
            tracing::info!(
                "Keeping the ledger at '{}' for the next run",
                self.ledger.path().display()
            );
        }

        report.finished = Some(Utc::now());
        Ok(report)
    }

    /// Takes a single dataset from [`PackageState::Discovered`]
    /// to [`PackageState::LedgerCommitted`], if possible.
    ///
    /// # Errors
    ///
    /// Only if the ledger commit fails.
    pub async fn process_one(
        &mut self,
        id: &DatasetId,
        formats: Option<&FormatFilter>,
    ) -> Result<PackageOutcome, Error> {
        log_state(id, PackageState::Discovered);
        let mut package = match self.adapter.fetch_package(id).await {
            Ok(package) => package,
            Err(err) => return Ok(PackageOutcome::MetadataFailed(err)),
        };
        log_state(id, PackageState::MetadataFetched);

        let (jobs, recorded) = partition_resources(&package.resources, formats);
        tracing::debug!(
            "Dataset {id}: {} resources to download, {recorded} recorded only",
            jobs.len()
        );
        log_state(id, PackageState::ResourcesFiltered);

        let batch = self.scheduler.download_all(jobs).await;
        log_state(id, PackageState::ResourcesDownloaded);

        let mut stats = match merge_results(&mut package, formats, batch.results) {
            Ok(stats) => stats,
            Err(err) => return Ok(PackageOutcome::MergeFailed(err)),
        };
        stats.recorded = recorded;
        if batch.interrupted {
            return Ok(PackageOutcome::Interrupted(stats));
        }

        if self.settings.save_meta {
            match self.settings.layout.write_metadata(&package).await {
                Ok(path) => tracing::debug!("Wrote metadata to '{}'", path.display()),
                Err(err) => tracing::error!("Failed to write metadata of dataset {id}: {err}"),
            }
        }

        self.ledger.commit(id).await.map_err(Error::Ledger)?;
        log_state(id, PackageState::LedgerCommitted);
        Ok(PackageOutcome::Committed(stats))
    }
}

fn log_state(id: &str, state: PackageState) {
    tracing::trace!("Dataset {id}: {state}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::download::PartialCause;
    use std::path::PathBuf;

    fn package(resources: Vec<Resource>) -> Package {
        let mut package = Package::new("ds".to_owned(), "hash".to_owned());
        package.resources = resources;
        package
    }

    fn resource(id: &str, media_type: &str) -> Resource {
        Resource::new(
            id.to_owned(),
            Some(format!("https://files.example/{id}.{media_type}")),
            Some(media_type),
        )
    }

    #[test]
    fn filter_partitions_resources() {
        let resources = vec![resource("a", "csv"), resource("b", "pdf")];
        let formats = FormatFilter::new(["CSV"]);

        let (jobs, recorded) = partition_resources(&resources, Some(&formats));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].resource_id, "a");
        assert_eq!(recorded, 1);

        let (jobs, recorded) = partition_resources(&resources, None);
        assert_eq!(jobs.len(), 2);
        assert_eq!(recorded, 0);
    }

    #[test]
    fn shared_resource_ids_are_scheduled_once() {
        let resources = vec![resource("a", "csv"), resource("a", "csv")];
        let (jobs, _) = partition_resources(&resources, None);
        assert_eq!(jobs.len(), 1);

        let mut package = package(resources);
        let stats = merge_results(
            &mut package,
            None,
            vec![("a".to_owned(), DownloadResult::Success(PathBuf::from("/d/a.csv")))],
        )
        .unwrap();
        assert_eq!(stats.downloaded, 2);
        assert!(package.resources.iter().all(|res| res.path.is_some()));
    }

    #[test]
    fn merge_sets_paths_only_on_success() {
        let mut package = package(vec![resource("a", "csv"), resource("b", "csv")]);
        let stats = merge_results(
            &mut package,
            None,
            vec![
                ("b".to_owned(), DownloadResult::PartialFailure(PartialCause::Timeout)),
                ("a".to_owned(), DownloadResult::Success(PathBuf::from("/d/a.csv"))),
            ],
        )
        .unwrap();
        assert_eq!(
            stats,
            ResourceStats {
                downloaded: 1,
                partial: 1,
                failed: 0,
                recorded: 0
            }
        );
        assert_eq!(package.resources[0].path, Some(PathBuf::from("/d/a.csv")));
        assert_eq!(package.resources[1].path, None);
        assert_eq!(package.downloaded(), 1);
    }

    #[test]
    fn unmatched_result_is_an_error() {
        let mut package = package(vec![resource("a", "csv")]);
        let res = merge_results(
            &mut package,
            None,
            vec![("zzz".to_owned(), DownloadResult::Failure("gone".to_owned()))],
        );
        assert_eq!(res, Err(MergeError::UnmatchedResult("zzz".to_owned())));
    }

    #[test]
    fn results_never_reach_recorded_resources() {
        let mut package = package(vec![resource("a", "pdf")]);
        let formats = FormatFilter::new(["csv"]);
        let res = merge_results(
            &mut package,
            Some(&formats),
            vec![("a".to_owned(), DownloadResult::Success(PathBuf::from("/d/a.pdf")))],
        );
        assert!(res.is_err());
        assert_eq!(package.resources[0].path, None);
    }

    #[test]
    fn states_have_snake_case_names() {
        assert_eq!(PackageState::LedgerCommitted.to_string(), "ledger_committed");
        let name: &str = PackageState::Skipped.into();
        assert_eq!(name, "skipped");
    }
}
