// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use futures::{
    future::join_all,
    stream::{self, StreamExt},
};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    adapters::{Error, PageRequest, Paging, PortalAdapter},
    model::{format::FormatFilter, package::DatasetId},
};

/// All the dataset IDs a portal listed,
/// plus some statistics about how complete that list is.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Enumeration {
    /// In completion order of the pages; may contain duplicates.
    pub ids: Vec<DatasetId>,
    pub pages_total: usize,
    pub pages_completed: usize,
    pub pages_failed: usize,
}

impl Enumeration {
    const fn new(pages_total: usize) -> Self {
        Self {
            ids: Vec::new(),
            pages_total,
            pages_completed: 0,
            pages_failed: 0,
        }
    }

    /// Whether every page was fetched successfully.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.pages_failed == 0 && self.pages_completed == self.pages_total
    }

    fn record(&mut self, request: PageRequest, res: Result<Vec<DatasetId>, Error>) {
        match res {
            Ok(ids) => {
                self.pages_completed += 1;
                tracing::debug!("Fetched {request}: {} IDs", ids.len());
                self.ids.extend(ids);
            }
            Err(err) => {
                self.pages_failed += 1;
                tracing::warn!("Failed to fetch {request}, skipping it: {err}");
            }
        }
    }

    fn merge(&mut self, other: Self) {
        self.ids.extend(other.ids);
        self.pages_completed += other.pages_completed;
        self.pages_failed += other.pages_failed;
    }
}

fn log_progress(done: usize, total: usize) {
    tracing::info!("pages {done}/{total}");
}

/// Lists all dataset IDs of a portal,
/// fetching up to `concurrency` pages at a time.
#[derive(Debug, Clone, Copy)]
pub struct IdEnumerator {
    concurrency: usize,
}

impl IdEnumerator {
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Lists the IDs of all datasets (matching `formats`, if given).
    ///
    /// Failing pages are logged and skipped,
    /// so the result may be an under-count.
    ///
    /// # Errors
    ///
    /// If the total number of datasets could not be established.
    pub async fn enumerate(
        &self,
        adapter: &dyn PortalAdapter,
        formats: Option<&FormatFilter>,
    ) -> Result<Enumeration, Error> {
        tracing::info!("Fetching {adapter} - total ...");
        let total = adapter.probe_total(formats).await?;
        tracing::info!("Fetching {adapter} - total: {total}");

        let enumeration = match adapter.paging() {
            Paging::OffsetLimit { limit } => self.by_windows(adapter, formats, total, limit).await,
            Paging::Pages { page_size } => self.by_pages(adapter, formats, total, page_size).await,
        };

        let unfetched =
            enumeration.pages_total - enumeration.pages_completed - enumeration.pages_failed;
        if enumeration.is_complete() {
            tracing::info!(
                "Enumerated {} IDs in {} pages",
                enumeration.ids.len(),
                enumeration.pages_total
            );
        } else {
            tracing::warn!(
                "Enumerated {} IDs; {} of {} pages failed, {unfetched} were never fetched",
                enumeration.ids.len(),
                enumeration.pages_failed,
                enumeration.pages_total
            );
        }
        Ok(enumeration)
    }

    async fn by_windows(
        &self,
        adapter: &dyn PortalAdapter,
        formats: Option<&FormatFilter>,
        total: usize,
        limit: usize,
    ) -> Enumeration {
        let limit = limit.max(1);
        let requests: Vec<_> = (0..total)
            .step_by(limit)
            .map(|offset| PageRequest::Window { offset, limit })
            .collect();
        let mut enumeration = Enumeration::new(requests.len());

        let mut fetches = stream::iter(requests)
            .map(|request| async move { (request, adapter.fetch_ids(formats, request).await) })
            .buffer_unordered(self.concurrency);
        while let Some((request, res)) = fetches.next().await {
            enumeration.record(request, res);
            log_progress(
                enumeration.pages_completed + enumeration.pages_failed,
                enumeration.pages_total,
            );
        }
        enumeration
    }

    async fn by_pages(
        &self,
        adapter: &dyn PortalAdapter,
        formats: Option<&FormatFilter>,
        total: usize,
        page_size: usize,
    ) -> Enumeration {
        let size = page_size.max(1);
        let pages_total = total.div_ceil(size);
        let next_page = AtomicUsize::new(1);
        let pages_done = AtomicUsize::new(0);
        let slots = self.concurrency.min(pages_total);

        let slot = |slot_id: usize| {
            let next_page = &next_page;
            let pages_done = &pages_done;
            async move {
                let mut partial = Enumeration::new(pages_total);
                loop {
                    let number = next_page.fetch_add(1, Ordering::Relaxed);
                    if number > pages_total {
                        break;
                    }
                    let request = PageRequest::Page { number, size };
                    let res = adapter.fetch_ids(formats, request).await;
                    log_progress(pages_done.fetch_add(1, Ordering::Relaxed) + 1, pages_total);
                    match res {
                        Ok(ids) if ids.is_empty() => {
                            partial.pages_completed += 1;
                            tracing::debug!("Slot {slot_id} got an empty {request}, stopping");
                            break;
                        }
                        Ok(ids) => partial.record(request, Ok(ids)),
                        Err(err) => {
                            partial.record(request, Err(err));
                            tracing::debug!("Slot {slot_id} stops after a failed page");
                            break;
                        }
                    }
                }
                partial
            }
        };

        let mut enumeration = Enumeration::new(pages_total);
        for partial in join_all((0..slots).map(slot)).await {
            enumeration.merge(partial);
        }
        enumeration
    }
}
