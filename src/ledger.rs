// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_std::{
    fs::{self, File, OpenOptions},
    io::{self, WriteExt},
    path::PathBuf,
};
use std::collections::HashSet;

use crate::{model::package::DatasetId, store::Layout};

/// Durable, append-only record of the datasets
/// that were fully processed by previous (or the current) runs.
///
/// One ID per line. The file is deleted once a crawl completes cleanly.
#[derive(Debug)]
pub struct ResumeLedger {
    path: PathBuf,
    writer: Option<File>,
}

impl ResumeLedger {
    #[must_use]
    pub fn new<P: Into<std::path::PathBuf>>(path: P) -> Self {
        Self {
            path: PathBuf::from(path.into()),
            writer: None,
        }
    }

    #[must_use]
    pub fn for_layout(layout: &Layout) -> Self {
        Self::new(layout.resume_file())
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        self.path.as_ref()
    }

    /// Reads the IDs committed so far.
    ///
    /// Returns `None` if there is no ledger, meaning no previous run left work behind,
    /// and `Some` (possibly empty) otherwise.
    pub async fn load(&self) -> io::Result<Option<HashSet<DatasetId>>> {
        if !self.path.exists().await {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).await?;
        let done: HashSet<_> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        tracing::info!(
            "Loaded {} already processed IDs from '{}'",
            done.len(),
            self.path.display()
        );
        Ok(Some(done))
    }

    /// The IDs of `all` that still need processing,
    /// in the order of `all` and without repetitions.
    #[must_use]
    pub fn diff(all: &[DatasetId], done: Option<&HashSet<DatasetId>>) -> Vec<DatasetId> {
        let mut seen = HashSet::with_capacity(all.len());
        all.iter()
            .filter(|id| done.is_none_or(|done| !done.contains(*id)))
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    /// Durably records `id` as processed.
    ///
    /// When this returns successfully,
    /// the ID is on disk and survives a crash.
    pub async fn commit(&mut self, id: &str) -> io::Result<()> {
        if id.contains(['\n', '\r']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Dataset ID contains a line break: {id:?}"),
            ));
        }
        let writer = match &mut self.writer {
            Some(writer) => writer,
            empty => empty.insert(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await?,
            ),
        };
        writer.write_all(format!("{id}\n").as_bytes()).await?;
        writer.flush().await?;
        writer.sync_data().await?;
        tracing::trace!("Committed '{id}' to the ledger");
        Ok(())
    }

    /// Deletes the ledger; the crawl is complete.
    pub async fn finalize(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
        }
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!("Crawl complete; removed ledger '{}'", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}
