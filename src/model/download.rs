// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::{Path, PathBuf};

use strum::{Display, IntoStaticStr};

use super::package::{Resource, ResourceId};

/// Why a transfer was aborted after it already produced data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PartialCause {
    /// The download time budget ran out before the stream completed.
    Timeout,
    /// Reading the body or writing it to disk failed mid-way.
    Stream,
    /// The crawl was cancelled and the grace period ran out.
    Interrupted,
}

/// The outcome of downloading a single resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    /// The complete resource is stored at this path.
    Success(PathBuf),
    /// The transfer started but did not complete;
    /// whatever was written has been removed again.
    PartialFailure(PartialCause),
    /// The request never produced any data.
    Failure(String),
}

impl DownloadResult {
    /// The local path of the downloaded file,
    /// which is only ever available for [`Self::Success`].
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Success(path) => Some(path),
            Self::PartialFailure(_) | Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// A resource scheduled for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub resource_id: ResourceId,
    pub url: Option<String>,
    pub media_type: Option<String>,
}

impl From<&Resource> for DownloadJob {
    fn from(value: &Resource) -> Self {
        Self {
            resource_id: value.resource_id.clone(),
            url: value.download_url.clone(),
            media_type: value.media_type.clone(),
        }
    }
}
