// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifies a dataset within a single portal.
/// This is the unit of resumability.
pub type DatasetId = String;

/// Domain-salted hash identifying a resource across portals.
pub type ResourceId = String;

/// A text in a specific (natural) language.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LangLabel {
    pub language: String,
    pub label: String,
}

impl LangLabel {
    #[must_use]
    pub fn new<L: Into<String>, V: Into<String>>(language: L, label: V) -> Self {
        Self {
            language: language.into(),
            label: label.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Publisher {
    pub name: Option<String>,
    pub homepage: Option<String>,
}

/// One downloadable artifact of a [`Package`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub resource_id: ResourceId,
    pub title: Option<LangLabel>,
    pub download_url: Option<String>,
    /// Declared format of the resource, always lower-case.
    pub media_type: Option<String>,
    pub byte_size: Option<u64>,
    pub rights: Option<String>,
    /// Local file the resource was downloaded to.
    ///
    /// This is only ever set after a complete, successful download.
    pub path: Option<PathBuf>,
}

impl Resource {
    #[must_use]
    pub fn new(resource_id: ResourceId, download_url: Option<String>, media_type: Option<&str>) -> Self {
        Self {
            resource_id,
            title: None,
            download_url,
            media_type: media_type.map(str::to_lowercase),
            byte_size: None,
            rights: None,
            path: None,
        }
    }
}

/// The metadata of one dataset, plus its resources.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: DatasetId,
    /// Domain-salted hash of [`Self::id`],
    /// used to name the metadata file.
    pub custom_id: String,
    pub url: Option<String>,
    pub title: Option<LangLabel>,
    pub description: Option<LangLabel>,
    pub themes: Vec<LangLabel>,
    pub keywords: Vec<LangLabel>,
    pub publisher: Option<Publisher>,
    pub language: Option<String>,
    pub issued: Option<String>,
    pub modified: Option<String>,
    pub license: Option<String>,
    pub country: Option<String>,
    pub resources: Vec<Resource>,
}

impl Package {
    #[must_use]
    pub const fn new(id: DatasetId, custom_id: String) -> Self {
        Self {
            id,
            custom_id,
            url: None,
            title: None,
            description: None,
            themes: Vec::new(),
            keywords: Vec::new(),
            publisher: None,
            language: None,
            issued: None,
            modified: None,
            license: None,
            country: None,
            resources: Vec::new(),
        }
    }

    /// Number of resources that were downloaded successfully.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.resources.iter().filter(|res| res.path.is_some()).count()
    }
}
