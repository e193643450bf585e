// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;

/// A case-insensitive allow-list of resource media types,
/// e.g. `csv` or `pdf`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FormatFilter(BTreeSet<String>);

impl FormatFilter {
    /// Creates a filter from raw format names.
    ///
    /// Names are trimmed and lower-cased; empty ones are ignored.
    pub fn new<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            formats
                .into_iter()
                .map(|format| format.as_ref().trim().to_lowercase())
                .filter(|format| !format.is_empty())
                .collect(),
        )
    }

    /// Like [`Self::new`], but returns `None` if no format is given,
    /// which means "no filtering".
    pub fn from_list<I, S>(formats: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filter = Self::new(formats);
        if filter.is_empty() {
            None
        } else {
            Some(filter)
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a resource with the given media type passes this filter.
    /// A resource without media type never passes.
    #[must_use]
    pub fn matches(&self, media_type: Option<&str>) -> bool {
        media_type.is_some_and(|mt| self.0.contains(&mt.to_lowercase()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for FormatFilter {
    fn from(value: Vec<String>) -> Self {
        Self::new(value)
    }
}

impl From<FormatFilter> for Vec<String> {
    fn from(value: FormatFilter) -> Self {
        value.0.into_iter().collect()
    }
}

impl Display for FormatFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.iter().collect::<Vec<_>>().join(","))
    }
}

/// Whether a resource is to be downloaded,
/// given the (optional) active filter.
#[must_use]
pub fn is_eligible(filter: Option<&FormatFilter>, media_type: Option<&str>) -> bool {
    filter.is_none_or(|filter| filter.matches(media_type))
}
