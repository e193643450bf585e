// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::borrow::Cow;
use std::sync::LazyLock;

use const_format::concatcp;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;
use urlencoding::{decode, encode};

pub const USER_AGENT: &str = concatcp!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

static NON_PATH_SAFE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9.\-]+").expect("Programmer Error: invalid built-in regex")
});

/// URL-encodes a string, e.g. to use it as a path segment.
///
/// ```
/// # use opendata_crawler::tools::url_encode;
/// assert_eq!(url_encode(r#"Hello World"#), "Hello%20World");
/// ```
#[must_use]
pub fn url_encode(input: &str) -> Cow<str> {
    encode(input)
}

/// Percent-decodes a URL,
/// returning the input unchanged if it does not decode to valid UTF-8.
#[must_use]
pub fn url_decode(input: &str) -> Cow<str> {
    decode(input).unwrap_or(Cow::Borrowed(input))
}

/// Removes a single trailing slash, if present.
#[must_use]
pub fn trim_domain(domain: &str) -> &str {
    domain.strip_suffix('/').unwrap_or(domain)
}

/// Whether the given string is an absolute `http` or `https` URL with a host.
#[must_use]
pub fn check_url(input: &str) -> bool {
    Url::parse(input).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
    })
}

/// Turns a portal domain (URL) into a string usable as a file- or directory name.
///
/// ```
/// # use opendata_crawler::tools::clean_url;
/// assert_eq!(clean_url("https://www.data.europa.eu/"), "data.europa.eu");
/// assert_eq!(clean_url("http://localhost:8080/portal"), "localhost_8080_portal");
/// ```
#[must_use]
pub fn clean_url(domain: &str) -> String {
    let no_scheme = domain
        .split_once("://")
        .map_or(domain, |(_scheme, rest)| rest);
    let no_www = no_scheme.strip_prefix("www.").unwrap_or(no_scheme);
    let trimmed = no_www.trim_end_matches('/');
    NON_PATH_SAFE.replace_all(trimmed, "_").into_owned()
}

/// Creates a stable, domain-salted identifier,
/// as lower-case hex encoded SHA-256 of `domain` followed by `id`.
#[must_use]
pub fn generate_hash(domain: &str, id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Web pages are not considered datasets, so we never download them.
#[must_use]
pub fn is_web_page(url: &str) -> bool {
    url.to_lowercase().ends_with("html")
}
