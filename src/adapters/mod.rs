// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{self, HeaderMap},
    Client, StatusCode,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::{
    model::{
        format::FormatFilter,
        package::{DatasetId, Package},
    },
    settings::PartialSettings,
};

pub mod data_europa;

pub type RL = governor::DefaultDirectRateLimiter;

const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT: u64 = 10000;
const DETECTION_TIMEOUT: u64 = 20000;

pub trait RetryConfig {
    /// Number of retries for a specific fetch,
    /// e.g. a page of IDs or a single package.
    fn retries(&self) -> Option<u32>;

    /// Total timeout per request in milliseconds (ms)
    fn timeout(&self) -> Option<u64>;
}

/// How a portal splits the list of all its dataset IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// `LIMIT k OFFSET o` windows over a total established by a count query.
    OffsetLimit { limit: usize },
    /// Numbered pages (starting at 1) of a fixed size,
    /// bounded by a probed total.
    Pages { page_size: usize },
}

/// A single request for a chunk of dataset IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    Window { offset: usize, limit: usize },
    Page { number: usize, size: usize },
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window { offset, limit } => write!(f, "window {offset}+{limit}"),
            Self::Page { number, size } => write!(f, "page {number} (size {size})"),
        }
    }
}

/// Thrown when creating a new [`PortalAdapter`] failed.
#[derive(Error, Debug)]
pub enum CreationError {
    #[error("Unknown portal type: '{0}'")]
    UnknownPortalType(String),
    #[error("Invalid config for portal type '{0}': {1}")]
    InvalidConfig(String, #[source] serde_json::Error),
}

/// Thrown when no adapter could be found for a portal.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("The domain '{0}' is not supported (yet); no known portal API was detected")]
    NotSupported(String),
    #[error(transparent)]
    Creation(#[from] CreationError),
}

/// Thrown when an adapter failed to fetch
/// a chunk of dataset IDs or a single package.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Some I/O problem: '{0}'")]
    IOError(#[from] std::io::Error),
    #[error("Network/Internet download failed: '{0}'")]
    DownloadError(#[from] reqwest::Error),
    #[error("Network/Internet download failed: '{0}'")]
    DownloadMiddlewareError(#[from] reqwest_middleware::Error),
    #[error("Portal API returned HTTP status {0} for '{1}'")]
    HttpStatus(StatusCode, String),
    #[error("Failed to deserialize a fetched result to JSON: {0}")]
    DeserializeAsJsonFailed(#[source] serde_json::Error, String),
    #[error(
        "Failed to deserialize a fetched JSON result to our Rust model of the expected type: {0}"
    )]
    DeserializeFailed(#[source] serde_json::Error, String),
    #[error("Portal API returned an unexpected result: {0}")]
    HostingApiMsg(String),
}

/// Contains descriptive data about the type of a portal adapter.
#[derive(Debug)]
pub struct TypeInfo {
    /// Machine-readable name/id of this type of adapter.
    /// It should be in "kebab-case".
    pub name: &'static str,

    /// Human-readable description of this type of adapter.
    pub description: &'static str,

    /// Path (relative to the portal domain) that answers
    /// with a non-HTML success response on portals of this type.
    pub probe_path: &'static str,
}

/// Creates instances of adapters of a specific type.
pub trait Factory {
    /// Info about the type of adapters produced by this factory.
    fn info(&self) -> &'static TypeInfo;

    /// Creates a new instance of this type of adapter,
    /// following the supplied configuration.
    ///
    /// # Errors
    ///
    /// - Invalid config for this adapter type
    fn create(
        &self,
        config_all: Arc<PartialSettings>,
        config_adapter: Value,
    ) -> Result<Box<dyn PortalAdapter>, CreationError>;
}

/// Knows how to list the datasets of one kind of open-data portal,
/// and how to fetch the metadata of a single one of them.
#[async_trait(?Send)]
pub trait PortalAdapter {
    /// Info about this type of adapter.
    fn info(&self) -> &'static TypeInfo;

    /// The pagination strategy to use when enumerating dataset IDs.
    fn paging(&self) -> Paging;

    /// Total number of datasets (matching the formats, if given).
    async fn probe_total(&self, formats: Option<&FormatFilter>) -> Result<usize, Error>;

    /// Fetches a single chunk of dataset IDs.
    async fn fetch_ids(
        &self,
        formats: Option<&FormatFilter>,
        request: PageRequest,
    ) -> Result<Vec<DatasetId>, Error>;

    /// Fetches the metadata of a single dataset,
    /// including the list of its resources.
    async fn fetch_package(&self, id: &DatasetId) -> Result<Package, Error>;
}

impl fmt::Display for dyn PortalAdapter + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-adapter", self.info().name)
    }
}

/// Creates a default set of headers for API requests.
fn create_headers(config_all: &PartialSettings) -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();
    match config_all.user_agent.parse() {
        Ok(user_agent) => {
            headers.insert(header::USER_AGENT, user_agent);
        }
        Err(err) => {
            tracing::warn!(
                "Ignoring invalid user agent '{}': {err}",
                config_all.user_agent
            );
        }
    }
    headers
}

/// Creates a new [`reqwest::Client`] with the supplied retry and timeout settings.
/// @param retries Number of retries for a single fetch
/// @param timeout Total timeout per request in milliseconds (ms)
fn create_downloader(retries: u32, timeout: u64, headers: HeaderMap) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(retries);
    let client = Client::builder()
        .timeout(Duration::from_millis(timeout))
        .default_headers(headers)
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!("Failed to build configured HTTP client, using defaults: {err}");
            Client::new()
        });
    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

pub fn create_downloader_retry(
    config_all: &PartialSettings,
    config: &impl RetryConfig,
) -> Arc<ClientWithMiddleware> {
    Arc::new(create_downloader(
        config.retries().unwrap_or(DEFAULT_RETRIES),
        config.timeout().unwrap_or(DEFAULT_TIMEOUT),
        create_headers(config_all),
    ))
}

/// Sends a request and parses the response body as JSON into `T`.
///
/// Non-success HTTP status codes are reported as [`Error::HttpStatus`].
pub async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, Error> {
    let response = request.send().await?;
    let status = response.status();
    let url = response.url().to_string();
    if !status.is_success() {
        return Err(Error::HttpStatus(status, url));
    }
    let raw_text = response.text().await?;

    let json_val = match serde_json::from_str::<Value>(&raw_text) {
        Ok(json_val) => json_val,
        Err(serde_err) => {
            tracing::warn!("Failed to parse portal API response from '{url}' as JSON:\n{serde_err}");
            return Err(Error::DeserializeAsJsonFailed(serde_err, raw_text));
        }
    };

    serde_json::from_value::<T>(json_val).map_err(|serde_err| {
        tracing::warn!("Failed to parse portal API response (JSON) from '{url}':\n{serde_err}");
        Error::DeserializeFailed(serde_err, raw_text)
    })
}

#[must_use]
pub fn assemble_factories() -> HashMap<String, Box<dyn Factory>> {
    let factories: Vec<Box<dyn Factory>> = vec![Box::new(data_europa::AdapterFactory)];
    factories
        .into_iter()
        .map(|f| (f.info().name.to_string(), f))
        .collect()
}

/// Creates the adapter of the given type.
pub fn create(
    portal_type: &str,
    config_all: Arc<PartialSettings>,
    config_adapter: Option<Value>,
) -> Result<Box<dyn PortalAdapter>, CreationError> {
    let factories = assemble_factories();
    let factory = factories
        .get(portal_type)
        .ok_or_else(|| CreationError::UnknownPortalType(portal_type.to_owned()))?;
    factory.create(
        config_all,
        config_adapter.unwrap_or_else(|| Value::Object(serde_json::Map::new())),
    )
}

/// Finds out which kind of portal is hosted at the configured domain,
/// by probing the API entry point of each known portal type.
pub async fn detect(config_all: &PartialSettings) -> Result<&'static str, DetectionError> {
    let client = create_downloader(0, DETECTION_TIMEOUT, create_headers(config_all));
    let mut factories: Vec<_> = assemble_factories().into_values().collect();
    factories.sort_by_key(|factory| factory.info().name);
    for factory in factories {
        let info = factory.info();
        let probe_url = format!("{}{}", config_all.domain, info.probe_path);
        tracing::debug!("Probing for portal type '{}' at '{probe_url}' ...", info.name);
        match client.get(&probe_url).send().await {
            Ok(response) => {
                let is_html = response
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .is_some_and(|content_type| content_type.starts_with("text/html"));
                if response.status().is_success() && !is_html {
                    tracing::info!("Portal type detected: {}", info.name);
                    return Ok(info.name);
                }
            }
            Err(err) => {
                tracing::info!("Probe for portal type '{}' failed: {err}", info.name);
            }
        }
    }
    Err(DetectionError::NotSupported(config_all.domain.clone()))
}

/// Creates the adapter for the configured domain,
/// either of the explicitly requested portal type,
/// or of the detected one.
pub async fn create_for(
    config_all: Arc<PartialSettings>,
    portal_type: Option<&str>,
    configs: &HashMap<String, Value>,
) -> Result<Box<dyn PortalAdapter>, DetectionError> {
    let portal_type = match portal_type {
        Some(portal_type) => portal_type,
        None => detect(&config_all).await?,
    };
    Ok(create(
        portal_type,
        config_all,
        configs.get(portal_type).cloned(),
    )?)
}
