// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::{create_downloader_retry, fetch_json, RetryConfig};
use super::{
    CreationError, Error, Factory as IAdapterFactory, PageRequest, Paging,
    PortalAdapter as IPortalAdapter, TypeInfo,
};
use crate::{
    model::{
        format::FormatFilter,
        package::{DatasetId, Package, Publisher, Resource},
    },
    settings::PartialSettings,
    tools,
};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use model::{Dataset, Distribution, SearchResult, SparqlResponse, Wrapped};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::{Arc, LazyLock};
use tracing::instrument;

mod model;

pub static ADAPTER_TYPE: LazyLock<TypeInfo> = LazyLock::new(|| TypeInfo {
    name: "data-europa",
    description: "Crawls the official portal for European data
(<https://data.europa.eu/>), via its SPARQL endpoint and hub search API.",
    probe_path: "/api/hub/search/",
});

/// This has to be static,
/// because if we created multiple instances of [`Adapter`],
/// we would send too many requests from the same network address.
pub static RATE_LIMITER: LazyLock<Arc<super::RL>> = LazyLock::new(|| {
    Arc::new(RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN),
    )))
});

const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_WINDOW_SIZE: usize = 50000;
const DEFAULT_API_PATH: &str = "/api/hub/search/";
const DEFAULT_SPARQL_PATH: &str = "/sparql";
const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
const DATASET_CLASS: &str = "<http://www.w3.org/ns/dcat#Dataset>";
const DISTRIBUTION_PROP: &str = "<http://www.w3.org/ns/dcat#distribution>";
const FORMAT_PROP: &str = "<http://purl.org/dc/terms/format>";

/// Which API to enumerate the dataset IDs with.
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PagingMode {
    /// SPARQL `LIMIT`/`OFFSET` windows
    #[default]
    Sparql,
    /// Numbered pages of the hub search API
    Search,
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    /// Number of retries for a specific fetch,
    /// e.g. a page of IDs or a single package.
    retries: Option<u32>,
    /// Request timeout in milliseconds (ms)
    timeout: Option<u64>,
    #[serde(default)]
    paging: PagingMode,
    /// Number of IDs per page of the search API
    page_size: Option<usize>,
    /// Number of IDs per SPARQL window
    window_size: Option<usize>,
    /// Base URL of the hub search API, ending with a slash;
    /// defaults to `<domain>/api/hub/search/`.
    api_base: Option<String>,
    /// Defaults to `<domain>/sparql`.
    sparql_url: Option<String>,
    /// Preferred languages for multilingual texts, in order
    languages: Option<Vec<String>>,
}

impl RetryConfig for Config {
    fn retries(&self) -> Option<u32> {
        self.retries
    }

    fn timeout(&self) -> Option<u64> {
        self.timeout
    }
}

pub struct AdapterFactory;

impl IAdapterFactory for AdapterFactory {
    fn info(&self) -> &'static TypeInfo {
        &ADAPTER_TYPE
    }

    fn create(
        &self,
        config_all: Arc<PartialSettings>,
        config_adapter: Value,
    ) -> Result<Box<dyn IPortalAdapter>, CreationError> {
        let config: Config = serde_json::from_value(config_adapter)
            .map_err(|err| CreationError::InvalidConfig(ADAPTER_TYPE.name.to_owned(), err))?;
        let downloader = create_downloader_retry(config_all.as_ref(), &config);
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| format!("{}{DEFAULT_API_PATH}", config_all.domain));
        let sparql_url = config
            .sparql_url
            .clone()
            .unwrap_or_else(|| format!("{}{DEFAULT_SPARQL_PATH}", config_all.domain));
        let languages = config
            .languages
            .clone()
            .unwrap_or_else(|| vec!["es".to_owned(), "en".to_owned()]);
        Ok(Box::new(Adapter {
            config_all,
            config,
            api_base,
            sparql_url,
            languages,
            downloader,
        }))
    }
}

#[derive(Debug)]
pub struct Adapter {
    config_all: Arc<PartialSettings>,
    config: Config,
    api_base: String,
    sparql_url: String,
    languages: Vec<String>,
    downloader: Arc<ClientWithMiddleware>,
}

/// Escapes a value for use inside a single-quoted SPARQL string literal.
fn sparql_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// The `where` clause selecting all datasets,
/// or only those with at least one distribution in one of the formats.
fn sparql_where(formats: Option<&FormatFilter>) -> String {
    match formats {
        Some(formats) if !formats.is_empty() => {
            let conditions = formats
                .iter()
                .map(|format| {
                    format!(
                        "CONTAINS(LCASE(STR(?format)),'{}')",
                        sparql_literal(format)
                    )
                })
                .collect::<Vec<_>>()
                .join(" || ");
            format!(
                "where {{ ?dataset a {DATASET_CLASS} . ?dataset {DISTRIBUTION_PROP} ?distribution . ?distribution {FORMAT_PROP} ?format . FILTER ({conditions}) }}"
            )
        }
        _ => format!("where {{ ?dataset a {DATASET_CLASS} }}"),
    }
}

fn count_query(formats: Option<&FormatFilter>) -> String {
    format!(
        "select (count(distinct ?dataset) as ?total) {}",
        sparql_where(formats)
    )
}

/// Windows are ordered, so consecutive offsets never overlap or skip.
fn window_query(formats: Option<&FormatFilter>, offset: usize, limit: usize) -> String {
    format!(
        "select distinct ?dataset {} ORDER BY ?dataset LIMIT {limit} OFFSET {offset}",
        sparql_where(formats)
    )
}

/// The format facet of the search API, e.g. `{"format":["CSV","PDF"]}`.
fn search_facets(formats: Option<&FormatFilter>) -> Option<String> {
    let formats = formats.filter(|formats| !formats.is_empty())?;
    let upper: Vec<String> = formats.iter().map(str::to_uppercase).collect();
    Some(serde_json::json!({ "format": upper }).to_string())
}

/// The dataset ID is the last path segment of its IRI.
fn id_from_iri(iri: &str) -> &str {
    iri.trim_end_matches('/').rsplit('/').next().unwrap_or(iri)
}

impl Adapter {
    async fn sparql(&self, query: String) -> Result<SparqlResponse, Error> {
        RATE_LIMITER.until_ready().await;
        tracing::trace!("SPARQL query: {query}");
        fetch_json(
            self.downloader
                .get(&self.sparql_url)
                .header(header::ACCEPT, SPARQL_RESULTS_JSON)
                .query(&[("query", query)]),
        )
        .await
    }

    async fn search(
        &self,
        formats: Option<&FormatFilter>,
        page: usize,
        limit: usize,
    ) -> Result<SearchResult, Error> {
        RATE_LIMITER.until_ready().await;
        let mut params = vec![
            ("q", String::new()),
            ("filter", "dataset".to_owned()),
            ("limit", limit.to_string()),
            ("page", page.to_string()),
            ("includes", "id".to_owned()),
        ];
        if let Some(facets) = search_facets(formats) {
            params.push(("facets", facets));
        }
        let wrapped: Wrapped<SearchResult> = fetch_json(
            self.downloader
                .get(format!("{}search", self.api_base))
                .query(&params),
        )
        .await?;
        Ok(wrapped.result)
    }

    fn page_size(&self) -> usize {
        self.config.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
    }

    fn window_size(&self) -> usize {
        self.config.window_size.unwrap_or(DEFAULT_WINDOW_SIZE).max(1)
    }

    fn hash(&self, id: &str) -> String {
        tools::generate_hash(&self.config_all.domain, id)
    }

    fn convert_resource(&self, dataset_id: &str, index: usize, dist: Distribution) -> Resource {
        let raw_url = dist.download_url.first().cloned().or_else(|| {
            dist.access_url
                .first()
                .map(|url| url.replace("&compressed=true", ""))
        });
        let download_url = raw_url.map(|url| tools::url_decode(&url).into_owned());
        let resource_id = match (&dist.id, &download_url) {
            (Some(id), _) => self.hash(id),
            (None, Some(url)) => self.hash(url),
            (None, None) => self.hash(&format!("{dataset_id}#{index}")),
        };
        let media_type = dist.format.and_then(|format| format.id);
        let mut resource = Resource::new(resource_id, download_url, media_type.as_deref());
        resource.title = dist
            .title
            .as_ref()
            .and_then(|titles| model::pick_label(titles, &self.languages));
        resource.byte_size = model::parse_byte_size(dist.byte_size.as_ref());
        resource.rights = dist
            .license
            .and_then(|license| license.label)
            .or_else(|| dist.rights.and_then(|rights| rights.resource));
        resource
    }

    fn convert_package(&self, id: &DatasetId, dataset: Dataset) -> Package {
        let mut package = Package::new(id.clone(), self.hash(id));
        let langs = &self.languages;
        package.title = dataset
            .title
            .as_ref()
            .and_then(|texts| model::pick_label(texts, langs));
        package.description = dataset
            .description
            .as_ref()
            .and_then(|texts| model::pick_label(texts, langs));
        package.themes = dataset
            .categories
            .iter()
            .filter_map(|category| category.label.as_ref())
            .filter_map(|label| model::pick_label(label, langs))
            .collect();
        package.keywords = model::pick_keywords(&dataset.keywords, langs);
        package.publisher = dataset.publisher.map(|publisher| Publisher {
            name: publisher.name,
            homepage: publisher.resource,
        });
        package.language = dataset
            .language
            .into_iter()
            .next()
            .and_then(|lang| lang.label);
        package.country = dataset.country.and_then(|country| country.label);
        package.issued = dataset.issued;
        package.modified = dataset.modified;
        package.url = dataset
            .resource
            .map(|url| url.replace("88u/dataset", "data/datasets"));
        package.resources = dataset
            .distributions
            .into_iter()
            .enumerate()
            .map(|(index, dist)| self.convert_resource(id, index, dist))
            .collect();
        package.license = package
            .resources
            .iter()
            .find_map(|res| res.rights.clone());
        package
    }
}

#[async_trait(?Send)]
impl IPortalAdapter for Adapter {
    fn info(&self) -> &'static TypeInfo {
        &ADAPTER_TYPE
    }

    fn paging(&self) -> Paging {
        match self.config.paging {
            PagingMode::Sparql => Paging::OffsetLimit {
                limit: self.window_size(),
            },
            PagingMode::Search => Paging::Pages {
                page_size: self.page_size(),
            },
        }
    }

    #[instrument(skip_all)]
    async fn probe_total(&self, formats: Option<&FormatFilter>) -> Result<usize, Error> {
        match self.config.paging {
            PagingMode::Sparql => {
                let response = self.sparql(count_query(formats)).await?;
                let total = response
                    .results
                    .bindings
                    .first()
                    .and_then(|binding| binding.get("total"))
                    .ok_or_else(|| {
                        Error::HostingApiMsg("SPARQL count returned no 'total'".to_owned())
                    })?;
                total.value.trim().parse().map_err(|err| {
                    Error::HostingApiMsg(format!(
                        "SPARQL count returned a non-numeric total '{}': {err}",
                        total.value
                    ))
                })
            }
            PagingMode::Search => Ok(self.search(formats, 1, 1).await?.count),
        }
    }

    async fn fetch_ids(
        &self,
        formats: Option<&FormatFilter>,
        request: PageRequest,
    ) -> Result<Vec<DatasetId>, Error> {
        match request {
            PageRequest::Window { offset, limit } => {
                let response = self.sparql(window_query(formats, offset, limit)).await?;
                Ok(response
                    .results
                    .bindings
                    .iter()
                    .filter_map(|binding| binding.get("dataset"))
                    .map(|iri| id_from_iri(&iri.value).to_owned())
                    .collect())
            }
            PageRequest::Page { number, size } => Ok(self
                .search(formats, number, size)
                .await?
                .results
                .into_iter()
                .map(|hit| hit.id)
                .collect()),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_package(&self, id: &DatasetId) -> Result<Package, Error> {
        RATE_LIMITER.until_ready().await;
        let url = format!("{}datasets/{}", self.api_base, tools::url_encode(id));
        let wrapped: Wrapped<Dataset> = fetch_json(self.downloader.get(url)).await?;
        Ok(self.convert_package(id, wrapped.result))
    }
}
