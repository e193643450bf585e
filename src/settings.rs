// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

#![allow(clippy::shadow_reuse)]

use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::{model::format::FormatFilter, store::Layout, tools};

pub const DEFAULT_CONFIG_FILE: &str = "opendata-crawler";
pub const ENV_PREFIX: &str = "ODCRAWLER";

pub const DEFAULT_CONCURRENCY: usize = 5;
/// Maximum wall-clock time for a single resource download
pub const DEFAULT_DOWNLOAD_BUDGET: Duration = Duration::from_secs(60);
/// Time in-flight downloads get to finish after a stop was requested
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load the basic/low-level configuration data: {0}")]
    Config(#[from] ConfigError),
    #[error("Incorrect domain '{0}'; it must have the form https://domain.example or http://domain.example")]
    InvalidDomain(String),
    #[error("Setting '{0}' must be larger than zero")]
    Zero(&'static str),
}

/// Settings as they come out of the layered configuration sources,
/// before validation.
#[derive(Serialize, Deserialize, Debug)]
pub struct IntermediateSettings {
    pub domain: String,
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub portal: Option<String>,
    #[serde(default)]
    pub save_meta: bool,
    #[serde(default)]
    pub formats: Vec<String>,
    pub user_agent: String,
    pub concurrency: usize,
    /// Download time budget per resource, in seconds
    pub download_budget: u64,
    /// Grace period for in-flight downloads on interruption, in seconds
    pub grace_period: u64,
    /// Connect timeout for resource downloads, in seconds
    pub connect_timeout: u64,
    /// Adapter specific configuration, keyed by portal type
    #[serde(default)]
    pub portals: HashMap<String, Value>,
}

/// The subset of settings the portal adapters get to see.
#[derive(Debug, Clone)]
pub struct PartialSettings {
    /// The portal base URL, without trailing slash
    pub domain: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub concurrency: usize,
    pub budget: Duration,
    pub grace_period: Duration,
    pub connect_timeout: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            budget: DEFAULT_DOWNLOAD_BUDGET,
            grace_period: DEFAULT_GRACE_PERIOD,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationSettings {
    pub concurrency: usize,
}

impl Default for EnumerationSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Everything a single crawl needs to know,
/// constructed once and handed to the crawler.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Settings {
    /// The portal base URL, without trailing slash
    #[builder(setter(transform = |domain: &str| tools::trim_domain(domain).to_owned()))]
    pub domain: String,
    /// Explicit portal type; detected if not given
    #[builder(default, setter(strip_option))]
    pub portal: Option<String>,
    pub layout: Layout,
    #[builder(default)]
    pub save_meta: bool,
    #[builder(default, setter(strip_option))]
    pub formats: Option<FormatFilter>,
    #[builder(default = tools::USER_AGENT.to_owned())]
    pub user_agent: String,
    #[builder(default)]
    pub download: DownloadSettings,
    #[builder(default)]
    pub enumeration: EnumerationSettings,
    #[builder(default)]
    pub portals: HashMap<String, Value>,
}

impl Settings {
    #[must_use]
    pub fn partial(&self) -> Arc<PartialSettings> {
        Arc::new(PartialSettings {
            domain: self.domain.clone(),
            user_agent: self.user_agent.clone(),
        })
    }
}

impl IntermediateSettings {
    pub fn finalize(self) -> Result<Settings, SettingsError> {
        if !tools::check_url(&self.domain) {
            return Err(SettingsError::InvalidDomain(self.domain));
        }
        if self.concurrency == 0 {
            return Err(SettingsError::Zero("concurrency"));
        }
        if self.download_budget == 0 {
            return Err(SettingsError::Zero("download_budget"));
        }
        let domain = tools::trim_domain(&self.domain).to_owned();
        let layout = Layout::new(self.path.as_deref(), &domain);
        Ok(Settings {
            domain,
            portal: self.portal,
            layout,
            save_meta: self.save_meta,
            formats: FormatFilter::from_list(self.formats),
            user_agent: self.user_agent,
            download: DownloadSettings {
                concurrency: self.concurrency,
                budget: Duration::from_secs(self.download_budget),
                grace_period: Duration::from_secs(self.grace_period),
                connect_timeout: Duration::from_secs(self.connect_timeout),
            },
            enumeration: EnumerationSettings {
                concurrency: self.concurrency,
            },
            portals: self.portals,
        })
    }
}

/// Values given on the command line,
/// which take precedence over all other sources.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub domain: Option<String>,
    pub path: Option<PathBuf>,
    pub portal: Option<String>,
    pub save_meta: Option<bool>,
    pub formats: Option<Vec<String>>,
}

/// # Errors
///
/// - the config loader fails to build
/// - settings failed to load and deserialize into intermediate settings
/// - the intermediate settings fail to validate
pub fn load(overrides: Overrides) -> Result<Settings, SettingsError> {
    let config_file = match &overrides.config_file {
        Some(file) => config::File::from(file.as_path()).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };
    let settings_loader = Config::builder()
        .set_default("user_agent", tools::USER_AGENT)?
        .set_default("concurrency", DEFAULT_CONCURRENCY as u64)?
        .set_default("download_budget", DEFAULT_DOWNLOAD_BUDGET.as_secs())?
        .set_default("grace_period", DEFAULT_GRACE_PERIOD.as_secs())?
        .set_default("connect_timeout", DEFAULT_CONNECT_TIMEOUT.as_secs())?
        .add_source(config_file)
        // Eg.. `ODCRAWLER_SAVE_META=true ./target/opendata-crawler` would set the `save_meta` key
        .add_source(config::Environment::with_prefix(ENV_PREFIX))
        .set_override_option("domain", overrides.domain)?
        .set_override_option(
            "path",
            overrides.path.map(|path| path.to_string_lossy().into_owned()),
        )?
        .set_override_option("portal", overrides.portal)?
        .set_override_option("save_meta", overrides.save_meta)?
        .set_override_option("formats", overrides.formats)?
        .build()?;

    let intermediate_settings = settings_loader.try_deserialize::<IntermediateSettings>()?;

    tracing::debug!("{intermediate_settings:#?}");

    intermediate_settings.finalize()
}
