// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

#![allow(dead_code)]

pub mod truncated;

use async_trait::async_trait;
use opendata_crawler::{
    adapters::{Error, PageRequest, Paging, PortalAdapter, TypeInfo},
    model::{
        format::FormatFilter,
        package::{DatasetId, Package, Resource},
    },
    settings::Settings,
    shutdown::ShutdownTrigger,
    store::Layout,
};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
    rc::Rc,
    time::Duration,
};

static SCRIPTED: TypeInfo = TypeInfo {
    name: "scripted",
    description: "In-memory portal for tests",
    probe_path: "/",
};

/// What a [`ScriptedAdapter`] did, shared with the test.
#[derive(Debug, Default)]
pub struct Journal {
    pub fetched_packages: RefCell<Vec<DatasetId>>,
    pub requests: RefCell<Vec<PageRequest>>,
    pub in_flight: Cell<usize>,
    pub max_in_flight: Cell<usize>,
}

/// A portal whose pages and packages are defined up-front.
///
/// Pages are keyed by their 1-based number;
/// offset windows map onto them as `offset / limit + 1`.
#[derive(Default)]
pub struct ScriptedAdapter {
    pub paging: Option<Paging>,
    pub total: Option<usize>,
    pub pages: BTreeMap<usize, Result<Vec<DatasetId>, String>>,
    pub packages: HashMap<DatasetId, Package>,
    pub failing_packages: HashSet<DatasetId>,
    pub page_delay: Option<Duration>,
    /// Fires the trigger when this package is fetched.
    pub stop_at: Option<(DatasetId, ShutdownTrigger)>,
    pub journal: Rc<Journal>,
}

impl ScriptedAdapter {
    /// A portal with a single page listing the given packages.
    pub fn with_packages(packages: Vec<Package>) -> Self {
        let ids: Vec<_> = packages.iter().map(|pkg| pkg.id.clone()).collect();
        let mut adapter = Self {
            paging: Some(Paging::Pages {
                page_size: ids.len().max(1),
            }),
            total: Some(ids.len()),
            ..Self::default()
        };
        adapter.pages.insert(1, Ok(ids));
        adapter.packages = packages
            .into_iter()
            .map(|pkg| (pkg.id.clone(), pkg))
            .collect();
        adapter
    }

    /// `count` pages of `page_size` generated IDs each.
    pub fn with_pages(paging: Paging, count: usize, page_size: usize) -> Self {
        let mut adapter = Self {
            paging: Some(paging),
            total: Some(count * page_size),
            ..Self::default()
        };
        for number in 1..=count {
            adapter.pages.insert(
                number,
                Ok((0..page_size).map(|idx| format!("p{number}-{idx}")).collect()),
            );
        }
        adapter
    }
}

#[async_trait(?Send)]
impl PortalAdapter for ScriptedAdapter {
    fn info(&self) -> &'static TypeInfo {
        &SCRIPTED
    }

    fn paging(&self) -> Paging {
        self.paging.unwrap_or(Paging::Pages { page_size: 10 })
    }

    async fn probe_total(&self, _formats: Option<&FormatFilter>) -> Result<usize, Error> {
        self.total
            .ok_or_else(|| Error::HostingApiMsg("scripted probe failure".to_owned()))
    }

    async fn fetch_ids(
        &self,
        _formats: Option<&FormatFilter>,
        request: PageRequest,
    ) -> Result<Vec<DatasetId>, Error> {
        self.journal.requests.borrow_mut().push(request);
        let in_flight = self.journal.in_flight.get() + 1;
        self.journal.in_flight.set(in_flight);
        self.journal
            .max_in_flight
            .set(self.journal.max_in_flight.get().max(in_flight));
        if let Some(delay) = self.page_delay {
            tokio::time::sleep(delay).await;
        }
        self.journal.in_flight.set(self.journal.in_flight.get() - 1);

        let number = match request {
            PageRequest::Window { offset, limit } => offset / limit + 1,
            PageRequest::Page { number, .. } => number,
        };
        match self.pages.get(&number) {
            Some(Ok(ids)) => Ok(ids.clone()),
            Some(Err(msg)) => Err(Error::HostingApiMsg(msg.clone())),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_package(&self, id: &DatasetId) -> Result<Package, Error> {
        self.journal.fetched_packages.borrow_mut().push(id.clone());
        if let Some((stop_id, trigger)) = &self.stop_at {
            if stop_id == id {
                trigger.trigger();
            }
        }
        if self.failing_packages.contains(id) {
            return Err(Error::HostingApiMsg(format!("no metadata for {id}")));
        }
        self.packages
            .get(id)
            .cloned()
            .ok_or_else(|| Error::HostingApiMsg(format!("unknown package {id}")))
    }
}

pub fn package(id: &str, resources: Vec<Resource>) -> Package {
    let mut package = Package::new(id.to_owned(), format!("hash-{id}"));
    package.resources = resources;
    package
}

pub fn resource(id: &str, url: &str, media_type: &str) -> Resource {
    Resource::new(id.to_owned(), Some(url.to_owned()), Some(media_type))
}

pub fn settings(out: &Path, domain: &str) -> Settings {
    Settings::builder()
        .domain(domain)
        .layout(Layout::new(Some(out), domain))
        .save_meta(true)
        .build()
}

pub fn read_ledger(path: &Path) -> Option<Vec<String>> {
    std::fs::read_to_string(path)
        .ok()
        .map(|content| content.lines().map(ToOwned::to_owned).collect())
}
