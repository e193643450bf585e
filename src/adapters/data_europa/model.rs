// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::model::package::LangLabel;

/// Multilingual text, keyed by language code, in document order.
pub(super) type LangMap = Map<String, Value>;

#[derive(Deserialize, Debug)]
pub(super) struct SparqlValue {
    pub(super) value: String,
}

#[derive(Deserialize, Debug)]
pub(super) struct SparqlBindings {
    pub(super) bindings: Vec<HashMap<String, SparqlValue>>,
}

#[derive(Deserialize, Debug)]
pub(super) struct SparqlResponse {
    pub(super) results: SparqlBindings,
}

#[derive(Deserialize, Debug)]
pub(super) struct SearchHit {
    pub(super) id: String,
}

#[derive(Deserialize, Debug)]
pub(super) struct SearchResult {
    pub(super) count: usize,
    #[serde(default)]
    pub(super) results: Vec<SearchHit>,
}

#[derive(Deserialize, Debug)]
pub(super) struct Wrapped<T> {
    pub(super) result: T,
}

#[derive(Deserialize, Debug, Default)]
pub(super) struct Labeled {
    pub(super) label: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(super) struct Referenced {
    pub(super) resource: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(super) struct ApiPublisher {
    pub(super) name: Option<String>,
    pub(super) resource: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(super) struct Category {
    pub(super) label: Option<LangMap>,
}

#[derive(Deserialize, Debug)]
pub(super) struct Keyword {
    pub(super) language: Option<String>,
    pub(super) label: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(super) struct FormatRef {
    pub(super) id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(super) struct Distribution {
    pub(super) id: Option<String>,
    pub(super) title: Option<LangMap>,
    pub(super) format: Option<FormatRef>,
    #[serde(default)]
    pub(super) download_url: Vec<String>,
    #[serde(default)]
    pub(super) access_url: Vec<String>,
    pub(super) license: Option<Labeled>,
    pub(super) rights: Option<Referenced>,
    /// Sometimes a number, sometimes a string
    pub(super) byte_size: Option<Value>,
}

#[derive(Deserialize, Debug)]
pub(super) struct Dataset {
    pub(super) title: Option<LangMap>,
    pub(super) description: Option<LangMap>,
    pub(super) country: Option<Labeled>,
    #[serde(default)]
    pub(super) language: Vec<Labeled>,
    pub(super) publisher: Option<ApiPublisher>,
    #[serde(default)]
    pub(super) categories: Vec<Category>,
    #[serde(default)]
    pub(super) keywords: Vec<Keyword>,
    pub(super) issued: Option<String>,
    pub(super) modified: Option<String>,
    pub(super) resource: Option<String>,
    #[serde(default)]
    pub(super) distributions: Vec<Distribution>,
}

/// Picks the text in the first preferred language that is present,
/// falling back to the first language available.
pub(super) fn pick_label(texts: &LangMap, preferred: &[String]) -> Option<LangLabel> {
    preferred
        .iter()
        .find_map(|lang| {
            texts
                .get(lang)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(|text| LangLabel::new(lang.as_str(), text))
        })
        .or_else(|| {
            texts.iter().find_map(|(lang, text)| {
                text.as_str().map(|text| LangLabel::new(lang.as_str(), text))
            })
        })
}

/// Keywords in the preferred languages,
/// or all of them if none is in a preferred language.
pub(super) fn pick_keywords(keywords: &[Keyword], preferred: &[String]) -> Vec<LangLabel> {
    let to_label = |keyword: &Keyword| {
        LangLabel::new(
            keyword.language.clone().unwrap_or_default(),
            keyword.label.clone().unwrap_or_default(),
        )
    };
    let in_preferred: Vec<_> = keywords
        .iter()
        .filter(|keyword| {
            keyword
                .language
                .as_ref()
                .is_some_and(|lang| preferred.contains(lang))
        })
        .map(to_label)
        .collect();
    if in_preferred.is_empty() {
        keywords.iter().map(to_label).collect()
    } else {
        in_preferred
    }
}

pub(super) fn parse_byte_size(raw: Option<&Value>) -> Option<u64> {
    match raw? {
        Value::Number(num) => num.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
