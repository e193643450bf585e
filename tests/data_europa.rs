// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use opendata_crawler::{
    adapters::{self, DetectionError, Paging, PortalAdapter},
    enumerator::IdEnumerator,
    model::{format::FormatFilter, package::LangLabel},
    settings::PartialSettings,
    tools,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, Request, ResponseTemplate,
};

fn partial(server: &MockServer) -> Arc<PartialSettings> {
    Arc::new(PartialSettings {
        domain: server.uri(),
        user_agent: tools::USER_AGENT.to_owned(),
    })
}

fn adapter(server: &MockServer, config: Value) -> Box<dyn PortalAdapter> {
    adapters::create("data-europa", partial(server), Some(config)).unwrap()
}

fn sparql_query_contains(needle: &'static str) -> impl Fn(&Request) -> bool + Send + Sync {
    move |req: &Request| {
        req.url
            .query_pairs()
            .any(|(key, value)| key == "query" && value.contains(needle))
    }
}

fn bindings(rows: Value) -> Value {
    json!({ "head": { "vars": [] }, "results": { "bindings": rows } })
}

#[tokio::test]
async fn sparql_paging_lists_dataset_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sparql"))
        .and(sparql_query_contains("count(distinct ?dataset)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bindings(json!([
            { "total": { "type": "literal", "value": "3" } }
        ]))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sparql"))
        .and(sparql_query_contains("LIMIT 50000 OFFSET 0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bindings(json!([
            { "dataset": { "type": "uri", "value": "http://data.europa.eu/88u/dataset/one" } },
            { "dataset": { "type": "uri", "value": "http://data.europa.eu/88u/dataset/two" } },
            { "dataset": { "type": "uri", "value": "http://data.europa.eu/88u/dataset/three" } },
        ]))))
        .expect(1)
        .mount(&server)
        .await;
    let adapter = adapter(&server, json!({ "retries": 0 }));
    assert_eq!(adapter.paging(), Paging::OffsetLimit { limit: 50000 });

    let enumeration = IdEnumerator::new(5)
        .enumerate(adapter.as_ref(), None)
        .await
        .unwrap();

    assert_eq!(enumeration.ids, ["one", "two", "three"]);
}

#[tokio::test]
async fn sparql_filter_restricts_formats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sparql"))
        .and(sparql_query_contains(
            "CONTAINS(LCASE(STR(?format)),'csv')",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(bindings(json!([
            { "total": { "value": "0" } }
        ]))))
        .expect(1)
        .mount(&server)
        .await;
    let adapter = adapter(&server, json!({ "retries": 0 }));
    let formats = FormatFilter::new(["CSV"]);

    let total = adapter.probe_total(Some(&formats)).await.unwrap();

    assert_eq!(total, 0);
}

#[tokio::test]
async fn search_paging_walks_numbered_pages() {
    let server = MockServer::start().await;
    let search = "/api/hub/search/search";
    Mock::given(method("GET"))
        .and(path(search))
        .and(query_param("page", "1"))
        .and(query_param("limit", "1"))
        .and(query_param("facets", r#"{"format":["CSV"]}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "count": 3, "results": [{ "id": "a" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(search))
        .and(query_param("page", "1"))
        .and(query_param("limit", "2"))
        .and(query_param("includes", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "count": 3, "results": [{ "id": "a" }, { "id": "b" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(search))
        .and(query_param("page", "2"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "count": 3, "results": [{ "id": "c" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    let adapter = adapter(
        &server,
        json!({ "retries": 0, "paging": "search", "page_size": 2 }),
    );
    let formats = FormatFilter::new(["csv"]);

    let mut enumeration = IdEnumerator::new(5)
        .enumerate(adapter.as_ref(), Some(&formats))
        .await
        .unwrap();
    enumeration.ids.sort();

    assert_eq!(enumeration.pages_total, 2);
    assert_eq!(enumeration.ids, ["a", "b", "c"]);
}

#[tokio::test]
async fn dataset_is_mapped_to_a_package() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/hub/search/datasets/ds-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "id": "ds-1",
                "title": { "de": "Luftqualität", "en": "Air quality" },
                "description": { "fr": "Qualité de l'air" },
                "country": { "id": "ES", "label": "Spain" },
                "language": [{ "label": "Spanish" }],
                "publisher": { "name": "Ministry", "resource": "https://ministry.example" },
                "categories": [{ "label": { "es": "Medio ambiente", "en": "Environment" } }],
                "keywords": [
                    { "language": "es", "label": "aire" },
                    { "language": "de", "label": "luft" }
                ],
                "issued": "2020-01-01",
                "modified": "2024-05-06",
                "resource": "http://data.europa.eu/88u/dataset/ds-1",
                "distributions": [
                    {
                        "id": "dist-1",
                        "title": { "es": "Datos" },
                        "format": { "id": "CSV" },
                        "download_url": ["https://files.example/a%20b.csv"],
                        "license": { "label": "CC-BY-4.0" },
                        "byte_size": "2048"
                    },
                    {
                        "id": "dist-2",
                        "format": { "id": "PDF" },
                        "access_url": ["https://files.example/get?id=7&compressed=true"],
                        "rights": { "resource": "https://rights.example" }
                    }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    let adapter = adapter(&server, json!({ "retries": 0 }));

    let package = adapter.fetch_package(&"ds-1".to_owned()).await.unwrap();

    let domain = server.uri();
    assert_eq!(package.id, "ds-1");
    assert_eq!(package.custom_id, tools::generate_hash(&domain, "ds-1"));
    assert_eq!(package.title, Some(LangLabel::new("en", "Air quality")));
    assert_eq!(
        package.description,
        Some(LangLabel::new("fr", "Qualité de l'air"))
    );
    assert_eq!(package.themes, [LangLabel::new("es", "Medio ambiente")]);
    assert_eq!(package.keywords, [LangLabel::new("es", "aire")]);
    assert_eq!(package.country.as_deref(), Some("Spain"));
    assert_eq!(package.language.as_deref(), Some("Spanish"));
    assert_eq!(
        package.url.as_deref(),
        Some("http://data.europa.eu/data/datasets/ds-1")
    );
    assert_eq!(package.license.as_deref(), Some("CC-BY-4.0"));

    let [csv, pdf] = package.resources.as_slice() else {
        panic!("expected two resources, got {:?}", package.resources);
    };
    assert_eq!(csv.resource_id, tools::generate_hash(&domain, "dist-1"));
    assert_eq!(csv.download_url.as_deref(), Some("https://files.example/a b.csv"));
    assert_eq!(csv.media_type.as_deref(), Some("csv"));
    assert_eq!(csv.byte_size, Some(2048));
    assert_eq!(csv.title, Some(LangLabel::new("es", "Datos")));
    assert!(csv.path.is_none());
    assert_eq!(pdf.media_type.as_deref(), Some("pdf"));
    assert_eq!(
        pdf.download_url.as_deref(),
        Some("https://files.example/get?id=7")
    );
    assert_eq!(pdf.rights.as_deref(), Some("https://rights.example"));
}

#[tokio::test]
async fn failing_dataset_fetch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/hub/search/datasets/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    let adapter = adapter(&server, json!({ "retries": 0 }));

    assert!(adapter.fetch_package(&"broken".to_owned()).await.is_err());
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let server = MockServer::start().await;
    let res = adapters::create("data-europa", partial(&server), Some(json!({ "paging": "carrier-pigeon" })));
    assert!(res.is_err());
    assert!(adapters::create("no-such-portal", partial(&server), None).is_err());
}

#[tokio::test]
async fn portal_type_is_detected_by_probing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/hub/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;

    let detected = adapters::detect(&partial(&server)).await.unwrap();

    assert_eq!(detected, "data-europa");
}

#[tokio::test]
async fn html_answers_are_not_a_portal_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .mount(&server)
        .await;

    let res = adapters::detect(&partial(&server)).await;

    assert!(matches!(res, Err(DetectionError::NotSupported(_))));
}
