use std::collections::BTreeSet;
use std::sync::Arc;

use reqwest::Client;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use apkd::app::SourceId;
use apkd::catalog::Catalog;
use apkd::error::ApkdError;
use apkd::logger::Logger;
use apkd::source::Source;
use apkd::sources::rustore::RuStore;

fn store(server: &MockServer) -> RuStore {
    RuStore::new(&server.uri(), Client::new(), 0)
}

fn overall_info() -> serde_json::Value {
    json!({
        "code": "OK",
        "body": {
            "appId": 77,
            "packageName": "ru.example.bank",
            "versionName": "2.3.1-rustore",
            "versionCode": 231,
            "appVerUpdatedAt": "2024-03-05T10:11:12.345+03:00",
            "publicCompanyId": "acme-42"
        }
    })
}

async fn mount_overall_info(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/applicationData/overallInfo/ru.example.bank"))
        .and(header("devicetype", "mobile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(overall_info()))
        .mount(server)
        .await;
}

async fn mount_download_link(server: &MockServer, reply: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/applicationData/v2/download-link"))
        .and(body_partial_json(json!({"appId": 77, "withoutSplits": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply))
        .mount(server)
        .await;
}

#[tokio::test]
async fn current_release_carries_size_date_and_link() {
    let server = MockServer::start().await;
    mount_overall_info(&server).await;
    let artifact = format!("{}/dl/ru.example.bank.apk", server.uri());
    mount_download_link(
        &server,
        json!({
            "code": "OK",
            "body": {"downloadUrls": [{"url": artifact, "size": 5242880}]}
        }),
    )
    .await;

    let app = store(&server)
        .get_app_info("ru.example.bank", None)
        .await
        .unwrap();

    assert_eq!(app.source.as_str(), "RuStore");
    let version = app.newest().unwrap();
    assert_eq!(version.name, "2.3.1");
    assert_eq!(version.code, 231);
    assert_eq!(version.size, 5242880);
    assert_eq!(version.update_date.as_deref(), Some("2024-03-05"));
    assert_eq!(version.download_link.as_deref(), Some(artifact.as_str()));
}

#[tokio::test]
async fn error_envelope_means_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/applicationData/overallInfo/ru.missing"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": "ERROR", "message": "App not found", "body": null})),
        )
        .mount(&server)
        .await;

    let err = store(&server).get_app_info("ru.missing", None).await.unwrap_err();
    assert!(matches!(err, ApkdError::AppNotFound { .. }));
}

#[tokio::test]
async fn refused_link_surfaces_as_link_unavailable() {
    let server = MockServer::start().await;
    mount_overall_info(&server).await;
    mount_download_link(
        &server,
        json!({"code": "ERROR", "body": {"reason": "region locked"}}),
    )
    .await;

    let store = store(&server);
    let app = store.get_app_info("ru.example.bank", None).await.unwrap();
    let version = app.newest().unwrap();
    assert!(version.download_link.is_none());
    assert_eq!(version.size, 0);

    let err = store
        .resolve_download_link("ru.example.bank", version)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApkdError::DownloadLinkUnavailable { ref package, code: 231, .. } if package == "ru.example.bank"
    ));
}

#[tokio::test]
async fn developer_round_trip_through_catalog() {
    let server = MockServer::start().await;
    mount_overall_info(&server).await;
    Mock::given(method("GET"))
        .and(path("/applicationData/devs/acme-42/apps"))
        .and(query_param("limit", "999999"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "OK",
            "body": {"elements": [
                {"packageName": "ru.example.bank"},
                {"packageName": "ru.example.wallet"}
            ]}
        })))
        .mount(&server)
        .await;

    let sources: Vec<Arc<dyn Source>> = vec![Arc::new(store(&server))];
    let catalog = Catalog::new(sources, Arc::new(Logger::capturing()));
    let cancel = CancellationToken::new();

    let developers = catalog
        .get_developer_ids("ru.example.bank", &cancel)
        .await
        .unwrap();
    assert_eq!(
        developers,
        BTreeSet::from([(SourceId::new("RuStore"), "acme-42".to_string())])
    );

    let (_, developer) = developers.into_iter().next().unwrap();
    let packages = catalog
        .get_packages_from_developer(&developer, &cancel)
        .await
        .unwrap();
    assert_eq!(
        packages,
        BTreeSet::from(["ru.example.bank".to_string(), "ru.example.wallet".to_string()])
    );
}

#[tokio::test]
async fn unknown_developer_is_developer_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/applicationData/devs/nobody/apps"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": "ERROR", "message": "unknown"})),
        )
        .mount(&server)
        .await;

    let err = store(&server)
        .find_packages_from_developer("nobody")
        .await
        .unwrap_err();
    assert!(matches!(err, ApkdError::DeveloperNotFound { ref developer } if developer == "nobody"));
}
