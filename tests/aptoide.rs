use std::sync::Arc;

use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use apkd::catalog::Catalog;
use apkd::download::Downloader;
use apkd::error::ApkdError;
use apkd::logger::Logger;
use apkd::runner::{Operation, OutputTarget, Row, TaskRunner};
use apkd::source::Source;
use apkd::sources::aptoide::Aptoide;
use apkd::task::Task;

fn aptoide(server: &MockServer) -> Aptoide {
    Aptoide::new(&server.uri(), Client::new(), 0)
}

fn file(code: i64) -> serde_json::Value {
    json!({
        "vername": format!("3.{code}"),
        "vercode": code,
        "filesize": code * 1000,
        "added": "2023-12-31 23:59:59"
    })
}

async fn mount_history(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/7/getApp"))
        .and(query_param("package_name", "com.example.notes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "info": {"status": "OK"},
            "nodes": {"versions": {"list": [
                {"file": file(20)},
                {"file": file(30)},
                {"file": file(10)}
            ]}}
        })))
        .mount(server)
        .await;
}

async fn mount_meta(server: &MockServer, code: i64, reply: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/7/getApp"))
        .and(query_param("package_name", "com.example.notes"))
        .and(query_param("vercode", code.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply))
        .with_priority(1)
        .mount(server)
        .await;
}

fn meta(code: i64, path: Option<String>) -> serde_json::Value {
    let mut file = file(code);
    if let Some(path) = path {
        file["path"] = json!(path);
    }
    json!({
        "info": {"status": "OK"},
        "nodes": {"meta": {"data": {"file": file}}}
    })
}

#[tokio::test]
async fn history_is_newest_first_and_limit_keeps_the_newest() {
    let server = MockServer::start().await;
    mount_history(&server).await;

    let app = aptoide(&server)
        .get_app_info("com.example.notes", Some(2))
        .await
        .unwrap();

    let codes: Vec<i64> = app.versions().iter().map(|v| v.code).collect();
    assert_eq!(codes, vec![30, 20]);
    let newest = app.newest().unwrap();
    assert_eq!(newest.name, "3.30");
    assert_eq!(newest.size, 30000);
    assert_eq!(newest.update_date.as_deref(), Some("2023-12-31"));
    assert!(newest.download_link.is_none());
}

#[tokio::test]
async fn failed_status_means_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/7/getApp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "info": {"status": "FAIL"},
            "errors": [{"code": "APK-5", "description": "No app found"}]
        })))
        .mount(&server)
        .await;

    let err = aptoide(&server)
        .get_app_info("com.missing", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApkdError::AppNotFound { .. }));
}

#[tokio::test]
async fn link_is_resolved_per_version() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let artifact = format!("{}/apk/com.example.notes_20.apk", server.uri());
    mount_meta(&server, 20, meta(20, Some(artifact.clone()))).await;

    let source = aptoide(&server);
    let app = source.get_app_info("com.example.notes", None).await.unwrap();
    let version = app.version_by_code(20).unwrap();

    let link = source
        .resolve_download_link("com.example.notes", version)
        .await
        .unwrap();
    assert_eq!(link, artifact);
}

#[tokio::test]
async fn unresolvable_link_is_link_unavailable() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    mount_meta(&server, 30, meta(30, None)).await;
    mount_meta(
        &server,
        10,
        json!({"info": {"status": "FAIL"}, "errors": [{"code": "APK-5"}]}),
    )
    .await;

    let source = aptoide(&server);
    let app = source.get_app_info("com.example.notes", None).await.unwrap();

    for code in [30, 10] {
        let version = app.version_by_code(code).unwrap();
        let err = source
            .resolve_download_link("com.example.notes", version)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ApkdError::DownloadLinkUnavailable { code: c, .. } if c == code),
            "version {code}: {err}"
        );
    }
}

#[tokio::test]
async fn download_resolves_link_just_in_time() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let artifact = format!("{}/apk/com.example.notes_30.apk", server.uri());
    mount_meta(&server, 30, meta(30, Some(artifact))).await;
    Mock::given(method("GET"))
        .and(path("/apk/com.example.notes_30.apk"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![5u8; 700]))
        .expect(1)
        .mount(&server)
        .await;

    let logger = Arc::new(Logger::capturing());
    let sources: Vec<Arc<dyn Source>> = vec![Arc::new(aptoide(&server))];
    let catalog = Arc::new(Catalog::new(sources, Arc::clone(&logger)));
    let downloader = Arc::new(Downloader::new(Client::new(), Arc::clone(&logger)));
    let runner = TaskRunner::new(catalog, downloader, logger, 2);
    let dir = tempfile::tempdir().unwrap();

    let report = runner
        .run(
            vec![Task::newest("com.example.notes")],
            Operation::Download {
                output: OutputTarget::Directory(dir.path().to_path_buf()),
            },
        )
        .await
        .unwrap();

    assert!(report.all_succeeded());
    let expected = dir.path().join("com.example.notes_30.apk");
    assert!(matches!(
        &report.rows[0],
        Row::Downloaded { code: 30, bytes: 700, path, .. } if *path == expected
    ));
    assert_eq!(std::fs::read(expected).unwrap(), vec![5u8; 700]);
}
