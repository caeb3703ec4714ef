use remuneration_sync_core::config::Period;
use remuneration_sync_core::contract::{
    Clients, MockDatabase, MockParserService, MockStorage, MonthRecord, ParseRequest,
    ProcessError, ProcessRequest, Processor, StoredObject,
};
use remuneration_sync_core::crawl::CrawlProcessor;
use remuneration_sync_core::index::generate_index;
use serde_json::json;
use std::fs::{self, create_dir};
use std::sync::Arc;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn period() -> Period {
    Period::new(3, 2024).unwrap()
}

fn echo_storage(times: usize) -> MockStorage {
    let mut storage = MockStorage::new();
    storage
        .expect_upload()
        .times(times)
        .returning(|key: &str, _content: Vec<u8>| {
            Ok(StoredObject {
                key: key.to_string(),
                url: format!("https://storage.local/{key}"),
            })
        });
    storage
}

fn echo_parser(times: usize) -> MockParserService {
    let mut parser = MockParserService::new();
    parser
        .expect_parse()
        .times(times)
        .returning(|req: ParseRequest| Ok(vec![json!({ "file": req.file_name, "rows": 1 })]));
    parser
}

#[tokio::test]
async fn test_crawl_local_index_uploads_parses_and_stores_every_file() {
    let src = tempdir().unwrap();
    fs::write(src.path().join("a.csv"), "alpha").unwrap();
    fs::write(src.path().join("b.csv"), "beta").unwrap();
    create_dir(src.path().join("archive")).unwrap();
    let out = tempdir().unwrap();
    let index = generate_index(src.path(), out.path()).unwrap();

    let mut database = MockDatabase::new();
    database
        .expect_store_month()
        .times(1)
        .withf(|record: &MonthRecord| {
            let mut names: Vec<_> = record.spreadsheets.iter().map(|s| s.name.as_str()).collect();
            names.sort();
            names == ["a.csv", "b.csv"] && record.records.len() == 2
        })
        .returning(|_| Ok(()));

    let clients = Clients {
        storage: Arc::new(echo_storage(2)),
        parser: Arc::new(echo_parser(2)),
        database: Arc::new(database),
    };
    let request = ProcessRequest {
        index_url: index.locator(),
        period: period(),
    };

    let report = CrawlProcessor::new()
        .process(&request, &clients)
        .await
        .expect("Processing should succeed");

    assert_eq!(report.period, period());
    assert_eq!(report.records, 2);
    assert_eq!(report.spreadsheets.len(), 2, "Directory entries are skipped");
    for sheet in &report.spreadsheets {
        assert_eq!(sheet.storage.key, format!("2024/03/{}", sheet.name));
        assert_eq!(sheet.sha256.len(), 64);
        assert!(sheet.source.starts_with("file://"));
    }
    let alpha = report
        .spreadsheets
        .iter()
        .find(|s| s.name == "a.csv")
        .unwrap();
    assert_eq!(alpha.size, 5);
    assert_eq!(
        alpha.sha256,
        "8ed3f6ad685b959ead7022518e1af76cd816f8e8ec7ccdda1ed4018e8f2223f8"
    );
}

#[tokio::test]
async fn test_crawl_file_name_with_reserved_characters() {
    let src = tempdir().unwrap();
    fs::write(src.path().join("R&D #1?.csv"), "x").unwrap();
    let out = tempdir().unwrap();
    let index = generate_index(src.path(), out.path()).unwrap();

    let mut database = MockDatabase::new();
    database.expect_store_month().times(1).returning(|_| Ok(()));
    let clients = Clients {
        storage: Arc::new(echo_storage(1)),
        parser: Arc::new(echo_parser(1)),
        database: Arc::new(database),
    };
    let request = ProcessRequest {
        index_url: index.locator(),
        period: period(),
    };

    let report = CrawlProcessor::new().process(&request, &clients).await.unwrap();

    assert_eq!(report.spreadsheets[0].name, "R&D #1?.csv");
}

#[tokio::test]
async fn test_crawl_empty_index_fails_without_touching_collaborators() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    let index = generate_index(src.path(), out.path()).unwrap();

    let mut storage = MockStorage::new();
    storage.expect_upload().never();
    let mut database = MockDatabase::new();
    database.expect_store_month().never();
    let clients = Clients {
        storage: Arc::new(storage),
        parser: Arc::new(MockParserService::new()),
        database: Arc::new(database),
    };
    let request = ProcessRequest {
        index_url: index.locator(),
        period: period(),
    };

    let err = CrawlProcessor::new()
        .process(&request, &clients)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::EmptyIndex(_)), "got {err:?}");
}

#[tokio::test]
async fn test_crawl_parser_failure_stops_before_storing() {
    let src = tempdir().unwrap();
    fs::write(src.path().join("a.csv"), "a").unwrap();
    let out = tempdir().unwrap();
    let index = generate_index(src.path(), out.path()).unwrap();

    let mut parser = MockParserService::new();
    parser
        .expect_parse()
        .times(1)
        .returning(|_| Err("unsupported layout".into()));
    let mut database = MockDatabase::new();
    database.expect_store_month().never();
    let clients = Clients {
        storage: Arc::new(echo_storage(1)),
        parser: Arc::new(parser),
        database: Arc::new(database),
    };
    let request = ProcessRequest {
        index_url: index.locator(),
        period: period(),
    };

    let err = CrawlProcessor::new()
        .process(&request, &clients)
        .await
        .unwrap_err();

    match err {
        ProcessError::Parse { name, source } => {
            assert_eq!(name, "a.csv");
            assert_eq!(source.to_string(), "unsupported layout");
        }
        other => panic!("Expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_crawl_missing_index_is_a_fetch_error() {
    let root = tempdir().unwrap();
    let clients = Clients {
        storage: Arc::new(MockStorage::new()),
        parser: Arc::new(MockParserService::new()),
        database: Arc::new(MockDatabase::new()),
    };
    let request = ProcessRequest {
        index_url: format!("file://{}/gone.html", root.path().display()),
        period: period(),
    };

    let err = CrawlProcessor::new()
        .process(&request, &clients)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Fetch { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_crawl_remote_index_resolves_relative_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2024/03/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><table><tr>
                <td><a href="contracheque.xlsx">c</a></td>
                <td><a href="/shared/indenizacoes.xlsx">i</a></td>
            </tr></table></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2024/03/contracheque.xlsx"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"sheet-one".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shared/indenizacoes.xlsx"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"sheet-two".to_vec()))
        .mount(&server)
        .await;

    let mut parser = MockParserService::new();
    parser
        .expect_parse()
        .times(2)
        .withf(|req: &ParseRequest| req.period == Period::new(3, 2024).unwrap())
        .returning(|req| {
            let body = String::from_utf8(req.content).unwrap();
            Ok(vec![json!({ "file": req.file_name, "body": body })])
        });
    let mut database = MockDatabase::new();
    database
        .expect_store_month()
        .times(1)
        .withf(|record: &MonthRecord| {
            record.records
                == vec![
                    json!({ "file": "contracheque.xlsx", "body": "sheet-one" }),
                    json!({ "file": "indenizacoes.xlsx", "body": "sheet-two" }),
                ]
        })
        .returning(|_| Ok(()));
    let clients = Clients {
        storage: Arc::new(echo_storage(2)),
        parser: Arc::new(parser),
        database: Arc::new(database),
    };
    let request = ProcessRequest {
        index_url: format!("{}/2024/03/index.html", server.uri()),
        period: period(),
    };

    let report = CrawlProcessor::new().process(&request, &clients).await.unwrap();

    assert_eq!(report.spreadsheets.len(), 2);
    assert_eq!(
        report.spreadsheets[0].source,
        format!("{}/2024/03/contracheque.xlsx", server.uri())
    );
}

#[tokio::test]
async fn test_crawl_remote_http_error_is_a_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let clients = Clients {
        storage: Arc::new(MockStorage::new()),
        parser: Arc::new(MockParserService::new()),
        database: Arc::new(MockDatabase::new()),
    };
    let request = ProcessRequest {
        index_url: format!("{}/index.html", server.uri()),
        period: period(),
    };

    let err = CrawlProcessor::new()
        .process(&request, &clients)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Fetch { .. }));
}

#[tokio::test]
async fn test_crawl_remote_directory_listing_skips_navigation_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2024/03/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><pre>
                <a href="?C=N;O=D">Name</a>
                <a href="../">Parent Directory</a>
                <a href="old/">old/</a>
                <a href="a.xlsx">a.xlsx</a>
            </pre></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2024/03/a.xlsx"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"sheet".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let mut storage = MockStorage::new();
    storage
        .expect_upload()
        .times(1)
        .withf(|key: &str, _content: &Vec<u8>| key == "2024/03/a.xlsx")
        .returning(|key: &str, _content: Vec<u8>| {
            Ok(StoredObject {
                key: key.to_string(),
                url: format!("https://storage.local/{key}"),
            })
        });
    let mut database = MockDatabase::new();
    database
        .expect_store_month()
        .times(1)
        .withf(|record: &MonthRecord| record.spreadsheets.len() == 1)
        .returning(|_| Ok(()));
    let clients = Clients {
        storage: Arc::new(storage),
        parser: Arc::new(echo_parser(1)),
        database: Arc::new(database),
    };
    let request = ProcessRequest {
        index_url: format!("{}/2024/03/", server.uri()),
        period: period(),
    };

    let report = CrawlProcessor::new().process(&request, &clients).await.unwrap();

    assert_eq!(report.spreadsheets.len(), 1);
    assert_eq!(report.spreadsheets[0].name, "a.xlsx");
    assert_eq!(report.spreadsheets[0].storage.key, "2024/03/a.xlsx");
}
