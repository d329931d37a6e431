use async_trait::async_trait;
use bytes::Bytes;
use docker_service::{
    BodyPart, DataDecoder, DockerError, DownloadDestination, DownloadedFile, FileDecoder,
    HttpMethod, JsonDecoder, Progress, Request, RequestKind, ResponseResult, Service, ServiceCall,
    ReqwestTransport, ServiceManager, ServiceManagerConfig, Transport, TransportConfig,
    TransportContext, TransportError, TransportOutcome, WireRequest,
};
use http::HeaderMap;
use httpmock::Method::{GET, POST, PUT};
use httpmock::MockServer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Item {
    id: u64,
    title: String,
}

fn manager() -> ServiceManager {
    let mut default_headers = BTreeMap::new();
    default_headers.insert("X-Client".to_string(), "docker-tests".to_string());
    let config = ServiceManagerConfig {
        time_before_retry_ms: 10,
        transport: TransportConfig {
            connect_timeout_ms: 2_000,
            request_timeout_ms: 10_000,
            default_headers,
            ..TransportConfig::default()
        },
        ..ServiceManagerConfig::default()
    };
    ServiceManager::from_config(&config).unwrap()
}

#[tokio::test]
async fn get_with_path_and_query_parameters() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/items/42")
                .query_param("expand", "owner")
                .header("accept", "application/json")
                .header("x-client", "docker-tests");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"id": 42, "title": "Answer"}));
        })
        .await;

    let request = Request::json(Service::new(server.base_url(), "/items/:id"))
        .with_path_parameter("id", 42)
        .with_url_parameter("expand", "owner");
    let response = manager()
        .call(ServiceCall::new(request, JsonDecoder::<Item>::new()))
        .unwrap()
        .response()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status_code, 200);
    assert!(response
        .headers()
        .is_some_and(|headers| headers.contains_key("content-type")));
    assert_eq!(
        response.result.as_ref().and_then(ResponseResult::value),
        Some(&Item {
            id: 42,
            title: "Answer".to_string()
        })
    );
}

#[tokio::test]
async fn post_encodes_json_body_with_content_type() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/items")
                .header("content-type", "application/json; charset=UTF-8")
                .json_body(json!({"id": 7, "title": "New"}));
            then.status(201).json_body(json!({"id": 7, "title": "New"}));
        })
        .await;

    let request = Request::json(Service::new(server.base_url(), "/items"))
        .with_method(HttpMethod::Post)
        .with_encodable_body(Item {
            id: 7,
            title: "New".to_string(),
        });
    let response = manager()
        .call(ServiceCall::new(request, JsonDecoder::<Item>::new()))
        .unwrap()
        .response()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status_code, 201);
    assert!(response.is_success());
}

#[tokio::test]
async fn unacceptable_status_carries_response_and_error_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/items/404");
            then.status(404).json_body(json!({"message": "missing"}));
        })
        .await;

    let request = Request::json(Service::new(server.base_url(), "/items/:id"))
        .with_path_parameter("id", 404);
    let response = manager()
        .call(ServiceCall::new(request, JsonDecoder::<Item>::new()).with_automatic_retries(3))
        .unwrap()
        .response()
        .await
        .unwrap();

    // Responses that arrived are never retried.
    mock.assert_hits_async(1).await;
    assert_eq!(response.status_code, 404);
    match response.result.as_ref().unwrap() {
        ResponseResult::Failure(
            Some(body),
            DockerError::Underlying {
                cause: TransportError::UnacceptableStatusCode(404),
                response: Some(head),
                status_code: 404,
            },
        ) => {
            assert_eq!(body, &json!({"message": "missing"}));
            assert_eq!(head.status, 404);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn form_encoded_body_for_post_parameters() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/login")
                .header("content-type", "application/x-www-form-urlencoded; charset=utf-8")
                .body("password=s%3Dcret&user=ada");
            then.status(204);
        })
        .await;

    let request = Request::new(Service::new(server.base_url(), "/login"))
        .with_method(HttpMethod::Post)
        .with_url_parameter_encoding(docker_service::UrlEncoding::method_dependent())
        .with_url_parameter("user", "ada")
        .with_url_parameter("password", "s=cret");
    let response = manager()
        .call(ServiceCall::new(request, DataDecoder))
        .unwrap()
        .response()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status_code, 204);
}

#[tokio::test]
async fn download_writes_into_directory_and_reports_progress() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/files/report.txt");
            then.status(200).body("quarterly numbers");
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let progress = Arc::new(Mutex::new(Vec::<Progress>::new()));

    let request = Request::new(Service::new(server.base_url(), "/files/report.txt"))
        .with_kind(RequestKind::Download(DownloadDestination::directory(dir.path().join("out"))));
    let seen = progress.clone();
    let mut response = manager()
        .call(
            ServiceCall::new(request, FileDecoder)
                .with_progress(move |update| seen.lock().push(update)),
        )
        .unwrap()
        .response()
        .await
        .unwrap();

    let expected = dir.path().join("out").join("report.txt");
    assert_eq!(response.local_path.as_deref(), Some(expected.as_path()));
    assert!(matches!(
        response.result.as_ref().and_then(ResponseResult::value),
        Some(DownloadedFile::Path(path)) if path == &expected
    ));

    response.decode_text();
    assert!(matches!(
        response.result.as_ref().and_then(ResponseResult::value),
        Some(DownloadedFile::Text(text)) if text == "quarterly numbers"
    ));

    let progress = progress.lock();
    assert_eq!(progress.last().map(|p| p.completed), Some(17));
}

#[tokio::test]
async fn upload_file_sends_file_contents() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(PUT).path("/blobs/notes").body("local notes");
            then.status(200);
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "local notes").unwrap();

    let request = Request::new(Service::new(server.base_url(), "/blobs/notes"))
        .with_method(HttpMethod::Put)
        .with_kind(RequestKind::UploadFile(file));
    let response = manager()
        .call(ServiceCall::new(request, DataDecoder))
        .unwrap()
        .response()
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(response.is_success());
}

#[tokio::test]
async fn missing_upload_file_is_a_local_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let request = Request::new(Service::new("http://127.0.0.1:9", "/blobs"))
        .with_method(HttpMethod::Post)
        .with_kind(RequestKind::UploadFile(dir.path().join("absent.bin")));
    let response = manager()
        .call(ServiceCall::new(request, DataDecoder).with_automatic_retries(2))
        .unwrap()
        .response()
        .await
        .unwrap();

    assert!(matches!(
        response.result.as_ref().and_then(ResponseResult::error),
        Some(DockerError::Underlying {
            cause: TransportError::FileRead { .. },
            status_code: 0,
            ..
        })
    ));
}

#[tokio::test]
async fn multipart_upload_sends_every_part() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/uploads")
                .header_exists("content-type")
                .body_contains("name=\"avatar\"; filename=\"me.png\"")
                .body_contains("name=\"caption\"")
                .body_contains("hello there");
            then.status(201);
        })
        .await;

    let request = Request::new(Service::new(server.base_url(), "/uploads"))
        .with_method(HttpMethod::Post)
        .with_kind(RequestKind::UploadMultipart)
        .with_multipart_parts(vec![
            BodyPart::new("avatar", Bytes::from_static(b"\x89PNG"))
                .with_file_name("me.png")
                .with_mime_type("image/png"),
            BodyPart::new("caption", Bytes::from_static(b"hello there")),
        ]);
    let response = manager()
        .call(ServiceCall::new(request, DataDecoder))
        .unwrap()
        .response()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status_code, 201);
}

/// Delegates to the real transport and counts how many attempts were made
#[derive(Debug)]
struct CountingReqwest {
    inner: ReqwestTransport,
    attempts: AtomicUsize,
}

#[async_trait]
impl Transport for CountingReqwest {
    fn default_headers(&self) -> HeaderMap {
        self.inner.default_headers()
    }

    async fn send(&self, request: WireRequest, ctx: &TransportContext) -> TransportOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.send(request, ctx).await
    }

    async fn upload_file(
        &self,
        request: WireRequest,
        file: &Path,
        ctx: &TransportContext,
    ) -> TransportOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.upload_file(request, file, ctx).await
    }

    async fn upload_multipart(
        &self,
        request: WireRequest,
        parts: &[BodyPart],
        ctx: &TransportContext,
    ) -> TransportOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.upload_multipart(request, parts, ctx).await
    }

    async fn download(
        &self,
        request: WireRequest,
        destination: &DownloadDestination,
        ctx: &TransportContext,
    ) -> TransportOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.download(request, destination, ctx).await
    }
}

#[tokio::test]
async fn unreachable_host_is_retried_then_reported() {
    let transport = Arc::new(CountingReqwest {
        inner: ReqwestTransport::from_config(&TransportConfig {
            connect_timeout_ms: 2_000,
            ..TransportConfig::default()
        })
        .unwrap(),
        attempts: AtomicUsize::new(0),
    });
    let manager = ServiceManager::builder()
        .transport(transport.clone())
        .time_before_retry(Duration::from_millis(10))
        .build()
        .unwrap();

    // Nothing listens on the discard port locally.
    let request = Request::new(Service::new("http://127.0.0.1:9", "/ping"));
    let response = manager
        .call(ServiceCall::new(request, DataDecoder).with_automatic_retries(1))
        .unwrap()
        .response()
        .await
        .unwrap();

    assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(response.status_code, 0);
    assert!(response.head.is_none());
    let error = response.result.as_ref().and_then(ResponseResult::error).unwrap();
    assert!(matches!(
        error,
        DockerError::Underlying {
            response: None,
            status_code: 0,
            ..
        }
    ));
    assert!(!manager.has_pending_calls());
}
