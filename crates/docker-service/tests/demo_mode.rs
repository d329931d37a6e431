mod common;

use common::ScriptedTransport;
use docker_service::{
    DataDecoder, DemoConfig, DirectoryFixtures, DockerError, InMemoryFixtures, JsonDecoder,
    Request, ResponseResult, Service, ServiceCall, ServiceManager, TransportError,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize, PartialEq)]
struct Profile {
    name: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct DemoError {
    reason: String,
}

fn fixtures() -> Arc<InMemoryFixtures> {
    Arc::new(
        InMemoryFixtures::new()
            .with_file("profile.json", &br#"{"name": "Demo User"}"#[..])
            .with_file("profile_error.json", &br#"{"reason": "maintenance"}"#[..]),
    )
}

fn demo() -> DemoConfig {
    DemoConfig::default()
        .enabled()
        .with_success_file("profile.json")
        .with_failure_file("profile_error.json")
        .with_fixtures(fixtures())
}

fn manager(transport: Arc<ScriptedTransport>, seed: u64) -> ServiceManager {
    ServiceManager::builder()
        .transport(transport)
        .rng(StdRng::seed_from_u64(seed))
        .build()
        .unwrap()
}

fn profile_request(demo: DemoConfig) -> Request {
    Request::json(Service::new("https://api.test", "/profiles/:id"))
        .with_path_parameter("id", 1)
        .with_demo(demo)
}

#[tokio::test]
async fn demo_success_is_served_from_fixtures() {
    let transport = Arc::new(ScriptedTransport::new());
    let manager = manager(transport.clone(), 1);

    let response = manager
        .call(ServiceCall::new(
            profile_request(demo()),
            JsonDecoder::<Profile, DemoError>::new(),
        ))
        .unwrap()
        .response()
        .await
        .unwrap();

    assert!(response.sent_in_demo_mode);
    assert_eq!(response.status_code, 200);
    assert_eq!(
        response.request_url.as_ref().map(|url| url.as_str()),
        Some("https://api.test/profiles/1")
    );
    assert_eq!(
        response.result.as_ref().and_then(ResponseResult::value),
        Some(&Profile {
            name: "Demo User".to_string()
        })
    );
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn demo_failure_uses_failure_fixture_and_status() {
    let manager = manager(Arc::new(ScriptedTransport::new()), 2);
    let demo = demo().with_failure_chance(1.0).with_status_codes(200, 503);

    let response = manager
        .call(ServiceCall::new(
            profile_request(demo),
            JsonDecoder::<Profile, DemoError>::new(),
        ))
        .unwrap()
        .response()
        .await
        .unwrap();

    assert_eq!(response.status_code, 503);
    let result = response.result.as_ref().unwrap();
    assert_eq!(
        result.error_value(),
        Some(&DemoError {
            reason: "maintenance".to_string()
        })
    );
    assert!(matches!(
        result.error(),
        Some(DockerError::Underlying {
            cause: TransportError::UnacceptableStatusCode(503),
            status_code: 503,
            ..
        })
    ));
}

#[tokio::test]
async fn zero_failure_chance_never_fails() {
    let manager = manager(Arc::new(ScriptedTransport::new()), 42);
    for _ in 0..200 {
        let response = manager
            .call(ServiceCall::new(profile_request(demo()), DataDecoder))
            .unwrap()
            .response()
            .await
            .unwrap();
        assert!(response.is_success());
    }
    assert!(!manager.has_pending_calls());
}

#[tokio::test(start_paused = true)]
async fn demo_call_stays_registered_during_its_delay() {
    let manager = manager(Arc::new(ScriptedTransport::new()), 3);
    let demo = demo().with_waiting_time(Duration::from_secs(2)..=Duration::from_secs(2));

    let started = tokio::time::Instant::now();
    let handle = manager
        .call(ServiceCall::new(profile_request(demo), DataDecoder))
        .unwrap();

    let pending = manager.pending_calls();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].sent_in_demo_mode);
    assert_eq!(pending[0].id, handle.id());

    let response = handle.response().await.unwrap();
    assert!(response.sent_in_demo_mode);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(!manager.has_pending_calls());
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_demo_call_during_its_delay() {
    let manager = manager(Arc::new(ScriptedTransport::new()), 4);
    let demo = demo().with_waiting_time(Duration::from_secs(60)..=Duration::from_secs(60));

    let handle = manager
        .call(ServiceCall::new(profile_request(demo), DataDecoder))
        .unwrap();
    handle.cancel();

    let response = handle.response().await.unwrap();
    assert_eq!(response.status_code, 0);
    assert!(matches!(
        response.result.as_ref().and_then(ResponseResult::error),
        Some(DockerError::Underlying {
            cause: TransportError::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn global_demo_mode_applies_to_every_request() {
    let transport = Arc::new(ScriptedTransport::new());
    let manager = ServiceManager::builder()
        .transport(transport.clone())
        .demo_mode(true)
        .rng(StdRng::seed_from_u64(5))
        .build()
        .unwrap();

    // Not enabled on the request itself.
    let demo = DemoConfig::default()
        .with_success_file("profile.json")
        .with_fixtures(fixtures());
    let response = manager
        .call(ServiceCall::new(profile_request(demo), DataDecoder))
        .unwrap()
        .response()
        .await
        .unwrap();

    assert!(response.sent_in_demo_mode);
    assert_eq!(transport.attempts(), 0);

    manager.set_demo_mode(false);
    assert!(!manager.is_demo_mode());
}

#[tokio::test]
async fn missing_demo_fixture_is_reported_before_dispatch() {
    let manager = manager(Arc::new(ScriptedTransport::new()), 6);
    let demo = demo().with_success_file("absent.json");

    let err = manager
        .call(ServiceCall::new(profile_request(demo), DataDecoder))
        .unwrap_err();

    match err {
        DockerError::DemoFileNotFound { name, service } => {
            assert_eq!(name, "absent.json");
            assert_eq!(service.path, "/profiles/:id");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!manager.has_pending_calls());
}

#[tokio::test]
async fn fixtures_can_be_read_from_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("profile.json"), br#"{"name": "From Disk"}"#).unwrap();
    let manager = manager(Arc::new(ScriptedTransport::new()), 7);

    let demo = DemoConfig::default()
        .enabled()
        .with_success_file("profile.json")
        .with_fixtures(Arc::new(DirectoryFixtures::new(dir.path())));
    let response = manager
        .call(ServiceCall::new(
            profile_request(demo),
            JsonDecoder::<Profile>::new(),
        ))
        .unwrap()
        .response()
        .await
        .unwrap();

    assert_eq!(
        response.result.as_ref().and_then(ResponseResult::value),
        Some(&Profile {
            name: "From Disk".to_string()
        })
    );
}
