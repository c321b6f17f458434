//! Discovery and acquisition against stub HTTP services.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apigate_core::{
    build_http_client, ApiDescriptor, DiscoveryClient, GateError, SpecAcquirer, VersionId,
};
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Router;
use tokio::task::JoinHandle;

#[derive(Clone)]
struct StubState {
    routes: Arc<BTreeMap<String, (StatusCode, String)>>,
    requests: Arc<Mutex<Vec<String>>>,
}

struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    join: JoinHandle<()>,
}

impl StubServer {
    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.join.abort();
    }
}

async fn handle(State(state): State<StubState>, uri: Uri) -> (StatusCode, String) {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(path.clone());
    match state.routes.get(&path) {
        Some((status, body)) => (*status, body.clone()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

async fn spawn_stub(routes: &[(&str, StatusCode, &str)]) -> StubServer {
    let routes: BTreeMap<String, (StatusCode, String)> = routes
        .iter()
        .map(|(path, status, body)| (path.to_string(), (*status, body.to_string())))
        .collect();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = StubState {
        routes: Arc::new(routes),
        requests: Arc::clone(&requests),
    };
    let app = Router::new().fallback(handle).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let join = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    StubServer {
        base_url,
        requests,
        join,
    }
}

fn http() -> reqwest::Client {
    build_http_client(Duration::from_secs(5)).unwrap()
}

const DISCOVERY: &str = r#"{"apis":[
    {"path":"/rest","kind":"openapi","visibility":"public"},
    {"path":"/hidden","kind":"openapi","visibility":"private"},
    {"path":"/gql","kind":"graphql","visibility":"public"}
]}"#;

#[tokio::test]
async fn list_apis_keeps_public_openapi_only() {
    let stub = spawn_stub(&[("/api-discovery", StatusCode::OK, DISCOVERY)]).await;
    let client = DiscoveryClient::new(http(), stub.base_url.clone());

    let apis = client.list_apis().await.unwrap();
    assert_eq!(apis, vec![ApiDescriptor::public_openapi("/rest")]);
}

#[tokio::test]
async fn list_apis_non_200_is_discovery_error() {
    for status in [
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::NOT_FOUND,
        StatusCode::NO_CONTENT,
    ] {
        let stub = spawn_stub(&[("/api-discovery", status, "")]).await;
        let client = DiscoveryClient::new(http(), stub.base_url.clone());
        let err = client.list_apis().await.unwrap_err();
        assert!(matches!(err, GateError::Discovery(_)));
        assert!(err.to_string().contains("failed to obtain APIs"));
    }
}

#[tokio::test]
async fn list_apis_transport_error_propagates() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = DiscoveryClient::new(http(), format!("http://{addr}"));
    let err = client.list_apis().await.unwrap_err();
    let GateError::Transport(inner) = &err else {
        panic!("expected transport error, got {err:?}");
    };
    assert_eq!(err.to_string(), inner.to_string());
    assert!(inner.is_connect());
}

#[tokio::test]
async fn list_versions_filters_and_sorts() {
    let stub = spawn_stub(&[(
        "/rest/openapi",
        StatusCode::OK,
        r#"["2022-01-01","2021-06-04~beta","2021-06-04~wip","v3","2021-02-30"]"#,
    )])
    .await;
    let client = DiscoveryClient::new(http(), stub.base_url.clone());

    let versions = client
        .list_versions(&ApiDescriptor::public_openapi("/rest"))
        .await
        .unwrap();
    let kept: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
    assert_eq!(kept, vec!["2021-02-30", "2021-06-04~beta", "2022-01-01"]);
}

#[tokio::test]
async fn list_versions_keeps_grammar_valid_non_calendar_dates() {
    let stub = spawn_stub(&[(
        "/rest/openapi",
        StatusCode::OK,
        r#"["2021-02-30","2021-13-01","2021-06-04"]"#,
    )])
    .await;
    let client = DiscoveryClient::new(http(), stub.base_url.clone());

    let versions = client
        .list_versions(&ApiDescriptor::public_openapi("/rest"))
        .await
        .unwrap();
    let kept: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
    assert_eq!(kept, vec!["2021-02-30", "2021-06-04", "2021-13-01"]);
}

#[tokio::test]
async fn list_versions_non_200_is_discovery_error() {
    let stub = spawn_stub(&[("/rest/openapi", StatusCode::BAD_GATEWAY, "")]).await;
    let client = DiscoveryClient::new(http(), stub.base_url.clone());

    let err = client
        .list_versions(&ApiDescriptor::public_openapi("/rest"))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Discovery(_)));
    assert!(err.to_string().contains("failed to obtain OpenAPI versions"));
}

#[tokio::test]
async fn acquire_without_baseline_fetches_candidate_only() {
    let candidate = spawn_stub(&[(
        "/rest/openapi/2021-06-04",
        StatusCode::OK,
        r#"{"openapi":"3.0.3"}"#,
    )])
    .await;
    let acquirer = SpecAcquirer::new(http(), candidate.base_url.clone(), None);
    let version = VersionId::parse("2021-06-04").unwrap();

    let specs = acquirer
        .acquire(&ApiDescriptor::public_openapi("/rest"), &version)
        .await
        .unwrap();
    assert!(specs.baseline_path.is_none());
    assert_eq!(
        std::fs::read_to_string(&specs.candidate_path).unwrap(),
        r#"{"openapi":"3.0.3"}"#
    );
    assert_eq!(candidate.requests(), vec!["/rest/openapi/2021-06-04"]);

    let workspace = specs.workspace.path().to_path_buf();
    assert!(workspace.is_dir());
    drop(specs);
    assert!(!workspace.exists());
}

#[tokio::test]
async fn acquire_with_baseline_fetches_both() {
    let candidate = spawn_stub(&[(
        "/rest/openapi/2021-06-04~beta",
        StatusCode::OK,
        "proposed",
    )])
    .await;
    let baseline = spawn_stub(&[(
        "/rest/openapi/2021-06-04~beta",
        StatusCode::OK,
        "current",
    )])
    .await;
    let acquirer = SpecAcquirer::new(
        http(),
        candidate.base_url.clone(),
        Some(baseline.base_url.clone()),
    );
    let version = VersionId::parse("2021-06-04~beta").unwrap();

    let specs = acquirer
        .acquire(&ApiDescriptor::public_openapi("/rest"), &version)
        .await
        .unwrap();
    let baseline_path = specs.baseline_path.clone().unwrap();
    assert_eq!(std::fs::read_to_string(baseline_path).unwrap(), "current");
    assert_eq!(
        std::fs::read_to_string(&specs.candidate_path).unwrap(),
        "proposed"
    );
    assert_eq!(baseline.requests().len(), 1);
}

#[tokio::test]
async fn acquire_non_200_names_status() {
    let candidate = spawn_stub(&[(
        "/rest/openapi/2021-06-04",
        StatusCode::OK,
        "proposed",
    )])
    .await;
    let baseline = spawn_stub(&[]).await;
    let acquirer = SpecAcquirer::new(
        http(),
        candidate.base_url.clone(),
        Some(baseline.base_url.clone()),
    );
    let version = VersionId::parse("2021-06-04").unwrap();

    let err = acquirer
        .acquire(&ApiDescriptor::public_openapi("/rest"), &version)
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Acquisition(_)));
    assert!(err.to_string().contains("404"), "unexpected error: {err}");
}
