//! Integration tests for the control plane and mocked traffic over a real listener.

use assert_json_diff::assert_json_include;
use reqwest::{Client, StatusCode};
use rift_mock::{Config, MockListener, MockServer};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::oneshot;

struct TestServer {
    base_url: String,
    client: Client,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        let server = Arc::new(MockServer::new(&Config::default()).expect("upstream client"));
        let listener = MockListener::bind("127.0.0.1:0".parse().unwrap(), server)
            .await
            .expect("bind mock listener");
        let addr = listener.local_addr().unwrap();
        let (shutdown, stopped) = oneshot::channel::<()>();
        tokio::spawn(listener.serve(async {
            stopped.await.ok();
        }));
        Self {
            base_url: format!("http://{addr}"),
            client: Client::new(),
            _shutdown: shutdown,
        }
    }

    async fn control(&self, operation: &str, body: impl Into<String>) -> reqwest::Response {
        self.client
            .put(format!("{}/mockserver/{operation}", self.base_url))
            .body(body.into())
            .send()
            .await
            .expect("control plane request")
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .expect("mocked request")
    }
}

#[tokio::test]
async fn test_times_limited_expectation() {
    let server = TestServer::start().await;
    let created = server
        .control(
            "expectation",
            json!({
                "httpRequest": {"path": "/p"},
                "httpResponse": {"statusCode": 200, "body": "limited"},
                "times": {"remainingTimes": 2, "unlimited": false}
            })
            .to_string(),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        statuses.push(server.get("/p").await.status().as_u16());
    }
    assert_eq!(statuses, [200, 200, 404]);

    let verified = server
        .control(
            "verify",
            json!({"httpRequest": {"path": "/p"}, "times": {"atLeast": 3, "atMost": 3}}).to_string(),
        )
        .await;
    assert_eq!(verified.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_upsert_then_retrieve_active() {
    let server = TestServer::start().await;
    let created: Value = server
        .control(
            "expectation",
            json!({
                "id": "fixed-id",
                "priority": 5,
                "httpRequest": {"method": "POST", "path": "/orders"},
                "httpResponse": {"statusCode": 201}
            })
            .to_string(),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_json_include!(
        actual: created,
        expected: json!([{"id": "fixed-id", "priority": 5, "httpRequest": {"method": "POST", "path": "/orders"}}])
    );

    let active: Value = server
        .client
        .put(format!("{}/mockserver/retrieve?type=active_expectations", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_json_include!(
        actual: active,
        expected: json!([{"id": "fixed-id", "httpResponse": {"statusCode": 201}}])
    );
}

#[tokio::test]
async fn test_invalid_expectation_reports_every_error() {
    let server = TestServer::start().await;
    let response = server
        .control(
            "expectation",
            r#"{"httpRequest": {"path": "/x"}, "httpResponse": {"statusCode": "200"}, "incorrectField": true}"#,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let text = response.text().await.unwrap();
    assert!(text.starts_with("incorrect expectation json format for:"));
    assert!(text.contains("2 errors:"));
    assert!(text.contains("$.httpResponse.statusCode: string found, integer expected"));
    assert!(text.contains("$.incorrectField: is not defined in the schema"));
}

#[tokio::test]
async fn test_response_headers_cookies_and_json_body() {
    let server = TestServer::start().await;
    server
        .control(
            "expectation",
            json!({
                "httpRequest": {"path": "/profile", "headers": {"Authorization": ["Bearer .*"]}},
                "httpResponse": {
                    "statusCode": 200,
                    "headers": {"X-Served-By": ["mock"]},
                    "cookies": {"session": "abc"},
                    "body": {"type": "JSON", "json": {"name": "ann"}}
                }
            })
            .to_string(),
        )
        .await;

    assert_eq!(server.get("/profile").await.status(), StatusCode::NOT_FOUND);

    let response = server
        .client
        .get(format!("{}/profile", server.base_url))
        .header("Authorization", "Bearer token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-served-by"], "mock");
    assert_eq!(response.headers()["set-cookie"], "session=abc");
    assert_eq!(response.headers()["content-type"], "application/json");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"name": "ann"}));
}

#[tokio::test]
async fn test_verify_identical_matchers_by_id() {
    let server = TestServer::start().await;
    let created: Value = server
        .control(
            "expectation",
            json!([
                {"httpRequest": {"path": "/same"}, "httpResponse": {"body": "first"}, "times": {"remainingTimes": 1}},
                {"httpRequest": {"path": "/same"}, "httpResponse": {"body": "second"}, "times": {"remainingTimes": 1}}
            ])
            .to_string(),
        )
        .await
        .json()
        .await
        .unwrap();
    let ids: Vec<&str> = created
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();

    assert_eq!(server.get("/same").await.text().await.unwrap(), "first");
    assert_eq!(server.get("/same").await.text().await.unwrap(), "second");

    for id in &ids {
        let verified = server
            .control(
                "verify",
                json!({"expectationId": {"id": id}, "times": {"atLeast": 1, "atMost": 1}}).to_string(),
            )
            .await;
        assert_eq!(verified.status(), StatusCode::ACCEPTED);
    }

    let in_order = server
        .control("verifySequence", json!({"expectationIds": [ids[0], ids[1]]}).to_string())
        .await;
    assert_eq!(in_order.status(), StatusCode::ACCEPTED);
    let reversed = server
        .control("verifySequence", json!({"expectationIds": [ids[1], ids[0]]}).to_string())
        .await;
    assert_eq!(reversed.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_at_least_failure_message_over_http() {
    let server = TestServer::start().await;
    server.get("/some_path").await;
    let response = server
        .control(
            "verify",
            json!({"httpRequest": {"path": "/some_path"}, "times": {"atLeast": 2}}).to_string(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    let message = response.text().await.unwrap();
    assert!(message.starts_with(
        "Request not found at least 2 times, expected:<{\n  \"path\" : \"/some_path\"\n}> but was:<{\n  \"method\" : \"GET\",\n  \"path\" : \"/some_path\","
    ));
}

#[tokio::test]
async fn test_clear_by_matcher_and_reset() {
    let server = TestServer::start().await;
    for path in ["/keep", "/drop"] {
        server
            .control(
                "expectation",
                json!({"httpRequest": {"path": path}, "httpResponse": {}}).to_string(),
            )
            .await;
        server.get(path).await;
    }

    let cleared = server.control("clear", json!({"path": "/drop"}).to_string()).await;
    assert_eq!(cleared.status(), StatusCode::OK);
    // idempotent
    let again = server.control("clear", json!({"path": "/drop"}).to_string()).await;
    assert_eq!(again.status(), StatusCode::OK);

    assert_eq!(server.get("/drop").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.get("/keep").await.status(), StatusCode::OK);

    let requests: Value = server.control("retrieve", "").await.json().await.unwrap();
    let paths: Vec<&str> = requests
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, ["/keep", "/drop", "/keep"]);

    assert_eq!(server.control("reset", "").await.status(), StatusCode::OK);
    let requests: Value = server.control("retrieve", "").await.json().await.unwrap();
    assert_eq!(requests, json!([]));
    assert_eq!(server.get("/keep").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_template_response() {
    let server = TestServer::start().await;
    server
        .control(
            "expectation",
            json!({
                "httpRequest": {"path": "/greet/.*"},
                "httpResponseTemplate": {
                    "templateType": "MUSTACHE",
                    "template": "{\"statusCode\": 200, \"body\": \"hello from {{ request.path }}\"}"
                }
            })
            .to_string(),
        )
        .await;
    let response = server.get("/greet/ann").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "hello from /greet/ann");
}

#[tokio::test]
async fn test_status_reports_bound_port() {
    let server = TestServer::start().await;
    let status: Value = server.control("status", "").await.json().await.unwrap();
    let port = server.base_url.rsplit(':').next().unwrap().parse::<u64>().unwrap();
    assert_eq!(status, json!({"ports": [port]}));
}

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

#[tokio::test]
async fn test_openapi_expectation_from_file() {
    let server = TestServer::start().await;
    let created = server
        .control(
            "openapi",
            json!({
                "specUrlOrPayload": fixture("petstore.yaml"),
                "operationsAndResponses": {"listPets": "200"}
            })
            .to_string(),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: Value = created.json().await.unwrap();
    assert_json_include!(
        actual: created,
        expected: json!([{"httpRequest": {"operationId": "listPets"}}])
    );

    let pets = server.get("/v1/pets?limit=10").await;
    assert_eq!(pets.status(), StatusCode::OK);
    let body: Value = pets.json().await.unwrap();
    assert_eq!(body, json!([{"id": 1, "name": "fido"}]));

    assert_eq!(server.get("/v1/pets?limit=ten").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.get("/v1/pets/7").await.status(), StatusCode::NOT_FOUND);

    let unknown = server
        .control(
            "openapi",
            json!({
                "specUrlOrPayload": fixture("petstore.yaml"),
                "operationsAndResponses": {"deletePets": "200"}
            })
            .to_string(),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_initialization_json_fixture() {
    let server = MockServer::new(&Config::default()).unwrap();
    let json = std::fs::read_to_string(fixture("initialization.json")).unwrap();
    let loaded = server.upsert_json(&json).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].id, "health");

    let health = server.handle(rift_mock::HttpRequest::new("GET", "/health")).await;
    assert_eq!(serde_json::from_str::<Value>(&health.body_text()).unwrap(), json!({"status": "UP"}));
    let gone = server.handle(rift_mock::HttpRequest::new("GET", "/legacy/page")).await;
    assert_eq!(gone.status(), 410);
    assert_eq!(gone.reason_phrase.as_deref(), Some("Gone"));
}
