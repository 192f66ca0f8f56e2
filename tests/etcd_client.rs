//! etcd v2 client against a mock HTTP server

use builder_boot::coordination::bootstrap::create_directories;
use builder_boot::coordination::{
    ConnectionRetry, DirCreator, EtcdClient, Getter, Setter, StoreError, Watcher,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> ConnectionRetry {
    ConnectionRetry {
        retries: 2,
        sleep: Duration::from_millis(5),
    }
}

async fn client(server: &MockServer) -> EtcdClient {
    EtcdClient::new(&server.uri(), fast_retry()).unwrap()
}

fn etcd_error(code: u64, message: &str, cause: &str) -> serde_json::Value {
    json!({ "errorCode": code, "message": message, "cause": cause, "index": 9 })
}

#[tokio::test]
async fn test_get_decodes_node() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/deis/builder/users"))
        .and(query_param("recursive", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "get",
            "node": {
                "key": "/deis/builder/users",
                "dir": true,
                "nodes": [
                    {"key": "/deis/builder/users/alice", "dir": true, "nodes": [
                        {"key": "/deis/builder/users/alice/aa:bb", "value": "ssh-rsa AAA", "modifiedIndex": 5, "createdIndex": 5}
                    ], "modifiedIndex": 4, "createdIndex": 4}
                ],
                "modifiedIndex": 3,
                "createdIndex": 3
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let node = client(&server).await.get("/deis/builder/users", true).await.unwrap();

    assert!(node.dir);
    assert_eq!(node.nodes[0].name(), "alice");
    assert_eq!(node.nodes[0].nodes[0].value.as_deref(), Some("ssh-rsa AAA"));
}

#[tokio::test]
async fn test_missing_key_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/deis/builder/sshHostKey"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(etcd_error(100, "Key not found", "/deis/builder/sshHostKey")),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .get("/deis/builder/sshHostKey", false)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_set_sends_value_and_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/keys/deis/builder/port"))
        .and(body_string_contains("value=8080"))
        .and(body_string_contains("ttl=20"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "action": "set",
            "node": {"key": "/deis/builder/port", "value": "8080", "ttl": 20, "modifiedIndex": 8, "createdIndex": 8}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let node = client(&server)
        .await
        .set("/deis/builder/port", "8080", Duration::from_secs(20))
        .await
        .unwrap();

    assert_eq!(node.value.as_deref(), Some("8080"));
    assert_eq!(node.ttl, Some(20));
}

#[tokio::test]
async fn test_server_errors_are_retried_then_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("raft is sad"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server).await.get("/", false).await.unwrap_err();

    match err {
        StoreError::Connection { attempts, message } => {
            assert_eq!(attempts, 3);
            assert!(message.contains("raft is sad"));
        }
        other => panic!("expected a connection error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_store_is_a_connection_error() {
    // Nothing listens on the discard port
    let client = EtcdClient::new("127.0.0.1:9", fast_retry()).unwrap();
    let err = client.get("/", false).await.unwrap_err();

    assert!(matches!(err, StoreError::Connection { attempts: 3, .. }));
}

#[tokio::test]
async fn test_create_dir_on_existing_path_is_already_exists() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/keys/deis/services"))
        .and(query_param("dir", "true"))
        .and(query_param("prevExist", "false"))
        .respond_with(
            ResponseTemplate::new(412).set_body_json(etcd_error(105, "Key already exists", "/deis/services")),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v2/keys/deis/domains"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(etcd_error(102, "Not a file", "/deis/domains")),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v2/keys/deis/cache"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "action": "create",
            "node": {"key": "/deis/cache", "dir": true, "modifiedIndex": 10, "createdIndex": 10}
        })))
        .mount(&server)
        .await;

    let client = client(&server).await;
    let err = client.create_dir("/deis/services", Duration::ZERO).await.unwrap_err();
    assert!(err.is_already_exists());

    let paths = vec![
        "/deis/services".to_string(),
        "/deis/domains".to_string(),
        "/deis/cache".to_string(),
    ];
    assert_eq!(create_directories(&client, &paths).await.unwrap(), 1);
}

#[tokio::test]
async fn test_other_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/keys/deis/builder"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(etcd_error(102, "Not a file", "/deis/builder")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/deis/teapot"))
        .respond_with(ResponseTemplate::new(418).set_body_string("short and stout"))
        .mount(&server)
        .await;

    let client = client(&server).await;

    let err = client.set("/deis/builder", "x", Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, StoreError::Api { code: 102, .. }));

    let err = client.get("/deis/teapot", false).await.unwrap_err();
    assert!(matches!(err, StoreError::UnexpectedStatus { status: 418, .. }));
}

#[tokio::test]
async fn test_watch_waits_recursively() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/deis/services"))
        .and(query_param("wait", "true"))
        .and(query_param("recursive", "true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(50))
                .set_body_json(json!({
                    "action": "set",
                    "node": {"key": "/deis/services/app/web.1", "value": "10.0.0.9:5000", "modifiedIndex": 12, "createdIndex": 12}
                })),
        )
        .mount(&server)
        .await;

    let event = client(&server).await.watch("/deis/services", true).await.unwrap();

    assert_eq!(event.action, "set");
    assert_eq!(event.node.key, "/deis/services/app/web.1");
}
