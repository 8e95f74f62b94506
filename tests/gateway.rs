//! Routing, declarative filters and failure mapping through a running gateway.

use std::time::Duration;

use axum::http::StatusCode;
use rewrite_gateway::config::parse_config;
use rewrite_gateway::HttpServer;

mod common;

async fn echo_backend() -> std::net::SocketAddr {
    common::start_programmable_backend(|target| async move {
        common::MockResponse::ok("text/plain", target)
    })
    .await
}

#[tokio::test]
async fn test_declarative_filters_from_config() {
    let backend = echo_backend().await;
    let config = parse_config(&format!(
        r#"
        [[routes]]
        name = "api"
        path_prefix = "/api"
        uri = "http://{backend}"

        [[routes.filters]]
        type = "strip_prefix"
        parts = 1

        [[routes.filters]]
        type = "add_response_header"
        name = "x-gateway"
        value = "rewrite"

        [[routes.filters]]
        type = "set_status"
        status = 201
        "#
    ))
    .unwrap();

    let addr = common::start_gateway(HttpServer::new(config).unwrap()).await;
    let res = common::client()
        .get(format!("http://{addr}/api/items/7?expand=true"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["x-gateway"], "rewrite");
    assert_eq!(res.text().await.unwrap(), "/items/7?expand=true");
}

#[tokio::test]
async fn test_routes_checked_by_priority() {
    let backend = echo_backend().await;
    let config = parse_config(&format!(
        r#"
        [[routes]]
        name = "fallback"
        path_prefix = "/"
        uri = "http://{backend}"

        [[routes]]
        name = "special"
        path_prefix = "/special"
        uri = "http://{backend}"
        priority = 10

        [[routes.filters]]
        type = "set_path"
        path = "/rewritten"
        "#
    ))
    .unwrap();

    let addr = common::start_gateway(HttpServer::new(config).unwrap()).await;
    let client = common::client();

    let special = client.get(format!("http://{addr}/special/x")).send().await.unwrap();
    assert_eq!(special.text().await.unwrap(), "/rewritten");

    let other = client.get(format!("http://{addr}/other")).send().await.unwrap();
    assert_eq!(other.text().await.unwrap(), "/other");
}

#[tokio::test]
async fn test_unmatched_request_returns_404() {
    let config = parse_config(
        r#"
        [[routes]]
        name = "only"
        host = "api.example.com"
        uri = "http://127.0.0.1:9"
        "#,
    )
    .unwrap();

    let addr = common::start_gateway(HttpServer::new(config).unwrap()).await;
    let res = common::client().get(format!("http://{addr}/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_unreachable_backend_returns_503() {
    let backend = common::unused_addr();
    let config = parse_config(&format!(
        r#"
        [[routes]]
        name = "down"
        uri = "http://{backend}"
        "#
    ))
    .unwrap();

    let addr = common::start_gateway(HttpServer::new(config).unwrap()).await;
    let res = common::client().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_request_id_is_forwarded_and_echoed() {
    let backend = common::start_programmable_backend(|_| async {
        common::MockResponse::ok("text/plain", "ok")
    })
    .await;
    let config = parse_config(&format!(
        r#"
        [[routes]]
        name = "r"
        uri = "http://{backend}"
        "#
    ))
    .unwrap();

    let addr = common::start_gateway(HttpServer::new(config).unwrap()).await;
    let res = common::client()
        .get(format!("http://{addr}/"))
        .header("x-request-id", "client-supplied")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "client-supplied");
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let backend = echo_backend().await;
    let config = parse_config(&format!(
        r#"
        [[routes]]
        name = "r"
        uri = "http://{backend}"
        "#
    ))
    .unwrap();

    let server = HttpServer::new(config).unwrap();
    let shutdown = server.shutdown();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server.run(listener));

    let res = common::client().get(format!("http://{addr}/up")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop");
    assert!(result.unwrap().is_ok());
}
