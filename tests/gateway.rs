//! End-to-end tests through a real listener.

use std::time::Duration;

use request_gateway::config::{
    GatewayConfig, MiddlewareKind, PredicateDefinition, RouteDefinition, UpstreamConfig,
};
use request_gateway::load_balancer::{Server, Strategy};
use serde_json::json;

mod common;

fn route(id: &str, uri: &str, pattern: &str, order: i32) -> RouteDefinition {
    RouteDefinition {
        id: id.into(),
        uri: uri.into(),
        predicates: vec![PredicateDefinition {
            name: "Path".into(),
            args: json!({ "pattern": pattern }),
        }],
        filters: Vec::new(),
        order,
        metadata: Default::default(),
    }
}

fn upstream(service: &str, strategy: Strategy, servers: Vec<Server>) -> UpstreamConfig {
    UpstreamConfig {
        service: service.into(),
        strategy,
        servers,
    }
}

async fn get(url: &str) -> (u16, String) {
    let res = common::client().get(url).send().await.expect("Gateway unreachable");
    let status = res.status().as_u16();
    (status, res.text().await.unwrap())
}

#[tokio::test]
async fn test_no_route_is_404() {
    let mut config = GatewayConfig::default();
    config.routes.push(route("only", "127.0.0.1:1", "/only", 0));
    let gw = common::start_gateway(config).await;

    let (status, body) = get(&gw.url("/elsewhere")).await;
    assert_eq!(status, 404);
    assert_eq!(body, "No matching route found");
}

#[tokio::test]
async fn test_direct_forwarding_keeps_path_and_query() {
    let backend = common::start_echo_backend("direct").await;
    let mut config = GatewayConfig::default();
    config.middlewares = vec![MiddlewareKind::Metrics, MiddlewareKind::AccessLog];
    config.routes.push(route("direct", &backend.to_string(), "/**", 999));
    let gw = common::start_gateway(config).await;

    let res = common::client()
        .post(gw.url("/hello/world?x=1"))
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "direct /hello/world?x=1");
}

#[tokio::test]
async fn test_load_balanced_round_robin() {
    let a = common::start_echo_backend("a").await;
    let b = common::start_echo_backend("b").await;
    let mut config = GatewayConfig::default();
    config.routes.push(route("svc", "lb://svc", "/svc/**", 0));
    config.upstreams.push(upstream(
        "svc",
        Strategy::RoundRobin,
        vec![
            Server::new(format!("http://{a}"), 1),
            Server::new(format!("http://{b}"), 1),
        ],
    ));
    let gw = common::start_gateway(config).await;

    let mut seen = Vec::new();
    for _ in 0..4 {
        let (status, body) = get(&gw.url("/svc/x")).await;
        assert_eq!(status, 200);
        seen.push(body);
    }
    assert_eq!(seen, vec!["a /svc/x", "b /svc/x", "a /svc/x", "b /svc/x"]);
}

#[tokio::test]
async fn test_weighted_distribution() {
    let heavy = common::start_echo_backend("heavy").await;
    let light = common::start_echo_backend("light").await;
    let mut config = GatewayConfig::default();
    config.routes.push(route("w", "lb://w", "/**", 0));
    config.upstreams.push(upstream(
        "w",
        Strategy::WeightedRoundRobin,
        vec![
            Server::new(heavy.to_string(), 3),
            Server::new(light.to_string(), 1),
        ],
    ));
    let gw = common::start_gateway(config).await;

    let mut heavy_hits = 0;
    for _ in 0..8 {
        let (_, body) = get(&gw.url("/")).await;
        if body.starts_with("heavy") {
            heavy_hits += 1;
        }
    }
    assert_eq!(heavy_hits, 6);
}

#[tokio::test]
async fn test_empty_upstream_is_503() {
    let mut config = GatewayConfig::default();
    config.routes.push(route("svc", "lb://svc", "/**", 0));
    config.upstreams.push(upstream("svc", Strategy::Random, Vec::new()));
    let gw = common::start_gateway(config).await;

    let (status, _) = get(&gw.url("/anything")).await;
    assert_eq!(status, 503);
}

#[tokio::test]
async fn test_unreachable_backend_is_502() {
    let dead = common::closed_port().await;
    let mut config = GatewayConfig::default();
    config.routes.push(route("dead", &format!("http://{dead}"), "/**", 0));
    let gw = common::start_gateway(config).await;

    let (status, body) = get(&gw.url("/")).await;
    assert_eq!(status, 502);
    assert_eq!(body, "Upstream request failed");
}

#[tokio::test]
async fn test_priority_order_selects_route() {
    let api = common::start_echo_backend("api").await;
    let fallback = common::start_echo_backend("fallback").await;
    let mut config = GatewayConfig::default();
    config.routes.push(route("fallback", &fallback.to_string(), "/**", 999));
    config.routes.push(route("api", &api.to_string(), "/api/*", 1));
    let gw = common::start_gateway(config).await;

    assert_eq!(get(&gw.url("/api/v1/users")).await.1, "api /api/v1/users");
    assert_eq!(get(&gw.url("/home")).await.1, "fallback /home");
}

#[tokio::test]
async fn test_reload_becomes_visible() {
    let old = common::start_echo_backend("old").await;
    let new = common::start_echo_backend("new").await;

    let mut config = GatewayConfig::default();
    config.routes.push(route("r", &old.to_string(), "/**", 0));
    let gw = common::start_gateway(config.clone()).await;
    assert_eq!(get(&gw.url("/x")).await.1, "old /x");

    config.routes = vec![route("r", "lb://fresh", "/**", 0)];
    config.upstreams = vec![upstream(
        "fresh",
        Strategy::RoundRobin,
        vec![Server::new(new.to_string(), 1)],
    )];
    gw.config_updates.send(config).unwrap();

    let mut body = String::new();
    for _ in 0..50 {
        body = get(&gw.url("/x")).await.1;
        if body == "new /x" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(body, "new /x");
}
