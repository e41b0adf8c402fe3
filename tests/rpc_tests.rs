//! Integration tests for the RPC fabric: broker routing, server dispatch,
//! client correlation and timeouts.

use relay::rpc::{handler, CallbackTable, RpcBroker, RpcClient, RpcServer};
use relay::types::{AgentError, Kwargs};
use relay::utils::config::RpcConfig;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

fn local_config() -> RpcConfig {
    // Reserve an ephemeral port and hand it to the broker.
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    RpcConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout_seconds: 5,
    }
}

fn echo_callbacks() -> CallbackTable {
    let mut table = CallbackTable::new();
    table.register(
        "echo",
        handler(|args, _kwargs| async move { Ok(args.into_iter().next().unwrap_or(Value::Null)) }),
    );
    table.register(
        "slow_echo",
        handler(|args, _kwargs| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        }),
    );
    table.register(
        "fail",
        handler(|_args, _kwargs| async move {
            Err::<Value, _>(AgentError::InvalidInput("handler failed on purpose".into()))
        }),
    );
    table
}

struct Fabric {
    broker: RpcBroker,
    server: RpcServer,
    config: RpcConfig,
}

async fn fabric() -> Fabric {
    let config = local_config();
    let mut broker = RpcBroker::new(config.clone());
    broker.start().await.unwrap();

    let mut server = RpcServer::new("service", config.clone(), echo_callbacks());
    server.start().await.unwrap();

    Fabric {
        broker,
        server,
        config,
    }
}

impl Fabric {
    async fn teardown(mut self) {
        self.server.stop().await.unwrap();
        self.broker.stop().await.unwrap();
    }
}

#[tokio::test]
async fn calls_round_trip_through_the_broker() {
    let fabric = fabric().await;
    let client = RpcClient::connect("client", &fabric.config).await.unwrap();

    let value = client
        .call(
            "service",
            "echo",
            vec![json!("ping")],
            Kwargs::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(value, json!("ping"));

    fabric.teardown().await;
}

#[tokio::test]
async fn handler_failures_surface_as_remote_errors() {
    let fabric = fabric().await;
    let client = RpcClient::connect("client", &fabric.config).await.unwrap();

    let err = client
        .call(
            "service",
            "fail",
            vec![],
            Kwargs::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
    match err {
        AgentError::Remote(trace) => assert!(trace.contains("handler failed on purpose")),
        other => panic!("expected remote error, got {other}"),
    }

    // Unknown functions are answered too, not silently dropped.
    let err = client
        .call(
            "service",
            "no_such_function",
            vec![],
            Kwargs::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Remote(_)));

    fabric.teardown().await;
}

#[tokio::test]
async fn timeouts_respect_the_deadline_and_keep_the_client_usable() {
    let fabric = fabric().await;
    let client = RpcClient::connect("client", &fabric.config).await.unwrap();

    // Nobody is listening under this identity; the envelope is dropped.
    let started = Instant::now();
    let err = client
        .call(
            "absent",
            "echo",
            vec![json!(1)],
            Kwargs::new(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, AgentError::Timeout(_)));
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1200), "took {elapsed:?}");

    // The same client still completes later calls.
    let value = client
        .call(
            "service",
            "echo",
            vec![json!("still alive")],
            Kwargs::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(value, json!("still alive"));

    fabric.teardown().await;
}

#[tokio::test]
async fn replies_never_cross_between_clients() {
    let fabric = fabric().await;
    let a = RpcClient::connect("client-a", &fabric.config).await.unwrap();
    let b = RpcClient::connect("client-b", &fabric.config).await.unwrap();

    // Both clients hammer the same server concurrently; every reply must
    // come back to the identity that asked.
    let mut calls = Vec::new();
    for round in 0..10 {
        calls.push((
            "a",
            a.call_async(
                "service",
                "slow_echo",
                vec![json!(format!("a-{round}"))],
                Kwargs::new(),
                Duration::from_secs(5),
            ),
        ));
        calls.push((
            "b",
            b.call_async(
                "service",
                "echo",
                vec![json!(format!("b-{round}"))],
                Kwargs::new(),
                Duration::from_secs(5),
            ),
        ));
    }

    for (owner, call) in calls {
        let value = call.join().await.unwrap();
        assert!(
            value.as_str().unwrap().starts_with(owner),
            "reply {value} routed to client {owner}"
        );
    }

    fabric.teardown().await;
}

#[tokio::test]
async fn one_client_can_pipeline_overlapping_calls() {
    let fabric = fabric().await;
    let client = RpcClient::connect("client", &fabric.config).await.unwrap();

    let slow = client.call_async(
        "service",
        "slow_echo",
        vec![json!("slow")],
        Kwargs::new(),
        Duration::from_secs(5),
    );
    let fast = client.call_async(
        "service",
        "echo",
        vec![json!("fast")],
        Kwargs::new(),
        Duration::from_secs(5),
    );

    // Correlation ids match each reply to its call even when completion
    // order differs from send order.
    assert_eq!(fast.join().await.unwrap(), json!("fast"));
    assert_eq!(slow.join().await.unwrap(), json!("slow"));

    fabric.teardown().await;
}

#[tokio::test]
async fn stopping_the_fabric_is_clean_and_repeatable() {
    let config = local_config();
    let mut broker = RpcBroker::new(config.clone());
    broker.start().await.unwrap();

    let mut server = RpcServer::new("service", config.clone(), echo_callbacks());
    server.start().await.unwrap();

    server.stop().await.unwrap();
    server.stop().await.unwrap();
    broker.stop().await.unwrap();
    broker.stop().await.unwrap();
}
