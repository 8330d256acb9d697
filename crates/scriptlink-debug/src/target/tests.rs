//! Tests for target launching

use super::connection::{connect_with_retry, resolve_host, spawn_runtime};
use super::*;
use crate::Error;
use scriptlink_config::{ConnectionConfig, LOCALHOST_IPV4};
use std::net::Ipv4Addr;

#[test]
fn test_launch_config_builder() {
    let launch = LaunchConfig::new("node")
        .arg("--debug-brk={port}")
        .args(["main.js", "--verbose"])
        .cwd("/srv/app")
        .env("NODE_ENV", "test");

    assert_eq!(launch.command, "node");
    assert_eq!(launch.args.len(), 3);
    assert_eq!(launch.cwd.as_deref(), Some(std::path::Path::new("/srv/app")));
    assert_eq!(launch.env, vec![("NODE_ENV".to_string(), "test".to_string())]);
    assert_eq!(launch.port, None);
}

#[test]
fn test_launch_config_port_substitution() {
    let launch = LaunchConfig::new("node").arg("--debug={port}").arg("main.js");
    assert_eq!(launch.substitute_port(5860), vec!["--debug=5860", "main.js"]);
    assert_eq!(launch.command_line(5860), "node --debug=5860 main.js");
}

#[test]
fn test_launch_config_without_placeholder() {
    let launch = LaunchConfig::new("runtime").arg("script.js").port(7000);
    assert_eq!(launch.substitute_port(7000), vec!["script.js"]);
    assert_eq!(launch.port, Some(7000));
}

#[test]
fn test_resolve_host() {
    assert_eq!(resolve_host("localhost"), LOCALHOST_IPV4);
    assert_eq!(resolve_host("10.0.0.2"), Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(resolve_host("not a host"), LOCALHOST_IPV4);
}

#[tokio::test]
async fn test_find_free_port_skips_listening_ports() {
    let listener = tokio::net::TcpListener::bind((LOCALHOST_IPV4, 0)).await.unwrap();
    let busy = listener.local_addr().unwrap().port();

    // The range holds only the busy port
    let result = find_free_port(LOCALHOST_IPV4, busy, busy).await;
    assert!(matches!(result, Err(Error::Launch(_))));
}

#[tokio::test]
async fn test_find_free_port_returns_refused_port() {
    let listener = std::net::TcpListener::bind((LOCALHOST_IPV4, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    assert_eq!(find_free_port(LOCALHOST_IPV4, port, port).await.unwrap(), port);
}

#[tokio::test]
async fn test_spawn_invalid_command_is_launch_error() {
    let launch = LaunchConfig::new("scriptlink-no-such-runtime-binary");
    let err = spawn_runtime(&launch, 5858).unwrap_err();
    assert!(matches!(err, Error::Launch(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_start_invalid_command_creates_no_target() {
    let session = Session::default();
    let mut events = session.subscribe().await;
    let launch = LaunchConfig::new("scriptlink-no-such-runtime-binary").port(5999);

    let result = Target::start(&launch, &ConnectionConfig::default(), &session).await;
    assert!(matches!(result, Err(Error::Launch(_))));
    assert!(events.try_recv().is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_connect_gives_up_when_runtime_exits() {
    let listener = std::net::TcpListener::bind((LOCALHOST_IPV4, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut child = spawn_runtime(&LaunchConfig::new("true"), port).unwrap();
    let config = ConnectionConfig {
        connect_attempts: 50,
        retry_interval_ms: 20,
        ..ConnectionConfig::default()
    };

    let err = connect_with_retry(LOCALHOST_IPV4, port, &config, &mut child)
        .await
        .unwrap_err();
    match err {
        Error::Launch(message) => assert!(message.contains("exited"), "{}", message),
        other => panic!("Expected launch error, got {:?}", other),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_connect_attempts_are_bounded() {
    let listener = std::net::TcpListener::bind((LOCALHOST_IPV4, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut child = spawn_runtime(&LaunchConfig::new("sleep").arg("5"), port).unwrap();
    let config = ConnectionConfig {
        connect_attempts: 3,
        retry_interval_ms: 10,
        max_retry_interval_ms: 20,
        retry_jitter_ms: 0,
        ..ConnectionConfig::default()
    };

    let err = connect_with_retry(LOCALHOST_IPV4, port, &config, &mut child)
        .await
        .unwrap_err();
    match err {
        Error::Launch(message) => assert!(message.contains("3 attempts"), "{}", message),
        other => panic!("Expected launch error, got {:?}", other),
    }
    let _ = child.start_kill();
}
