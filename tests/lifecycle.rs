//! Server lifecycle tests.

use faultline::config::{ConfigError, ValidationError};
use faultline::lifecycle::{Server, ServerError, ServerState};
use futures_util::future::Shared;

mod common;

#[tokio::test]
async fn test_start_stop_walks_every_state() {
    let server = Server::new(common::fast_config()).unwrap();
    assert_eq!(server.state(), ServerState::Created);

    let start = server.start().unwrap();
    assert_eq!(server.state(), ServerState::Starting);
    let addr = start.await.unwrap();
    assert_eq!(server.state(), ServerState::Listening);
    assert_ne!(addr.port(), 0);

    let stop = server.stop().unwrap();
    assert_eq!(server.state(), ServerState::Stopping);
    stop.await.unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn test_repeated_calls_share_pending_result() {
    let server = Server::new(common::fast_config()).unwrap();

    let first = server.start().unwrap();
    let second = server.start().unwrap();
    assert!(Shared::ptr_eq(&first, &second));
    let addr = first.await.unwrap();

    // Still the same result once listening.
    let third = server.start().unwrap();
    assert!(Shared::ptr_eq(&second, &third));
    assert_eq!(third.await.unwrap(), addr);

    let stop = server.stop().unwrap();
    assert!(Shared::ptr_eq(&stop, &server.stop().unwrap()));
    stop.clone().await.unwrap();
    assert!(Shared::ptr_eq(&stop, &server.stop().unwrap()));
}

#[tokio::test]
async fn test_invalid_transitions_fail_synchronously() {
    let server = Server::new(common::fast_config()).unwrap();
    assert!(matches!(server.stop(), Err(ServerError::NotStoppable(ServerState::Created))));

    let start = server.start().unwrap();
    assert!(matches!(server.stop(), Err(ServerError::NotStoppable(ServerState::Starting))));
    start.await.unwrap();

    let stop = server.stop().unwrap();
    assert!(matches!(server.start(), Err(ServerError::NotStartable(ServerState::Stopping))));
    stop.await.unwrap();
}

#[tokio::test]
async fn test_address_in_use_reverts_state() {
    let first = common::start_server(common::fast_config()).await;

    let mut config = common::fast_config();
    config.listener.port = i64::from(first.addr.port());
    let second = Server::new(config).unwrap();

    let err = second.start().unwrap().await.unwrap_err();
    match &err {
        ServerError::Bind(e) => assert_eq!(e.io_kind(), Some(std::io::ErrorKind::AddrInUse)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(second.state(), ServerState::Created);
    assert_eq!(second.local_addr(), None);

    // A failed start is not cached.
    first.server.stop().unwrap().await.unwrap();
    let addr = second.start().unwrap().await.unwrap();
    assert_eq!(addr.port(), first.addr.port());
    second.stop().unwrap().await.unwrap();
}

#[tokio::test]
async fn test_restart_after_stop() {
    let server = common::start_server(common::fast_config()).await;
    server.server.stop().unwrap().await.unwrap();
    assert_eq!(server.server.local_addr(), None);

    let addr = server.server.start().unwrap().await.unwrap();
    assert_eq!(server.server.state(), ServerState::Listening);

    let response = common::client()
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    server.server.stop().unwrap().await.unwrap();
}

#[tokio::test]
async fn test_stop_drains_idle_keep_alive_connections() {
    let server = common::start_server(common::fast_config()).await;
    let client = reqwest::Client::new();
    let response = client.get(server.url("/")).send().await.unwrap();
    response.text().await.unwrap();
    assert_eq!(server.server.active_connections(), 1);

    server.server.stop().unwrap().await.unwrap();
    assert_eq!(server.server.active_connections(), 0);
}

#[test]
fn test_invalid_options_are_reported_together() {
    let mut config = common::fast_config();
    config.listener.host = "bad host".into();
    config.listener.port = 65_536;

    match Server::new(config) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.contains(&ValidationError::InvalidHost("bad host".into())));
            assert!(errors.contains(&ValidationError::InvalidPort(65_536)));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("invalid config accepted"),
    }
}

#[test]
fn test_hostnames_and_fqdns_are_accepted() {
    for host in ["localhost", "127.0.0.1", "example.com", "example.com."] {
        let mut config = common::fast_config();
        config.listener.host = host.into();
        assert!(Server::new(config).is_ok(), "{host}");
    }
}
