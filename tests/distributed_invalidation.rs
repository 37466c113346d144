//! Invalidation broadcast between distributed cache peers.

use axum::http::StatusCode;

use facet_server::cache::{CacheKey, InvalidationMessage};
use facet_server::config::BackendConfig;
use facet_server::demo;
use facet_server::platform::Registry;
use facet_server::rest::pipeline::CACHED_HEADER;

mod common;

fn distributed_config(peers: Vec<String>) -> facet_server::ServerConfig {
    let mut config = common::test_config();
    config.cache.backend = BackendConfig::Distributed {
        local: Box::new(BackendConfig::Map {
            prune_frequency_secs: 60,
        }),
    };
    config.peers.peers = peers;
    config.peers.shared_secret = Some("cluster".to_string());
    config
}

#[tokio::test]
async fn test_write_on_one_node_invalidates_peer() {
    let peer = common::start_server(
        distributed_config(Vec::new()),
        demo::site(&Registry::new()).unwrap(),
    )
    .await;
    let origin = common::start_server(
        distributed_config(vec![peer.base_url()]),
        demo::site(&Registry::new()).unwrap(),
    )
    .await;
    let client = common::client();

    // Warm the peer's cache
    client.get(peer.url("/person/alice")).send().await.unwrap();
    let hit = client.get(peer.url("/person/alice")).send().await.unwrap();
    assert!(hit.headers().contains_key(CACHED_HEADER));

    let post = client
        .post(origin.url("/person/alice/chores"))
        .body("ironing")
        .send()
        .await
        .unwrap();
    assert_eq!(post.status(), StatusCode::CREATED);

    let mut invalidated = false;
    for _ in 0..40 {
        let response = client.get(peer.url("/person/alice")).send().await.unwrap();
        if !response.headers().contains_key(CACHED_HEADER) {
            invalidated = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(invalidated, "peer kept serving the stale entry");
}

#[tokio::test]
async fn test_broadcast_reaches_every_peer_with_secret() {
    let (first_addr, first) = common::start_mock_peer("/_cache/invalidate").await;
    let (second_addr, second) = common::start_mock_peer("/_cache/invalidate").await;
    let origin = common::start_server(
        distributed_config(vec![
            format!("http://{}", first_addr),
            format!("http://{}", second_addr),
        ]),
        demo::site(&Registry::new()).unwrap(),
    )
    .await;

    common::client()
        .delete(origin.url("/person/bob/chores"))
        .send()
        .await
        .unwrap();

    let expected = InvalidationMessage::InvalidateGroup {
        group: "person:bob".to_string(),
    };
    for received in [&first, &second] {
        assert!(common::eventually(|| !received.lock().unwrap().is_empty()).await);
        let messages = received.lock().unwrap();
        assert_eq!(messages[0], (Some("Bearer cluster".to_string()), expected.clone()));
    }
}

#[tokio::test]
async fn test_remote_invalidation_is_not_rebroadcast() {
    let (mock_addr, received) = common::start_mock_peer("/_cache/invalidate").await;
    let node = common::start_server(
        distributed_config(vec![format!("http://{}", mock_addr)]),
        demo::site(&Registry::new()).unwrap(),
    )
    .await;

    let response = common::client()
        .post(node.url("/_cache/invalidate"))
        .bearer_auth("cluster")
        .json(&InvalidationMessage::Delete {
            key: CacheKey::from("/person/alice|application/json|utf-8|"),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(received.lock().unwrap().is_empty());
}
