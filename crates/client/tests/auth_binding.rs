//! Credential audience binding at the node boundary.

use std::time::Duration;

use client::auth::TokenIssuer;
use client::testkit::MockCluster;
use serde_json::json;

#[tokio::test]
async fn token_for_node_a_is_rejected_by_node_b() {
    let cluster = MockCluster::spawn(2).await;
    let issuer = TokenIssuer::new(
        &cluster.config.caller_id,
        &cluster.config.signing_key,
        Duration::from_secs(3600),
    )
    .unwrap();

    // one token, audience-bound to node-0
    let tokens = issuer.issue(&cluster.config.nodes[..1]).unwrap();
    let token = &tokens[0];

    let body = json!({
        "schema": "schema-findings-v1",
        "data": [{ "_id": uuid::Uuid::new_v4().to_string() }],
    });
    let http = reqwest::Client::new();

    // accepted by the node it was minted for
    let accepted = http
        .post(cluster.nodes[0].url().join("/api/v1/data/create").unwrap())
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(accepted.status().is_success());

    // rejected by every other node
    let rejected = http
        .post(cluster.nodes[1].url().join("/api/v1/data/create").unwrap())
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_and_missing_tokens_are_rejected() {
    let cluster = MockCluster::spawn(2).await;
    let url = cluster.nodes[0].url().join("/api/v1/data/read").unwrap();
    let body = json!({ "schema": "any", "filter": {} });
    let http = reqwest::Client::new();

    let garbage = http
        .post(url.clone())
        .bearer_auth("not-a-token")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), reqwest::StatusCode::UNAUTHORIZED);

    let missing = http.post(url).json(&body).send().await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn foreign_signing_key_is_rejected() {
    let cluster = MockCluster::spawn(2).await;
    // same claims, wrong key: an issuer the nodes were never configured with
    let issuer = TokenIssuer::new(
        &cluster.config.caller_id,
        &common::crypto::SecretKey::generate(),
        Duration::from_secs(3600),
    )
    .unwrap();
    let tokens = issuer.issue(&cluster.config.nodes[..1]).unwrap();

    let response = reqwest::Client::new()
        .post(cluster.nodes[0].url().join("/api/v1/data/read").unwrap())
        .bearer_auth(&tokens[0])
        .json(&json!({ "schema": "any", "filter": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}
