// Errors go to the sender only, on the channel matching the event

use std::time::Duration;

use serde_json::json;

use crate::support::{code_of, create_private, join, start_server, test_config, with_ws_limit};

#[actix_web::test]
async fn join_errors_use_the_join_channel() {
    let server = start_server(test_config()).await;
    let mut client = server.client().await;

    client
        .send(
            "join",
            json!({"gameCode": "ZZZZZZZZ", "player": {"username": "eve", "avatar": "fox"}}),
        )
        .await;
    let err = client.recv_event("error:join").await;
    assert_eq!(err["code"], "GAME_NOT_FOUND");

    server.stop().await;
}

#[actix_web::test]
async fn rejected_actions_are_private_to_the_sender() {
    let server = start_server(test_config()).await;
    let (mut admin, created) = create_private(&server, "alice").await;
    let (mut guest, _) = join(&server, &code_of(&created), "bob").await;
    let _ = admin.recv_event("message:system").await;

    guest.send("start", json!(null)).await;
    let err = guest.recv_event("error").await;
    assert_eq!(err["code"], "NOT_ALLOWED");
    assert!(admin.is_quiet(Duration::from_millis(200)).await);

    server.stop().await;
}

#[actix_web::test]
async fn malformed_frames_are_dropped() {
    let server = start_server(test_config()).await;
    let mut client = server.client().await;

    client.send_raw("{not json").await;
    client.send("no-such-event", json!({})).await;
    assert!(client.is_quiet(Duration::from_millis(200)).await);

    // The connection is still usable.
    client.send("create-private", crate::support::profile("alice")).await;
    let snapshot = client.recv_event("game").await;
    assert_eq!(snapshot["game"]["status"], "lobby");

    server.stop().await;
}

#[actix_web::test]
async fn message_budget_is_enforced_per_connection() {
    let server = start_server(with_ws_limit(3, Duration::from_secs(60))).await;
    let mut client = server.client().await;

    for _ in 0..5 {
        client.send("get", json!(null)).await;
    }
    let mut codes = Vec::new();
    for _ in 0..5 {
        let frame = client.recv().await;
        assert_eq!(frame["event"], "error");
        codes.push(frame["data"]["code"].as_str().unwrap().to_string());
    }
    codes.sort();
    assert_eq!(
        codes,
        ["NOT_ALLOWED", "NOT_ALLOWED", "NOT_ALLOWED", "TOO_MANY_REQUESTS", "TOO_MANY_REQUESTS"]
    );

    // Another connection has its own budget.
    let mut other = server.client().await;
    other.send("get", json!(null)).await;
    let frame = other.recv().await;
    assert_eq!(frame["data"]["code"], "NOT_ALLOWED");

    server.stop().await;
}
