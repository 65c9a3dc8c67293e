// Disconnect and reconnect within the grace period

use serde_json::json;

use crate::support::{code_of, create_private, join, start_server, test_config, viewer_id};

#[actix_web::test]
async fn reconnect_resumes_the_same_seat() {
    let server = start_server(test_config()).await;
    let (mut alice, created) = create_private(&server, "alice").await;
    let code = code_of(&created);
    let (bob, joined) = join(&server, &code, "bob").await;
    let bob_id = viewer_id(&joined);

    bob.close().await;
    let notice = alice.recv_event("message:system").await;
    // The join notice comes first; wait for the disconnect.
    let notice = if notice["type"] == "player-joined" {
        alice.recv_event("message:system").await
    } else {
        notice
    };
    assert_eq!(notice["type"], "player-disconnected");
    assert_eq!(notice["username"], "bob");

    let mut bob_again = server.client().await;
    bob_again
        .send(
            "reconnect",
            json!({"gameCode": code.to_lowercase(), "playerId": bob_id}),
        )
        .await;
    let resumed = bob_again.recv_event("game").await;
    assert_eq!(viewer_id(&resumed), bob_id);
    let players = resumed["game"]["players"].as_array().unwrap();
    assert!(players.iter().all(|p| p["connectionStatus"] == "connected"));

    let notice = alice.recv_event("message:system").await;
    assert_eq!(notice["type"], "player-reconnected");

    server.stop().await;
}

#[actix_web::test]
async fn reconnect_to_a_missing_game_fails() {
    let server = start_server(test_config()).await;
    let mut client = server.client().await;

    client
        .send(
            "reconnect",
            json!({"gameCode": "ABCDEFGH", "playerId": "7d1f3a52-3f6e-4d0a-9c61-0d4b8e3e6f10"}),
        )
        .await;
    let err = client.recv_event("error:reconnect").await;
    assert_eq!(err["code"], "CANNOT_RECONNECT");

    server.stop().await;
}
