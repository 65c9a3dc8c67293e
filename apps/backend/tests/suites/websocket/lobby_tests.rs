// Lobby flow: create, join, start, chat

use std::time::Duration;

use serde_json::json;

use crate::support::{code_of, create_private, join, start_server, test_config, viewer_id};

#[actix_web::test]
async fn create_join_and_start() {
    let server = start_server(test_config()).await;

    let (mut admin, created) = create_private(&server, "alice").await;
    let code = code_of(&created);
    assert_eq!(code.len(), 8);
    assert_eq!(created["game"]["status"], "lobby");
    assert_eq!(created["game"]["adminId"], viewer_id(&created).as_str());

    let (mut guest, joined) = join(&server, &code, "bob").await;
    let version = joined["version"].as_u64().unwrap();
    assert_eq!(joined["game"]["players"].as_array().unwrap().len(), 2);

    // The admin sees the join as a diff at the same version, then a notice.
    let update = admin.recv_event("game:update").await;
    assert_eq!(update["version"].as_u64().unwrap(), version);
    let system = admin.recv_event("message:system").await;
    assert_eq!(system["type"], "player-joined");
    assert_eq!(system["username"], "bob");

    admin.send("start", json!(null)).await;
    let admin_update = admin.recv_event("game:update").await;
    let guest_update = guest.recv_event("game:update").await;
    assert_eq!(admin_update["version"].as_u64().unwrap(), version + 1);
    assert_eq!(guest_update["version"].as_u64().unwrap(), version + 1);
    assert_eq!(admin_update["operation"], guest_update["operation"]);
    // Only the originator's echo carries a viewer block.
    assert!(admin_update.get("viewer").is_some());
    assert!(guest_update.get("viewer").is_none());

    guest.send("get", json!(null)).await;
    let resync = guest.recv_event("game").await;
    assert_eq!(resync["game"]["status"], "playing");
    assert_eq!(resync["version"].as_u64().unwrap(), version + 1);

    server.stop().await;
}

#[actix_web::test]
async fn find_fills_an_open_public_game() {
    let server = start_server(test_config()).await;

    let mut first = server.client().await;
    first.send("find", crate::support::profile("alice")).await;
    let opened = first.recv_event("game").await;
    assert_eq!(opened["game"]["settings"]["private"], false);

    let mut second = server.client().await;
    second.send("find", crate::support::profile("bob")).await;
    let found = second.recv_event("game").await;
    assert_eq!(code_of(&found), code_of(&opened));

    assert_eq!(found["game"]["players"].as_array().unwrap().len(), 2);

    server.stop().await;
}

#[actix_web::test]
async fn chat_reaches_the_whole_room() {
    let server = start_server(test_config()).await;
    let (mut alice, created) = create_private(&server, "alice").await;
    let (mut bob, _) = join(&server, &code_of(&created), "bob").await;

    bob.send("message", json!({"username": "bob", "text": "  hi all  "}))
        .await;

    let seen_by_alice = alice.recv_event("message").await;
    let seen_by_bob = bob.recv_event("message").await;
    assert_eq!(seen_by_alice["text"], "hi all");
    assert_eq!(seen_by_alice["username"], "bob");
    assert_eq!(seen_by_alice["id"], seen_by_bob["id"]);

    bob.send("message", json!({"username": "bob", "text": "   "})).await;
    assert!(alice.is_quiet(Duration::from_millis(200)).await);

    server.stop().await;
}
