use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use super::*;
use crate::domain::code::GameCode;
use crate::domain::player::ConnectionStatus;
use crate::domain::state::{GameStatus, PileSource, TurnPhase};
use crate::domain::test_helpers::{profile, TOP_LEFT, TOP_SECOND};
use crate::errors::ErrorCode;
use crate::store::MemoryGameStore;
use crate::ws::protocol::{ChatMessage, JoinRequest, PickRequest, PositionRequest};

struct Harness {
    router: SessionRouter,
    outbox: Arc<RecordingOutbox>,
    store: Arc<MemoryGameStore>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    fn with_config(config: RouterConfig) -> Self {
        let store = Arc::new(MemoryGameStore::new());
        let outbox = Arc::new(RecordingOutbox::new());
        let router = SessionRouter::new(
            store.clone(),
            Arc::new(SessionRegistry::new()),
            outbox.clone(),
            config,
        );
        Self {
            router,
            outbox,
            store,
        }
    }

    async fn create(&self, name: &str) -> (ConnId, GameCode) {
        let conn = Uuid::new_v4();
        self.router
            .handle(conn, ClientMsg::CreatePrivate(profile(name)))
            .await;
        let code = self.router.sessions().binding(conn).unwrap().code;
        (conn, code)
    }

    async fn join(&self, code: &GameCode, name: &str) -> ConnId {
        let conn = Uuid::new_v4();
        self.router
            .handle(
                conn,
                ClientMsg::Join(JoinRequest {
                    game_code: code.to_string(),
                    player: profile(name),
                }),
            )
            .await;
        conn
    }

    /// Room of `n` players; connections in join order.
    async fn room(&self, n: usize) -> (GameCode, Vec<ConnId>) {
        let (admin, code) = self.create("p0").await;
        let mut conns = vec![admin];
        for i in 1..n {
            conns.push(self.join(&code, &format!("p{i}")).await);
        }
        self.outbox.take();
        (code, conns)
    }

    async fn game(&self, code: &GameCode) -> Game {
        self.store.load(code).await.unwrap().unwrap()
    }

    fn player_of(&self, conn: ConnId) -> PlayerId {
        self.router.sessions().binding(conn).unwrap().player_id
    }
}

fn sent_to(deliveries: &[Delivery], conn: ConnId) -> Vec<&ServerMsg> {
    deliveries
        .iter()
        .filter(|d| d.target == Target::Connection(conn))
        .map(|d| &d.msg)
        .collect()
}

fn broadcast(deliveries: &[Delivery]) -> Vec<(Option<ConnId>, &ServerMsg)> {
    deliveries
        .iter()
        .filter_map(|d| match &d.target {
            Target::Room { except, .. } => Some((*except, &d.msg)),
            Target::Connection(_) => None,
        })
        .collect()
}

fn error_code(msg: &ServerMsg) -> Option<ErrorCode> {
    match msg {
        ServerMsg::Error(payload)
        | ServerMsg::JoinError(payload)
        | ServerMsg::ReconnectError(payload) => Some(payload.code),
        _ => None,
    }
}

#[tokio::test]
async fn join_hands_snapshot_to_joiner_and_diff_to_room() {
    let h = Harness::new();
    let (admin, code) = h.create("alice").await;
    let created = h.outbox.take();
    assert!(matches!(
        sent_to(&created, admin)[..],
        [ServerMsg::Game(GameSnapshot { version: 0, .. })]
    ));
    assert_eq!(h.outbox.members(&code), vec![admin]);

    let guest = h.join(&code, "bob").await;
    let deliveries = h.outbox.take();

    let ServerMsg::Game(snapshot) = sent_to(&deliveries, guest)[0] else {
        panic!("joiner should get a full snapshot");
    };
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.game.players.len(), 2);
    assert_eq!(
        snapshot.viewer.as_ref().map(|v| v.player_id),
        Some(h.player_of(guest))
    );

    let room = broadcast(&deliveries);
    let (except, ServerMsg::GameUpdate(update)) = room[0] else {
        panic!("room should get a game update first");
    };
    assert_eq!(except, Some(guest));
    assert_eq!(update.version, 1);
    assert_eq!(update.operation.add_players.as_ref().map(Vec::len), Some(1));
    assert!(room.iter().any(|(_, msg)| matches!(
        msg,
        ServerMsg::SystemMessage(SystemMessage { event: SystemEvent::PlayerJoined, username, .. })
            if username == "bob"
    )));
}

#[tokio::test]
async fn join_errors_use_join_channel() {
    let h = Harness::new();
    let conn = h.join(&GameCode::from("NOPE0000"), "bob").await;
    let deliveries = h.outbox.take();
    let replies = sent_to(&deliveries, conn);
    assert!(matches!(replies[..], [ServerMsg::JoinError(_)]));
    assert_eq!(error_code(replies[0]), Some(ErrorCode::GameNotFound));
    assert!(h.router.sessions().binding(conn).is_none());
}

#[tokio::test]
async fn join_of_started_game_is_rejected() {
    let h = Harness::new();
    let (code, conns) = h.room(2).await;
    h.router.handle(conns[0], ClientMsg::Start).await;
    h.outbox.take();

    let late = h.join(&code, "late").await;
    let deliveries = h.outbox.take();
    assert_eq!(
        error_code(sent_to(&deliveries, late)[0]),
        Some(ErrorCode::GameAlreadyStarted)
    );
    assert!(broadcast(&deliveries).is_empty());
}

#[tokio::test]
async fn find_prefers_an_open_public_lobby() {
    let h = Harness::new();
    let host = Uuid::new_v4();
    h.router
        .handle(host, ClientMsg::Find(profile("host")))
        .await;
    let code = h.router.sessions().binding(host).unwrap().code;
    let game = h.game(&code).await;
    assert!(!game.settings.private);

    let guest = Uuid::new_v4();
    h.router
        .handle(guest, ClientMsg::Find(profile("guest")))
        .await;
    assert_eq!(h.router.sessions().binding(guest).unwrap().code, code);

    // Private games are never matched.
    let (_, private_code) = h.create("loner").await;
    let third = Uuid::new_v4();
    h.router
        .handle(third, ClientMsg::Find(profile("third")))
        .await;
    assert_ne!(h.router.sessions().binding(third).unwrap().code, private_code);
}

#[tokio::test]
async fn pick_from_draw_pile_diffs_only_the_phase() {
    let h = Harness::new();
    let (code, conns) = h.room(2).await;
    h.router.handle(conns[0], ClientMsg::Start).await;
    for conn in &conns {
        for position in [TOP_LEFT, TOP_SECOND] {
            h.router
                .handle(
                    *conn,
                    ClientMsg::RevealCard(PositionRequest {
                        position,
                        version: None,
                    }),
                )
                .await;
        }
    }
    h.outbox.take();

    let game = h.game(&code).await;
    assert_eq!(game.phase, TurnPhase::AwaitingPickOrReveal);
    let current = game.current_player().unwrap().id;
    let mover = h.router.sessions().connection_of(&current).unwrap();

    h.router
        .handle(
            mover,
            ClientMsg::PickCard(PickRequest {
                source: PileSource::DrawPile,
                version: Some(game.version),
            }),
        )
        .await;
    let deliveries = h.outbox.take();

    let room = broadcast(&deliveries);
    assert_eq!(room.len(), 1);
    let (except, ServerMsg::GameUpdate(update)) = room[0] else {
        panic!("expected a game update");
    };
    assert_eq!(except, Some(mover));
    assert_eq!(update.version, game.version + 1);
    assert!(update.viewer.is_none());
    assert_eq!(
        serde_json::to_value(&update.operation).unwrap(),
        json!({"game": {"currentPhase": "awaiting-replace-or-discard"}})
    );

    let ServerMsg::GameUpdate(echo) = sent_to(&deliveries, mover)[0] else {
        panic!("mover should get its own echo");
    };
    assert_eq!(echo.version, update.version);
    let held = echo
        .viewer
        .as_ref()
        .and_then(|viewer| viewer.selected_card.as_ref())
        .expect("drawn card is delivered privately");
    assert_eq!(held.source, PileSource::DrawPile);
    assert!(held.card.value.is_some());
}

#[tokio::test]
async fn illegal_action_reaches_only_the_sender() {
    let h = Harness::new();
    let (code, conns) = h.room(2).await;
    h.router.handle(conns[1], ClientMsg::Start).await;
    let deliveries = h.outbox.take();

    assert_eq!(
        error_code(sent_to(&deliveries, conns[1])[0]),
        Some(ErrorCode::NotAllowed)
    );
    assert!(broadcast(&deliveries).is_empty());
    let game = h.game(&code).await;
    assert_eq!(game.status, GameStatus::Lobby);
    assert_eq!(game.version, 1);
}

#[tokio::test]
async fn unbound_connection_cannot_act() {
    let h = Harness::new();
    let stranger = Uuid::new_v4();
    h.router.handle(stranger, ClientMsg::Start).await;
    let deliveries = h.outbox.take();
    assert_eq!(
        error_code(sent_to(&deliveries, stranger)[0]),
        Some(ErrorCode::NotAllowed)
    );
}

#[tokio::test]
async fn get_resends_snapshot_only_when_stale() {
    let h = Harness::new();
    let (code, conns) = h.room(2).await;
    let version = h.game(&code).await.version;

    h.router.handle(conns[0], ClientMsg::Get(Some(version))).await;
    assert!(h.outbox.take().is_empty());

    h.router.handle(conns[0], ClientMsg::Get(Some(0))).await;
    h.router.handle(conns[0], ClientMsg::Get(None)).await;
    let deliveries = h.outbox.take();
    let replies = sent_to(&deliveries, conns[0]);
    assert_eq!(replies.len(), 2);
    for reply in replies {
        let ServerMsg::Game(snapshot) = reply else {
            panic!("expected a snapshot");
        };
        assert_eq!(snapshot.version, version);
        assert_eq!(snapshot.game, GameView::from(&h.game(&code).await));
    }
}

#[tokio::test]
async fn reconnect_within_grace_resumes_the_seat() {
    let h = Harness::new();
    let (code, conns) = h.room(2).await;
    h.router.handle(conns[0], ClientMsg::Start).await;
    let player = h.player_of(conns[1]);
    let before = h.game(&code).await;

    h.router.connection_closed(conns[1]).await;
    let during = h.game(&code).await;
    assert_eq!(
        during.player(&player).unwrap().connection_status,
        ConnectionStatus::Disconnected
    );
    assert_eq!(during.version, before.version + 1);
    assert!(h.router.sessions().binding(conns[1]).is_none());
    h.outbox.take();

    let fresh = Uuid::new_v4();
    h.router
        .handle(
            fresh,
            ClientMsg::Reconnect {
                game_code: code.to_string(),
                player_id: player,
            },
        )
        .await;
    let deliveries = h.outbox.take();

    let after = h.game(&code).await;
    assert_eq!(after.version, before.version + 2);
    let resumed = after.player(&player).unwrap();
    let original = before.player(&player).unwrap();
    assert!(resumed.is_connected());
    assert_eq!(resumed.cards, original.cards);
    assert_eq!(resumed.score, original.score);
    assert_eq!(after.current_player_index, before.current_player_index);

    let ServerMsg::Game(snapshot) = sent_to(&deliveries, fresh)[0] else {
        panic!("reconnecting player gets a full snapshot");
    };
    assert_eq!(snapshot.version, after.version);
    assert_eq!(h.player_of(fresh), player);
    assert!(h.outbox.members(&code).contains(&fresh));
}

#[tokio::test]
async fn reconnect_takes_over_a_live_connection() {
    let h = Harness::new();
    let (code, conns) = h.room(2).await;
    let player = h.player_of(conns[1]);

    let second_tab = Uuid::new_v4();
    h.router
        .handle(
            second_tab,
            ClientMsg::Reconnect {
                game_code: code.to_string(),
                player_id: player,
            },
        )
        .await;

    assert!(h.router.sessions().binding(conns[1]).is_none());
    assert_eq!(h.router.sessions().connection_of(&player), Some(second_tab));
    assert!(!h.outbox.members(&code).contains(&conns[1]));

    // Closing the stale tab must not disconnect the player.
    h.router.connection_closed(conns[1]).await;
    assert!(h.game(&code).await.player(&player).unwrap().is_connected());
}

#[tokio::test]
async fn reconnect_after_grace_fails() {
    let h = Harness::with_config(RouterConfig {
        reconnect_grace: Duration::from_millis(20),
        ..RouterConfig::default()
    });
    let (code, conns) = h.room(3).await;
    let player = h.player_of(conns[2]);

    h.router.connection_closed(conns[2]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.game(&code).await.player(&player).is_none());
    h.outbox.take();

    let fresh = Uuid::new_v4();
    h.router
        .handle(
            fresh,
            ClientMsg::Reconnect {
                game_code: code.to_string(),
                player_id: player,
            },
        )
        .await;
    let deliveries = h.outbox.take();
    let replies = sent_to(&deliveries, fresh);
    assert!(matches!(replies[..], [ServerMsg::ReconnectError(_)]));
    assert_eq!(error_code(replies[0]), Some(ErrorCode::CannotReconnect));
}

#[tokio::test]
async fn reconnect_to_missing_game_is_cannot_reconnect() {
    let h = Harness::new();
    let conn = Uuid::new_v4();
    h.router
        .handle(
            conn,
            ClientMsg::Reconnect {
                game_code: "GONE0000".to_string(),
                player_id: Uuid::new_v4(),
            },
        )
        .await;
    let deliveries = h.outbox.take();
    assert_eq!(
        error_code(sent_to(&deliveries, conn)[0]),
        Some(ErrorCode::CannotReconnect)
    );
}

#[tokio::test]
async fn leave_removes_player_and_passes_admin() {
    let h = Harness::new();
    let (code, conns) = h.room(3).await;
    let second = h.player_of(conns[1]);

    h.router.handle(conns[0], ClientMsg::Leave).await;
    let deliveries = h.outbox.take();
    assert!(matches!(
        sent_to(&deliveries, conns[0])[..],
        [ServerMsg::LeaveSuccess]
    ));
    let (_, ServerMsg::GameUpdate(update)) = broadcast(&deliveries)[0] else {
        panic!("room should get the removal");
    };
    assert_eq!(update.operation.remove_players.as_ref().map(Vec::len), Some(1));

    let game = h.game(&code).await;
    assert_eq!(game.players.len(), 2);
    assert_eq!(game.admin_id, second);
}

#[tokio::test]
async fn last_leaver_deletes_the_game() {
    let h = Harness::new();
    let (conn, code) = h.create("solo").await;
    h.router.handle(conn, ClientMsg::Leave).await;
    assert!(h.store.load(&code).await.unwrap().is_none());
}

#[tokio::test]
async fn leaving_mid_game_with_two_players_stops_it() {
    let h = Harness::new();
    let (code, conns) = h.room(2).await;
    h.router.handle(conns[0], ClientMsg::Start).await;
    h.router.handle(conns[1], ClientMsg::Leave).await;
    assert_eq!(h.game(&code).await.status, GameStatus::Stopped);
}

async fn open_vote(h: &Harness, conns: &[ConnId], target: usize) {
    let target_id = h.player_of(conns[target]);
    h.router
        .handle(conns[0], ClientMsg::InitiateKickVote { target_id })
        .await;
}

#[tokio::test]
async fn kick_vote_succeeds_on_three_of_four() {
    let h = Harness::new();
    let (code, conns) = h.room(5).await;
    let target = h.player_of(conns[4]);
    open_vote(&h, &conns, 4).await;

    h.router.handle(conns[1], ClientMsg::KickVote { vote: true }).await;
    h.router.handle(conns[2], ClientMsg::KickVote { vote: false }).await;
    assert!(h.game(&code).await.kick_vote.is_some());
    h.outbox.take();

    h.router.handle(conns[3], ClientMsg::KickVote { vote: true }).await;
    let deliveries = h.outbox.take();

    let room = broadcast(&deliveries);
    assert!(room.iter().any(|(_, msg)| matches!(
        msg,
        ServerMsg::KickVoteSuccess(view) if view.yes == 3 && view.required == 3
    )));
    let game = h.game(&code).await;
    assert!(game.player(&target).is_none());
    assert!(game.kick_vote.is_none());
    assert!(h.router.sessions().binding(conns[4]).is_none());
    assert!(sent_to(&deliveries, conns[4]).contains(&&ServerMsg::LeaveSuccess));
}

#[tokio::test]
async fn kick_vote_fails_on_two_of_four() {
    let h = Harness::new();
    let (code, conns) = h.room(5).await;
    let target = h.player_of(conns[4]);
    open_vote(&h, &conns, 4).await;

    h.router.handle(conns[1], ClientMsg::KickVote { vote: true }).await;
    h.router.handle(conns[2], ClientMsg::KickVote { vote: false }).await;
    h.outbox.take();
    h.router.handle(conns[3], ClientMsg::KickVote { vote: false }).await;
    let deliveries = h.outbox.take();

    assert!(broadcast(&deliveries).iter().any(|(_, msg)| matches!(
        msg,
        ServerMsg::KickVoteFailed(view) if view.yes == 2
    )));
    let game = h.game(&code).await;
    assert!(game.player(&target).is_some());
    assert!(game.kick_vote.is_none());
}

#[tokio::test]
async fn kick_vote_errors() {
    let h = Harness::new();
    let (_, conns) = h.room(4).await;

    h.router.handle(conns[1], ClientMsg::KickVote { vote: true }).await;
    open_vote(&h, &conns, 3).await;
    open_vote(&h, &conns, 2).await;
    h.router.handle(conns[0], ClientMsg::KickVote { vote: true }).await;
    h.router.handle(conns[3], ClientMsg::KickVote { vote: false }).await;

    let deliveries = h.outbox.take();
    let errors: Vec<ErrorCode> = deliveries
        .iter()
        .filter_map(|d| error_code(&d.msg))
        .collect();
    assert_eq!(
        errors,
        vec![
            ErrorCode::NoKickVoteInProgress,
            ErrorCode::KickVoteInProgress,
            ErrorCode::PlayerAlreadyVoted,
            ErrorCode::NotAllowed,
        ]
    );
}

#[tokio::test]
async fn kick_vote_tally_is_versioned() {
    let h = Harness::new();
    let (code, conns) = h.room(5).await;
    let before = h.game(&code).await.version;
    open_vote(&h, &conns, 4).await;
    let deliveries = h.outbox.take();

    let (_, ServerMsg::GameUpdate(update)) = broadcast(&deliveries)[0] else {
        panic!("opening a vote is a commit");
    };
    assert_eq!(update.version, before + 1);
    let changed = update.operation.game.as_ref().unwrap();
    assert_eq!(changed["kickVote"]["status"], "pending");
    assert!(broadcast(&deliveries)
        .iter()
        .any(|(_, msg)| matches!(msg, ServerMsg::KickVote(view) if view.yes == 1)));
}

#[tokio::test]
async fn kick_vote_expires() {
    let h = Harness::with_config(RouterConfig {
        kick_vote_timeout: Duration::from_millis(20),
        ..RouterConfig::default()
    });
    let (code, conns) = h.room(4).await;
    open_vote(&h, &conns, 3).await;
    h.outbox.take();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let deliveries = h.outbox.take();
    assert!(broadcast(&deliveries)
        .iter()
        .any(|(_, msg)| matches!(msg, ServerMsg::KickVoteFailed(_))));
    assert!(h.game(&code).await.kick_vote.is_none());
}

/// Push the stored vote's deadline into the past without touching the timer.
async fn lapse_vote(h: &Harness, code: &GameCode) {
    let mut game = h.game(code).await;
    let vote = game.kick_vote.as_mut().unwrap();
    vote.deadline = time::OffsetDateTime::now_utc() - time::Duration::minutes(10);
    h.store.compare_and_swap(game.version, &game).await.unwrap();
}

#[tokio::test]
async fn lapsed_vote_does_not_block_a_new_one() {
    let h = Harness::new();
    let (code, conns) = h.room(4).await;
    open_vote(&h, &conns, 3).await;
    lapse_vote(&h, &code).await;
    h.outbox.take();

    open_vote(&h, &conns, 2).await;
    let deliveries = h.outbox.take();
    assert!(deliveries.iter().all(|d| error_code(&d.msg).is_none()));
    let room = broadcast(&deliveries);
    assert!(room
        .iter()
        .any(|(_, msg)| matches!(msg, ServerMsg::KickVoteFailed(_))));
    let target = h.player_of(conns[2]);
    assert!(room.iter().any(|(_, msg)| matches!(
        msg,
        ServerMsg::KickVote(view) if view.target_id == target
    )));
    let vote = h.game(&code).await.kick_vote.unwrap();
    assert_eq!(vote.target_id, target);
}

#[tokio::test]
async fn ballot_on_a_lapsed_vote_fails_it() {
    let h = Harness::new();
    let (code, conns) = h.room(4).await;
    let target = h.player_of(conns[3]);
    open_vote(&h, &conns, 3).await;
    lapse_vote(&h, &code).await;
    h.outbox.take();

    h.router.handle(conns[1], ClientMsg::KickVote { vote: true }).await;
    let deliveries = h.outbox.take();
    assert!(broadcast(&deliveries)
        .iter()
        .any(|(_, msg)| matches!(msg, ServerMsg::KickVoteFailed(_))));
    let game = h.game(&code).await;
    assert!(game.kick_vote.is_none());
    assert!(game.player(&target).is_some());
}

#[tokio::test]
async fn resync_mid_vote_includes_the_pending_vote() {
    let h = Harness::new();
    let (_, conns) = h.room(4).await;
    let target = h.player_of(conns[3]);
    open_vote(&h, &conns, 3).await;
    h.outbox.take();

    h.router.handle(conns[2], ClientMsg::Get(None)).await;
    let deliveries = h.outbox.take();
    let replies = sent_to(&deliveries, conns[2]);
    assert_eq!(replies.len(), 1);
    let ServerMsg::Game(snapshot) = replies[0] else {
        panic!("expected a snapshot");
    };
    let vote = snapshot.game.kick_vote.as_ref().unwrap();
    assert_eq!(vote.target_id, target);
}

#[tokio::test]
async fn disconnect_of_a_voter_can_settle_the_vote() {
    let h = Harness::new();
    let (code, conns) = h.room(4).await;
    let target = h.player_of(conns[3]);
    open_vote(&h, &conns, 3).await;
    h.router.handle(conns[1], ClientMsg::KickVote { vote: true }).await;
    // Two yes of three eligible: already a majority.
    assert!(h.game(&code).await.player(&target).is_none());

    let (_, conns) = h.room(4).await;
    let target = h.player_of(conns[3]);
    let code = h.router.sessions().binding(conns[0]).unwrap().code;
    open_vote(&h, &conns, 3).await;
    // One yes of three eligible; passes once the other voters drop.
    h.router.connection_closed(conns[2]).await;
    h.router.connection_closed(conns[1]).await;
    assert!(h.game(&code).await.player(&target).is_none());
}

#[tokio::test]
async fn chat_is_relayed_to_the_room() {
    let h = Harness::new();
    let (code, conns) = h.room(2).await;
    h.router
        .handle(
            conns[1],
            ClientMsg::Message {
                text: "  hello  ".to_string(),
            },
        )
        .await;
    let deliveries = h.outbox.take();
    assert!(matches!(
        broadcast(&deliveries)[..],
        [(None, ServerMsg::Message(ChatMessage { text, username, .. }))]
            if text == "hello" && username == "p1"
    ));
    assert_eq!(h.game(&code).await.version, 1);
}

#[tokio::test]
async fn chat_uses_the_seat_name_not_the_claimed_one() {
    let h = Harness::new();
    let (_, conns) = h.room(2).await;
    let frame = json!({
        "event": "message",
        "data": {"username": "p0", "text": "I am the admin"}
    });
    let msg: ClientMsg = serde_json::from_value(frame).unwrap();
    h.router.handle(conns[1], msg).await;

    let deliveries = h.outbox.take();
    assert!(matches!(
        broadcast(&deliveries)[..],
        [(None, ServerMsg::Message(ChatMessage { username, .. }))] if username == "p1"
    ));
}
