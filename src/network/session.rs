//! Match Session Management
//!
//! A `MatchSession` binds one match state machine to the connections routed
//! to its match id. The `MatchRegistry` maps match ids to sessions and
//! creates them lazily.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::core::rng::{derive_match_seed, entropy_seed};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::state::{MatchError, MatchState, Seat};
use crate::network::protocol::{ClientMessage, GameSnapshot, ServerMessage};

/// Unique connection identifier.
pub type ConnectionId = uuid::Uuid;

/// A connection bound to a match.
#[derive(Debug, Clone)]
pub struct SessionConnection {
    /// Participant id from the connection route.
    pub participant_id: String,
    /// Seat, or `None` for a spectator.
    pub seat: Option<Seat>,
    /// Outbound message queue.
    pub sender: mpsc::Sender<ServerMessage>,
}

/// One match and the connections routed to it.
pub struct MatchSession {
    /// Match id.
    id: String,
    /// Authoritative match state.
    state: MatchState,
    /// Participant holding each seat.
    seats: [Option<String>; 2],
    /// Live connections.
    connections: BTreeMap<ConnectionId, SessionConnection>,
    /// When the last connection left.
    abandoned_since: Option<Instant>,
}

impl MatchSession {
    /// Create a session with a fresh match.
    pub fn new(id: impl Into<String>, rng_seed: u64) -> Self {
        let id = id.into();
        Self {
            state: MatchState::new(id.clone(), rng_seed),
            id,
            seats: [None, None],
            connections: BTreeMap::new(),
            abandoned_since: None,
        }
    }

    /// Match id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current match state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Assign both seats and the starting seat handed over by matchmaking.
    pub fn reserve_seats(&mut self, participants: [String; 2], starting_seat: Option<Seat>) {
        let [one, two] = participants;
        self.seats = [Some(one), Some(two)];
        self.state.default_starting_seat = starting_seat;
    }

    /// Seat held by a participant.
    pub fn seat_of(&self, participant_id: &str) -> Option<Seat> {
        Seat::ALL
            .into_iter()
            .find(|seat| self.seats[seat.index()].as_deref() == Some(participant_id))
    }

    /// Bind a connection. Returns its id and seat.
    ///
    /// A participant keeps the seat they hold; otherwise the first free seat is
    /// claimed; otherwise the connection spectates.
    pub fn connect(
        &mut self,
        participant_id: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> (ConnectionId, Option<Seat>) {
        let seat = self.seat_of(participant_id).or_else(|| {
            let free = Seat::ALL
                .into_iter()
                .find(|seat| self.seats[seat.index()].is_none())?;
            self.seats[free.index()] = Some(participant_id.to_string());
            Some(free)
        });

        let conn_id = uuid::Uuid::new_v4();
        self.connections.insert(
            conn_id,
            SessionConnection {
                participant_id: participant_id.to_string(),
                seat,
                sender,
            },
        );
        self.abandoned_since = None;

        (conn_id, seat)
    }

    /// Unbind a connection. Returns true if it was the last one.
    pub fn disconnect(&mut self, conn_id: &ConnectionId) -> bool {
        self.connections.remove(conn_id);
        if self.connections.is_empty() {
            self.abandoned_since.get_or_insert_with(Instant::now);
            true
        } else {
            false
        }
    }

    /// Seat of a bound connection.
    pub fn connection_seat(&self, conn_id: &ConnectionId) -> Option<Seat> {
        self.connections.get(conn_id).and_then(|c| c.seat)
    }

    /// Number of bound connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether every connection has been gone for at least `grace`.
    pub fn is_abandoned_for(&self, grace: Duration, now: Instant) -> bool {
        self.abandoned_since
            .is_some_and(|since| now.saturating_duration_since(since) >= grace)
    }

    /// Current snapshot message.
    pub fn snapshot(&self) -> ServerMessage {
        ServerMessage::GameState(GameSnapshot::from_state(&self.state))
    }

    /// Apply a client message from a connection and broadcast the result.
    ///
    /// The snapshot goes out whether or not the action was accepted, since a
    /// rejection still updates the status message.
    pub fn handle(
        &mut self,
        conn_id: &ConnectionId,
        message: ClientMessage,
    ) -> Result<(), MatchError> {
        let seat = self.connection_seat(conn_id);
        let kind = message.type_name();

        let result = self.state.apply(seat, message.into_action());
        match &result {
            Ok(()) => debug!(match_id = %self.id, seq = self.state.seq, ?seat, kind, "Action applied"),
            Err(err) => debug!(match_id = %self.id, seq = self.state.seq, ?seat, kind, %err, "Action rejected"),
        }

        for event in self.state.take_events() {
            log_event(&self.id, &event);
        }

        self.broadcast(self.snapshot());
        result
    }

    /// Send the current snapshot to one connection.
    pub fn send_snapshot_to(&self, conn_id: &ConnectionId) {
        if let Some(conn) = self.connections.get(conn_id) {
            self.queue(conn_id, conn, self.snapshot());
        }
    }

    /// Broadcast a message to all bound connections.
    ///
    /// Never waits on a connection: a full queue misses this message and
    /// catches up with the next snapshot.
    pub fn broadcast(&self, message: ServerMessage) {
        for (conn_id, conn) in &self.connections {
            self.queue(conn_id, conn, message.clone());
        }
    }

    fn queue(&self, conn_id: &ConnectionId, conn: &SessionConnection, message: ServerMessage) {
        match conn.sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(
                match_id = %self.id,
                participant = %conn.participant_id,
                %conn_id,
                "Outbound queue full, snapshot dropped"
            ),
            // The connection task unbinds it on its way out.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn log_event(match_id: &str, event: &GameEvent) {
    match &event.data {
        GameEventData::RoundStarted { starting_seat, deck_remaining } => {
            info!(match_id, seq = event.seq, %starting_seat, deck_remaining, "Round started");
        }
        GameEventData::RoundEnded { final_scores, winner, .. } => {
            info!(
                match_id,
                seq = event.seq,
                score_1 = final_scores.one,
                score_2 = final_scores.two,
                ?winner,
                "Round ended"
            );
        }
        data => debug!(match_id, seq = event.seq, event = event.name(), ?data, "Game event"),
    }
}

// =============================================================================
// MATCH REGISTRY
// =============================================================================

/// Maps match ids to live sessions.
pub struct MatchRegistry {
    /// Active sessions.
    sessions: RwLock<BTreeMap<String, Arc<RwLock<MatchSession>>>>,
    /// Server seed; each match derives its own from it.
    rng_seed: Option<u64>,
}

impl MatchRegistry {
    /// Create an empty registry.
    pub fn new(rng_seed: Option<u64>) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            rng_seed,
        }
    }

    fn seed_for(&self, match_id: &str) -> u64 {
        match self.rng_seed {
            Some(seed) => derive_match_seed(seed, match_id),
            None => entropy_seed(),
        }
    }

    /// Matchmaking hand-off: reserve both seats and the starting seat.
    pub async fn register_match(
        &self,
        match_id: &str,
        participants: [String; 2],
        starting_seat: Option<Seat>,
    ) -> Arc<RwLock<MatchSession>> {
        let session = self.get_or_create(match_id).await;
        session.write().await.reserve_seats(participants, starting_seat);
        info!(match_id, ?starting_seat, "Match registered");
        session
    }

    /// Session for a match id, created on first use.
    pub async fn get_or_create(&self, match_id: &str) -> Arc<RwLock<MatchSession>> {
        if let Some(session) = self.get(match_id).await {
            return session;
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(match_id.to_string())
            .or_insert_with(|| {
                info!(match_id, "Match created");
                Arc::new(RwLock::new(MatchSession::new(match_id, self.seed_for(match_id))))
            })
            .clone()
    }

    /// Get a session by match id.
    pub async fn get(&self, match_id: &str) -> Option<Arc<RwLock<MatchSession>>> {
        let sessions = self.sessions.read().await;
        sessions.get(match_id).cloned()
    }

    /// Remove a session.
    pub async fn remove(&self, match_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(match_id).is_some()
    }

    /// Number of live matches.
    pub async fn match_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Remove matches abandoned for at least `grace`. Returns the removed ids.
    ///
    /// Sessions that are locked, or held by anyone besides the registry, are
    /// in use and left for a later pass.
    pub async fn cleanup(&self, grace: Duration) -> Vec<String> {
        let now = Instant::now();
        let candidates: Vec<(String, Arc<RwLock<MatchSession>>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .map(|(id, session)| (id.clone(), session.clone()))
                .collect()
        };

        let mut removed = Vec::new();
        for (id, session) in candidates {
            if !Self::is_idle(&session, grace, now) {
                continue;
            }

            // get_or_create clones under the registry lock, so the count is stable here.
            let mut sessions = self.sessions.write().await;
            let unclaimed = sessions.get(&id).is_some_and(|current| {
                Arc::ptr_eq(current, &session) && Arc::strong_count(current) == 2
            });
            if unclaimed && Self::is_idle(&session, grace, now) {
                sessions.remove(&id);
                info!(match_id = %id, "Abandoned match removed");
                removed.push(id);
            }
        }
        removed
    }

    fn is_idle(session: &RwLock<MatchSession>, grace: Duration, now: Instant) -> bool {
        session
            .try_read()
            .is_ok_and(|session| session.is_abandoned_for(grace, now))
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::MatchPhase;
    use crate::network::protocol::StartRoundPayload;

    fn start_round(seat: Seat) -> ClientMessage {
        ClientMessage::StartRound(StartRoundPayload {
            starting_seat: Some(seat),
            seat_label: None,
        })
    }

    fn snapshot_of(message: ServerMessage) -> GameSnapshot {
        match message {
            ServerMessage::GameState(snapshot) => snapshot,
        }
    }

    #[tokio::test]
    async fn test_seats_claimed_in_order() {
        let mut session = MatchSession::new("m", 1);
        let (tx, _rx) = mpsc::channel(10);

        let (_, first) = session.connect("alice", tx.clone());
        let (_, second) = session.connect("bob", tx.clone());
        let (_, third) = session.connect("carol", tx.clone());
        let (_, again) = session.connect("alice", tx);

        assert_eq!(first, Some(Seat::One));
        assert_eq!(second, Some(Seat::Two));
        assert_eq!(third, None);
        assert_eq!(again, Some(Seat::One));
        assert_eq!(session.connection_count(), 4);
    }

    #[tokio::test]
    async fn test_reserved_seats() {
        let mut session = MatchSession::new("m", 1);
        session.reserve_seats(["p1".into(), "p2".into()], Some(Seat::Two));
        let (tx, _rx) = mpsc::channel(10);

        let (_, stranger) = session.connect("stranger", tx.clone());
        let (_, p2) = session.connect("p2", tx);

        assert_eq!(stranger, None);
        assert_eq!(p2, Some(Seat::Two));
        assert_eq!(session.state().default_starting_seat, Some(Seat::Two));
    }

    #[tokio::test]
    async fn test_handle_broadcasts_to_all() {
        let mut session = MatchSession::new("m", 7);
        let (tx1, mut rx1) = mpsc::channel(10);
        let (tx2, mut rx2) = mpsc::channel(10);
        let (conn1, _) = session.connect("a", tx1);
        session.connect("b", tx2);

        session.handle(&conn1, start_round(Seat::One)).unwrap();

        let s1 = snapshot_of(rx1.recv().await.unwrap());
        let s2 = snapshot_of(rx2.recv().await.unwrap());
        assert_eq!(s1, s2);
        assert_eq!(s1.phase, MatchPhase::Playing);
        assert_eq!(s1.seq, 1);
    }

    #[tokio::test]
    async fn test_rejection_still_broadcasts() {
        let mut session = MatchSession::new("m", 7);
        let (tx, mut rx) = mpsc::channel(10);
        let (conn1, _) = session.connect("a", tx.clone());
        let (conn2, _) = session.connect("b", tx);

        session.handle(&conn1, start_round(Seat::One)).unwrap();
        let err = session.handle(&conn2, ClientMessage::TakeCamels).unwrap_err();
        assert_eq!(err, MatchError::NotYourTurn);

        let _ = rx.recv().await.unwrap();
        let _ = rx.recv().await.unwrap();
        let rejected = snapshot_of(rx.recv().await.unwrap());
        let _ = rx.recv().await.unwrap();
        assert_eq!(rejected.seq, 2);
        assert_eq!(rejected.message, "It is not your turn");
    }

    #[tokio::test]
    async fn test_spectator_cannot_act() {
        let mut session = MatchSession::new("m", 7);
        session.reserve_seats(["a".into(), "b".into()], None);
        let (tx, _rx) = mpsc::channel(10);
        let (watcher, seat) = session.connect("watcher", tx);
        assert_eq!(seat, None);

        let err = session.handle(&watcher, start_round(Seat::One)).unwrap_err();
        assert_eq!(err, MatchError::NotSeated);
        assert_eq!(session.state().phase, MatchPhase::Loading);
    }

    #[tokio::test]
    async fn test_send_snapshot_to_single_connection() {
        let mut session = MatchSession::new("m", 7);
        let (tx1, mut rx1) = mpsc::channel(10);
        let (tx2, mut rx2) = mpsc::channel(10);
        let (conn1, _) = session.connect("a", tx1);
        session.connect("b", tx2);

        session.send_snapshot_to(&conn1);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_marks_abandoned() {
        let mut session = MatchSession::new("m", 1);
        let (tx, _rx) = mpsc::channel(10);
        let (a, _) = session.connect("a", tx.clone());
        let (b, _) = session.connect("b", tx.clone());

        assert!(!session.disconnect(&a));
        assert!(!session.is_abandoned_for(Duration::ZERO, Instant::now()));
        assert!(session.disconnect(&b));
        assert!(session.is_abandoned_for(Duration::ZERO, Instant::now()));
        assert!(!session.is_abandoned_for(Duration::from_secs(3600), Instant::now()));

        session.connect("a", tx);
        assert!(!session.is_abandoned_for(Duration::ZERO, Instant::now()));
    }

    #[tokio::test]
    async fn test_registry_lazily_creates_once() {
        let registry = MatchRegistry::default();
        let a = registry.get_or_create("m1").await;
        let b = registry.get_or_create("m1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.match_count().await, 1);
        assert!(registry.get("m2").await.is_none());

        assert!(registry.remove("m1").await);
        assert_eq!(registry.match_count().await, 0);
    }

    #[tokio::test]
    async fn test_registry_register_match() {
        let registry = MatchRegistry::new(Some(5));
        let session = registry
            .register_match("m1", ["p1".into(), "p2".into()], Some(Seat::Two))
            .await;
        let session = session.read().await;
        assert_eq!(session.seat_of("p2"), Some(Seat::Two));
        assert_eq!(session.id(), "m1");
    }

    #[tokio::test]
    async fn test_registry_seeds_are_reproducible() {
        let deck_of = |registry: MatchRegistry| async move {
            let session = registry.get_or_create("seeded").await;
            let mut session = session.write().await;
            let (tx, _rx) = mpsc::channel(10);
            let (conn, _) = session.connect("a", tx);
            session.handle(&conn, start_round(Seat::One)).unwrap();
            session.state().deck.clone()
        };

        let first = deck_of(MatchRegistry::new(Some(99))).await;
        let second = deck_of(MatchRegistry::new(Some(99))).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_registry_cleanup() {
        let registry = MatchRegistry::default();
        let active = registry.get_or_create("active").await;
        let idle = registry.get_or_create("idle").await;

        let (tx, _rx) = mpsc::channel(10);
        active.write().await.connect("a", tx.clone());
        {
            let mut idle = idle.write().await;
            let (conn, _) = idle.connect("b", tx);
            idle.disconnect(&conn);
        }
        drop((active, idle));

        let removed = registry.cleanup(Duration::ZERO).await;
        assert_eq!(removed, vec!["idle".to_string()]);
        assert_eq!(registry.match_count().await, 1);
        assert!(registry.get("active").await.is_some());
    }

    #[tokio::test]
    async fn test_stalled_reader_does_not_block_broadcast() {
        let mut session = MatchSession::new("m", 7);
        let (stalled_tx, _stalled_rx) = mpsc::channel(1);
        let (tx, mut rx) = mpsc::channel(10);
        let (stalled, _) = session.connect("watcher", stalled_tx);
        session.connect("a", tx);

        for _ in 0..3 {
            let _ = session.handle(&stalled, ClientMessage::Join);
        }

        let mut seqs = Vec::new();
        while let Ok(message) = rx.try_recv() {
            seqs.push(snapshot_of(message).seq);
        }
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cleanup_skips_locked_sessions() {
        let registry = Arc::new(MatchRegistry::default());
        let busy = registry.get_or_create("busy").await;
        let guard = busy.write().await;

        let removed = tokio::time::timeout(
            Duration::from_secs(1),
            registry.cleanup(Duration::from_secs(300)),
        )
        .await
        .unwrap();
        assert!(removed.is_empty());

        let other = tokio::time::timeout(Duration::from_secs(1), registry.get_or_create("other"))
            .await
            .unwrap();
        assert_eq!(other.read().await.id(), "other");
        drop(guard);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_claimed_session() {
        let registry = MatchRegistry::default();
        let claimed = registry.get_or_create("m").await;
        {
            let (tx, _rx) = mpsc::channel(10);
            let mut session = claimed.write().await;
            let (conn, _) = session.connect("a", tx);
            session.disconnect(&conn);
        }

        // A connection holding the session between lookup and connect keeps it alive.
        assert!(registry.cleanup(Duration::ZERO).await.is_empty());

        let (tx, _rx) = mpsc::channel(10);
        let conn = claimed.write().await.connect("alice", tx).0;
        claimed.write().await.handle(&conn, start_round(Seat::One)).unwrap();

        let again = registry.get_or_create("m").await;
        assert!(Arc::ptr_eq(&claimed, &again));
        assert_eq!(again.read().await.state().phase, MatchPhase::Playing);

        claimed.write().await.disconnect(&conn);
        drop((claimed, again));
        assert_eq!(registry.cleanup(Duration::ZERO).await, vec!["m".to_string()]);
    }
}
