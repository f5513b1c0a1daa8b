// SPDX-License-Identifier: MIT OR Apache-2.0

//! Game session state machine
//!
//! One [`GameSession`] is constructed per match on top of a
//! [`ConnectionManager`]. Local moves and remote frames mutate the same
//! board through one mutex, so the accept/read loops and UI-triggered
//! moves can never interleave a read-modify-write. Observers receive
//! [`GameEvent`]s on a broadcast stream with no replay.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use p2ptt_core::{Board, GameError, GameEvent, Role, ScoreBoard, WireMessage};

use crate::connection::ConnectionManager;

/// Board, turn, and score under one lock. Win evaluation runs inside the
/// same critical section as the mutation that triggered it.
struct GameState {
    role: Option<Role>,
    board: Board,
    turn: Role,
    scores: ScoreBoard,
    game_ended: bool,
}

impl GameState {
    fn new() -> Self {
        Self {
            role: None,
            board: Board::new(),
            // The first move always belongs to the host
            turn: Role::Host,
            scores: ScoreBoard::default(),
            game_ended: false,
        }
    }
}

/// A running match: role, board, turn, scores, and the wire protocol
/// glue on top of the connection manager's message stream.
pub struct GameSession {
    conn: Arc<ConnectionManager>,
    session_id: Uuid,
    state: Arc<Mutex<GameState>>,
    events_tx: broadcast::Sender<GameEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl GameSession {
    pub fn new(conn: Arc<ConnectionManager>) -> Self {
        let (events_tx, _) = broadcast::channel(32);
        Self {
            conn,
            session_id: Uuid::new_v4(),
            state: Arc::new(Mutex::new(GameState::new())),
            events_tx,
            pump: Mutex::new(None),
        }
    }

    /// Game events: board snapshots, score changes, wins, draws
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events_tx.subscribe()
    }

    /// Assign this side's role. Must be called before any move.
    pub fn set_role(&self, role: Role) {
        tracing::debug!(session = %self.session_id, ?role, "role assigned");
        self.state.lock().role = Some(role);
    }

    /// This side's role, if assigned
    pub fn role(&self) -> Option<Role> {
        self.state.lock().role
    }

    /// Start consuming the connection's message stream. No-op when
    /// already started.
    pub fn start(&self) {
        let mut pump = self.pump.lock();
        if pump.is_some() {
            tracing::debug!(session = %self.session_id, "session already started");
            return;
        }

        let mut rx = self.conn.subscribe_messages();
        let session_id = self.session_id;
        let state = Arc::clone(&self.state);
        let events_tx = self.events_tx.clone();

        *pump = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(raw) => Self::handle_frame(session_id, &state, &events_tx, &raw),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(session = %session_id, skipped, "message stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Play a move for the local side. Rejects without mutating state or
    /// touching the wire unless the role is set, it is this side's turn,
    /// the cell is empty, and the round has not ended.
    pub fn attempt_move(&self, row: u8, col: u8) -> Result<(), GameError> {
        let mut st = self.state.lock();
        let role = st.role.ok_or(GameError::RoleUnset)?;

        if st.game_ended {
            return Err(GameError::GameEnded);
        }
        if st.turn != role {
            return Err(GameError::NotYourTurn);
        }
        match st.board.get(row, col) {
            None => return Err(GameError::OutOfBounds),
            Some(Some(_)) => return Err(GameError::CellOccupied),
            Some(None) => {}
        }

        st.board.mark(row, col, role);
        st.turn = role.opposite();
        tracing::debug!(session = %self.session_id, row, col, ?role, "local move accepted");

        self.conn
            .send(WireMessage::Move { row, col, role }.to_string());

        let _ = self.events_tx.send(GameEvent::BoardUpdated {
            cells: st.board.snapshot(),
        });
        Self::evaluate_win(self.session_id, &mut st, &self.events_tx);
        Ok(())
    }

    /// Apply one raw frame from the peer. Malformed frames are dropped
    /// without mutating any state.
    pub fn apply_incoming(&self, raw: &str) {
        Self::handle_frame(self.session_id, &self.state, &self.events_tx, raw);
    }

    /// Clear the board for a new round and tell the peer to do the same.
    pub fn reset_board(&self) {
        {
            let mut st = self.state.lock();
            st.board.clear();
            st.turn = Role::Host;
            st.game_ended = false;
            let _ = self.events_tx.send(GameEvent::BoardUpdated {
                cells: st.board.snapshot(),
            });
        }
        self.conn.send(WireMessage::Reset.to_string());
    }

    /// True iff [`attempt_move`] with the same coordinates would be
    /// accepted right now.
    ///
    /// [`attempt_move`]: GameSession::attempt_move
    pub fn can_move(&self, row: u8, col: u8) -> bool {
        let st = self.state.lock();
        let Some(role) = st.role else { return false };
        if st.game_ended || st.turn != role {
            return false;
        }
        matches!(st.board.get(row, col), Some(None))
    }

    /// Raw `(host, guest)` win counters
    pub fn scores(&self) -> (u32, u32) {
        let st = self.state.lock();
        (st.scores.host(), st.scores.guest())
    }

    /// Score line from the local side's perspective: "mine - theirs"
    pub fn score_summary(&self) -> String {
        let st = self.state.lock();
        match st.role {
            Some(Role::Guest) => format!("{} - {}", st.scores.guest(), st.scores.host()),
            _ => format!("{} - {}", st.scores.host(), st.scores.guest()),
        }
    }

    /// Current board snapshot
    pub fn board(&self) -> [[p2ptt_core::Cell; 3]; 3] {
        self.state.lock().board.snapshot()
    }

    /// Stop the pump and zero every field. Idempotent.
    pub fn die(&self) {
        tracing::debug!(session = %self.session_id, "tearing down game session");
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
        let mut st = self.state.lock();
        st.role = None;
        st.board.clear();
        st.turn = Role::Host;
        st.scores.reset();
        st.game_ended = false;
    }

    fn handle_frame(
        session_id: Uuid,
        state: &Mutex<GameState>,
        events_tx: &broadcast::Sender<GameEvent>,
        raw: &str,
    ) {
        let msg = match raw.parse::<WireMessage>() {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(session = %session_id, frame = %raw, error = %e, "dropping malformed frame");
                return;
            }
        };

        let mut st = state.lock();
        match msg {
            WireMessage::Reset => {
                tracing::debug!(session = %session_id, "reset received");
                st.board.clear();
                st.turn = Role::Host;
                st.game_ended = false;
                let _ = events_tx.send(GameEvent::BoardUpdated {
                    cells: st.board.snapshot(),
                });
            }
            WireMessage::Move { row, col, role } => {
                // The marker comes from the frame, not the local role.
                if !st.board.mark(row, col, role) {
                    tracing::warn!(
                        session = %session_id,
                        row, col, ?role,
                        "dropping conflicting move frame"
                    );
                    return;
                }
                st.turn = role.opposite();
                tracing::debug!(session = %session_id, row, col, ?role, "remote move applied");
                let _ = events_tx.send(GameEvent::BoardUpdated {
                    cells: st.board.snapshot(),
                });
                Self::evaluate_win(session_id, &mut st, events_tx);
            }
        }
    }

    /// Check the just-mutated board for a completed line or a draw.
    /// Credits the score of the marker that completed the line, then
    /// clears the board for the next round.
    fn evaluate_win(
        session_id: Uuid,
        st: &mut GameState,
        events_tx: &broadcast::Sender<GameEvent>,
    ) -> bool {
        if let Some(winner) = st.board.winner() {
            st.scores.record_win(winner);
            st.game_ended = true;
            tracing::info!(
                session = %session_id,
                ?winner,
                host = st.scores.host(),
                guest = st.scores.guest(),
                "line completed"
            );
            let _ = events_tx.send(GameEvent::GameWon { winner });
            let _ = events_tx.send(GameEvent::ScoreUpdated {
                host: st.scores.host(),
                guest: st.scores.guest(),
            });
            st.board.clear();
            st.turn = Role::Host;
            let _ = events_tx.send(GameEvent::BoardUpdated {
                cells: st.board.snapshot(),
            });
            return true;
        }

        if st.board.is_full() {
            st.game_ended = true;
            tracing::info!(session = %session_id, "board full with no line, draw");
            let _ = events_tx.send(GameEvent::Draw);
            st.board.clear();
            st.turn = Role::Host;
            let _ = events_tx.send(GameEvent::BoardUpdated {
                cells: st.board.snapshot(),
            });
        }
        false
    }
}
