// SPDX-License-Identifier: MIT OR Apache-2.0

//! P2PTT Core - Game Rules and Board Logic
//!
//! This crate provides the core game functionality including:
//! - Tic-tac-toe board representation and win evaluation
//! - Role and score bookkeeping
//! - Wire message encoding and decoding

#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod board;
pub mod wire;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Board side length. The session layer only supports 3×3 boards.
pub const BOARD_SIZE: usize = 3;

/// The two asymmetric peers of a match. The host owns the listening
/// endpoint and always moves first on a fresh board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The listening peer; moves first
    Host,
    /// The dialing peer
    Guest,
}

impl Role {
    /// Returns the opposite role
    pub fn opposite(&self) -> Self {
        match self {
            Role::Host => Role::Guest,
            Role::Guest => Role::Host,
        }
    }

    /// Numeric id used on the wire (0 = host, 1 = guest)
    pub fn wire_id(&self) -> u8 {
        match self {
            Role::Host => 0,
            Role::Guest => 1,
        }
    }

    /// Decode a wire id back into a role
    pub fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Role::Host),
            1 => Some(Role::Guest),
            _ => None,
        }
    }
}

/// A board cell: empty, or holding the marker of the peer that filled it.
pub type Cell = Option<Role>;

/// Per-role win counters. Monotonically non-decreasing until reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBoard {
    host: u32,
    guest: u32,
}

impl ScoreBoard {
    /// Credit a win to the given marker's side
    pub fn record_win(&mut self, winner: Role) {
        match winner {
            Role::Host => self.host += 1,
            Role::Guest => self.guest += 1,
        }
    }

    /// Score of one side
    pub fn get(&self, role: Role) -> u32 {
        match role {
            Role::Host => self.host,
            Role::Guest => self.guest,
        }
    }

    pub fn host(&self) -> u32 {
        self.host
    }

    pub fn guest(&self) -> u32 {
        self.guest
    }

    /// Zero both counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Game events published to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// The board changed; carries a full snapshot
    BoardUpdated {
        /// Row-major 3×3 snapshot
        cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
    },
    /// The score changed
    ScoreUpdated {
        /// Host win count
        host: u32,
        /// Guest win count
        guest: u32,
    },
    /// A line was completed
    GameWon {
        /// The marker that completed the line
        winner: Role,
    },
    /// The board filled with no completed line
    Draw,
}

/// Errors that can occur during game play
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GameError {
    /// No role has been assigned to the session yet
    #[error("role has not been set")]
    RoleUnset,

    /// It is the other side's turn
    #[error("not your turn")]
    NotYourTurn,

    /// The target cell already holds a marker
    #[error("cell is already occupied")]
    CellOccupied,

    /// The round ended; a reset is required before the next move
    #[error("game has ended, reset required")]
    GameEnded,

    /// The coordinate is outside the board
    #[error("coordinate out of bounds")]
    OutOfBounds,
}

pub use board::Board;
pub use wire::WireMessage;
