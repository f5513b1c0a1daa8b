// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire message encoding and decoding
//!
//! The wire format is ASCII: a move is `"<row>,<col>,<roleId>"` with
//! row/col in 0..=2 and roleId 0 (host) or 1 (guest); a reset is the
//! literal `"reset"`. Framing (one message per line) is the transport
//! layer's concern.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::{Role, BOARD_SIZE};

/// The reset sentinel as it appears on the wire
pub const RESET: &str = "reset";

/// A message exchanged between the two peers. These are the only two
/// kinds that exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMessage {
    /// One placed marker
    Move {
        /// Board row, 0..=2
        row: u8,
        /// Board column, 0..=2
        col: u8,
        /// The mover's role
        role: Role,
    },
    /// Clear the board and start over with the host's turn
    Reset,
}

/// Errors produced while decoding an incoming frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The frame was empty after trimming
    #[error("empty frame")]
    Empty,

    /// The frame is neither a reset nor a three-field move
    #[error("malformed frame: {0:?}")]
    Malformed(String),

    /// A coordinate fell outside the board
    #[error("coordinate out of range: {0}")]
    CoordOutOfRange(u8),

    /// The role id is neither 0 nor 1
    #[error("unknown role id: {0}")]
    UnknownRole(u8),
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireMessage::Move { row, col, role } => {
                write!(f, "{},{},{}", row, col, role.wire_id())
            }
            WireMessage::Reset => f.write_str(RESET),
        }
    }
}

impl FromStr for WireMessage {
    type Err = WireError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(WireError::Empty);
        }
        if raw == RESET {
            return Ok(WireMessage::Reset);
        }

        let mut fields = raw.splitn(4, ',');
        let mut next = || {
            fields
                .next()
                .ok_or_else(|| WireError::Malformed(raw.to_string()))
        };
        let row = parse_field(next()?, raw)?;
        let col = parse_field(next()?, raw)?;
        let role_id = parse_field(next()?, raw)?;
        if fields.next().is_some() {
            return Err(WireError::Malformed(raw.to_string()));
        }

        if (row as usize) >= BOARD_SIZE {
            return Err(WireError::CoordOutOfRange(row));
        }
        if (col as usize) >= BOARD_SIZE {
            return Err(WireError::CoordOutOfRange(col));
        }
        let role = Role::from_wire_id(role_id).ok_or(WireError::UnknownRole(role_id))?;

        Ok(WireMessage::Move { row, col, role })
    }
}

fn parse_field(field: &str, raw: &str) -> Result<u8, WireError> {
    field
        .trim()
        .parse::<u8>()
        .map_err(|_| WireError::Malformed(raw.to_string()))
}
