// SPDX-License-Identifier: MIT OR Apache-2.0

//! P2PTT Network - session layer for peer-to-peer tic-tac-toe
//!
//! This crate provides the networking functionality including:
//! - Host/guest TCP connection lifecycle with background accept,
//!   connect, read, and write loops
//! - Broadcast streams for connection status, peer acceptance, and
//!   incoming messages
//! - The game session state machine that keeps both boards in sync

#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod config;
pub mod connection;
pub mod net_util;
pub mod session;

pub use config::NetworkConfig;
pub use connection::{ConnectionManager, ConnectionStatus};
pub use session::GameSession;
