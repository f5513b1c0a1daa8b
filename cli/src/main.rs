// SPDX-License-Identifier: MIT OR Apache-2.0

//! P2PTT CLI - headless terminal driver
//!
//! Hosts or joins a match from the terminal without any UI layer. Moves
//! are read from stdin; board, score, and connection events are printed
//! as they arrive, or echoed as JSON lines for scripted tests.

mod render;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

use p2ptt_core::{GameEvent, Role};
use p2ptt_network::{ConnectionManager, ConnectionStatus, GameSession, NetworkConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRole {
    Host,
    Guest,
}

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(name = "p2ptt", about = "P2P tic-tac-toe headless driver", version)]
struct Args {
    /// The role of this instance
    #[clap(short, long, value_enum)]
    role: CliRole,

    /// Host address to dial (guest only)
    #[clap(short, long)]
    peer: Option<SocketAddr>,

    /// Override the configured listener port (host only)
    #[clap(long)]
    port: Option<u16>,

    /// Emit game events as JSON lines instead of rendered boards
    #[clap(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = p2ptt_network::config::load_config().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "falling back to default config");
        NetworkConfig::default()
    });
    if let Some(port) = args.port {
        config.port = port;
    }

    let conn = Arc::new(ConnectionManager::new(config));
    let session = GameSession::new(Arc::clone(&conn));

    match args.role {
        CliRole::Host => {
            let mut status = conn.subscribe_status();
            let mut peers = conn.subscribe_peer_events();

            conn.init_listener().await;
            if status.recv().await? != ConnectionStatus::Connected {
                bail!("could not bind the listener");
            }
            if let Some(addr) = conn.local_addr() {
                println!("listening on {addr}");
            }

            conn.start_as_host();
            println!("waiting for a peer...");
            if !peers.recv().await? {
                bail!("no peer arrived before the timeout");
            }
            println!("peer connected");
            session.set_role(Role::Host);
        }
        CliRole::Guest => {
            let peer = args.peer.context("--peer is required for the guest role")?;
            let mut status = conn.subscribe_status();

            conn.set_peer(peer);
            conn.start_as_guest();
            if status.recv().await? != ConnectionStatus::Connected {
                bail!("failed to connect to {peer}");
            }
            println!("connected to {peer}");
            session.set_role(Role::Guest);
        }
    }

    session.start();

    let mut events = session.subscribe();
    let json = args.json;
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, json),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("enter moves as: row col  (also: reset, score, quit)");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "quit" | "exit" => break,
            "reset" => session.reset_board(),
            "score" => println!("score: {}", session.score_summary()),
            input => match parse_move(input) {
                Some((row, col)) => {
                    if let Err(e) = session.attempt_move(row, col) {
                        println!("rejected: {e}");
                    }
                }
                None => println!("unrecognized input: {input}"),
            },
        }
    }

    printer.abort();
    session.die();
    conn.die();
    Ok(())
}

fn parse_move(line: &str) -> Option<(u8, u8)> {
    let mut parts = line.split_whitespace();
    let row = parts.next()?.parse().ok()?;
    let col = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((row, col))
}

fn print_event(event: &GameEvent, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }
    match event {
        GameEvent::BoardUpdated { cells } => print!("{}", render::board(cells)),
        GameEvent::ScoreUpdated { host, guest } => {
            println!("score: host {host} - guest {guest}");
        }
        GameEvent::GameWon { winner } => println!("{winner:?} wins the round"),
        GameEvent::Draw => println!("round drawn"),
    }
}
