//! # Room Server Library
//!
//! Authoritative side of the physics sync layer. Clients create and join
//! rooms; every room owns its own rigid-body world, advances it at a fixed
//! rate while anyone is present, and broadcasts a full state snapshot to its
//! participants after each step.
//!
//! ## Architecture
//!
//! ### Single-Task Event Loop
//! All room state lives on one task. Inbound packets and room ticks are
//! interleaved on that task, so handlers and ticks never race and no room is
//! locked. A slow step in one room delays the ticks of others.
//!
//! ### Per-Connection Tasks
//! Each TCP connection has a reader task that decodes frames into
//! [`network::ServerMessage`]s and a writer task that drains a bounded outbox.
//! The event loop never awaits a socket.
//!
//! ### Fixed-Step Scheduling
//! Tick deadlines are absolute (see [`scheduler`]); late ticks skip missed
//! deadlines and the physics sub-step cap bounds the catch-up work.
//!
//! ## Module Organization
//!
//! - `config`: command-line flags and simulation timing
//! - `connection_manager`: live connections and their outboxes
//! - `network`: TCP sessions, packet routing, the main loop
//! - `registry`: room lifecycle and event dispatch
//! - `room`: one simulated world, its objects and snapshots
//! - `scheduler`: tick deadlines
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind(&ServerConfig::default()).await?;
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod connection_manager;
pub mod network;
pub mod registry;
pub mod room;
pub mod scheduler;
