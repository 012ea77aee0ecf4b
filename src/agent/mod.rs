//! GnuPG agent protocol roles.
//!
//! This module provides:
//! - Protocol vocabulary shared by both roles
//! - A line transport over a connected Unix socket
//! - A client that runs the signing handshake against a real agent
//! - A server that impersonates an agent and signs through a capability
//!
//! The wire format is newline-delimited text; structured payloads travel as
//! escaped canonical S-expressions inside `D` lines.

pub mod client;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{AgentClient, SignRequest};
pub use protocol::{Command, Request};
pub use server::{AgentServer, SelfDeletingSocket, ServerConfig, SessionEnd};
pub use transport::Transport;
