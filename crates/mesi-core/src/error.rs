//! Protocol-level error type.
//!
//! Hand-rolled rather than built on `thiserror` — nothing in this crate's dependency
//! graph pulls in a derive-macro error crate, so `SimError` is written the way the
//! fork's own small value types (`ProcessHandle`, `WaitResult`) are: a plain enum with
//! a manual `Display`/`Error` impl. The binary crate composes this into `anyhow::Error`
//! at the boundary via `?` (`anyhow::Error` implements `From<E: std::error::Error>`).

use std::fmt;

use crate::addr::NodeId;

#[derive(Debug, Clone)]
pub enum SimError {
    /// Startup configuration problem: missing argument, unreadable instruction file,
    /// malformed `--config` TOML.
    Config(String),
    /// A line in an instruction file could not be parsed. Recovered locally — callers
    /// log this and skip the line, never propagate it.
    Parse { file: String, line: String, reason: String },
    /// A `send` would have exceeded `MSG_BUFFER` slots for the destination inbox.
    InboxOverflow { to: NodeId },
    /// A coherence invariant was violated: directory/cache state the protocol
    /// guarantees can never occur did. Unrecoverable.
    ProtocolViolation { node: NodeId, address: u8, detail: String },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(msg) => write!(f, "configuration error: {msg}"),
            SimError::Parse { file, line, reason } => {
                write!(f, "{file}: could not parse line {line:?}: {reason}")
            }
            SimError::InboxOverflow { to } => {
                write!(f, "inbox overflow: node {to} could not accept another message")
            }
            SimError::ProtocolViolation { node, address, detail } => write!(
                f,
                "protocol invariant violated at node {node}, address 0x{address:02X}: {detail}"
            ),
        }
    }
}

impl std::error::Error for SimError {}
