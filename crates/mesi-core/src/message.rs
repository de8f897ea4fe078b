//! Coherence message taxonomy.
//!
//! The reference protocol (see `examples/original_source/assignment.c`) models a
//! message as a single flat struct carrying every field any `transactionType` might
//! need. This crate models it as a Rust sum type instead: one variant per `TxType`,
//! carrying only the fields that transaction actually uses. This makes illegal states
//! (e.g. a `Upgrade` with a `dir_state_hint` that transaction never reads) unrepresentable.
//!
//! `EVICT_SHARED` in the reference does double duty: a departing sharer sends it to its
//! home to drop its membership, and the home resends a differently-shaped notice of the
//! same `transactionType` to the sole remaining sharer so it can promote to `Exclusive`.
//! Those two uses are split here into [`Message::EvictShared`] and
//! [`Message::SharerPromote`] — same wire transaction in the original, two distinct
//! typed messages here.

use crate::addr::NodeId;
use crate::bitvec::Bitvector;

/// What state a `REPLY_RD` recipient should install its new cache line in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyRdState {
    /// Directory was `S`: other sharers may still hold this block.
    Shared,
    /// Directory was `U`: this node becomes the sole holder.
    Exclusive,
}

/// A coherence protocol message, tagged by its role. Carries only the fields that
/// role's handler reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Requester R wants to read `address`; sent to the home.
    ReadRequest { sender: NodeId, address: u8 },
    /// Requester R wants to write `value` to `address`; sent to the home.
    WriteRequest { sender: NodeId, address: u8, value: u8 },
    /// Home's reply to a `ReadRequest`, carrying the current memory value.
    ReplyRd { address: u8, value: u8, state: ReplyRdState },
    /// Home's reply to a `WriteRequest` when the directory was `U`.
    ReplyWr { address: u8 },
    /// Home's reply granting ownership; `sharers` lists nodes the requester must
    /// invalidate (its own prior membership, if any, already excluded).
    ReplyId { address: u8, sharers: Bitvector },
    /// Home (or a former owner, via [`Message::ReplyId`] fan-out) telling a sharer to
    /// drop its copy.
    Inv { address: u8 },
    /// A current `Shared` holder requesting promotion to `Modified`; sent to the home.
    Upgrade { sender: NodeId, address: u8 },
    /// Home forwarding a write-intent to the current owner O, naming the new
    /// requester R as `second_receiver`. O must reply with `FlushInvAck` and
    /// invalidate its own copy. `value` is the requester's pending write value,
    /// forwarded for informational purposes only — O's own `FlushInvAck` value wins.
    WritebackInv { address: u8, value: u8, second_receiver: NodeId },
    /// Home forwarding a read-intent (intervention) to the current owner O, naming the
    /// reader R as `second_receiver`. O must reply with `Flush` and downgrade to
    /// `Shared`.
    WritebackInt { address: u8, second_receiver: NodeId },
    /// Owner's response to a `WritebackInt`: its current value, delivered to the home
    /// and to the new reader R.
    Flush { address: u8, value: u8, second_receiver: NodeId },
    /// Owner's response to a `WritebackInv`: its current (pre-invalidation) value,
    /// delivered to the home and to the new writer R.
    FlushInvAck { address: u8, value: u8, second_receiver: NodeId },
    /// A node evicting a `Shared`/`Exclusive` line notifies its home.
    EvictShared { evictor: NodeId, address: u8 },
    /// A node evicting a `Modified` line writes its value back to its home.
    EvictModified { address: u8, value: u8 },
    /// Home's notice to the sole remaining sharer that it may promote to `Exclusive`,
    /// carrying the authoritative memory value. Sent only as a consequence of another
    /// sharer's [`Message::EvictShared`].
    SharerPromote { address: u8, value: u8 },
}

impl Message {
    /// Address this message concerns. Every variant carries one.
    pub fn address(&self) -> u8 {
        match self {
            Message::ReadRequest { address, .. }
            | Message::WriteRequest { address, .. }
            | Message::ReplyRd { address, .. }
            | Message::ReplyWr { address }
            | Message::ReplyId { address, .. }
            | Message::Inv { address }
            | Message::Upgrade { address, .. }
            | Message::WritebackInv { address, .. }
            | Message::WritebackInt { address, .. }
            | Message::Flush { address, .. }
            | Message::FlushInvAck { address, .. }
            | Message::EvictShared { address, .. }
            | Message::EvictModified { address, .. }
            | Message::SharerPromote { address, .. } => *address,
        }
    }

    /// Short tag for logging, mirroring the reference's `transactionType` names.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::ReadRequest { .. } => "READ_REQUEST",
            Message::WriteRequest { .. } => "WRITE_REQUEST",
            Message::ReplyRd { .. } => "REPLY_RD",
            Message::ReplyWr { .. } => "REPLY_WR",
            Message::ReplyId { .. } => "REPLY_ID",
            Message::Inv { .. } => "INV",
            Message::Upgrade { .. } => "UPGRADE",
            Message::WritebackInv { .. } => "WRITEBACK_INV",
            Message::WritebackInt { .. } => "WRITEBACK_INT",
            Message::Flush { .. } => "FLUSH",
            Message::FlushInvAck { .. } => "FLUSH_INVACK",
            Message::EvictShared { .. } => "EVICT_SHARED",
            Message::EvictModified { .. } => "EVICT_MODIFIED",
            Message::SharerPromote { .. } => "EVICT_SHARED", // promotion notice, same wire tx
        }
    }
}

/// An outbound message produced by dispatching an inbound one or issuing an
/// instruction. Engines return these instead of sending directly, which keeps
/// [`crate::cache::CacheEngine`] and [`crate::directory::DirectoryEngine`] testable
/// without a real [`crate::runtime::Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub to: NodeId,
    pub msg: Message,
}

impl Effect {
    pub fn new(to: NodeId, msg: Message) -> Self {
        Self { to, msg }
    }
}
