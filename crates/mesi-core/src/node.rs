//! A single processor node: cache + directory + instruction stream + the blocking
//! discipline that ties them together.
//!
//! [`Node`] is deliberately transport-agnostic — `dispatch` and `advance` return the
//! [`Effect`]s they produce instead of sending them, so the protocol can be exercised
//! in tests without spinning up threads or a real [`crate::runtime::Transport`].
//! [`crate::runtime`] is what actually drains inboxes and calls these methods in a
//! loop.
//!
//! ## Invariants asserted here (see `SPEC_FULL.md` §8 for the full P1-P5 list)
//! - (P1/P2) At most one outstanding transaction per node at a time — the protocol's
//!   blocking discipline guarantees this; `debug_assert!` catches a violation early
//!   rather than letting it manifest as a corrupted cache line.
//! - (P4) A cache slot never holds two different valid addresses — enforced by
//!   construction in [`crate::cache::CacheEngine`].

use tracing::{debug, trace};

use crate::addr::{self, NodeId};
use crate::cache::{CacheEngine, IssueOutcome};
use crate::directory::DirectoryEngine;
use crate::instruction::Instruction;
use crate::message::{Effect, Message};
use crate::MEM_SIZE;

#[derive(Clone)]
pub struct Node {
    pub id: NodeId,
    cache: CacheEngine,
    directory: DirectoryEngine,
    instructions: Vec<Instruction>,
    /// -1 before the first instruction is issued, matching the reference's
    /// `instr_counter`.
    ip: isize,
    /// Count of outstanding coherence transactions. The protocol only ever has at
    /// most one in flight per node; modeled as a counter rather than a bool purely
    /// so a violation shows up as a `debug_assert!` instead of silently clobbering
    /// state.
    awaiting_response: u8,
    /// The value of the write instruction currently in flight. Consumed exactly once
    /// by whichever reply unblocks that instruction (`REPLY_WR`, `REPLY_ID`, or
    /// `FLUSH_INVACK` at the requester).
    pending_write_value: Option<u8>,
    trace: Option<Vec<Message>>,
}

impl Node {
    pub fn new(id: NodeId, instructions: Vec<Instruction>) -> Self {
        Self {
            id,
            cache: CacheEngine::new(),
            directory: DirectoryEngine::new(id),
            instructions,
            ip: -1,
            awaiting_response: 0,
            pending_write_value: None,
            trace: None,
        }
    }

    pub fn enable_trace(&mut self) {
        self.trace = Some(Vec::new());
    }

    pub fn trace(&self) -> Option<&[Message]> {
        self.trace.as_deref()
    }

    pub fn cache(&self) -> &CacheEngine {
        &self.cache
    }

    pub fn directory(&self) -> &DirectoryEngine {
        &self.directory
    }

    pub fn memory(&self) -> &[u8; MEM_SIZE] {
        self.directory.memory()
    }

    pub fn awaiting_response(&self) -> bool {
        self.awaiting_response > 0
    }

    /// True once every instruction in this node's stream has been issued. A node can
    /// keep mutating its own cache/directory well after this is true, servicing other
    /// nodes' requests as a home or owner -- so this is not "done forever", just
    /// "nothing left of its own to issue".
    pub fn instructions_exhausted(&self) -> bool {
        (self.ip + 1) as usize >= self.instructions.len()
    }

    fn complete_transaction(&mut self) {
        debug_assert!(self.awaiting_response > 0, "reply arrived with no outstanding transaction");
        self.awaiting_response = self.awaiting_response.saturating_sub(1);
    }

    fn take_pending_write_value(&mut self) -> u8 {
        self.pending_write_value
            .take()
            .expect("a write-unblocking reply arrived with no pending write value")
    }

    /// Dispatch one inbound message, returning the effects (outbound messages) it
    /// produces. Routes by `TxType` to the directory engine (home-side), the cache
    /// engine (requester/owner-side), or both when this node is acting as its own
    /// home or its own requester.
    pub fn dispatch(&mut self, msg: Message) -> Vec<Effect> {
        if let Some(trace) = &mut self.trace {
            trace.push(msg.clone());
        }
        trace!(node = self.id, kind = msg.kind_name(), address = format!("0x{:02X}", msg.address()), "dispatch");

        let address = msg.address();
        let home = addr::home(address);

        match msg {
            Message::ReadRequest { sender, address } => self.directory.on_read_request(sender, address),
            Message::WriteRequest { sender, address, value } => {
                self.directory.on_write_request(sender, address, value)
            }
            Message::Upgrade { sender, address } => self.directory.on_upgrade(sender, address),
            Message::EvictShared { evictor, address } => self.directory.on_evict_shared(evictor, address),
            Message::EvictModified { address, value } => {
                self.directory.on_evict_modified(address, value);
                Vec::new()
            }
            Message::SharerPromote { address, value } => {
                self.cache.promote_to_exclusive(address, value);
                Vec::new()
            }
            Message::ReplyRd { address, value, state } => {
                let effects = self.cache.on_reply_rd(self.id, address, value, state);
                self.complete_transaction();
                effects
            }
            Message::ReplyWr { address } => {
                let pending = self.take_pending_write_value();
                let effects = self.cache.on_reply_wr(self.id, address, pending);
                self.complete_transaction();
                effects
            }
            Message::ReplyId { address, sharers } => {
                let pending = self.take_pending_write_value();
                let effects = self.cache.on_reply_id(self.id, address, sharers, pending);
                self.complete_transaction();
                effects
            }
            Message::Inv { address } => {
                self.cache.on_inv(address);
                Vec::new()
            }
            Message::WritebackInt { address, second_receiver } => {
                self.cache.on_writeback_int(self.id, address, second_receiver)
            }
            Message::WritebackInv { address, value: _, second_receiver } => {
                self.cache.on_writeback_inv(address, second_receiver)
            }
            Message::Flush { address, value, second_receiver } => {
                let mut effects = Vec::new();
                if self.id == home {
                    self.directory.on_flush_home(address, value, second_receiver);
                }
                if self.id == second_receiver {
                    effects = self.cache.on_flush_requester(self.id, address, value);
                    self.complete_transaction();
                }
                effects
            }
            Message::FlushInvAck { address, value, second_receiver } => {
                let mut effects = Vec::new();
                if self.id == home {
                    self.directory.on_flush_invack_home(address, value, second_receiver);
                }
                if self.id == second_receiver {
                    let pending = self.take_pending_write_value();
                    effects = self.cache.on_flush_invack_requester(self.id, address, pending);
                    self.complete_transaction();
                }
                effects
            }
        }
    }

    /// Issue the next instruction, if any and if not already blocked. Returns `None`
    /// once every instruction has been issued — the caller should emit the final
    /// state dump the first time it sees `None`.
    pub fn advance(&mut self) -> Option<Vec<Effect>> {
        let next_ip = self.ip + 1;
        if next_ip as usize >= self.instructions.len() {
            return None;
        }
        self.ip = next_ip;
        let instr = self.instructions[self.ip as usize];
        Some(self.issue_instruction(instr))
    }

    /// Issue `instr` directly, bypassing the node's own instruction stream. Exposed
    /// for tests that need to sequence specific instructions across nodes without
    /// constructing a full `core_<k>.txt`-shaped stream; production code only ever
    /// calls [`Node::advance`].
    pub fn advance_with(&mut self, instr: Instruction) -> Vec<Effect> {
        self.issue_instruction(instr)
    }

    fn issue_instruction(&mut self, instr: Instruction) -> Vec<Effect> {
        if let Instruction::Write { value, .. } = instr {
            self.pending_write_value = Some(value);
        }

        debug!(node = self.id, ip = self.ip, ?instr, "issue");

        match self.cache.issue(self.id, instr) {
            IssueOutcome::Completed => Vec::new(),
            IssueOutcome::Blocked(effects) => {
                self.awaiting_response += 1;
                debug_assert!(self.awaiting_response <= 1, "at most one outstanding transaction per node");
                effects
            }
        }
    }
}
