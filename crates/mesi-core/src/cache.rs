//! Per-node cache engine: MESI state for the `CACHE_SIZE` local lines.
//!
//! Holds only requester-side and owner-side logic. Home-side directory bookkeeping
//! lives in [`crate::directory`]; [`crate::node::Node`] wires the two together and
//! owns the cross-cutting bits (`awaiting_response`, `pending_write_value`) that span
//! both engines.

use crate::addr::{self, NodeId};
use crate::bitvec::Bitvector;
use crate::instruction::Instruction;
use crate::message::{Effect, Message, ReplyRdState};
use crate::CACHE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MesiState {
    Modified,
    Exclusive,
    Shared,
    Invalid,
}

/// One cache line. `address = 0xFF` with `state = Invalid` is the initial sentinel —
/// no valid address ever has all four address bits of both nibbles set given
/// `N_PROCS`/`MEM_SIZE` are both 16 or fewer, so `0xFF` can never collide with a real
/// line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLine {
    pub address: u8,
    pub value: u8,
    pub state: MesiState,
}

impl CacheLine {
    const INVALID: CacheLine = CacheLine { address: 0xFF, value: 0, state: MesiState::Invalid };
}

/// Outcome of issuing an instruction: either it completed against the local cache
/// with no message traffic, or it blocked on a coherence transaction.
pub enum IssueOutcome {
    Completed,
    Blocked(Vec<Effect>),
}

#[derive(Clone)]
pub struct CacheEngine {
    lines: [CacheLine; CACHE_SIZE],
}

impl CacheEngine {
    pub fn new() -> Self {
        Self { lines: [CacheLine::INVALID; CACHE_SIZE] }
    }

    pub fn line(&self, address: u8) -> &CacheLine {
        &self.lines[addr::cache_slot(address)]
    }

    pub fn lines(&self) -> &[CacheLine; CACHE_SIZE] {
        &self.lines
    }

    fn is_hit(&self, address: u8) -> bool {
        let line = &self.lines[addr::cache_slot(address)];
        line.address == address && line.state != MesiState::Invalid
    }

    /// Evict the slot's resident if it holds a *different* valid address. Used by
    /// handlers the spec describes as "evict if different and valid".
    fn evict_if_different(&mut self, evictor: NodeId, incoming_address: u8) -> Vec<Effect> {
        let slot = addr::cache_slot(incoming_address);
        let resident = self.lines[slot];
        if resident.address != incoming_address && resident.state != MesiState::Invalid {
            Self::eviction_effect(evictor, resident)
        } else {
            Vec::new()
        }
    }

    /// Evict the slot's resident unconditionally if valid, regardless of whether its
    /// address matches the incoming one. Used only by `REPLY_WR`, per spec: "the
    /// transport guarantees no in-flight duplicate" so an address match would be
    /// coincidental, not a sign the line can be kept.
    fn evict_unconditionally(&mut self, evictor: NodeId, incoming_address: u8) -> Vec<Effect> {
        let slot = addr::cache_slot(incoming_address);
        let resident = self.lines[slot];
        if resident.state != MesiState::Invalid {
            Self::eviction_effect(evictor, resident)
        } else {
            Vec::new()
        }
    }

    fn eviction_effect(evictor: NodeId, resident: CacheLine) -> Vec<Effect> {
        let home = addr::home(resident.address);
        match resident.state {
            MesiState::Exclusive | MesiState::Shared => {
                vec![Effect::new(home, Message::EvictShared { evictor, address: resident.address })]
            }
            MesiState::Modified => {
                vec![Effect::new(home, Message::EvictModified { address: resident.address, value: resident.value })]
            }
            MesiState::Invalid => Vec::new(),
        }
    }

    fn install(&mut self, address: u8, value: u8, state: MesiState) {
        self.lines[addr::cache_slot(address)] = CacheLine { address, value, state };
    }

    /// Issue an instruction against the local cache. Returns the messages to send (if
    /// any); the caller is responsible for tracking the outstanding transaction.
    pub fn issue(&mut self, self_id: NodeId, instr: Instruction) -> IssueOutcome {
        let address = instr.address();
        match instr {
            Instruction::Read { .. } => {
                if self.is_hit(address) {
                    IssueOutcome::Completed
                } else {
                    let home = addr::home(address);
                    IssueOutcome::Blocked(vec![Effect::new(home, Message::ReadRequest { sender: self_id, address })])
                }
            }
            Instruction::Write { address, value } => {
                if self.is_hit(address) {
                    let slot = addr::cache_slot(address);
                    match self.lines[slot].state {
                        MesiState::Modified | MesiState::Exclusive => {
                            self.lines[slot].value = value;
                            self.lines[slot].state = MesiState::Modified;
                            IssueOutcome::Completed
                        }
                        MesiState::Shared => {
                            let home = addr::home(address);
                            IssueOutcome::Blocked(vec![Effect::new(home, Message::Upgrade { sender: self_id, address })])
                        }
                        MesiState::Invalid => unreachable!("is_hit excludes Invalid"),
                    }
                } else {
                    let home = addr::home(address);
                    IssueOutcome::Blocked(vec![Effect::new(
                        home,
                        Message::WriteRequest { sender: self_id, address, value },
                    )])
                }
            }
        }
    }

    pub fn on_reply_rd(&mut self, self_id: NodeId, address: u8, value: u8, state: ReplyRdState) -> Vec<Effect> {
        let effects = self.evict_if_different(self_id, address);
        let installed = match state {
            ReplyRdState::Shared => MesiState::Shared,
            ReplyRdState::Exclusive => MesiState::Exclusive,
        };
        self.install(address, value, installed);
        effects
    }

    pub fn on_reply_wr(&mut self, self_id: NodeId, address: u8, pending_write_value: u8) -> Vec<Effect> {
        let effects = self.evict_unconditionally(self_id, address);
        self.install(address, pending_write_value, MesiState::Modified);
        effects
    }

    pub fn on_reply_id(
        &mut self,
        self_id: NodeId,
        address: u8,
        sharers: Bitvector,
        pending_write_value: u8,
    ) -> Vec<Effect> {
        let mut effects: Vec<Effect> =
            sharers.iter().map(|n| Effect::new(n, Message::Inv { address })).collect();
        effects.extend(self.evict_if_different(self_id, address));
        self.install(address, pending_write_value, MesiState::Modified);
        effects
    }

    pub fn on_inv(&mut self, address: u8) {
        let slot = addr::cache_slot(address);
        if self.lines[slot].address == address {
            self.lines[slot].state = MesiState::Invalid;
        }
    }

    /// Owner O received a `WRITEBACK_INT` naming requester R as `second_receiver`.
    pub fn on_writeback_int(&mut self, self_id: NodeId, address: u8, second_receiver: NodeId) -> Vec<Effect> {
        let slot = addr::cache_slot(address);
        let value = self.lines[slot].value;
        self.lines[slot].state = MesiState::Shared;
        let home = addr::home(address);
        let msg = Message::Flush { address, value, second_receiver };
        let mut effects = vec![Effect::new(home, msg.clone())];
        if home != second_receiver {
            effects.push(Effect::new(second_receiver, msg));
        }
        let _ = self_id;
        effects
    }

    /// Owner O received a `WRITEBACK_INV` naming requester R as `second_receiver`.
    /// Sends `FLUSH_INVACK` to both home and R unconditionally, even when they
    /// coincide — matching the reference exactly (unlike `WRITEBACK_INT`/`FLUSH`,
    /// which dedupe when home == second_receiver).
    pub fn on_writeback_inv(&mut self, address: u8, second_receiver: NodeId) -> Vec<Effect> {
        let slot = addr::cache_slot(address);
        let value = self.lines[slot].value;
        self.lines[slot].state = MesiState::Invalid;
        let home = addr::home(address);
        let msg = Message::FlushInvAck { address, value, second_receiver };
        vec![Effect::new(home, msg.clone()), Effect::new(second_receiver, msg)]
    }

    /// Requester-side `FLUSH` handling (only invoked when this node is the
    /// `second_receiver`).
    pub fn on_flush_requester(&mut self, self_id: NodeId, address: u8, value: u8) -> Vec<Effect> {
        let effects = self.evict_if_different(self_id, address);
        self.install(address, value, MesiState::Shared);
        effects
    }

    /// Requester-side `FLUSH_INVACK` handling (only invoked when this node is the
    /// `second_receiver`).
    pub fn on_flush_invack_requester(&mut self, self_id: NodeId, address: u8, pending_write_value: u8) -> Vec<Effect> {
        let effects = self.evict_if_different(self_id, address);
        self.install(address, pending_write_value, MesiState::Modified);
        effects
    }

    /// A departing sharer's eviction left this node as the sole remaining sharer;
    /// promote the line to `Exclusive` with the authoritative memory value.
    pub fn promote_to_exclusive(&mut self, address: u8, value: u8) {
        let slot = addr::cache_slot(address);
        if self.lines[slot].address == address {
            self.lines[slot].value = value;
            self.lines[slot].state = MesiState::Exclusive;
        }
    }
}

impl Default for CacheEngine {
    fn default() -> Self {
        Self::new()
    }
}
