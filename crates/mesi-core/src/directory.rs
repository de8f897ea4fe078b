//! Per-node directory engine: tracks `directory[offset]` for every offset this node
//! homes, and the authoritative `memory[offset]` backing it.

use crate::addr;
use crate::bitvec::Bitvector;
use crate::message::{Effect, Message, ReplyRdState};
use crate::addr::NodeId;
use crate::MEM_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirState {
    /// Exclusive-or-Modified: exactly one cache owns the block.
    Em,
    /// Shared: one or more caches hold it read-only.
    S,
    /// Unowned: no cache holds the block.
    U,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectoryEntry {
    pub sharers: Bitvector,
    pub state: DirState,
}

impl DirectoryEntry {
    const UNOWNED: DirectoryEntry = DirectoryEntry { sharers: Bitvector::EMPTY, state: DirState::U };
}

#[derive(Clone)]
pub struct DirectoryEngine {
    entries: [DirectoryEntry; MEM_SIZE],
    memory: [u8; MEM_SIZE],
}

impl DirectoryEngine {
    /// `node_id`'s memory slice is seeded `20 * node_id + offset`, matching the
    /// reference's `initializeProcessor`.
    pub fn new(node_id: NodeId) -> Self {
        let mut memory = [0u8; MEM_SIZE];
        for (offset, slot) in memory.iter_mut().enumerate() {
            *slot = (20 * node_id as u32 + offset as u32) as u8;
        }
        Self { entries: [DirectoryEntry::UNOWNED; MEM_SIZE], memory }
    }

    pub fn entries(&self) -> &[DirectoryEntry; MEM_SIZE] {
        &self.entries
    }

    pub fn memory(&self) -> &[u8; MEM_SIZE] {
        &self.memory
    }

    pub fn on_read_request(&mut self, sender: NodeId, address: u8) -> Vec<Effect> {
        let offset = addr::offset(address) as usize;
        match self.entries[offset].state {
            DirState::U => {
                let value = self.memory[offset];
                self.entries[offset].state = DirState::Em;
                self.entries[offset].sharers = Bitvector::singleton(sender);
                vec![Effect::new(sender, Message::ReplyRd { address, value, state: ReplyRdState::Exclusive })]
            }
            DirState::S => {
                let value = self.memory[offset];
                self.entries[offset].sharers.set(sender);
                vec![Effect::new(sender, Message::ReplyRd { address, value, state: ReplyRdState::Shared })]
            }
            DirState::Em => {
                let owner = self.entries[offset]
                    .sharers
                    .lowest()
                    .expect("Em directory entry always has a sole owner");
                vec![Effect::new(owner, Message::WritebackInt { address, second_receiver: sender })]
            }
        }
    }

    /// Directory state is set to `Em` with `sharers = {sender}` on every branch,
    /// eagerly, *before* any invalidation from a prior `S` state is acknowledged —
    /// preserved exactly per the open question in the design notes. There are no
    /// explicit INV-ACK messages; coherence instead relies on stale requests being
    /// serialized through the now-`Em` home.
    pub fn on_write_request(&mut self, sender: NodeId, address: u8, value: u8) -> Vec<Effect> {
        let offset = addr::offset(address) as usize;
        let effects = match self.entries[offset].state {
            DirState::U => vec![Effect::new(sender, Message::ReplyWr { address })],
            DirState::S => {
                let others = self.entries[offset].sharers.without(sender);
                vec![Effect::new(sender, Message::ReplyId { address, sharers: others })]
            }
            DirState::Em => {
                let owner = self.entries[offset]
                    .sharers
                    .lowest()
                    .expect("Em directory entry always has a sole owner");
                vec![Effect::new(owner, Message::WritebackInv { address, value, second_receiver: sender })]
            }
        };
        self.entries[offset].state = DirState::Em;
        self.entries[offset].sharers = Bitvector::singleton(sender);
        effects
    }

    pub fn on_upgrade(&mut self, sender: NodeId, address: u8) -> Vec<Effect> {
        let offset = addr::offset(address) as usize;
        let others = self.entries[offset].sharers.without(sender);
        self.entries[offset].state = DirState::Em;
        self.entries[offset].sharers = Bitvector::singleton(sender);
        vec![Effect::new(sender, Message::ReplyId { address, sharers: others })]
    }

    pub fn on_evict_shared(&mut self, evictor: NodeId, address: u8) -> Vec<Effect> {
        let offset = addr::offset(address) as usize;
        self.entries[offset].sharers.clear(evictor);
        match self.entries[offset].sharers.popcount() {
            0 => {
                self.entries[offset].state = DirState::U;
                Vec::new()
            }
            1 => {
                self.entries[offset].state = DirState::Em;
                let sole = self.entries[offset].sharers.lowest().unwrap();
                let value = self.memory[offset];
                // Routed through the transport even when `sole == home`: self-addressed
                // messages are legal and keep this branch uniform (see node dispatch).
                vec![Effect::new(sole, Message::SharerPromote { address, value })]
            }
            _ => Vec::new(),
        }
    }

    pub fn on_evict_modified(&mut self, address: u8, value: u8) {
        let offset = addr::offset(address) as usize;
        self.memory[offset] = value;
        self.entries[offset].sharers = Bitvector::EMPTY;
        self.entries[offset].state = DirState::U;
    }

    /// Home-side half of `FLUSH` (see [`crate::cache::CacheEngine`] for the
    /// requester-side half; both may fire on the same node when home == requester).
    pub fn on_flush_home(&mut self, address: u8, value: u8, second_receiver: NodeId) {
        let offset = addr::offset(address) as usize;
        self.entries[offset].state = DirState::S;
        self.entries[offset].sharers = self.entries[offset].sharers.with(second_receiver);
        self.memory[offset] = value;
    }

    /// Home-side half of `FLUSH_INVACK`. Directory state was already flipped to `Em`
    /// eagerly on `WRITE_REQUEST`; only `sharers`/`memory` need updating.
    pub fn on_flush_invack_home(&mut self, address: u8, value: u8, second_receiver: NodeId) {
        let offset = addr::offset(address) as usize;
        self.entries[offset].sharers = Bitvector::singleton(second_receiver);
        self.memory[offset] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_seeded_per_node() {
        let dir = DirectoryEngine::new(2);
        assert_eq!(dir.memory()[0], 40);
        assert_eq!(dir.memory()[5], 45);
    }

    #[test]
    fn read_request_on_unowned_grants_exclusive() {
        let mut dir = DirectoryEngine::new(0);
        let effects = dir.on_read_request(1, 0x05);
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].to, 1);
        assert_eq!(dir.entries()[5].state, DirState::Em);
        assert!(dir.entries()[5].sharers.contains(1));
    }

    #[test]
    fn second_read_request_upgrades_to_shared() {
        let mut dir = DirectoryEngine::new(0);
        dir.on_read_request(1, 0x05);
        let effects = dir.on_read_request(2, 0x05);
        match &effects[0].msg {
            Message::ReplyRd { state, .. } => assert_eq!(*state, ReplyRdState::Shared),
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(dir.entries()[5].state, DirState::S);
        assert!(dir.entries()[5].sharers.contains(1));
        assert!(dir.entries()[5].sharers.contains(2));
    }

    #[test]
    fn write_request_eagerly_claims_em_from_shared() {
        let mut dir = DirectoryEngine::new(0);
        dir.on_read_request(1, 0x05);
        dir.on_read_request(2, 0x05); // now S, sharers = {1, 2}
        let effects = dir.on_write_request(1, 0x05, 42);
        match &effects[0].msg {
            Message::ReplyId { sharers, .. } => assert!(sharers.contains(2) && !sharers.contains(1)),
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(dir.entries()[5].state, DirState::Em);
        assert!(dir.entries()[5].sharers.contains(1));
        assert_eq!(dir.entries()[5].sharers.popcount(), 1);
    }

    #[test]
    fn evict_shared_to_single_remaining_sharer_promotes() {
        let mut dir = DirectoryEngine::new(0);
        dir.on_read_request(1, 0x05);
        dir.on_read_request(2, 0x05); // S, sharers = {1, 2}
        let effects = dir.on_evict_shared(1, 0x05);
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].to, 2);
        assert!(matches!(effects[0].msg, Message::SharerPromote { .. }));
        assert_eq!(dir.entries()[5].state, DirState::Em);
    }

    #[test]
    fn evict_shared_to_zero_sharers_goes_unowned() {
        let mut dir = DirectoryEngine::new(0);
        dir.on_read_request(1, 0x05);
        let effects = dir.on_evict_shared(1, 0x05);
        assert!(effects.is_empty());
        assert_eq!(dir.entries()[5].state, DirState::U);
    }
}
