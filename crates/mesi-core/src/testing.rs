//! Cross-node invariant checks.
//!
//! - (P1) For each address A, at most one cache holds A in `Modified` or `Exclusive`.
//! - (P2) If any cache holds A in `Modified`, the home's directory for A is `Em` and
//!   `sharers` is the singleton set of that holder.
//! - (P3) The home directory's `sharers` for A in state `S` equals the set of caches
//!   holding A in `Shared` (only checked at quiescence; may be momentarily violated
//!   mid-transaction).
//! - (P4) A cache slot never holds a valid line for an address other than its
//!   resident's (guaranteed by construction, checked here as a defense in depth).
//!
//! P5 (memory/directory agreement) is checked only at quiescence by callers, since
//! mid-transaction the home's `memory[]` can lag the owner's dirty cache value by
//! design.

use crate::addr;
use crate::cache::MesiState;
use crate::directory::DirState;
use crate::error::SimError;
use crate::node::Node;

/// Check P1/P2/P4 across a snapshot of every node. Pass `check_shared` (P3) only when
/// the caller believes the system is quiescent.
pub fn check_invariants(nodes: &[Node], check_shared: bool) -> Result<(), SimError> {
    check_p1_p2(nodes)?;
    check_p4(nodes)?;
    if check_shared {
        check_p3(nodes)?;
    }
    Ok(())
}

fn check_p1_p2(nodes: &[Node]) -> Result<(), SimError> {
    for node in nodes {
        for line in node.cache().lines() {
            if line.state != MesiState::Modified && line.state != MesiState::Exclusive {
                continue;
            }
            let home = addr::home(line.address);
            let home_node = &nodes[home as usize];
            let offset = addr::offset(line.address) as usize;
            let entry = &home_node.directory().entries()[offset];

            if line.state == MesiState::Modified || line.state == MesiState::Exclusive {
                for other in nodes {
                    if other.id == node.id {
                        continue;
                    }
                    let other_line = other.cache().line(line.address);
                    if other_line.address == line.address
                        && (other_line.state == MesiState::Modified || other_line.state == MesiState::Exclusive)
                    {
                        return Err(SimError::ProtocolViolation {
                            node: other.id,
                            address: line.address,
                            detail: format!(
                                "P1 violated: nodes {} and {} both hold address 0x{:02X} in {:?}/{:?}",
                                node.id, other.id, line.address, line.state, other_line.state
                            ),
                        });
                    }
                }
            }

            if line.state == MesiState::Modified
                && !(entry.state == DirState::Em && entry.sharers.contains(node.id) && entry.sharers.popcount() == 1)
            {
                return Err(SimError::ProtocolViolation {
                    node: node.id,
                    address: line.address,
                    detail: format!(
                        "P2 violated: node {} holds Modified but home directory state is {:?} sharers={}",
                        node.id, entry.state, entry.sharers
                    ),
                });
            }
        }
    }
    Ok(())
}

fn check_p3(nodes: &[Node]) -> Result<(), SimError> {
    for home_node in nodes {
        for (offset, entry) in home_node.directory().entries().iter().enumerate() {
            if entry.state != DirState::S {
                continue;
            }
            let address = (home_node.id << 4) | offset as u8;
            for node in nodes {
                let holds_shared = {
                    let line = node.cache().line(address);
                    line.address == address && line.state == MesiState::Shared
                };
                if holds_shared != entry.sharers.contains(node.id) {
                    return Err(SimError::ProtocolViolation {
                        node: node.id,
                        address,
                        detail: format!(
                            "P3 violated: directory sharers={} disagrees with node {}'s cache state",
                            entry.sharers, node.id
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

fn check_p4(nodes: &[Node]) -> Result<(), SimError> {
    for node in nodes {
        for (slot, line) in node.cache().lines().iter().enumerate() {
            if line.state == MesiState::Invalid {
                continue;
            }
            if addr::cache_slot(line.address) != slot {
                return Err(SimError::ProtocolViolation {
                    node: node.id,
                    address: line.address,
                    detail: format!("P4 violated: address 0x{:02X} resident in wrong slot {slot}", line.address),
                });
            }
        }
    }
    Ok(())
}
