//! Final per-node state dump, written once a node has issued every instruction in its
//! stream and is no longer awaiting a reply.
//!
//! Layout mirrors the reference's `printProcessorState` (memory, then directory
//! entries, then cache lines) but is not required to be byte-exact — the spec only
//! asks that a reader can reconstruct the same information.

use std::fs;
use std::path::Path;

use crate::directory::DirState;
use crate::error::SimError;
use crate::node::Node;

pub fn render(node: &Node) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== node {} ===\n", node.id));

    out.push_str("-- memory --\n");
    for (offset, value) in node.memory().iter().enumerate() {
        out.push_str(&format!("  [{offset:02}] 0x{value:02X}\n"));
    }

    out.push_str("-- directory --\n");
    for (offset, entry) in node.directory().entries().iter().enumerate() {
        let state = match entry.state {
            DirState::Em => "EM",
            DirState::S => "S",
            DirState::U => "U",
        };
        out.push_str(&format!("  [{offset:02}] state={state} sharers={}\n", entry.sharers));
    }

    out.push_str("-- cache --\n");
    for (slot, line) in node.cache().lines().iter().enumerate() {
        out.push_str(&format!(
            "  [{slot}] address=0x{:02X} value={} state={:?}\n",
            line.address, line.value, line.state
        ));
    }

    out
}

/// Write `render(node)` to `<output_dir>/core_<id>_output.txt`.
pub fn write(node: &Node, output_dir: &Path) -> Result<(), SimError> {
    fs::create_dir_all(output_dir)
        .map_err(|e| SimError::Config(format!("could not create output dir {}: {e}", output_dir.display())))?;
    let path = output_dir.join(format!("core_{}_output.txt", node.id));
    fs::write(&path, render(node)).map_err(|e| SimError::Config(format!("could not write {}: {e}", path.display())))
}
