//! Instruction grammar and loader.
//!
//! Instruction files live at `tests/<dir>/core_<k>.txt`, one node per file. Each line
//! is either `RD <hex_addr>` or `WR <hex_addr> <decimal_value>`. Lines beyond
//! `MAX_INSTR` are ignored; malformed lines are logged and skipped.

use std::path::Path;

use tracing::warn;

use crate::error::SimError;
use crate::MAX_INSTR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Read { address: u8 },
    Write { address: u8, value: u8 },
}

impl Instruction {
    pub fn address(self) -> u8 {
        match self {
            Instruction::Read { address } | Instruction::Write { address, .. } => address,
        }
    }
}

/// Parse a single instruction-file line. Returns `Ok(None)` for a blank line and
/// `Err` for anything that isn't a well-formed `RD`/`WR` line.
fn parse_line(line: &str) -> Result<Option<Instruction>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let mut parts = line.split_whitespace();
    let kind = parts.next().ok_or("empty line")?;
    match kind {
        "RD" => {
            let addr_str = parts.next().ok_or("RD missing address")?;
            let address =
                u8::from_str_radix(addr_str, 16).map_err(|e| format!("invalid hex address {addr_str:?}: {e}"))?;
            Ok(Some(Instruction::Read { address }))
        }
        "WR" => {
            let addr_str = parts.next().ok_or("WR missing address")?;
            let value_str = parts.next().ok_or("WR missing value")?;
            let address =
                u8::from_str_radix(addr_str, 16).map_err(|e| format!("invalid hex address {addr_str:?}: {e}"))?;
            let value: u8 = value_str.parse().map_err(|e| format!("invalid decimal value {value_str:?}: {e}"))?;
            Ok(Some(Instruction::Write { address, value }))
        }
        other => Err(format!("unrecognized instruction kind {other:?}")),
    }
}

/// Load up to `MAX_INSTR` instructions from `tests/<dir>/core_<node_id>.txt`.
/// Malformed lines are logged via `tracing::warn!` and skipped; this never fails for
/// parse problems, only for the file being unreadable.
pub fn load(test_dir: &Path, node_id: u8) -> Result<Vec<Instruction>, SimError> {
    let path = test_dir.join(format!("core_{node_id}.txt"));
    let text = std::fs::read_to_string(&path).map_err(|e| {
        SimError::Config(format!("could not open instruction file {}: {e}", path.display()))
    })?;
    parse_source(&text, &path.display().to_string())
}

fn parse_source(text: &str, file_label: &str) -> Result<Vec<Instruction>, SimError> {
    let mut instructions = Vec::with_capacity(MAX_INSTR);
    for raw_line in text.lines() {
        if instructions.len() >= MAX_INSTR {
            break;
        }
        match parse_line(raw_line) {
            Ok(Some(instr)) => instructions.push(instr),
            Ok(None) => {}
            Err(reason) => {
                warn!(file = file_label, line = raw_line, reason, "skipping malformed instruction line");
            }
        }
    }
    Ok(instructions)
}
