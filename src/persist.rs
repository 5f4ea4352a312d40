//! File persistence for models, memories, and state snapshots.
//!
//! Files hold exactly the binary forms produced by `Model::to_bytes`,
//! `Memory::to_bytes`, and `states_to_bytes`. A missing or empty file is
//! not special-cased here: reading an empty file gives the same defaults as
//! reading an empty byte slice.
//!
//! ```text
//! state snapshot:  i32 count, then count f32 values
//! ```

use std::path::Path;

use crate::codec::{Reader, Writer};
use crate::error::{EslError, Result};
use crate::memory::Memory;
use crate::model::Model;

// ─── Models and memories ───────────────────────────────────────────

pub fn save_model(path: &Path, model: &Model) -> Result<()> {
    std::fs::write(path, model.to_bytes()?)?;
    log::debug!("saved model to {}", path.display());
    Ok(())
}

/// Load a model; restored states are zero and its memory is empty.
pub fn load_model(path: &Path) -> Result<Model> {
    let bytes = std::fs::read(path)?;
    Model::from_bytes(&bytes)
}

pub fn save_memory(path: &Path, memory: &Memory) -> Result<()> {
    std::fs::write(path, memory.to_bytes()?)?;
    log::debug!(
        "saved memory to {} ({} nodes, depth {})",
        path.display(),
        memory.node_count(),
        memory.depth()
    );
    Ok(())
}

pub fn load_memory(path: &Path) -> Result<Memory> {
    let bytes = std::fs::read(path)?;
    Memory::from_bytes(&bytes)
}

/// Load a memory file into `model`, checking its dimensions.
pub fn attach_memory(path: &Path, model: &mut Model) -> Result<()> {
    let memory = load_memory(path)?;
    model.set_memory(memory)
}

// ─── State snapshots ───────────────────────────────────────────────

pub fn write_states(w: &mut Writer, states: &[f32]) -> Result<()> {
    w.write_len(states.len())?;
    for &s in states {
        w.write_f32(s);
    }
    Ok(())
}

pub fn read_states(r: &mut Reader<'_>) -> Result<Vec<f32>> {
    let count = r.read_len("state count")?;
    r.ensure(count.saturating_mul(4), "states")?;
    (0..count).map(|_| r.read_f32()).collect()
}

pub fn states_to_bytes(states: &[f32]) -> Result<Vec<u8>> {
    let mut w = Writer::new();
    write_states(&mut w, states)?;
    Ok(w.into_bytes())
}

/// Parse a snapshot; trailing bytes are rejected.
pub fn states_from_bytes(bytes: &[u8]) -> Result<Vec<f32>> {
    let mut r = Reader::new(bytes);
    let states = read_states(&mut r)?;
    if !r.is_at_end() {
        return Err(EslError::CorruptData(format!(
            "{} trailing bytes after state snapshot",
            r.remaining()
        )));
    }
    Ok(states)
}

pub fn save_states(path: &Path, states: &[f32]) -> Result<()> {
    std::fs::write(path, states_to_bytes(states)?)?;
    Ok(())
}

pub fn load_states(path: &Path) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path)?;
    states_from_bytes(&bytes)
}
