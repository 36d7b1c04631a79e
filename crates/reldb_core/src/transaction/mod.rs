//! The per-client transaction stack.
//!
//! Each client session owns one [`TxnStack`]. Entering a transaction
//! pushes a [`Frame`]; mutations record copy-on-write overlays into the
//! innermost frame; a normal inner exit merges overlays into the parent,
//! and the outermost exit flushes them through the store (the flush
//! itself lives in the database facade, which owns the store handle).

mod frame;

pub(crate) use frame::{Frame, Overlay};

/// A stack of transaction frames for one client.
#[derive(Debug, Default)]
pub(crate) struct TxnStack {
    frames: Vec<Frame>,
}

impl TxnStack {
    /// Current nesting depth.
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether any transaction is open.
    pub(crate) fn in_txn(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Pushes a fresh frame.
    pub(crate) fn push(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Pops the innermost frame.
    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// The innermost frame, if a transaction is open.
    pub(crate) fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Merges `frame` into the new innermost frame after an inner commit.
    pub(crate) fn merge(&mut self, frame: Frame) {
        if let Some(parent) = self.frames.last_mut() {
            frame.merge_into(parent);
        }
    }

    /// Looks `name` up through the frame overlays, innermost first.
    pub(crate) fn view(&self, name: &str) -> Option<&Overlay> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Every relation name overlaid anywhere in the stack.
    pub(crate) fn overlaid_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .frames
            .iter()
            .flat_map(|frame| frame.names().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Discards every frame (used when a session's database closes).
    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}
