//! Transaction frames and overlays.

use crate::catalog::RelEntry;
use std::collections::BTreeMap;

/// The pending state of one relation inside a frame.
#[derive(Debug, Clone)]
pub(crate) enum Overlay {
    /// The relation's full pending state (header, rows, key,
    /// constraints).
    Entry(RelEntry),
    /// The relation is removed in this frame.
    Removed,
}

/// One level of the transaction stack.
///
/// A frame owns a copy-on-write overlay for every relation first touched
/// while it was innermost. Untouched relations read through to the parent
/// frame, and ultimately to the committed catalog.
#[derive(Debug, Clone, Default)]
pub(crate) struct Frame {
    overlays: BTreeMap<String, Overlay>,
}

impl Frame {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Overlay> {
        self.overlays.get(name)
    }

    pub(crate) fn set_entry(&mut self, name: impl Into<String>, entry: RelEntry) {
        self.overlays.insert(name.into(), Overlay::Entry(entry));
    }

    pub(crate) fn set_removed(&mut self, name: impl Into<String>) {
        self.overlays.insert(name.into(), Overlay::Removed);
    }

    pub(crate) fn overlays(&self) -> impl Iterator<Item = (&String, &Overlay)> {
        self.overlays.iter()
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &String> {
        self.overlays.keys()
    }

    /// Moves this frame's overlays into `parent`, replacing whatever the
    /// parent had for the same relations.
    pub(crate) fn merge_into(self, parent: &mut Frame) {
        for (name, overlay) in self.overlays {
            parent.overlays.insert(name, overlay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{AttrType, Relation};
    use crate::header;

    fn entry(n_rows: usize) -> RelEntry {
        let mut rel = Relation::empty(header! { n: AttrType::Int });
        for i in 0..n_rows {
            rel.insert_unchecked(crate::row! { n: i as i64 });
        }
        RelEntry::new(rel)
    }

    #[test]
    fn overlays_replace_by_name() {
        let mut frame = Frame::new();
        frame.set_entry("r", entry(1));
        frame.set_entry("r", entry(2));
        match frame.get("r") {
            Some(Overlay::Entry(e)) => assert_eq!(e.relation.len(), 2),
            other => panic!("expected entry overlay, got {other:?}"),
        }
    }

    #[test]
    fn removed_shadows_entry() {
        let mut frame = Frame::new();
        frame.set_entry("r", entry(1));
        frame.set_removed("r");
        assert!(matches!(frame.get("r"), Some(Overlay::Removed)));
    }

    #[test]
    fn merge_overwrites_parent_overlays() {
        let mut parent = Frame::new();
        parent.set_entry("a", entry(1));
        parent.set_entry("b", entry(1));

        let mut child = Frame::new();
        child.set_entry("b", entry(3));
        child.set_entry("c", entry(2));

        child.merge_into(&mut parent);

        assert_eq!(parent.names().count(), 3);
        match parent.get("b") {
            Some(Overlay::Entry(e)) => assert_eq!(e.relation.len(), 3),
            other => panic!("expected entry overlay, got {other:?}"),
        }
    }
}
