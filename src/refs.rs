//! Ref table
//!
//! Maps the integer refs handed out by one snapshot to weak handles of the
//! live elements they were assigned to. A table is immutable once built;
//! every snapshot produces a new one that replaces the previous table as a
//! whole.

use crate::dom::NodeHandle;

#[derive(Debug, Clone, Default)]
pub struct RefTable {
    generation: u64,
    handles: Vec<NodeHandle>,
}

impl RefTable {
    /// An empty table, as left behind by navigation.
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            handles: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resolve a ref. Refs start at 1; 0 and anything past the last
    /// assigned ref resolve to nothing.
    pub fn get(&self, ref_id: u32) -> Option<NodeHandle> {
        let index = usize::try_from(ref_id).ok()?.checked_sub(1)?;
        self.handles.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// `(ref, handle)` pairs in ref order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, NodeHandle)> + '_ {
        self.handles
            .iter()
            .enumerate()
            .map(|(i, handle)| (i as u32 + 1, *handle))
    }
}

/// Accumulates handles during one traversal.
#[derive(Debug)]
pub struct RefTableBuilder {
    generation: u64,
    handles: Vec<NodeHandle>,
}

impl RefTableBuilder {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            handles: Vec::new(),
        }
    }

    /// Record a handle and return the ref assigned to it.
    pub fn assign(&mut self, handle: NodeHandle) -> u32 {
        self.handles.push(handle);
        self.handles.len() as u32
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn build(self) -> RefTable {
        RefTable {
            generation: self.generation,
            handles: self.handles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_are_sequential_from_one() {
        let mut builder = RefTableBuilder::new(7);
        assert_eq!(builder.assign(NodeHandle(40)), 1);
        assert_eq!(builder.assign(NodeHandle(12)), 2);
        assert_eq!(builder.assign(NodeHandle(99)), 3);

        let table = builder.build();
        assert_eq!(table.generation(), 7);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1), Some(NodeHandle(40)));
        assert_eq!(table.get(3), Some(NodeHandle(99)));
        assert_eq!(
            table.iter().map(|(r, _)| r).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_out_of_range_refs() {
        let mut builder = RefTableBuilder::new(1);
        builder.assign(NodeHandle(5));
        let table = builder.build();

        assert_eq!(table.get(0), None);
        assert_eq!(table.get(2), None);
        assert_eq!(table.get(999), None);
        assert!(RefTable::empty(2).get(1).is_none());
    }
}
