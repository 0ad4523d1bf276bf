//! Hard-link dedup table (SPEC_FULL §B.2, grounded in
//! `original_source/src/create.c`'s `struct link`).
//!
//! The core does not stat files itself (that remains an external
//! collaborator concern per spec.md §1), but the *decision* of whether a
//! given `(dev, ino)` pair has already been archived — and if so, under
//! which name — is codec domain knowledge: it determines whether the
//! builder emits a full `RegularFile` entry or a `HardLink` entry pointing
//! at the first occurrence.

use hashbrown::HashMap;
use relative_path::RelativePathBuf;

/// Device/inode identity used as the dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceInode {
    pub dev: u64,
    pub ino: u64,
}

/// Tracks the first archived name for each `(dev, ino)` pair seen so far.
#[derive(Debug, Default)]
pub struct LinkDedupTable {
    first_name: HashMap<DeviceInode, RelativePathBuf>,
}

impl LinkDedupTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `name` is the first occurrence of `id`, if none is
    /// already known. Returns the existing first name, if any, so the
    /// caller can decide to emit a `HardLink` entry instead of a full copy.
    pub fn observe(&mut self, id: DeviceInode, name: &RelativePathBuf) -> Option<RelativePathBuf> {
        if let Some(existing) = self.first_name.get(&id) {
            return Some(existing.clone());
        }
        self.first_name.insert(id, name.clone());
        None
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.first_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_observation_of_same_identity_returns_first_name() {
        let mut table = LinkDedupTable::new();
        let id = DeviceInode { dev: 1, ino: 42 };
        let first: RelativePathBuf = "a/first.txt".into();
        let second: RelativePathBuf = "b/second.txt".into();

        assert_eq!(table.observe(id, &first), None);
        assert_eq!(table.observe(id, &second), Some(first));
    }

    #[test]
    fn distinct_identities_never_collide() {
        let mut table = LinkDedupTable::new();
        assert_eq!(table.observe(DeviceInode { dev: 1, ino: 1 }, &"a".into()), None);
        assert_eq!(table.observe(DeviceInode { dev: 1, ino: 2 }, &"b".into()), None);
        assert_eq!(table.len(), 2);
    }
}
