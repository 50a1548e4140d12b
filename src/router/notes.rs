// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{collections::BTreeSet, mem};

/// Notes that have been started and not yet stopped. Membership, not a counter:
/// a repeated note on for a sounding note is a single entry.
#[derive(Debug, Clone, Default)]
pub struct ActiveNoteSet {
    notes: BTreeSet<u8>,
}

impl ActiveNoteSet {
    pub fn insert(&mut self, note: u8) -> bool {
        self.notes.insert(note)
    }

    pub fn remove(&mut self, note: u8) -> bool {
        self.notes.remove(&note)
    }

    pub fn contains(&self, note: u8) -> bool {
        self.notes.contains(&note)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// The sounding notes, lowest first.
    pub fn notes(&self) -> Vec<u8> {
        self.notes.iter().copied().collect()
    }

    /// Empties the set and returns what was in it.
    pub fn take(&mut self) -> Vec<u8> {
        mem::take(&mut self.notes).into_iter().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_membership() {
        let mut notes = ActiveNoteSet::default();
        assert!(notes.insert(60));
        assert!(!notes.insert(60));
        assert!(notes.insert(48));
        assert_eq!(vec![48, 60], notes.notes());

        assert!(notes.remove(60));
        assert!(!notes.remove(60));
        assert!(notes.contains(48));
        assert_eq!(1, notes.len());

        assert_eq!(vec![48], notes.take());
        assert!(notes.is_empty());
    }
}
