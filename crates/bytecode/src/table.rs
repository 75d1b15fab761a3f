//! An open-addressing hash table keyed by interned string refs.
//!
//! Keys are compared by identity: interning guarantees at most one string
//! object per content, so content equality never has to be re-checked after
//! a string exists. The one content-based operation, [`Table::find_with`],
//! exists solely so the interner can look up a candidate before it has a
//! key. Deletion leaves tombstones so probe sequences stay intact; growth
//! drops them again.

use crate::obj::ObjRef;

/// Grow when `(load + 1) / capacity` would cross this ratio. Tombstones
/// count toward load so a delete-heavy table still rehashes.
const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

#[derive(Debug)]
enum Slot<V> {
    Empty,
    Tombstone,
    Used(Entry<V>),
}

#[derive(Debug)]
struct Entry<V> {
    key: ObjRef,
    hash: u64,
    value: V,
}

/// Linear-probe hash table from interned strings to `V`. Capacities are
/// powers of two, growing 8, 16, 32, ...
#[derive(Debug)]
pub struct Table<V> {
    slots: Box<[Slot<V>]>,
    /// Used plus tombstone slots; drives growth
    load: usize,
    /// Used slots only
    live: usize,
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Table {
            slots: Box::from([]),
            load: 0,
            live: 0,
        }
    }
}

impl<V> Table<V> {
    pub fn new() -> Table<V> {
        Table::default()
    }

    /// The number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn get(&self, key: ObjRef, hash: u64) -> Option<&V> {
        if self.slots.is_empty() {
            return None;
        }
        match &self.slots[self.find_slot(key, hash)] {
            Slot::Used(e) => Some(&e.value),
            _ => None,
        }
    }

    /// Insert or update. Returns `true` if the key was not present before.
    pub fn set(&mut self, key: ObjRef, hash: u64, value: V) -> bool {
        if (self.load + 1) * MAX_LOAD_DEN > self.slots.len() * MAX_LOAD_NUM {
            self.grow();
        }
        let at = self.find_slot(key, hash);
        match &mut self.slots[at] {
            Slot::Used(e) => {
                e.value = value;
                false
            }
            slot => {
                // a tombstone slot is already counted in the load
                if matches!(slot, Slot::Empty) {
                    self.load += 1;
                }
                *slot = Slot::Used(Entry { key, hash, value });
                self.live += 1;
                true
            }
        }
    }

    /// Remove `key`, leaving a tombstone so later probes walk through the
    /// vacated slot. Returns `true` if the key was present.
    pub fn delete(&mut self, key: ObjRef, hash: u64) -> bool {
        if self.slots.is_empty() {
            return false;
        }
        let at = self.find_slot(key, hash);
        match self.slots[at] {
            Slot::Used(_) => {
                self.slots[at] = Slot::Tombstone;
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    /// Locate a key by hash and caller-checked content. Only the interner
    /// uses this, to ask "does a string with this content already exist?"
    /// before allocating one.
    pub fn find_with(&self, hash: u64, mut eq: impl FnMut(ObjRef) -> bool) -> Option<ObjRef> {
        if self.slots.is_empty() {
            return None;
        }
        let mask = self.slots.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            match &self.slots[index] {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Used(e) => {
                    if e.hash == hash && eq(e.key) {
                        return Some(e.key);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &V)> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Used(e) => Some((e.key, &e.value)),
            _ => None,
        })
    }

    /// The slot `key` lives in, or the slot an insert should use: the first
    /// tombstone on the probe path if any, else the terminating empty slot.
    /// The load factor keeps at least one empty slot, so probing terminates.
    fn find_slot(&self, key: ObjRef, hash: u64) -> usize {
        let mask = self.slots.len() - 1;
        let mut index = hash as usize & mask;
        let mut tombstone = None;
        loop {
            match &self.slots[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Slot::Used(e) => {
                    if e.key == key {
                        return index;
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    fn grow(&mut self) {
        let new_cap = if self.slots.len() < 8 {
            8
        } else {
            self.slots.len() * 2
        };
        let old = std::mem::replace(
            &mut self.slots,
            (0..new_cap).map(|_| Slot::Empty).collect(),
        );
        // tombstones are dropped on the floor; recount from scratch
        self.load = 0;
        self.live = 0;
        for slot in Vec::from(old) {
            if let Slot::Used(e) = slot {
                let at = self.find_slot(e.key, e.hash);
                self.slots[at] = Slot::Used(e);
                self.load += 1;
                self.live += 1;
            }
        }
    }
}
