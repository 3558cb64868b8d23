//! The key-space: a single global map from key bytes to a typed [`Entry`],
//! backed by [`HashIndex`] for the primary lookup and by
//! [`ZSet`] for any entry of type [`EntryValue::ZSet`].

use crate::hash::fnv1a;
use crate::hashtable::HashIndex;
use crate::zset::ZSet;

/// The payload of an [`Entry`]. The type never changes after creation;
/// commands that disagree with it fail with `TYPE`.
pub enum EntryValue {
    Str(Vec<u8>),
    ZSet(ZSet),
}

/// One value in the key space.
pub struct Entry {
    pub key: Vec<u8>,
    pub value: EntryValue,
}

/// The process-wide key-value store. One instance is owned by the event
/// loop; tests instantiate a fresh one per test.
pub struct KeySpace {
    map: HashIndex<Entry>,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySpace {
    pub fn new() -> Self {
        Self { map: HashIndex::new() }
    }

    fn eq_key<'a>(key: &'a [u8]) -> impl Fn(&Entry) -> bool + 'a {
        move |entry| entry.key == key
    }

    pub fn get(&mut self, key: &[u8]) -> Option<&Entry> {
        self.map.lookup(fnv1a(key), Self::eq_key(key))
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Entry> {
        self.map.lookup_mut(fnv1a(key), Self::eq_key(key))
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        self.map.pop(fnv1a(key), Self::eq_key(key))
    }

    pub fn insert(&mut self, entry: Entry) {
        let hcode = fnv1a(&entry.key);
        self.map.insert(hcode, entry);
    }

    /// Returns the ZSet entry named `key`, auto-creating an empty one if
    /// `key` is absent. Fails if `key` already holds a STRING.
    pub fn zset_or_create(&mut self, key: &[u8]) -> Result<&mut ZSet, ()> {
        if self.get(key).is_none() {
            self.insert(Entry { key: key.to_vec(), value: EntryValue::ZSet(ZSet::new()) });
        }
        match &mut self.get_mut(key).expect("just inserted or already present").value {
            EntryValue::ZSet(z) => Ok(z),
            EntryValue::Str(_) => Err(()),
        }
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(self.map.size());
        self.map.scan(|entry| out.push(entry.key.clone()));
        out
    }

    pub fn len(&self) -> usize {
        self.map.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
