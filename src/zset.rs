//! Sorted set: a (score, name) index pair over a [`slab::Slab`] arena of
//! [`ZNode`]s. The arena owns every node; the tree and the by-name hash
//! index both address nodes through their `usize` slab handle rather than
//! embedding links in the node itself.

use crate::avl;
use crate::hash::fnv1a;
use crate::hashtable::HashIndex;
use slab::Slab;

/// One (score, name) tuple held by a [`ZSet`].
pub struct ZNode {
    pub score: f64,
    pub name: Vec<u8>,
    pub parent: Option<usize>,
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub height: u32,
    pub count: u32,
}

impl ZNode {
    pub fn new(name: Vec<u8>, score: f64) -> Self {
        Self { score, name, parent: None, left: None, right: None, height: 1, count: 1 }
    }
}

/// `true` if `lhs` sorts strictly before the tuple `(score, name)`: by score
/// first, then by lexicographic byte compare of the name, shorter-prefix-wins
/// on a tie.
fn zless(lhs: &ZNode, score: f64, name: &[u8]) -> bool {
    if lhs.score != score {
        return lhs.score < score;
    }
    lhs.name.as_slice() < name
}

/// `true` if the tuple `(score, name)` sorts strictly before `rhs`.
fn key_less(score: f64, name: &[u8], rhs: &ZNode) -> bool {
    if score != rhs.score {
        return score < rhs.score;
    }
    name < rhs.name.as_slice()
}

/// Inserts `node` (already placed in `arena`, not yet linked) into the tree
/// rooted at `root` and returns the new root. Exposed to `avl`'s test module
/// so both can build trees the same way.
pub(crate) fn tree_add(arena: &mut Slab<ZNode>, root: Option<usize>, node: usize) -> usize {
    let (score, name) = (arena[node].score, arena[node].name.clone());
    let mut cur = root;
    let mut parent = None;
    let mut go_left = false;
    while let Some(c) = cur {
        parent = Some(c);
        go_left = key_less(score, &name, &arena[c]);
        cur = if go_left { arena[c].left } else { arena[c].right };
    }
    arena[node].parent = parent;
    match parent {
        Some(p) => {
            if go_left {
                arena[p].left = Some(node);
            } else {
                arena[p].right = Some(node);
            }
            avl::fix(arena, node)
        }
        None => node,
    }
}

/// A set of (score, name) tuples indexed both by name and by (score, name)
/// order. Invariant: the tree and `by_name` contain exactly the same set of
/// arena handles.
pub struct ZSet {
    arena: Slab<ZNode>,
    tree_root: Option<usize>,
    by_name: HashIndex<usize>,
}

impl Default for ZSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ZSet {
    pub fn new() -> Self {
        Self { arena: Slab::new(), tree_root: None, by_name: HashIndex::new() }
    }

    fn eq_name<'a>(arena: &'a Slab<ZNode>, name: &'a [u8]) -> impl Fn(&usize) -> bool + 'a {
        move |&handle| arena[handle].name == name
    }

    /// Handle of the ZNode named `name`, if present.
    fn find(&mut self, name: &[u8]) -> Option<usize> {
        let hcode = fnv1a(name);
        let arena = &self.arena;
        self.by_name.lookup(hcode, Self::eq_name(arena, name)).copied()
    }

    pub fn lookup(&mut self, name: &[u8]) -> Option<(f64, &[u8])> {
        let handle = self.find(name)?;
        let node = &self.arena[handle];
        Some((node.score, &node.name))
    }

    /// Upserts `(name, score)`. Returns `true` if a new tuple was inserted,
    /// `false` if an existing tuple's score was updated (or left as-is when
    /// the score did not change).
    pub fn add(&mut self, name: &[u8], score: f64) -> bool {
        if let Some(handle) = self.find(name) {
            if self.arena[handle].score != score {
                self.tree_root = avl::delete(&mut self.arena, handle);
                self.arena[handle].score = score;
                self.arena[handle].left = None;
                self.arena[handle].right = None;
                self.arena[handle].parent = None;
                self.arena[handle].height = 1;
                self.arena[handle].count = 1;
                self.tree_root = Some(tree_add(&mut self.arena, self.tree_root, handle));
            }
            return false;
        }
        let handle = self.arena.insert(ZNode::new(name.to_vec(), score));
        let hcode = fnv1a(name);
        self.by_name.insert(hcode, handle);
        self.tree_root = Some(tree_add(&mut self.arena, self.tree_root, handle));
        true
    }

    /// Removes `name` from both indexes and disposes the backing node.
    /// Returns `true` if it was present.
    pub fn pop(&mut self, name: &[u8]) -> bool {
        let Some(handle) = self.find(name) else { return false };
        let hcode = fnv1a(name);
        let arena = &self.arena;
        self.by_name.pop(hcode, Self::eq_name(arena, name));
        self.tree_root = avl::delete(&mut self.arena, handle);
        self.arena.remove(handle);
        true
    }

    /// First (score, name) tuple that is `>= (score, name)`, offset by `k`
    /// further tuples in tree order. `None` if no such tuple exists.
    pub fn query(&self, score: f64, name: &[u8], k: i64) -> Option<(f64, &[u8])> {
        let mut found = None;
        let mut cur = self.tree_root;
        while let Some(c) = cur {
            if zless(&self.arena[c], score, name) {
                cur = self.arena[c].right;
            } else {
                found = Some(c);
                cur = self.arena[c].left;
            }
        }
        let found = avl::offset(&self.arena, found?, k)?;
        let node = &self.arena[found];
        Some((node.score, &node.name))
    }

    /// `k`-th in-order successor/predecessor of the tuple named `name`,
    /// starting from `name` itself when `k == 0`.
    pub fn offset(&mut self, name: &[u8], k: i64) -> Option<(f64, &[u8])> {
        let handle = self.find(name)?;
        let target = avl::offset(&self.arena, handle, k)?;
        let node = &self.arena[target];
        Some((node.score, &node.name))
    }

    /// Iterates `limit` tuples starting at the first tuple `>= (score, name)`,
    /// skipping `offset` tuples first. Used directly by `zquery`.
    pub fn range(&self, score: f64, name: &[u8], offset: i64, limit: i64) -> Vec<(f64, Vec<u8>)> {
        let mut out = Vec::new();
        if limit <= 0 {
            return out;
        }
        let mut found = None;
        let mut cur = self.tree_root;
        while let Some(c) = cur {
            if zless(&self.arena[c], score, name) {
                cur = self.arena[c].right;
            } else {
                found = Some(c);
                cur = self.arena[c].left;
            }
        }
        let Some(start) = found else { return out };
        let Some(mut node) = avl::offset(&self.arena, start, offset) else { return out };
        loop {
            if out.len() as i64 >= limit {
                break;
            }
            let n = &self.arena[node];
            out.push((n.score, n.name.clone()));
            let Some(next) = avl::offset(&self.arena, node, 1) else { break };
            node = next;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.by_name.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
