//! Open-chained hash map with progressive (incremental) rehashing.
//!
//! A single [`Table`] is a plain array of bucket chains. [`HashIndex`] pairs
//! two of them — `main` and `old` — so that growing the table never does a
//! stop-the-world rebuild: every call spends a bounded amount of work
//! migrating a few nodes from `old` into `main` before doing its own job.
//!
//! The source this is modeled on keeps an intrusive linked list inside each
//! value and recovers the container via pointer arithmetic. Safe Rust can't
//! do that, so chains here are built from owned `Box<Node<V>>` links instead
//! — `Table` owns every value it holds outright, which is also why this
//! type is reused, uninstantiated over `V`, for both the top-level key-space
//! (`V = Entry`) and a ZSet's by-name index (`V = usize`, an arena handle).

const MAX_LOAD_FACTOR: usize = 8;
const RESIZE_WORK: usize = 128;
const INITIAL_CAPACITY: usize = 4;

struct Node<V> {
    hcode: u64,
    value: V,
    next: Option<Box<Node<V>>>,
}

struct Table<V> {
    buckets: Vec<Option<Box<Node<V>>>>,
    mask: usize,
    size: usize,
}

impl<V> Table<V> {
    fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let mut buckets = Vec::with_capacity(capacity);
        buckets.resize_with(capacity, || None);
        Self { buckets, mask: capacity - 1, size: 0 }
    }

    fn insert(&mut self, hcode: u64, value: V) {
        let pos = (hcode as usize) & self.mask;
        let node = Box::new(Node { hcode, value, next: self.buckets[pos].take() });
        self.buckets[pos] = Some(node);
        self.size += 1;
    }

    fn lookup<F: Fn(&V) -> bool>(&self, hcode: u64, eq: &F) -> Option<&V> {
        let pos = (hcode as usize) & self.mask;
        let mut cur = self.buckets[pos].as_deref();
        while let Some(node) = cur {
            if node.hcode == hcode && eq(&node.value) {
                return Some(&node.value);
            }
            cur = node.next.as_deref();
        }
        None
    }

    fn lookup_mut<F: Fn(&V) -> bool>(&mut self, hcode: u64, eq: &F) -> Option<&mut V> {
        let pos = (hcode as usize) & self.mask;
        let mut cur = self.buckets[pos].as_deref_mut();
        while let Some(node) = cur {
            if node.hcode == hcode && eq(&node.value) {
                return Some(&mut node.value);
            }
            cur = node.next.as_deref_mut();
        }
        None
    }

    /// Detaches and returns the matching node's value. Walking with a
    /// `&mut Option<Box<Node<V>>>` cursor lets us drop the predecessor's
    /// link straight into the detached node's `next` in one step — the
    /// safe-Rust analogue of returning "a pointer to the predecessor slot".
    fn detach<F: Fn(&V) -> bool>(&mut self, hcode: u64, eq: &F) -> Option<V> {
        let pos = (hcode as usize) & self.mask;
        let mut cur = &mut self.buckets[pos];
        loop {
            match cur {
                Some(node) if node.hcode == hcode && eq(&node.value) => {
                    let mut detached = cur.take().expect("just matched Some");
                    *cur = detached.next.take();
                    self.size -= 1;
                    return Some(detached.value);
                }
                Some(node) => cur = &mut node.next,
                None => return None,
            }
        }
    }

    fn scan<F: FnMut(&V)>(&self, visit: &mut F) {
        for bucket in &self.buckets {
            let mut cur = bucket.as_deref();
            while let Some(node) = cur {
                visit(&node.value);
                cur = node.next.as_deref();
            }
        }
    }
}

/// Two-table progressive hash map. See the module doc for why `V` is owned
/// directly rather than linked intrusively.
pub struct HashIndex<V> {
    main: Table<V>,
    old: Option<Table<V>>,
    resize_pos: usize,
}

impl<V> Default for HashIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HashIndex<V> {
    pub fn new() -> Self {
        Self { main: Table::new(INITIAL_CAPACITY), old: None, resize_pos: 0 }
    }

    pub fn insert(&mut self, hcode: u64, value: V) {
        self.main.insert(hcode, value);
        if self.old.is_none() && self.main.size / (self.main.mask + 1) > MAX_LOAD_FACTOR {
            self.start_resizing();
        }
        self.help_resizing();
    }

    pub fn lookup<F: Fn(&V) -> bool>(&mut self, hcode: u64, eq: F) -> Option<&V> {
        self.help_resizing();
        let main = &self.main;
        let old = &self.old;
        main.lookup(hcode, &eq).or_else(|| old.as_ref().and_then(|o| o.lookup(hcode, &eq)))
    }

    pub fn lookup_mut<F: Fn(&V) -> bool>(&mut self, hcode: u64, eq: F) -> Option<&mut V> {
        self.help_resizing();
        if self.main.lookup(hcode, &eq).is_some() {
            return self.main.lookup_mut(hcode, &eq);
        }
        self.old.as_mut().and_then(|o| o.lookup_mut(hcode, &eq))
    }

    pub fn pop<F: Fn(&V) -> bool>(&mut self, hcode: u64, eq: F) -> Option<V> {
        self.help_resizing();
        if let Some(v) = self.main.detach(hcode, &eq) {
            return Some(v);
        }
        self.old.as_mut().and_then(|o| o.detach(hcode, &eq))
    }

    pub fn size(&self) -> usize {
        self.main.size + self.old.as_ref().map_or(0, |o| o.size)
    }

    pub fn scan<F: FnMut(&V)>(&self, mut visit: F) {
        self.main.scan(&mut visit);
        if let Some(old) = &self.old {
            old.scan(&mut visit);
        }
    }

    fn start_resizing(&mut self) {
        let new_cap = (self.main.mask + 1) * 2;
        let grown = std::mem::replace(&mut self.main, Table::new(new_cap));
        self.old = Some(grown);
        self.resize_pos = 0;
    }

    fn help_resizing(&mut self) {
        let mut work = 0;
        while work < RESIZE_WORK {
            let Some(old) = self.old.as_mut() else { break };
            if old.size == 0 {
                break;
            }
            if old.buckets[self.resize_pos].is_none() {
                self.resize_pos += 1;
                continue;
            }
            let bucket = &mut old.buckets[self.resize_pos];
            let mut node = bucket.take().expect("just checked Some");
            *bucket = node.next.take();
            old.size -= 1;
            self.main.insert(node.hcode, node.value);
            work += 1;
        }
        if matches!(&self.old, Some(o) if o.size == 0) {
            self.old = None;
            self.resize_pos = 0;
        }
    }
}
