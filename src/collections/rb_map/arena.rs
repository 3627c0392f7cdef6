use std::ops::{Index, IndexMut};

/// Slot of the sentinel before the first entry.
pub const HEAD: usize = 0;
/// Slot of the sentinel after the last entry, which is where `end()` points.
pub const TAIL: usize = 1;

/// In debug mode or feature unsafe-optim not enabled, same as assert! otherwise does nothing.
#[cfg(any(debug_assertions, not(feature = "unsafe-optim")))]
macro_rules! safe_assert {
    ( $cond: expr ) => {
        assert!($cond)
    };
}

/// In debug mode or feature unsafe-optim not enabled, same as assert! otherwise does nothing.
#[cfg(all(not(debug_assertions), feature = "unsafe-optim"))]
macro_rules! safe_assert {
    ( $cond: expr ) => {
        if !$cond {
            unsafe { std::hint::unreachable_unchecked() }
        }
    };
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Color {
    Red,
    Black,
}

/// Which child of its parent a node is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Side {
    Left = 0,
    Right = 1,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    #[inline]
    pub fn flip(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Tree and sequence links of a node, everything [`Node`] has apart from the entry.
#[derive(Clone, Copy, Debug)]
pub struct Links {
    pub color: Color,
    pub side: Side,
    pub parent: Option<usize>,
    pub child: [Option<usize>; 2],
    pub prev: usize,
    pub next: usize,
}

impl Links {
    const DETACHED: Links = Links {
        color: Color::Red,
        side: Side::Left,
        parent: None,
        child: [None, None],
        prev: HEAD,
        next: TAIL,
    };

    /// Exchange every reference to `a` with `b` and vice versa.
    pub fn remap(mut self, a: usize, b: usize) -> Self {
        let swap = |x: usize| {
            if x == a {
                b
            } else if x == b {
                a
            } else {
                x
            }
        };
        self.parent = self.parent.map(swap);
        self.child = [self.child[0].map(swap), self.child[1].map(swap)];
        self.prev = swap(self.prev);
        self.next = swap(self.next);
        self
    }
}

pub struct Node<K, V> {
    /// `None` for sentinels and released slots.
    pub entry: Option<(K, V)>,
    pub links: Links,
    /// Incremented each time the slot is released.
    pub generation: u32,
}

impl<K, V> Node<K, V> {
    #[inline]
    pub fn child(&self, side: Side) -> Option<usize> {
        self.links.child[side as usize]
    }

    #[inline]
    pub fn set_child(&mut self, side: Side, c: Option<usize>) {
        self.links.child[side as usize] = c;
    }

    fn sentinel() -> Self {
        Self {
            entry: None,
            links: Links {
                color: Color::Black,
                ..Links::DETACHED
            },
            generation: 0,
        }
    }
}

/// Node pool. Slots 0 and 1 are the sentinels, released slots are kept on a free list.
pub struct Arena<K, V> {
    nodes: Vec<Node<K, V>>,
    free: Vec<usize>,
}

impl<K, V> Arena<K, V> {
    pub fn with_capacity(n: usize) -> Self {
        let mut nodes = Vec::with_capacity(n + 2);
        nodes.push(Node::sentinel());
        nodes.push(Node::sentinel());
        Self {
            nodes,
            free: Vec::new(),
        }
    }

    /// Number of entries that can be held without reallocating.
    pub fn capacity(&self) -> usize {
        self.nodes.capacity() - 2
    }

    pub fn reserve(&mut self, additional: usize) {
        self.nodes.reserve(additional.saturating_sub(self.free.len()));
    }

    /// Released slots are kept (their generations must survive), only spare capacity is returned.
    pub fn shrink_to_fit(&mut self) {
        self.nodes.shrink_to_fit();
        self.free.shrink_to_fit();
    }

    /// Store an entry in a free slot. The new node is red and detached.
    pub fn alloc(&mut self, key: K, value: V) -> usize {
        if let Some(ix) = self.free.pop() {
            let n = &mut self.nodes[ix];
            n.entry = Some((key, value));
            n.links = Links::DETACHED;
            ix
        } else {
            self.nodes.push(Node {
                entry: Some((key, value)),
                links: Links::DETACHED,
                generation: 0,
            });
            self.nodes.len() - 1
        }
    }

    /// Take the entry out of a live slot and put the slot on the free list.
    pub fn release(&mut self, ix: usize) -> (K, V) {
        let n = &mut self.nodes[ix];
        let Some(kv) = n.entry.take() else {
            unreachable!("released slot {ix} holds no entry")
        };
        n.generation = n.generation.wrapping_add(1);
        self.free.push(ix);
        kv
    }

    /// Is `ix` the tail sentinel, or a slot holding the entry it held at `generation`?
    pub fn is_current(&self, ix: usize, generation: u32) -> bool {
        match self.nodes.get(ix) {
            Some(n) => ix == TAIL || (n.entry.is_some() && n.generation == generation),
            None => false,
        }
    }

    #[inline]
    pub fn kv(&self, ix: usize) -> (&K, &V) {
        match &self[ix].entry {
            Some((k, v)) => (k, v),
            None => unreachable!("slot {ix} holds no entry"),
        }
    }

    #[inline]
    pub fn kv_mut(&mut self, ix: usize) -> (&K, &mut V) {
        match &mut self[ix].entry {
            Some((k, v)) => (&*k, v),
            None => unreachable!("slot {ix} holds no entry"),
        }
    }

    #[inline]
    pub fn key(&self, ix: usize) -> &K {
        self.kv(ix).0
    }

    /// Base pointer for iterators handing out disjoint mutable references.
    pub fn as_mut_ptr(&mut self) -> *mut Node<K, V> {
        self.nodes.as_mut_ptr()
    }

    #[cfg(test)]
    pub fn slots(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }
}

impl<K, V> Index<usize> for Arena<K, V> {
    type Output = Node<K, V>;
    #[inline]
    fn index(&self, ix: usize) -> &Node<K, V> {
        safe_assert!(ix < self.nodes.len());
        unsafe { self.nodes.get_unchecked(ix) }
    }
}

impl<K, V> IndexMut<usize> for Arena<K, V> {
    #[inline]
    fn index_mut(&mut self, ix: usize) -> &mut Node<K, V> {
        safe_assert!(ix < self.nodes.len());
        unsafe { self.nodes.get_unchecked_mut(ix) }
    }
}
