use std::borrow::Borrow;

use super::arena::{Arena, Color, Links, Side, HEAD, TAIL};
use super::compare::Compare;

/// Height of a red-black tree is at most 2*log2(n+1), this bounds the explicit stacks.
const MAX_DEPTH: usize = 2 * usize::BITS as usize + 2;

/// StkVec is used for stacks of node indices, length is maximum tree depth.
type StkVec<T> = arrayvec::ArrayVec<T, MAX_DEPTH>;

/// Where a search for a key ended.
pub enum Search {
    /// Slot holding an equal key.
    Found(usize),
    /// The key belongs below this node, on this side.
    Vacant(usize, Side),
    /// Tree has no nodes.
    Empty,
}

/// Red-black tree over an [`Arena`], with every live node also on the sequence list
/// running from `HEAD` to `TAIL`.
pub struct RawTree<K, V> {
    pub a: Arena<K, V>,
    pub root: Option<usize>,
    pub len: usize,
}

impl<K, V> RawTree<K, V> {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            a: Arena::with_capacity(n),
            root: None,
            len: 0,
        }
    }

    #[inline]
    pub fn first(&self) -> usize {
        self.a[HEAD].links.next
    }

    #[inline]
    pub fn last(&self) -> usize {
        self.a[TAIL].links.prev
    }

    /// Missing children count as black.
    #[inline]
    fn color(&self, x: Option<usize>) -> Color {
        match x {
            Some(x) => self.a[x].links.color,
            None => Color::Black,
        }
    }

    #[inline]
    fn link(&mut self, x: usize, y: usize) {
        self.a[x].links.next = y;
        self.a[y].links.prev = x;
    }

    /// Make `c` the child of `parent` on `side`, or the root if `parent` is `None`.
    fn attach(&mut self, parent: Option<usize>, side: Side, c: Option<usize>) {
        match parent {
            Some(p) => self.a[p].set_child(side, c),
            None => self.root = c,
        }
        if let Some(c) = c {
            self.a[c].links.parent = parent;
            self.a[c].links.side = side;
        }
    }

    /// Sibling of a node on `side` of `p`. Exists whenever `side` is one black short.
    fn sibling(&self, p: usize, side: Side) -> usize {
        match self.a[p].child(side.flip()) {
            Some(s) => s,
            None => unreachable!("black-height deficit with no sibling"),
        }
    }

    /// Rotate the subtree rooted at `x` so that `x` moves down towards `dir`.
    fn rotate(&mut self, x: usize, dir: Side) {
        let Some(y) = self.a[x].child(dir.flip()) else {
            unreachable!("rotation without a child to lift")
        };
        let Links { parent, side, .. } = self.a[x].links;
        let inner = self.a[y].child(dir);
        self.attach(Some(x), dir.flip(), inner);
        self.attach(parent, side, Some(y));
        self.attach(Some(y), dir, Some(x));
    }

    pub fn search<Q, C>(&self, key: &Q, cmp: &C) -> Search
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Compare<Q> + ?Sized,
    {
        let Some(mut x) = self.root else {
            return Search::Empty;
        };
        loop {
            let nk = self.a.key(x).borrow();
            let side = if cmp.less(key, nk) {
                Side::Left
            } else if cmp.less(nk, key) {
                Side::Right
            } else {
                return Search::Found(x);
            };
            match self.a[x].child(side) {
                Some(c) => x = c,
                None => return Search::Vacant(x, side),
            }
        }
    }

    pub fn find<Q, C>(&self, key: &Q, cmp: &C) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Compare<Q> + ?Sized,
    {
        match self.search(key, cmp) {
            Search::Found(x) => Some(x),
            _ => None,
        }
    }

    /// First node whose key is not less than `key` (`strict == false`), or greater than `key`
    /// (`strict == true`). `TAIL` if there is none.
    pub fn bound<Q, C>(&self, key: &Q, strict: bool, cmp: &C) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Compare<Q> + ?Sized,
    {
        let mut result = TAIL;
        let mut x = self.root;
        while let Some(n) = x {
            let nk = self.a.key(n).borrow();
            let go_right = if strict {
                !cmp.less(key, nk)
            } else {
                cmp.less(nk, key)
            };
            if go_right {
                x = self.a[n].child(Side::Right);
            } else {
                result = n;
                x = self.a[n].child(Side::Left);
            }
        }
        result
    }

    /// Insert key, calling `value` only if the key is new. Returns the slot and whether it is new.
    pub fn insert<C, F>(&mut self, key: K, value: F, cmp: &C) -> (usize, bool)
    where
        C: Compare<K> + ?Sized,
        F: FnOnce() -> V,
    {
        match self.search(&key, cmp) {
            Search::Found(x) => (x, false),
            Search::Empty => {
                let x = self.a.alloc(key, value());
                self.a[x].links.color = Color::Black;
                self.attach(None, Side::Left, Some(x));
                self.link(HEAD, x);
                self.link(x, TAIL);
                self.len = 1;
                (x, true)
            }
            Search::Vacant(p, side) => {
                let x = self.a.alloc(key, value());
                self.attach(Some(p), side, Some(x));
                match side {
                    Side::Left => {
                        let before = self.a[p].links.prev;
                        self.link(before, x);
                        self.link(x, p);
                    }
                    Side::Right => {
                        let after = self.a[p].links.next;
                        self.link(p, x);
                        self.link(x, after);
                    }
                }
                self.len += 1;
                self.insert_fixup(x);
                (x, true)
            }
        }
    }

    /// Append an entry whose key is greater than every key in the tree, without searching.
    #[cfg(feature = "serde")]
    pub fn push_back(&mut self, key: K, value: V) {
        let last = self.last();
        if last == HEAD {
            let x = self.a.alloc(key, value);
            self.a[x].links.color = Color::Black;
            self.attach(None, Side::Left, Some(x));
            self.link(HEAD, x);
            self.link(x, TAIL);
            self.len = 1;
            return;
        }
        // The maximum has no right child.
        let x = self.a.alloc(key, value);
        self.attach(Some(last), Side::Right, Some(x));
        self.link(last, x);
        self.link(x, TAIL);
        self.len += 1;
        self.insert_fixup(x);
    }

    /// Restore the red-black properties after `x` was attached as a red leaf.
    fn insert_fixup(&mut self, mut x: usize) {
        loop {
            let Some(p) = self.a[x].links.parent else {
                self.a[x].links.color = Color::Black;
                return;
            };
            if self.a[p].links.color == Color::Black {
                return;
            }
            // A red parent is never the root.
            let Some(g) = self.a[p].links.parent else {
                self.a[p].links.color = Color::Black;
                return;
            };
            let pside = self.a[p].links.side;
            let uncle = self.a[g].child(pside.flip());
            match uncle {
                Some(u) if self.a[u].links.color == Color::Red => {
                    self.a[p].links.color = Color::Black;
                    self.a[u].links.color = Color::Black;
                    self.a[g].links.color = Color::Red;
                    x = g;
                }
                _ => {
                    if self.a[x].links.side == pside {
                        self.a[p].links.color = Color::Black;
                        self.a[g].links.color = Color::Red;
                        self.rotate(g, pside.flip());
                    } else {
                        self.a[x].links.color = Color::Black;
                        self.a[g].links.color = Color::Red;
                        self.rotate(p, pside);
                        self.rotate(g, pside.flip());
                    }
                    return;
                }
            }
        }
    }

    /// Exchange the tree and sequence positions of two nodes. Entries stay in their slots.
    fn swap_positions(&mut self, x: usize, y: usize) {
        let lx = self.a[x].links.remap(x, y);
        let ly = self.a[y].links.remap(x, y);
        self.a[x].links = ly;
        self.a[y].links = lx;
        self.reattach(x);
        self.reattach(y);
    }

    /// Point every neighbour of `x` back at `x`.
    fn reattach(&mut self, x: usize) {
        let Links {
            parent,
            side,
            child,
            prev,
            next,
            ..
        } = self.a[x].links;
        match parent {
            Some(p) => self.a[p].set_child(side, Some(x)),
            None => self.root = Some(x),
        }
        for s in Side::BOTH {
            if let Some(c) = child[s as usize] {
                self.a[c].links.parent = Some(x);
                self.a[c].links.side = s;
            }
        }
        self.a[prev].links.next = x;
        self.a[next].links.prev = x;
    }

    /// Remove the live node `x` from both layers and return its entry.
    pub fn remove(&mut self, x: usize) -> (K, V) {
        if self.a[x].child(Side::Left).is_some() && self.a[x].child(Side::Right).is_some() {
            // Successor is the leftmost node of the right subtree, so has no left child.
            let s = self.a[x].links.next;
            self.swap_positions(x, s);
        }
        let Links {
            color,
            side,
            parent,
            child,
            prev,
            next,
        } = self.a[x].links;
        self.link(prev, next);
        let c = child[0].or(child[1]);
        self.attach(parent, side, c);
        if color == Color::Black {
            self.remove_fixup(c, parent, side);
        }
        self.len -= 1;
        self.a.release(x)
    }

    /// Restore black-height when the subtree at `side` of `parent` (whose root is `x`)
    /// is one black node short.
    fn remove_fixup(&mut self, mut x: Option<usize>, mut parent: Option<usize>, mut side: Side) {
        loop {
            if let Some(n) = x {
                if self.a[n].links.color == Color::Red {
                    self.a[n].links.color = Color::Black;
                    return;
                }
            }
            let Some(p) = parent else {
                // Deficit reached the root, which absorbs it.
                return;
            };
            let mut s = self.sibling(p, side);
            if self.a[s].links.color == Color::Red {
                self.a[s].links.color = Color::Black;
                self.a[p].links.color = Color::Red;
                self.rotate(p, side);
                s = self.sibling(p, side);
            }
            let near = self.a[s].child(side);
            let far = self.a[s].child(side.flip());
            if self.color(near) == Color::Black && self.color(far) == Color::Black {
                self.a[s].links.color = Color::Red;
                x = Some(p);
                parent = self.a[p].links.parent;
                side = self.a[p].links.side;
                continue;
            }
            if self.color(far) == Color::Black {
                if let Some(n) = near {
                    self.a[n].links.color = Color::Black;
                }
                self.a[s].links.color = Color::Red;
                self.rotate(s, side.flip());
                s = self.sibling(p, side);
            }
            self.a[s].links.color = self.a[p].links.color;
            self.a[p].links.color = Color::Black;
            if let Some(f) = self.a[s].child(side.flip()) {
                self.a[f].links.color = Color::Black;
            }
            self.rotate(p, side);
            return;
        }
    }

    /// Release every node. Slots stay allocated so positions into them can be recognised as stale.
    pub fn clear(&mut self) {
        let mut x = self.first();
        while x != TAIL {
            let next = self.a[x].links.next;
            self.a.release(x);
            x = next;
        }
        self.link(HEAD, TAIL);
        self.root = None;
        self.len = 0;
    }

    /// Deep copy. The tree shape and colors are copied first, then the sequence list is
    /// rebuilt by an in-order walk of the copy.
    pub fn aclone(&self) -> Self
    where
        K: Clone,
        V: Clone,
    {
        let mut t = RawTree::with_capacity(self.len);
        let Some(root) = self.root else {
            return t;
        };
        let copy = |t: &mut RawTree<K, V>, src: usize| {
            let (k, v) = self.a.kv(src);
            let x = t.a.alloc(k.clone(), v.clone());
            t.a[x].links.color = self.a[src].links.color;
            x
        };
        let r = copy(&mut t, root);
        t.attach(None, Side::Left, Some(r));
        let mut stack = StkVec::new();
        stack.push((root, r));
        while let Some((src, dst)) = stack.pop() {
            for side in Side::BOTH {
                if let Some(sc) = self.a[src].child(side) {
                    let dc = copy(&mut t, sc);
                    t.attach(Some(dst), side, Some(dc));
                    stack.push((sc, dc));
                }
            }
        }
        t.len = self.len;
        t.relink();
        t
    }

    /// Rebuild the sequence list from the tree.
    fn relink(&mut self) {
        let mut stack = StkVec::new();
        let mut x = self.root;
        let mut last = HEAD;
        loop {
            while let Some(n) = x {
                stack.push(n);
                x = self.a[n].child(Side::Left);
            }
            let Some(n) = stack.pop() else {
                break;
            };
            self.link(last, n);
            last = n;
            x = self.a[n].child(Side::Right);
        }
        self.link(last, TAIL);
    }
}

#[cfg(test)]
impl<K, V> RawTree<K, V> {
    /// Panics unless every structural invariant holds.
    pub fn check<C: Compare<K>>(&self, cmp: &C) {
        // In-order walk of the tree must visit the same nodes as the sequence list.
        let mut in_order = Vec::new();
        let mut stack = Vec::new();
        let mut x = self.root;
        loop {
            while let Some(n) = x {
                stack.push(n);
                x = self.a[n].child(Side::Left);
            }
            let Some(n) = stack.pop() else {
                break;
            };
            in_order.push(n);
            x = self.a[n].child(Side::Right);
        }
        let mut forward = Vec::new();
        let mut x = self.first();
        while x != TAIL {
            forward.push(x);
            x = self.a[x].links.next;
        }
        assert_eq!(in_order, forward);
        let mut backward = Vec::new();
        let mut x = self.last();
        while x != HEAD {
            backward.push(x);
            x = self.a[x].links.prev;
        }
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), self.len);
        assert_eq!(self.a.slots() - 2, self.len + self.a.free_slots());

        for w in forward.windows(2) {
            assert!(cmp.less(self.a.key(w[0]), self.a.key(w[1])));
        }

        if let Some(r) = self.root {
            assert_eq!(self.a[r].links.color, Color::Black);
            assert!(self.a[r].links.parent.is_none());
            self.black_height(r);
        }
    }

    fn black_height(&self, x: usize) -> usize {
        let n = &self.a[x];
        assert!(n.entry.is_some());
        let mut heights = [0; 2];
        for side in Side::BOTH {
            heights[side as usize] = match n.child(side) {
                Some(c) => {
                    let cn = &self.a[c];
                    assert_eq!(cn.links.parent, Some(x));
                    assert_eq!(cn.links.side, side);
                    if n.links.color == Color::Red {
                        assert_eq!(cn.links.color, Color::Black, "red node with red child");
                    }
                    self.black_height(c)
                }
                None => 0,
            };
        }
        assert_eq!(heights[0], heights[1], "unequal black-height");
        heights[0] + usize::from(n.links.color == Color::Black)
    }
}
