use crate::node::{next_dim, prev_dim, KeyOf, NodeId, TreeView, ValueOf};
use crate::value::{AxisLess, Comparator, RegularComparator};

/// Position of a key on one axis relative to the interval a predicate keeps
/// on that axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelativeOrder {
    Below,
    Matching,
    Above,
}

/// An orthogonal region: one continuous interval per axis. A key belongs to
/// the region when it is `Matching` on every axis.
pub trait RegionPredicate<K: ?Sized> {
    fn relate(&self, rank: usize, dim: usize, key: &K) -> RelativeOrder;
}

/// Closed-open interval per axis: `low <= key < high`.
#[derive(Clone, Debug)]
pub struct Bounds<K, C = AxisLess> {
    low: K,
    high: K,
    compare: C,
}

impl<K, C: Comparator<K>> Bounds<K, C> {
    pub fn new(compare: C, low: K, high: K) -> Self {
        Self { low, high, compare }
    }
}

impl<K, C: Comparator<K>> RegionPredicate<K> for Bounds<K, C> {
    fn relate(&self, _rank: usize, dim: usize, key: &K) -> RelativeOrder {
        if self.compare.less(dim, key, &self.low) {
            RelativeOrder::Below
        } else if self.compare.less(dim, key, &self.high) {
            RelativeOrder::Matching
        } else {
            RelativeOrder::Above
        }
    }
}

/// Open interval per axis: `low < key < high`.
#[derive(Clone, Debug)]
pub struct OpenBounds<K, C = AxisLess> {
    low: K,
    high: K,
    compare: C,
}

impl<K, C: Comparator<K>> OpenBounds<K, C> {
    pub fn new(compare: C, low: K, high: K) -> Self {
        Self { low, high, compare }
    }
}

impl<K, C: Comparator<K>> RegionPredicate<K> for OpenBounds<K, C> {
    fn relate(&self, _rank: usize, dim: usize, key: &K) -> RelativeOrder {
        if !self.compare.less(dim, &self.low, key) {
            RelativeOrder::Below
        } else if self.compare.less(dim, key, &self.high) {
            RelativeOrder::Matching
        } else {
            RelativeOrder::Above
        }
    }
}

/// Closed interval per axis: `low <= key <= high`. The point-in-box test.
#[derive(Clone, Debug)]
pub struct ClosedBounds<K, C = AxisLess> {
    low: K,
    high: K,
    compare: C,
}

impl<K, C: Comparator<K>> ClosedBounds<K, C> {
    pub fn new(compare: C, low: K, high: K) -> Self {
        Self { low, high, compare }
    }
}

impl<K, C: Comparator<K>> RegionPredicate<K> for ClosedBounds<K, C> {
    fn relate(&self, _rank: usize, dim: usize, key: &K) -> RelativeOrder {
        if self.compare.less(dim, key, &self.low) {
            RelativeOrder::Below
        } else if self.compare.less(dim, &self.high, key) {
            RelativeOrder::Above
        } else {
            RelativeOrder::Matching
        }
    }
}

/// Matches stored boxes that overlap the target box (closed on the edges).
/// Box keys carry doubled axes: even axes are low coordinates, odd axes are
/// high coordinates. Requires a regular comparator, as low coordinates of
/// one box compare against high coordinates of the other.
#[derive(Clone, Debug)]
pub struct OverlapBounds<K, C = AxisLess> {
    target: K,
    compare: C,
}

impl<K, C: RegularComparator<K>> OverlapBounds<K, C> {
    pub fn new(compare: C, target: K) -> Self {
        Self { target, compare }
    }
}

impl<K, C: RegularComparator<K>> RegionPredicate<K> for OverlapBounds<K, C> {
    fn relate(&self, rank: usize, dim: usize, key: &K) -> RelativeOrder {
        debug_assert!(rank % 2 == 0, "box predicates need a doubled rank");
        if dim % 2 == 0 {
            // key.low on this axis must not pass the target's high.
            if self.compare.less_relative(dim + 1, &self.target, dim, key) {
                RelativeOrder::Above
            } else {
                RelativeOrder::Matching
            }
        } else {
            // key.high on this axis must reach the target's low.
            if self.compare.less_relative(dim, key, dim - 1, &self.target) {
                RelativeOrder::Below
            } else {
                RelativeOrder::Matching
            }
        }
    }
}

/// Matches stored boxes fully contained in the target box (closed on the
/// edges). Same doubled-axis layout as `OverlapBounds`.
#[derive(Clone, Debug)]
pub struct EnclosedBounds<K, C = AxisLess> {
    target: K,
    compare: C,
}

impl<K, C: RegularComparator<K>> EnclosedBounds<K, C> {
    pub fn new(compare: C, target: K) -> Self {
        Self { target, compare }
    }
}

impl<K, C: RegularComparator<K>> RegionPredicate<K> for EnclosedBounds<K, C> {
    fn relate(&self, rank: usize, dim: usize, key: &K) -> RelativeOrder {
        debug_assert!(rank % 2 == 0, "box predicates need a doubled rank");
        if dim % 2 == 0 {
            if self.compare.less_relative(dim, key, dim, &self.target) {
                RelativeOrder::Below
            } else if self.compare.less_relative(dim + 1, &self.target, dim, key) {
                RelativeOrder::Above
            } else {
                RelativeOrder::Matching
            }
        } else if self.compare.less_relative(dim, key, dim - 1, &self.target) {
            RelativeOrder::Below
        } else if self.compare.less_relative(dim, &self.target, dim, key) {
            RelativeOrder::Above
        } else {
            RelativeOrder::Matching
        }
    }
}

pub fn bounds<K, C: Comparator<K>>(compare: C, low: K, high: K) -> Bounds<K, C> {
    Bounds::new(compare, low, high)
}

pub fn open_bounds<K, C: Comparator<K>>(compare: C, low: K, high: K) -> OpenBounds<K, C> {
    OpenBounds::new(compare, low, high)
}

pub fn closed_bounds<K, C: Comparator<K>>(compare: C, low: K, high: K) -> ClosedBounds<K, C> {
    ClosedBounds::new(compare, low, high)
}

pub fn overlap_bounds<K, C: RegularComparator<K>>(compare: C, target: K) -> OverlapBounds<K, C> {
    OverlapBounds::new(compare, target)
}

pub fn enclosed_bounds<K, C: RegularComparator<K>>(compare: C, target: K) -> EnclosedBounds<K, C> {
    EnclosedBounds::new(compare, target)
}

/// Forward iterator over the keys matching a region predicate, in inorder.
/// Subtrees wholly below or above the region on a cutting dimension are
/// never visited.
pub struct RegionIter<'a, T: TreeView, P> {
    tree: &'a T,
    predicate: P,
    node: NodeId,
    dim: usize,
}

impl<'a, T, P> RegionIter<'a, T, P>
where
    T: TreeView,
    P: RegionPredicate<KeyOf<T>>,
{
    pub(crate) fn new(tree: &'a T, predicate: P) -> Self {
        let mut iter = Self {
            tree,
            predicate,
            node: NodeId::HEADER,
            dim: 0,
        };
        let root = tree.root();
        if !root.is_header() {
            iter.node = root;
            iter.descend_left();
        }
        iter
    }

    fn descend_left(&mut self) {
        let rank = self.tree.rank();
        loop {
            if self.tree.nodes().left(self.node) == NodeId::NIL {
                return;
            }
            if self.predicate.relate(rank, self.dim, self.tree.key(self.node))
                == RelativeOrder::Below
            {
                // Everything on the left sits below this node on its axis.
                return;
            }
            self.node = self.tree.nodes().left(self.node);
            self.dim = next_dim(self.dim, rank);
        }
    }

    fn advance(&mut self) {
        let rank = self.tree.rank();
        let right = self.tree.nodes().right(self.node);
        if right != NodeId::NIL
            && self.predicate.relate(rank, self.dim, self.tree.key(self.node))
                != RelativeOrder::Above
        {
            self.node = right;
            self.dim = next_dim(self.dim, rank);
            self.descend_left();
            return;
        }
        loop {
            let parent = self.tree.nodes().parent(self.node);
            let pdim = prev_dim(self.dim, rank);
            if parent.is_header() {
                self.node = NodeId::HEADER;
                self.dim = 0;
                return;
            }
            let was_left = self.tree.nodes().left(parent) == self.node;
            self.node = parent;
            self.dim = pdim;
            if was_left {
                return;
            }
        }
    }

    fn matches(&self, node: NodeId) -> bool {
        let rank = self.tree.rank();
        (0..rank)
            .all(|d| self.predicate.relate(rank, d, self.tree.key(node)) == RelativeOrder::Matching)
    }
}

impl<'a, T, P> Iterator for RegionIter<'a, T, P>
where
    T: TreeView,
    P: RegionPredicate<KeyOf<T>>,
{
    type Item = &'a ValueOf<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.node == NodeId::HEADER {
                return None;
            }
            let cur = self.node;
            self.advance();
            if self.matches(cur) {
                return Some(self.tree.value(cur));
            }
        }
    }
}
