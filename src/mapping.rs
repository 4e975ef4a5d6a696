use crate::node::{next_dim, KeyOf, NodeId, TreeView, ValueOf};
use crate::value::Comparator;

fn less<T: TreeView>(tree: &T, m: usize, a: NodeId, b: NodeId) -> bool {
    tree.compare().less(m, tree.key(a), tree.key(b))
}

fn equal_on<T: TreeView>(tree: &T, m: usize, a: NodeId, b: NodeId) -> bool {
    !less(tree, m, a, b) && !less(tree, m, b, a)
}

/// First node in `(axis value, inorder position)` order.
pub(crate) fn map_minimum<T: TreeView>(tree: &T, m: usize) -> NodeId {
    let root = tree.root();
    if root.is_header() {
        return NodeId::HEADER;
    }
    min_rec(tree, m, root, 0)
}

fn min_rec<T: TreeView>(tree: &T, m: usize, node: NodeId, dim: usize) -> NodeId {
    let next = next_dim(dim, tree.rank());
    if dim == m {
        // Anything smaller on the axis sits to the left; anything to the
        // right can at best tie and ties lose to the earlier position.
        let l = tree.nodes().left(node);
        if l != NodeId::NIL {
            return min_rec(tree, m, l, next);
        }
        return node;
    }
    let mut best = NodeId::NIL;
    let l = tree.nodes().left(node);
    if l != NodeId::NIL {
        best = min_rec(tree, m, l, next);
    }
    if best == NodeId::NIL || less(tree, m, node, best) {
        best = node;
    }
    let r = tree.nodes().right(node);
    if r != NodeId::NIL {
        let cand = min_rec(tree, m, r, next);
        if less(tree, m, cand, best) {
            best = cand;
        }
    }
    best
}

/// Last node in `(axis value, inorder position)` order.
pub(crate) fn map_maximum<T: TreeView>(tree: &T, m: usize) -> NodeId {
    let root = tree.root();
    if root.is_header() {
        return NodeId::HEADER;
    }
    max_rec(tree, m, root, 0)
}

fn max_rec<T: TreeView>(tree: &T, m: usize, node: NodeId, dim: usize) -> NodeId {
    let next = next_dim(dim, tree.rank());
    if dim == m {
        let r = tree.nodes().right(node);
        if r != NodeId::NIL {
            return max_rec(tree, m, r, next);
        }
        return node;
    }
    // Reverse-inorder visit so that ties keep the latest position.
    let mut best = NodeId::NIL;
    let r = tree.nodes().right(node);
    if r != NodeId::NIL {
        best = max_rec(tree, m, r, next);
    }
    if best == NodeId::NIL || less(tree, m, best, node) {
        best = node;
    }
    let l = tree.nodes().left(node);
    if l != NodeId::NIL {
        let cand = max_rec(tree, m, l, next);
        if less(tree, m, best, cand) {
            best = cand;
        }
    }
    best
}

/// Next node after `cur` in `(axis value, inorder position)` order, or the
/// header.
pub(crate) fn map_successor<T: TreeView>(tree: &T, m: usize, cur: NodeId) -> NodeId {
    let mut best = NodeId::NIL;
    succ_rec(tree, m, cur, tree.root(), 0, &mut best);
    if best == NodeId::NIL {
        NodeId::HEADER
    } else {
        best
    }
}

fn succ_consider<T: TreeView>(tree: &T, m: usize, cur: NodeId, node: NodeId, best: &mut NodeId) {
    let candidate = less(tree, m, cur, node)
        || (equal_on(tree, m, cur, node) && tree.nodes().precedes(cur, node));
    if candidate && (*best == NodeId::NIL || less(tree, m, node, *best)) {
        *best = node;
    }
}

fn succ_rec<T: TreeView>(
    tree: &T,
    m: usize,
    cur: NodeId,
    node: NodeId,
    dim: usize,
    best: &mut NodeId,
) {
    if node == NodeId::NIL {
        return;
    }
    let next = next_dim(dim, tree.rank());
    if dim == m {
        if less(tree, m, node, cur) {
            // The whole left side is below this node, hence below cur.
            succ_rec(tree, m, cur, tree.nodes().right(node), next, best);
            return;
        }
        if less(tree, m, cur, node) {
            succ_rec(tree, m, cur, tree.nodes().left(node), next, best);
        }
        succ_consider(tree, m, cur, node, best);
        // Everything right of here is at or above this node; once a
        // candidate at or below it is held, the right side cannot win.
        if *best == NodeId::NIL || less(tree, m, node, *best) {
            succ_rec(tree, m, cur, tree.nodes().right(node), next, best);
        }
        return;
    }
    succ_rec(tree, m, cur, tree.nodes().left(node), next, best);
    succ_consider(tree, m, cur, node, best);
    succ_rec(tree, m, cur, tree.nodes().right(node), next, best);
}

/// Previous node before `cur` in `(axis value, inorder position)` order, or
/// the header.
pub(crate) fn map_predecessor<T: TreeView>(tree: &T, m: usize, cur: NodeId) -> NodeId {
    let mut best = NodeId::NIL;
    pred_rec(tree, m, cur, tree.root(), 0, &mut best);
    if best == NodeId::NIL {
        NodeId::HEADER
    } else {
        best
    }
}

fn pred_consider<T: TreeView>(tree: &T, m: usize, cur: NodeId, node: NodeId, best: &mut NodeId) {
    let candidate = less(tree, m, node, cur)
        || (equal_on(tree, m, cur, node) && tree.nodes().precedes(node, cur));
    if candidate && (*best == NodeId::NIL || less(tree, m, *best, node)) {
        *best = node;
    }
}

fn pred_rec<T: TreeView>(
    tree: &T,
    m: usize,
    cur: NodeId,
    node: NodeId,
    dim: usize,
    best: &mut NodeId,
) {
    if node == NodeId::NIL {
        return;
    }
    let next = next_dim(dim, tree.rank());
    if dim == m {
        if less(tree, m, cur, node) {
            pred_rec(tree, m, cur, tree.nodes().left(node), next, best);
            return;
        }
        pred_rec(tree, m, cur, tree.nodes().right(node), next, best);
        pred_consider(tree, m, cur, node, best);
        if *best == NodeId::NIL || less(tree, m, *best, node) {
            pred_rec(tree, m, cur, tree.nodes().left(node), next, best);
        }
        return;
    }
    pred_rec(tree, m, cur, tree.nodes().right(node), next, best);
    pred_consider(tree, m, cur, node, best);
    pred_rec(tree, m, cur, tree.nodes().left(node), next, best);
}

/// First node whose axis value does not fall below `bound` (`strict` shifts
/// the test to strictly above).
pub(crate) fn map_bound<T: TreeView>(
    tree: &T,
    m: usize,
    bound: &KeyOf<T>,
    strict: bool,
) -> NodeId {
    let root = tree.root();
    if root.is_header() {
        return NodeId::HEADER;
    }
    let mut best = NodeId::NIL;
    bound_rec(tree, m, bound, root, 0, &mut best, strict);
    if best == NodeId::NIL {
        NodeId::HEADER
    } else {
        best
    }
}

fn bound_rec<T: TreeView>(
    tree: &T,
    m: usize,
    bound: &KeyOf<T>,
    node: NodeId,
    dim: usize,
    best: &mut NodeId,
    strict: bool,
) {
    if node == NodeId::NIL {
        return;
    }
    let next = next_dim(dim, tree.rank());
    let cmp = tree.compare();
    let node_fails = if strict {
        !cmp.less(m, bound, tree.key(node))
    } else {
        cmp.less(m, tree.key(node), bound)
    };
    if dim == m {
        if node_fails {
            bound_rec(tree, m, bound, tree.nodes().right(node), next, best, strict);
            return;
        }
        bound_rec(tree, m, bound, tree.nodes().left(node), next, best, strict);
        if *best == NodeId::NIL || less(tree, m, node, *best) {
            *best = node;
        }
        // This node qualifies, so the right side (at or above it) cannot
        // improve on it.
        return;
    }
    bound_rec(tree, m, bound, tree.nodes().left(node), next, best, strict);
    if !node_fails && (*best == NodeId::NIL || less(tree, m, node, *best)) {
        *best = node;
    }
    bound_rec(tree, m, bound, tree.nodes().right(node), next, best, strict);
}

/// Double-ended iterator over a tree in the order induced by a single
/// chosen axis; ties fall back to inorder position, so forward and backward
/// traversal agree on one total order.
pub struct MappingIter<'a, T: TreeView> {
    tree: &'a T,
    dim: usize,
    lo: NodeId,
    hi: NodeId,
}

impl<'a, T: TreeView> MappingIter<'a, T> {
    pub(crate) fn new(tree: &'a T, dim: usize) -> Self {
        assert!(dim < tree.rank(), "mapping axis out of range");
        Self {
            tree,
            dim,
            lo: map_minimum(tree, dim),
            hi: NodeId::NIL,
        }
    }

    pub(crate) fn with_lower_bound(tree: &'a T, dim: usize, bound: &KeyOf<T>) -> Self {
        assert!(dim < tree.rank(), "mapping axis out of range");
        Self {
            tree,
            dim,
            lo: map_bound(tree, dim, bound, false),
            hi: NodeId::NIL,
        }
    }

    pub(crate) fn with_upper_bound(tree: &'a T, dim: usize, bound: &KeyOf<T>) -> Self {
        assert!(dim < tree.rank(), "mapping axis out of range");
        Self {
            tree,
            dim,
            lo: map_bound(tree, dim, bound, true),
            hi: NodeId::NIL,
        }
    }
}

impl<'a, T: TreeView> Iterator for MappingIter<'a, T> {
    type Item = &'a ValueOf<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.lo == NodeId::HEADER {
            return None;
        }
        let cur = self.lo;
        if self.hi != NodeId::NIL && self.hi == cur {
            self.lo = NodeId::HEADER;
            self.hi = NodeId::HEADER;
        } else {
            self.lo = map_successor(self.tree, self.dim, cur);
        }
        Some(self.tree.value(cur))
    }
}

impl<'a, T: TreeView> DoubleEndedIterator for MappingIter<'a, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.hi == NodeId::NIL {
            if self.lo == NodeId::HEADER {
                self.hi = NodeId::HEADER;
                return None;
            }
            self.hi = map_maximum(self.tree, self.dim);
        }
        if self.hi == NodeId::HEADER {
            return None;
        }
        let cur = self.hi;
        if cur == self.lo {
            self.lo = NodeId::HEADER;
            self.hi = NodeId::HEADER;
        } else {
            self.hi = map_predecessor(self.tree, self.dim, cur);
            if self.hi == NodeId::HEADER {
                self.lo = NodeId::HEADER;
            }
        }
        Some(self.tree.value(cur))
    }
}

#[cfg(test)]
mod tests {
    use crate::node::SetMode;
    use crate::relaxed::RelaxedKdtree;
    use crate::tree::Kdtree;
    use crate::{SpatialQueries, StaticRank};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    type Frozen3 = Kdtree<StaticRank<3>, SetMode<[i32; 3]>>;

    fn random_tree(seed: u64, count: usize) -> Frozen3 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tree = Frozen3::default();
        for _ in 0..count {
            // A narrow range forces plenty of equal axis values.
            tree.insert([
                rng.gen_range(-6..6),
                rng.gen_range(-6..6),
                rng.gen_range(-6..6),
            ]);
        }
        tree
    }

    #[test]
    fn diagonal_points_come_out_sorted() {
        let mut tree = Kdtree::<StaticRank<2>, SetMode<[i32; 2]>>::default();
        for p in [[0, 0], [1, 1], [2, 2], [3, 3]] {
            tree.insert(p);
        }
        for axis in 0..2 {
            let got: Vec<[i32; 2]> = tree.mapping(axis).copied().collect();
            assert_eq!(got, vec![[0, 0], [1, 1], [2, 2], [3, 3]]);
        }
    }

    #[test]
    fn empty_and_single() {
        let mut tree = Frozen3::default();
        assert!(tree.mapping(0).next().is_none());
        assert!(tree.mapping(2).next_back().is_none());
        tree.insert([4, 5, 6]);
        for axis in 0..3 {
            let got: Vec<[i32; 3]> = tree.mapping(axis).copied().collect();
            assert_eq!(got, vec![[4, 5, 6]]);
            assert_eq!(tree.mapping(axis).next_back(), Some(&[4, 5, 6]));
        }
    }

    #[test]
    fn forward_order_is_sorted_permutation() {
        let tree = random_tree(21, 150);
        for axis in 0..3 {
            let got: Vec<[i32; 3]> = tree.mapping(axis).copied().collect();
            assert_eq!(got.len(), tree.len());
            for pair in got.windows(2) {
                assert!(pair[0][axis] <= pair[1][axis]);
            }
            let mut sorted_got = got.clone();
            sorted_got.sort();
            let mut all: Vec<[i32; 3]> = tree.iter().copied().collect();
            all.sort();
            assert_eq!(sorted_got, all);
        }
    }

    #[test]
    fn backward_is_exact_reverse_of_forward() {
        let tree = random_tree(22, 120);
        for axis in 0..3 {
            let fwd: Vec<[i32; 3]> = tree.mapping(axis).copied().collect();
            let mut bwd: Vec<[i32; 3]> = tree.mapping(axis).rev().copied().collect();
            bwd.reverse();
            assert_eq!(fwd, bwd);
        }
    }

    #[test]
    fn meet_in_the_middle() {
        let tree = random_tree(23, 60);
        let fwd: Vec<[i32; 3]> = tree.mapping(1).copied().collect();
        let mut iter = tree.mapping(1);
        let mut front = Vec::new();
        let mut back = Vec::new();
        loop {
            match iter.next() {
                Some(v) => front.push(*v),
                None => break,
            }
            match iter.next_back() {
                Some(v) => back.push(*v),
                None => break,
            }
        }
        back.reverse();
        front.extend(back);
        assert_eq!(front, fwd);
    }

    #[test]
    fn bounds_cut_the_sequence() {
        let tree = random_tree(24, 140);
        for axis in 0..3 {
            for b in [-7, -2, 0, 3, 6] {
                let bound = [b, b, b];
                let all: Vec<[i32; 3]> = tree.mapping(axis).copied().collect();
                let from_lower: Vec<[i32; 3]> =
                    tree.mapping_lower_bound(axis, &bound).copied().collect();
                let expect_lower: Vec<[i32; 3]> = all
                    .iter()
                    .copied()
                    .filter(|p| p[axis] >= b)
                    .collect();
                assert_eq!(from_lower, expect_lower);
                let from_upper: Vec<[i32; 3]> =
                    tree.mapping_upper_bound(axis, &bound).copied().collect();
                let expect_upper: Vec<[i32; 3]> =
                    all.iter().copied().filter(|p| p[axis] > b).collect();
                assert_eq!(from_upper, expect_upper);
            }
        }
    }

    #[test]
    fn works_over_the_relaxed_tree() {
        let mut rng = StdRng::seed_from_u64(25);
        let mut tree = RelaxedKdtree::<StaticRank<2>, SetMode<[i32; 2]>>::default();
        for _ in 0..200 {
            tree.insert([rng.gen_range(-5..5), rng.gen_range(-5..5)]);
        }
        let got: Vec<[i32; 2]> = tree.mapping(1).copied().collect();
        assert_eq!(got.len(), 200);
        for pair in got.windows(2) {
            assert!(pair[0][1] <= pair[1][1]);
        }
    }

    #[test]
    #[should_panic(expected = "mapping axis out of range")]
    fn axis_out_of_range_panics() {
        let tree = Frozen3::default();
        let _ = tree.mapping(3);
    }
}
