use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::node::{
    next_dim, node_dim, KdtreeLink, Link, LinkMode, MutableTree, NodeId, Nodes, TreeView,
};
use crate::value::{AxisLess, Comparator};
use crate::Rank;

/// Descends from the root by the cutting-dimension rule and hooks `new` at
/// the first vacant child, updating the leftmost cache and the header's
/// rightmost pointer. Returns the cutting dimension of the new node.
pub(crate) fn descend_attach<L, M, C>(
    nodes: &mut Nodes<L>,
    compare: &C,
    rank: usize,
    leftmost: &mut NodeId,
    new: NodeId,
) -> usize
where
    L: Link,
    M: LinkMode<Value = L::Value>,
    C: Comparator<M::Key>,
{
    let root = nodes.parent(NodeId::HEADER);
    if root.is_header() {
        nodes.set_parent(NodeId::HEADER, new);
        nodes.set_parent(new, NodeId::HEADER);
        nodes.set_right(NodeId::HEADER, new);
        *leftmost = new;
        return 0;
    }
    let mut node = root;
    let mut dim = 0;
    loop {
        let next = next_dim(dim, rank);
        let goes_left = compare.less(dim, M::key(nodes.value(new)), M::key(nodes.value(node)));
        if goes_left {
            let l = nodes.left(node);
            if l == NodeId::NIL {
                nodes.set_left(node, new);
                nodes.set_parent(new, node);
                if node == *leftmost {
                    *leftmost = new;
                }
                return next;
            }
            node = l;
        } else {
            let r = nodes.right(node);
            if r == NodeId::NIL {
                nodes.set_right(node, new);
                nodes.set_parent(new, node);
                if node == nodes.right(NodeId::HEADER) {
                    nodes.set_right(NodeId::HEADER, new);
                }
                return next;
            }
            node = r;
        }
        dim = next;
    }
}

/// Node of the subtree under `node` with the lowest key on axis `target`,
/// along with its cutting dimension. `dim` is the cutting dimension of
/// `node` itself.
fn subtree_minimum<L, M, C>(
    nodes: &Nodes<L>,
    compare: &C,
    rank: usize,
    node: NodeId,
    dim: usize,
    target: usize,
) -> (NodeId, usize)
where
    L: Link,
    M: LinkMode<Value = L::Value>,
    C: Comparator<M::Key>,
{
    let next = next_dim(dim, rank);
    if dim == target {
        let l = nodes.left(node);
        if l != NodeId::NIL {
            return subtree_minimum::<L, M, C>(nodes, compare, rank, l, next, target);
        }
        // No left child: everything to the right sits at or above this key.
        return (node, dim);
    }
    let mut best = (node, dim);
    for child in [nodes.left(node), nodes.right(node)] {
        if child != NodeId::NIL {
            let cand = subtree_minimum::<L, M, C>(nodes, compare, rank, child, next, target);
            if compare.less(target, M::key(nodes.value(cand.0)), M::key(nodes.value(best.0))) {
                best = cand;
            }
        }
    }
    best
}

/// Removes a node's value from the tree by repeatedly trading places with
/// the minimum of its right subtree on its cutting dimension, detaching at a
/// leaf. Returns the released link and the parent the leaf was detached
/// from. Weights stay positional throughout; the caller settles them along
/// with the extremum caches.
pub(crate) fn erase_rewire<L, M, C>(
    nodes: &mut Nodes<L>,
    compare: &C,
    rank: usize,
    node: NodeId,
) -> (L, NodeId)
where
    L: Link,
    M: LinkMode<Value = L::Value>,
    C: Comparator<M::Key>,
{
    let mut dim = node_dim(nodes, node, rank);
    loop {
        if nodes.right(node) != NodeId::NIL {
            let (cand, cand_dim) = subtree_minimum::<L, M, C>(
                nodes,
                compare,
                rank,
                nodes.right(node),
                next_dim(dim, rank),
                dim,
            );
            nodes.swap(node, cand);
            dim = cand_dim;
        } else if nodes.left(node) != NodeId::NIL {
            // A left-only subtree moves to the right; the minimum extracted
            // from it next round keeps every remaining key at or above it.
            let l = nodes.left(node);
            nodes.set_left(node, NodeId::NIL);
            nodes.set_right(node, l);
        } else {
            let parent = nodes.parent(node);
            nodes.replace_child(parent, node, NodeId::NIL);
            return (nodes.release(node), parent);
        }
    }
}

/// Rebuilds `ids` into a subtree balanced around per-axis medians and
/// returns its root; the root's parent link is left to the caller. Keys
/// equal to the pivot on the cut axis are forced into the right part so the
/// strict-left ordering holds even among duplicates.
pub(crate) fn build_subtree<L, M, C>(
    nodes: &mut Nodes<L>,
    compare: &C,
    rank: usize,
    ids: &mut [NodeId],
    dim: usize,
) -> NodeId
where
    L: Link,
    M: LinkMode<Value = L::Value>,
    C: Comparator<M::Key>,
{
    debug_assert!(!ids.is_empty());
    if ids.len() == 1 {
        let node = ids[0];
        nodes.set_left(node, NodeId::NIL);
        nodes.set_right(node, NodeId::NIL);
        nodes.link_mut(node).set_weight(1);
        return node;
    }
    let mid = ids.len() / 2;
    let split;
    {
        let view: &Nodes<L> = nodes;
        order_stat::kth_by(ids, mid, |a, b| {
            let ka = M::key(view.value(*a));
            let kb = M::key(view.value(*b));
            if compare.less(dim, ka, kb) {
                Ordering::Less
            } else if compare.less(dim, kb, ka) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });
        let pivot = ids[mid];
        let mut s = 0;
        for i in 0..ids.len() {
            if compare.less(dim, M::key(view.value(ids[i])), M::key(view.value(pivot))) {
                ids.swap(s, i);
                s += 1;
            }
        }
        let at = ids[s..]
            .iter()
            .position(|&x| x == pivot)
            .expect("pivot survives its own partition")
            + s;
        ids.swap(s, at);
        split = s;
    }
    let node = ids[split];
    let weight = ids.len();
    let next = next_dim(dim, rank);
    let (left_ids, rest) = ids.split_at_mut(split);
    let right_ids = &mut rest[1..];
    let left = if left_ids.is_empty() {
        NodeId::NIL
    } else {
        build_subtree::<L, M, C>(nodes, compare, rank, left_ids, next)
    };
    let right = if right_ids.is_empty() {
        NodeId::NIL
    } else {
        build_subtree::<L, M, C>(nodes, compare, rank, right_ids, next)
    };
    nodes.set_left(node, left);
    nodes.set_right(node, right);
    if left != NodeId::NIL {
        nodes.set_parent(left, node);
    }
    if right != NodeId::NIL {
        nodes.set_parent(right, node);
    }
    nodes.link_mut(node).set_weight(weight);
    node
}

/// The frozen k-d tree: no automatic rebalancing. Inserts link at the first
/// vacant child, erases rewire locally, and balance is restored only by an
/// explicit `rebalance` or by `clone_balanced`. Duplicate keys are allowed
/// at this level.
pub struct Kdtree<R, M, C = AxisLess>
where
    R: Rank,
    M: LinkMode,
    C: Comparator<M::Key>,
{
    nodes: Nodes<KdtreeLink<M::Value>>,
    leftmost: NodeId,
    count: usize,
    rank: R,
    compare: C,
    mode: PhantomData<fn() -> M>,
}

impl<R, M, C> Kdtree<R, M, C>
where
    R: Rank,
    M: LinkMode,
    C: Comparator<M::Key>,
{
    pub fn new(rank: R) -> Self
    where
        C: Default,
    {
        Self::with_compare(rank, C::default())
    }

    pub fn with_compare(rank: R, compare: C) -> Self {
        debug_assert!(rank.rank() > 0);
        Self {
            nodes: Nodes::new(),
            leftmost: NodeId::HEADER,
            count: 0,
            rank,
            compare,
            mode: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn rank(&self) -> usize {
        self.rank.rank()
    }

    pub fn clear(&mut self) {
        self.nodes.reset();
        self.leftmost = NodeId::HEADER;
        self.count = 0;
    }

    pub fn insert(&mut self, value: M::Value) -> NodeId {
        let new = self.nodes.alloc(KdtreeLink::new(value));
        descend_attach::<_, M, _>(
            &mut self.nodes,
            &self.compare,
            self.rank.rank(),
            &mut self.leftmost,
            new,
        );
        self.count += 1;
        new
    }

    /// Removes the node and returns its value. The id must come from this
    /// tree and must not have been erased already.
    pub fn erase_at(&mut self, node: NodeId) -> M::Value {
        debug_assert!(!node.is_header());
        let (link, _) =
            erase_rewire::<_, M, _>(&mut self.nodes, &self.compare, self.rank.rank(), node);
        self.count -= 1;
        self.refresh_extrema();
        link.into_value()
    }

    /// Removes every value equivalent to `key` and returns how many went.
    pub fn erase(&mut self, key: &M::Key) -> usize {
        let mut erased = 0;
        while let Some(node) = self.find(key) {
            self.erase_at(node);
            erased += 1;
        }
        erased
    }

    /// Erases every value the predicate rejects; how many went away.
    /// Positions shuffle during the erasures but values never leave their
    /// slots, so the collected ids stay good until their own turn.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&M::Value) -> bool,
    {
        let mut ids = Vec::with_capacity(self.count);
        let mut node = self.nodes.parent(NodeId::HEADER);
        while !node.is_header() {
            ids.push(node);
            node = self.nodes.preorder_increment(node);
        }
        let mut erased = 0;
        for id in ids {
            if !keep(self.nodes.value(id)) {
                self.erase_at(id);
                erased += 1;
            }
        }
        erased
    }

    /// Rebuilds the whole tree balanced around per-axis medians.
    pub fn rebalance(&mut self) {
        if self.count < 2 {
            return;
        }
        let root = self.nodes.parent(NodeId::HEADER);
        let mut ids = Vec::with_capacity(self.count);
        let mut node = root;
        while !node.is_header() {
            ids.push(node);
            node = self.nodes.preorder_increment(node);
        }
        let new_root = build_subtree::<_, M, _>(
            &mut self.nodes,
            &self.compare,
            self.rank.rank(),
            &mut ids,
            0,
        );
        self.nodes.set_parent(NodeId::HEADER, new_root);
        self.nodes.set_parent(new_root, NodeId::HEADER);
        self.refresh_extrema();
    }

    /// A copy rebuilt around medians while copying.
    pub fn clone_balanced(&self) -> Self
    where
        M::Value: Clone,
    {
        let mut copy = self.clone();
        copy.rebalance();
        copy
    }

    fn refresh_extrema(&mut self) {
        let root = self.nodes.parent(NodeId::HEADER);
        if root.is_header() {
            self.leftmost = NodeId::HEADER;
            self.nodes.set_right(NodeId::HEADER, NodeId::HEADER);
        } else {
            self.leftmost = self.nodes.minimum(root);
            let max = self.nodes.maximum(root);
            self.nodes.set_right(NodeId::HEADER, max);
        }
    }
}

impl<R, M, C> TreeView for Kdtree<R, M, C>
where
    R: Rank,
    M: LinkMode,
    C: Comparator<M::Key>,
{
    type Mode = M;
    type Link = KdtreeLink<M::Value>;
    type Compare = C;

    fn nodes(&self) -> &Nodes<Self::Link> {
        &self.nodes
    }

    fn rank(&self) -> usize {
        self.rank.rank()
    }

    fn compare(&self) -> &C {
        &self.compare
    }

    fn len(&self) -> usize {
        self.count
    }

    fn leftmost(&self) -> NodeId {
        self.leftmost
    }
}

impl<R, M, C> MutableTree for Kdtree<R, M, C>
where
    R: Rank,
    M: LinkMode,
    C: Comparator<M::Key>,
{
    fn insert(&mut self, value: M::Value) -> NodeId {
        Kdtree::insert(self, value)
    }

    fn erase_at(&mut self, node: NodeId) -> M::Value {
        Kdtree::erase_at(self, node)
    }

    fn erase(&mut self, key: &M::Key) -> usize {
        Kdtree::erase(self, key)
    }

    fn clear(&mut self) {
        Kdtree::clear(self)
    }

    fn rebalance(&mut self) {
        Kdtree::rebalance(self)
    }

    fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&M::Value) -> bool,
    {
        Kdtree::retain(self, keep)
    }

    fn value_mut(&mut self, node: NodeId) -> &mut M::Value {
        self.nodes.link_mut(node).value_mut()
    }
}

impl<R, M, C> Clone for Kdtree<R, M, C>
where
    R: Rank,
    M: LinkMode,
    C: Comparator<M::Key>,
    M::Value: Clone,
{
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            leftmost: self.leftmost,
            count: self.count,
            rank: self.rank.clone(),
            compare: self.compare.clone(),
            mode: PhantomData,
        }
    }
}

impl<R, M, C> Default for Kdtree<R, M, C>
where
    R: Rank + Default,
    M: LinkMode,
    C: Comparator<M::Key> + Default,
{
    fn default() -> Self {
        Self::with_compare(R::default(), C::default())
    }
}

/// Whole-tree structural check used across the test modules: header wiring,
/// extremum caches, parent back-links, node count, and the per-axis
/// ordering bounds (strict on the left, inclusive on the right).
#[cfg(test)]
pub(crate) fn check_tree<T: TreeView>(tree: &T) {
    let nodes = tree.nodes();
    assert_eq!(nodes.left(NodeId::HEADER), NodeId::HEADER);
    let root = tree.root();
    if tree.len() == 0 {
        assert!(root.is_header());
        assert_eq!(nodes.right(NodeId::HEADER), NodeId::HEADER);
        assert!(tree.leftmost().is_header());
        return;
    }
    assert_eq!(nodes.parent(root), NodeId::HEADER);
    assert_eq!(nodes.right(NodeId::HEADER), nodes.maximum(root));
    assert_eq!(tree.leftmost(), nodes.minimum(root));
    let mut bounds: Vec<(Option<NodeId>, Option<NodeId>)> = vec![(None, None); tree.rank()];
    let counted = check_subtree(tree, root, 0, &mut bounds);
    assert_eq!(counted, tree.len());
}

#[cfg(test)]
fn check_subtree<T: TreeView>(
    tree: &T,
    node: NodeId,
    dim: usize,
    bounds: &mut Vec<(Option<NodeId>, Option<NodeId>)>,
) -> usize {
    for (d, bound) in bounds.iter().enumerate() {
        if let Some(lo) = bound.0 {
            assert!(
                !tree.compare().less(d, tree.key(node), tree.key(lo)),
                "key below its lower bound on axis {d}"
            );
        }
        if let Some(hi) = bound.1 {
            assert!(
                tree.compare().less(d, tree.key(node), tree.key(hi)),
                "key not strictly below its upper bound on axis {d}"
            );
        }
    }
    let mut count = 1;
    let next = next_dim(dim, tree.rank());
    let left = tree.nodes().left(node);
    if left != NodeId::NIL {
        assert_eq!(tree.nodes().parent(left), node);
        let saved = bounds[dim];
        bounds[dim].1 = Some(node);
        count += check_subtree(tree, left, next, bounds);
        bounds[dim] = saved;
    }
    let right = tree.nodes().right(node);
    if right != NodeId::NIL {
        assert_eq!(tree.nodes().parent(right), node);
        let saved = bounds[dim];
        bounds[dim].0 = Some(node);
        count += check_subtree(tree, right, next, bounds);
        bounds[dim] = saved;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::SetMode;
    use crate::{SpatialQueries, StaticRank};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    type Tree2 = Kdtree<StaticRank<2>, SetMode<[i32; 2]>>;

    fn sorted(tree: &Tree2) -> Vec<[i32; 2]> {
        let mut all: Vec<[i32; 2]> = tree.iter().copied().collect();
        all.sort();
        all
    }

    #[test]
    fn empty_tree() {
        let tree = Tree2::default();
        check_tree(&tree);
        assert!(tree.is_empty());
        assert_eq!(tree.iter().next(), None);
        assert_eq!(tree.iter().next_back(), None);
        assert_eq!(tree.find(&[0, 0]), None);
    }

    #[test]
    fn insert_wires_descending_chain() {
        let mut tree = Tree2::default();
        for p in [[3, 3], [2, 2], [1, 1], [0, 0]] {
            tree.insert(p);
            check_tree(&tree);
        }
        assert_eq!(tree.len(), 4);
        let inorder: Vec<[i32; 2]> = tree.iter().copied().collect();
        assert_eq!(inorder, vec![[0, 0], [1, 1], [2, 2], [3, 3]]);
        // Backward iteration starts at the inorder maximum.
        assert_eq!(tree.iter().next_back(), Some(&[3, 3]));
    }

    #[test]
    fn find_honors_every_axis() {
        let mut tree = Tree2::default();
        tree.insert([1, 2]);
        tree.insert([1, 3]);
        tree.insert([0, 2]);
        assert!(tree.find(&[1, 3]).is_some());
        assert!(tree.find(&[3, 1]).is_none());
        assert_eq!(*tree.value(tree.find(&[0, 2]).unwrap()), [0, 2]);
    }

    #[test]
    fn duplicates_are_kept_and_counted() {
        let mut tree = Tree2::default();
        tree.insert([5, 5]);
        tree.insert([5, 5]);
        tree.insert([5, 5]);
        check_tree(&tree);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.erase(&[5, 5]), 3);
        check_tree(&tree);
        assert!(tree.is_empty());
    }

    #[test]
    fn insert_then_erase_restores_multiset() {
        let mut tree = Tree2::default();
        for p in [[4, 1], [2, 8], [6, 3], [2, 8], [0, 0]] {
            tree.insert(p);
        }
        let before = sorted(&tree);
        let id = tree.insert([3, 3]);
        tree.erase_at(id);
        check_tree(&tree);
        assert_eq!(sorted(&tree), before);
    }

    #[test]
    fn erase_at_keeps_ordering() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut tree = Tree2::default();
        let mut ids = Vec::new();
        for _ in 0..120 {
            let p = [rng.gen_range(-20..20), rng.gen_range(-20..20)];
            ids.push((tree.insert(p), p));
        }
        check_tree(&tree);
        while let Some((id, p)) = ids.pop() {
            let got = tree.erase_at(id);
            assert_eq!(got, p);
            check_tree(&tree);
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn rebalance_preserves_contents() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut tree = Tree2::default();
        for _ in 0..200 {
            tree.insert([rng.gen_range(-9..9), rng.gen_range(-9..9)]);
        }
        let before = sorted(&tree);
        tree.rebalance();
        check_tree(&tree);
        assert_eq!(sorted(&tree), before);
    }

    #[test]
    fn rebalance_handles_duplicates() {
        let mut tree = Tree2::default();
        for _ in 0..17 {
            tree.insert([1, 1]);
        }
        for _ in 0..5 {
            tree.insert([1, 2]);
        }
        tree.rebalance();
        check_tree(&tree);
        assert_eq!(tree.len(), 22);
    }

    #[test]
    fn clone_balanced_is_equal_and_valid() {
        let mut tree = Tree2::default();
        for i in 0..60 {
            tree.insert([i, -i]);
        }
        let copy = tree.clone_balanced();
        check_tree(&copy);
        assert_eq!(sorted(&tree), sorted(&copy));
        // The source is untouched.
        assert_eq!(tree.len(), 60);
        check_tree(&tree);
    }

    #[test]
    fn retain_erases_by_predicate() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut tree = Tree2::default();
        for _ in 0..150 {
            tree.insert([rng.gen_range(-10..10), rng.gen_range(-10..10)]);
        }
        let expect: Vec<[i32; 2]> = sorted(&tree)
            .into_iter()
            .filter(|p| p[0] + p[1] >= 0)
            .collect();
        let gone = tree.retain(|p| p[0] + p[1] >= 0);
        check_tree(&tree);
        assert_eq!(gone, 150 - expect.len());
        assert_eq!(sorted(&tree), expect);
    }

    #[test]
    fn clear_resets_everything() {
        let mut tree = Tree2::default();
        tree.insert([1, 1]);
        tree.insert([2, 2]);
        tree.clear();
        check_tree(&tree);
        assert!(tree.is_empty());
        tree.insert([3, 3]);
        check_tree(&tree);
        assert_eq!(tree.len(), 1);
    }
}
