use std::cmp::Ordering;

use num_traits::Zero;

use crate::error::TrellisError;
use crate::metric::Metric;
use crate::node::{next_dim, KeyOf, NodeId, TreeView, ValueOf};
use crate::value::{Comparator, TotalOrd};

fn dist<T, Me>(tree: &T, metric: &Me, target: &KeyOf<T>, node: NodeId) -> Me::Distance
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    metric.distance_to_key(tree.rank(), target, tree.key(node))
}

fn better_min<T, Me>(
    tree: &T,
    best: &Option<(NodeId, Me::Distance)>,
    node: NodeId,
    d: &Me::Distance,
) -> bool
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    match best {
        None => true,
        Some((bn, bd)) => match d.total_cmp(bd) {
            Ordering::Less => true,
            Ordering::Equal => tree.nodes().precedes(node, *bn),
            Ordering::Greater => false,
        },
    }
}

fn better_max<T, Me>(
    tree: &T,
    best: &Option<(NodeId, Me::Distance)>,
    node: NodeId,
    d: &Me::Distance,
) -> bool
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    match best {
        None => true,
        Some((bn, bd)) => match d.total_cmp(bd) {
            Ordering::Greater => true,
            Ordering::Equal => tree.nodes().precedes(*bn, node),
            Ordering::Less => false,
        },
    }
}

/// Closest node to the target; equal distances fall back to the earliest
/// inorder position.
pub(crate) fn nbr_minimum<T, Me>(
    tree: &T,
    metric: &Me,
    target: &KeyOf<T>,
) -> Option<(NodeId, Me::Distance)>
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    let root = tree.root();
    if root.is_header() {
        return None;
    }
    let mut best = None;
    min_rec(tree, metric, target, root, 0, &mut best);
    best
}

fn min_rec<T, Me>(
    tree: &T,
    metric: &Me,
    target: &KeyOf<T>,
    node: NodeId,
    dim: usize,
    best: &mut Option<(NodeId, Me::Distance)>,
) where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    if node == NodeId::NIL {
        return;
    }
    let d = dist(tree, metric, target, node);
    if better_min::<T, Me>(tree, best, node, &d) {
        *best = Some((node, d));
    }
    let next = next_dim(dim, tree.rank());
    let near_left = tree.compare().less(dim, target, tree.key(node));
    let (near, far) = if near_left {
        (tree.nodes().left(node), tree.nodes().right(node))
    } else {
        (tree.nodes().right(node), tree.nodes().left(node))
    };
    min_rec(tree, metric, target, near, next, best);
    let dp = metric.distance_to_plane(tree.rank(), dim, target, tree.key(node));
    let explore_far = match best {
        None => true,
        // Equal plane distance can still hide an equal-distance candidate
        // that wins the inorder tie.
        Some((_, bd)) => dp.total_cmp(bd) != Ordering::Greater,
    };
    if explore_far {
        min_rec(tree, metric, target, far, next, best);
    }
}

/// Farthest node from the target; equal distances fall back to the latest
/// inorder position. A half-space never bounds distances from above, so
/// this walks the whole tree.
pub(crate) fn nbr_maximum<T, Me>(
    tree: &T,
    metric: &Me,
    target: &KeyOf<T>,
) -> Option<(NodeId, Me::Distance)>
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    let root = tree.root();
    if root.is_header() {
        return None;
    }
    let mut best = None;
    max_rec(tree, metric, target, root, &mut best);
    best
}

fn max_rec<T, Me>(
    tree: &T,
    metric: &Me,
    target: &KeyOf<T>,
    node: NodeId,
    best: &mut Option<(NodeId, Me::Distance)>,
) where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    if node == NodeId::NIL {
        return;
    }
    let d = dist(tree, metric, target, node);
    if better_max::<T, Me>(tree, best, node, &d) {
        *best = Some((node, d));
    }
    max_rec(tree, metric, target, tree.nodes().left(node), best);
    max_rec(tree, metric, target, tree.nodes().right(node), best);
}

/// Nearest node strictly after `(cur_dist, cur)` in distance-then-inorder
/// order.
pub(crate) fn nbr_successor<T, Me>(
    tree: &T,
    metric: &Me,
    target: &KeyOf<T>,
    cur: NodeId,
    cur_dist: &Me::Distance,
) -> Option<(NodeId, Me::Distance)>
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    let mut best = None;
    succ_rec(tree, metric, target, cur, cur_dist, tree.root(), 0, &mut best);
    best
}

#[allow(clippy::too_many_arguments)]
fn succ_rec<T, Me>(
    tree: &T,
    metric: &Me,
    target: &KeyOf<T>,
    cur: NodeId,
    cur_dist: &Me::Distance,
    node: NodeId,
    dim: usize,
    best: &mut Option<(NodeId, Me::Distance)>,
) where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    if node == NodeId::NIL {
        return;
    }
    let d = dist(tree, metric, target, node);
    let candidate = match d.total_cmp(cur_dist) {
        Ordering::Greater => true,
        Ordering::Equal => tree.nodes().precedes(cur, node),
        Ordering::Less => false,
    };
    if candidate && better_min::<T, Me>(tree, best, node, &d) {
        *best = Some((node, d));
    }
    let next = next_dim(dim, tree.rank());
    let near_left = tree.compare().less(dim, target, tree.key(node));
    let (near, far) = if near_left {
        (tree.nodes().left(node), tree.nodes().right(node))
    } else {
        (tree.nodes().right(node), tree.nodes().left(node))
    };
    // The near side cannot be bounded from below, so it is always walked.
    succ_rec(tree, metric, target, cur, cur_dist, near, next, best);
    let dp = metric.distance_to_plane(tree.rank(), dim, target, tree.key(node));
    let explore_far = match best {
        None => true,
        Some((_, bd)) => dp.total_cmp(bd) != Ordering::Greater,
    };
    if explore_far {
        succ_rec(tree, metric, target, cur, cur_dist, far, next, best);
    }
}

/// Farthest node strictly before `(cur_dist, cur)` in distance-then-inorder
/// order.
pub(crate) fn nbr_predecessor<T, Me>(
    tree: &T,
    metric: &Me,
    target: &KeyOf<T>,
    cur: NodeId,
    cur_dist: &Me::Distance,
) -> Option<(NodeId, Me::Distance)>
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    let mut best = None;
    pred_rec(tree, metric, target, cur, cur_dist, tree.root(), 0, &mut best);
    best
}

#[allow(clippy::too_many_arguments)]
fn pred_rec<T, Me>(
    tree: &T,
    metric: &Me,
    target: &KeyOf<T>,
    cur: NodeId,
    cur_dist: &Me::Distance,
    node: NodeId,
    dim: usize,
    best: &mut Option<(NodeId, Me::Distance)>,
) where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    if node == NodeId::NIL {
        return;
    }
    let d = dist(tree, metric, target, node);
    let candidate = match d.total_cmp(cur_dist) {
        Ordering::Less => true,
        Ordering::Equal => tree.nodes().precedes(node, cur),
        Ordering::Greater => false,
    };
    if candidate && better_max::<T, Me>(tree, best, node, &d) {
        *best = Some((node, d));
    }
    let next = next_dim(dim, tree.rank());
    let near_left = tree.compare().less(dim, target, tree.key(node));
    let (near, far) = if near_left {
        (tree.nodes().left(node), tree.nodes().right(node))
    } else {
        (tree.nodes().right(node), tree.nodes().left(node))
    };
    pred_rec(tree, metric, target, cur, cur_dist, near, next, best);
    // Beyond the plane every distance reaches at least dp; nothing there
    // can sit below the current distance once dp passes it.
    let dp = metric.distance_to_plane(tree.rank(), dim, target, tree.key(node));
    if dp.total_cmp(cur_dist) != Ordering::Greater {
        pred_rec(tree, metric, target, cur, cur_dist, far, next, best);
    }
}

/// Closest node whose distance reaches `bound` (strictly passes it when
/// `strict`).
pub(crate) fn nbr_bound<T, Me>(
    tree: &T,
    metric: &Me,
    target: &KeyOf<T>,
    bound: &Me::Distance,
    strict: bool,
) -> Option<(NodeId, Me::Distance)>
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    let root = tree.root();
    if root.is_header() {
        return None;
    }
    let mut best = None;
    bound_rec(tree, metric, target, bound, strict, root, 0, &mut best);
    best
}

#[allow(clippy::too_many_arguments)]
fn bound_rec<T, Me>(
    tree: &T,
    metric: &Me,
    target: &KeyOf<T>,
    bound: &Me::Distance,
    strict: bool,
    node: NodeId,
    dim: usize,
    best: &mut Option<(NodeId, Me::Distance)>,
) where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    if node == NodeId::NIL {
        return;
    }
    let d = dist(tree, metric, target, node);
    let candidate = match d.total_cmp(bound) {
        Ordering::Greater => true,
        Ordering::Equal => !strict,
        Ordering::Less => false,
    };
    if candidate && better_min::<T, Me>(tree, best, node, &d) {
        *best = Some((node, d));
    }
    let next = next_dim(dim, tree.rank());
    let near_left = tree.compare().less(dim, target, tree.key(node));
    let (near, far) = if near_left {
        (tree.nodes().left(node), tree.nodes().right(node))
    } else {
        (tree.nodes().right(node), tree.nodes().left(node))
    };
    bound_rec(tree, metric, target, bound, strict, near, next, best);
    let dp = metric.distance_to_plane(tree.rank(), dim, target, tree.key(node));
    let explore_far = match best {
        None => true,
        Some((_, bd)) => dp.total_cmp(bd) != Ordering::Greater,
    };
    if explore_far {
        bound_rec(tree, metric, target, bound, strict, far, next, best);
    }
}

/// A bidirectional cursor over a tree in order of metric distance to a
/// fixed target. `next` walks toward farther elements; `prev` steps back,
/// landing on the farthest element when the cursor sits past the end. The
/// distance of the current element is cached and read back in O(1).
///
/// Equal distances order by inorder position, so every duplicate comes out
/// exactly once.
pub struct NeighborIter<'a, T, Me>
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    tree: &'a T,
    metric: Me,
    target: KeyOf<T>,
    current: Option<(NodeId, Me::Distance)>,
}

impl<'a, T, Me> std::fmt::Debug for NeighborIter<'a, T, Me>
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeighborIter").finish_non_exhaustive()
    }
}

impl<'a, T, Me> NeighborIter<'a, T, Me>
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    pub(crate) fn nearest(tree: &'a T, metric: Me, target: KeyOf<T>) -> Self {
        let current = nbr_minimum(tree, &metric, &target);
        Self {
            tree,
            metric,
            target,
            current,
        }
    }

    pub(crate) fn past_the_end(tree: &'a T, metric: Me, target: KeyOf<T>) -> Self {
        Self {
            tree,
            metric,
            target,
            current: None,
        }
    }

    pub(crate) fn with_lower_bound(
        tree: &'a T,
        metric: Me,
        target: KeyOf<T>,
        bound: Me::Distance,
    ) -> Result<Self, TrellisError>
    where
        Me::Distance: Zero,
    {
        if bound.total_cmp(&Me::Distance::zero()) == Ordering::Less {
            return Err(TrellisError::NegativeDistance);
        }
        let current = nbr_bound(tree, &metric, &target, &bound, false);
        Ok(Self {
            tree,
            metric,
            target,
            current,
        })
    }

    pub(crate) fn with_upper_bound(
        tree: &'a T,
        metric: Me,
        target: KeyOf<T>,
        bound: Me::Distance,
    ) -> Result<Self, TrellisError>
    where
        Me::Distance: Zero,
    {
        if bound.total_cmp(&Me::Distance::zero()) == Ordering::Less {
            return Err(TrellisError::NegativeDistance);
        }
        let current = nbr_bound(tree, &metric, &target, &bound, true);
        Ok(Self {
            tree,
            metric,
            target,
            current,
        })
    }

    /// Distance of the element the cursor sits on; `None` past the end.
    pub fn distance(&self) -> Option<&Me::Distance> {
        self.current.as_ref().map(|(_, d)| d)
    }

    /// The target the iteration orders around.
    pub fn target(&self) -> &KeyOf<T> {
        &self.target
    }

    /// Steps the cursor back and returns its new element: the nearest one
    /// below the current distance, or the farthest element when the cursor
    /// sits past the end. Exhausting the near end parks the cursor past the
    /// end and yields `None`.
    pub fn prev(&mut self) -> Option<(Me::Distance, &'a ValueOf<T>)> {
        let tree = self.tree;
        let found = match &self.current {
            None => nbr_maximum(tree, &self.metric, &self.target),
            Some((node, d)) => nbr_predecessor(tree, &self.metric, &self.target, *node, d),
        };
        self.current = found;
        match &self.current {
            Some((node, d)) => Some((d.clone(), tree.value(*node))),
            None => None,
        }
    }
}

impl<'a, T, Me> Iterator for NeighborIter<'a, T, Me>
where
    T: TreeView,
    Me: Metric<KeyOf<T>>,
{
    type Item = (Me::Distance, &'a ValueOf<T>);

    fn next(&mut self) -> Option<Self::Item> {
        let (cur, cur_dist) = self.current.take()?;
        self.current = nbr_successor(self.tree, &self.metric, &self.target, cur, &cur_dist);
        Some((cur_dist, self.tree.value(cur)))
    }
}
