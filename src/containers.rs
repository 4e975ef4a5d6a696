use crate::node::{next_dim, MapMode, MutableTree, NodeId, Nodes, SetMode, TreeView, ValueOf};
use crate::relaxed::{RelaxedKdtree, TightBalancing};
use crate::tree::Kdtree;
use crate::value::{AxisLess, Comparator};
use crate::DynamicRank;

/// Unique-key container over any tree core; the stored value is the key.
#[derive(Clone, Debug, Default)]
pub struct SpatialSet<T> {
    tree: T,
}

/// Unique-key to mapped-value container over any tree core.
#[derive(Clone, Debug, Default)]
pub struct SpatialMap<T> {
    tree: T,
}

/// Key to mapped-value container keeping duplicate keys.
#[derive(Clone, Debug, Default)]
pub struct SpatialMultimap<T> {
    tree: T,
}

macro_rules! delegate_tree_view {
    ($ty:ident) => {
        impl<T: TreeView> TreeView for $ty<T> {
            type Mode = T::Mode;
            type Link = T::Link;
            type Compare = T::Compare;

            fn nodes(&self) -> &Nodes<T::Link> {
                self.tree.nodes()
            }

            fn rank(&self) -> usize {
                self.tree.rank()
            }

            fn compare(&self) -> &T::Compare {
                self.tree.compare()
            }

            fn len(&self) -> usize {
                self.tree.len()
            }

            fn leftmost(&self) -> NodeId {
                self.tree.leftmost()
            }
        }
    };
}

delegate_tree_view!(SpatialSet);
delegate_tree_view!(SpatialMap);
delegate_tree_view!(SpatialMultimap);

macro_rules! container_common {
    ($ty:ident) => {
        impl<T: MutableTree> $ty<T> {
            /// Wraps a tree core; `Default` covers the common case of a
            /// compile-time rank.
            pub fn new(tree: T) -> Self {
                Self { tree }
            }

            pub fn len(&self) -> usize {
                TreeView::len(&self.tree)
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Number of axes the container compares on; box containers
            /// report twice their user dimension.
            pub fn rank(&self) -> usize {
                TreeView::rank(&self.tree)
            }

            pub fn clear(&mut self) {
                self.tree.clear();
            }

            /// Rebuilds the underlying tree balanced around per-axis
            /// medians.
            pub fn rebalance(&mut self) {
                self.tree.rebalance();
            }

            /// Erases every stored value the predicate rejects; how many
            /// went away.
            pub fn retain<F>(&mut self, keep: F) -> usize
            where
                F: FnMut(&ValueOf<T>) -> bool,
            {
                self.tree.retain(keep)
            }

            /// A copy rebuilt around medians while copying.
            pub fn clone_balanced(&self) -> Self
            where
                T: Clone,
            {
                let mut tree = self.tree.clone();
                tree.rebalance();
                Self { tree }
            }
        }
    };
}

container_common!(SpatialSet);
container_common!(SpatialMap);
container_common!(SpatialMultimap);

impl<K, T> SpatialSet<T>
where
    T: MutableTree + TreeView<Mode = SetMode<K>>,
{
    /// Inserts unless an equal key is already present; whether it went in.
    pub fn insert(&mut self, value: K) -> bool {
        if self.tree.find(&value).is_some() {
            return false;
        }
        self.tree.insert(value);
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        self.tree.find(key).is_some()
    }

    pub fn get(&self, key: &K) -> Option<&K> {
        self.tree.find(key).map(|node| self.tree.value(node))
    }

    /// Removes the equal key if present; whether one went away.
    pub fn remove(&mut self, key: &K) -> bool {
        self.tree.erase(key) > 0
    }
}

impl<K, V, T> SpatialMap<T>
where
    T: MutableTree + TreeView<Mode = MapMode<K, V>>,
{
    /// Inserts or replaces; the previous mapped value comes back.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.tree.find(&key) {
            Some(node) => Some(std::mem::replace(&mut self.tree.value_mut(node).1, value)),
            None => {
                self.tree.insert((key, value));
                None
            }
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.tree.find(key).is_some()
    }

    pub fn get<'a>(&'a self, key: &K) -> Option<&'a V>
    where
        K: 'a,
    {
        self.tree.find(key).map(|node| &self.tree.value(node).1)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.tree.find(key).map(|node| self.tree.erase_at(node).1)
    }
}

impl<K, V, T> SpatialMultimap<T>
where
    T: MutableTree + TreeView<Mode = MapMode<K, V>>,
{
    pub fn insert(&mut self, key: K, value: V) {
        self.tree.insert((key, value));
    }

    pub fn contains(&self, key: &K) -> bool {
        self.tree.find(key).is_some()
    }

    /// The first mapped value under an equal key, in descent order.
    pub fn get<'a>(&'a self, key: &K) -> Option<&'a V>
    where
        K: 'a,
    {
        self.tree.find(key).map(|node| &self.tree.value(node).1)
    }

    /// Every mapped value under an equal key. Equal keys always descend to
    /// the right, so one root-to-leaf walk finds them all.
    pub fn get_all<'a>(&'a self, key: &K) -> Vec<&'a V>
    where
        K: 'a,
    {
        let mut out = Vec::new();
        let mut node = self.tree.root();
        if node.is_header() {
            return out;
        }
        let rank = self.tree.rank();
        let mut dim = 0;
        while node != NodeId::NIL {
            if self.tree.compare().less(dim, key, self.tree.key(node)) {
                node = self.tree.nodes().left(node);
            } else {
                if self.tree.compare().equal(rank, key, self.tree.key(node)) {
                    out.push(&self.tree.value(node).1);
                }
                node = self.tree.nodes().right(node);
            }
            dim = next_dim(dim, rank);
        }
        out
    }

    /// Removes every entry under an equal key; how many went away.
    pub fn remove(&mut self, key: &K) -> usize {
        self.tree.erase(key)
    }
}

/// Self-balancing point containers.
pub type PointSet<K, R = DynamicRank, C = AxisLess, B = TightBalancing> =
    SpatialSet<RelaxedKdtree<R, SetMode<K>, C, B>>;
pub type PointMap<K, V, R = DynamicRank, C = AxisLess, B = TightBalancing> =
    SpatialMap<RelaxedKdtree<R, MapMode<K, V>, C, B>>;
pub type PointMultimap<K, V, R = DynamicRank, C = AxisLess, B = TightBalancing> =
    SpatialMultimap<RelaxedKdtree<R, MapMode<K, V>, C, B>>;

/// Point containers that only rebalance on demand.
pub type FrozenPointSet<K, R = DynamicRank, C = AxisLess> = SpatialSet<Kdtree<R, SetMode<K>, C>>;
pub type FrozenPointMap<K, V, R = DynamicRank, C = AxisLess> =
    SpatialMap<Kdtree<R, MapMode<K, V>, C>>;
pub type FrozenPointMultimap<K, V, R = DynamicRank, C = AxisLess> =
    SpatialMultimap<Kdtree<R, MapMode<K, V>, C>>;

/// Box containers: keys carry one low and one high coordinate per user
/// dimension (even axes low, odd axes high), so the stored rank doubles.
/// Construct with `BoxRank<D>` or `DynamicRank::for_boxes`.
pub type BoxSet<K, R = DynamicRank, C = AxisLess, B = TightBalancing> =
    SpatialSet<RelaxedKdtree<R, SetMode<K>, C, B>>;
pub type BoxMap<K, V, R = DynamicRank, C = AxisLess, B = TightBalancing> =
    SpatialMap<RelaxedKdtree<R, MapMode<K, V>, C, B>>;
pub type BoxMultimap<K, V, R = DynamicRank, C = AxisLess, B = TightBalancing> =
    SpatialMultimap<RelaxedKdtree<R, MapMode<K, V>, C, B>>;
pub type FrozenBoxSet<K, R = DynamicRank, C = AxisLess> = SpatialSet<Kdtree<R, SetMode<K>, C>>;
pub type FrozenBoxMap<K, V, R = DynamicRank, C = AxisLess> =
    SpatialMap<Kdtree<R, MapMode<K, V>, C>>;
pub type FrozenBoxMultimap<K, V, R = DynamicRank, C = AxisLess> =
    SpatialMultimap<Kdtree<R, MapMode<K, V>, C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::EuclidianSquare;
    use crate::region::overlap_bounds;
    use crate::{BoxRank, SpatialQueries, StaticRank, TrellisError};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn set_keeps_keys_unique() {
        let mut set: PointSet<[i32; 2], StaticRank<2>> = PointSet::default();
        assert!(set.insert([1, 2]));
        assert!(set.insert([2, 1]));
        assert!(!set.insert([1, 2]));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&[1, 2]));
        assert!(!set.contains(&[2, 2]));
        assert!(set.remove(&[1, 2]));
        assert!(!set.remove(&[1, 2]));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn map_replaces_and_returns_old_values() {
        let mut map: PointMap<[i32; 2], &'static str, StaticRank<2>> = PointMap::default();
        assert_eq!(map.insert([0, 0], "origin"), None);
        assert_eq!(map.insert([1, 1], "one"), None);
        assert_eq!(map.insert([0, 0], "zero"), Some("origin"));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&[0, 0]), Some(&"zero"));
        assert_eq!(map.remove(&[0, 0]), Some("zero"));
        assert_eq!(map.get(&[0, 0]), None);
    }

    #[test]
    fn map_iteration_yields_pairs() {
        let mut map: FrozenPointMap<[i32; 2], i32, StaticRank<2>> = FrozenPointMap::default();
        map.insert([2, 2], 20);
        map.insert([1, 1], 10);
        let pairs: Vec<([i32; 2], i32)> = map.iter().cloned().collect();
        assert_eq!(pairs, vec![([1, 1], 10), ([2, 2], 20)]);
    }

    #[test]
    fn multimap_keeps_duplicates() {
        let mut mm: PointMultimap<[i32; 2], i32, StaticRank<2>> = PointMultimap::default();
        mm.insert([3, 3], 1);
        mm.insert([3, 3], 2);
        mm.insert([3, 3], 3);
        mm.insert([0, 0], 9);
        assert_eq!(mm.len(), 4);
        let mut all: Vec<i32> = mm.get_all(&[3, 3]).into_iter().copied().collect();
        all.sort();
        assert_eq!(all, vec![1, 2, 3]);
        assert_eq!(mm.remove(&[3, 3]), 3);
        assert_eq!(mm.len(), 1);
        assert!(mm.get_all(&[3, 3]).is_empty());
    }

    #[test]
    fn runtime_rank_containers() {
        let rank = DynamicRank::new(3).expect("positive rank");
        let mut set: PointSet<Vec<i32>> = PointSet::new(RelaxedKdtree::new(rank));
        assert!(set.insert(vec![1, 2, 3]));
        assert!(set.insert(vec![4, 5, 6]));
        assert_eq!(set.rank(), 3);
        assert!(set.contains(&vec![1, 2, 3]));
        assert_eq!(DynamicRank::new(0).unwrap_err(), TrellisError::InvalidRank);
    }

    #[test]
    fn box_set_overlap_query() {
        let mut boxes: FrozenBoxSet<[i32; 4], BoxRank<2>> = FrozenBoxSet::default();
        // [low x, high x, low y, high y]
        boxes.insert([0, 2, 0, 2]);
        boxes.insert([1, 3, 1, 3]);
        boxes.insert([5, 6, 5, 6]);
        boxes.insert([-4, -2, -4, -2]);
        assert_eq!(boxes.rank(), 4);
        let mut hits: Vec<[i32; 4]> = boxes
            .region(overlap_bounds(AxisLess, [2, 4, 2, 4]))
            .copied()
            .collect();
        hits.sort();
        assert_eq!(hits, vec![[0, 2, 0, 2], [1, 3, 1, 3]]);
    }

    #[test]
    fn queries_reach_through_the_wrappers() {
        let mut set: PointSet<[i32; 2], StaticRank<2>> = PointSet::default();
        for i in 0..30 {
            set.insert([i, 29 - i]);
        }
        let on_axis1: Vec<[i32; 2]> = set.mapping(1).copied().collect();
        for pair in on_axis1.windows(2) {
            assert!(pair[0][1] <= pair[1][1]);
        }
        let (d, nearest) = set
            .neighbors(EuclidianSquare::<f64>::new(), [0, 0])
            .next()
            .expect("non-empty");
        // Both [14, 15] and [15, 14] sit at the minimum squared distance.
        assert_eq!(d, 421.0);
        assert!(*nearest == [14, 15] || *nearest == [15, 14]);
    }

    #[test]
    fn balancing_copy_preserves_query_results() {
        let mut rng = StdRng::seed_from_u64(51);
        let mut set: FrozenPointSet<[i32; 2], StaticRank<2>> = FrozenPointSet::default();
        for _ in 0..80 {
            set.insert([rng.gen_range(-30..30), rng.gen_range(-30..30)]);
        }
        let copy = set.clone_balanced();
        assert_eq!(copy.len(), set.len());
        // Same multiset.
        let mut a: Vec<[i32; 2]> = set.iter().copied().collect();
        let mut b: Vec<[i32; 2]> = copy.iter().copied().collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        // Same per-axis value sequences.
        for axis in 0..2 {
            let va: Vec<i32> = set.mapping(axis).map(|p| p[axis]).collect();
            let vb: Vec<i32> = copy.mapping(axis).map(|p| p[axis]).collect();
            assert_eq!(va, vb);
        }
        // Same distance sweeps.
        let metric = EuclidianSquare::<f64>::new();
        for _ in 0..5 {
            let target = [rng.gen_range(-30..30), rng.gen_range(-30..30)];
            let da: Vec<f64> = set.neighbors(metric, target).map(|(d, _)| d).collect();
            let db: Vec<f64> = copy.neighbors(metric, target).map(|(d, _)| d).collect();
            assert_eq!(da, db);
        }
    }

    #[test]
    fn retain_reaches_through_the_wrappers() {
        let mut map: PointMap<[i32; 2], u32, StaticRank<2>> = PointMap::default();
        for i in 0..40 {
            map.insert([i, -i], i as u32);
        }
        let gone = map.retain(|(_, mapped)| mapped % 2 == 0);
        assert_eq!(gone, 20);
        assert_eq!(map.len(), 20);
        assert_eq!(map.get(&[2, -2]), Some(&2));
        assert_eq!(map.get(&[3, -3]), None);
    }

    #[test]
    fn cleared_wrapper_accepts_new_content() {
        let mut set: PointSet<[i32; 3], StaticRank<3>> = PointSet::default();
        for i in 0..10 {
            set.insert([i, i, i]);
        }
        set.clear();
        assert!(set.is_empty());
        assert!(set.insert([7, 7, 7]));
        assert_eq!(set.len(), 1);
    }
}
