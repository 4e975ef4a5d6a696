//! Multi-dimensional associative containers over the k-d tree family.
//!
//! Two tree cores carry all the semantics: [`Kdtree`] never rebalances on
//! its own (balance is restored by [`Kdtree::rebalance`] or a balancing
//! copy), while [`RelaxedKdtree`] tracks subtree weights and rebuilds any
//! subtree that drifts outside its weight policy. Both answer three query
//! families: plain and per-axis ordered traversal ([`SpatialQueries::iter`],
//! [`SpatialQueries::mapping`]), orthogonal region queries
//! ([`SpatialQueries::region`]) and metric-ordered neighbor traversal
//! ([`SpatialQueries::neighbors`]).
//!
//! ```
//! use trellis::{EuclidianSquare, PointSet, SpatialQueries, StaticRank};
//!
//! let mut points: PointSet<[i32; 2], StaticRank<2>> = PointSet::default();
//! points.insert([1, 2]);
//! points.insert([3, 4]);
//! points.insert([1, 2]);
//! assert_eq!(points.len(), 2);
//!
//! let (d, nearest) = points
//!     .neighbors(EuclidianSquare::<f64>::new(), [0, 0])
//!     .next()
//!     .unwrap();
//! assert_eq!(*nearest, [1, 2]);
//! assert_eq!(d, 5.0);
//! ```

#![forbid(unsafe_code)]

use num_traits::Zero;

pub mod containers;
pub mod error;
pub mod mapping;
pub mod metric;
pub mod neighbor;
pub mod node;
pub mod region;
pub mod relaxed;
pub mod tree;
pub mod value;

pub use containers::{
    BoxMap, BoxMultimap, BoxSet, FrozenBoxMap, FrozenBoxMultimap, FrozenBoxSet, FrozenPointMap,
    FrozenPointMultimap, FrozenPointSet, PointMap, PointMultimap, PointSet, SpatialMap,
    SpatialMultimap, SpatialSet,
};
pub use error::TrellisError;
pub use mapping::MappingIter;
pub use metric::{Chebyshev, Euclidian, EuclidianSquare, Manhattan, Metric};
pub use neighbor::NeighborIter;
pub use node::{
    Iter, KeyOf, LinkMode, MapMode, MutableTree, NodeId, SetMode, TreeView, ValueOf,
};
pub use region::{
    bounds, closed_bounds, enclosed_bounds, open_bounds, overlap_bounds, Bounds, ClosedBounds,
    EnclosedBounds, OpenBounds, OverlapBounds, RegionIter, RegionPredicate, RelativeOrder,
};
pub use relaxed::{Balancing, LooseBalancing, RelaxedKdtree, TightBalancing, WeightRatio};
pub use tree::Kdtree;
pub use value::{Axes, AxisLess, Comparator, RegularComparator, TotalOrd};

/// Number of coordinate axes a container compares on. Box containers hold a
/// doubled rank, one low and one high axis per user dimension.
pub trait Rank: Clone {
    fn rank(&self) -> usize;
}

/// Compile-time rank.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct StaticRank<const D: usize>;

impl<const D: usize> Rank for StaticRank<D> {
    #[inline]
    fn rank(&self) -> usize {
        D
    }
}

/// Rank picked at run time; zero is rejected at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DynamicRank(usize);

impl DynamicRank {
    pub fn new(dim: usize) -> Result<Self, TrellisError> {
        if dim == 0 {
            Err(TrellisError::InvalidRank)
        } else {
            Ok(Self(dim))
        }
    }

    /// Rank for a box container over `dim` user dimensions; the stored rank
    /// doubles so each box becomes a point over low/high axis pairs.
    pub fn for_boxes(dim: usize) -> Result<Self, TrellisError> {
        if dim == 0 {
            Err(TrellisError::InvalidRank)
        } else {
            Ok(Self(dim * 2))
        }
    }
}

impl Rank for DynamicRank {
    #[inline]
    fn rank(&self) -> usize {
        self.0
    }
}

/// Compile-time rank for box containers: `D` user dimensions stored over
/// `2 * D` axes.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct BoxRank<const D: usize>;

impl<const D: usize> BoxRank<D> {
    /// The user-visible box dimension.
    pub const fn dimension() -> usize {
        D
    }
}

impl<const D: usize> Rank for BoxRank<D> {
    #[inline]
    fn rank(&self) -> usize {
        2 * D
    }
}

/// The query surface every tree answers; blanket-implemented over anything
/// that exposes a tree view, containers and cores alike.
pub trait SpatialQueries: TreeView + Sized {
    /// Inorder traversal of the stored values.
    fn iter(&self) -> Iter<'_, Self> {
        Iter::new(self)
    }

    /// Traversal ordered on one chosen axis.
    fn mapping(&self, dim: usize) -> MappingIter<'_, Self> {
        MappingIter::new(self, dim)
    }

    /// Mapping traversal starting at the first value whose `dim` axis does
    /// not fall below `bound`'s.
    fn mapping_lower_bound(&self, dim: usize, bound: &KeyOf<Self>) -> MappingIter<'_, Self> {
        MappingIter::with_lower_bound(self, dim, bound)
    }

    /// Mapping traversal starting at the first value strictly above `bound`
    /// on the `dim` axis.
    fn mapping_upper_bound(&self, dim: usize, bound: &KeyOf<Self>) -> MappingIter<'_, Self> {
        MappingIter::with_upper_bound(self, dim, bound)
    }

    /// Inorder traversal of the values matching `predicate` on every axis.
    fn region<P>(&self, predicate: P) -> RegionIter<'_, Self, P>
    where
        P: RegionPredicate<KeyOf<Self>>,
    {
        RegionIter::new(self, predicate)
    }

    /// Neighbor cursor positioned on the value closest to `target`.
    fn neighbors<Me>(&self, metric: Me, target: KeyOf<Self>) -> NeighborIter<'_, Self, Me>
    where
        Me: Metric<KeyOf<Self>>,
    {
        NeighborIter::nearest(self, metric, target)
    }

    /// Neighbor cursor positioned past the end; stepping it back lands on
    /// the farthest value.
    fn neighbors_end<Me>(&self, metric: Me, target: KeyOf<Self>) -> NeighborIter<'_, Self, Me>
    where
        Me: Metric<KeyOf<Self>>,
    {
        NeighborIter::past_the_end(self, metric, target)
    }

    /// Neighbor cursor on the closest value at distance `bound` or more.
    fn neighbor_lower_bound<Me>(
        &self,
        metric: Me,
        target: KeyOf<Self>,
        bound: Me::Distance,
    ) -> Result<NeighborIter<'_, Self, Me>, TrellisError>
    where
        Me: Metric<KeyOf<Self>>,
        Me::Distance: Zero,
    {
        NeighborIter::with_lower_bound(self, metric, target, bound)
    }

    /// Neighbor cursor on the closest value strictly beyond distance
    /// `bound`.
    fn neighbor_upper_bound<Me>(
        &self,
        metric: Me,
        target: KeyOf<Self>,
        bound: Me::Distance,
    ) -> Result<NeighborIter<'_, Self, Me>, TrellisError>
    where
        Me: Metric<KeyOf<Self>>,
        Me::Distance: Zero,
    {
        NeighborIter::with_upper_bound(self, metric, target, bound)
    }
}

impl<T: TreeView> SpatialQueries for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_report_their_dimension() {
        assert_eq!(StaticRank::<3>.rank(), 3);
        assert_eq!(BoxRank::<2>.rank(), 4);
        assert_eq!(BoxRank::<2>::dimension(), 2);
        assert_eq!(DynamicRank::new(5).unwrap().rank(), 5);
        assert_eq!(DynamicRank::for_boxes(3).unwrap().rank(), 6);
    }

    #[test]
    fn zero_rank_is_rejected() {
        assert_eq!(DynamicRank::new(0).unwrap_err(), TrellisError::InvalidRank);
        assert_eq!(
            DynamicRank::for_boxes(0).unwrap_err(),
            TrellisError::InvalidRank
        );
    }
}
