use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ops::{Add, Sub};

use num_traits::{AsPrimitive, Float, Zero};

use crate::value::{Axes, TotalOrd};

/// A geometry for neighbor traversal. `Distance` must be totally ordered
/// and closed under the additions the metric performs.
///
/// The admissibility contract: for every `origin`, `key` and `dim`,
/// `distance_to_plane(rank, dim, origin, key)` never exceeds
/// `distance_to_key(rank, origin, key)`. Neighbor traversal prunes on the
/// plane distance and silently skips candidates under a metric that breaks
/// this.
pub trait Metric<K: ?Sized> {
    type Distance: TotalOrd + Clone;

    /// Distance between two points in `rank`-dimensional space.
    fn distance_to_key(&self, rank: usize, origin: &K, key: &K) -> Self::Distance;

    /// Shortest distance from `origin` to the axis-aligned hyperplane
    /// through `key` normal to `dim`.
    fn distance_to_plane(&self, rank: usize, dim: usize, origin: &K, key: &K) -> Self::Distance;
}

// High minus low, so unsigned scalars cannot underflow.
fn axial_diff<S: TotalOrd + Sub>(a: S, b: S) -> S::Output {
    if a.total_cmp(&b) == Ordering::Less {
        b - a
    } else {
        a - b
    }
}

/// Straight-line distance with the square root taken at the end.
#[derive(Clone, Copy, Debug, Default)]
pub struct Euclidian<D = f64> {
    _marker: PhantomData<fn() -> D>,
}

impl<D> Euclidian<D> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, D> Metric<K> for Euclidian<D>
where
    K: Axes,
    K::Scalar: Sub,
    <K::Scalar as Sub>::Output: AsPrimitive<D>,
    D: Float + TotalOrd + 'static,
{
    type Distance = D;

    fn distance_to_key(&self, rank: usize, origin: &K, key: &K) -> D {
        let mut sum = D::zero();
        for dim in 0..rank {
            let diff: D = axial_diff(origin.axis(dim), key.axis(dim)).as_();
            sum = sum + diff * diff;
        }
        sum.sqrt()
    }

    fn distance_to_plane(&self, _rank: usize, dim: usize, origin: &K, key: &K) -> D {
        axial_diff(origin.axis(dim), key.axis(dim)).as_()
    }
}

/// Sum of squared differences without the final square root: the ordering
/// of `Euclidian` at a fraction of the cost.
#[derive(Clone, Copy, Debug, Default)]
pub struct EuclidianSquare<D = f64> {
    _marker: PhantomData<fn() -> D>,
}

impl<D> EuclidianSquare<D> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, D> Metric<K> for EuclidianSquare<D>
where
    K: Axes,
    K::Scalar: Sub,
    <K::Scalar as Sub>::Output: AsPrimitive<D>,
    D: Float + TotalOrd + 'static,
{
    type Distance = D;

    fn distance_to_key(&self, rank: usize, origin: &K, key: &K) -> D {
        let mut sum = D::zero();
        for dim in 0..rank {
            let diff: D = axial_diff(origin.axis(dim), key.axis(dim)).as_();
            sum = sum + diff * diff;
        }
        sum
    }

    fn distance_to_plane(&self, _rank: usize, dim: usize, origin: &K, key: &K) -> D {
        let diff: D = axial_diff(origin.axis(dim), key.axis(dim)).as_();
        diff * diff
    }
}

/// Sum of absolute differences. Works over integral distances.
#[derive(Clone, Copy, Debug, Default)]
pub struct Manhattan<D = f64> {
    _marker: PhantomData<fn() -> D>,
}

impl<D> Manhattan<D> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, D> Metric<K> for Manhattan<D>
where
    K: Axes,
    K::Scalar: Sub,
    <K::Scalar as Sub>::Output: AsPrimitive<D>,
    D: Copy + TotalOrd + Zero + Add<Output = D> + 'static,
{
    type Distance = D;

    fn distance_to_key(&self, rank: usize, origin: &K, key: &K) -> D {
        let mut sum = D::zero();
        for dim in 0..rank {
            let diff: D = axial_diff(origin.axis(dim), key.axis(dim)).as_();
            sum = sum + diff;
        }
        sum
    }

    fn distance_to_plane(&self, _rank: usize, dim: usize, origin: &K, key: &K) -> D {
        axial_diff(origin.axis(dim), key.axis(dim)).as_()
    }
}

/// Greatest absolute difference over the axes. Works over integral
/// distances.
#[derive(Clone, Copy, Debug, Default)]
pub struct Chebyshev<D = f64> {
    _marker: PhantomData<fn() -> D>,
}

impl<D> Chebyshev<D> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, D> Metric<K> for Chebyshev<D>
where
    K: Axes,
    K::Scalar: Sub,
    <K::Scalar as Sub>::Output: AsPrimitive<D>,
    D: Copy + TotalOrd + Zero + 'static,
{
    type Distance = D;

    fn distance_to_key(&self, rank: usize, origin: &K, key: &K) -> D {
        let mut best = D::zero();
        for dim in 0..rank {
            let diff: D = axial_diff(origin.axis(dim), key.axis(dim)).as_();
            if best.total_cmp(&diff) == Ordering::Less {
                best = diff;
            }
        }
        best
    }

    fn distance_to_plane(&self, _rank: usize, dim: usize, origin: &K, key: &K) -> D {
        axial_diff(origin.axis(dim), key.axis(dim)).as_()
    }
}
