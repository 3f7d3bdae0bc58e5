use std::mem::take;

use num_traits::Float;
use thiserror::Error;

use crate::{DistanceFunction, Node, Positioned, VPTree};

/// A sensible default value for the leaf capacity, balancing partitioning work against the
/// number of candidates considered per visited leaf
pub const DEF_BIN_SIZE: usize = 32;

/// Why a leaf could not be split into two children
///
/// Never surfaced: every caller catches this and leaves the leaf in place, holding more
/// points than its capacity.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum PartitionError {
    #[error("cannot partition fewer than two points")]
    FewerThanTwoPoints,
    #[error("cannot partition a non-leaf node")]
    NotALeaf,
    #[error("no viable distance threshold separates the points")]
    NoViableThreshold,
}

impl<P, E, D> VPTree<P, E, D>
where
    D: DistanceFunction<P>,
{
    /// Creates an empty tree with the default leaf capacity of [`DEF_BIN_SIZE`] points
    pub fn new(distance_fn: D) -> Self {
        Self::with_bin_size(distance_fn, DEF_BIN_SIZE)
    }

    /// Creates an empty tree whose leaves hold up to `bin_size` points
    ///
    /// # Panics
    ///
    /// Panics if `bin_size` is zero.
    pub fn with_bin_size(distance_fn: D, bin_size: usize) -> Self {
        assert!(bin_size >= 1, "bin size must be greater than zero");

        Self {
            root: Node::empty(),
            bin_size,
            distance_fn,
        }
    }
}

impl<P, E, D> VPTree<P, E, D>
where
    P: Clone,
    E: Positioned<P>,
    D: DistanceFunction<P>,
{
    /// Creates a tree containing the given points, bulk-loaded with the default leaf
    /// capacity of [`DEF_BIN_SIZE`]
    pub fn from_points<I>(distance_fn: D, points: I) -> Self
    where
        I: IntoIterator<Item = E>,
    {
        Self::from_points_with_bin_size(distance_fn, points, DEF_BIN_SIZE)
    }

    /// Creates a tree containing the given points, bulk-loaded with leaves holding up to
    /// `bin_size` points
    ///
    /// An empty collection produces the same tree as [`VPTree::with_bin_size`].
    ///
    /// # Panics
    ///
    /// Panics if `bin_size` is zero.
    pub fn from_points_with_bin_size<I>(distance_fn: D, points: I, bin_size: usize) -> Self
    where
        I: IntoIterator<Item = E>,
    {
        assert!(bin_size >= 1, "bin size must be greater than zero");

        Self {
            root: Node::from_points(points.into_iter().collect(), bin_size, &distance_fn),
            bin_size,
            distance_fn,
        }
    }
}

impl<P, E, F> Node<P, E, F>
where
    P: Clone,
    E: Positioned<P>,
    F: Float,
{
    /// Builds a node holding the given points, recursively partitioning them whenever a
    /// range exceeds `bin_size`.
    pub(crate) fn from_points<D>(points: Vec<E>, bin_size: usize, distance_fn: &D) -> Self
    where
        D: DistanceFunction<P, Distance = F>,
    {
        let mut node = Node::Leaf {
            center: points.first().map(|point| point.position().clone()),
            points,
        };

        if node.is_overloaded(bin_size) {
            // A range that cannot be split stays behind as an overloaded leaf.
            node.try_partition(bin_size, distance_fn).ok();
        }

        node
    }

    /// Attempts to split this leaf into an internal node with two children, choosing a
    /// distance threshold as close to the median distance from the vantage point as the
    /// points allow.
    ///
    /// The vantage point is the leaf's retained center, or the position of its first point
    /// if it never had one. On failure the leaf keeps its points.
    pub(crate) fn try_partition<D>(
        &mut self,
        bin_size: usize,
        distance_fn: &D,
    ) -> Result<(), PartitionError>
    where
        D: DistanceFunction<P, Distance = F>,
    {
        let (center, points) = match self {
            Node::Leaf { center, points } => (center, points),
            Node::Internal { .. } => return Err(PartitionError::NotALeaf),
        };

        if points.len() < 2 {
            return Err(PartitionError::FewerThanTwoPoints);
        }

        let vantage_point = center
            .get_or_insert_with(|| points[0].position().clone())
            .clone();

        let mut tagged = take(points)
            .into_iter()
            .map(|point| (distance_fn.distance(&vantage_point, point.position()), point))
            .collect::<Vec<_>>();

        tagged.sort_by(|lhs, rhs| lhs.0.partial_cmp(&rhs.0).unwrap());

        match choose_split(&tagged) {
            Err(err) => {
                points.extend(tagged.into_iter().map(|(_, point)| point));

                Err(err)
            }
            Ok((split, threshold)) => {
                let outside = untag(tagged.split_off(split));
                let inside = untag(tagged);

                *self = Node::Internal {
                    center: vantage_point,
                    threshold,
                    inside: Box::new(Node::from_points(inside, bin_size, distance_fn)),
                    outside: Box::new(Node::from_points(outside, bin_size, distance_fn)),
                };

                Ok(())
            }
        }
    }
}

/// Chooses the split index and distance threshold for a range of points sorted by their
/// distance from the vantage point
///
/// Points before the split index land in the inside child and must be within the threshold
/// of the vantage point; points from the split index on land in the outside child and must
/// be strictly beyond it. The threshold is never zero.
fn choose_split<E, F>(tagged: &[(F, E)]) -> Result<(usize, F), PartitionError>
where
    F: Float,
{
    let median = (tagged.len() - 1) / 2;
    let median_distance = tagged[median].0;

    let mut split = None;

    // The sort guarantees at least one point within the median distance; look beyond the
    // median for one outside it.
    for index in median + 1..tagged.len() {
        if tagged[index].0 > median_distance {
            split = Some((index, median_distance));
            break;
        }
    }

    if split.is_none() && median_distance > F::zero() {
        // Everything from the median on sits at the median distance. Pull the threshold
        // back to the last point strictly within it, keeping that point inside.
        for index in (1..=median).rev() {
            if tagged[index].0 < median_distance {
                split = Some((index + 1, tagged[index].0));
                break;
            }
        }

        if split.is_none() {
            let nearest_distance = tagged[0].0;

            if nearest_distance < median_distance {
                // Isolate the nearest point, typically the vantage point itself, with a
                // threshold strictly between the two occupied distances.
                let two = F::one() + F::one();
                split = Some((1, (nearest_distance + median_distance) / two));
            }
        }
    }

    match split {
        Some((_, threshold)) if threshold <= F::zero() => Err(PartitionError::NoViableThreshold),
        Some(split) => Ok(split),
        None => Err(PartitionError::NoViableThreshold),
    }
}

fn untag<E, F>(tagged: Vec<(F, E)>) -> Vec<E> {
    tagged.into_iter().map(|(_, point)| point).collect()
}
