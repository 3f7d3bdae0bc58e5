#![forbid(unsafe_code)]
#![deny(missing_docs, missing_debug_implementations)]

//! An in-memory geospatial point index backed by a [vantage-point tree](https://en.wikipedia.org/wiki/Vantage-point_tree)
//!
//! The core [`VPTree`] type stores elements of an arbitrary metric space and answers
//! k-nearest-neighbour and fixed-radius proximity queries against them. Subtrees are pruned
//! during a search using the triangle inequality, so the supplied [`DistanceFunction`] must
//! be a true metric: zero for identical points, symmetric, and obeying
//! `d(a, c) <= d(a, b) + d(b, c)`. Squared distances notably are not metrics.
//!
//! The tree is fully mutable: points can be added, removed, and moved after construction.
//! Leaves hold up to `bin_size` elements; inserting past that capacity partitions the leaf
//! around a vantage point, and removals that empty a leaf merge its sibling back into the
//! parent. Batch operations defer that structural repair until the whole batch has been
//! applied.
//!
//! The [`geo`] module plugs great-circle (haversine) distance into the tree and adds a
//! bounding-box query, turning it into an index of points on the surface of the Earth.
//!
//! # Examples
//!
//! Any distance function over any point type will do. A one-dimensional metric:
//!
//! ```
//! use geo_vptree::VPTree;
//!
//! let mut tree = VPTree::new(|a: &f64, b: &f64| (a - b).abs());
//! tree.add_all(vec![1.0, 5.0, 9.0, 12.0]);
//!
//! assert_eq!(tree.nearest_neighbor(&4.0), Some(&5.0));
//! assert_eq!(tree.all_within_distance(&10.0, 2.5), vec![&9.0, &12.0]);
//! ```
//!
//! Indexing points on the Earth's surface:
//!
//! ```
//! use geo_vptree::geo::{GeoPoint, GeospatialIndex};
//!
//! let mut index = GeospatialIndex::new();
//! index.add_all(vec![
//!     GeoPoint::new(42.338947, -70.919635),  // Boston
//!     GeoPoint::new(40.780751, -73.977182),  // New York
//!     GeoPoint::new(37.766529, -122.39577),  // San Francisco
//! ]);
//!
//! let somerville = GeoPoint::new(42.387597, -71.099497);
//!
//! let nearest = index.nearest_neighbor(&somerville).unwrap();
//! assert_eq!(nearest.latitude(), 42.338947);
//! ```
//!
//! Stored elements need not be bare points: anything that implements [`Positioned`]
//! can be indexed, and queries may then be issued with any point of the same space.
//!
//! The tree is not thread-safe. It assumes a single mutator; concurrent readers are safe
//! exactly where the borrow checker says they are.

mod build;
mod insert;
mod iter;
mod look_up;
mod nearest;
mod remove;

pub mod geo;

pub use build::DEF_BIN_SIZE;
pub use iter::Iter;

use std::fmt;

use num_traits::Float;

/// A metric over points of type `P`
///
/// Implementations must satisfy the metric axioms (identity, symmetry, and the triangle
/// inequality) or searches will silently skip valid results. The tree caches no distance
/// values; this function is re-invoked for every comparison it needs.
///
/// Any `Fn(&P, &P) -> F` closure with a floating-point result is a `DistanceFunction`.
pub trait DistanceFunction<P: ?Sized> {
    /// The type of distance values produced by this metric
    type Distance: Float;

    /// Returns the distance between the two given points
    ///
    /// The result must be non-negative.
    fn distance(&self, a: &P, b: &P) -> Self::Distance;
}

impl<P: ?Sized, F, T> DistanceFunction<P> for T
where
    T: Fn(&P, &P) -> F,
    F: Float,
{
    type Distance = F;

    fn distance(&self, a: &P, b: &P) -> F {
        self(a, b)
    }
}

/// A predicate applied to stored elements during a search
///
/// Filters decide whether an element may appear in a result set; they never affect which
/// subtrees are visited. They must be pure, as they may run many times per element during
/// a single search.
///
/// Any `Fn(&E) -> bool` closure is a `PointFilter`.
pub trait PointFilter<E: ?Sized> {
    /// Returns whether the given element may be included in a result set
    fn allow(&self, element: &E) -> bool;
}

impl<E: ?Sized, T> PointFilter<E> for T
where
    T: Fn(&E) -> bool,
{
    fn allow(&self, element: &E) -> bool {
        self(element)
    }
}

/// Associates stored elements with the point used to measure distances to them
///
/// This is the relation between the element type `E` and the point type `P` of a tree:
/// only values of type `E` are stored, but queries may be issued with any point of type
/// `P`. Every point type trivially implements `Positioned` over itself, so trees of bare
/// points need no extra glue.
pub trait Positioned<P> {
    /// Returns the point at which this element currently sits
    fn position(&self) -> &P;

    /// Moves this element to the given point
    ///
    /// Called by [`VPTree::move_point`]; implementations only need to update their own
    /// coordinates.
    fn set_position(&mut self, position: P);
}

impl<P> Positioned<P> for P {
    fn position(&self) -> &P {
        self
    }

    fn set_position(&mut self, position: P) {
        *self = position;
    }
}

/// A node in the tree
///
/// A node is either a leaf holding a bag of elements or an internal node splitting the
/// space around a vantage point: elements within `threshold` of `center` live in the
/// `inside` subtree, all others in `outside`. Internal nodes always have both children.
///
/// A leaf's `center` is the position of the first element it ever held. It survives
/// partitioning and the collapse of an internal node back into a leaf, so that a later
/// partition reuses it as the vantage point.
pub(crate) enum Node<P, E, F> {
    Leaf {
        center: Option<P>,
        points: Vec<E>,
    },
    Internal {
        center: P,
        threshold: F,
        inside: Box<Node<P, E, F>>,
        outside: Box<Node<P, E, F>>,
    },
}

impl<P, E, F> Node<P, E, F> {
    pub(crate) fn empty() -> Self {
        Node::Leaf {
            center: None,
            points: Vec::new(),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// The number of elements stored in this subtree
    pub(crate) fn len(&self) -> usize {
        match self {
            Node::Leaf { points, .. } => points.len(),
            Node::Internal {
                inside, outside, ..
            } => inside.len() + outside.len(),
        }
    }

    /// Whether this subtree stores no elements at all
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Node::Leaf { points, .. } => points.is_empty(),
            Node::Internal {
                inside, outside, ..
            } => inside.is_empty() && outside.is_empty(),
        }
    }

    pub(crate) fn is_overloaded(&self, bin_size: usize) -> bool {
        match self {
            Node::Leaf { points, .. } => points.len() > bin_size,
            Node::Internal { .. } => unreachable!("internal nodes do not hold points directly"),
        }
    }
}

impl<P, E, F> Node<P, E, F>
where
    F: Float,
{
    /// Tests whether this subtree contains an element equal to the given one, descending
    /// by the same rule that governs insertion.
    pub(crate) fn contains<D>(&self, element: &E, distance_fn: &D) -> bool
    where
        E: Positioned<P> + PartialEq,
        D: DistanceFunction<P, Distance = F>,
    {
        match self {
            Node::Leaf { points, .. } => points.iter().any(|point| point == element),
            Node::Internal {
                center,
                threshold,
                inside,
                outside,
            } => {
                if distance_fn.distance(center, element.position()) <= *threshold {
                    inside.contains(element, distance_fn)
                } else {
                    outside.contains(element, distance_fn)
                }
            }
        }
    }
}

/// A vantage-point tree over an arbitrary metric space
///
/// `P` is the point type of the space, `E` the type of stored elements (any type that is
/// [`Positioned`] in the space), and `D` the [`DistanceFunction`] defining the metric.
///
/// See the [crate-level documentation](crate) for an overview and examples.
pub struct VPTree<P, E, D>
where
    D: DistanceFunction<P>,
{
    pub(crate) root: Node<P, E, D::Distance>,
    pub(crate) bin_size: usize,
    pub(crate) distance_fn: D,
}

impl<P, E, D> VPTree<P, E, D>
where
    D: DistanceFunction<P>,
{
    /// Returns the leaf capacity this tree was created with
    pub fn bin_size(&self) -> usize {
        self.bin_size
    }

    /// Returns the number of elements stored in this tree
    ///
    /// Counting walks every leaf, so this runs in O(n).
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Tests whether this tree stores no elements
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Removes every element from this tree in O(1)
    pub fn clear(&mut self) {
        self.root = Node::empty();
    }
}

impl<P, E, D> VPTree<P, E, D>
where
    E: Positioned<P> + PartialEq,
    D: DistanceFunction<P>,
{
    /// Tests whether this tree contains an element equal to the given one
    ///
    /// Membership tests descend a single root-to-leaf path, so they execute in O(log n)
    /// for well-distributed points.
    pub fn contains(&self, element: &E) -> bool {
        self.root.contains(element, &self.distance_fn)
    }

    /// Tests whether this tree contains an element equal to each of the given ones
    pub fn contains_all<'a, I>(&self, elements: I) -> bool
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        elements.into_iter().all(|element| self.contains(element))
    }
}

impl<P, E, D> VPTree<P, E, D>
where
    E: Clone,
    D: DistanceFunction<P>,
{
    /// Returns every stored element, collected leaf by leaf in no particular order
    pub fn to_vec(&self) -> Vec<E> {
        self.iter().cloned().collect()
    }
}

impl<P, E, D> fmt::Debug for VPTree<P, E, D>
where
    D: DistanceFunction<P>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VPTree")
            .field("bin_size", &self.bin_size)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
