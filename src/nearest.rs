use std::cmp::Ordering;
use std::collections::BinaryHeap;

use num_traits::Float;

use crate::{DistanceFunction, Node, PointFilter, Positioned, VPTree};

impl<P, E, D> VPTree<P, E, D>
where
    P: Clone,
    E: Positioned<P>,
    D: DistanceFunction<P>,
{
    /// Returns up to `max_results` stored elements closest to the given query point,
    /// sorted by ascending distance
    pub fn nearest_neighbors(&self, query: &P, max_results: usize) -> Vec<&E> {
        self.nearest_neighbors_with(query, max_results, None, None)
    }

    /// Returns up to `max_results` stored elements closest to the given query point,
    /// sorted by ascending distance, no farther away than `max_distance` and admitted by
    /// `filter`
    ///
    /// A `max_distance` of `None` places no bound on the accepted distance; a `filter` of
    /// `None` admits every element.
    pub fn nearest_neighbors_with(
        &self,
        query: &P,
        max_results: usize,
        max_distance: Option<D::Distance>,
        filter: Option<&dyn PointFilter<E>>,
    ) -> Vec<&E> {
        let mut results = NearestNeighbors::new(
            query.clone(),
            &self.distance_fn,
            max_results,
            max_distance,
            filter,
        );

        self.root.nearest_neighbors(&mut results);

        results.to_sorted_vec()
    }

    /// Returns the stored element closest to the given query point, if any
    pub fn nearest_neighbor(&self, query: &P) -> Option<&E> {
        self.nearest_neighbors(query, 1).into_iter().next()
    }

    /// Returns the closest stored element no farther away than `max_distance` and
    /// admitted by `filter`, if any
    pub fn nearest_neighbor_with(
        &self,
        query: &P,
        max_distance: Option<D::Distance>,
        filter: Option<&dyn PointFilter<E>>,
    ) -> Option<&E> {
        self.nearest_neighbors_with(query, 1, max_distance, filter)
            .into_iter()
            .next()
    }
}

impl<P, E, F> Node<P, E, F>
where
    E: Positioned<P>,
    F: Float,
{
    /// Offers every element of a visited leaf to the collector; on internal nodes,
    /// descends into the child whose region holds the query point first, then visits the
    /// other child only if its region could still hold a closer element than the worst
    /// one collected so far.
    fn nearest_neighbors<'a, D>(&'a self, results: &mut NearestNeighbors<'a, '_, P, E, D>)
    where
        D: DistanceFunction<P, Distance = F>,
    {
        match self {
            Node::Leaf { points, .. } => {
                for point in points {
                    results.offer(point);
                }
            }
            Node::Internal {
                center,
                threshold,
                inside,
                outside,
            } => {
                let distance_to_center = results.distance_to_query(center);

                if distance_to_center <= *threshold {
                    inside.nearest_neighbors(results);

                    // A point beyond the threshold is at least τ - δ away from the
                    // query; skip the outside child unless that could beat the worst
                    // collected distance.
                    if results.worst_distance() > *threshold - distance_to_center {
                        outside.nearest_neighbors(results);
                    }
                } else {
                    outside.nearest_neighbors(results);

                    // A point within the threshold is at least δ - τ away. The
                    // non-strict comparison mirrors the inclusive boundary rule of the
                    // inside child.
                    if distance_to_center - *threshold <= results.worst_distance() {
                        inside.nearest_neighbors(results);
                    }
                }
            }
        }
    }
}

/// A fixed-capacity collector of nearest-neighbour candidates
///
/// Keeps the `capacity` closest elements offered to it, keyed by their distance to the
/// query point. The head of the internal heap is always the most distant accepted
/// element, so the collector can answer the "worst accepted distance" used to prune
/// subtrees in constant time; while it is not yet full, that distance is infinite and no
/// subtree can be pruned.
pub(crate) struct NearestNeighbors<'a, 'f, P, E, D>
where
    D: DistanceFunction<P>,
{
    query: P,
    distance_fn: &'a D,
    capacity: usize,
    max_distance: D::Distance,
    filter: Option<&'f dyn PointFilter<E>>,
    heap: BinaryHeap<Candidate<'a, E, D::Distance>>,
}

impl<'a, 'f, P, E, D> NearestNeighbors<'a, 'f, P, E, D>
where
    E: Positioned<P>,
    D: DistanceFunction<P>,
{
    pub(crate) fn new(
        query: P,
        distance_fn: &'a D,
        capacity: usize,
        max_distance: Option<D::Distance>,
        filter: Option<&'f dyn PointFilter<E>>,
    ) -> Self {
        Self {
            query,
            distance_fn,
            capacity,
            max_distance: max_distance.unwrap_or_else(D::Distance::infinity),
            filter,
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub(crate) fn distance_to_query(&self, point: &P) -> D::Distance {
        self.distance_fn.distance(&self.query, point)
    }

    /// Offers an element for collection, accepting it if there is room for it within the
    /// distance bound, or if it is strictly closer than the current worst element, which
    /// it then evicts. Returns whether the element was accepted.
    pub(crate) fn offer(&mut self, element: &'a E) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let distance = self.distance_to_query(element.position());

        if self.heap.len() < self.capacity {
            if distance <= self.max_distance && self.allows(element) {
                self.heap.push(Candidate { distance, element });

                return true;
            }
        } else if distance < self.worst_distance() && self.allows(element) {
            // The evicted element was within the distance bound, so the closer
            // replacement must be as well.
            self.heap.pop();
            self.heap.push(Candidate { distance, element });

            return true;
        }

        false
    }

    /// The distance from the query point to the most distant collected element
    ///
    /// While the collector is not yet full it has rejected nothing on grounds of
    /// distance, so the worst accepted distance is infinite and no subtree may be pruned
    /// on its account.
    pub(crate) fn worst_distance(&self) -> D::Distance {
        if self.heap.len() < self.capacity {
            return D::Distance::infinity();
        }

        self.heap
            .peek()
            .map_or_else(D::Distance::infinity, |candidate| candidate.distance)
    }

    /// The collected elements in ascending order of distance to the query point, leaving
    /// the collector untouched
    pub(crate) fn to_sorted_vec(&self) -> Vec<&'a E> {
        self.heap
            .clone()
            .into_sorted_vec()
            .into_iter()
            .map(|candidate| candidate.element)
            .collect()
    }

    fn allows(&self, element: &E) -> bool {
        self.filter.map_or(true, |filter| filter.allow(element))
    }
}

struct Candidate<'a, E, F> {
    distance: F,
    element: &'a E,
}

impl<E, F> Clone for Candidate<'_, E, F>
where
    F: Float,
{
    fn clone(&self) -> Self {
        Self {
            distance: self.distance,
            element: self.element,
        }
    }
}

impl<E, F> PartialEq for Candidate<'_, E, F>
where
    F: Float,
{
    fn eq(&self, other: &Self) -> bool {
        other.distance == self.distance
    }
}

impl<E, F> Eq for Candidate<'_, E, F> where F: Float {}

impl<E, F> PartialOrd for Candidate<'_, E, F>
where
    F: Float,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E, F> Ord for Candidate<'_, E, F>
where
    F: Float,
{
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.partial_cmp(&other.distance).unwrap()
    }
}
