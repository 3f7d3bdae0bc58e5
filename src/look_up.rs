use num_traits::{Float, Zero};

use crate::{DistanceFunction, Node, PointFilter, Positioned, VPTree};

impl<P, E, D> VPTree<P, E, D>
where
    P: Clone,
    E: Positioned<P>,
    D: DistanceFunction<P>,
{
    /// Returns every stored element within `max_distance` of the given query point,
    /// sorted by ascending distance
    ///
    /// # Panics
    ///
    /// Panics if `max_distance` is negative.
    pub fn all_within_distance(&self, query: &P, max_distance: D::Distance) -> Vec<&E> {
        self.all_within_distance_with(query, max_distance, None)
    }

    /// Returns every stored element within `max_distance` of the given query point and
    /// admitted by `filter`, sorted by ascending distance
    ///
    /// A `filter` of `None` admits every element.
    ///
    /// # Panics
    ///
    /// Panics if `max_distance` is negative.
    pub fn all_within_distance_with(
        &self,
        query: &P,
        max_distance: D::Distance,
        filter: Option<&dyn PointFilter<E>>,
    ) -> Vec<&E> {
        assert!(
            max_distance >= D::Distance::zero(),
            "maximum distance must be non-negative"
        );

        let mut results = Vec::new();

        self.root.all_within_distance(
            query,
            max_distance,
            filter,
            &self.distance_fn,
            &mut results,
        );

        results.sort_by(|lhs, rhs| lhs.0.partial_cmp(&rhs.0).unwrap());

        results.into_iter().map(|(_, element)| element).collect()
    }
}

impl<P, E, F> Node<P, E, F>
where
    E: Positioned<P>,
    F: Float,
{
    /// Collects every element of this subtree within `max_distance` of the query point,
    /// visiting only the children whose region intersects the query ball. Unlike the
    /// nearest-neighbour search, the query region is fixed, so both children may need a
    /// visit.
    fn all_within_distance<'a, D>(
        &'a self,
        query: &P,
        max_distance: F,
        filter: Option<&dyn PointFilter<E>>,
        distance_fn: &D,
        results: &mut Vec<(F, &'a E)>,
    ) where
        D: DistanceFunction<P, Distance = F>,
    {
        match self {
            Node::Leaf { points, .. } => {
                for point in points {
                    let distance = distance_fn.distance(query, point.position());

                    if distance <= max_distance
                        && filter.map_or(true, |filter| filter.allow(point))
                    {
                        results.push((distance, point));
                    }
                }
            }
            Node::Internal {
                center,
                threshold,
                inside,
                outside,
            } => {
                let distance_to_center = distance_fn.distance(query, center);

                // Does the query ball reach into the region within the threshold?
                if distance_to_center <= *threshold + max_distance {
                    inside.all_within_distance(query, max_distance, filter, distance_fn, results);
                }

                // Does it poke beyond the threshold?
                if distance_to_center + max_distance > *threshold {
                    outside.all_within_distance(query, max_distance, filter, distance_fn, results);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::{collection::vec, test_runner::TestRunner};

    use crate::tests::{euclidean, planar_tree_of, random_points};

    #[test]
    fn random_radius_queries_match_brute_force() {
        TestRunner::default()
            .run(
                &(
                    random_points(80),
                    random_points(10),
                    vec(0.0_f64..=120.0, 10),
                ),
                |(points, queries, radii)| {
                    let tree = planar_tree_of(4, points.clone());

                    for (query, radius) in queries.iter().zip(radii) {
                        let mut expected = points
                            .iter()
                            .map(|point| euclidean(query, point))
                            .filter(|distance| *distance <= radius)
                            .collect::<Vec<_>>();
                        expected.sort_by(|lhs, rhs| lhs.partial_cmp(rhs).unwrap());

                        let found = tree
                            .all_within_distance(query, radius)
                            .into_iter()
                            .map(|point| euclidean(query, point))
                            .collect::<Vec<_>>();

                        assert_eq!(found, expected);
                    }

                    Ok(())
                },
            )
            .unwrap();
    }

    #[test]
    fn results_are_sorted_by_distance() {
        let points = vec![[3.0, 0.0], [1.0, 0.0], [2.0, 0.0], [40.0, 0.0]];
        let tree = planar_tree_of(2, points);

        assert_eq!(
            tree.all_within_distance(&[0.0, 0.0], 10.0),
            vec![&[1.0, 0.0], &[2.0, 0.0], &[3.0, 0.0]]
        );
    }

    #[test]
    fn zero_radius_finds_coincident_points_only() {
        let tree = planar_tree_of(2, vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);

        assert_eq!(
            tree.all_within_distance(&[1.0, 0.0], 0.0),
            vec![&[1.0, 0.0]]
        );
    }

    #[test]
    fn filtered_radius_queries_respect_the_filter() {
        let tree = planar_tree_of(
            2,
            vec![[1.0, 1.0], [1.0, -1.0], [2.0, 1.0], [2.0, -1.0]],
        );

        let upper_half = |point: &[f64; 2]| point[1] > 0.0;

        assert_eq!(
            tree.all_within_distance_with(&[0.0, 0.0], 10.0, Some(&upper_half)),
            vec![&[1.0, 1.0], &[2.0, 1.0]]
        );
    }

    #[test]
    #[should_panic(expected = "maximum distance must be non-negative")]
    fn negative_radius_is_rejected() {
        let tree = planar_tree_of(2, vec![[0.0, 0.0]]);
        tree.all_within_distance(&[0.0, 0.0], -1.0);
    }
}
