use num_traits::Float;

use crate::{DistanceFunction, Node, Positioned, VPTree};

impl<P, E, D> VPTree<P, E, D>
where
    P: Clone,
    E: Positioned<P>,
    D: DistanceFunction<P>,
{
    /// Adds a single element to this tree
    ///
    /// Insertion descends a single root-to-leaf path; if the receiving leaf ends up over
    /// its capacity it is partitioned on the spot. Returns `true`: adding a point always
    /// modifies the tree, duplicates included.
    pub fn add(&mut self, element: E) -> bool {
        self.root.add(element, self.bin_size, &self.distance_fn);

        true
    }

    /// Adds every element of the given collection to this tree
    ///
    /// Unlike repeated calls to [`add`](VPTree::add), partitioning is deferred: each leaf
    /// receives its whole share of the batch before a single partitioning attempt, instead
    /// of being re-split every few insertions. Returns whether the collection was
    /// non-empty.
    pub fn add_all<I>(&mut self, elements: I) -> bool
    where
        I: IntoIterator<Item = E>,
    {
        let elements = elements.into_iter().collect::<Vec<_>>();
        let added = !elements.is_empty();

        if added {
            self.root.add_all(elements, self.bin_size, &self.distance_fn);
        }

        added
    }
}

impl<P, E, F> Node<P, E, F>
where
    P: Clone,
    E: Positioned<P>,
    F: Float,
{
    pub(crate) fn add<D>(&mut self, element: E, bin_size: usize, distance_fn: &D)
    where
        D: DistanceFunction<P, Distance = F>,
    {
        match self {
            Node::Leaf { center, points } => {
                if center.is_none() {
                    *center = Some(element.position().clone());
                }

                points.push(element);
            }
            Node::Internal {
                center,
                threshold,
                inside,
                outside,
            } => {
                let child = if distance_fn.distance(center, element.position()) <= *threshold {
                    inside
                } else {
                    outside
                };

                return child.add(element, bin_size, distance_fn);
            }
        }

        if self.is_overloaded(bin_size) {
            self.try_partition(bin_size, distance_fn).ok();
        }
    }

    /// Adds a batch of elements, splitting it along the descent so that every touched
    /// leaf is partitioned at most once, after it has received its whole share.
    fn add_all<D>(&mut self, elements: Vec<E>, bin_size: usize, distance_fn: &D)
    where
        D: DistanceFunction<P, Distance = F>,
    {
        if elements.is_empty() {
            return;
        }

        match self {
            Node::Leaf { center, points } => {
                if center.is_none() {
                    *center = Some(elements[0].position().clone());
                }

                points.extend(elements);
            }
            Node::Internal {
                center,
                threshold,
                inside,
                outside,
            } => {
                let (inside_share, outside_share) = elements.into_iter().partition(|element| {
                    distance_fn.distance(center, element.position()) <= *threshold
                });

                inside.add_all(inside_share, bin_size, distance_fn);
                outside.add_all(outside_share, bin_size, distance_fn);

                return;
            }
        }

        if self.is_overloaded(bin_size) {
            self.try_partition(bin_size, distance_fn).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::test_runner::TestRunner;

    use crate::tests::{assert_invariants, planar_tree, planar_tree_of, random_points};

    #[test]
    fn add_grows_and_partitions() {
        let mut tree = planar_tree(2);

        assert!(tree.add([0.0, 0.0]));
        assert!(tree.add([1.0, 0.0]));
        assert!(tree.root.is_leaf());

        assert!(tree.add([5.0, 0.0]));
        assert!(!tree.root.is_leaf());

        assert_eq!(tree.len(), 3);
        assert_invariants(&tree.root);
    }

    #[test]
    fn add_keeps_duplicates() {
        let mut tree = planar_tree(4);
        tree.add([2.0, 2.0]);
        tree.add([2.0, 2.0]);

        assert_eq!(tree.len(), 2);
        assert!(tree.contains(&[2.0, 2.0]));
    }

    #[test]
    fn add_all_reports_whether_anything_was_added() {
        let mut tree = planar_tree(2);

        assert!(!tree.add_all(Vec::new()));
        assert!(tree.add_all(vec![[0.0, 0.0], [3.0, 0.0], [0.0, 3.0]]));

        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn add_all_matches_repeated_add() {
        TestRunner::default()
            .run(&random_points(60), |points| {
                let mut batched = planar_tree(4);
                batched.add_all(points.clone());

                let mut incremental = planar_tree(4);
                for point in &points {
                    incremental.add(*point);
                }

                assert_eq!(batched.len(), points.len());
                assert_eq!(incremental.len(), points.len());
                assert_invariants(&batched.root);
                assert_invariants(&incremental.root);

                for point in &points {
                    assert!(batched.contains(point));
                    assert!(incremental.contains(point));
                }

                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn bulk_load_matches_incremental_fill() {
        // Queries against a bulk-loaded tree and an incrementally filled one must agree
        // modulo ties; comparing returned distances sidesteps tie order.
        TestRunner::default()
            .run(&(random_points(50), random_points(5)), |(points, queries)| {
                let bulk = planar_tree_of(4, points.clone());

                let mut filled = planar_tree(4);
                filled.add_all(points);

                for query in &queries {
                    let bulk_distances = bulk
                        .nearest_neighbors(query, 10)
                        .into_iter()
                        .map(|point| crate::tests::euclidean(query, point))
                        .collect::<Vec<_>>();

                    let filled_distances = filled
                        .nearest_neighbors(query, 10)
                        .into_iter()
                        .map(|point| crate::tests::euclidean(query, point))
                        .collect::<Vec<_>>();

                    assert_eq!(bulk_distances, filled_distances);
                }

                Ok(())
            })
            .unwrap();
    }
}
