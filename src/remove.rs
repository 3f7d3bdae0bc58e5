use std::mem::replace;

use num_traits::Float;

use crate::{DistanceFunction, Node, Positioned, VPTree};

impl<P, E, D> VPTree<P, E, D>
where
    P: Clone,
    E: Positioned<P> + PartialEq,
    D: DistanceFunction<P>,
{
    /// Removes the first element equal to the given one from this tree
    ///
    /// If the removal leaves a non-root leaf empty, the empty node is pruned: its parent
    /// absorbs the points of both children and collapses back into a leaf, repeating
    /// upwards until an ancestor is left non-empty.
    ///
    /// Returns whether an element was removed.
    pub fn remove(&mut self, element: &E) -> bool {
        self.root.take(element, &self.distance_fn).is_some()
    }

    /// Removes every element equal to any of the given ones from this tree
    ///
    /// All equal copies of each given element are removed, not just the first. Pruning of
    /// emptied leaves is deferred until the whole batch has been removed, so that a node
    /// is not repeatedly absorbed on behalf of each of its emptied descendants; a leaf
    /// left overloaded by the final absorption is partitioned again.
    ///
    /// Returns whether any element was removed.
    pub fn remove_all<'a, I>(&mut self, elements: I) -> bool
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        let mut emptied = Vec::new();
        let mut any_removed = false;

        for element in elements {
            while self
                .root
                .remove_deferred(element, &self.distance_fn, &mut emptied)
            {
                any_removed = true;
            }
        }

        for position in &emptied {
            self.root
                .prune_path(position, self.bin_size, &self.distance_fn);
        }

        any_removed
    }

    /// Removes every element not equal to one of the given ones from this tree
    ///
    /// Returns whether any element was removed.
    pub fn retain_all(&mut self, elements: &[E]) -> bool
    where
        E: Clone,
    {
        let doomed = self
            .iter()
            .filter(|&element| !elements.contains(element))
            .cloned()
            .collect::<Vec<E>>();

        self.remove_all(&doomed)
    }

    /// Moves the first element equal to the given one to a new position
    ///
    /// When the old and new positions descend to the same leaf, the stored element's
    /// coordinates are updated in place. Otherwise the element is removed (pruning any
    /// emptied leaf), repositioned via [`Positioned::set_position`], and re-added.
    ///
    /// Returns whether an element was found and moved.
    pub fn move_point(&mut self, element: &E, destination: P) -> bool {
        if self.same_leaf(element.position(), &destination) {
            self.root
                .update_position(element, destination, &self.distance_fn)
        } else {
            match self.root.take(element, &self.distance_fn) {
                Some(mut taken) => {
                    taken.set_position(destination);
                    self.add(taken);

                    true
                }
                None => false,
            }
        }
    }

    /// Whether the two positions descend to the same leaf
    fn same_leaf(&self, a: &P, b: &P) -> bool {
        let mut node = &self.root;

        loop {
            match node {
                Node::Leaf { .. } => return true,
                Node::Internal {
                    center,
                    threshold,
                    inside,
                    outside,
                } => {
                    let a_inside = self.distance_fn.distance(center, a) <= *threshold;
                    let b_inside = self.distance_fn.distance(center, b) <= *threshold;

                    if a_inside != b_inside {
                        return false;
                    }

                    node = if a_inside { &**inside } else { &**outside };
                }
            }
        }
    }
}

impl<P, E, F> Node<P, E, F>
where
    P: Clone,
    E: Positioned<P> + PartialEq,
    F: Float,
{
    /// Removes the first element equal to the given one and returns it, pruning any leaf
    /// the removal left empty on the way back up.
    pub(crate) fn take<D>(&mut self, element: &E, distance_fn: &D) -> Option<E>
    where
        D: DistanceFunction<P, Distance = F>,
    {
        match self {
            Node::Leaf { points, .. } => {
                let index = Iterator::position(&mut points.iter(), |point| point == element)?;

                Some(points.remove(index))
            }
            Node::Internal {
                center,
                threshold,
                inside,
                outside,
            } => {
                let child = if distance_fn.distance(center, element.position()) <= *threshold {
                    &mut **inside
                } else {
                    &mut **outside
                };

                let taken = child.take(element, distance_fn);

                if taken.is_some() && child.is_empty() {
                    self.absorb_children();
                }

                taken
            }
        }
    }

    /// Removes the first element equal to the given one without pruning, recording the
    /// retained center of any leaf the removal left empty.
    fn remove_deferred<D>(&mut self, element: &E, distance_fn: &D, emptied: &mut Vec<P>) -> bool
    where
        D: DistanceFunction<P, Distance = F>,
    {
        match self {
            Node::Leaf { center, points } => {
                let Some(index) = Iterator::position(&mut points.iter(), |point| point == element) else {
                    return false;
                };

                points.remove(index);

                if points.is_empty() {
                    if let Some(center) = center {
                        emptied.push(center.clone());
                    }
                }

                true
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

                child.remove_deferred(element, distance_fn, emptied)
            }
        }
    }

    /// Prunes the leaf the given position descends to, if it is empty
    ///
    /// Each ancestor of an empty leaf absorbs its children in turn until one of them is
    /// left non-empty; that final leaf is partitioned again if the merge overloaded it.
    /// Descending to an already-repaired, non-empty leaf is a no-op, which also keeps a
    /// pruning target from being processed on behalf of an ancestor that was itself
    /// pruned.
    fn prune_path<D>(&mut self, position: &P, bin_size: usize, distance_fn: &D)
    where
        D: DistanceFunction<P, Distance = F>,
    {
        let Node::Internal {
            center,
            threshold,
            inside,
            outside,
        } = self
        else {
            return;
        };

        let child = if distance_fn.distance(center, position) <= *threshold {
            &mut **inside
        } else {
            &mut **outside
        };

        child.prune_path(position, bin_size, distance_fn);

        if child.is_leaf() && child.is_empty() {
            self.absorb_children();

            if self.is_overloaded(bin_size) {
                self.try_partition(bin_size, distance_fn).ok();
            }
        }
    }

    /// Updates the position of the first element equal to the given one in place, without
    /// any structural change. Only sound when the new position descends to the same leaf.
    fn update_position<D>(&mut self, element: &E, destination: P, distance_fn: &D) -> bool
    where
        D: DistanceFunction<P, Distance = F>,
    {
        match self {
            Node::Leaf { points, .. } => {
                match points.iter_mut().find(|point| **point == *element) {
                    Some(found) => {
                        found.set_position(destination);

                        true
                    }
                    None => false,
                }
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

                child.update_position(element, destination, distance_fn)
            }
        }
    }
}

impl<P, E, F> Node<P, E, F> {
    /// Collapses this internal node into a leaf holding every element of its subtree
    ///
    /// The node keeps its vantage point as the leaf's retained center.
    ///
    /// # Panics
    ///
    /// Panics if this node is a leaf.
    pub(crate) fn absorb_children(&mut self) {
        assert!(!self.is_leaf(), "leaf nodes have no children to absorb");

        match replace(self, Node::empty()) {
            Node::Internal {
                center,
                mut inside,
                mut outside,
                ..
            } => {
                let mut points = Vec::with_capacity(inside.len() + outside.len());
                inside.drain_into(&mut points);
                outside.drain_into(&mut points);

                *self = Node::Leaf {
                    center: Some(center),
                    points,
                };
            }
            Node::Leaf { .. } => unreachable!(),
        }
    }

    fn drain_into(&mut self, out: &mut Vec<E>) {
        match self {
            Node::Leaf { points, .. } => out.append(points),
            Node::Internal {
                inside, outside, ..
            } => {
                inside.drain_into(out);
                outside.drain_into(out);
            }
        }
    }
}
