//! An index of points on the surface of the Earth
//!
//! This module plugs a great-circle metric into the generic [`VPTree`]: points are
//! latitude/longitude pairs in degrees, distances are measured in meters along the
//! surface of a sphere with the Earth's mean radius, and a bounding-box query is layered
//! on top of the tree's radius search.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{DistanceFunction, Iter, PointFilter, Positioned, VPTree, DEF_BIN_SIZE};

/// The mean radius of the Earth in meters
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// A point on the surface of the Earth, given as a latitude/longitude pair in degrees
///
/// Longitudes are normalized into `[-180, 180)` on construction, so a longitude of
/// exactly `+180°` is stored as `-180°`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Creates a point at the given latitude and longitude in degrees
    ///
    /// # Panics
    ///
    /// Panics if `latitude` is outside `[-90, 90]`.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        assert!(
            (-90.0..=90.0).contains(&latitude),
            "latitude must be within [-90, 90] degrees"
        );

        Self {
            latitude,
            longitude: normalize_longitude(longitude),
        }
    }

    /// Returns the latitude of this point in degrees
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Returns the longitude of this point in degrees
    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

fn normalize_longitude(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

/// The great-circle distance between two points on the Earth's surface in meters,
/// calculated with the haversine formula
///
/// This is a true metric over [`GeoPoint`]s and the distance function used by
/// [`GeospatialIndex`].
#[derive(Clone, Copy, Debug, Default)]
pub struct HaversineDistance;

impl DistanceFunction<GeoPoint> for HaversineDistance {
    type Distance = f64;

    fn distance(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        let lat1 = a.latitude().to_radians();
        let lon1 = a.longitude().to_radians();
        let lat2 = b.latitude().to_radians();
        let lon2 = b.longitude().to_radians();

        let sum = haversine(lat2 - lat1) + lat1.cos() * lat2.cos() * haversine(lon2 - lon1);
        let angle = 2.0 * f64::min(1.0, sum.sqrt()).asin();

        angle * EARTH_RADIUS
    }
}

fn haversine(theta: f64) -> f64 {
    let x = (theta / 2.0).sin();

    x * x
}

/// A geospatial point index: a [`VPTree`] over the haversine metric with a bounding-box
/// query on top
///
/// Any element type [`Positioned`] at a [`GeoPoint`] can be indexed; bare [`GeoPoint`]s
/// work out of the box. All distances taken and returned are in meters.
///
/// # Examples
///
/// ```
/// use geo_vptree::geo::{GeoPoint, GeospatialIndex};
///
/// let mut index = GeospatialIndex::new();
/// index.add(GeoPoint::new(51.5074, -0.1278)); // London
/// index.add(GeoPoint::new(48.8566, 2.3522)); // Paris
///
/// let brussels = GeoPoint::new(50.8503, 4.3517);
/// let nearest = index.nearest_neighbor(&brussels).unwrap();
///
/// assert_eq!(nearest.latitude(), 48.8566);
/// ```
#[derive(Debug)]
pub struct GeospatialIndex<E = GeoPoint> {
    tree: VPTree<GeoPoint, E, HaversineDistance>,
}

impl<E> GeospatialIndex<E> {
    /// Creates an empty index with the default leaf capacity of [`DEF_BIN_SIZE`] points
    pub fn new() -> Self {
        Self {
            tree: VPTree::new(HaversineDistance),
        }
    }

    /// Creates an empty index whose leaves hold up to `bin_size` points
    ///
    /// # Panics
    ///
    /// Panics if `bin_size` is zero.
    pub fn with_bin_size(bin_size: usize) -> Self {
        Self {
            tree: VPTree::with_bin_size(HaversineDistance, bin_size),
        }
    }

    /// Returns the leaf capacity this index was created with
    pub fn bin_size(&self) -> usize {
        self.tree.bin_size()
    }

    /// Returns the number of elements stored in this index
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Tests whether this index stores no elements
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Removes every element from this index in O(1)
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Iterates over the stored elements, leaf by leaf, in no particular order
    pub fn iter(&self) -> Iter<'_, E> {
        self.tree.iter()
    }
}

impl<E> GeospatialIndex<E>
where
    E: Positioned<GeoPoint>,
{
    /// Creates an index containing the given points, bulk-loaded with the default leaf
    /// capacity of [`DEF_BIN_SIZE`]
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = E>,
    {
        Self::from_points_with_bin_size(points, DEF_BIN_SIZE)
    }

    /// Creates an index containing the given points, bulk-loaded with leaves holding up
    /// to `bin_size` points
    ///
    /// # Panics
    ///
    /// Panics if `bin_size` is zero.
    pub fn from_points_with_bin_size<I>(points: I, bin_size: usize) -> Self
    where
        I: IntoIterator<Item = E>,
    {
        Self {
            tree: VPTree::from_points_with_bin_size(HaversineDistance, points, bin_size),
        }
    }

    /// Adds a single element to this index
    pub fn add(&mut self, element: E) -> bool {
        self.tree.add(element)
    }

    /// Adds every element of the given collection to this index, partitioning each
    /// touched leaf at most once
    pub fn add_all<I>(&mut self, elements: I) -> bool
    where
        I: IntoIterator<Item = E>,
    {
        self.tree.add_all(elements)
    }

    /// Returns up to `max_results` stored elements closest to the given query point,
    /// sorted by ascending distance
    pub fn nearest_neighbors(&self, query: &GeoPoint, max_results: usize) -> Vec<&E> {
        self.tree.nearest_neighbors(query, max_results)
    }

    /// Returns up to `max_results` stored elements closest to the given query point,
    /// sorted by ascending distance, no farther away than `max_distance` meters and
    /// admitted by `filter`
    pub fn nearest_neighbors_with(
        &self,
        query: &GeoPoint,
        max_results: usize,
        max_distance: Option<f64>,
        filter: Option<&dyn PointFilter<E>>,
    ) -> Vec<&E> {
        self.tree
            .nearest_neighbors_with(query, max_results, max_distance, filter)
    }

    /// Returns the stored element closest to the given query point, if any
    pub fn nearest_neighbor(&self, query: &GeoPoint) -> Option<&E> {
        self.tree.nearest_neighbor(query)
    }

    /// Returns the closest stored element no farther away than `max_distance` meters and
    /// admitted by `filter`, if any
    pub fn nearest_neighbor_with(
        &self,
        query: &GeoPoint,
        max_distance: Option<f64>,
        filter: Option<&dyn PointFilter<E>>,
    ) -> Option<&E> {
        self.tree.nearest_neighbor_with(query, max_distance, filter)
    }

    /// Returns every stored element within `max_distance` meters of the given query
    /// point, sorted by ascending distance
    ///
    /// # Panics
    ///
    /// Panics if `max_distance` is negative.
    pub fn all_within_distance(&self, query: &GeoPoint, max_distance: f64) -> Vec<&E> {
        self.tree.all_within_distance(query, max_distance)
    }

    /// Returns every stored element within `max_distance` meters of the given query
    /// point and admitted by `filter`, sorted by ascending distance
    ///
    /// # Panics
    ///
    /// Panics if `max_distance` is negative.
    pub fn all_within_distance_with(
        &self,
        query: &GeoPoint,
        max_distance: f64,
        filter: Option<&dyn PointFilter<E>>,
    ) -> Vec<&E> {
        self.tree
            .all_within_distance_with(query, max_distance, filter)
    }

    /// Returns every stored element within the given bounding box, given as southern,
    /// western, northern, and eastern bounds in degrees
    ///
    /// See [`all_in_bounding_box_with`](GeospatialIndex::all_in_bounding_box_with).
    pub fn all_in_bounding_box(&self, south: f64, west: f64, north: f64, east: f64) -> Vec<&E> {
        self.all_in_bounding_box_with(south, west, north, east, None)
    }

    /// Returns every stored element within the given bounding box and admitted by
    /// `filter`
    ///
    /// The box spans the latitudes between `south` and `north` and the shorter arc of
    /// longitudes from `west` to `east`. The query runs as a radius search around the
    /// great-circle midpoint of the box's bounds, with a radius safely covering its four
    /// corners, post-filtered by the box predicate; results are sorted by ascending
    /// distance from that midpoint. Boxes touching a pole or spanning the antimeridian
    /// are not handled exactly.
    ///
    /// # Panics
    ///
    /// Panics if `south` or `north` is outside `[-90, 90]`.
    pub fn all_in_bounding_box_with(
        &self,
        south: f64,
        west: f64,
        north: f64,
        east: f64,
        filter: Option<&dyn PointFilter<E>>,
    ) -> Vec<&E> {
        let bounds = BoundingBox {
            south,
            west,
            north,
            east,
        };

        let centroid = bounds.centroid();

        let search_radius = bounds
            .corners()
            .iter()
            .map(|corner| HaversineDistance.distance(&centroid, corner))
            .fold(0.0, f64::max);

        let combined = |element: &E| {
            bounds.contains(element.position())
                && filter.map_or(true, |filter| filter.allow(element))
        };

        self.tree
            .all_within_distance_with(&centroid, search_radius, Some(&combined))
    }
}

impl<E> GeospatialIndex<E>
where
    E: Positioned<GeoPoint> + PartialEq,
{
    /// Tests whether this index contains an element equal to the given one
    pub fn contains(&self, element: &E) -> bool {
        self.tree.contains(element)
    }

    /// Tests whether this index contains an element equal to each of the given ones
    pub fn contains_all<'a, I>(&self, elements: I) -> bool
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        self.tree.contains_all(elements)
    }

    /// Removes the first element equal to the given one, pruning any leaf the removal
    /// left empty
    pub fn remove(&mut self, element: &E) -> bool {
        self.tree.remove(element)
    }

    /// Removes every element equal to any of the given ones, with pruning deferred until
    /// the whole batch has been removed
    pub fn remove_all<'a, I>(&mut self, elements: I) -> bool
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        self.tree.remove_all(elements)
    }

    /// Removes every element not equal to one of the given ones
    pub fn retain_all(&mut self, elements: &[E]) -> bool
    where
        E: Clone,
    {
        self.tree.retain_all(elements)
    }

    /// Moves the first element equal to the given one to a new position, relocating it
    /// in the tree if necessary
    pub fn move_point(&mut self, element: &E, destination: GeoPoint) -> bool {
        self.tree.move_point(element, destination)
    }
}

impl<E> Default for GeospatialIndex<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, E> IntoIterator for &'a GeospatialIndex<E> {
    type Item = &'a E;
    type IntoIter = Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The latitude band and longitude arc spanned by a bounding-box query
#[derive(Clone, Copy, Debug)]
struct BoundingBox {
    south: f64,
    west: f64,
    north: f64,
    east: f64,
}

impl BoundingBox {
    /// The great-circle midpoint of the box's bounds, via the standard mid-of-great-
    /// circle formula over the bounds expressed in radians
    fn centroid(&self) -> GeoPoint {
        let south = self.south.to_radians();
        let west = self.west.to_radians();
        let north = self.north.to_radians();
        let east = self.east.to_radians();

        let bx = north.cos() * (east - west).cos();
        let by = north.cos() * (east - west).sin();

        let latitude = (south.sin() + north.sin())
            .atan2(((south.cos() + bx) * (south.cos() + bx) + by * by).sqrt());
        let longitude = west + by.atan2(south.cos() + bx);

        GeoPoint::new(latitude.to_degrees(), longitude.to_degrees())
    }

    fn corners(&self) -> [GeoPoint; 4] {
        [
            GeoPoint::new(self.south, self.west),
            GeoPoint::new(self.north, self.west),
            GeoPoint::new(self.north, self.east),
            GeoPoint::new(self.south, self.east),
        ]
    }

    fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude() <= self.north
            && point.latitude() >= self.south
            // A point on the shorter arc is reached sooner traveling east from the
            // western boundary than from the eastern one, and sooner traveling west
            // from the eastern boundary than from the western one.
            && degrees_east_of(self.west, point) <= degrees_east_of(self.east, point)
            && degrees_west_of(self.east, point) <= degrees_west_of(self.west, point)
    }
}

/// The minimum eastward angle traveled from a meridian to a point, in degrees; a point
/// coincident with the meridian is a full turn away
fn degrees_east_of(longitude: f64, point: &GeoPoint) -> f64 {
    if point.longitude() > longitude {
        point.longitude() - longitude
    } else {
        (360.0 - (point.longitude() - longitude)).abs()
    }
}

/// The minimum westward angle traveled from a meridian to a point, in degrees; a point
/// coincident with the meridian is a full turn away
fn degrees_west_of(longitude: f64, point: &GeoPoint) -> f64 {
    if point.longitude() < longitude {
        longitude - point.longitude()
    } else {
        (360.0 - (longitude - point.longitude())).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::f64::consts::FRAC_PI_2;

    use proptest::{collection::vec, strategy::Strategy, test_runner::TestRunner};

    #[derive(Clone, Debug, PartialEq)]
    struct City {
        name: &'static str,
        location: GeoPoint,
    }

    impl City {
        fn new(name: &'static str, latitude: f64, longitude: f64) -> Self {
            Self {
                name,
                location: GeoPoint::new(latitude, longitude),
            }
        }
    }

    impl Positioned<GeoPoint> for City {
        fn position(&self) -> &GeoPoint {
            &self.location
        }

        fn set_position(&mut self, position: GeoPoint) {
            self.location = position;
        }
    }

    fn cities() -> Vec<City> {
        vec![
            City::new("Boston", 42.338947, -70.919635),
            City::new("New York", 40.780751, -73.977182),
            City::new("San Francisco", 37.766529, -122.39577),
            City::new("Los Angeles", 34.048411, -118.34015),
            City::new("Dallas", 32.787629, -96.79941),
            City::new("Chicago", 41.904667, -87.62504),
            City::new("Memphis", 35.169255, -89.990415),
            City::new("Las Vegas", 36.145303, -115.18358),
            City::new("Detroit", 42.348937, -83.08994),
        ]
    }

    fn somerville() -> GeoPoint {
        GeoPoint::new(42.387597, -71.099497)
    }

    fn city_index() -> GeospatialIndex<City> {
        GeospatialIndex::from_points_with_bin_size(cities(), 2)
    }

    fn names(results: &[&City]) -> Vec<&'static str> {
        results.iter().map(|city| city.name).collect()
    }

    #[test]
    fn haversine_is_a_metric_on_known_points() {
        let origin = GeoPoint::new(0.0, 0.0);
        let quarter = GeoPoint::new(0.0, 90.0);

        assert_eq!(HaversineDistance.distance(&origin, &origin), 0.0);

        let distance = HaversineDistance.distance(&origin, &quarter);
        assert!((distance - FRAC_PI_2 * EARTH_RADIUS).abs() < 1.0);

        assert_eq!(
            HaversineDistance.distance(&origin, &quarter),
            HaversineDistance.distance(&quarter, &origin)
        );
    }

    #[test]
    fn longitudes_are_normalized() {
        assert_eq!(GeoPoint::new(0.0, 190.0).longitude(), -170.0);
        assert_eq!(GeoPoint::new(0.0, -190.0).longitude(), 170.0);
        assert_eq!(GeoPoint::new(0.0, 180.0).longitude(), -180.0);
        assert_eq!(GeoPoint::new(0.0, -180.0).longitude(), -180.0);
        assert_eq!(GeoPoint::new(0.0, 45.0).longitude(), 45.0);
    }

    #[test]
    #[should_panic(expected = "latitude must be within [-90, 90] degrees")]
    fn out_of_range_latitudes_are_rejected() {
        GeoPoint::new(90.5, 0.0);
    }

    #[test]
    fn nearest_neighbors_returns_the_closest_cities_in_order() {
        let index = city_index();

        let results = index.nearest_neighbors(&somerville(), 3);
        assert_eq!(names(&results), vec!["Boston", "New York", "Detroit"]);
    }

    #[test]
    fn a_distance_bound_dominates_the_result_count() {
        let index = city_index();

        let results =
            index.nearest_neighbors_with(&somerville(), 8, Some(1_000_000.0), None);
        assert_eq!(names(&results), vec!["Boston", "New York", "Detroit"]);
    }

    #[test]
    fn a_filter_narrows_a_bounded_search() {
        let index = city_index();

        let only_boston = |city: &City| city.name == "Boston";
        let results = index.nearest_neighbors_with(
            &somerville(),
            8,
            Some(1_000_000.0),
            Some(&only_boston),
        );

        assert_eq!(names(&results), vec!["Boston"]);
    }

    #[test]
    fn all_within_distance_returns_the_cities_in_range() {
        let index = city_index();

        let results = index.all_within_distance(&somerville(), 1_000_000.0);
        assert_eq!(names(&results), vec!["Boston", "New York", "Detroit"]);
    }

    #[test]
    fn removing_the_closest_cities_promotes_the_rest() {
        let mut index = city_index();
        let somerville = somerville();

        let doomed = index
            .nearest_neighbors(&somerville, 3)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();

        assert!(index.remove_all(&doomed));
        assert_eq!(index.len(), 6);

        let mut expected = cities()
            .into_iter()
            .filter(|city| !doomed.contains(city))
            .collect::<Vec<_>>();
        expected.sort_by(|lhs, rhs| {
            let lhs = HaversineDistance.distance(&somerville, lhs.position());
            let rhs = HaversineDistance.distance(&somerville, rhs.position());
            lhs.partial_cmp(&rhs).unwrap()
        });

        let results = index.nearest_neighbors(&somerville, 3);
        assert_eq!(results.len(), 3);
        assert_eq!(
            names(&results),
            expected[..3].iter().map(|city| city.name).collect::<Vec<_>>()
        );
    }

    #[test]
    fn removing_every_city_prunes_the_index_down_to_an_empty_leaf() {
        let mut index = GeospatialIndex::with_bin_size(1);

        for city in cities() {
            index.add(city);
        }

        for city in &cities() {
            assert!(index.remove(city));
        }

        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert!(index.tree.root.is_leaf());
    }

    #[test]
    fn bounding_box_queries_return_the_enclosed_cities() {
        let index = city_index();

        let mut results = names(&index.all_in_bounding_box(30.0, -125.0, 40.0, -110.0));
        results.sort_unstable();

        assert_eq!(results, vec!["Las Vegas", "Los Angeles", "San Francisco"]);
    }

    #[test]
    fn bounding_box_queries_intersect_with_the_callers_filter() {
        let index = city_index();

        let no_vegas = |city: &City| city.name != "Las Vegas";
        let mut results = names(&index.all_in_bounding_box_with(
            30.0,
            -125.0,
            40.0,
            -110.0,
            Some(&no_vegas),
        ));
        results.sort_unstable();

        assert_eq!(results, vec!["Los Angeles", "San Francisco"]);
    }

    #[test]
    fn bounding_box_edges_are_inclusive() {
        let mut index = GeospatialIndex::with_bin_size(2);
        index.add_all(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 20.0),
            GeoPoint::new(10.0, 10.0),
        ]);

        let results = index.all_in_bounding_box(-10.0, -10.0, 10.0, 10.0);

        assert_eq!(results.len(), 2);
        assert!(results.contains(&&GeoPoint::new(0.0, 0.0)));
        assert!(results.contains(&&GeoPoint::new(10.0, 10.0)));
    }

    #[test]
    fn moving_a_city_changes_its_neighbors() {
        let mut index = city_index();
        let somerville = somerville();

        let boston = City::new("Boston", 42.338947, -70.919635);

        // Send Boston to the west coast; New York takes its place.
        assert!(index.move_point(&boston, GeoPoint::new(34.0, -118.0)));
        assert_eq!(index.len(), 9);

        let results = index.nearest_neighbors(&somerville, 1);
        assert_eq!(names(&results), vec!["New York"]);

        let relocated = City {
            name: "Boston",
            location: GeoPoint::new(34.0, -118.0),
        };
        assert!(index.contains(&relocated));
    }

    fn random_geo_points(len: usize) -> impl Strategy<Value = Vec<GeoPoint>> {
        (vec(-60.0_f64..=60.0, len), vec(-170.0_f64..=170.0, len)).prop_map(
            |(latitudes, longitudes)| {
                latitudes
                    .into_iter()
                    .zip(longitudes)
                    .map(|(latitude, longitude)| GeoPoint::new(latitude, longitude))
                    .collect()
            },
        )
    }

    #[test]
    fn random_geo_queries_match_brute_force() {
        TestRunner::default()
            .run(
                &(random_geo_points(40), random_geo_points(5)),
                |(points, queries)| {
                    let index = GeospatialIndex::from_points_with_bin_size(points.clone(), 3);

                    for query in &queries {
                        let mut expected = points
                            .iter()
                            .map(|point| HaversineDistance.distance(query, point))
                            .collect::<Vec<_>>();
                        expected.sort_by(|lhs, rhs| lhs.partial_cmp(rhs).unwrap());

                        let nearest = index
                            .nearest_neighbors(query, 5)
                            .into_iter()
                            .map(|point| HaversineDistance.distance(query, point))
                            .collect::<Vec<_>>();
                        let k = expected.len().min(5);
                        assert_eq!(nearest, expected[..k]);

                        let in_range = index
                            .all_within_distance(query, 2_000_000.0)
                            .into_iter()
                            .map(|point| HaversineDistance.distance(query, point))
                            .collect::<Vec<_>>();
                        let expected_in_range = expected
                            .iter()
                            .copied()
                            .filter(|distance| *distance <= 2_000_000.0)
                            .collect::<Vec<_>>();
                        assert_eq!(in_range, expected_in_range);
                    }

                    Ok(())
                },
            )
            .unwrap();
    }
}
