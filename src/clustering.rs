//! Coordinate grouping of dock locations.
//!
//! Density-based clustering with a minimum neighbourhood size of one: two
//! coordinates share a group whenever a chain of coordinates connects them in
//! which each hop is within the distance threshold. Every coordinate therefore
//! belongs to exactly one group, and isolated coordinates form singletons.
//! With that neighbourhood size the clusters are the connected components of
//! the threshold graph, so the partition does not depend on input order.
//!
//! Neighbour candidates come from an R-tree over the distinct coordinates and
//! are confirmed with the haversine central angle; components are merged with
//! union-find.
//!
//! Group ids are dense (`0..len`) and assigned in order of each group's
//! smallest member coordinate (latitude, then longitude), so repeated runs on
//! the same data produce the same ids.

use std::cmp::Ordering;
use std::collections::HashMap;

use log::{debug, info, warn};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo_utils::{central_angle, compute_center, meters_to_degrees, meters_to_radians};
use crate::{ClusteredEvent, Event, GpsPoint};

/// Configuration for coordinate grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingConfig {
    /// Maximum distance between neighbouring coordinates of one group.
    /// Default: 30.0 meters
    pub distance_threshold_meters: f64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            distance_threshold_meters: 30.0,
        }
    }
}

impl GroupingConfig {
    pub fn validate(&self) -> Result<()> {
        let t = self.distance_threshold_meters;
        if !t.is_finite() || t <= 0.0 {
            return Err(Error::InvalidConfig {
                name: "distance_threshold_meters",
                value: t.to_string(),
                reason: "must be a positive number of meters",
            });
        }
        Ok(())
    }
}

/// A group of nearby coordinates represented by their centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateGroup {
    pub id: usize,
    /// Unweighted mean of the member coordinates
    pub center: GpsPoint,
    /// Distinct raw coordinates in this group
    pub members: Vec<GpsPoint>,
}

/// Hashable identity of a raw coordinate.
///
/// Exact bit equality, with `-0.0` folded into `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CoordKey(u64, u64);

impl CoordKey {
    fn of(p: &GpsPoint) -> Self {
        // Adding 0.0 turns -0.0 into 0.0
        CoordKey((p.latitude + 0.0).to_bits(), (p.longitude + 0.0).to_bits())
    }
}

/// Result of grouping: raw coordinate → group id, and group id → centroid.
#[derive(Debug, Clone, Default)]
pub struct CoordinateGroups {
    assignments: HashMap<CoordKey, usize>,
    groups: Vec<CoordinateGroup>,
    threshold_meters: Option<f64>,
}

impl CoordinateGroups {
    /// Group id of a raw coordinate, if it was part of the grouped set.
    pub fn group_of(&self, point: &GpsPoint) -> Option<usize> {
        self.assignments.get(&CoordKey::of(point)).copied()
    }

    pub fn group(&self, id: usize) -> Option<&CoordinateGroup> {
        self.groups.get(id)
    }

    pub fn groups(&self) -> &[CoordinateGroup] {
        &self.groups
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of distinct raw coordinates covered.
    pub fn coordinate_count(&self) -> usize {
        self.assignments.len()
    }

    /// Threshold the groups were computed with; `None` when rebuilt from
    /// precomputed assignments of unknown origin.
    pub fn threshold_meters(&self) -> Option<f64> {
        self.threshold_meters
    }

    /// Attach the group of the event's coordinate.
    ///
    /// A missing group means the grouping was not built over this event's
    /// coordinates, which is a construction-order bug rather than bad data.
    pub fn attach(&self, event: Event) -> Result<ClusteredEvent> {
        let group_id = self.group_of(&event.position).ok_or(Error::UnknownCoordinate {
            lat: event.position.latitude,
            lng: event.position.longitude,
        })?;
        Ok(ClusteredEvent {
            group_center: self.groups[group_id].center,
            group_id,
            event,
        })
    }

    /// Member sets of all groups, each sorted, in a canonical order.
    ///
    /// Two groupings describe the same partition iff their canonical
    /// partitions are equal, whatever their id numbering.
    pub fn canonical_partition(&self) -> Vec<Vec<(f64, f64)>> {
        let mut partition: Vec<Vec<(f64, f64)>> = self
            .groups
            .iter()
            .map(|g| {
                let mut members: Vec<(f64, f64)> =
                    g.members.iter().map(|p| (p.latitude, p.longitude)).collect();
                members.sort_by(|a, b| cmp_pair(*a, *b));
                members
            })
            .collect();
        partition.sort_by(|a, b| cmp_pair(a[0], b[0]));
        partition
    }

    /// Rebuild a grouping from rows that already carry group assignments,
    /// e.g. a previously saved event artifact.
    ///
    /// Incoming ids are renumbered densely in order of first appearance;
    /// centroids are taken from the rows. A coordinate listed under two
    /// different groups keeps the first.
    pub fn from_assignments<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (GpsPoint, usize, GpsPoint)>,
    {
        let mut remap: HashMap<usize, usize> = HashMap::new();
        let mut assignments: HashMap<CoordKey, usize> = HashMap::new();
        let mut groups: Vec<CoordinateGroup> = Vec::new();
        let mut conflicts = 0usize;

        for (point, source_id, center) in rows {
            let id = *remap.entry(source_id).or_insert_with(|| {
                groups.push(CoordinateGroup {
                    id: groups.len(),
                    center,
                    members: Vec::new(),
                });
                groups.len() - 1
            });

            let key = CoordKey::of(&point);
            match assignments.get(&key) {
                None => {
                    assignments.insert(key, id);
                    groups[id].members.push(point);
                }
                Some(&existing) if existing != id => conflicts += 1,
                Some(_) => {}
            }
        }

        if conflicts > 0 {
            warn!("{} rows assign an already-grouped coordinate to another group", conflicts);
        }

        Self {
            assignments,
            groups,
            threshold_meters: None,
        }
    }
}

// ============================================================================
// Spatial index
// ============================================================================

/// A distinct coordinate with its position in the sorted coordinate list.
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

fn build_rtree(points: &[GpsPoint]) -> RTree<IndexedPoint> {
    let indexed: Vec<IndexedPoint> = points
        .iter()
        .enumerate()
        .map(|(idx, p)| IndexedPoint {
            idx,
            lat: p.latitude,
            lng: p.longitude,
        })
        .collect();
    RTree::bulk_load(indexed)
}

/// Indices `j > i` of coordinates within `eps` radians of `points[i]`.
fn neighbours_after(
    i: usize,
    points: &[GpsPoint],
    rtree: &RTree<IndexedPoint>,
    threshold_meters: f64,
    eps: f64,
) -> Vec<usize> {
    let p = &points[i];
    // 10% slack over the degree conversion; the angle check is exact
    let buffer = meters_to_degrees(threshold_meters * 1.1, p.latitude);
    let search = AABB::from_corners(
        [p.longitude - buffer, p.latitude - buffer],
        [p.longitude + buffer, p.latitude + buffer],
    );

    rtree
        .locate_in_envelope_intersecting(&search)
        .filter(|c| c.idx > i && central_angle(p, &points[c.idx]) <= eps)
        .map(|c| c.idx)
        .collect()
}

// ============================================================================
// Grouping
// ============================================================================

fn cmp_pair(a: (f64, f64), b: (f64, f64)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1))
}

/// Distinct valid coordinates sorted by latitude, then longitude.
pub fn unique_coordinates(points: &[GpsPoint]) -> Vec<GpsPoint> {
    let mut unique: Vec<GpsPoint> = points
        .iter()
        .filter(|p| p.is_valid())
        .map(|p| GpsPoint::new(p.latitude + 0.0, p.longitude + 0.0))
        .collect();
    let skipped = points.len() - unique.len();
    if skipped > 0 {
        warn!("Skipping {} invalid coordinates", skipped);
    }

    unique.sort_by(|a, b| cmp_pair((a.latitude, a.longitude), (b.latitude, b.longitude)));
    unique.dedup_by_key(|p| CoordKey::of(p));
    unique
}

/// Group coordinates so that each distinct coordinate maps to exactly one group.
///
/// `points` may contain duplicates (one entry per event is fine); grouping
/// runs over the distinct set. Empty input yields an empty grouping.
///
/// # Example
/// ```
/// use ride_pulse::{GpsPoint, GroupingConfig, cluster_coordinates};
///
/// let points = vec![
///     GpsPoint::new(42.3601, -71.0589),
///     GpsPoint::new(42.3602, -71.0589), // ~11m north
///     GpsPoint::new(42.3700, -71.0700), // far away
/// ];
///
/// let groups = cluster_coordinates(&points, &GroupingConfig::default());
/// assert_eq!(groups.len(), 2);
/// assert_eq!(groups.group_of(&points[0]), groups.group_of(&points[1]));
/// ```
pub fn cluster_coordinates(points: &[GpsPoint], config: &GroupingConfig) -> CoordinateGroups {
    let unique = unique_coordinates(points);
    if unique.is_empty() {
        return empty_groups(config);
    }

    let rtree = build_rtree(&unique);
    let eps = meters_to_radians(config.distance_threshold_meters);

    let mut parent: Vec<usize> = (0..unique.len()).collect();
    let mut pairs = 0usize;
    for i in 0..unique.len() {
        for j in neighbours_after(i, &unique, &rtree, config.distance_threshold_meters, eps) {
            union(&mut parent, i, j);
            pairs += 1;
        }
    }
    debug!("{} neighbour pairs among {} coordinates", pairs, unique.len());

    assemble_groups(unique, parent, config)
}

/// Group coordinates using parallel neighbour search.
///
/// Same partition and ids as [`cluster_coordinates`]; the pair search runs on
/// rayon and the union-find stays sequential.
#[cfg(feature = "parallel")]
pub fn cluster_coordinates_parallel(points: &[GpsPoint], config: &GroupingConfig) -> CoordinateGroups {
    use rayon::prelude::*;

    let unique = unique_coordinates(points);
    if unique.is_empty() {
        return empty_groups(config);
    }

    let rtree = build_rtree(&unique);
    let eps = meters_to_radians(config.distance_threshold_meters);

    let pairs: Vec<(usize, usize)> = (0..unique.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            neighbours_after(i, &unique, &rtree, config.distance_threshold_meters, eps)
                .into_iter()
                .map(move |j| (i, j))
        })
        .collect();
    debug!("{} neighbour pairs among {} coordinates", pairs.len(), unique.len());

    let mut parent: Vec<usize> = (0..unique.len()).collect();
    for (i, j) in pairs {
        union(&mut parent, i, j);
    }

    assemble_groups(unique, parent, config)
}

fn empty_groups(config: &GroupingConfig) -> CoordinateGroups {
    CoordinateGroups {
        threshold_meters: Some(config.distance_threshold_meters),
        ..CoordinateGroups::default()
    }
}

/// Turn union-find roots into dense group ids and centroids.
///
/// `unique` is sorted, so walking it in order numbers groups by their
/// smallest member.
fn assemble_groups(unique: Vec<GpsPoint>, mut parent: Vec<usize>, config: &GroupingConfig) -> CoordinateGroups {
    let mut root_to_id: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<CoordinateGroup> = Vec::new();
    let mut assignments: HashMap<CoordKey, usize> = HashMap::with_capacity(unique.len());

    for (i, point) in unique.into_iter().enumerate() {
        let root = find(&mut parent, i);
        let id = *root_to_id.entry(root).or_insert_with(|| {
            groups.push(CoordinateGroup {
                id: groups.len(),
                center: point,
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[id].members.push(point);
        assignments.insert(CoordKey::of(&point), id);
    }

    for group in &mut groups {
        group.center = compute_center(&group.members);
    }

    info!(
        "Grouped {} coordinates into {} groups (threshold {}m)",
        assignments.len(),
        groups.len(),
        config.distance_threshold_meters
    );

    CoordinateGroups {
        assignments,
        groups,
        threshold_meters: Some(config.distance_threshold_meters),
    }
}

fn find(parent: &mut [usize], i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }
    // Path compression
    let mut current = i;
    while parent[current] != root {
        let next = parent[current];
        parent[current] = root;
        current = next;
    }
    root
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let root_a = find(parent, a);
    let root_b = find(parent, b);
    if root_a != root_b {
        // Keep the smaller index as root
        let (keep, merge) = if root_a < root_b { (root_a, root_b) } else { (root_b, root_a) };
        parent[merge] = keep;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimeBucket;

    /// Offset a point by meters north/east (small-area approximation).
    fn offset(p: GpsPoint, north_m: f64, east_m: f64) -> GpsPoint {
        let dlat = north_m / 111_195.0;
        let dlng = east_m / (111_195.0 * p.latitude.to_radians().cos());
        GpsPoint::new(p.latitude + dlat, p.longitude + dlng)
    }

    fn downtown() -> GpsPoint {
        GpsPoint::new(42.3601, -71.0589)
    }

    fn scattered_docks() -> Vec<GpsPoint> {
        let base = downtown();
        let mut points = Vec::new();
        // A chain of docks 20m apart, a tight pair, and loners
        for k in 0..5 {
            points.push(offset(base, 0.0, 20.0 * k as f64));
        }
        points.push(offset(base, 500.0, 0.0));
        points.push(offset(base, 510.0, 0.0));
        points.push(offset(base, -800.0, 300.0));
        points.push(offset(base, 1500.0, -1500.0));
        for k in 0..6 {
            points.push(offset(base, -300.0 + 45.0 * k as f64, 900.0));
        }
        points
    }

    fn config(meters: f64) -> GroupingConfig {
        GroupingConfig { distance_threshold_meters: meters }
    }

    #[test]
    fn test_empty_input() {
        let groups = cluster_coordinates(&[], &GroupingConfig::default());
        assert!(groups.is_empty());
        assert_eq!(groups.coordinate_count(), 0);
        assert!(groups.group_of(&downtown()).is_none());
    }

    #[test]
    fn test_identical_coordinates_share_group() {
        let p = downtown();
        let groups = cluster_coordinates(&[p, p, p], &GroupingConfig::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.coordinate_count(), 1);
        assert_eq!(groups.groups()[0].center, p);
    }

    #[test]
    fn test_chain_links_transitively() {
        // Ends of the chain are 80m apart but every hop is 20m
        let base = downtown();
        let chain: Vec<GpsPoint> = (0..5).map(|k| offset(base, 0.0, 20.0 * k as f64)).collect();
        let groups = cluster_coordinates(&chain, &GroupingConfig::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.groups()[0].members.len(), 5);
    }

    #[test]
    fn test_isolated_points_are_singletons() {
        let base = downtown();
        let points = vec![base, offset(base, 100.0, 0.0), offset(base, 0.0, 100.0)];
        let groups = cluster_coordinates(&points, &GroupingConfig::default());
        assert_eq!(groups.len(), 3);
        assert!(groups.groups().iter().all(|g| g.members.len() == 1));
    }

    #[test]
    fn test_threshold_boundary() {
        let base = downtown();
        let near = offset(base, 29.0, 0.0);
        let far = offset(base, 31.0, 0.0);

        let g = cluster_coordinates(&[base, near], &config(30.0));
        assert_eq!(g.len(), 1);
        let g = cluster_coordinates(&[base, far], &config(30.0));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_coverage() {
        let points = scattered_docks();
        let groups = cluster_coordinates(&points, &GroupingConfig::default());

        for p in &points {
            let id = groups.group_of(p).expect("every coordinate is grouped");
            assert!(groups.group(id).unwrap().members.contains(p));
        }
        let member_total: usize = groups.groups().iter().map(|g| g.members.len()).sum();
        assert_eq!(member_total, points.len());
        assert_eq!(groups.coordinate_count(), points.len());
    }

    #[test]
    fn test_idempotent_and_order_independent() {
        let points = scattered_docks();
        let first = cluster_coordinates(&points, &GroupingConfig::default());
        let second = cluster_coordinates(&points, &GroupingConfig::default());

        let mut reversed = points.clone();
        reversed.reverse();
        let third = cluster_coordinates(&reversed, &GroupingConfig::default());

        assert_eq!(first.canonical_partition(), second.canonical_partition());
        assert_eq!(first.canonical_partition(), third.canonical_partition());
        // Ids are deterministic too
        for p in &points {
            assert_eq!(first.group_of(p), third.group_of(p));
        }
    }

    #[test]
    fn test_threshold_monotonicity() {
        let points = scattered_docks();
        let mut previous = usize::MAX;
        for meters in [5.0, 15.0, 25.0, 30.0, 50.0, 100.0, 400.0, 2_000.0, 10_000.0] {
            let count = cluster_coordinates(&points, &config(meters)).len();
            assert!(count <= previous, "{}m gave {} groups after {}", meters, count, previous);
            previous = count;
        }
        assert_eq!(previous, 1);
    }

    #[test]
    fn test_centroid_is_unweighted_mean() {
        let base = downtown();
        let a = offset(base, 0.0, 0.0);
        let b = offset(base, 0.0, 20.0);
        // Duplicates of `a` must not pull the centroid
        let groups = cluster_coordinates(&[a, a, a, b], &GroupingConfig::default());
        let center = groups.groups()[0].center;
        assert!((center.latitude - (a.latitude + b.latitude) / 2.0).abs() < 1e-12);
        assert!((center.longitude - (a.longitude + b.longitude) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_ids_ordered_by_smallest_member() {
        let base = downtown();
        let south = offset(base, -1000.0, 0.0);
        let groups = cluster_coordinates(&[base, south], &GroupingConfig::default());
        assert_eq!(groups.group_of(&south), Some(0));
        assert_eq!(groups.group_of(&base), Some(1));
    }

    #[test]
    fn test_negative_zero_matches_zero() {
        let groups = cluster_coordinates(&[GpsPoint::new(0.0, 0.0)], &GroupingConfig::default());
        assert_eq!(groups.group_of(&GpsPoint::new(-0.0, -0.0)), Some(0));
    }

    #[test]
    fn test_attach_unknown_coordinate() {
        let groups = cluster_coordinates(&[downtown()], &GroupingConfig::default());
        let event = Event {
            event_id: "x-start".to_string(),
            ride_id: None,
            timestamp: None,
            direction: crate::Direction::Start,
            position: GpsPoint::new(40.0, -70.0),
            bike_type: "classic_bike".to_string(),
            minute: 0,
            bucket: TimeBucket::FIRST,
        };
        assert!(matches!(groups.attach(event), Err(Error::UnknownCoordinate { .. })));
    }

    #[test]
    fn test_from_assignments_renumbers() {
        let a = downtown();
        let b = offset(a, 100.0, 0.0);
        let center = GpsPoint::new(1.0, 2.0);
        let groups = CoordinateGroups::from_assignments(vec![(a, 17, center), (b, 4, b), (a, 17, center)]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.group_of(&a), Some(0));
        assert_eq!(groups.group_of(&b), Some(1));
        assert_eq!(groups.group(0).unwrap().center, center);
        assert!(groups.threshold_meters().is_none());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let points = scattered_docks();
        let seq = cluster_coordinates(&points, &GroupingConfig::default());
        let par = cluster_coordinates_parallel(&points, &GroupingConfig::default());
        assert_eq!(seq.canonical_partition(), par.canonical_partition());
        for p in &points {
            assert_eq!(seq.group_of(p), par.group_of(p));
        }
    }
}
