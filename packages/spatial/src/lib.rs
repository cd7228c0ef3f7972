#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for hazard polygon lookups.
//!
//! Builds an R-tree over a layer's polygons once and answers "which
//! polygons intersect this ZIP?" queries for both the flood overlay and
//! the wildfire spatial join. The bounding-box prefilter restricts the
//! exact geometric tests to pairs whose envelopes actually overlap.

use geo::{BoundingRect, Intersects, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};

/// A polygon stored in the R-tree with its position in the source layer.
struct PolygonEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A polygon that intersects a query geometry.
#[derive(Debug, Clone, Copy)]
pub struct Hit<'a> {
    /// Position of the polygon in the slice the index was built from.
    pub index: usize,
    /// The indexed polygon.
    pub polygon: &'a MultiPolygon<f64>,
}

/// R-tree over a set of polygons.
///
/// All polygons must be expressed in the same CRS as the geometries the
/// index is queried with.
pub struct PolygonIndex {
    tree: RTree<PolygonEntry>,
}

impl PolygonIndex {
    /// Builds an index over `polygons`. Hits report positions in this
    /// iteration order.
    #[must_use]
    pub fn build(polygons: impl IntoIterator<Item = MultiPolygon<f64>>) -> Self {
        let entries: Vec<PolygonEntry> = polygons
            .into_iter()
            .enumerate()
            .filter_map(|(index, polygon)| {
                let Some(envelope) = compute_envelope(&polygon) else {
                    log::warn!("Skipping empty polygon at index {index}");
                    return None;
                };
                Some(PolygonEntry {
                    index,
                    envelope,
                    polygon,
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// Returns every indexed polygon that intersects `query`, ordered by
    /// source position so results do not depend on R-tree layout.
    ///
    /// Touching boundaries count as intersecting.
    #[must_use]
    pub fn intersecting(&self, query: &MultiPolygon<f64>) -> Vec<Hit<'_>> {
        let Some(query_env) = compute_envelope(query) else {
            return Vec::new();
        };

        let mut hits: Vec<Hit<'_>> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(query))
            .map(|entry| Hit {
                index: entry.index,
                polygon: &entry.polygon,
            })
            .collect();

        hits.sort_by_key(|hit| hit.index);
        hits
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}
