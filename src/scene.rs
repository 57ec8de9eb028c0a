//! ═══════════════════════════════════════════════════════════════════════════════
//! SCENE — Geometry Snapshot and Anchors
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Named objects with polyline outlines, handed over by the scene-analysis
//! collaborator whenever it finishes a pass. Entities tether to the nearest
//! outline vertex via an AnchorRef: a bundle of indices into the snapshot,
//! never a pointer. Indices go stale the moment a new snapshot lands, so
//! anchors are revalidated every tick before use.
//! ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenePoint {
    pub x: f64,
    pub y: f64,
}

/// One recognized object and its outline geometry, in viewport percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub polylines: Vec<Vec<ScenePoint>>,
}

/// Index-based tether from an entity into the scene snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorRef {
    pub object_index: usize,
    pub polyline_index: usize,
    pub point_index: usize,
    /// Vertex position at resolve time
    pub base_x: f64,
    pub base_y: f64,
    /// Entity position relative to the vertex at resolve time
    pub offset_x: f64,
    pub offset_y: f64,
    /// 1.0 | 1.45 | 1.9, derived from the object index
    pub depth: f64,
}

/// Ray-casting point-in-polygon test.
pub fn point_in_polygon(point: ScenePoint, polygon: &[ScenePoint]) -> bool {
    let mut inside = false;
    let mut j = polygon.len().wrapping_sub(1);
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].x, polygon[i].y);
        let (xj, yj) = (polygon[j].x, polygon[j].y);
        let crosses = (yi > point.y) != (yj > point.y)
            && point.x < (xj - xi) * (point.y - yi) / (yj - yi + 1e-12) + xi;
        if crosses {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Find the outline vertex closest to a spawn position. The depth repeats
/// per object index so anchors vary predictably rather than randomly.
pub fn find_nearest_anchor(objects: &[SceneObject], spawn_x: f64, spawn_y: f64) -> Option<AnchorRef> {
    let mut best: Option<AnchorRef> = None;
    let mut best_dist = f64::INFINITY;
    for (oi, object) in objects.iter().enumerate() {
        for (pi, polyline) in object.polylines.iter().enumerate() {
            for (pt, point) in polyline.iter().enumerate() {
                let dx = spawn_x - point.x;
                let dy = spawn_y - point.y;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist < best_dist {
                    best_dist = dist;
                    best = Some(AnchorRef {
                        object_index: oi,
                        polyline_index: pi,
                        point_index: pt,
                        base_x: point.x,
                        base_y: point.y,
                        offset_x: dx,
                        offset_y: dy,
                        depth: 1.0 + (oi % 3) as f64 * 0.45,
                    });
                }
            }
        }
    }
    best
}

/// How hidden an anchored position is behind its owning object.
/// Only closed-ish outlines (≥3 points) can occlude; depth 1 never
/// occludes, depth 2 fully occludes.
pub fn occlusion_level(anchor: &AnchorRef, objects: &[SceneObject]) -> f64 {
    let Some(object) = objects.get(anchor.object_index) else {
        return 0.0;
    };
    let world = ScenePoint {
        x: anchor.base_x + anchor.offset_x,
        y: anchor.base_y + anchor.offset_y,
    };
    for polyline in &object.polylines {
        if polyline.len() >= 3 && point_in_polygon(world, polyline) {
            return (anchor.depth - 1.0).clamp(0.0, 1.0);
        }
    }
    0.0
}

/// Re-resolve an anchor against a fresh snapshot. Returns None when the
/// indices no longer exist; otherwise refreshes the base position so the
/// offset keeps meaning what it meant.
pub fn revalidate_anchor(anchor: &AnchorRef, objects: &[SceneObject]) -> Option<AnchorRef> {
    let point = objects
        .get(anchor.object_index)?
        .polylines
        .get(anchor.polyline_index)?
        .get(anchor.point_index)?;
    Some(AnchorRef {
        base_x: point.x,
        base_y: point.y,
        ..*anchor
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<ScenePoint> {
        vec![
            ScenePoint { x: x0, y: y0 },
            ScenePoint { x: x0 + size, y: y0 },
            ScenePoint { x: x0 + size, y: y0 + size },
            ScenePoint { x: x0, y: y0 + size },
        ]
    }

    fn scene() -> Vec<SceneObject> {
        vec![
            SceneObject {
                name: "chair".into(),
                polylines: vec![square(10.0, 10.0, 20.0)],
            },
            SceneObject {
                name: "doorway".into(),
                polylines: vec![square(60.0, 40.0, 30.0)],
            },
        ]
    }

    #[test]
    fn test_point_in_polygon_square() {
        let poly = square(0.0, 0.0, 10.0);
        assert!(point_in_polygon(ScenePoint { x: 5.0, y: 5.0 }, &poly));
        assert!(!point_in_polygon(ScenePoint { x: 15.0, y: 5.0 }, &poly));
        assert!(!point_in_polygon(ScenePoint { x: -1.0, y: -1.0 }, &poly));
    }

    #[test]
    fn test_degenerate_polygons_contain_nothing() {
        assert!(!point_in_polygon(ScenePoint { x: 0.0, y: 0.0 }, &[]));
        let line = vec![ScenePoint { x: 0.0, y: 0.0 }, ScenePoint { x: 10.0, y: 0.0 }];
        assert!(!point_in_polygon(ScenePoint { x: 5.0, y: 0.0 }, &line));
    }

    #[test]
    fn test_nearest_anchor_picks_closest_vertex() {
        let anchor = find_nearest_anchor(&scene(), 62.0, 41.0).unwrap();
        assert_eq!(anchor.object_index, 1);
        assert_eq!(anchor.base_x, 60.0);
        assert_eq!(anchor.base_y, 40.0);
        assert!((anchor.offset_x - 2.0).abs() < 1e-9);
        assert!((anchor.offset_y - 1.0).abs() < 1e-9);
        assert!((anchor.depth - 1.45).abs() < 1e-9);
    }

    #[test]
    fn test_anchor_depth_cycles_by_object() {
        let objects = scene();
        let a0 = find_nearest_anchor(&objects, 10.0, 10.0).unwrap();
        assert_eq!(a0.object_index, 0);
        assert!((a0.depth - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_anchor_in_empty_scene() {
        assert!(find_nearest_anchor(&[], 50.0, 50.0).is_none());
        let empty = vec![SceneObject { name: "wall".into(), polylines: vec![] }];
        assert!(find_nearest_anchor(&empty, 50.0, 50.0).is_none());
    }

    #[test]
    fn test_occlusion_depends_on_depth_and_containment() {
        let objects = scene();
        // Inside the doorway outline at depth 1.45
        let inside = AnchorRef {
            object_index: 1,
            polyline_index: 0,
            point_index: 0,
            base_x: 70.0,
            base_y: 50.0,
            offset_x: 0.0,
            offset_y: 0.0,
            depth: 1.45,
        };
        assert!((occlusion_level(&inside, &objects) - 0.45).abs() < 1e-9);

        // Same spot at depth 1.0 never occludes
        let shallow = AnchorRef { depth: 1.0, ..inside };
        assert_eq!(occlusion_level(&shallow, &objects), 0.0);

        // Outside the outline
        let outside = AnchorRef { offset_x: 50.0, ..inside };
        assert_eq!(occlusion_level(&outside, &objects), 0.0);

        // Stale object index
        let stale = AnchorRef { object_index: 9, ..inside };
        assert_eq!(occlusion_level(&stale, &objects), 0.0);
    }

    #[test]
    fn test_revalidate_refreshes_base_or_drops() {
        let objects = scene();
        let anchor = find_nearest_anchor(&objects, 12.0, 12.0).unwrap();

        let mut moved = objects.clone();
        moved[0].polylines[0][anchor.point_index] = ScenePoint { x: 15.0, y: 18.0 };
        let refreshed = revalidate_anchor(&anchor, &moved).unwrap();
        assert_eq!(refreshed.base_x, 15.0);
        assert_eq!(refreshed.base_y, 18.0);
        assert_eq!(refreshed.offset_x, anchor.offset_x);

        // The snapshot shrank and the indices point at nothing
        let shrunk: Vec<SceneObject> = vec![];
        assert!(revalidate_anchor(&anchor, &shrunk).is_none());

        let mut trimmed = objects.clone();
        trimmed[0].polylines.clear();
        assert!(revalidate_anchor(&anchor, &trimmed).is_none());
    }
}
