// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygon set boolean operations (merge)

use super::path::{create_polygons, create_vertex_storage, VertexStorage};
use super::types::{from_geo, is_counter_clockwise, to_geo, Polygons};
use geo::{BooleanOps, MultiPolygon};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Which set operation [`merge`] performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClipOperation {
    #[default]
    Union,
    Difference,
    Intersection,
    Xor,
}

impl ClipOperation {
    pub const ALL: [ClipOperation; 4] = [
        ClipOperation::Union,
        ClipOperation::Difference,
        ClipOperation::Intersection,
        ClipOperation::Xor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ClipOperation::Union => "Union",
            ClipOperation::Difference => "Difference",
            ClipOperation::Intersection => "Intersection",
            ClipOperation::Xor => "Xor",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name().eq_ignore_ascii_case(name))
    }
}

/// Combine two polygon sets.
///
/// Loops inside each operand are filled even-odd, so a hole is any loop
/// nested inside another regardless of its winding. Output loops are
/// counter-clockwise outers and clockwise holes.
pub fn merge(a: &Polygons, b: &Polygons, operation: ClipOperation) -> Polygons {
    if a.is_empty() && b.is_empty() {
        return Polygons::new();
    }
    match operation {
        ClipOperation::Intersection if a.is_empty() || b.is_empty() => return Polygons::new(),
        ClipOperation::Difference if a.is_empty() => return Polygons::new(),
        _ => {}
    }

    let subject = to_geo(a);
    let clip = to_geo(b);
    let result = match operation {
        ClipOperation::Union => subject.union(&clip),
        ClipOperation::Difference => subject.difference(&clip),
        ClipOperation::Intersection => subject.intersection(&clip),
        ClipOperation::Xor => subject.xor(&clip),
    };
    from_geo(&result)
}

/// Union of many polygon sets.
///
/// Sets are paired off level by level so every merge sees two operands of
/// similar size and the pairing (and therefore the output) is deterministic.
pub fn union_all(mut sets: Vec<Polygons>) -> Polygons {
    sets.retain(|s| !s.is_empty());
    if sets.is_empty() {
        return Polygons::new();
    }
    while sets.len() > 1 {
        sets = sets
            .par_chunks(2)
            .map(|pair| match pair {
                [a, b] => merge(a, b, ClipOperation::Union),
                [a] => a.clone(),
                _ => Polygons::new(),
            })
            .collect();
    }
    sets.pop().unwrap_or_default()
}

/// Normalize a set: resolve overlaps and self-intersections
pub fn simplify(polygons: &Polygons) -> Polygons {
    merge(polygons, &Polygons::new(), ClipOperation::Union)
}

/// Split a set into filled regions: each entry is one counter-clockwise
/// outer loop followed by the clockwise holes inside it.
pub fn outline_groups(polygons: &Polygons) -> Vec<Polygons> {
    if polygons.is_empty() {
        return Vec::new();
    }
    let shape = to_geo(polygons).union(&MultiPolygon::new(Vec::new()));
    shape
        .into_iter()
        .map(|region| from_geo(&MultiPolygon::new(vec![region])))
        .filter(|group| group.first().is_some_and(|outer| is_counter_clockwise(outer)))
        .collect()
}

/// Path-level merge used by the merge-path operator
pub fn merge_paths(a: &VertexStorage, b: &VertexStorage, operation: ClipOperation) -> VertexStorage {
    let merged = merge(&create_polygons(a), &create_polygons(b), operation);
    create_vertex_storage(&merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polygon::types::{total_area, IntPoint, Polygon};

    fn rect(x0: i64, y0: i64, x1: i64, y1: i64) -> Polygon {
        vec![
            IntPoint::new(x0, y0),
            IntPoint::new(x1, y0),
            IntPoint::new(x1, y1),
            IntPoint::new(x0, y1),
        ]
    }

    #[test]
    fn test_overlapping_squares() {
        let a = vec![rect(0, 0, 1000, 1000)];
        let b = vec![rect(500, 0, 1500, 1000)];

        assert_eq!(total_area(&merge(&a, &b, ClipOperation::Union)), 1_500_000.0);
        assert_eq!(total_area(&merge(&a, &b, ClipOperation::Intersection)), 500_000.0);
        assert_eq!(total_area(&merge(&a, &b, ClipOperation::Difference)), 500_000.0);
        assert_eq!(total_area(&merge(&a, &b, ClipOperation::Xor)), 1_000_000.0);
    }

    #[test]
    fn test_empty_operands() {
        let a = vec![rect(0, 0, 10, 10)];
        let empty = Polygons::new();
        assert!(merge(&empty, &empty, ClipOperation::Union).is_empty());
        assert!(merge(&a, &empty, ClipOperation::Intersection).is_empty());
        assert!(merge(&empty, &a, ClipOperation::Difference).is_empty());
        assert_eq!(total_area(&merge(&a, &empty, ClipOperation::Union)), 100.0);
        assert_eq!(total_area(&merge(&a, &empty, ClipOperation::Difference)), 100.0);
    }

    #[test]
    fn test_difference_creates_hole() {
        let outer = vec![rect(0, 0, 100, 100)];
        let inner = vec![rect(25, 25, 75, 75)];
        let ring = merge(&outer, &inner, ClipOperation::Difference);
        assert_eq!(ring.len(), 2);
        assert_eq!(total_area(&ring), 7_500.0);
    }

    #[test]
    fn test_union_all_matches_sequential() {
        let sets: Vec<Polygons> = (0..7).map(|i| vec![rect(i * 10, 0, i * 10 + 15, 10)]).collect();
        let merged = union_all(sets);
        assert_eq!(merged.len(), 1);
        assert_eq!(total_area(&merged), 75.0 * 10.0);
    }

    #[test]
    fn test_outline_groups_pair_holes_with_outers() {
        let mut shape = vec![rect(0, 0, 100, 100), rect(25, 25, 75, 75), rect(200, 0, 300, 100)];
        // Hole given with the wrong winding is still recognised by nesting
        shape[1].reverse();
        let groups = outline_groups(&shape);
        assert_eq!(groups.len(), 2);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert!(sizes.contains(&2) && sizes.contains(&1));
        for group in &groups {
            assert!(is_counter_clockwise(&group[0]));
            assert!(group[1..].iter().all(|hole| !is_counter_clockwise(hole)));
        }
        assert!(outline_groups(&Polygons::new()).is_empty());
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in ClipOperation::ALL {
            assert_eq!(ClipOperation::from_name(op.name()), Some(op));
        }
    }
}
