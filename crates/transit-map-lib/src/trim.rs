//! Macro-Segment Trimmer
//!
//! Trunk routes ride one of two shared physical corridors. The corridor backbone
//! is stored once per direction; each route only draws the part of it between
//! its first and last stop. The cut points are the backbone points nearest to
//! those stops, by squared planar distance on raw degrees. At metropolitan scale
//! the distortion of skipping a projection does not change which point is nearest.

use crate::model::Polyline;
use geo::{Coord, LineString};

/// Squared planar distance between two coordinates
#[inline]
fn distance_sq(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Index of the point nearest to `target`; the first one wins ties
pub fn nearest_index(points: &[Coord<f64>], target: Coord<f64>) -> Option<usize> {
    points
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, p)| {
            let d = distance_sq(*p, target);
            match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((i, d)),
            }
        })
        .map(|(i, _)| i)
}

/// Cut the backbone between the points nearest to `start` and `end`
///
/// The backbone polylines are flattened into one point sequence. The two cut
/// indices are ordered ascending, so the result keeps backbone order whichever
/// way the route runs. Returns `None` when the backbone has fewer than two
/// points or the slice collapses to fewer than two.
pub fn try_trim(backbone: &[Polyline], start: Coord<f64>, end: Coord<f64>) -> Option<Polyline> {
    let points: Vec<Coord<f64>> = backbone.iter().flat_map(|l| l.0.iter().copied()).collect();
    if points.len() < 2 {
        return None;
    }
    let a = nearest_index(&points, start)?;
    let b = nearest_index(&points, end)?;
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let slice = &points[lo..=hi];
    if slice.len() < 2 {
        return None;
    }
    Some(LineString::new(slice.to_vec()))
}

/// Trim the backbone to a route's stop span
///
/// `stops` are the route's stop coordinates in travel order for the backbone's
/// direction; only the first and last are used. When trimming is not possible
/// the backbone comes back untrimmed.
pub fn trim(backbone: &[Polyline], stops: &[Coord<f64>]) -> Vec<Polyline> {
    match (stops.first(), stops.last()) {
        (Some(start), Some(end)) if stops.len() >= 2 => try_trim(backbone, *start, *end)
            .map(|line| vec![line])
            .unwrap_or_else(|| backbone.to_vec()),
        _ => backbone.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collinear(n: usize) -> Vec<Coord<f64>> {
        (0..n)
            .map(|i| Coord {
                x: -77.0,
                y: -12.0 + i as f64 * 0.01,
            })
            .collect()
    }

    #[test]
    fn test_trim_ten_point_backbone() {
        let points = collinear(10);
        let backbone = vec![LineString::new(points.clone())];

        let forward = trim(&backbone, &[points[2], points[5], points[7]]);
        let backward = trim(&backbone, &[points[7], points[5], points[2]]);

        let expected = LineString::new(points[2..=7].to_vec());
        assert_eq!(forward, vec![expected.clone()]);
        assert_eq!(backward, vec![expected], "direction must not flip the slice");
    }

    #[test]
    fn test_trim_across_segment_boundaries() {
        let points = collinear(10);
        let backbone = vec![
            LineString::new(points[..4].to_vec()),
            LineString::new(points[4..].to_vec()),
        ];
        // slightly off the line, still nearest to 1 and 8
        let start = Coord { x: -77.0001, y: points[1].y };
        let end = Coord { x: -76.9999, y: points[8].y };
        let trimmed = try_trim(&backbone, start, end).unwrap();
        assert_eq!(trimmed.0, points[1..=8].to_vec());
    }

    #[test]
    fn test_trim_edge_cases_return_input() {
        let single = vec![LineString::new(vec![Coord { x: 0.0, y: 0.0 }])];
        assert_eq!(trim(&single, &[Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }]), single);

        let points = collinear(5);
        let backbone = vec![LineString::new(points.clone())];
        // both stops nearest to the same point: slice collapses
        assert!(try_trim(&backbone, points[3], points[3]).is_none());
        assert_eq!(trim(&backbone, &[points[3], points[3]]), backbone);
        // fewer than two stops
        assert_eq!(trim(&backbone, &[points[1]]), backbone);
    }

    #[test]
    fn test_nearest_index_first_wins_ties() {
        let points = vec![
            Coord { x: 0.0, y: 1.0 },
            Coord { x: 0.0, y: -1.0 },
        ];
        assert_eq!(nearest_index(&points, Coord { x: 0.0, y: 0.0 }), Some(0));
        assert_eq!(nearest_index(&[], Coord { x: 0.0, y: 0.0 }), None);
    }
}
