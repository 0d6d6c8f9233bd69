use geo_types::{Coord, LineString, Polygon};

use crate::traits::PolygonApproximator;

/// Douglas-Peucker approximation of closed rings using geo's implementation.
///
/// The ring is split at its first point and the point farthest from it, each
/// half is simplified separately, and the two split points are dropped again
/// when they turn out to lie on a straight edge.
#[derive(Debug, Clone, Default)]
pub struct DouglasPeuckerApproximator;

impl PolygonApproximator for DouglasPeuckerApproximator {
    fn approximate(&self, ring: &[[f64; 2]], epsilon: f64) -> Vec<[f64; 2]> {
        use geo::Simplify;

        let points = open_ring(ring);
        if points.len() < 3 {
            return points.to_vec();
        }
        let first = points[0];
        let far = (1..points.len())
            .max_by(|&a, &b| distance(first, points[a]).total_cmp(&distance(first, points[b])))
            .unwrap_or(1);

        let simplify = |chain: Vec<[f64; 2]>| -> Vec<[f64; 2]> {
            let coords: Vec<Coord<f64>> = chain.iter().map(|&[x, y]| Coord { x, y }).collect();
            LineString::new(coords)
                .simplify(&epsilon)
                .coords()
                .map(|coord| [coord.x, coord.y])
                .collect()
        };
        let mut head = simplify(points[..=far].to_vec());
        let mut tail_chain = points[far..].to_vec();
        tail_chain.push(first);
        let tail = simplify(tail_chain);

        // head ends at `far` and tail ends at `first`; both are already present
        head.extend(tail.into_iter().skip(1));
        head.pop();

        let split_far = head.iter().position(|p| *p == points[far]);
        let mut vertices = head;
        if let Some(index) = split_far {
            drop_if_collinear(&mut vertices, index, epsilon);
        }
        drop_if_collinear(&mut vertices, 0, epsilon);
        vertices
    }
}

/// Ring without a repeated closing point.
pub(crate) fn open_ring(ring: &[[f64; 2]]) -> &[[f64; 2]] {
    match ring {
        [first, .., last] if first == last && ring.len() > 1 => &ring[..ring.len() - 1],
        _ => ring,
    }
}

fn drop_if_collinear(vertices: &mut Vec<[f64; 2]>, index: usize, epsilon: f64) {
    let n = vertices.len();
    if n <= 3 || index >= n {
        return;
    }
    let prev = vertices[(index + n - 1) % n];
    let next = vertices[(index + 1) % n];
    if segment_distance(vertices[index], prev, next) < epsilon {
        vertices.remove(index);
    }
}

pub(crate) fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

fn segment_distance(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return distance(p, a);
    }
    let t = (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / length_sq).clamp(0.0, 1.0);
    distance(p, [a[0] + t * dx, a[1] + t * dy])
}

/// Closed length of a ring.
pub fn ring_perimeter(ring: &[[f64; 2]]) -> f64 {
    let points = open_ring(ring);
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..points.len() {
        total += distance(points[i], points[(i + 1) % points.len()]);
    }
    total
}

pub fn ring_polygon(ring: &[[f64; 2]]) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = open_ring(ring).iter().map(|&[x, y]| Coord { x, y }).collect();
    Polygon::new(LineString::new(coords), vec![])
}

/// Enclosed area of a ring, independent of winding.
pub fn ring_area(ring: &[[f64; 2]]) -> f64 {
    use geo::Area;
    ring_polygon(ring).unsigned_area()
}
