//! Planar polygon helpers used by area-weighted resampling and mask
//! rasterization.

/// A vertex in some planar coordinate space.
pub type Vertex = (f64, f64);

/// Unsigned area by the shoelace formula.
#[must_use]
pub fn polygon_area(polygon: &[Vertex]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for (i, &(x0, y0)) in polygon.iter().enumerate() {
        let (x1, y1) = polygon[(i + 1) % polygon.len()];
        twice_area += x0 * y1 - x1 * y0;
    }
    (twice_area / 2.0).abs()
}

/// Clips a polygon to an axis-aligned rectangle (Sutherland-Hodgman).
///
/// Works for any simple polygon whose intersection with the rectangle is
/// convex; cell quadrilaterals always satisfy this.
#[must_use]
pub fn clip_to_rect(polygon: &[Vertex], x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Vec<Vertex> {
    let mut output = polygon.to_vec();
    let edges: [(fn(Vertex, f64) -> bool, fn(Vertex, Vertex, f64) -> Vertex, f64); 4] = [
        (|p, v| p.0 >= v, intersect_vertical, x_min),
        (|p, v| p.0 <= v, intersect_vertical, x_max),
        (|p, v| p.1 >= v, intersect_horizontal, y_min),
        (|p, v| p.1 <= v, intersect_horizontal, y_max),
    ];

    for (inside, intersect, bound) in edges {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        for &current in &input {
            let cur_in = inside(current, bound);
            let prev_in = inside(prev, bound);
            if cur_in {
                if !prev_in {
                    output.push(intersect(prev, current, bound));
                }
                output.push(current);
            } else if prev_in {
                output.push(intersect(prev, current, bound));
            }
            prev = current;
        }
    }
    output
}

fn intersect_vertical(a: Vertex, b: Vertex, x: f64) -> Vertex {
    let t = (x - a.0) / (b.0 - a.0);
    (x, a.1 + t * (b.1 - a.1))
}

fn intersect_horizontal(a: Vertex, b: Vertex, y: f64) -> Vertex {
    let t = (y - a.1) / (b.1 - a.1);
    (a.0 + t * (b.0 - a.0), y)
}

/// Ray-casting point-in-polygon test. Points on an edge may land either way.
#[must_use]
pub fn contains_point(polygon: &[Vertex], x: f64, y: f64) -> bool {
    let mut inside = false;
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Axis-aligned bounding box as `(x_min, y_min, x_max, y_max)`.
#[must_use]
pub fn bounding_box(polygon: &[Vertex]) -> (f64, f64, f64, f64) {
    polygon.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT_SQUARE: [Vertex; 4] = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];

    #[test]
    fn test_area_independent_of_winding() {
        let mut reversed = UNIT_SQUARE.to_vec();
        reversed.reverse();
        assert_eq!(polygon_area(&UNIT_SQUARE), 1.0);
        assert_eq!(polygon_area(&reversed), 1.0);
    }

    #[test]
    fn test_clip_partial_overlap() {
        let square = [(0.5, 0.5), (1.5, 0.5), (1.5, 1.5), (0.5, 1.5)];
        let clipped = clip_to_rect(&square, 0.0, 0.0, 1.0, 1.0);
        assert!((polygon_area(&clipped) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_clip_rotated_diamond() {
        let diamond = [(1.0, 0.0), (2.0, 1.0), (1.0, 2.0), (0.0, 1.0)];
        let total: f64 = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
            .iter()
            .map(|&(x, y)| polygon_area(&clip_to_rect(&diamond, x, y, x + 1.0, y + 1.0)))
            .sum();
        assert!((total - polygon_area(&diamond)).abs() < 1e-12);
    }

    #[test]
    fn test_clip_disjoint_is_empty() {
        let clipped = clip_to_rect(&UNIT_SQUARE, 5.0, 5.0, 6.0, 6.0);
        assert_eq!(polygon_area(&clipped), 0.0);
    }

    #[test]
    fn test_contains_point() {
        assert!(contains_point(&UNIT_SQUARE, 0.5, 0.5));
        assert!(!contains_point(&UNIT_SQUARE, 1.5, 0.5));
        assert!(!contains_point(&UNIT_SQUARE[..2], 0.5, 0.0));
    }
}
