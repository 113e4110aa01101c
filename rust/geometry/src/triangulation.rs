// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polygon triangulation utilities
//!
//! Wrapper around earcutr for n-gon tessellation, with the 3D-to-2D plane
//! projection needed for face-list polygons.

use crate::{Point2, Point3, Vector3};

/// Calculate the normal of a polygon from its vertices.
/// Optimized for triangles using a simple cross product.
#[inline]
pub fn polygon_normal(points: &[Point3<f64>]) -> Vector3<f64> {
    let n = points.len();

    if n < 3 {
        return Vector3::new(0.0, 0.0, 1.0);
    }

    if n == 3 {
        let v1 = points[1] - points[0];
        let v2 = points[2] - points[0];
        let normal = v1.cross(&v2);
        let len = normal.norm();
        if len > 1e-10 {
            return normal / len;
        }
        return Vector3::new(0.0, 0.0, 1.0);
    }

    // Newell's method for robust normals on larger polygons
    let mut normal = Vector3::<f64>::zeros();
    for i in 0..n {
        let current = &points[i];
        let next = &points[(i + 1) % n];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }

    let len = normal.norm();
    if len > 1e-10 {
        normal / len
    } else {
        Vector3::new(0.0, 0.0, 1.0)
    }
}

/// Check if a polygon is convex (all cross products have same sign)
#[inline]
fn is_convex(points: &[Point2<f64>]) -> bool {
    if points.len() < 3 {
        return false;
    }

    let n = points.len();
    let mut sign = 0i8;

    for i in 0..n {
        let p0 = &points[i];
        let p1 = &points[(i + 1) % n];
        let p2 = &points[(i + 2) % n];

        let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);

        if cross.abs() > 1e-10 {
            let current_sign = if cross > 0.0 { 1i8 } else { -1i8 };
            if sign == 0 {
                sign = current_sign;
            } else if sign != current_sign {
                return false;
            }
        }
    }

    true
}

/// Simple fan triangulation for convex polygons
#[inline]
fn fan_triangulate(n: usize) -> Vec<[usize; 3]> {
    (1..n - 1).map(|i| [0, i, i + 1]).collect()
}

/// Project 3D points onto the 2D plane defined by a normal.
#[inline]
pub fn project_to_2d(points_3d: &[Point3<f64>], normal: &Vector3<f64>) -> Vec<Point2<f64>> {
    if points_3d.is_empty() {
        return Vec::new();
    }

    let origin = points_3d[0];

    // Orthonormal basis on the plane; pick the axis least parallel to the
    // normal for a stable cross product
    let abs_x = normal.x.abs();
    let abs_y = normal.y.abs();
    let abs_z = normal.z.abs();

    let reference = if abs_x <= abs_y && abs_x <= abs_z {
        Vector3::new(1.0, 0.0, 0.0)
    } else if abs_y <= abs_z {
        Vector3::new(0.0, 1.0, 0.0)
    } else {
        Vector3::new(0.0, 0.0, 1.0)
    };

    let u_axis = normal.cross(&reference).normalize();
    let v_axis = normal.cross(&u_axis).normalize();

    points_3d
        .iter()
        .map(|p| {
            let v = p - origin;
            Point2::new(v.dot(&u_axis), v.dot(&v_axis))
        })
        .collect()
}

/// Tessellate an n-gon given by its 3D boundary into triangles.
///
/// Returns index triples into the input point list. An untriangulatable
/// input (degenerate, fewer than 3 points) yields an empty list; callers
/// treat that as a dropped face, not an error.
pub fn tessellate_ngon(points: &[Point3<f64>]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }
    if n == 3 {
        return vec![[0, 1, 2]];
    }
    if n == 4 {
        return vec![[0, 1, 2], [0, 2, 3]];
    }

    let normal = polygon_normal(points);
    let projected = project_to_2d(points, &normal);

    if n <= 8 && is_convex(&projected) {
        return fan_triangulate(n);
    }

    // Flatten points for earcutr
    let mut vertices = Vec::with_capacity(n * 2);
    for p in &projected {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    let indices = match earcutr::earcut(&vertices, &[], 2) {
        Ok(indices) => indices,
        Err(_) => return Vec::new(),
    };

    indices
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tessellate_triangle_passthrough() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        assert_eq!(tessellate_ngon(&points), vec![[0, 1, 2]]);
    }

    #[test]
    fn test_tessellate_square() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let tris = tessellate_ngon(&points);
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn test_tessellate_concave_pentagon() {
        // arrow-head shape, concave at index 4
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        let tris = tessellate_ngon(&points);
        assert_eq!(tris.len(), 3);
    }

    #[test]
    fn test_tessellate_convex_hexagon_fan() {
        let points: Vec<Point3<f64>> = (0..6)
            .map(|i| {
                let a = i as f64 * std::f64::consts::FRAC_PI_3;
                Point3::new(a.cos(), a.sin(), 0.0)
            })
            .collect();
        let tris = tessellate_ngon(&points);
        assert_eq!(tris, vec![[0, 1, 2], [0, 2, 3], [0, 3, 4], [0, 4, 5]]);
    }

    #[test]
    fn test_tessellate_off_plane_polygon() {
        // quad living on the x=2 plane; projection must handle any normal
        let points = vec![
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(2.0, 1.0, 1.0),
            Point3::new(2.0, 0.0, 1.0),
        ];
        let tris = tessellate_ngon(&points);
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn test_tessellate_too_few_points() {
        let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        assert!(tessellate_ngon(&points).is_empty());
    }

    #[test]
    fn test_polygon_normal_xy_plane() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let normal = polygon_normal(&points);
        assert!((normal.z.abs() - 1.0).abs() < 0.001);
    }
}
