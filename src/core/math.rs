// Math boundary between the caller-facing glam types and the nalgebra types rapier uses
//
// Positions and orientations cross the boundary in double precision; velocities,
// forces and impulses in single precision. The kernel itself runs in f32.

use glam::{DMat3, DMat4, DQuat, DVec3, Vec3};
use rapier3d::na::{Isometry3, Matrix3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};

/// Convert a single-precision vector (velocity, force, axis) to nalgebra
pub fn to_na_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

/// Convert a double-precision position to a kernel translation vector
pub fn to_na_translation(p: DVec3) -> Vector3<f32> {
    Vector3::new(p.x as f32, p.y as f32, p.z as f32)
}

pub fn to_na_point(p: Vec3) -> Point3<f32> {
    Point3::new(p.x, p.y, p.z)
}

/// Convert an orientation to a kernel rotation, renormalizing on the way in
pub fn to_na_rotation(q: DQuat) -> UnitQuaternion<f32> {
    UnitQuaternion::new_normalize(Quaternion::new(
        q.w as f32, q.x as f32, q.y as f32, q.z as f32,
    ))
}

pub fn to_na_isometry(position: DVec3, orientation: DQuat) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::from(to_na_translation(position)),
        to_na_rotation(orientation),
    )
}

pub fn from_na_vector(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn from_na_position(v: &Vector3<f32>) -> DVec3 {
    DVec3::new(v.x as f64, v.y as f64, v.z as f64)
}

pub fn from_na_point(p: &Point3<f32>) -> DVec3 {
    DVec3::new(p.x as f64, p.y as f64, p.z as f64)
}

pub fn from_na_rotation(q: &UnitQuaternion<f32>) -> DQuat {
    let c = q.quaternion().coords;
    DQuat::from_xyzw(c.x as f64, c.y as f64, c.z as f64, c.w as f64)
}

pub fn from_na_matrix3(m: &Matrix3<f32>) -> DMat3 {
    let col = |j: usize| DVec3::new(m[(0, j)] as f64, m[(1, j)] as f64, m[(2, j)] as f64);
    DMat3::from_cols(col(0), col(1), col(2))
}

/// Row-major export of a 3x3 matrix (glam stores columns)
pub fn mat3_rows(m: &DMat3) -> [[f64; 3]; 3] {
    m.transpose().to_cols_array_2d()
}

/// Row-major export of a 4x4 matrix
pub fn mat4_rows(m: &DMat4) -> [[f64; 4]; 4] {
    m.transpose().to_cols_array_2d()
}

pub fn is_finite_vec3(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Check if two f64 values are approximately equal
pub fn approx_equal(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// Index of the largest-magnitude component (0 = x, 1 = y, 2 = z)
pub fn dominant_axis(v: Vec3) -> usize {
    let a = v.abs();
    if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    }
}
