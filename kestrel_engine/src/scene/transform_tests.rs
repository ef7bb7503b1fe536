use super::*;
use std::f32::consts::FRAC_PI_2;

fn assert_vec3_near(a: Vec3, b: Vec3) {
    assert!((a - b).length() < 1e-5, "{:?} != {:?}", a, b);
}

#[test]
fn test_new_transform_is_dirty_identity() {
    let t = Transform::new();
    assert!(t.is_dirty());
    assert_eq!(t.model_matrix(), Mat4::IDENTITY);
    assert_eq!(t.normal_matrix(), Mat3::IDENTITY);
}

#[test]
fn test_setters_mark_dirty() {
    let mut t = Transform::new();
    t.clear_dirty();
    t.move_by(Vec3::X);
    assert!(t.is_dirty());
    assert_eq!(t.position(), Vec3::X);

    t.clear_dirty();
    t.set_scale(Vec3::splat(2.0));
    assert!(t.is_dirty());
}

#[test]
fn test_basis_vectors_follow_rotation() {
    let mut t = Transform::new();
    assert_vec3_near(t.forward(), Vec3::NEG_Z);
    assert_vec3_near(t.right(), Vec3::X);
    assert_vec3_near(t.up(), Vec3::Y);

    t.rotate_by(Vec3::new(0.0, FRAC_PI_2, 0.0));
    assert_vec3_near(t.forward(), Vec3::NEG_X);
}

#[test]
fn test_model_matrix_applies_scale_then_translation() {
    let mut t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
    t.set_scale(Vec3::splat(2.0));
    let p = t.model_matrix().transform_point3(Vec3::ONE);
    assert_vec3_near(p, Vec3::new(3.0, 4.0, 5.0));
}

#[test]
fn test_normal_matrix_undoes_non_uniform_scale() {
    let mut t = Transform::new();
    t.set_scale(Vec3::new(2.0, 1.0, 1.0));
    let n = t.normal_matrix() * Vec3::X;
    assert_vec3_near(n, Vec3::new(0.5, 0.0, 0.0));
}
