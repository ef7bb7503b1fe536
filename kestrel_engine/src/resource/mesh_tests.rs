/// Tests for Mesh allocation and transform upload
///
/// Meshes are allocated through a Renderer backed by MockGraphicsDevice.

use super::*;
use std::sync::Mutex;
use glam::Vec3;
use crate::graphics_device::{Extent2D, Texture};
use crate::graphics_device::mock_graphics_device::{MockBuffer, MockGraphicsDevice, MockState};
use crate::renderer::{FrameStatus, RendererSettings};

// ============================================================================
// Helper Functions
// ============================================================================

fn create_renderer() -> (Renderer, Arc<Mutex<MockState>>) {
    let device = MockGraphicsDevice::new();
    let state = device.state();
    let renderer = Renderer::new(Box::new(device), Extent2D::new(320, 240), RendererSettings::default()).unwrap();
    (renderer, state)
}

fn quad() -> Mesh {
    Mesh::new(
        vec![
            Vertex3D::new([-1.0, -1.0, 0.0], [1.0; 3], [0.0, 0.0]),
            Vertex3D::new([1.0, -1.0, 0.0], [1.0; 3], [1.0, 0.0]),
            Vertex3D::new([1.0, 1.0, 0.0], [1.0; 3], [1.0, 1.0]),
            Vertex3D::new([-1.0, 1.0, 0.0], [1.0; 3], [0.0, 1.0]),
        ],
        vec![0, 1, 2, 2, 3, 0],
    )
}

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn test_allocate_creates_buffers_once() {
    let (renderer, state) = create_renderer();
    let mut mesh = quad();
    assert!(!mesh.is_allocated());
    assert_eq!(mesh.index_count(), 6);

    mesh.allocate(&renderer).unwrap();
    let after_first = state.lock().unwrap().live_buffers;
    mesh.allocate(&renderer).unwrap();

    assert!(mesh.is_allocated());
    assert_eq!(state.lock().unwrap().live_buffers, after_first);

    let gpu = mesh.gpu().unwrap();
    assert_eq!(gpu.vertex_buffer.size(), 4 * size_of::<Vertex3D>() as u64);
    assert_eq!(gpu.index_buffer.size(), 6 * size_of::<Index>() as u64);
    assert_eq!(gpu.uniform_buffer.size(), size_of::<MatricesUniformData>() as u64);
}

#[test]
fn test_allocate_rejects_empty_mesh() {
    let (renderer, _state) = create_renderer();
    let mut mesh = Mesh::new(Vec::new(), vec![0, 1, 2]);
    assert!(matches!(mesh.allocate(&renderer), Err(Error::InvalidResource(_))));
    assert!(!mesh.is_allocated());
}

#[test]
fn test_allocate_rejects_out_of_range_index() {
    let (renderer, _state) = create_renderer();
    let mut mesh = quad();
    mesh.indices.push(4);
    assert!(matches!(mesh.allocate(&renderer), Err(Error::InvalidResource(_))));
}

#[test]
fn test_material_textures_bound_in_descriptor_set() {
    let (renderer, state) = create_renderer();
    let normal: Arc<dyn Texture> = renderer.create_blank_texture().unwrap();
    let mut mesh = quad().with_material(Material::new().with_normal(normal));

    mesh.allocate(&renderer).unwrap();
    assert_eq!(mesh.gpu().unwrap().descriptor_set.binding_count(), 6);
    assert_eq!(state.lock().unwrap().descriptor_sets_created, 1);
}

// ============================================================================
// Deallocation
// ============================================================================

#[test]
fn test_deallocate_is_idempotent() {
    let (renderer, state) = create_renderer();
    let baseline = state.lock().unwrap().live_buffers;
    let mut mesh = quad();

    mesh.deallocate(&renderer).unwrap();
    mesh.allocate(&renderer).unwrap();
    mesh.deallocate(&renderer).unwrap();
    mesh.deallocate(&renderer).unwrap();

    assert!(!mesh.is_allocated());
    assert_eq!(state.lock().unwrap().live_buffers, baseline);
}

#[test]
fn test_deallocate_rejected_during_frame() {
    let (mut renderer, _state) = create_renderer();
    let mut mesh = quad();
    mesh.allocate(&renderer).unwrap();

    assert_eq!(renderer.begin_frame().unwrap(), FrameStatus::Ready);
    assert!(matches!(mesh.deallocate(&renderer), Err(Error::ContractViolation(_))));
    assert!(mesh.is_allocated());

    renderer.end_frame().unwrap();
    mesh.deallocate(&renderer).unwrap();
}

#[test]
fn test_mesh_can_be_reallocated() {
    let (renderer, _state) = create_renderer();
    let mut mesh = quad();
    mesh.allocate(&renderer).unwrap();
    mesh.deallocate(&renderer).unwrap();
    mesh.allocate(&renderer).unwrap();
    assert!(mesh.gpu().unwrap().vertex_buffer.is_allocated());
}

// ============================================================================
// Transform upload
// ============================================================================

#[test]
fn test_update_transform_writes_matrices() {
    let (renderer, _state) = create_renderer();
    let mut mesh = quad();
    mesh.allocate(&renderer).unwrap();

    let mut transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
    transform.set_scale(Vec3::splat(2.0));
    mesh.update_transform(&transform).unwrap();

    let expected = MatricesUniformData::new(transform.model_matrix(), transform.normal_matrix());
    let uniform = mesh.gpu().unwrap().uniform_buffer.clone();
    let mock = uniform.as_any().downcast_ref::<MockBuffer>().unwrap();
    assert_eq!(&mock.contents.lock().unwrap()[..], bytemuck::bytes_of(&expected));
}

#[test]
fn test_update_transform_requires_allocation() {
    let mut mesh = quad();
    assert!(matches!(mesh.update_transform(&Transform::new()), Err(Error::InvalidResource(_))));
}

#[test]
fn test_needs_transform_upload() {
    let (renderer, _state) = create_renderer();
    let mut mesh = quad();
    let mut transform = Transform::new();
    transform.clear_dirty();

    // never uploaded
    assert!(mesh.needs_transform_upload(&transform));

    mesh.allocate(&renderer).unwrap();
    mesh.update_transform(&transform).unwrap();
    assert!(!mesh.needs_transform_upload(&transform));

    transform.set_position(Vec3::Y);
    assert!(mesh.needs_transform_upload(&transform));
}

#[test]
fn test_clean_transform_differing_from_upload_needs_upload() {
    let (renderer, _state) = create_renderer();
    let mut mesh = quad();
    mesh.allocate(&renderer).unwrap();

    let mut first = Transform::from_position(Vec3::X);
    let mut second = Transform::from_position(Vec3::Z);
    first.clear_dirty();
    second.clear_dirty();

    mesh.update_transform(&first).unwrap();
    assert!(!mesh.needs_transform_upload(&first));
    assert!(mesh.needs_transform_upload(&second));

    mesh.update_transform(&second).unwrap();
    assert!(mesh.needs_transform_upload(&first));
}

#[test]
fn test_released_resource_reported() {
    let (renderer, _state) = create_renderer();
    let mut mesh = quad();
    mesh.allocate(&renderer).unwrap();
    assert_eq!(mesh.gpu().unwrap().released_resource(), None);

    let gpu = mesh.gpu().unwrap();
    assert!(gpu.index_buffer.release());
    assert_eq!(gpu.released_resource(), Some("index buffer"));
}
