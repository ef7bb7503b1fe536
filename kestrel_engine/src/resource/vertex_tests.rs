use super::*;

#[test]
fn test_vertex_size_and_stride() {
    assert_eq!(size_of::<Vertex3D>(), 72);
    let layout = Vertex3D::vertex_layout();
    assert_eq!(layout.bindings[0].stride, 72);
}

#[test]
fn test_attribute_locations_follow_field_order() {
    let layout = Vertex3D::vertex_layout();
    let offsets: Vec<(u32, u32)> = layout.attributes.iter().map(|a| (a.location, a.offset)).collect();
    assert_eq!(offsets, vec![(0, 0), (1, 12), (2, 24), (3, 32), (4, 44), (5, 56), (6, 68)]);
    assert_eq!(layout.attributes[6].format, BufferFormat::R32_UINT);
}

#[test]
fn test_vertex_flags_roundtrip_through_u32() {
    let vertex = Vertex3D {
        flags: (VertexFlags::HAS_TEXTURE | VertexFlags::HAS_NORMAL_MAP).bits(),
        ..Default::default()
    };
    assert!(vertex.vertex_flags().contains(VertexFlags::HAS_NORMAL_MAP));
    assert!(!vertex.vertex_flags().contains(VertexFlags::HAS_SPECULAR_MAP));
}

#[test]
fn test_vertex_bytes_are_tightly_packed() {
    let vertices = [Vertex3D::new([1.0, 2.0, 3.0], [1.0; 3], [0.5; 2]); 3];
    let bytes: &[u8] = bytemuck::cast_slice(&vertices);
    assert_eq!(bytes.len(), 3 * 72);
    assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
}
