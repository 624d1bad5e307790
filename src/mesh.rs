// Static mesh and per-frame transform data
//
// The quad is uploaded once at startup; the transform block is rebuilt every
// frame from elapsed time.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::mem::{offset_of, size_of};
use std::time::Duration;

/// Model rotation speed around +Z
pub const DEGREES_PER_SECOND: f64 = 90.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(pos: [f32; 2], color: [f32; 3]) -> Self {
        Self { pos, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(offset_of!(Vertex, pos) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Vertex, color) as u32),
        ]
    }
}

pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0]),
    Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0]),
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Matches the `UniformBufferObject` block in mesh.vert.glsl
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    pub fn at(elapsed: Duration, aspect: f32) -> Self {
        let angle = rotation_degrees(elapsed).to_radians();

        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        // Vulkan clip space has Y pointing down
        proj.y_axis.y *= -1.0;

        Self {
            model: Mat4::from_rotation_z(angle),
            view: Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z),
            proj,
        }
    }
}

/// Model rotation in degrees, in [0, 360)
pub fn rotation_degrees(elapsed: Duration) -> f32 {
    ((elapsed.as_secs_f64() * DEGREES_PER_SECOND) % 360.0) as f32
}

pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn model_angle_degrees(model: &Mat4) -> f32 {
        let degrees = model.x_axis.y.atan2(model.x_axis.x).to_degrees();
        (degrees + 360.0) % 360.0
    }

    #[test]
    fn vertex_layout_matches_shader_inputs() {
        assert_eq!(size_of::<Vertex>(), 20);
        assert_eq!(Vertex::binding_description().stride, 20);

        let [pos, color] = Vertex::attribute_descriptions();
        assert_eq!((pos.location, pos.offset, pos.format), (0, 0, vk::Format::R32G32_SFLOAT));
        assert_eq!(
            (color.location, color.offset, color.format),
            (1, 8, vk::Format::R32G32B32_SFLOAT)
        );
    }

    #[test]
    fn quad_indices_stay_in_range() {
        assert_eq!(QUAD_INDICES.len() % 3, 0);
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }

    #[test]
    fn uniform_block_is_three_packed_matrices() {
        assert_eq!(size_of::<UniformBufferObject>(), 3 * 64);
        let ubo = UniformBufferObject::at(Duration::ZERO, 1.0);
        // sin(0) is stored as -0.0, so compare values rather than bytes
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, 1e-6));

        // Column-major, in block order: model, view, proj
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&ubo));
        assert_eq!(floats.len(), 48);
        assert_eq!(&floats[..16], &ubo.model.to_cols_array());
        assert_eq!(&floats[16..32], &ubo.view.to_cols_array());
        assert_eq!(&floats[32..], &ubo.proj.to_cols_array());
    }

    #[test]
    fn rotation_is_ninety_degrees_per_second() {
        assert_eq!(rotation_degrees(Duration::ZERO), 0.0);
        assert!((rotation_degrees(Duration::from_millis(500)) - 45.0).abs() < 1e-4);
        assert!((rotation_degrees(Duration::from_secs(1)) - 90.0).abs() < 1e-4);
        assert!((rotation_degrees(Duration::from_secs(5)) - 90.0).abs() < 1e-4);
        assert!(rotation_degrees(Duration::from_secs(4)).abs() < 1e-4);
    }

    #[test]
    fn model_rotates_about_z() {
        let ubo = UniformBufferObject::at(Duration::from_secs(1), 1.0);

        let rotated = ubo.model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!((rotated - Vec4::new(0.0, 1.0, 0.0, 1.0)).length() < 1e-5);
        assert!((model_angle_degrees(&ubo.model) - 90.0).abs() < 1e-3);

        let z = ubo.model * Vec4::Z;
        assert!((z - Vec4::Z).length() < 1e-6);
    }

    #[test]
    fn projection_flips_y() {
        let ubo = UniformBufferObject::at(Duration::ZERO, 16.0 / 9.0);
        let reference = Mat4::perspective_rh(45f32.to_radians(), 16.0 / 9.0, 0.1, 10.0);

        assert_eq!(ubo.proj.y_axis.y, -reference.y_axis.y);
        assert_eq!(ubo.proj.x_axis.x, reference.x_axis.x);
    }

    #[test]
    fn view_looks_at_origin() {
        let ubo = UniformBufferObject::at(Duration::ZERO, 1.0);
        let origin = ubo.view * Vec4::new(0.0, 0.0, 0.0, 1.0);

        // Right-handed view space looks down -Z
        assert!(origin.x.abs() < 1e-5 && origin.y.abs() < 1e-5);
        assert!((origin.z + 12f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn aspect_ratio_guards_zero_height() {
        assert_eq!(aspect_ratio(vk::Extent2D { width: 800, height: 600 }), 800.0 / 600.0);
        assert_eq!(aspect_ratio(vk::Extent2D { width: 800, height: 0 }), 1.0);
    }
}
