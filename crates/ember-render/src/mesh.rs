//! Vertex format, procedural mesh data and GPU meshes.

use crate::error::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_gpu::{BufferDesc, BufferUsage, GraphicsDevice};
use glam::{Vec2, Vec3};
use std::f32::consts::TAU;
use std::mem::{offset_of, size_of};

/// Vertex layout shared by the lit pipelines.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: Vec3, color: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
            normal: normal.to_array(),
            uv: uv.to_array(),
        }
    }

    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
        ]
    }
}

/// CPU-side mesh: vertices plus optional indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Procedural mesh generators.
pub struct MeshBuilder;

impl MeshBuilder {
    /// Unit cube centred on the origin with per-face normals.
    pub fn cube(color: Vec3) -> MeshData {
        // (normal, tangent u, tangent v) for each face
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];

        let mut mesh = MeshData::default();
        for (normal, u, v) in faces {
            let base = mesh.vertices.len() as u32;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let position = normal * 0.5 + u * su + v * sv;
                let uv = Vec2::new(su + 0.5, sv + 0.5);
                mesh.vertices.push(Vertex::new(position, color, normal, uv));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// Square in the XZ plane facing up (`-Y`), `size` wide, with texture
    /// coordinates repeated `uv_repeat` times across it.
    pub fn quad(size: f32, uv_repeat: f32, color: Vec3) -> MeshData {
        let half = size / 2.0;
        let normal = Vec3::NEG_Y;
        let corners = [
            (Vec3::new(-half, 0.0, -half), Vec2::new(0.0, 0.0)),
            (Vec3::new(half, 0.0, -half), Vec2::new(uv_repeat, 0.0)),
            (Vec3::new(half, 0.0, half), Vec2::new(uv_repeat, uv_repeat)),
            (Vec3::new(-half, 0.0, half), Vec2::new(0.0, uv_repeat)),
        ];
        MeshData {
            vertices: corners
                .into_iter()
                .map(|(position, uv)| Vertex::new(position, color, normal, uv))
                .collect(),
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// Surface of revolution around the Y axis.
    ///
    /// `profile` holds `(radius, y)` pairs ordered by increasing `y`; with the
    /// world up being `-Y` that is top to bottom. Normals point outward.
    pub fn lathe(profile: &[(f32, f32)], segments: u32, color: Vec3) -> MeshData {
        let segments = segments.max(3);
        let mut mesh = MeshData::default();
        if profile.len() < 2 {
            return mesh;
        }

        let ring = segments + 1;
        for (i, &(radius, y)) in profile.iter().enumerate() {
            let prev = profile[i.saturating_sub(1)];
            let next = profile[(i + 1).min(profile.len() - 1)];
            let (dr, dy) = (next.0 - prev.0, next.1 - prev.1);
            let slope = Vec2::new(dy, -dr).try_normalize().unwrap_or(Vec2::X);
            let v = i as f32 / (profile.len() - 1) as f32;

            for j in 0..ring {
                let u = j as f32 / segments as f32;
                let (sin, cos) = (u * TAU).sin_cos();
                let position = Vec3::new(radius * cos, y, radius * sin);
                let normal = Vec3::new(slope.x * cos, slope.y, slope.x * sin);
                mesh.vertices
                    .push(Vertex::new(position, color, normal, Vec2::new(u, v)));
            }
        }

        for i in 0..profile.len() as u32 - 1 {
            for j in 0..segments {
                let a = i * ring + j;
                let b = a + 1;
                let c = a + ring;
                let d = c + 1;
                mesh.indices.extend_from_slice(&[a, c, b, b, c, d]);
            }
        }
        mesh
    }

    /// Vase outline of revolution; few `segments` give a faceted look.
    pub fn vase(segments: u32, color: Vec3) -> MeshData {
        const PROFILE: [(f32, f32); 9] = [
            (0.12, -0.5),
            (0.10, -0.45),
            (0.09, -0.38),
            (0.14, -0.3),
            (0.22, -0.2),
            (0.26, -0.12),
            (0.24, -0.05),
            (0.16, -0.01),
            (0.0, 0.0),
        ];
        Self::lathe(&PROFILE, segments, color)
    }
}

/// Mesh uploaded to host-visible GPU buffers.
pub struct Mesh<B: GraphicsDevice> {
    vertex_buffer: B::Buffer,
    index_buffer: Option<B::Buffer>,
    vertex_count: u32,
    index_count: u32,
}

impl<B: GraphicsDevice> Mesh<B> {
    /// Upload `data`. An empty index list draws the vertices in order.
    pub fn upload(device: &B, data: &MeshData, name: &str) -> Result<Self> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        let vertex_buffer = device.create_buffer(&BufferDesc {
            size: vertex_bytes.len().max(1) as u64,
            usage: BufferUsage::Vertex,
            name,
        })?;
        device.write_buffer(&vertex_buffer, 0, vertex_bytes)?;
        device.flush_buffer(&vertex_buffer)?;

        let index_buffer = if data.indices.is_empty() {
            None
        } else {
            let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);
            let buffer = device.create_buffer(&BufferDesc {
                size: index_bytes.len() as u64,
                usage: BufferUsage::Index,
                name,
            })?;
            device.write_buffer(&buffer, 0, index_bytes)?;
            device.flush_buffer(&buffer)?;
            Some(buffer)
        };

        tracing::debug!(
            "Uploaded mesh '{name}': {} vertices, {} indices",
            data.vertices.len(),
            data.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
        })
    }

    pub fn bind(&self, device: &B, command_buffer: vk::CommandBuffer) {
        device.bind_vertex_buffer(command_buffer, &self.vertex_buffer);
        if let Some(index_buffer) = &self.index_buffer {
            device.bind_index_buffer(command_buffer, index_buffer);
        }
    }

    pub fn draw(&self, device: &B, command_buffer: vk::CommandBuffer) {
        if self.index_buffer.is_some() {
            device.draw_indexed(command_buffer, self.index_count);
        } else {
            device.draw(command_buffer, self.vertex_count, 1);
        }
    }

    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub const fn index_count(&self) -> u32 {
        self.index_count
    }
}
