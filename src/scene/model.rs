// Vertex and index buffers for drawable geometry
//
// Model is generic over the vertex type so the 3D scene pass and the
// 2D overlay pass share one upload and draw path. Geometry is staged
// through a host-visible buffer into device-local memory.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::backend::{Buffer, Device};

/// Describes how a vertex type maps to pipeline vertex input.
pub trait VertexLayout: Pod {
    fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription>;
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl VertexLayout for Vertex {
    fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, normal) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 3,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, uv) as u32,
            },
        ]
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OverlayVertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

impl VertexLayout for OverlayVertex {
    fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<OverlayVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(OverlayVertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(OverlayVertex, color) as u32,
            },
        ]
    }
}

/// Collapse duplicate vertices, keyed on exact bit patterns so no float
/// comparison fuzziness can merge distinct vertices.
pub fn dedup_vertices(vertices: &[Vertex]) -> (Vec<Vertex>, Vec<u32>) {
    let mut unique: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::with_capacity(vertices.len());
    let mut seen: HashMap<[u32; 11], u32> = HashMap::new();

    for v in vertices {
        let key = [
            v.position[0].to_bits(),
            v.position[1].to_bits(),
            v.position[2].to_bits(),
            v.color[0].to_bits(),
            v.color[1].to_bits(),
            v.color[2].to_bits(),
            v.normal[0].to_bits(),
            v.normal[1].to_bits(),
            v.normal[2].to_bits(),
            v.uv[0].to_bits(),
            v.uv[1].to_bits(),
        ];
        let index = *seen.entry(key).or_insert_with(|| {
            unique.push(*v);
            (unique.len() - 1) as u32
        });
        indices.push(index);
    }

    (unique, indices)
}

pub struct Model<V: VertexLayout> {
    vertex_buffer: Buffer,
    index_buffer: Option<Buffer>,
    vertex_count: u32,
    index_count: u32,
    _marker: std::marker::PhantomData<V>,
}

impl<V: VertexLayout> Model<V> {
    pub fn new(device: Arc<Device>, vertices: &[V], indices: Option<&[u32]>) -> Result<Self> {
        anyhow::ensure!(
            vertices.len() >= 3,
            "Model needs at least 3 vertices, got {}",
            vertices.len()
        );

        let vertex_buffer = upload_device_local(
            device.clone(),
            bytemuck::cast_slice(vertices),
            std::mem::size_of::<V>() as vk::DeviceSize,
            vertices.len() as u32,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        let (index_buffer, index_count) = match indices {
            Some(indices) if !indices.is_empty() => {
                let buffer = upload_device_local(
                    device,
                    bytemuck::cast_slice(indices),
                    std::mem::size_of::<u32>() as vk::DeviceSize,
                    indices.len() as u32,
                    vk::BufferUsageFlags::INDEX_BUFFER,
                )?;
                (Some(buffer), indices.len() as u32)
            }
            _ => (None, 0),
        };

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: vertices.len() as u32,
            index_count,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn bind(&self, device: &Device, command_buffer: vk::CommandBuffer) {
        unsafe {
            device.device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[self.vertex_buffer.handle()],
                &[0],
            );
            if let Some(index_buffer) = &self.index_buffer {
                device.device.cmd_bind_index_buffer(
                    command_buffer,
                    index_buffer.handle(),
                    0,
                    vk::IndexType::UINT32,
                );
            }
        }
    }

    pub fn draw(&self, device: &Device, command_buffer: vk::CommandBuffer) {
        unsafe {
            if self.index_buffer.is_some() {
                device
                    .device
                    .cmd_draw_indexed(command_buffer, self.index_count, 1, 0, 0, 0);
            } else {
                device
                    .device
                    .cmd_draw(command_buffer, self.vertex_count, 1, 0, 0);
            }
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl Model<Vertex> {
    /// Load a Wavefront OBJ file, merging all meshes and collapsing
    /// duplicate vertices into an indexed model.
    pub fn load_obj(device: Arc<Device>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (models, _materials) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS)
            .with_context(|| format!("Failed to load OBJ {}", path.display()))?;

        let mut vertices = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            for &index in &mesh.indices {
                let i = index as usize;
                let position = [
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                ];
                let color = if mesh.vertex_color.is_empty() {
                    [1.0, 1.0, 1.0]
                } else {
                    [
                        mesh.vertex_color[3 * i],
                        mesh.vertex_color[3 * i + 1],
                        mesh.vertex_color[3 * i + 2],
                    ]
                };
                let normal = if mesh.normals.is_empty() {
                    [0.0, 0.0, 0.0]
                } else {
                    [
                        mesh.normals[3 * i],
                        mesh.normals[3 * i + 1],
                        mesh.normals[3 * i + 2],
                    ]
                };
                let uv = if mesh.texcoords.is_empty() {
                    [0.0, 0.0]
                } else {
                    [mesh.texcoords[2 * i], mesh.texcoords[2 * i + 1]]
                };
                vertices.push(Vertex {
                    position,
                    color,
                    normal,
                    uv,
                });
            }
        }

        let (unique, indices) = dedup_vertices(&vertices);
        log::info!(
            "Loaded {}: {} vertices ({} unique)",
            path.display(),
            vertices.len(),
            unique.len()
        );

        Self::new(device, &unique, Some(&indices))
    }
}

/// Stage `data` through a host-visible buffer into a device-local one.
fn upload_device_local(
    device: Arc<Device>,
    data: &[u8],
    instance_size: vk::DeviceSize,
    instance_count: u32,
    usage: vk::BufferUsageFlags,
) -> Result<Buffer> {
    let mut staging = Buffer::new(
        device.clone(),
        instance_size,
        instance_count,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        0,
    )?;
    staging.map()?;
    staging.write_to_buffer(data, 0);
    staging.unmap();

    let buffer = Buffer::new(
        device.clone(),
        instance_size,
        instance_count,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        0,
    )?;

    device.copy_buffer(staging.handle(), buffer.handle(), staging.buffer_size())?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(position: [f32; 3]) -> Vertex {
        Vertex {
            position,
            color: [1.0, 1.0, 1.0],
            normal: [0.0, 1.0, 0.0],
            uv: [0.0, 0.0],
        }
    }

    #[test]
    fn dedup_collapses_identical_vertices() {
        let a = vertex([0.0, 0.0, 0.0]);
        let b = vertex([1.0, 0.0, 0.0]);
        let (unique, indices) = dedup_vertices(&[a, b, a, b, a]);
        assert_eq!(unique.len(), 2);
        assert_eq!(indices, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn dedup_preserves_distinct_vertices() {
        let verts: Vec<Vertex> = (0..4).map(|i| vertex([i as f32, 0.0, 0.0])).collect();
        let (unique, indices) = dedup_vertices(&verts);
        assert_eq!(unique.len(), 4);
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(unique, verts);
    }

    #[test]
    fn dedup_distinguishes_negative_zero() {
        // -0.0 == 0.0 under float comparison but has a different bit
        // pattern; bit-keyed dedup keeps them apart
        let a = vertex([0.0, 0.0, 0.0]);
        let b = vertex([-0.0, 0.0, 0.0]);
        let (unique, _) = dedup_vertices(&[a, b]);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn dedup_reconstructs_original_stream() {
        let verts = vec![
            vertex([0.0, 0.0, 0.0]),
            vertex([1.0, 1.0, 1.0]),
            vertex([0.0, 0.0, 0.0]),
        ];
        let (unique, indices) = dedup_vertices(&verts);
        let rebuilt: Vec<Vertex> = indices.iter().map(|&i| unique[i as usize]).collect();
        assert_eq!(rebuilt, verts);
    }

    #[test]
    fn vertex_attributes_cover_all_fields() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs.len(), 4);
        let total: usize = 3 * 4 + 3 * 4 + 3 * 4 + 2 * 4;
        assert_eq!(std::mem::size_of::<Vertex>(), total);
    }

    #[test]
    fn overlay_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<OverlayVertex>(), 5 * 4);
        assert_eq!(OverlayVertex::attribute_descriptions().len(), 2);
    }
}
