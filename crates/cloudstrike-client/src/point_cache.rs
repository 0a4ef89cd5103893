//! GPU-resident point clouds.
//!
//! Each attached cloud owns an instance buffer (one entry per point) and a
//! small model uniform. Releasing a handle destroys both buffers right away
//! rather than waiting for the last reference to drop.

use glam::Mat4;
use wgpu::util::DeviceExt;

use cloudstrike_core::components::{PointCloudHandle, Transform};
use cloudstrike_core::pointcloud::PointCloudAsset;
use cloudstrike_core::scene::RenderResources;

/// One rendered point. Colorless clouds render white.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointInstance {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl PointInstance {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PointInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniform {
    pub model: [[f32; 4]; 4], // offset 0
    pub point_size: f32,      // offset 64
    pub _pad: [f32; 3],       // offset 68 → 80
}

impl ModelUniform {
    pub fn new(transform: &Transform, point_size: f32) -> Self {
        Self {
            model: transform.matrix().to_cols_array_2d(),
            point_size,
            _pad: [0.0; 3],
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

pub fn pack_instances(asset: &PointCloudAsset) -> Vec<PointInstance> {
    let attributes = &asset.attributes;
    match &attributes.colors {
        Some(colors) => attributes
            .positions
            .iter()
            .zip(colors)
            .map(|(p, c)| PointInstance {
                position: *p,
                color: *c,
            })
            .collect(),
        None => attributes
            .positions
            .iter()
            .map(|p| PointInstance {
                position: *p,
                color: [1.0; 3],
            })
            .collect(),
    }
}

pub struct GpuPointCloud {
    pub instance_buffer: wgpu::Buffer,
    pub model_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub point_count: u32,
}

/// Point clouds currently on the GPU, indexed by [`PointCloudHandle`].
#[derive(Default)]
pub struct PointCloudCache {
    slots: Vec<Option<GpuPointCloud>>,
}

impl PointCloudCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: PointCloudHandle) -> Option<&GpuPointCloud> {
        self.slots.get(handle.0).and_then(|slot| slot.as_ref())
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn insert(&mut self, cloud: GpuPointCloud) -> PointCloudHandle {
        if let Some(index) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[index] = Some(cloud);
            PointCloudHandle(index)
        } else {
            self.slots.push(Some(cloud));
            PointCloudHandle(self.slots.len() - 1)
        }
    }

    fn remove(&mut self, handle: PointCloudHandle) -> Option<GpuPointCloud> {
        self.slots.get_mut(handle.0).and_then(|slot| slot.take())
    }

    /// Destroy every remaining buffer. Returns how many clouds were freed.
    pub fn release_all(&mut self) -> usize {
        let mut freed = 0;
        for cloud in self.slots.drain(..).flatten() {
            destroy(cloud);
            freed += 1;
        }
        freed
    }
}

fn destroy(cloud: GpuPointCloud) {
    cloud.instance_buffer.destroy();
    cloud.model_buffer.destroy();
}

/// Borrowed view of the GPU state that the scene uploads through.
pub struct GpuUploader<'a> {
    pub device: &'a wgpu::Device,
    pub model_layout: &'a wgpu::BindGroupLayout,
    pub cache: &'a mut PointCloudCache,
}

impl RenderResources for GpuUploader<'_> {
    fn upload(&mut self, asset: &PointCloudAsset) -> PointCloudHandle {
        let instances = pack_instances(asset);
        let instance_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Point Instances: {}", asset.source)),
                contents: bytemuck::cast_slice(&instances),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let transform = Transform {
            rotation: asset.rotation,
            ..Default::default()
        };
        let model = ModelUniform::new(&transform, asset.point_size);
        let model_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Point Model Uniform"),
                contents: bytemuck::cast_slice(&[model]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Point Model Bind Group"),
            layout: self.model_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: model_buffer.as_entire_binding(),
            }],
        });

        let handle = self.cache.insert(GpuPointCloud {
            instance_buffer,
            model_buffer,
            bind_group,
            point_count: instances.len() as u32,
        });
        tracing::debug!(
            "Uploaded {} ({} points) as {:?}",
            asset.source,
            instances.len(),
            handle
        );
        handle
    }

    fn release(&mut self, handle: PointCloudHandle) {
        match self.cache.remove(handle) {
            Some(cloud) => destroy(cloud),
            None => tracing::warn!("Release of unknown point cloud {:?}", handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudstrike_core::pointcloud::{corrective_rotation, PointAttributes, PointCloudFormat};
    use std::num::NonZeroUsize;

    fn asset(colors: Option<Vec<[f32; 3]>>) -> PointCloudAsset {
        PointCloudAsset {
            source: "t.ply".into(),
            format: PointCloudFormat::Ply,
            stride: NonZeroUsize::new(1).unwrap(),
            attributes: PointAttributes {
                positions: vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
                colors,
            },
            rotation: corrective_rotation(),
            point_size: 0.01,
        }
    }

    #[test]
    fn test_pack_instances_defaults_to_white() {
        let packed = pack_instances(&asset(None));
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[1].position, [4.0, 5.0, 6.0]);
        assert_eq!(packed[0].color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_pack_instances_keeps_colors() {
        let packed = pack_instances(&asset(Some(vec![[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]])));
        assert_eq!(packed[1].color, [0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_gpu_layout_sizes() {
        assert_eq!(std::mem::size_of::<PointInstance>(), 24);
        assert_eq!(std::mem::size_of::<ModelUniform>(), 80);
    }

    #[test]
    fn test_model_uniform_carries_rotation() {
        let transform = Transform {
            rotation: corrective_rotation(),
            ..Default::default()
        };
        let uniform = ModelUniform::new(&transform, 0.02);
        let mapped = uniform.matrix().transform_vector3(glam::Vec3::Z);
        assert!((mapped - glam::Vec3::Y).length() < 1e-5);
        assert_eq!(uniform.point_size, 0.02);
    }
}
