use std::sync::Arc;

use glam::Mat4;
use wgpu::util::DeviceExt;
use winit::window::Window;

use cloudstrike_core::camera::CameraState;
use cloudstrike_core::components::{PointCloud, Transform};
use cloudstrike_core::config::CameraConfig;

use crate::catalog_client::PreviewImage;
use crate::point_cache::{GpuUploader, PointCloudCache, PointInstance};

/// Fixed drawing surface size.
pub const VIEWPORT_WIDTH: u32 = 800;
pub const VIEWPORT_HEIGHT: u32 = 600;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.05,
    a: 1.0,
};

#[derive(Debug)]
pub enum RendererError {
    Surface(String),
    NoAdapter,
    Device(String),
}

impl std::fmt::Display for RendererError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RendererError::Surface(msg) => write!(f, "Failed to create surface: {}", msg),
            RendererError::NoAdapter => write!(f, "Failed to find suitable GPU adapter"),
            RendererError::Device(msg) => write!(f, "Failed to create device: {}", msg),
        }
    }
}

impl std::error::Error for RendererError {}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view: [[f32; 4]; 4],            // offset 0
    pub projection: [[f32; 4]; 4],      // offset 64
    pub view_projection: [[f32; 4]; 4], // offset 128 → 192
}

impl CameraUniform {
    pub fn new(camera: &CameraState, config: &CameraConfig, width: u32, height: u32) -> Self {
        let view = camera.view_matrix();
        let projection = Mat4::perspective_rh(
            config.fov_degrees.to_radians(),
            width as f32 / height.max(1) as f32,
            config.near,
            config.far,
        );
        Self {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            view_projection: (projection * view).to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EnemyVertex {
    pub position: [f32; 3],
    pub shade: f32,
}

impl EnemyVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<EnemyVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EnemyInstance {
    pub model: [[f32; 4]; 4],
}

impl EnemyInstance {
    const ATTRIBS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        2 => Float32x4, 3 => Float32x4, 4 => Float32x4, 5 => Float32x4
    ];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<EnemyInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// 36 vertices of an axis-aligned cube with a flat shade per face.
pub fn cube_vertices(half_extent: f32) -> Vec<EnemyVertex> {
    // (normal axis, sign, shade)
    let faces: [(usize, f32, f32); 6] = [
        (0, 1.0, 0.8),
        (0, -1.0, 0.6),
        (1, 1.0, 1.0),
        (1, -1.0, 0.4),
        (2, 1.0, 0.9),
        (2, -1.0, 0.7),
    ];
    let mut vertices = Vec::with_capacity(36);
    for (axis, sign, shade) in faces {
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        let corner = |a: f32, b: f32| {
            let mut p = [0.0f32; 3];
            p[axis] = sign * half_extent;
            p[u] = a * half_extent;
            p[v] = b * half_extent;
            EnemyVertex { position: p, shade }
        };
        let quad = [
            corner(-1.0, -1.0),
            corner(1.0, -1.0),
            corner(1.0, 1.0),
            corner(-1.0, -1.0),
            corner(1.0, 1.0),
            corner(-1.0, 1.0),
        ];
        vertices.extend_from_slice(&quad);
    }
    vertices
}

/// Everything drawn in one frame.
pub struct FrameScene<'a> {
    pub camera: &'a CameraState,
    pub clouds: &'a [(PointCloud, Transform)],
    pub enemies: &'a [Transform],
    /// Draw the preview image instead of the 3D scene.
    pub show_preview: bool,
}

struct PreviewTexture {
    key: String,
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// GPU state created after the window is available.
pub struct Renderer {
    pub window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    model_layout: wgpu::BindGroupLayout,
    point_pipeline: wgpu::RenderPipeline,
    enemy_pipeline: wgpu::RenderPipeline,
    cube_buffer: wgpu::Buffer,
    cube_vertex_count: u32,
    enemy_instances: wgpu::Buffer,
    enemy_capacity: usize,
    preview_pipeline: wgpu::RenderPipeline,
    preview_layout: wgpu::BindGroupLayout,
    preview_sampler: wgpu::Sampler,
    preview: Option<PreviewTexture>,
    pub clouds: PointCloudCache,
    camera_config: CameraConfig,
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

struct PipelineDesc<'a> {
    label: &'a str,
    wgsl: &'a str,
    layouts: &'a [&'a wgpu::BindGroupLayout],
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    depth: bool,
}

fn create_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    desc: PipelineDesc<'_>,
) -> wgpu::RenderPipeline {
    let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(desc.label),
        source: wgpu::ShaderSource::Wgsl(desc.wgsl.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(desc.label),
        bind_group_layouts: desc.layouts,
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader_module,
            entry_point: Some("vs_main"),
            buffers: desc.buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader_module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: desc.depth.then(|| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Initialize the wgpu device, surface, and pipelines.
pub async fn init_gpu(
    window: Arc<Window>,
    camera_config: CameraConfig,
    enemy_half_extent: f32,
) -> Result<Renderer, RendererError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let surface = instance
        .create_surface(Arc::clone(&window))
        .map_err(|e| RendererError::Surface(e.to_string()))?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .ok_or(RendererError::NoAdapter)?;

    let adapter_info = adapter.get_info();
    tracing::info!(
        "GPU adapter: {} ({:?})",
        adapter_info.name,
        adapter_info.backend
    );

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("CloudStrike Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        )
        .await
        .map_err(|e| RendererError::Device(e.to_string()))?;

    let surface_caps = surface.get_capabilities(&adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .copied()
        .or_else(|| surface_caps.formats.first().copied())
        .ok_or_else(|| RendererError::Surface("surface reports no formats".into()))?;
    let alpha_mode = surface_caps
        .alpha_modes
        .first()
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

    tracing::info!("Surface format: {:?}", surface_format);

    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: VIEWPORT_WIDTH,
        height: VIEWPORT_HEIGHT,
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    let depth_view = create_depth_view(&device, config.width, config.height);

    let camera_layout = uniform_layout(&device, "Camera Bind Group Layout");
    let camera_uniform =
        CameraUniform::new(&CameraState::default(), &camera_config, config.width, config.height);
    let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Camera Uniform Buffer"),
        contents: bytemuck::cast_slice(&[camera_uniform]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Camera Bind Group"),
        layout: &camera_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: camera_buffer.as_entire_binding(),
        }],
    });

    let model_layout = uniform_layout(&device, "Point Model Bind Group Layout");

    let point_pipeline = create_pipeline(
        &device,
        surface_format,
        PipelineDesc {
            label: "Point Cloud Pipeline",
            wgsl: include_str!("../shaders/points.wgsl"),
            layouts: &[&camera_layout, &model_layout],
            buffers: &[PointInstance::desc()],
            depth: true,
        },
    );

    let enemy_pipeline = create_pipeline(
        &device,
        surface_format,
        PipelineDesc {
            label: "Enemy Pipeline",
            wgsl: include_str!("../shaders/enemies.wgsl"),
            layouts: &[&camera_layout],
            buffers: &[EnemyVertex::desc(), EnemyInstance::desc()],
            depth: true,
        },
    );

    let cube = cube_vertices(enemy_half_extent);
    let cube_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Enemy Cube Vertices"),
        contents: bytemuck::cast_slice(&cube),
        usage: wgpu::BufferUsages::VERTEX,
    });

    let enemy_capacity = 64;
    let enemy_instances = create_enemy_instance_buffer(&device, enemy_capacity);

    let preview_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Preview Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let preview_pipeline = create_pipeline(
        &device,
        surface_format,
        PipelineDesc {
            label: "Preview Pipeline",
            wgsl: include_str!("../shaders/preview.wgsl"),
            layouts: &[&preview_layout],
            buffers: &[],
            depth: false,
        },
    );

    let preview_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Preview Sampler"),
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });

    Ok(Renderer {
        window,
        surface,
        device,
        queue,
        config,
        depth_view,
        camera_buffer,
        camera_bind_group,
        model_layout,
        point_pipeline,
        enemy_pipeline,
        cube_buffer,
        cube_vertex_count: cube.len() as u32,
        enemy_instances,
        enemy_capacity,
        preview_pipeline,
        preview_layout,
        preview_sampler,
        preview: None,
        clouds: PointCloudCache::new(),
        camera_config,
    })
}

fn create_enemy_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Enemy Instances"),
        size: (capacity * std::mem::size_of::<EnemyInstance>()) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl Renderer {
    /// Resource backend for scene uploads and releases.
    pub fn uploader(&mut self) -> GpuUploader<'_> {
        GpuUploader {
            device: &self.device,
            model_layout: &self.model_layout,
            cache: &mut self.clouds,
        }
    }

    /// Show `image` as the browse-mode preview. Setting the same `key` again
    /// is a no-op.
    pub fn set_preview(&mut self, key: &str, image: &PreviewImage) {
        if self.preview.as_ref().is_some_and(|p| p.key == key) {
            return;
        }
        if let Some(old) = self.preview.take() {
            old.texture.destroy();
        }
        let size = wgpu::Extent3d {
            width: image.width.max(1),
            height: image.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Preview Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.width),
                rows_per_image: Some(size.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Preview Bind Group"),
            layout: &self.preview_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.preview_sampler),
                },
            ],
        });
        self.preview = Some(PreviewTexture {
            key: key.to_string(),
            texture,
            bind_group,
        });
    }

    pub fn clear_preview(&mut self) {
        if let Some(old) = self.preview.take() {
            old.texture.destroy();
        }
    }

    fn write_enemies(&mut self, enemies: &[Transform]) {
        if enemies.len() > self.enemy_capacity {
            self.enemy_instances.destroy();
            self.enemy_capacity = enemies.len().next_power_of_two();
            self.enemy_instances = create_enemy_instance_buffer(&self.device, self.enemy_capacity);
        }
        let instances: Vec<EnemyInstance> = enemies
            .iter()
            .map(|t| EnemyInstance {
                model: t.matrix().to_cols_array_2d(),
            })
            .collect();
        if !instances.is_empty() {
            self.queue
                .write_buffer(&self.enemy_instances, 0, bytemuck::cast_slice(&instances));
        }
    }

    /// Render one frame.
    pub fn render(&mut self, scene: &FrameScene<'_>) {
        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return;
            }
            Err(e) => {
                tracing::error!("Surface error: {:?}", e);
                return;
            }
        };

        let uniform =
            CameraUniform::new(scene.camera, &self.camera_config, self.config.width, self.config.height);
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[uniform]));
        self.write_enemies(scene.enemies);

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let preview = self.preview.as_ref().filter(|_| scene.show_preview);
        {
            let depth_stencil_attachment = preview.is_none().then(|| {
                wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            });
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Main Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(preview) = preview {
                render_pass.set_pipeline(&self.preview_pipeline);
                render_pass.set_bind_group(0, &preview.bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            } else if !scene.show_preview {
                render_pass.set_pipeline(&self.point_pipeline);
                render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
                for (cloud, _) in scene.clouds {
                    if let Some(gpu) = self.clouds.get(cloud.handle) {
                        render_pass.set_bind_group(1, &gpu.bind_group, &[]);
                        render_pass.set_vertex_buffer(0, gpu.instance_buffer.slice(..));
                        render_pass.draw(0..6, 0..gpu.point_count);
                    }
                }

                if !scene.enemies.is_empty() {
                    render_pass.set_pipeline(&self.enemy_pipeline);
                    render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
                    render_pass.set_vertex_buffer(0, self.cube_buffer.slice(..));
                    render_pass.set_vertex_buffer(1, self.enemy_instances.slice(..));
                    render_pass.draw(0..self.cube_vertex_count, 0..scene.enemies.len() as u32);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }

    /// Destroy every GPU buffer still owned by the renderer.
    pub fn release_all(&mut self) {
        let freed = self.clouds.release_all();
        self.clear_preview();
        self.enemy_instances.destroy();
        self.cube_buffer.destroy();
        tracing::info!("Renderer released {} point clouds", freed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_cube_has_36_vertices_on_surface() {
        let cube = cube_vertices(0.05);
        assert_eq!(cube.len(), 36);
        for v in &cube {
            let max = v.position.iter().fold(0.0f32, |m, c| m.max(c.abs()));
            assert!((max - 0.05).abs() < 1e-6);
        }
    }

    #[test]
    fn test_camera_uniform_projects_forward_point_to_center() {
        let camera = CameraState::default();
        let uniform = CameraUniform::new(&camera, &CameraConfig::default(), VIEWPORT_WIDTH, VIEWPORT_HEIGHT);
        let vp = Mat4::from_cols_array_2d(&uniform.view_projection);
        let clip = vp * Vec3::new(0.0, 0.0, -2.0).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-6);
        assert!(ndc.y.abs() < 1e-6);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_uniform_sizes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 192);
        assert_eq!(std::mem::size_of::<EnemyInstance>(), 64);
        assert_eq!(std::mem::size_of::<EnemyVertex>(), 16);
    }
}
