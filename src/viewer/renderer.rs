//! GPU resources and draw recording for the viewer scene

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use wgpu::util::DeviceExt;

use super::shaders::{PBR_SHADER, SKYBOX_SHADER, UNLIT_SHADER};
use crate::backend::traits::{BackendError, BackendResult, TextureHandle};
use crate::backend::types::Vertex;
use crate::backend::wgpu_backend::WgpuBackend;
use crate::capture::IblMaps;
use crate::resources::{Mesh, Shape};
use crate::scene::{GpuLightData, Scene, Transform};

/// Lights supported by the PBR shader
pub const MAX_LIGHTS: usize = 4;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Lights uniform data sent to GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LightsUniform {
    lights: [GpuLightData; MAX_LIGHTS],
    count: u32,
    _padding: [u32; 3],
}

/// Per-object transform and material
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ObjectUniform {
    model: Mat4,
    normal_matrix: Mat4,
    albedo: Vec4,
    metallic: f32,
    roughness: f32,
    ao: f32,
    _padding: f32,
}

impl ObjectUniform {
    fn new(transform: &Transform, albedo: Vec3, metallic: f32, roughness: f32) -> Self {
        Self {
            model: transform.matrix(),
            normal_matrix: transform.normal_matrix(),
            albedo: albedo.extend(1.0),
            metallic,
            roughness,
            ao: 1.0,
            _padding: 0.0,
        }
    }
}

/// GPU resources for a mesh
struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn new(device: &wgpu::Device, mesh: &Mesh) -> Self {
        Self {
            vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&mesh.name),
                contents: mesh.vertex_bytes(),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&mesh.name),
                contents: mesh.index_bytes(),
                usage: wgpu::BufferUsages::INDEX,
            }),
            index_count: mesh.index_count() as u32,
        }
    }

    fn draw<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// Per-object GPU resources
struct GpuObject {
    #[allow(dead_code)]
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Which cubemap the skybox shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkyboxSource {
    #[default]
    Environment,
    Irradiance,
}

/// Pipelines, buffers and bind groups for the sphere grid and skybox
pub struct SceneRenderer {
    pbr_pipeline: wgpu::RenderPipeline,
    unlit_pipeline: wgpu::RenderPipeline,
    skybox_pipeline: wgpu::RenderPipeline,

    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    irradiance_bind_group: wgpu::BindGroup,
    sky_environment_bind_group: wgpu::BindGroup,
    sky_irradiance_bind_group: wgpu::BindGroup,

    sphere_mesh: GpuMesh,
    cube_mesh: GpuMesh,
    spheres: Vec<GpuObject>,
    light_markers: Vec<GpuObject>,

    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
}

impl SceneRenderer {
    pub fn new(backend: &WgpuBackend, scene: &Scene, maps: &IblMaps) -> BackendResult<Self> {
        let device = backend.device();
        let surface_format = backend.surface_format().ok_or_else(|| {
            BackendError::SurfaceCreationFailed("viewer needs a windowed backend".into())
        })?;
        let (width, height) = crate::backend::CaptureBackend::surface_size(backend);

        let cube_view = |handle: TextureHandle| {
            backend.texture_view(handle).zip(backend.sampler(handle)).ok_or(
                BackendError::UnknownHandle {
                    kind: "texture",
                    id: handle.id(),
                },
            )
        };
        let (environment_view, environment_sampler) = cube_view(maps.environment.texture())?;
        let (irradiance_view, irradiance_sampler) = cube_view(maps.irradiance.texture())?;

        // Group 0: camera (+ lights for PBR)
        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Layout"),
            entries: &[uniform_entry(0), uniform_entry(1)],
        });
        // Group 1: per-object uniform
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Object Layout"),
            entries: &[uniform_entry(0)],
        });
        // Group 2 (PBR) / group 1 (skybox): cubemap and sampler
        let cube_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cubemap Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
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

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Uniform"),
            contents: bytemuck::bytes_of(&scene.camera.uniform_data()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let mut lights = LightsUniform::zeroed();
        for (slot, light) in lights.lights.iter_mut().zip(&scene.lights) {
            *slot = light.to_gpu_data();
        }
        lights.count = scene.lights.len().min(MAX_LIGHTS) as u32;
        if scene.lights.len() > MAX_LIGHTS {
            log::warn!(
                "Scene has {} lights, only the first {} are shaded",
                scene.lights.len(),
                MAX_LIGHTS
            );
        }
        let lights_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lights Uniform"),
            contents: bytemuck::bytes_of(&lights),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights_buffer.as_entire_binding(),
                },
            ],
        });

        let cube_bind_group = |label: &str, view: &wgpu::TextureView, sampler: &wgpu::Sampler| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &cube_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        };
        let irradiance_bind_group = cube_bind_group("Irradiance Bind Group", irradiance_view, irradiance_sampler);
        let sky_environment_bind_group =
            cube_bind_group("Sky Environment Bind Group", environment_view, environment_sampler);
        let sky_irradiance_bind_group =
            cube_bind_group("Sky Irradiance Bind Group", irradiance_view, irradiance_sampler);

        let object = |label: &str, uniform: ObjectUniform| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(&uniform),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &object_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            GpuObject { buffer, bind_group }
        };
        let spheres = scene
            .spheres
            .iter()
            .map(|s| {
                object(
                    "Sphere",
                    ObjectUniform::new(&s.transform, scene.albedo, s.metallic, s.roughness),
                )
            })
            .collect();
        let light_markers = scene
            .lights
            .iter()
            .map(|l| {
                let transform = Transform::from_position(l.position).with_uniform_scale(0.5);
                object("Light Marker", ObjectUniform::new(&transform, l.color, 0.0, 1.0))
            })
            .collect();

        let pbr_pipeline = create_pipeline(
            device,
            "PBR",
            PBR_SHADER,
            &[&camera_layout, &object_layout, &cube_layout],
            surface_format,
            wgpu::CompareFunction::Less,
            true,
        );
        let unlit_pipeline = create_pipeline(
            device,
            "Light Marker",
            UNLIT_SHADER,
            &[&camera_layout, &object_layout],
            surface_format,
            wgpu::CompareFunction::Less,
            true,
        );
        let skybox_pipeline = create_pipeline(
            device,
            "Skybox",
            SKYBOX_SHADER,
            &[&camera_layout, &cube_layout],
            surface_format,
            // Sky fragments sit exactly at depth 1.0, the cleared value
            wgpu::CompareFunction::LessEqual,
            false,
        );

        let (depth_texture, depth_view) = create_depth(device, width, height);

        log::info!(
            "Viewer scene ready: {} spheres, {} lights, {}x{}",
            scene.spheres.len(),
            scene.lights.len(),
            width,
            height
        );

        Ok(Self {
            pbr_pipeline,
            unlit_pipeline,
            skybox_pipeline,
            camera_buffer,
            camera_bind_group,
            irradiance_bind_group,
            sky_environment_bind_group,
            sky_irradiance_bind_group,
            sphere_mesh: GpuMesh::new(device, &Shape::sphere().mesh()),
            cube_mesh: GpuMesh::new(device, &Shape::Cube.mesh()),
            spheres,
            light_markers,
            depth_texture,
            depth_view,
        })
    }

    /// Recreate the depth buffer for a new surface size
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.depth_texture.destroy();
        let (depth_texture, depth_view) = create_depth(device, width, height);
        self.depth_texture = depth_texture;
        self.depth_view = depth_view;
    }

    /// Record the scene into the frame encoder: spheres, light markers, then the sky
    pub fn render(
        &self,
        backend: &mut WgpuBackend,
        view: &wgpu::TextureView,
        scene: &Scene,
        sky: SkyboxSource,
    ) {
        let (_, queue, encoder) = backend.device_queue_encoder();
        let Some(encoder) = encoder else {
            return;
        };
        queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::bytes_of(&scene.camera.uniform_data()),
        );

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Main Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.1,
                        g: 0.1,
                        b: 0.1,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pbr_pipeline);
        render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
        render_pass.set_bind_group(2, &self.irradiance_bind_group, &[]);
        for sphere in &self.spheres {
            render_pass.set_bind_group(1, &sphere.bind_group, &[]);
            self.sphere_mesh.draw(&mut render_pass);
        }

        render_pass.set_pipeline(&self.unlit_pipeline);
        for marker in &self.light_markers {
            render_pass.set_bind_group(1, &marker.bind_group, &[]);
            self.sphere_mesh.draw(&mut render_pass);
        }

        render_pass.set_pipeline(&self.skybox_pipeline);
        let sky_bind_group = match sky {
            SkyboxSource::Environment => &self.sky_environment_bind_group,
            SkyboxSource::Irradiance => &self.sky_irradiance_bind_group,
        };
        render_pass.set_bind_group(1, sky_bind_group, &[]);
        self.cube_mesh.draw(&mut render_pass);
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_depth(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Buffer"),
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
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    format: wgpu::TextureFormat,
    depth_compare: wgpu::CompareFunction,
    depth_write_enabled: bool,
) -> wgpu::RenderPipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: "vs_main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![
                    0 => Float32x3,
                    1 => Float32x3,
                    2 => Float32x2
                ],
            }],
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: "fs_main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            // The skybox is seen from inside
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<LightsUniform>(), 144);
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 160);
    }
}
