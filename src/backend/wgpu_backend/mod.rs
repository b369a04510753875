//! wgpu backend implementation
//!
//! Runs the capture passes on the GPU. wgpu has no framebuffer objects, so
//! the framebuffer and renderbuffer calls are recorded in
//! [`FramebufferState`] and resolved into render pass attachments when a
//! capture draw is issued. The backend can own a window surface for the
//! viewer or run headless for offline baking.

mod shaders;

use std::collections::HashMap;
use std::sync::{mpsc, Arc};

use bytemuck::{Pod, Zeroable};
use half::f16;
use wgpu::util::DeviceExt;

use crate::backend::framebuffer::{ColorAttachmentState, FramebufferState};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::capture::quadrature_steps;
use crate::resources::Mesh;

pub use shaders::{EQUIRECT_TO_CUBEMAP_SHADER, IRRADIANCE_CONVOLUTION_SHADER};

/// Uniform block shared by both capture programs
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CaptureUniforms {
    view_proj: [[f32; 4]; 4],
    sample_delta: f32,
    phi_steps: u32,
    theta_steps: u32,
    _padding: u32,
}

struct SurfaceState {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    current_texture: Option<wgpu::SurfaceTexture>,
}

struct GpuTexture {
    texture: wgpu::Texture,
    desc: TextureDescriptor,
    /// Sampling view: 2D or cube
    view: wgpu::TextureView,
    /// Single-layer 2D views used as colour attachments
    layer_views: Vec<wgpu::TextureView>,
    sampler: wgpu::Sampler,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

/// Depth renderbuffer; storage is created lazily once it has a non-zero size
struct GpuRenderbuffer {
    width: u32,
    height: u32,
    storage: Option<(wgpu::Texture, wgpu::TextureView)>,
}

struct CapturePipelines {
    equirect_layout: wgpu::BindGroupLayout,
    equirect_pipeline: wgpu::RenderPipeline,
    irradiance_layout: wgpu::BindGroupLayout,
    irradiance_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
}

/// Swapchain image acquired for one viewer frame
pub struct FrameContext {
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    /// `None` when running headless
    surface: Option<SurfaceState>,
    headless_size: (u32, u32),

    // Resource storage
    textures: HashMap<u64, GpuTexture>,
    meshes: HashMap<u64, GpuMesh>,
    framebuffers: HashMap<u64, FramebufferState>,
    renderbuffers: HashMap<u64, GpuRenderbuffer>,
    capture_pipelines: Option<CapturePipelines>,

    bound_framebuffer: Option<FramebufferHandle>,
    viewport: Viewport,

    // Handle counters
    next_texture_id: u64,
    next_mesh_id: u64,
    next_framebuffer_id: u64,
    next_renderbuffer_id: u64,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::Depth24Plus => wgpu::TextureFormat::Depth24Plus,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
        }
    }

    /// Encode RGBA `f32` texels in the storage layout of `format`
    fn encode_texels(format: TextureFormat, texels: &[f32]) -> BackendResult<Vec<u8>> {
        match format {
            TextureFormat::Rgba16Float => {
                let halves: Vec<f16> = texels.iter().map(|&t| f16::from_f32(t)).collect();
                Ok(bytemuck::cast_slice(&halves).to_vec())
            }
            TextureFormat::Rgba32Float => Ok(bytemuck::cast_slice(texels).to_vec()),
            other => Err(BackendError::InvalidUpload(format!(
                "float texels cannot be written to {:?}",
                other
            ))),
        }
    }

    /// Decode one tightly packed row of `format` texels
    fn decode_row(format: TextureFormat, row: &[u8], out: &mut Vec<f32>) {
        match format {
            TextureFormat::Rgba16Float => out.extend(
                row.chunks_exact(2)
                    .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32()),
            ),
            _ => out.extend(
                row.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ),
        }
    }

    fn clamp_to_limits(&self, width: u32, height: u32) -> (u32, u32) {
        // Clamp to device limits while maintaining aspect ratio
        let max_size = self.device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            let new_width = ((width as f32 * scale) as u32).max(1);
            let new_height = ((height as f32 * scale) as u32).max(1);
            (new_width, new_height)
        } else {
            (width.max(1), height.max(1))
        }
    }
}

impl WgpuBackend {
    /// Create a backend presenting to `window`
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    /// Create a backend with no surface, for offline baking and tests.
    ///
    /// `width` x `height` stands in for the window size whenever the
    /// default framebuffer viewport is restored.
    pub fn new_headless(width: u32, height: u32) -> BackendResult<Self> {
        pollster::block_on(async {
            let instance = Self::create_instance();
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok_or_else(|| {
                    BackendError::InitializationFailed("No suitable adapter found".into())
                })?;
            let (device, queue) = Self::request_device(&adapter).await?;
            Ok(Self::from_parts(instance, adapter, device, queue, None, (width, height)))
        })
    }

    /// Async initialization, wrapped by `new`
    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let (instance, surface, adapter, device, queue) = Self::init_native(window.clone()).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("Surface reports no formats".into())
            })?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let mut backend = Self::from_parts(
            instance,
            adapter,
            device,
            queue,
            None,
            (size.width, size.height),
        );
        let (width, height) = backend.clamp_to_limits(size.width, size.height);

        // Copies out of the swapchain back the overlay's pixel readout
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if surface_caps.usages.contains(wgpu::TextureUsages::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        } else {
            log::warn!("Surface does not support COPY_SRC, pixel readout disabled");
        }

        let config = wgpu::SurfaceConfiguration {
            usage,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&backend.device, &config);

        backend.viewport = Viewport::new(width, height);
        backend.surface = Some(SurfaceState {
            surface,
            config,
            current_texture: None,
        });
        Ok(backend)
    }

    fn create_instance() -> wgpu::Instance {
        // On Windows, try Vulkan first to avoid D3D12 debug layer validation errors
        let backends = if std::env::var("WGPU_BACKEND").is_ok() {
            wgpu::Backends::all()
        } else {
            #[cfg(target_os = "windows")]
            {
                wgpu::Backends::VULKAN
            }
            #[cfg(not(target_os = "windows"))]
            {
                wgpu::Backends::all()
            }
        };

        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        })
    }

    async fn request_device(adapter: &wgpu::Adapter) -> BackendResult<(wgpu::Device, wgpu::Queue)> {
        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Capture Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))
    }

    /// Native initialization
    async fn init_native(
        window: Arc<winit::window::Window>,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        let instance = Self::create_instance();
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await;

        // If no adapter found with preferred backend, try with all backends
        let (instance, surface, adapter) = match adapter {
            Some(adapter) => (instance, surface, adapter),
            None => {
                log::warn!("Preferred backend not available, falling back to all backends");
                let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                    backends: wgpu::Backends::all(),
                    ..Default::default()
                });
                let surface = instance
                    .create_surface(window.clone())
                    .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;
                let adapter = instance
                    .request_adapter(&wgpu::RequestAdapterOptions {
                        power_preference: wgpu::PowerPreference::HighPerformance,
                        compatible_surface: Some(&surface),
                        force_fallback_adapter: false,
                    })
                    .await
                    .ok_or_else(|| {
                        BackendError::InitializationFailed("No suitable adapter found".into())
                    })?;
                (instance, surface, adapter)
            }
        };

        let (device, queue) = Self::request_device(&adapter).await?;
        Ok((instance, surface, adapter, device, queue))
    }

    fn from_parts(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: Option<SurfaceState>,
        headless_size: (u32, u32),
    ) -> Self {
        Self {
            instance,
            adapter,
            device,
            queue,
            surface,
            headless_size,
            textures: HashMap::new(),
            meshes: HashMap::new(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            capture_pipelines: None,
            bound_framebuffer: None,
            viewport: Viewport::new(headless_size.0, headless_size.1),
            next_texture_id: 1,
            next_mesh_id: 1,
            next_framebuffer_id: 1,
            next_renderbuffer_id: 1,
            encoder: None,
        }
    }

    /// Adapter description for logs and the overlay
    pub fn adapter_name(&self) -> String {
        let info = self.adapter.get_info();
        format!("{} ({:?})", info.name, info.backend)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let (width, height) = self.clamp_to_limits(width, height);
        match self.surface.as_mut() {
            Some(state) => {
                state.config.width = width;
                state.config.height = height;
                state.surface.configure(&self.device, &state.config);
            }
            None => self.headless_size = (width, height),
        }
        if self.bound_framebuffer.is_none() {
            self.viewport = Viewport::new(width, height);
        }
    }

    /// Acquire the next swapchain image and open a frame encoder
    pub fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let state = self.surface.as_mut().ok_or_else(|| {
            BackendError::AcquireImageFailed("headless backend has no surface".into())
        })?;

        let output = state.surface.get_current_texture().map_err(|e| match e {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => BackendError::SurfaceLost,
            wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
            _ => BackendError::AcquireImageFailed(e.to_string()),
        })?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let (width, height) = (state.config.width, state.config.height);
        state.current_texture = Some(output);

        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );

        Ok(FrameContext {
            view,
            width,
            height,
        })
    }

    /// Submit the frame encoder and present
    pub fn end_frame(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        if let Some(texture) = self.surface.as_mut().and_then(|s| s.current_texture.take()) {
            texture.present();
        }
    }

    /// RGBA of one swapchain texel as stored, after everything recorded so far.
    ///
    /// Submits the frame encoder, copies the texel out and opens a fresh
    /// encoder for the rest of the frame. Blocks until the copy lands.
    /// Returns `None` outside a frame, for a position off the surface, or when
    /// the surface cannot be copied from or has an unknown format.
    pub fn read_surface_pixel(&mut self, x: u32, y: u32) -> BackendResult<Option<[f32; 4]>> {
        let Some(state) = self.surface.as_ref() else {
            return Ok(None);
        };
        let Some(output) = state.current_texture.as_ref() else {
            return Ok(None);
        };
        let format = state.config.format;
        if !state.config.usage.contains(wgpu::TextureUsages::COPY_SRC)
            || x >= state.config.width
            || y >= state.config.height
        {
            return Ok(None);
        }
        let Some(bytes_per_texel) = format.block_copy_size(None) else {
            return Ok(None);
        };

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pixel Readback Staging"),
            size: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &output.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let pixel = {
            let data = slice.get_mapped_range();
            decode_surface_texel(format, &data[..bytes_per_texel as usize])
        };
        staging.unmap();
        Ok(pixel)
    }

    /// Surface format, `None` when headless
    pub fn surface_format(&self) -> Option<wgpu::TextureFormat> {
        self.surface.as_ref().map(|s| s.config.format)
    }

    /// Sampling view of a texture, for binding baked cubemaps in the viewer
    pub fn texture_view(&self, texture: TextureHandle) -> Option<&wgpu::TextureView> {
        self.textures.get(&texture.0).map(|t| &t.view)
    }

    /// Sampler created from the texture's descriptor
    pub fn sampler(&self, texture: TextureHandle) -> Option<&wgpu::Sampler> {
        self.textures.get(&texture.0).map(|t| &t.sampler)
    }

    fn texture(&self, handle: TextureHandle) -> BackendResult<&GpuTexture> {
        self.textures.get(&handle.0).ok_or(BackendError::UnknownHandle {
            kind: "texture",
            id: handle.0,
        })
    }

    fn framebuffer_state(&self, handle: FramebufferHandle) -> BackendResult<&FramebufferState> {
        self.framebuffers.get(&handle.0).ok_or(BackendError::UnknownHandle {
            kind: "framebuffer",
            id: handle.0,
        })
    }

    fn depth_size(&self, state: &FramebufferState) -> Option<(u32, u32)> {
        state
            .depth
            .and_then(|rb| self.renderbuffers.get(&rb.0))
            .map(|rb| (rb.width, rb.height))
    }

    fn create_depth_storage(&self, width: u32, height: u32) -> Option<(wgpu::Texture, wgpu::TextureView)> {
        if width == 0 || height == 0 {
            return None;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Capture Depth"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth24Plus,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Some((texture, view))
    }

    fn ensure_capture_pipelines(&mut self) {
        if self.capture_pipelines.is_some() {
            return;
        }

        let equirect_layout = self.create_capture_layout(
            "Equirect Capture Layout",
            wgpu::TextureViewDimension::D2,
        );
        let irradiance_layout = self.create_capture_layout(
            "Irradiance Capture Layout",
            wgpu::TextureViewDimension::Cube,
        );
        let equirect_pipeline = self.create_capture_pipeline(
            "Equirect To Cubemap",
            EQUIRECT_TO_CUBEMAP_SHADER,
            &equirect_layout,
        );
        let irradiance_pipeline = self.create_capture_pipeline(
            "Irradiance Convolution",
            IRRADIANCE_CONVOLUTION_SHADER,
            &irradiance_layout,
        );
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Uniforms"),
            size: std::mem::size_of::<CaptureUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::debug!("Created capture pipelines");
        self.capture_pipelines = Some(CapturePipelines {
            equirect_layout,
            equirect_pipeline,
            irradiance_layout,
            irradiance_pipeline,
            uniform_buffer,
        });
    }

    fn create_capture_layout(
        &self,
        label: &str,
        view_dimension: wgpu::TextureViewDimension,
    ) -> wgpu::BindGroupLayout {
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            })
    }

    fn create_capture_pipeline(
        &self,
        label: &str,
        source: &str,
        layout: &wgpu::BindGroupLayout,
    ) -> wgpu::RenderPipeline {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            });

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
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
                        format: wgpu::TextureFormat::Rgba16Float,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    // The camera sits inside the proxy cube
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: wgpu::TextureFormat::Depth24Plus,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
    }
}

impl CaptureBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn surface_size(&self) -> (u32, u32) {
        match &self.surface {
            Some(state) => (state.config.width, state.config.height),
            None => self.headless_size,
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "zero-sized texture {:?}",
                desc.label
            )));
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(BackendError::TextureCreationFailed(format!(
                "cube faces must be square, got {}x{}",
                desc.width, desc.height
            )));
        }
        let max_size = self.device.limits().max_texture_dimension_2d;
        if desc.width > max_size || desc.height > max_size {
            return Err(BackendError::TextureCreationFailed(format!(
                "{}x{} exceeds the device limit of {}",
                desc.width, desc.height, max_size
            )));
        }

        let format = Self::convert_texture_format(desc.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers(),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: desc.label.as_deref(),
            dimension: Some(match desc.dimension {
                TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
            }),
            array_layer_count: Some(desc.layers()),
            ..Default::default()
        });

        let layer_views = if desc.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            (0..desc.layers())
                .map(|layer| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some("Capture Face"),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: Self::convert_address_mode(desc.sampler.address_mode_u),
            address_mode_v: Self::convert_address_mode(desc.sampler.address_mode_v),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: Self::convert_filter_mode(desc.sampler.mag_filter),
            min_filter: Self::convert_filter_mode(desc.sampler.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                desc: desc.clone(),
                view,
                layer_views,
                sampler,
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        layer: u32,
        texels: &[f32],
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        let tex = self.texture(texture)?;

        if (width, height) != (tex.desc.width, tex.desc.height) {
            return Err(BackendError::InvalidUpload(format!(
                "{}x{} upload into {}x{} texture",
                width, height, tex.desc.width, tex.desc.height
            )));
        }
        if texels.len() != (width * height * 4) as usize {
            return Err(BackendError::InvalidUpload(format!(
                "{} texels for a {}x{} RGBA layer",
                texels.len(),
                width,
                height
            )));
        }
        if layer >= tex.desc.layers() {
            return Err(BackendError::InvalidUpload(format!("layer {} out of range", layer)));
        }

        let bytes = Self::encode_texels(tex.desc.format, texels)?;
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * tex.desc.format.bytes_per_pixel()),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_texture_layer(&mut self, texture: TextureHandle, layer: u32) -> BackendResult<Vec<f32>> {
        let tex = self.texture(texture)?;
        let format = tex.desc.format;
        if !format.is_float_color() {
            return Err(BackendError::ReadbackFailed(format!(
                "cannot read back {:?} texels",
                format
            )));
        }
        if layer >= tex.desc.layers() {
            return Err(BackendError::ReadbackFailed(format!("layer {} out of range", layer)));
        }
        if !tex.desc.usage.contains(TextureUsage::COPY_SRC) {
            return Err(BackendError::ReadbackFailed(
                "texture was not created with COPY_SRC".into(),
            ));
        }

        let (width, height) = (tex.desc.width, tex.desc.height);
        let unpadded_bytes_per_row = width * format.bytes_per_pixel();
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let mut texels = Vec::with_capacity((width * height * 4) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(padded_bytes_per_row as usize) {
                Self::decode_row(format, &row[..unpadded_bytes_per_row as usize], &mut texels);
            }
        }
        staging.unmap();
        Ok(texels)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(tex) = self.textures.remove(&texture.0) {
            tex.texture.destroy();
        }
        for fb in self.framebuffers.values_mut() {
            fb.forget_texture(texture);
        }
    }

    fn upload_mesh(&mut self, mesh: &Mesh) -> BackendResult<MeshHandle> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Err(BackendError::InvalidUpload(format!("mesh '{}' is empty", mesh.name)));
        }
        if mesh.indices.iter().any(|&i| i as usize >= mesh.vertex_count()) {
            return Err(BackendError::InvalidUpload(format!(
                "mesh '{}' indexes past its vertices",
                mesh.name
            )));
        }

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&mesh.name),
                contents: mesh.vertex_bytes(),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&mesh.name),
                contents: mesh.index_bytes(),
                usage: wgpu::BufferUsages::INDEX,
            });

        let id = self.next_mesh_id;
        self.next_mesh_id += 1;
        self.meshes.insert(
            id,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: mesh.index_count() as u32,
            },
        );
        Ok(MeshHandle(id))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        if let Some(mesh) = self.meshes.remove(&mesh.0) {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
        }
    }

    fn create_framebuffer(&mut self, label: &str) -> BackendResult<FramebufferHandle> {
        let id = self.next_framebuffer_id;
        self.next_framebuffer_id += 1;
        self.framebuffers.insert(id, FramebufferState::new(label));
        Ok(FramebufferHandle(id))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn create_renderbuffer(&mut self, width: u32, height: u32) -> BackendResult<RenderbufferHandle> {
        let storage = self.create_depth_storage(width, height);
        let id = self.next_renderbuffer_id;
        self.next_renderbuffer_id += 1;
        self.renderbuffers.insert(
            id,
            GpuRenderbuffer {
                width,
                height,
                storage,
            },
        );
        Ok(RenderbufferHandle(id))
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        if !self.renderbuffers.contains_key(&renderbuffer.0) {
            return Err(BackendError::UnknownHandle {
                kind: "renderbuffer",
                id: renderbuffer.0,
            });
        }
        let storage = self.create_depth_storage(width, height);
        if let Some(rb) = self.renderbuffers.get_mut(&renderbuffer.0) {
            if let Some((old, _)) = rb.storage.take() {
                old.destroy();
            }
            rb.width = width;
            rb.height = height;
            rb.storage = storage;
        }
        Ok(())
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if let Some(rb) = self.renderbuffers.remove(&renderbuffer.0) {
            if let Some((texture, _)) = rb.storage {
                texture.destroy();
            }
        }
    }

    fn attach_depth(
        &mut self,
        framebuffer: FramebufferHandle,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()> {
        if !self.renderbuffers.contains_key(&renderbuffer.0) {
            return Err(BackendError::UnknownHandle {
                kind: "renderbuffer",
                id: renderbuffer.0,
            });
        }
        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(BackendError::UnknownHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        fb.depth = Some(renderbuffer);
        Ok(())
    }

    fn attach_color(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: TextureHandle,
        layer: u32,
    ) -> BackendResult<()> {
        let desc = self.texture(texture)?.desc.clone();
        if layer >= desc.layers() {
            return Err(BackendError::Validation(format!(
                "layer {} of a {}-layer texture",
                layer,
                desc.layers()
            )));
        }

        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(BackendError::UnknownHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        fb.color = Some(ColorAttachmentState {
            texture,
            layer,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        Ok(())
    }

    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> BackendResult<FramebufferStatus> {
        let state = self.framebuffer_state(framebuffer)?;
        let status = state.status(self.depth_size(state));
        // Only the half-float format is renderable by the capture pipelines
        if status.is_complete()
            && state.color.map(|c| c.format) != Some(TextureFormat::Rgba16Float)
        {
            return Ok(FramebufferStatus::Unsupported);
        }
        Ok(status)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.bound_framebuffer = framebuffer;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn draw_capture(&mut self, draw: &CaptureDraw) -> BackendResult<()> {
        let framebuffer = self.bound_framebuffer.ok_or_else(|| {
            BackendError::Validation("capture draw with the default framebuffer bound".to_string())
        })?;
        let status = self.framebuffer_status(framebuffer)?;
        let state = self.framebuffer_state(framebuffer)?;
        let color = match state.color {
            Some(color) if status.is_complete() => color,
            _ => {
                return Err(BackendError::Validation(format!(
                    "draw into framebuffer '{}' with status {}",
                    state.label, status
                )))
            }
        };
        let depth_rb = state.depth;

        if !self.meshes.contains_key(&draw.mesh.0) {
            return Err(BackendError::UnknownHandle {
                kind: "mesh",
                id: draw.mesh.0,
            });
        }
        if draw.source == color.texture {
            return Err(BackendError::Validation(
                "capture source is also the colour attachment".to_string(),
            ));
        }
        let source_dimension = self.texture(draw.source)?.desc.dimension;
        match (draw.program, source_dimension) {
            (CaptureProgram::EquirectangularToCubemap, TextureDimension::D2)
            | (CaptureProgram::IrradianceConvolution { .. }, TextureDimension::Cube) => {}
            (program, dimension) => {
                return Err(BackendError::Validation(format!(
                    "{} cannot sample a {:?} texture",
                    program.name(),
                    dimension
                )))
            }
        }

        self.ensure_capture_pipelines();

        // Without a depth renderbuffer the pass still needs a depth view matching the pipeline
        let scratch_depth = match depth_rb {
            Some(_) => None,
            None => self.create_depth_storage(color.width, color.height),
        };

        let Some(pipelines) = self.capture_pipelines.as_ref() else {
            return Err(BackendError::Validation("capture pipelines unavailable".into()));
        };
        let source = self.texture(draw.source)?;
        let target = self.texture(color.texture)?;
        let target_view = target.layer_views.get(color.layer as usize).ok_or_else(|| {
            BackendError::Validation("colour attachment is not render-attachable".into())
        })?;
        let depth_view = match depth_rb {
            Some(rb) => self
                .renderbuffers
                .get(&rb.0)
                .and_then(|rb| rb.storage.as_ref())
                .map(|(_, view)| view),
            None => scratch_depth.as_ref().map(|(_, view)| view),
        }
        .ok_or_else(|| BackendError::Validation("depth attachment has no storage".into()))?;
        let mesh = self.meshes.get(&draw.mesh.0).ok_or(BackendError::UnknownHandle {
            kind: "mesh",
            id: draw.mesh.0,
        })?;

        let (sample_delta, (phi_steps, theta_steps)) = match draw.program {
            CaptureProgram::IrradianceConvolution { sample_delta } => {
                (sample_delta, quadrature_steps(sample_delta))
            }
            CaptureProgram::EquirectangularToCubemap => (0.0, (0, 0)),
        };
        let uniforms = CaptureUniforms {
            view_proj: (draw.projection * draw.view * draw.model).to_cols_array_2d(),
            sample_delta,
            phi_steps,
            theta_steps,
            _padding: 0,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        self.queue
            .write_buffer(&pipelines.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let (layout, pipeline) = match draw.program {
            CaptureProgram::EquirectangularToCubemap => {
                (&pipelines.equirect_layout, &pipelines.equirect_pipeline)
            }
            CaptureProgram::IrradianceConvolution { .. } => {
                (&pipelines.irradiance_layout, &pipelines.irradiance_pipeline)
            }
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(draw.program.name()),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: pipelines.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&source.sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Encoder"),
            });
        {
            let [r, g, b, a] = draw.clear_color;
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(draw.program.name()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(vp) = self.viewport.clamped_to(color.width, color.height) {
                render_pass.set_viewport(
                    vp.x as f32,
                    vp.y as f32,
                    vp.width as f32,
                    vp.height as f32,
                    0.0,
                    1.0,
                );
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &bind_group, &[]);
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::Validation(error.to_string()));
        }
        if let Some((texture, _)) = scratch_depth {
            texture.destroy();
        }

        log::trace!(
            "wgpu {} draw into texture {} layer {}",
            draw.program.name(),
            color.texture.0,
            color.layer
        );
        Ok(())
    }
}

// Additional methods for egui integration and external rendering
impl WgpuBackend {
    /// Get reference to the wgpu device (for egui-wgpu Renderer creation)
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get device, queue, and encoder together for operations that need all three.
    /// This avoids borrow checker issues when calling external libraries like egui.
    pub fn device_queue_encoder(
        &mut self,
    ) -> (&wgpu::Device, &wgpu::Queue, Option<&mut wgpu::CommandEncoder>) {
        (&self.device, &self.queue, self.encoder.as_mut())
    }

    /// Render egui on top of the current swapchain image
    pub fn render_egui(
        &mut self,
        renderer: &egui_wgpu::Renderer,
        paint_jobs: &[egui::ClippedPrimitive],
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
        view: &wgpu::TextureView,
    ) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("egui Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load, // Preserve existing content
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        renderer.render(&mut render_pass, paint_jobs, screen_descriptor);
    }
}

/// Decode one swapchain texel to RGBA in `[0, 1]` for unorm formats.
///
/// sRGB formats report their encoded values, which is what reaches the screen.
fn decode_surface_texel(format: wgpu::TextureFormat, bytes: &[u8]) -> Option<[f32; 4]> {
    use wgpu::TextureFormat as F;

    let unorm8 = |b: u8| b as f32 / 255.0;
    match (format, bytes) {
        (F::Rgba8Unorm | F::Rgba8UnormSrgb, [r, g, b, a, ..]) => {
            Some([unorm8(*r), unorm8(*g), unorm8(*b), unorm8(*a)])
        }
        (F::Bgra8Unorm | F::Bgra8UnormSrgb, [b, g, r, a, ..]) => {
            Some([unorm8(*r), unorm8(*g), unorm8(*b), unorm8(*a)])
        }
        (F::Rgb10a2Unorm, [b0, b1, b2, b3, ..]) => {
            let packed = u32::from_le_bytes([*b0, *b1, *b2, *b3]);
            let channel = |shift: u32| ((packed >> shift) & 0x3ff) as f32 / 1023.0;
            Some([channel(0), channel(10), channel(20), (packed >> 30) as f32 / 3.0])
        }
        (F::Rgba16Float, _) if bytes.len() >= 8 => {
            let mut rgba = [0.0; 4];
            for (out, b) in rgba.iter_mut().zip(bytes.chunks_exact(2)) {
                *out = f16::from_le_bytes([b[0], b[1]]).to_f32();
            }
            Some(rgba)
        }
        _ => None,
    }
}
