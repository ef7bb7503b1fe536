/// Renderer - owns the device, swapchain and frame targets and drives the
/// frame protocol
///
/// One renderer per window, used from a single render thread:
///
/// ```text
/// begin_frame ─► begin_render ─► draw_mesh / draw_model ... ─► end_render ─► end_frame
/// ```
///
/// Frames in flight are limited to one. `begin_frame` blocks on the fence of
/// the previous frame, so host-visible uniform buffers can be rewritten as
/// soon as it returns.
///
/// Swapchain, pipeline and shader rebuilds requested from anywhere (resize,
/// settings change, suboptimal present) are deferred to the start of the
/// next `begin_frame`. The only immediate rebuild is an out-of-date acquire,
/// which also skips the frame.

use std::mem::size_of;
use std::path::Path;
use std::sync::{Arc, Weak};
use slotmap::SlotMap;
use crate::error::{Error, Result};
use crate::graphics_device::{
    AttachmentTexture, AttachmentTextureDesc, BindingResource, Buffer, BufferDesc, BufferKind,
    ClearValue, ColorBlendState, CommandList, DepthStencilState, DescriptorLayout,
    DescriptorSet, DescriptorType, Extent2D, GraphicsDevice, IndexType, Pipeline, PipelineDesc,
    PolygonMode, RasterizationState, Rect2D, SampleCount, SamplerProperties, ShaderDesc,
    ShaderStage, ShaderStageFlags, Swapchain, SwapchainRequest, Texture, TextureDesc,
    TextureFormat, TextureProperties, TextureType, Viewport, AcquireOutcome, CompareOp,
    read_shader_file,
};
use crate::renderer::{
    Color, FrameState, FrameStats, FrameStatus, FrameTargets, GraphicsPipeline, PipelineKey,
    PipelineProperties, RendererSettings, ShaderKey, ShaderModule, ShaderProperties,
    ShaderSource,
};
use crate::resource::{
    CameraUniformData, Index, LightsUniformData, Material, Mesh, Model, Vertex3D,
    model::lock_mesh,
};
use crate::scene::{CameraData, Transform};
use crate::{engine_debug, engine_info, engine_trace, engine_violation, engine_warn};

const SOURCE: &str = "kestrel::Renderer";

pub struct Renderer {
    settings: RendererSettings,
    window_size: Extent2D,
    state: FrameState,
    current_image: u32,
    stats: FrameStats,

    recreate_swapchain: bool,
    recreate_pipelines: bool,
    recreate_shaders: bool,

    camera: Option<CameraData>,
    lights: LightsUniformData,
    camera_buffer: Arc<dyn Buffer>,
    lights_buffer: Arc<dyn Buffer>,
    blank_texture: Arc<dyn Texture>,
    default_layout: Arc<DescriptorLayout>,

    default_pipeline: Option<Arc<GraphicsPipeline>>,
    bound_pipeline: Option<Arc<GraphicsPipeline>>,
    pipelines: SlotMap<PipelineKey, Weak<GraphicsPipeline>>,
    shaders: SlotMap<ShaderKey, Weak<ShaderModule>>,

    command_list: Box<dyn CommandList>,
    frame_targets: Option<FrameTargets>,
    swapchain: Box<dyn Swapchain>,
    cleaned_up: bool,
    // Dropped last
    device: Box<dyn GraphicsDevice>,
}

impl Renderer {
    /// Create the swapchain, frame targets and per-frame buffers for a window
    ///
    /// A requested MSAA count above the device limit is clamped, not rejected.
    pub fn new(
        device: Box<dyn GraphicsDevice>,
        window_size: Extent2D,
        settings: RendererSettings,
    ) -> Result<Self> {
        if window_size.is_empty() {
            return Err(Error::InitializationFailed(format!(
                "window size {}x{} has no area", window_size.width, window_size.height
            )));
        }

        let mut settings = settings;
        settings.msaa_samples = clamp_samples(settings.msaa_samples, device.info().max_samples);

        let swapchain = device.create_swapchain(&SwapchainRequest {
            width: window_size.width,
            height: window_size.height,
            vsync: settings.vsync,
        })?;
        let frame_targets = FrameTargets::new(device.as_ref(), swapchain.as_ref(), settings.msaa_samples)?;
        let command_list = device.create_command_list()?;

        let camera_buffer = device.create_buffer(BufferDesc {
            kind: BufferKind::Uniform,
            size: size_of::<CameraUniformData>() as u64,
            data: None,
        })?;
        let lights_buffer = device.create_buffer(BufferDesc {
            kind: BufferKind::Uniform,
            size: size_of::<LightsUniformData>() as u64,
            data: None,
        })?;
        let blank_texture = device.create_texture(blank_texture_desc())?;
        let default_layout = Arc::new(build_default_layout(device.as_ref())?);

        let extent = swapchain.extent();
        engine_info!(SOURCE,
            "Renderer initialized on '{}': {}x{}, {} image(s), {:?}, {}x MSAA",
            device.info().name, extent.width, extent.height, swapchain.image_count(),
            swapchain.present_mode(), settings.msaa_samples.count());

        Ok(Self {
            settings,
            window_size,
            state: FrameState::Idle,
            current_image: 0,
            stats: FrameStats::default(),
            recreate_swapchain: false,
            recreate_pipelines: false,
            recreate_shaders: false,
            camera: None,
            lights: LightsUniformData::default(),
            camera_buffer,
            lights_buffer,
            blank_texture,
            default_layout,
            default_pipeline: None,
            bound_pipeline: None,
            pipelines: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            command_list,
            frame_targets: Some(frame_targets),
            swapchain,
            cleaned_up: false,
            device,
        })
    }

    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    // ===== BUFFERS =====

    /// Device-local vertex buffer, filled through a staging copy
    pub fn create_vertex_buffer(&self, vertices: &[Vertex3D]) -> Result<Arc<dyn Buffer>> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        self.device.create_buffer(BufferDesc {
            kind: BufferKind::Vertex,
            size: bytes.len() as u64,
            data: Some(bytes.to_vec()),
        })
    }

    /// Device-local index buffer, filled through a staging copy
    pub fn create_index_buffer(&self, indices: &[Index]) -> Result<Arc<dyn Buffer>> {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        self.device.create_buffer(BufferDesc {
            kind: BufferKind::Index,
            size: bytes.len() as u64,
            data: Some(bytes.to_vec()),
        })
    }

    /// Host-visible uniform buffer of `size` bytes
    pub fn create_uniform_buffer(&self, size: u64) -> Result<Arc<dyn Buffer>> {
        self.device.create_buffer(BufferDesc { kind: BufferKind::Uniform, size, data: None })
    }

    pub fn destroy_vertex_buffer(&self, buffer: &dyn Buffer) -> Result<bool> {
        self.destroy_buffer(buffer, BufferKind::Vertex)
    }

    pub fn destroy_index_buffer(&self, buffer: &dyn Buffer) -> Result<bool> {
        self.destroy_buffer(buffer, BufferKind::Index)
    }

    pub fn destroy_uniform_buffer(&self, buffer: &dyn Buffer) -> Result<bool> {
        self.destroy_buffer(buffer, BufferKind::Uniform)
    }

    /// Release a buffer. A second destroy is a logged no-op returning `false`.
    fn destroy_buffer(&self, buffer: &dyn Buffer, expected: BufferKind) -> Result<bool> {
        if buffer.kind() != expected {
            return Err(engine_violation!(SOURCE,
                "destroy_{:?}_buffer called on a {:?} buffer", expected, buffer.kind()));
        }
        self.require_idle("destroy buffer")?;

        if buffer.release() {
            engine_trace!(SOURCE, "Destroyed {:?} buffer ({} bytes)", expected, buffer.size());
            Ok(true)
        } else {
            engine_warn!(SOURCE, "{:?} buffer destroyed twice, ignoring", expected);
            Ok(false)
        }
    }

    // ===== TEXTURES =====

    pub fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        self.device.create_texture(desc)
    }

    /// 1x1 opaque white texture
    pub fn create_blank_texture(&self) -> Result<Arc<dyn Texture>> {
        self.device.create_texture(blank_texture_desc())
    }

    /// Shared blank texture used for missing material maps
    pub fn blank_texture(&self) -> &Arc<dyn Texture> {
        &self.blank_texture
    }

    /// Decode an image file to RGBA8 and upload it
    pub fn create_texture_from_file(
        &self,
        path: impl AsRef<Path>,
        properties: TextureProperties,
        sampler: SamplerProperties,
    ) -> Result<Arc<dyn Texture>> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| {
                engine_warn!(SOURCE, "Failed to load texture '{}': {}", path.display(), e);
                Error::Io(format!("{}: {}", path.display(), e))
            })?
            .to_rgba8();

        let (width, height) = image.dimensions();
        engine_debug!(SOURCE, "Loaded texture '{}' ({}x{})", path.display(), width, height);

        self.device.create_texture(TextureDesc {
            width,
            height,
            format: properties.format,
            texture_type: properties.texture_type,
            generate_mipmaps: properties.generate_mipmaps,
            data: Some(image.into_raw()),
            sampler,
        })
    }

    pub fn destroy_texture(&self, texture: &dyn Texture) -> Result<bool> {
        self.require_idle("destroy texture")?;
        if texture.release() {
            Ok(true)
        } else {
            engine_warn!(SOURCE, "Texture destroyed twice, ignoring");
            Ok(false)
        }
    }

    pub fn create_attachment_texture(
        &self,
        desc: &AttachmentTextureDesc,
    ) -> Result<Arc<dyn AttachmentTexture>> {
        let mut desc = *desc;
        desc.samples = clamp_samples(desc.samples, self.device.info().max_samples);
        self.device.create_attachment_texture(&desc)
    }

    // ===== DESCRIPTORS =====

    /// New baked copy of the default mesh layout
    pub fn create_descriptor_layout(&self) -> Result<DescriptorLayout> {
        build_default_layout(self.device.as_ref())
    }

    /// Layout every mesh descriptor set is written against
    pub fn default_layout(&self) -> &Arc<DescriptorLayout> {
        &self.default_layout
    }

    /// Write one descriptor set for an object
    ///
    /// Uniform bindings take, in layout order, `uniform_buffer`, the camera
    /// block and the lights block. Sampler bindings take the material's
    /// diffuse, normal and specular maps, with the blank texture for any
    /// map the material lacks.
    pub fn create_descriptors(
        &self,
        layout: &DescriptorLayout,
        uniform_buffer: &dyn Buffer,
        material: &Material,
    ) -> Result<Arc<dyn DescriptorSet>> {
        let native = layout.native().ok_or_else(|| {
            engine_violation!(SOURCE, "create_descriptors called with an unbaked layout")
        })?;

        let mut uniforms = [uniform_buffer, self.camera_buffer.as_ref(), self.lights_buffer.as_ref()].into_iter();
        let mut samplers = material.textures().into_iter();

        let mut resources = Vec::with_capacity(layout.binding_count());
        for binding in layout.bindings() {
            let resource = match binding.descriptor_type {
                DescriptorType::UniformBuffer => uniforms.next().map(BindingResource::UniformBuffer),
                DescriptorType::CombinedImageSampler => samplers.next().map(|texture| {
                    BindingResource::Texture(texture.unwrap_or(&self.blank_texture).as_ref())
                }),
            };
            match resource {
                Some(resource) => resources.push(resource),
                None => return Err(engine_violation!(SOURCE,
                    "layout binding {} ({:?}) has no resource to bind",
                    binding.index, binding.descriptor_type)),
            }
        }

        self.device.create_descriptor_set(native.as_ref(), layout.bindings(), &resources)
    }

    // ===== SHADERS =====

    /// Load a SPIR-V file and create a shader module from it
    pub fn create_shader(&mut self, properties: ShaderProperties) -> Result<Arc<ShaderModule>> {
        let code = read_shader_file(&properties.path)?;
        self.register_shader(
            properties.stage,
            properties.entry_point,
            ShaderSource::File(properties.path),
            code,
        )
    }

    pub fn create_shader_from_code(
        &mut self,
        stage: ShaderStage,
        code: Vec<u32>,
        entry_point: &str,
    ) -> Result<Arc<ShaderModule>> {
        self.register_shader(stage, entry_point.to_string(), ShaderSource::Code(code.clone()), code)
    }

    fn register_shader(
        &mut self,
        stage: ShaderStage,
        entry_point: String,
        source: ShaderSource,
        code: Vec<u32>,
    ) -> Result<Arc<ShaderModule>> {
        let native = self.device.create_shader(ShaderDesc { stage, code, entry_point: entry_point.clone() })?;
        let key = self.shaders.insert(Weak::new());
        let module = Arc::new(ShaderModule::new(key, stage, entry_point, source, native));
        self.shaders[key] = Arc::downgrade(&module);
        Ok(module)
    }

    /// Reload a shader from its source now and rebuild pipelines at the next frame
    ///
    /// Pipelines built from the old module keep working until then.
    pub fn recreate_shader(&mut self, shader: &ShaderModule) -> Result<()> {
        self.reload_shader(shader)?;
        self.recreate_pipelines = true;
        Ok(())
    }

    fn reload_shader(&self, shader: &ShaderModule) -> Result<()> {
        let code = match &shader.source {
            ShaderSource::File(path) => read_shader_file(path)?,
            ShaderSource::Code(code) => code.clone(),
        };
        let native = self.device.create_shader(ShaderDesc {
            stage: shader.stage(),
            code,
            entry_point: shader.entry_point().to_string(),
        })?;
        shader.replace_native(Some(native));
        engine_debug!(SOURCE, "Reloaded {:?} shader {:?} (generation {})",
            shader.stage(), shader.path(), shader.generation());
        Ok(())
    }

    /// Release the native module. Returns `false` if it was already destroyed.
    pub fn destroy_shader(&mut self, shader: &ShaderModule) -> bool {
        self.shaders.remove(shader.key());
        shader.replace_native(None)
    }

    /// Reload every live shader at the next `begin_frame`
    pub fn set_recreate_shaders(&mut self, recreate: bool) {
        self.recreate_shaders = recreate;
    }

    // ===== PIPELINES =====

    pub fn create_graphics_pipeline(&mut self, properties: PipelineProperties) -> Result<Arc<GraphicsPipeline>> {
        let native = self.build_native_pipeline(&properties)?;
        let key = self.pipelines.insert(Weak::new());
        let pipeline = Arc::new(GraphicsPipeline::new(key, properties, native));
        self.pipelines[key] = Arc::downgrade(&pipeline);
        Ok(pipeline)
    }

    fn build_native_pipeline(&self, properties: &PipelineProperties) -> Result<Arc<dyn Pipeline>> {
        let layout = properties.layout.native().ok_or_else(|| {
            engine_violation!(SOURCE, "pipeline created with an unbaked descriptor layout")
        })?;
        let vertex_shader = properties.vertex_shader.native().ok_or_else(|| {
            engine_violation!(SOURCE, "pipeline uses a destroyed vertex shader")
        })?;
        let fragment_shader = properties.fragment_shader.native().ok_or_else(|| {
            engine_violation!(SOURCE, "pipeline uses a destroyed fragment shader")
        })?;
        let targets = self.targets()?;

        let wireframe = properties.wireframe.unwrap_or(self.settings.wireframe);
        let desc = PipelineDesc {
            vertex_shader: vertex_shader.as_ref(),
            fragment_shader: fragment_shader.as_ref(),
            descriptor_layout: layout.as_ref(),
            vertex_layout: &properties.vertex_layout,
            topology: properties.topology,
            rasterization: RasterizationState {
                cull_mode: properties.cull_mode,
                front_face: properties.front_face,
                polygon_mode: if wireframe { PolygonMode::Line } else { PolygonMode::Fill },
            },
            depth_stencil: DepthStencilState {
                depth_test_enable: properties.depth_test,
                depth_write_enable: properties.depth_write,
                depth_compare_op: CompareOp::Less,
            },
            color_blend: ColorBlendState { blend_enable: properties.blend_enable },
            samples: targets.samples(),
        };

        self.device.create_pipeline(&desc, targets.render_pass().as_ref())
    }

    /// Rebuild the native pipeline behind `pipeline`; the handle stays the same
    pub fn recreate_graphics_pipeline(&mut self, pipeline: &GraphicsPipeline) -> Result<()> {
        self.require_idle("recreate_graphics_pipeline")?;
        self.device.wait_idle()?;
        let native = self.build_native_pipeline(pipeline.properties())?;
        pipeline.replace_native(Some(native));
        Ok(())
    }

    /// Release the native pipeline. Returns `false` if it was already destroyed.
    pub fn destroy_graphics_pipeline(&mut self, pipeline: &GraphicsPipeline) -> Result<bool> {
        self.require_idle("destroy_graphics_pipeline")?;
        self.device.wait_idle()?;

        self.pipelines.remove(pipeline.key());
        let is_same = |p: &Option<Arc<GraphicsPipeline>>| p.as_ref().is_some_and(|p| p.key() == pipeline.key());
        if is_same(&self.default_pipeline) {
            self.default_pipeline = None;
        }
        if is_same(&self.bound_pipeline) {
            self.bound_pipeline = None;
        }
        Ok(pipeline.replace_native(None))
    }

    /// Pipeline bound at the start of every render pass
    pub fn set_default_pipeline(&mut self, pipeline: Option<Arc<GraphicsPipeline>>) {
        self.default_pipeline = pipeline;
    }

    /// Switch pipelines inside the current render pass
    pub fn bind_graphics_pipeline(&mut self, pipeline: &Arc<GraphicsPipeline>) -> Result<()> {
        if self.state != FrameState::RenderBegun {
            return Err(engine_violation!(SOURCE,
                "bind_graphics_pipeline outside a render pass ({:?})", self.state));
        }
        let native = pipeline.native().ok_or_else(|| {
            engine_violation!(SOURCE, "bind of a destroyed pipeline")
        })?;
        self.command_list.bind_pipeline(native.as_ref())?;
        self.bound_pipeline = Some(pipeline.clone());
        Ok(())
    }

    /// Rebuild every live pipeline at the next `begin_frame`
    pub fn set_recreate_graphics_pipelines(&mut self, recreate: bool) {
        self.recreate_pipelines = recreate;
    }

    fn rebuild_all_pipelines(&mut self) -> Result<()> {
        self.pipelines.retain(|_, weak| weak.strong_count() > 0);
        let live: Vec<Arc<GraphicsPipeline>> = self.pipelines.values().filter_map(Weak::upgrade).collect();

        for pipeline in &live {
            if pipeline.is_valid() {
                let native = self.build_native_pipeline(pipeline.properties())?;
                pipeline.replace_native(Some(native));
            }
        }
        engine_debug!(SOURCE, "Rebuilt {} pipeline(s)", live.len());
        Ok(())
    }

    fn reload_all_shaders(&mut self) -> Result<()> {
        self.shaders.retain(|_, weak| weak.strong_count() > 0);
        let live: Vec<Arc<ShaderModule>> = self.shaders.values().filter_map(Weak::upgrade).collect();
        for shader in &live {
            self.reload_shader(shader)?;
        }
        Ok(())
    }

    // ===== SETTINGS =====

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.settings.clear_color = color;
    }

    pub fn clear_color(&self) -> Color {
        self.settings.clear_color
    }

    /// Takes effect with the swapchain rebuilt at the next `begin_frame`
    pub fn set_vsync(&mut self, vsync: bool) {
        if self.settings.vsync != vsync {
            self.settings.vsync = vsync;
            self.recreate_swapchain = true;
        }
    }

    pub fn vsync(&self) -> bool {
        self.settings.vsync
    }

    /// Request an MSAA sample count and return the count that will be used
    ///
    /// Counts above the device limit are clamped. A change rebuilds the frame
    /// targets and pipelines at the next `begin_frame`.
    pub fn set_msaa_samples(&mut self, samples: SampleCount) -> SampleCount {
        let samples = clamp_samples(samples, self.device.info().max_samples);
        if self.settings.msaa_samples != samples {
            self.settings.msaa_samples = samples;
            self.recreate_swapchain = true;
            self.recreate_pipelines = true;
        }
        samples
    }

    pub fn msaa_samples(&self) -> SampleCount {
        self.settings.msaa_samples
    }

    /// Highest sample count usable for both color and depth
    pub fn max_usable_sample_count(&self) -> SampleCount {
        self.device.info().max_samples
    }

    pub fn set_wireframe_enabled(&mut self, enabled: bool) {
        if self.settings.wireframe != enabled {
            self.settings.wireframe = enabled;
            self.recreate_pipelines = true;
        }
    }

    pub fn is_wireframe_enabled(&self) -> bool {
        self.settings.wireframe
    }

    // ===== SCENE DATA =====

    /// Camera used by every draw of the following frames
    pub fn set_camera_data(&mut self, camera: CameraData) {
        self.camera = Some(camera);
    }

    pub fn camera_data(&self) -> Option<&CameraData> {
        self.camera.as_ref()
    }

    pub fn set_lights(&mut self, lights: LightsUniformData) {
        self.lights = lights;
    }

    // ===== QUERIES =====

    pub fn window_size(&self) -> Extent2D {
        self.window_size
    }

    /// Current swapchain extent
    pub fn extent(&self) -> Extent2D {
        self.swapchain.extent()
    }

    pub fn swapchain_format(&self) -> TextureFormat {
        self.swapchain.format()
    }

    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        }
    }

    pub fn frame_state(&self) -> FrameState {
        self.state
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.stats
    }

    pub fn frame_targets(&self) -> Option<&FrameTargets> {
        self.frame_targets.as_ref()
    }

    // ===== FRAME PROTOCOL =====

    /// Record a new window size; the swapchain follows at the next `begin_frame`
    pub fn resize(&mut self, width: u32, height: u32) {
        let size = Extent2D::new(width, height);
        if size != self.window_size {
            engine_debug!(SOURCE, "Window resized to {}x{}", width, height);
            self.window_size = size;
            self.recreate_swapchain = true;
        }
    }

    /// Wait for the previous frame, apply pending rebuilds and acquire an image
    ///
    /// Returns [`FrameStatus::Skipped`] when the window has no area or the
    /// swapchain was out of date; the caller then goes straight to the next
    /// frame. Skipping is not an error.
    pub fn begin_frame(&mut self) -> Result<FrameStatus> {
        if self.state != FrameState::Idle {
            return Err(engine_violation!(SOURCE, "begin_frame called in state {:?}", self.state));
        }
        if self.window_size.is_empty() {
            self.stats.frames_skipped += 1;
            return Ok(FrameStatus::Skipped);
        }

        self.device.wait_for_frame()?;

        if self.recreate_shaders {
            self.reload_all_shaders()?;
            self.recreate_shaders = false;
            self.recreate_pipelines = true;
        }
        if self.recreate_swapchain {
            self.recreate_swap_chain()?;
        }
        if self.recreate_pipelines {
            self.rebuild_all_pipelines()?;
            self.recreate_pipelines = false;
        }

        match self.swapchain.acquire_next_image()? {
            AcquireOutcome::OutOfDate => {
                engine_debug!(SOURCE, "Swapchain out of date on acquire, skipping frame");
                self.recreate_swap_chain()?;
                self.stats.frames_skipped += 1;
                return Ok(FrameStatus::Skipped);
            }
            AcquireOutcome::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    self.recreate_swapchain = true;
                }
                self.current_image = image_index;
            }
        }

        self.command_list.begin()?;
        self.state = FrameState::FrameBegun;
        Ok(FrameStatus::Ready)
    }

    /// Upload the per-frame uniforms and open the render pass
    ///
    /// Returns `false` when no frame is being recorded (the frame was
    /// skipped); no draws may be issued in that case.
    pub fn begin_render(&mut self) -> Result<bool> {
        match self.state {
            FrameState::Idle => return Ok(false),
            FrameState::FrameBegun => {}
            other => return Err(engine_violation!(SOURCE, "begin_render called in state {:?}", other)),
        }

        if let Some(camera) = &self.camera {
            self.camera_buffer.update(0, bytemuck::bytes_of(&camera.to_uniform()))?;
        }
        self.lights_buffer.update(0, bytemuck::bytes_of(&self.lights))?;

        self.open_render_pass()?;

        self.bound_pipeline = self.default_pipeline.clone();
        if let Some(native) = self.bound_pipeline.as_ref().and_then(|p| p.native()) {
            self.command_list.bind_pipeline(native.as_ref())?;
        }

        self.state = FrameState::RenderBegun;
        Ok(true)
    }

    fn open_render_pass(&mut self) -> Result<()> {
        let targets = self.frame_targets.as_ref().ok_or_else(|| {
            Error::InvalidResource("frame targets missing".to_string())
        })?;
        let framebuffer = targets.framebuffer(self.current_image)?;
        let extent = targets.extent();

        let color = ClearValue::Color(self.settings.clear_color.to_array());
        let mut clear_values = vec![color, ClearValue::DepthStencil { depth: 1.0, stencil: 0 }];
        if targets.render_pass_desc().has_resolve() {
            clear_values.push(color);
        }

        self.command_list.begin_render_pass(
            targets.render_pass().as_ref(),
            framebuffer.as_ref(),
            &clear_values,
        )?;
        self.command_list.set_viewport(Viewport::full(extent.width, extent.height))?;
        self.command_list.set_scissor(Rect2D { x: 0, y: 0, width: extent.width, height: extent.height })?;
        Ok(())
    }

    /// Draw one mesh with the bound pipeline
    ///
    /// Allocates the mesh on first use and re-uploads its object matrices
    /// when `transform` is dirty or not the one last uploaded. Drawing a
    /// mesh whose buffers or textures were destroyed is a contract
    /// violation. Clears the dirty flag.
    pub fn draw_mesh(&mut self, mesh: &mut Mesh, transform: &mut Transform) -> Result<()> {
        let pipeline = self.check_draw_preconditions()?;
        self.record_mesh(mesh, transform, pipeline.as_ref())?;
        transform.clear_dirty();
        Ok(())
    }

    /// Draw every mesh of a model with one transform, in mesh order
    pub fn draw_model(&mut self, model: &mut Model, transform: &mut Transform) -> Result<()> {
        let pipeline = self.check_draw_preconditions()?;
        for mesh in &model.meshes {
            let mut mesh = lock_mesh(mesh)?;
            self.record_mesh(&mut mesh, transform, pipeline.as_ref())?;
        }
        transform.clear_dirty();
        Ok(())
    }

    fn check_draw_preconditions(&self) -> Result<Arc<dyn Pipeline>> {
        if self.state != FrameState::RenderBegun {
            return Err(engine_violation!(SOURCE, "draw called in state {:?}", self.state));
        }
        if self.camera.is_none() {
            return Err(engine_violation!(SOURCE, "draw called without camera data"));
        }
        let pipeline = self.bound_pipeline.as_ref().ok_or_else(|| {
            engine_violation!(SOURCE, "draw called without a bound pipeline")
        })?;
        pipeline.native().ok_or_else(|| {
            engine_violation!(SOURCE, "draw called with a destroyed pipeline")
        })
    }

    fn record_mesh(&mut self, mesh: &mut Mesh, transform: &Transform, pipeline: &dyn Pipeline) -> Result<()> {
        if !mesh.is_allocated() {
            mesh.allocate(self)?;
        }
        if let Some(released) = mesh.gpu().and_then(|gpu| gpu.released_resource()) {
            return Err(engine_violation!(SOURCE,
                "draw of mesh '{}' whose {} was destroyed", mesh.model_path, released));
        }
        if mesh.needs_transform_upload(transform) {
            mesh.update_transform(transform)?;
        }

        let gpu = mesh.gpu().ok_or_else(|| Error::InvalidResource("mesh not allocated".to_string()))?;
        self.command_list.bind_vertex_buffer(gpu.vertex_buffer.as_ref(), 0)?;
        self.command_list.bind_index_buffer(gpu.index_buffer.as_ref(), 0, IndexType::U32)?;
        self.command_list.bind_descriptor_set(pipeline, gpu.descriptor_set.as_ref())?;
        self.command_list.draw_indexed(mesh.index_count(), 0, 0)?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    /// Close the render pass
    pub fn end_render(&mut self) -> Result<()> {
        if self.state != FrameState::RenderBegun {
            return Err(engine_violation!(SOURCE, "end_render called in state {:?}", self.state));
        }
        self.command_list.end_render_pass()?;
        self.state = FrameState::RenderEnded;
        Ok(())
    }

    /// Submit the recorded frame and present it
    ///
    /// A no-op after a skipped frame. A frame that never opened a render
    /// pass is still cleared and presented. Out-of-date or suboptimal
    /// presentation schedules a swapchain rebuild for the next
    /// `begin_frame`. The renderer is back in `Idle` afterwards, even when
    /// submission fails.
    pub fn end_frame(&mut self) -> Result<()> {
        match self.state {
            FrameState::Idle => return Ok(()),
            FrameState::RenderBegun => {
                return Err(engine_violation!(SOURCE, "end_frame called before end_render"));
            }
            FrameState::FrameBegun => {
                let cleared = self.open_render_pass().and_then(|_| self.command_list.end_render_pass());
                if let Err(e) = cleared {
                    self.state = FrameState::Idle;
                    return Err(e);
                }
            }
            FrameState::RenderEnded | FrameState::FrameEnded => {}
        }

        let result = self.submit_and_present();
        self.state = FrameState::Idle;
        result
    }

    fn submit_and_present(&mut self) -> Result<()> {
        self.command_list.end()?;
        self.device.submit_frame(self.command_list.as_ref(), self.swapchain.as_ref())?;
        self.state = FrameState::FrameEnded;

        let outcome = self.swapchain.present(self.current_image)?;
        if outcome.needs_recreation() {
            engine_debug!(SOURCE, "Present returned {:?}, swapchain rebuild scheduled", outcome);
            self.recreate_swapchain = true;
        }
        self.stats.frames_presented += 1;
        Ok(())
    }

    // ===== LIFECYCLE =====

    /// Tear down and rebuild the swapchain and everything sized from it
    ///
    /// Waits for the device to go idle first. Must not be called while a
    /// frame is being recorded. With a zero-sized window the rebuild stays
    /// pending.
    pub fn recreate_swap_chain(&mut self) -> Result<()> {
        self.require_idle("recreate_swap_chain")?;
        if self.window_size.is_empty() {
            self.recreate_swapchain = true;
            return Ok(());
        }

        self.device.wait_idle()?;
        let previous_pass = self.frame_targets.take().map(|t| t.render_pass_desc());

        self.swapchain.recreate(&SwapchainRequest {
            width: self.window_size.width,
            height: self.window_size.height,
            vsync: self.settings.vsync,
        })?;
        let targets = FrameTargets::new(self.device.as_ref(), self.swapchain.as_ref(), self.settings.msaa_samples)?;

        if previous_pass != Some(targets.render_pass_desc()) {
            self.recreate_pipelines = true;
        }
        self.frame_targets = Some(targets);
        self.recreate_swapchain = false;
        self.stats.swapchain_recreations += 1;

        let extent = self.swapchain.extent();
        engine_info!(SOURCE, "Swapchain recreated at {}x{} ({:?})",
            extent.width, extent.height, self.swapchain.present_mode());
        Ok(())
    }

    /// A swapchain rebuild is pending
    pub fn is_swapchain_recreation_pending(&self) -> bool {
        self.recreate_swapchain
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    /// Wait for the GPU and release everything the renderer owns
    ///
    /// Called from `Drop` as well; running it twice is harmless.
    pub fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        if let Err(e) = self.device.wait_idle() {
            engine_warn!(SOURCE, "wait_idle failed during cleanup: {}", e);
        }

        self.default_pipeline = None;
        self.bound_pipeline = None;
        for pipeline in self.pipelines.values().filter_map(Weak::upgrade) {
            pipeline.replace_native(None);
        }
        self.pipelines.clear();
        for shader in self.shaders.values().filter_map(Weak::upgrade) {
            shader.replace_native(None);
        }
        self.shaders.clear();

        self.frame_targets = None;
        self.camera_buffer.release();
        self.lights_buffer.release();
        self.blank_texture.release();
        self.state = FrameState::Idle;
        self.cleaned_up = true;

        engine_info!(SOURCE, "Renderer cleaned up ({} frame(s) presented)", self.stats.frames_presented);
    }

    fn require_idle(&self, operation: &str) -> Result<()> {
        if self.state != FrameState::Idle {
            return Err(engine_violation!(SOURCE, "{} during frame ({:?})", operation, self.state));
        }
        Ok(())
    }

    fn targets(&self) -> Result<&FrameTargets> {
        self.frame_targets
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("frame targets missing".to_string()))
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn clamp_samples(requested: SampleCount, max: SampleCount) -> SampleCount {
    let samples = requested.clamp_to(max);
    if samples != requested {
        engine_warn!(SOURCE, "{}x MSAA not supported, using {}x", requested.count(), samples.count());
    }
    samples
}

fn blank_texture_desc() -> TextureDesc {
    TextureDesc {
        width: 1,
        height: 1,
        format: TextureFormat::R8G8B8A8_UNORM,
        texture_type: TextureType::None,
        generate_mipmaps: false,
        data: Some(vec![255; 4]),
        sampler: SamplerProperties::default(),
    }
}

/// Object matrices, three material samplers, camera and lights
fn build_default_layout(device: &dyn GraphicsDevice) -> Result<DescriptorLayout> {
    let mut layout = DescriptorLayout::new();
    layout.add_binding(DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX)?;
    for _ in 0..3 {
        layout.add_binding(DescriptorType::CombinedImageSampler, ShaderStageFlags::FRAGMENT)?;
    }
    layout.add_binding(DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT)?;
    layout.add_binding(DescriptorType::UniformBuffer, ShaderStageFlags::FRAGMENT)?;
    layout.bake(device)?;
    Ok(layout)
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
