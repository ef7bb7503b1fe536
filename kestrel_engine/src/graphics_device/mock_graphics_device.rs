/// Mock graphics device for unit tests (no GPU required)
///
/// Every mock object shares one [`MockState`] with the device that created
/// it, so tests can inspect what was recorded and steer the next outcome
/// (forced out-of-date acquire, suboptimal present, memory table, ...).

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use crate::error::{Error, Result};
use crate::graphics_device::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format,
    check_buffer_range, find_memory_type, find_supported_format,
    AcquireOutcome, AttachmentTexture, AttachmentTextureDesc, BindingResource, Buffer,
    BufferDesc, BufferKind, ClearValue, ColorSpace, CommandList, DescriptorBinding,
    DescriptorSet, DeviceInfo, Extent2D, Framebuffer, FramebufferDesc, GraphicsDevice,
    IndexType, MemoryPropertyFlags, MemoryTypeInfo, NativeDescriptorLayout,
    PhysicalDeviceType, Pipeline, PipelineDesc, PolygonMode, PresentMode, PresentOutcome,
    Rect2D, RenderPass, RenderPassDesc, SampleCount, Shader, ShaderDesc, ShaderStage,
    SurfaceCapabilities, SurfaceFormat, Swapchain, SwapchainRequest, Texture, TextureDesc,
    TextureFormat, TextureInfo, Viewport, DEPTH_FORMAT_CANDIDATES,
};

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Native pipeline state captured at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineRecord {
    pub samples: SampleCount,
    pub polygon_mode: PolygonMode,
}

/// State shared by the mock device and everything it creates
#[derive(Debug)]
pub struct MockState {
    /// Command log of every command list, in recording order
    pub commands: Vec<String>,
    pub last_clear_values: Vec<ClearValue>,
    pub last_viewport: Option<Viewport>,
    pub presented_images: Vec<u32>,

    pub live_buffers: usize,
    pub live_textures: usize,
    pub staging_uploads: usize,
    pub memory_types: Vec<MemoryTypeInfo>,

    pub capabilities: SurfaceCapabilities,
    pub surface_formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
    pub supported_depth_formats: Vec<TextureFormat>,

    /// Number of upcoming acquires that report out-of-date
    pub out_of_date_acquires: u32,
    /// Outcome of the next present, then back to `Presented`
    pub next_present: Option<PresentOutcome>,
    pub swapchains_created: usize,
    pub swapchain_recreations: usize,

    pub shaders_created: usize,
    pub pipelines_created: Vec<PipelineRecord>,
    pub descriptor_sets_created: usize,
    pub framebuffers_created: usize,

    pub fence_waits: usize,
    pub frames_submitted: usize,
    pub wait_idle_calls: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            last_clear_values: Vec::new(),
            last_viewport: None,
            presented_images: Vec::new(),
            live_buffers: 0,
            live_textures: 0,
            staging_uploads: 0,
            memory_types: vec![
                MemoryTypeInfo { property_flags: MemoryPropertyFlags::DEVICE_LOCAL, heap_index: 0 },
                MemoryTypeInfo {
                    property_flags: MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
                    heap_index: 1,
                },
            ],
            capabilities: SurfaceCapabilities {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: Extent2D::new(u32::MAX, u32::MAX),
                min_extent: Extent2D::new(1, 1),
                max_extent: Extent2D::new(4096, 4096),
            },
            surface_formats: vec![
                SurfaceFormat { format: TextureFormat::B8G8R8A8_UNORM, color_space: ColorSpace::SrgbNonlinear },
                SurfaceFormat { format: TextureFormat::B8G8R8A8_SRGB, color_space: ColorSpace::SrgbNonlinear },
            ],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate],
            supported_depth_formats: vec![TextureFormat::D32_FLOAT, TextureFormat::D24_UNORM_S8_UINT],
            out_of_date_acquires: 0,
            next_present: None,
            swapchains_created: 0,
            swapchain_recreations: 0,
            shaders_created: 0,
            pipelines_created: Vec::new(),
            descriptor_sets_created: 0,
            framebuffers_created: 0,
            fence_waits: 0,
            frames_submitted: 0,
            wait_idle_calls: 0,
        }
    }
}

type SharedState = Arc<Mutex<MockState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MockState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// Mock Buffer
// ============================================================================

pub struct MockBuffer {
    pub kind: BufferKind,
    pub size: u64,
    pub memory_type: u32,
    pub contents: Mutex<Vec<u8>>,
    allocated: AtomicBool,
    state: SharedState,
}

impl Buffer for MockBuffer {
    fn kind(&self) -> BufferKind {
        self.kind
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_allocated(&self) -> bool {
        self.allocated.load(Ordering::SeqCst)
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.is_allocated() {
            return Err(Error::InvalidResource("update on released buffer".to_string()));
        }
        if self.kind.uses_staging() {
            return Err(Error::InvalidResource("buffer is not host visible".to_string()));
        }
        if !check_buffer_range(self.size, offset, data.len()) {
            return Err(Error::InvalidResource("update out of bounds".to_string()));
        }
        let mut contents = self.contents.lock().map_err(|_| Error::BackendError("poisoned".into()))?;
        let start = offset as usize;
        contents[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn release(&self) -> bool {
        let was_allocated = self.allocated.swap(false, Ordering::SeqCst);
        if was_allocated {
            lock(&self.state).live_buffers -= 1;
        }
        was_allocated
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// Mock Textures
// ============================================================================

pub struct MockTexture {
    pub info: TextureInfo,
    allocated: AtomicBool,
    state: SharedState,
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }

    fn is_allocated(&self) -> bool {
        self.allocated.load(Ordering::SeqCst)
    }

    fn release(&self) -> bool {
        let was_allocated = self.allocated.swap(false, Ordering::SeqCst);
        if was_allocated {
            lock(&self.state).live_textures -= 1;
        }
        was_allocated
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for MockTexture {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct MockAttachmentTexture {
    pub desc: AttachmentTextureDesc,
}

impl AttachmentTexture for MockAttachmentTexture {
    fn desc(&self) -> &AttachmentTextureDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Shader / Descriptors / Pipeline
// ============================================================================

pub struct MockShader {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub word_count: usize,
}

impl Shader for MockShader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockDescriptorLayout {
    pub bindings: Vec<DescriptorBinding>,
}

impl NativeDescriptorLayout for MockDescriptorLayout {
    fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockDescriptorSet {
    pub binding_count: usize,
}

impl DescriptorSet for MockDescriptorSet {
    fn binding_count(&self) -> usize {
        self.binding_count
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockRenderPass {
    pub desc: RenderPassDesc,
}

impl RenderPass for MockRenderPass {
    fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockPipeline {
    pub record: PipelineRecord,
}

impl Pipeline for MockPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockFramebuffer {
    pub width: u32,
    pub height: u32,
}

impl Framebuffer for MockFramebuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Swapchain
// ============================================================================

pub struct MockSwapchain {
    pub extent: Extent2D,
    pub format: TextureFormat,
    pub present_mode: PresentMode,
    pub image_count: u32,
    next_image: u32,
    state: SharedState,
}

impl MockSwapchain {
    fn build(state: SharedState, request: &SwapchainRequest) -> Result<Self> {
        let (extent, format, present_mode, image_count) = {
            let s = lock(&state);
            let format = choose_surface_format(&s.surface_formats)?;
            (
                choose_extent(&s.capabilities, Extent2D::new(request.width, request.height)),
                format.format,
                choose_present_mode(&s.present_modes, request.vsync),
                choose_image_count(&s.capabilities),
            )
        };
        Ok(Self { extent, format, present_mode, image_count, next_image: 0, state })
    }
}

impl Swapchain for MockSwapchain {
    fn acquire_next_image(&mut self) -> Result<AcquireOutcome> {
        let mut s = lock(&self.state);
        if s.out_of_date_acquires > 0 {
            s.out_of_date_acquires -= 1;
            return Ok(AcquireOutcome::OutOfDate);
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count.max(1);
        Ok(AcquireOutcome::Acquired { image_index, suboptimal: false })
    }

    fn present(&mut self, image_index: u32) -> Result<PresentOutcome> {
        let mut s = lock(&self.state);
        s.presented_images.push(image_index);
        Ok(s.next_present.take().unwrap_or(PresentOutcome::Presented))
    }

    fn recreate(&mut self, request: &SwapchainRequest) -> Result<()> {
        let rebuilt = MockSwapchain::build(self.state.clone(), request)?;
        self.extent = rebuilt.extent;
        self.format = rebuilt.format;
        self.present_mode = rebuilt.present_mode;
        self.image_count = rebuilt.image_count;
        self.next_image = 0;
        lock(&self.state).swapchain_recreations += 1;
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.image_count as usize
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock CommandList
// ============================================================================

pub struct MockCommandList {
    state: SharedState,
}

impl MockCommandList {
    fn record(&self, command: impl Into<String>) {
        lock(&self.state).commands.push(command.into());
    }
}

impl CommandList for MockCommandList {
    fn begin(&mut self) -> Result<()> {
        self.record("begin");
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.record("end");
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        render_pass: &dyn RenderPass,
        framebuffer: &dyn Framebuffer,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        if clear_values.len() != render_pass.desc().attachment_count() {
            return Err(Error::InvalidResource(format!(
                "{} clear values for {} attachments",
                clear_values.len(),
                render_pass.desc().attachment_count()
            )));
        }
        let mut s = lock(&self.state);
        s.last_clear_values = clear_values.to_vec();
        s.commands.push(format!(
            "begin_render_pass {}x{}", framebuffer.width(), framebuffer.height()
        ));
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.record("end_render_pass");
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        let mut s = lock(&self.state);
        s.last_viewport = Some(viewport);
        s.commands.push("set_viewport".to_string());
        Ok(())
    }

    fn set_scissor(&mut self, _scissor: Rect2D) -> Result<()> {
        self.record("set_scissor");
        Ok(())
    }

    fn bind_pipeline(&mut self, _pipeline: &dyn Pipeline) -> Result<()> {
        self.record("bind_pipeline");
        Ok(())
    }

    fn bind_descriptor_set(
        &mut self,
        _pipeline: &dyn Pipeline,
        _descriptor_set: &dyn DescriptorSet,
    ) -> Result<()> {
        self.record("bind_descriptor_set");
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &dyn Buffer, _offset: u64) -> Result<()> {
        if !buffer.is_allocated() {
            return Err(Error::ContractViolation("bind of released vertex buffer".to_string()));
        }
        self.record("bind_vertex_buffer");
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &dyn Buffer, _offset: u64, index_type: IndexType) -> Result<()> {
        if !buffer.is_allocated() {
            return Err(Error::ContractViolation("bind of released index buffer".to_string()));
        }
        self.record(format!("bind_index_buffer {:?}", index_type));
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, _first_index: u32, _vertex_offset: i32) -> Result<()> {
        self.record(format!("draw_indexed {}", index_count));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

/// Graphics device that records everything into a [`MockState`]
pub struct MockGraphicsDevice {
    state: SharedState,
    info: DeviceInfo,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self::with_max_samples(SampleCount::S8)
    }

    /// Device whose color/depth sample limit is `max_samples`
    pub fn with_max_samples(max_samples: SampleCount) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            info: DeviceInfo {
                name: "Mock GPU".to_string(),
                device_type: PhysicalDeviceType::DiscreteGpu,
                max_samples,
                max_anisotropy: 16.0,
            },
        }
    }

    /// Handle on the shared state; stays valid after the device moves
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }
}

impl Default for MockGraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        if desc.size == 0 {
            return Err(Error::InvalidResource("zero-sized buffer".to_string()));
        }

        let mut s = lock(&self.state);
        let memory_type = find_memory_type(u32::MAX, desc.kind.required_properties(), &s.memory_types)?;

        let mut contents = vec![0u8; desc.size as usize];
        if desc.kind.uses_staging() {
            match &desc.data {
                Some(data) if data.len() as u64 == desc.size => contents.copy_from_slice(data),
                _ => return Err(Error::InvalidResource(
                    "device-local buffer needs initial data of its full size".to_string(),
                )),
            }
            s.staging_uploads += 1;
            s.commands.push("staging_copy".to_string());
        }
        s.live_buffers += 1;
        drop(s);

        Ok(Arc::new(MockBuffer {
            kind: desc.kind,
            size: desc.size,
            memory_type,
            contents: Mutex::new(contents),
            allocated: AtomicBool::new(true),
            state: self.state.clone(),
        }))
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidResource("zero-sized texture".to_string()));
        }
        let mut s = lock(&self.state);
        if let Some(data) = &desc.data {
            if data.len() != desc.expected_data_len() {
                return Err(Error::InvalidResource(format!(
                    "texture data is {} bytes, expected {}", data.len(), desc.expected_data_len()
                )));
            }
            s.staging_uploads += 1;
        }
        s.live_textures += 1;
        drop(s);

        Ok(Arc::new(MockTexture {
            info: TextureInfo {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                texture_type: desc.texture_type,
                mip_levels: desc.mip_levels(),
            },
            allocated: AtomicBool::new(true),
            state: self.state.clone(),
        }))
    }

    fn create_attachment_texture(&self, desc: &AttachmentTextureDesc) -> Result<Arc<dyn AttachmentTexture>> {
        if desc.samples > self.info.max_samples {
            return Err(Error::InvalidResource(format!(
                "{:?} exceeds device limit {:?}", desc.samples, self.info.max_samples
            )));
        }
        Ok(Arc::new(MockAttachmentTexture { desc: *desc }))
    }

    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn Shader>> {
        if desc.code.first() != Some(&SPIRV_MAGIC) {
            return Err(Error::InvalidResource("missing SPIR-V magic number".to_string()));
        }
        lock(&self.state).shaders_created += 1;
        Ok(Arc::new(MockShader {
            stage: desc.stage,
            entry_point: desc.entry_point,
            word_count: desc.code.len(),
        }))
    }

    fn create_descriptor_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<Arc<dyn NativeDescriptorLayout>> {
        Ok(Arc::new(MockDescriptorLayout { bindings: bindings.to_vec() }))
    }

    fn create_descriptor_set(
        &self,
        layout: &dyn NativeDescriptorLayout,
        bindings: &[DescriptorBinding],
        resources: &[BindingResource<'_>],
    ) -> Result<Arc<dyn DescriptorSet>> {
        if layout.binding_count() != bindings.len() || bindings.len() != resources.len() {
            return Err(Error::InvalidResource(format!(
                "{} resources for {} bindings", resources.len(), bindings.len()
            )));
        }
        for (binding, resource) in bindings.iter().zip(resources) {
            if binding.descriptor_type != resource.descriptor_type() {
                return Err(Error::InvalidResource(format!(
                    "binding {} expects {:?}", binding.index, binding.descriptor_type
                )));
            }
            let allocated = match resource {
                BindingResource::UniformBuffer(buffer) => buffer.is_allocated(),
                BindingResource::Texture(texture) => texture.is_allocated(),
            };
            if !allocated {
                return Err(Error::InvalidResource(format!(
                    "binding {} references a released resource", binding.index
                )));
            }
        }
        lock(&self.state).descriptor_sets_created += 1;
        Ok(Arc::new(MockDescriptorSet { binding_count: bindings.len() }))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<dyn RenderPass>> {
        Ok(Arc::new(MockRenderPass { desc: *desc }))
    }

    fn create_pipeline(
        &self,
        desc: &PipelineDesc<'_>,
        render_pass: &dyn RenderPass,
    ) -> Result<Arc<dyn Pipeline>> {
        if desc.samples != render_pass.desc().samples {
            return Err(Error::InvalidResource(format!(
                "pipeline samples {:?} do not match render pass {:?}",
                desc.samples, render_pass.desc().samples
            )));
        }
        if desc.vertex_shader.stage() != ShaderStage::Vertex
            || desc.fragment_shader.stage() != ShaderStage::Fragment
        {
            return Err(Error::InvalidResource("shader stage mismatch".to_string()));
        }
        let record = PipelineRecord {
            samples: desc.samples,
            polygon_mode: desc.rasterization.polygon_mode,
        };
        lock(&self.state).pipelines_created.push(record);
        Ok(Arc::new(MockPipeline { record }))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc<'_>) -> Result<Arc<dyn Framebuffer>> {
        if desc.attachments.len() != desc.render_pass.desc().attachment_count() {
            return Err(Error::InvalidResource(format!(
                "{} attachments for a render pass expecting {}",
                desc.attachments.len(),
                desc.render_pass.desc().attachment_count()
            )));
        }
        lock(&self.state).framebuffers_created += 1;
        Ok(Arc::new(MockFramebuffer { width: desc.width, height: desc.height }))
    }

    fn create_swapchain(&self, request: &SwapchainRequest) -> Result<Box<dyn Swapchain>> {
        let swapchain = MockSwapchain::build(self.state.clone(), request)?;
        lock(&self.state).swapchains_created += 1;
        Ok(Box::new(swapchain))
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(MockCommandList { state: self.state.clone() }))
    }

    fn find_depth_format(&self) -> Result<TextureFormat> {
        let supported = lock(&self.state).supported_depth_formats.clone();
        find_supported_format(&DEPTH_FORMAT_CANDIDATES, |f| supported.contains(&f))
    }

    fn wait_for_frame(&self) -> Result<()> {
        lock(&self.state).fence_waits += 1;
        Ok(())
    }

    fn submit_frame(&self, _commands: &dyn CommandList, _swapchain: &dyn Swapchain) -> Result<()> {
        let mut s = lock(&self.state);
        s.frames_submitted += 1;
        s.commands.push("submit".to_string());
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        lock(&self.state).wait_idle_calls += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
