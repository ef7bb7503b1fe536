/// Frame protocol states and per-session counters

/// Position in the frame protocol
///
/// `Idle -> FrameBegun -> RenderBegun -> RenderEnded -> FrameEnded -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    /// Image acquired, command list recording
    FrameBegun,
    /// Render pass open, draws accepted
    RenderBegun,
    RenderEnded,
    /// Submitted, waiting for present
    FrameEnded,
}

/// Result of `Renderer::begin_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Recording started, proceed with `begin_render`
    Ready,
    /// Nothing to render this frame (minimized window or swapchain invalidated)
    Skipped,
}

/// Counters accumulated since the renderer was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub frames_presented: u64,
    pub frames_skipped: u64,
    pub draw_calls: u64,
    pub swapchain_recreations: u64,
}
