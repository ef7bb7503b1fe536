/// Renderer module - frame protocol, settings and stable pipeline/shader handles

pub mod renderer;
pub mod settings;
pub mod frame_state;
pub mod frame_targets;
pub mod shader_module;
pub mod graphics_pipeline;

pub use renderer::*;
pub use settings::*;
pub use frame_state::*;
pub use frame_targets::*;
pub use shader_module::*;
pub use graphics_pipeline::*;
