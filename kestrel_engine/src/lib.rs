/*!
# Kestrel Engine

GPU resource management and frame rendering core of the Kestrel 3D engine.

The crate is backend-agnostic. A backend (see `kestrel_engine_renderer_vulkan`)
implements the [`GraphicsDevice`](kestrel::render::GraphicsDevice) trait and
everything it hands out; the [`Renderer`](kestrel::renderer::Renderer) drives
it through one frame protocol:

```text
begin_frame -> begin_render -> draw_mesh / draw_model ... -> end_render -> end_frame
```

## Modules

- **render**: device-facing traits (buffers, textures, shaders, descriptor
  layouts, pipelines, render passes, framebuffers, swapchain, command lists)
  and the negotiation helpers shared by every backend
- **renderer**: frame state machine, settings, stable pipeline and shader handles
- **resource**: vertices, uniform blocks, materials, meshes and models
- **scene**: transforms, camera and lights
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod graphics_device;
pub mod renderer;
pub mod resource;
pub mod scene;

// Main kestrel namespace module
pub mod kestrel {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton (global logger)
    pub use crate::engine::Engine;

    // Logging sub-module (types only; the engine_* macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Backend-facing traits and descriptors
    pub mod render {
        pub use crate::graphics_device::*;
    }

    pub mod renderer {
        pub use crate::renderer::*;
    }

    pub mod resource {
        pub use crate::resource::*;
    }

    pub mod scene {
        pub use crate::scene::*;
    }
}

// Re-export math library at crate root
pub use glam;
