/// Renderer configuration recognized at initialization

use crate::graphics_device::SampleCount;

/// RGBA color, components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Renderer settings
///
/// Every field can also be changed later through the matching
/// `Renderer::set_*` method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    pub clear_color: Color,
    /// FIFO presentation when on, mailbox (if offered) when off
    pub vsync: bool,
    /// Requested sample count, clamped to the device maximum
    pub msaa_samples: SampleCount,
    pub wireframe: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: Color::BLACK,
            vsync: true,
            msaa_samples: SampleCount::S1,
            wireframe: false,
        }
    }
}
