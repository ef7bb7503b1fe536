//! GPU-backed resources drawn by the renderer.

pub mod vertex;
pub mod uniform;
pub mod material;
pub mod mesh;
pub mod model;

pub use vertex::*;
pub use uniform::*;
pub use material::*;
pub use mesh::*;
pub use model::Model;
