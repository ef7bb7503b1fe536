/// Scene-side data the renderer consumes: transforms, cameras and lights

pub mod transform;
pub mod camera;
pub mod lights;

pub use transform::Transform;
pub use camera::*;
pub use lights::*;
