mod canvas;
mod renderer;

pub use canvas::FrameCanvas;
pub use renderer::{RenderError, Renderer};
