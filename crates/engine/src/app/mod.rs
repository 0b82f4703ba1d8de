mod clock;
mod input;
mod loop_runner;
mod metrics;
mod rendering;

pub use input::{InputAction, InputSnapshot};
pub use loop_runner::{run_app, run_headless, AppError, LoopConfig};
pub use metrics::LoopMetricsSnapshot;
pub use rendering::{FrameCanvas, RenderError, Renderer};
