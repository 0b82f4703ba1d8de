use std::sync::Arc;

use pixels::{Error as PixelsError, Pixels, SurfaceTexture, TextureError};
use thiserror::Error;
use tracing::debug;
use winit::window::Window;

use crate::session::Session;

use super::canvas::{FrameCanvas, CLEAR_COLOR};

const EMPTY_BUFFER_SIZE: (u32, u32) = (320, 240);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Pixels(#[from] PixelsError),
    #[error("failed to resize frame buffer: {0}")]
    Texture(#[from] TextureError),
}

/// Owns the window surface. The frame buffer always has the current level's
/// pixel size; `pixels` scales it to the window.
pub struct Renderer {
    pixels: Pixels<'static>,
    buffer_size: (u32, u32),
}

impl Renderer {
    pub fn new(window: Arc<Window>) -> Result<Self, PixelsError> {
        let size = window.inner_size();
        let surface = SurfaceTexture::new(size.width.max(1), size.height.max(1), window);
        let (width, height) = EMPTY_BUFFER_SIZE;
        let pixels = Pixels::new(width, height, surface)?;
        Ok(Self {
            pixels,
            buffer_size: EMPTY_BUFFER_SIZE,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels.resize_surface(width, height)?;
        Ok(())
    }

    pub fn render_session(&mut self, session: &Session) -> Result<(), RenderError> {
        let wanted = session
            .pixel_size()
            .filter(|(width, height)| *width > 0 && *height > 0)
            .unwrap_or(EMPTY_BUFFER_SIZE);
        if wanted != self.buffer_size {
            self.pixels.resize_buffer(wanted.0, wanted.1)?;
            self.buffer_size = wanted;
            debug!(width = wanted.0, height = wanted.1, "renderer_buffer_resized");
        }

        let (width, height) = self.buffer_size;
        let mut canvas = FrameCanvas::new(self.pixels.frame_mut(), width, height, session.brightness());
        canvas.clear(CLEAR_COLOR);
        session.render(&mut canvas);
        self.pixels.render()?;
        Ok(())
    }
}
