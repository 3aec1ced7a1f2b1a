//! SDL2 Window Display Module
//! Presents annotated RGB frames in a window and reports when the operator
//! asks to quit.

use image::RgbImage;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;
use thiserror::Error;
use tracing::info;

use crate::DisplayConfig;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display initialisation failed: {0}")]
    Init(String),
    #[error("render failed: {0}")]
    Render(String),
}

/// Rendering surface for the session loop.
pub trait Display {
    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError>;

    /// Drain pending input; true once the operator asked to stop.
    fn quit_requested(&mut self) -> bool;

    /// Release window resources. Called exactly once on every exit path.
    fn close(&mut self) {}
}

impl<D: Display + ?Sized> Display for Box<D> {
    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        (**self).present(frame)
    }

    fn quit_requested(&mut self) -> bool {
        (**self).quit_requested()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

fn is_quit_key(key: Keycode) -> bool {
    key == Keycode::Q || key == Keycode::Escape
}

fn init_error(e: impl ToString) -> DisplayError {
    DisplayError::Init(e.to_string())
}

fn render_error(e: impl ToString) -> DisplayError {
    DisplayError::Render(e.to_string())
}

/// SDL2 Window Display
/// The window keeps its configured size; frames are scaled to fit.
pub struct Sdl2Display {
    // None once closed
    surface: Option<Surface>,
    event_pump: EventPump,
}

struct Surface {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
}

impl Sdl2Display {
    pub fn new(sdl_context: &sdl2::Sdl, config: &DisplayConfig) -> Result<Self, DisplayError> {
        let video_subsystem = sdl_context.video().map_err(init_error)?;

        let window = video_subsystem
            .window(&config.title, config.width, config.height)
            .position_centered()
            .resizable()
            .build()
            .map_err(init_error)?;

        let canvas = window
            .into_canvas()
            .present_vsync()
            .build()
            .map_err(init_error)?;
        let texture_creator = canvas.texture_creator();
        let event_pump = sdl_context.event_pump().map_err(init_error)?;

        info!(
            "Opened window '{}' ({}x{})",
            config.title, config.width, config.height
        );

        Ok(Self {
            surface: Some(Surface {
                canvas,
                texture_creator,
            }),
            event_pump,
        })
    }
}

impl Display for Sdl2Display {
    fn present(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        let Surface {
            canvas,
            texture_creator,
        } = self
            .surface
            .as_mut()
            .ok_or_else(|| render_error("display already closed"))?;
        let (width, height) = frame.dimensions();

        let mut texture = texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, width, height)
            .map_err(render_error)?;

        texture
            .update(None, frame.as_raw(), (width * 3) as usize)
            .map_err(render_error)?;

        canvas.clear();
        canvas.copy(&texture, None, None).map_err(render_error)?;
        canvas.present();
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        let mut quit = false;
        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => {
                    info!("Quit event received");
                    quit = true;
                }
                Event::KeyDown {
                    keycode: Some(key), ..
                } if is_quit_key(key) => {
                    info!("Quit key pressed");
                    quit = true;
                }
                _ => {}
            }
        }
        quit
    }

    fn close(&mut self) {
        // Dropping both the canvas and the texture creator destroys the window
        if self.surface.take().is_some() {
            info!("Display closed");
        }
    }
}
