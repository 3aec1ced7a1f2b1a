pub mod display;
pub mod overlay;

pub use display::{Display, DisplayError, Sdl2Display};
pub use overlay::{annotate, OverlayStyle};
