//! Surge engine crate.
//!
//! Streams per-frame draw data to the GPU through multi-buffered arenas and renders
//! sprites and text from it.

pub mod coords;
pub mod device;
pub mod logging;
pub mod render;
pub mod stream;
