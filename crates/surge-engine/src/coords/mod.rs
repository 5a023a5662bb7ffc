//! Coordinate and geometry types shared by the draw databases.
//!
//! Canonical CPU space:
//! - Physical pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! Model matrices map the unit quad into this space; shaders convert to NDC using a
//! viewport uniform. Texture sub-rectangles use the same top-left pixel convention.

mod color;
mod rect;
mod viewport;

pub use color::ColorRgba;
pub use rect::Rect;
pub use viewport::Viewport;
