//! GPU rendering subsystem.
//!
//! Draw databases stream per-instance records through a
//! [`StreamingArena`](crate::stream::StreamingArena) and issue one instanced draw per
//! frame. Each database owns its pipelines; the streaming backend is the
//! [`GpuTimeline`](crate::device::GpuTimeline) carried by [`RenderCtx`].
//!
//! Convention:
//! - CPU geometry is in pixels (top-left origin, +Y down).
//! - Vertex shaders convert to NDC using a viewport uniform.

mod common;
mod ctx;
pub mod record;
pub mod sprite;
pub mod text;
pub mod texture;

pub use ctx::{RenderCtx, RenderTarget};
pub use record::{place, GlyphRecord, SpriteRecord, ViewRect};
pub use sprite::{DepthSprite, SpriteBatch, SpriteDatabase, SpriteDatabaseConfig, SpriteDraw};
pub use text::{Glyph, GlyphCache, GlyphTable, TextBatch, TextDatabase, TextDatabaseConfig};
pub use texture::{TextureArray, TextureArrayDesc, TextureRef};
