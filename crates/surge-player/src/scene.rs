//! Demo content: bouncing sprites, a sub-image sprite, a depth-mapped backdrop, and
//! an optional text overlay.

use anyhow::Result;
use glam::{Vec2, Vec3};

use surge_engine::coords::{ColorRgba, Rect, Viewport};
use surge_engine::render::{
    place, GlyphCache, RenderCtx, RenderTarget, SpriteDatabase, SpriteDatabaseConfig,
    TextDatabase, TextDatabaseConfig, TextureArray, TextureArrayDesc, TextureRef,
};
use surge_engine::stream::StreamResult;

const TEXTURE_SIZE: u32 = 64;
const CHECKER: TextureRef = TextureRef(0);
const RINGS: TextureRef = TextureRef(1);
const DEPTH_MAP: TextureRef = TextureRef(2);

const SPRITES: usize = 600;
const FONT_PX: f32 = 32.0;

struct Bouncer {
    pos: Vec2,
    vel: Vec2,
    size: f32,
    // Depth against the backdrop's depth map; 0 is nearest.
    z: f32,
    texture: TextureRef,
}

impl Bouncer {
    fn step(&mut self, dt: f32, viewport: Viewport) {
        self.pos += self.vel * dt;
        let max = Vec2::new(viewport.width, viewport.height) - Vec2::splat(self.size);
        for axis in 0..2 {
            if self.pos[axis] < 0.0 || self.pos[axis] > max[axis] {
                self.vel[axis] = -self.vel[axis];
                self.pos[axis] = self.pos[axis].clamp(0.0, max[axis].max(0.0));
            }
        }
    }
}

struct TextLayer {
    cache: GlyphCache,
    db: TextDatabase,
}

pub struct Scene {
    textures: TextureArray,
    sprites: SpriteDatabase,
    text: Option<TextLayer>,
    bouncers: Vec<Bouncer>,
    elapsed: f32,
    frames: u64,
    // Sprites queued this frame; the batch is empty again after its draw.
    queued: usize,
}

impl Scene {
    pub fn new(ctx: &RenderCtx<'_>, font: Option<&[u8]>) -> Result<Self> {
        let textures = TextureArray::new(
            ctx.device,
            &TextureArrayDesc {
                label: "surge demo textures",
                width: TEXTURE_SIZE,
                height: TEXTURE_SIZE,
                layers: 3,
                ..Default::default()
            },
        )?;
        textures.write_layer(ctx.queue, CHECKER, &checker())?;
        textures.write_layer(ctx.queue, RINGS, &rings())?;
        textures.write_layer(ctx.queue, DEPTH_MAP, &radial_depth())?;

        let sprites = SpriteDatabase::new(
            ctx,
            &textures,
            &SpriteDatabaseConfig {
                max_sprites: SPRITES + 1,
                ..Default::default()
            },
        )?;

        let text = font
            .map(|bytes| -> Result<TextLayer> {
                let cache = GlyphCache::new(ctx, bytes, FONT_PX)?;
                let db = TextDatabase::new(ctx, &cache, &TextDatabaseConfig::default())?;
                Ok(TextLayer { cache, db })
            })
            .transpose()?;

        Ok(Self {
            textures,
            sprites,
            text,
            bouncers: spawn_bouncers(SPRITES, ctx.viewport),
            elapsed: 0.0,
            frames: 0,
            queued: 0,
        })
    }

    pub fn frame(&mut self, ctx: &RenderCtx<'_>, target: &mut RenderTarget<'_>, dt: f32) {
        self.elapsed += dt;
        self.frames += 1;

        for b in &mut self.bouncers {
            b.step(dt, ctx.viewport);
        }

        if let Err(e) = self.queue_sprites(ctx.viewport) {
            log::error!("skipping sprites this frame: {e}");
            return;
        }
        self.queued = self.sprites.len();
        self.sprites.draw(ctx, target, &self.textures);

        if let Err(e) = self.queue_text(ctx.viewport, dt) {
            log::error!("skipping text this frame: {e}");
            return;
        }
        if let Some(layer) = self.text.as_mut() {
            layer
                .db
                .draw(ctx, target, &layer.cache, ColorRgba::new(0.9, 0.9, 0.8, 1.0));
        }
    }

    fn queue_sprites(&mut self, viewport: Viewport) -> StreamResult<()> {
        self.sprites.begin_add()?;
        self.sprites.reset();

        let full = Vec2::new(viewport.width, viewport.height);
        self.sprites
            .add_depth(RINGS, DEPTH_MAP, place(full * 0.25, full * 0.5, 0.0));

        for b in &self.bouncers {
            let _ = self
                .sprites
                .add(b.texture, place(b.pos, Vec2::splat(b.size), b.z), 0.85)?;
        }

        // Sway the first bouncer in its local space.
        let sway = Vec3::new((self.elapsed * 3.0).sin() * 0.5, 0.0, 0.0);
        self.sprites.batch_mut().translate(0, sway);

        // Top-left quarter of the checker, magnified.
        let _ = self.sprites.add_view(
            CHECKER,
            place(Vec2::new(16.0, 16.0), Vec2::splat(128.0), 0.0),
            Rect::new(0.0, 0.0, 32.0, 32.0),
            self.textures.dims(),
            1.0,
        )?;

        Ok(())
    }

    fn queue_text(&mut self, viewport: Viewport, dt: f32) -> StreamResult<()> {
        let Some(layer) = self.text.as_mut() else {
            return Ok(());
        };

        layer.db.begin_add()?;
        layer.db.reset();

        let fps = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        let stats = format!(
            "frame {}\n{fps:.0} fps\nsprites {} dropped {}",
            self.frames,
            self.queued,
            self.sprites.dropped()
        );
        let _ = layer
            .db
            .push(Vec3::new(16.0, 40.0, 0.0), Vec2::ONE, &layer.cache, &stats)?;

        let banner = Vec2::new(viewport.width * 0.5, 48.0);
        let _ = layer.db.push_centered(
            Vec3::new(viewport.width * 0.25, viewport.height - 16.0, 0.0),
            1.5,
            banner,
            &layer.cache,
            "surge streaming arena",
            0.05,
        )?;

        Ok(())
    }

    /// Drops accumulated per-frame state after a resize.
    pub fn reinit(&mut self) {
        if let Err(e) = self.sprites.reinit() {
            log::error!("sprite reinit: {e}");
        }
        if let Some(layer) = self.text.as_mut() {
            if let Err(e) = layer.db.reinit() {
                log::error!("text reinit: {e}");
            }
        }
    }

    pub fn destroy(self) -> StreamResult<()> {
        self.sprites.destroy()?;
        if let Some(layer) = self.text {
            layer.db.destroy()?;
        }
        Ok(())
    }
}

fn spawn_bouncers(count: usize, viewport: Viewport) -> Vec<Bouncer> {
    // Deterministic spread; no RNG needed for a demo.
    (0..count)
        .map(|i| {
            let t = i as f32;
            let size = 12.0 + (t * 7.0) % 28.0;
            Bouncer {
                pos: Vec2::new(
                    (t * 37.0) % viewport.width.max(1.0),
                    (t * 53.0) % viewport.height.max(1.0),
                ),
                vel: Vec2::new(
                    60.0 + (t * 13.0) % 140.0,
                    40.0 + (t * 29.0) % 160.0,
                ) * if i % 2 == 0 { 1.0 } else { -1.0 },
                size,
                z: 0.2 + (i % 4) as f32 * 0.2,
                texture: if i % 3 == 0 { RINGS } else { CHECKER },
            }
        })
        .collect()
}

// ── procedural textures (RGBA8) ───────────────────────────────────────────

fn texels(f: impl Fn(u32, u32) -> [u8; 4]) -> Vec<u8> {
    (0..TEXTURE_SIZE)
        .flat_map(|y| (0..TEXTURE_SIZE).map(move |x| (x, y)))
        .flat_map(|(x, y)| f(x, y))
        .collect()
}

fn checker() -> Vec<u8> {
    texels(|x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            [230, 90, 60, 255]
        } else {
            [40, 40, 60, 255]
        }
    })
}

fn radius(x: u32, y: u32) -> f32 {
    let c = TEXTURE_SIZE as f32 / 2.0;
    Vec2::new(x as f32 + 0.5 - c, y as f32 + 0.5 - c).length() / c
}

fn rings() -> Vec<u8> {
    texels(|x, y| {
        let r = radius(x, y);
        if r > 1.0 {
            [0, 0, 0, 0]
        } else if ((r * 6.0) as u32) % 2 == 0 {
            [80, 200, 240, 255]
        } else {
            [250, 250, 250, 255]
        }
    })
}

fn radial_depth() -> Vec<u8> {
    texels(|x, y| {
        let d = (radius(x, y).min(1.0) * 255.0) as u8;
        [d, d, d, 255]
    })
}
