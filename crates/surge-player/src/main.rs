//! Windowed demo for the surge engine.
//!
//! Usage: `surge-player [FONT.ttf]`. Without a font the text layer is skipped.

mod app;
mod scene;

use anyhow::{Context, Result};
use surge_engine::logging::{init_logging, LoggingConfig};
use winit::event_loop::EventLoop;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let font = std::env::args()
        .nth(1)
        .map(|path| std::fs::read(&path).with_context(|| format!("failed to read font {path}")))
        .transpose()?;
    if font.is_none() {
        log::info!("no font given; text layer disabled");
    }

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut player = app::Player::new(font);

    event_loop
        .run_app(&mut player)
        .context("winit event loop terminated with error")?;

    player.finish()
}
