// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;
mod scene;

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use vigor_core::{init_tracing, DiagnosticSink, TracingSink};
use vigor_platform::SignalTranslator;
use vigor_render::{RenderSize, Renderer, WindowSignal};
use vigor_render_vk::{
    DeviceContext, DeviceRequirements, RendererOptions, SceneAssets, VkSurfaceRenderer,
};

use vigor_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Window, WindowId},
};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; defaults apply when it doesn't exist
    #[arg(long, default_value = "vigor.toml")]
    config: PathBuf,
    /// Number of windows (overrides [window] count)
    #[arg(long)]
    windows: Option<u32>,
    /// PNG texture (overrides [assets] texture)
    #[arg(long)]
    texture: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(count) = self.windows {
            cfg.window.count = count;
        }
        if let Some(texture) = &self.texture {
            cfg.assets.texture = Some(texture.clone());
        }
    }
}

struct SurfaceWindow {
    // Declared first: the surface goes before the window it was made from.
    renderer: VkSurfaceRenderer,
    translator: SignalTranslator,
    window: Window,
}

struct App {
    cfg: AppConfig,
    scene: SceneAssets,
    sink: Arc<dyn DiagnosticSink>,
    windows: HashMap<WindowId, SurfaceWindow>,
    ctx: Option<Rc<DeviceContext>>,
    failure: Option<anyhow::Error>,

    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(cfg: AppConfig, scene: SceneAssets) -> Self {
        Self {
            cfg,
            scene,
            sink: Arc::new(TracingSink),
            windows: HashMap::new(),
            ctx: None,
            failure: None,
            frames: 0,
            last_fps_instant: Instant::now(),
        }
    }

    fn open_windows(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let count = self.cfg.window.count.max(1);
        let requirements = DeviceRequirements {
            require_discrete: self.cfg.render.require_discrete_gpu,
            ..Default::default()
        };
        let options = RendererOptions {
            clear_color: self.cfg.render.clear_color,
            present: self.cfg.render.present_mode.into(),
        };

        for i in 0..count {
            let title = if count > 1 {
                format!("{} #{}", self.cfg.window.title, i + 1)
            } else {
                self.cfg.window.title.clone()
            };
            let attrs = Window::default_attributes()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(
                    self.cfg.window.width,
                    self.cfg.window.height,
                ));
            let window = event_loop
                .create_window(attrs)
                .context("create_window")?;
            let display = window.display_handle()?.as_raw();
            let handle = window.window_handle()?.as_raw();

            // The first window decides which device gets opened.
            let (ctx, surface) = match self.ctx.clone() {
                Some(ctx) => {
                    let surface = ctx.create_surface(display, handle)?;
                    (ctx, surface)
                }
                None => {
                    let (ctx, surface) =
                        DeviceContext::new(display, handle, &requirements, self.sink.clone())
                            .context("vk init")?;
                    info!(
                        device = ctx.device_name(),
                        validation = ctx.validation_enabled(),
                        "device ready"
                    );
                    self.ctx = Some(ctx.clone());
                    (ctx, surface)
                }
            };

            let size = window.inner_size();
            let renderer = VkSurfaceRenderer::new(
                ctx,
                surface,
                RenderSize::new(size.width, size.height),
                &self.scene,
                options,
            )
            .with_context(|| format!("renderer for window {}", i + 1))?;

            self.windows.insert(
                window.id(),
                SurfaceWindow {
                    renderer,
                    translator: SignalTranslator::new(),
                    window,
                },
            );
        }
        info!(windows = self.windows.len(), "windows open");
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.windows.clear();
        self.failure = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.ctx.is_some() || self.failure.is_some() {
            return;
        }
        if let Err(err) = self.open_windows(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let WindowEvent::RedrawRequested = event {
            let result = match self.windows.get_mut(&window_id) {
                Some(w) if !w.renderer.is_idle() => w.renderer.render(),
                _ => return,
            };
            match result {
                Ok(()) => self.frames = self.frames.saturating_add(1),
                Err(err) => self.fail(event_loop, err.context("render")),
            }
            return;
        }

        let signals = match self.windows.get_mut(&window_id) {
            Some(w) => w.translator.translate(&event),
            None => return,
        };
        for signal in signals {
            match signal {
                WindowSignal::Close => {
                    info!(?window_id, "window closed");
                    self.windows.remove(&window_id);
                    if self.windows.is_empty() {
                        event_loop.exit();
                    }
                    return;
                }
                WindowSignal::Quit => {
                    info!("quit requested");
                    self.windows.clear();
                    event_loop.exit();
                    return;
                }
                other => {
                    let Some(w) = self.windows.get_mut(&window_id) else {
                        return;
                    };
                    if let Err(err) = w.renderer.handle_signal(other) {
                        self.fail(event_loop, err);
                        return;
                    }
                }
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.windows.is_empty() {
            return;
        }

        let mut active = false;
        for w in self.windows.values() {
            if !w.renderer.is_idle() {
                w.window.request_redraw();
                active = true;
            }
        }
        // Idle windows sleep until the platform has something to say.
        event_loop.set_control_flow(if active {
            ControlFlow::Poll
        } else {
            ControlFlow::Wait
        });

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            if active {
                info!("fps ~ {}", self.frames);
            }
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.windows.clear();
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = AppConfig::load(&args.config)?;
    args.apply(&mut cfg);
    let scene = scene::load_scene(&cfg.assets)?;

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, scene);
    event_loop.run_app(&mut app)?;

    if let Some(err) = app.failure.take() {
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from(["vigor", "--windows", "3", "--texture", "brick.png"]);
        assert_eq!(args.config, PathBuf::from("vigor.toml"));

        let mut cfg = AppConfig::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.window.count, 3);
        assert_eq!(cfg.assets.texture, Some(PathBuf::from("brick.png")));
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let args = Args::parse_from(["vigor", "--config", "other.toml"]);
        let mut cfg = AppConfig::default();
        args.apply(&mut cfg);
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(args.config, PathBuf::from("other.toml"));
    }
}
