//! overlay-video Demo Application
//!
//! Hosts a player instance inside an egui window. Without the `gstreamer`
//! feature the player runs the built-in color-bar engine.

use eframe::egui_wgpu::{self, wgpu};
use overlay_video::core::EngineFactory;
use overlay_video::{
    InputEvent, PlayerConfig, PlayerInstance, SurfaceTarget, WgpuSurfaceProvider, WindowRect,
};

#[cfg(feature = "gstreamer")]
const DEFAULT_URI: &str =
    "https://download.blender.org/peach/bigbuckbunny_movies/BigBuckBunny_320x180.mp4";
#[cfg(not(feature = "gstreamer"))]
const DEFAULT_URI: &str = "pattern://bars";

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("overlay_video=debug".parse().unwrap())
                .add_directive("overlay_video_core=debug".parse().unwrap())
                .add_directive("overlay_video_demo=debug".parse().unwrap()),
        )
        .init();

    let uri = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URI.to_string());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([960.0, 640.0])
            .with_title("overlay-video Demo"),
        ..Default::default()
    };

    eframe::run_native(
        "overlay-video Demo",
        options,
        Box::new(move |cc| Ok(Box::new(DemoApp::new(cc, uri)))),
    )
}

fn engine_factory(config: &PlayerConfig) -> Box<dyn EngineFactory> {
    #[cfg(feature = "gstreamer")]
    {
        Box::new(overlay_video::core::GstEngineFactory::new(config.session.clone()))
    }
    #[cfg(not(feature = "gstreamer"))]
    {
        let _ = config;
        Box::new(overlay_video::core::PatternEngineFactory::new(
            overlay_video::core::PatternConfig::default(),
        ))
    }
}

/// Texture registered with the egui renderer for the player's target.
struct HostTexture {
    id: egui::TextureId,
    revision: u64,
}

struct DemoApp {
    player: Option<PlayerInstance>,
    target: Option<SurfaceTarget>,
    texture: Option<HostTexture>,
    uri: String,
    hole: bool,
    /// Last view handed to the player, in physical pixels
    view: Option<WindowRect>,
    last_error: Option<String>,
}

impl DemoApp {
    fn new(cc: &eframe::CreationContext<'_>, uri: String) -> Self {
        let mut app = Self {
            player: None,
            target: None,
            texture: None,
            uri,
            hole: false,
            view: None,
            last_error: None,
        };
        match cc.wgpu_render_state.as_ref() {
            Some(render_state) => app.rebuild(render_state),
            None => app.last_error = Some("wgpu renderer unavailable".into()),
        }
        app
    }

    /// Replaces the player instance, e.g. after the render mode changed.
    fn rebuild(&mut self, render_state: &egui_wgpu::RenderState) {
        self.player = None;
        if let Some(texture) = self.texture.take() {
            render_state.renderer.write().free_texture(&texture.id);
        }
        self.view = None;

        let config = PlayerConfig::new().with_hole(self.hole);
        let surfaces = WgpuSurfaceProvider::new(
            std::sync::Arc::new(render_state.device.clone()),
            std::sync::Arc::new(render_state.queue.clone()),
            render_state.target_format,
        );
        let target = surfaces.target();
        let engines = engine_factory(&config);

        let mut player = match PlayerInstance::new(config, engines, Box::new(surfaces)) {
            Ok(player) => player,
            Err(e) => {
                tracing::error!("player unavailable: {}", e);
                self.last_error = Some(e.to_string());
                return;
            }
        };
        let hole = if self.hole { "true" } else { "false" };
        if let Err(e) = player.init([("src", self.uri.as_str()), ("hole", hole)]) {
            tracing::warn!("initial playback failed: {}", e);
            self.last_error = Some(e.to_string());
        } else {
            self.last_error = None;
        }
        self.player = Some(player);
        self.target = Some(target);
    }

    fn send(&mut self, message: &str) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        match player.handle_message(message) {
            Ok(()) => self.last_error = None,
            Err(e) => {
                tracing::warn!("{} failed: {}", message, e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn load(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.set_source_uri(self.uri.clone());
        }
        self.send("stop()");
        self.send("playPause()");
    }

    /// Registers or refreshes the egui texture for the current target.
    fn sync_texture(&mut self, render_state: &egui_wgpu::RenderState) -> Option<egui::TextureId> {
        let current = self.target.as_ref()?.current()?;
        let mut renderer = render_state.renderer.write();
        match self.texture.as_mut() {
            Some(texture) if texture.revision == current.revision => {}
            Some(texture) => {
                renderer.update_egui_texture_from_wgpu_texture(
                    &render_state.device,
                    &current.view,
                    wgpu::FilterMode::Linear,
                    texture.id,
                );
                texture.revision = current.revision;
            }
            None => {
                let id = renderer.register_native_texture(
                    &render_state.device,
                    &current.view,
                    wgpu::FilterMode::Linear,
                );
                self.texture = Some(HostTexture {
                    id,
                    revision: current.revision,
                });
            }
        }
        self.texture.as_ref().map(|t| t.id)
    }

    fn resize_view(&mut self, view: WindowRect) {
        if self.view == Some(view) {
            return;
        }
        let Some(player) = self.player.as_mut() else {
            return;
        };
        match player.resize_surface(view) {
            Ok(()) => self.view = Some(view),
            Err(e) => {
                tracing::warn!("resize to {}x{} failed: {}", view.width, view.height, e);
                self.last_error = Some(e.to_string());
            }
        }
    }
}

impl eframe::App for DemoApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        if let Some(player) = self.player.as_mut() {
            player.pump_swap_completions();
        }

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Source:");
                let edit = ui.add(egui::TextEdit::singleline(&mut self.uri).desired_width(360.0));
                let submitted = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("Load").clicked() || submitted {
                    self.load();
                }
                if ui.button("Play/Pause").clicked() {
                    self.send("playPause()");
                }
                if ui.button("Stop").clicked() {
                    self.send("stop()");
                }
                if ui.checkbox(&mut self.hole, "Hole punch").changed() {
                    if let Some(render_state) = frame.wgpu_render_state() {
                        self.rebuild(render_state);
                    }
                }
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| match self.player.as_ref() {
                Some(player) => {
                    let stats = player.presenter_stats();
                    ui.label(format!("state: {}", player.state()));
                    if let Some(id) = player.session_id() {
                        ui.label(format!("session {id}"));
                    }
                    ui.label(format!(
                        "presented {} / idle {} / dropped {}",
                        stats.frames_presented, stats.idle_ticks, stats.upload_failures
                    ));
                    if let Some(status) = player.session().map(|s| s.status()) {
                        if status.buffering_percent < 100 {
                            ui.label(format!("buffering {}%", status.buffering_percent));
                        }
                    }
                }
                None => {
                    ui.label("no player");
                }
            });
            if let Some(err) = &self.last_error {
                ui.colored_label(egui::Color32::LIGHT_RED, err);
            }
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let available = ui.available_size();
                let ppp = ctx.pixels_per_point();
                let view = WindowRect::from_size(
                    (available.x * ppp).round() as u32,
                    (available.y * ppp).round() as u32,
                );
                self.resize_view(view);

                let Some(render_state) = frame.wgpu_render_state() else {
                    return;
                };
                let Some(texture) = self.sync_texture(render_state) else {
                    return;
                };
                let image = egui::Image::new(egui::load::SizedTexture::new(texture, available))
                    .sense(egui::Sense::click());
                if ui.add(image).clicked() {
                    if let Some(player) = self.player.as_mut() {
                        let fullscreen = player.on_input_event(InputEvent::MouseUp);
                        ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(fullscreen));
                    }
                }
            });

        ctx.request_repaint();
    }
}
