//! Swap-completion driven presentation loop.
//!
//! The loop is a trampoline: each tick draws at most once, requests exactly
//! one swap and returns. The next tick only happens when the host delivers
//! that swap's completion through [`PresentationLoop::on_swap_complete`], so
//! at most one swap is ever outstanding and the stack never grows.
//!
//! ```text
//!   kick() ──► tick ──► swap_buffers(ticket) ─ ─ ─► host ─ ─ ─┐
//!               ▲                                             │
//!               └──────── on_swap_complete(ticket, 0) ◄───────┘
//! ```
//!
//! Every attached surface gets a new generation. Completions carrying an
//! older generation belong to a destroyed surface and are dropped, and a
//! non-zero completion status ends the loop.

use std::sync::Arc;

use crate::config::{Color, PresenterConfig};
use crate::error::PlayerError;
use crate::frame::FrameBuffer;
use crate::handoff::HandoffQueue;
use crate::mode::RenderMode;

/// One-shot continuation token handed to the surface with each swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapTicket {
    /// Surface generation the swap was issued for
    pub generation: u64,
    /// Swap sequence number within the loop
    pub sequence: u64,
}

impl SwapTicket {
    /// Builds the completion for this ticket.
    pub fn complete(self, status: i32) -> SwapCompletion {
        SwapCompletion {
            ticket: self,
            status,
        }
    }
}

/// Delivered by the host once a requested swap has been presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapCompletion {
    pub ticket: SwapTicket,
    /// Zero on success; anything else means the surface is unusable
    pub status: i32,
}

/// GPU drawing surface bound to the plugin's visible region.
///
/// Driven only from the presentation context, so implementations need not be
/// `Send`.
pub trait PresentationSurface {
    /// Current size in pixels.
    fn size(&self) -> (u32, u32);

    /// Resizes the backing storage.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), PlayerError>;

    /// Sets the viewport to the full surface and clears it.
    fn clear(&mut self, color: Color);

    /// Uploads a frame as the texture the blit program samples.
    fn upload_frame(&mut self, frame: &FrameBuffer) -> Result<(), PlayerError>;

    /// Builds the blit program. Called once per surface lifetime.
    fn compile_blit_program(&mut self) -> Result<(), PlayerError>;

    /// Draws the uploaded texture over the full viewport.
    fn draw_fullscreen_quad(&mut self) -> Result<(), PlayerError>;

    /// Presents and arranges for `ticket` to come back exactly once.
    fn swap_buffers(&mut self, ticket: SwapTicket) -> Result<(), PlayerError>;
}

/// What a completion or kick did to the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// A new swap was requested
    Continued,
    /// The loop ended; nothing is outstanding
    Stopped,
    /// Stale or unexpected completion, or a kick while already running
    Ignored,
}

/// Presentation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenterStats {
    pub frames_presented: u64,
    /// Ticks that found no frame and only swapped
    pub idle_ticks: u64,
    pub upload_failures: u64,
    pub swaps_requested: u64,
    pub stale_completions: u64,
}

/// Single-threaded cooperative presentation loop.
pub struct PresentationLoop {
    config: PresenterConfig,
    mode: RenderMode,
    surface: Option<Box<dyn PresentationSurface>>,
    generation: u64,
    next_sequence: u64,
    in_flight: Option<SwapTicket>,
    needs_clear: bool,
    program_ready: bool,
    frames: Option<Arc<HandoffQueue>>,
    stats: PresenterStats,
}

impl PresentationLoop {
    pub fn new(config: PresenterConfig) -> Self {
        Self {
            config,
            mode: RenderMode::Composited,
            surface: None,
            generation: 0,
            next_sequence: 0,
            in_flight: None,
            needs_clear: true,
            program_ready: false,
            frames: None,
            stats: PresenterStats::default(),
        }
    }

    /// Binds a new surface. Any outstanding swap on the old one is abandoned.
    pub fn attach_surface(&mut self, surface: Box<dyn PresentationSurface>) {
        self.generation += 1;
        let (w, h) = surface.size();
        tracing::debug!("presenter: surface attached {}x{} (generation {})", w, h, self.generation);
        self.surface = Some(surface);
        self.in_flight = None;
        self.needs_clear = true;
        self.program_ready = false;
    }

    /// Drops the surface and the program built for it.
    pub fn detach_surface(&mut self) -> Option<Box<dyn PresentationSurface>> {
        self.in_flight = None;
        self.program_ready = false;
        let surface = self.surface.take();
        if surface.is_some() {
            tracing::debug!("presenter: surface detached (generation {})", self.generation);
        }
        surface
    }

    /// Resizes the surface; the next tick clears and resets the viewport.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), PlayerError> {
        let Some(surface) = self.surface.as_mut() else {
            return Err(PlayerError::Surface("no surface to resize".into()));
        };
        surface.resize(width, height)?;
        self.needs_clear = true;
        Ok(())
    }

    /// Switches the drawing branch for a new session.
    pub fn set_mode(&mut self, mode: RenderMode) {
        if self.mode != mode {
            self.mode = mode;
            self.needs_clear = true;
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Sets the queue composited ticks pull from.
    pub fn set_frames(&mut self, frames: Option<Arc<HandoffQueue>>) {
        self.frames = frames;
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// True while a swap is outstanding.
    pub fn is_running(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Current surface generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> PresenterStats {
        self.stats
    }

    /// Starts the loop if a surface exists and no swap is outstanding.
    pub fn kick(&mut self) -> LoopStatus {
        if self.in_flight.is_some() {
            return LoopStatus::Ignored;
        }
        self.tick()
    }

    /// Handles a swap completion from the host.
    pub fn on_swap_complete(&mut self, completion: SwapCompletion) -> LoopStatus {
        if self.in_flight != Some(completion.ticket) {
            self.stats.stale_completions += 1;
            tracing::trace!("presenter: stale completion {:?}", completion.ticket);
            return LoopStatus::Ignored;
        }
        self.in_flight = None;
        if completion.status != 0 {
            tracing::debug!("presenter: swap returned {}, loop ends", completion.status);
            return LoopStatus::Stopped;
        }
        self.tick()
    }

    fn tick(&mut self) -> LoopStatus {
        let Some(surface) = self.surface.as_mut() else {
            return LoopStatus::Stopped;
        };

        if self.needs_clear {
            let color = match self.mode {
                RenderMode::HolePunch => self.config.color_key,
                RenderMode::Composited => self.config.background,
            };
            surface.clear(color);
            self.needs_clear = false;
        }

        if self.mode == RenderMode::Composited {
            match self.frames.as_ref().and_then(|q| q.try_pop()) {
                Some(frame) => {
                    match present_frame(&mut **surface, &mut self.program_ready, &frame) {
                        Ok(()) => self.stats.frames_presented += 1,
                        Err(e) => {
                            self.stats.upload_failures += 1;
                            tracing::warn!("presenter: dropping frame {}: {}", frame.sequence, e);
                        }
                    }
                    // frame released here, after upload
                }
                None => self.stats.idle_ticks += 1,
            }
        }

        let ticket = SwapTicket {
            generation: self.generation,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        match surface.swap_buffers(ticket) {
            Ok(()) => {
                self.in_flight = Some(ticket);
                self.stats.swaps_requested += 1;
                LoopStatus::Continued
            }
            Err(e) => {
                tracing::warn!("presenter: swap request failed, loop ends: {}", e);
                LoopStatus::Stopped
            }
        }
    }
}

fn present_frame(
    surface: &mut dyn PresentationSurface,
    program_ready: &mut bool,
    frame: &FrameBuffer,
) -> Result<(), PlayerError> {
    surface.upload_frame(frame)?;
    if !*program_ready {
        surface.compile_blit_program()?;
        *program_ready = true;
    }
    surface.draw_fullscreen_quad()
}
