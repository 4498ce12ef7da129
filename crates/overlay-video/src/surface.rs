//! Host-side factory for presentation surfaces.

use crossbeam_channel::Receiver;
use overlay_video_core::{PlayerError, PresentationSurface, SwapCompletion};

/// Creates the GPU surface the presentation loop draws into.
pub trait SurfaceProvider {
    /// Checks that the GPU can back a surface at all.
    ///
    /// A failure here is fatal for the plugin instance.
    fn probe(&self) -> Result<(), PlayerError> {
        Ok(())
    }

    /// Creates a surface of the given size. Called on first resize and after
    /// the previous surface was lost.
    fn create_surface(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn PresentationSurface>, PlayerError>;

    /// Channel swap completions arrive on, for surfaces that complete on
    /// another thread. Surfaces that complete inline return `None`.
    fn completions(&self) -> Option<Receiver<SwapCompletion>> {
        None
    }
}
