#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

//! # Voxel Session
//!
//! The streaming and frame pacing core of a voxel-world client, built with Rust and WGPU.
//!
//! Given a camera, a session keeps the chunks around it loaded, meshes them on a worker
//! pool, uploads the meshes to GPU buffers at a bounded rate, draws the visible ones in a
//! stable order and keeps the CPU from running too many frames ahead of the GPU.
//!
//! ## Key Modules
//!
//! * `config` - Session options, loaded from JSON
//! * `error` - Error types returned by the session and its collaborators
//! * `core` - Shared-ownership primitives used between the session and its workers
//! * `session_state` - The session itself: chunks, meshing, uploads, visibility and frame sync
//!
//! ## Usage
//!
//! A host owns a [`session_state::SessionState`] over some
//! [`session_state::rendering::backend::RenderBackend`] and, once per frame, moves its camera
//! and calls `tick` followed by `render`:
//!
//! ```ignore
//! let mut session = SessionState::new(options, HeadlessBackend::new(), Box::new(MemoryPersistence::new()))?;
//! loop {
//!     session.tick(dt, &camera)?;
//!     let visible = session.render()?;
//! }
//! ```
//!
//! The bundled binary runs a session without a window, see [`run`].

use log::info;

pub mod config;
pub mod core;
pub mod error;
pub mod session_state;

#[cfg(not(target_family = "wasm"))]
pub use headless_run::run;

/// Environment variable naming a JSON options file for [`run`].
pub const CONFIG_ENV: &str = "VOXEL_SESSION_CONFIG";

/// Environment variable holding the number of frames [`run`] simulates.
pub const FRAMES_ENV: &str = "VOXEL_SESSION_FRAMES";

/// Initializes logging once. Later calls do nothing.
///
/// Native builds log to stdout through `env_logger`, filtered by `RUST_LOG`. Web builds
/// log to the browser console and report panics there.
pub fn init_logging() {
    cfg_if::cfg_if! {
        if #[cfg(target_family = "wasm")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            if console_log::init_with_level(log::Level::Info).is_err() {
                return;
            }
        } else {
            let mut log_builder = env_logger::Builder::new();
            if log_builder
                .target(env_logger::Target::Stdout)
                .parse_env("RUST_LOG")
                .try_init()
                .is_err()
            {
                return;
            }
        }
    }
    info!("Logger initialized");
}

#[cfg(not(target_family = "wasm"))]
mod headless_run {
    use cgmath::{Deg, Point3};
    use log::info;
    use web_time::Duration;

    use crate::config::{BackendKind, SessionOptions};
    use crate::error::SessionError;
    use crate::session_state::camera_state::camera::Camera;
    use crate::session_state::rendering::backend::{HeadlessBackend, RenderBackend, WgpuBackend};
    use crate::session_state::voxels::persistence::{
        ChunkPersistence, DiskPersistence, MemoryPersistence,
    };
    use crate::session_state::{SessionState, SessionStats};
    use crate::{init_logging, CONFIG_ENV, FRAMES_ENV};

    /// Frames simulated when [`FRAMES_ENV`] is unset.
    const DEFAULT_FRAMES: u64 = 600;

    /// Simulated frame time.
    const FRAME_TIME: Duration = Duration::from_millis(16);

    /// Camera speed in blocks per second.
    const FLY_SPEED: f32 = 12.0;

    /// Frames between stats log lines.
    const STATS_INTERVAL: u64 = 60;

    /// Runs a session without a window: flies a camera through the world for a number of
    /// frames, logging stats along the way, then shuts the session down.
    ///
    /// Options come from the JSON file named by [`CONFIG_ENV`] (defaults when unset) and the
    /// frame count from [`FRAMES_ENV`]. Chunks are saved under `worldDir` when it is set.
    ///
    /// # Errors
    /// Any fatal [`SessionError`].
    pub fn run() -> Result<(), SessionError> {
        init_logging();

        let options = match std::env::var_os(CONFIG_ENV) {
            Some(path) => SessionOptions::from_json_file(path)?,
            None => SessionOptions::default(),
        };
        let frames = std::env::var(FRAMES_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_FRAMES);
        let persistence: Box<dyn ChunkPersistence> = match &options.world_dir {
            Some(dir) => Box::new(DiskPersistence::new(dir)?),
            None => Box::new(MemoryPersistence::new()),
        };

        match options.backend {
            BackendKind::Headless => {
                let session = SessionState::new(options, HeadlessBackend::new(), persistence)?;
                fly(session, frames, |backend| {
                    backend.take_draws();
                })
            }
            BackendKind::Wgpu => {
                let backend = pollster::block_on(WgpuBackend::request_headless())
                    .map_err(SessionError::resource)?;
                let session = SessionState::new(options, backend, persistence)?;
                fly(session, frames, |backend| {
                    backend.clear_draws();
                })
            }
        }
    }

    fn fly<B: RenderBackend>(
        mut session: SessionState<B>,
        frames: u64,
        mut end_frame: impl FnMut(&mut B),
    ) -> Result<(), SessionError> {
        let mut camera = Camera::new(Point3::new(8.0, 24.0, 8.0), Deg(0.0), Deg(-10.0));

        for frame in 0..frames {
            camera.advance(FLY_SPEED * FRAME_TIME.as_secs_f32());
            camera.rotate(Deg(0.05), Deg(0.0));
            session.tick(FRAME_TIME, &camera)?;
            session.render()?;
            end_frame(session.backend_mut());

            if frame % STATS_INTERVAL == 0 {
                log_stats(frame, &session.stats());
            }
        }

        log_stats(frames, &session.stats());
        session.shutdown()
    }

    fn log_stats(frame: u64, stats: &SessionStats) {
        info!(
            "Frame {}: {} chunks ({} visible), {} quads ({} visible, {:.2} MiB), {} pending uploads, {} builds in flight, {} dirty, {} chunk updates, {} fences",
            frame,
            stats.chunk_count,
            stats.visible_chunk_count,
            stats.total_quads,
            stats.visible_quads,
            stats.vertex_mib,
            stats.pending_uploads,
            stats.builds_in_flight,
            stats.dirty_chunks,
            stats.chunk_update_counter,
            stats.fences_in_flight,
        );
    }
}
