//! # Voxel Session Entry Point
//!
//! Runs a windowless session through the library's `run()` function.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info VOXEL_SESSION_FRAMES=1200 cargo run --release
//! ```

fn main() {
    #[cfg(not(target_family = "wasm"))]
    if let Err(err) = voxel_session::run() {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
