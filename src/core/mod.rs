//! # Core Module
//!
//! Shared-ownership primitives used between the session thread and the mesh workers.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking

mod mt_resource;

pub use mt_resource::MtResource;
