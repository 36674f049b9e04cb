//! # Rendering
//!
//! Everything between a chunk's voxel data and a draw call:
//!
//! - [`meshing`]: builds [`meshing::MeshBatch`]es from chunk data
//! - [`tasks`]: runs mesh builds on the worker pool
//! - [`upload_scheduler`]: moves batches into per-chunk GPU buffers, a few per tick
//! - [`visibility`]: frustum culls and orders uploaded chunks
//! - [`frame_sync`]: bounds how far the CPU runs ahead of the GPU
//! - [`backend`]: the GPU operations the above rely on

pub mod backend;
pub mod frame_sync;
pub mod meshing;
pub mod tasks;
pub mod upload_scheduler;
pub mod vertex;
pub mod visibility;
