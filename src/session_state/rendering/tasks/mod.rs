//! Background tasks for the rendering system.
//!
//! # Available Tasks
//! - `MeshBuildTask`: Builds a chunk mesh from a snapshot of the chunk and its neighbours

pub mod mesh_build_task;
