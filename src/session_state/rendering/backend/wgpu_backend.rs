//! # wgpu Backend
//!
//! [`RenderBackend`] on top of a wgpu device and queue.
//!
//! ## Mapping
//!
//! * A buffer handle names a vertex buffer and an index buffer, each created with
//!   `COPY_DST` so updates go through `Queue::write_buffer`.
//! * A fence is the submission index of an empty submit; waiting polls the device until that
//!   submission is done.
//! * Draws are recorded and replayed into the host's render pass by [`WgpuBackend::encode_draws`],
//!   since the host owns pipelines, bind groups and the surface.

use std::collections::HashMap;

use log::{debug, info};
use wgpu::{Buffer, Device, Queue, SubmissionIndex};

use crate::error::BackendError;

use super::{BufferHandle, BufferLayout, DrawRegion, FenceHandle, RenderBackend};

/// GPU buffers behind one handle plus their usage analytics.
#[derive(Debug)]
struct GpuMeshBuffers {
    vertex: Buffer,
    index: Buffer,
    layout: BufferLayout,
    used_memory: u64,
    times_written: u64,
}

/// Renderer backend owning a wgpu device.
pub struct WgpuBackend {
    device: Device,
    queue: Queue,
    buffers: HashMap<BufferHandle, GpuMeshBuffers>,
    fences: HashMap<FenceHandle, SubmissionIndex>,
    draws: Vec<(BufferHandle, DrawRegion)>,
    next_id: u64,
}

impl WgpuBackend {
    /// Wraps a device and queue created by the host.
    pub fn new(device: Device, queue: Queue) -> Self {
        Self {
            device,
            queue,
            buffers: HashMap::new(),
            fences: HashMap::new(),
            draws: Vec::new(),
            next_id: 0,
        }
    }

    /// Creates a device on the default adapter without a surface.
    pub async fn request_headless() -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|err| BackendError::Device(err.to_string()))?;
        info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("voxel-session device"),
                ..Default::default()
            })
            .await
            .map_err(|err| BackendError::Device(err.to_string()))?;
        Ok(Self::new(device, queue))
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn create_gpu_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Replays the draws recorded since the last call into `pass` and clears them.
    ///
    /// The pass must already have the chunk pipeline and bind groups set.
    pub fn encode_draws(&mut self, pass: &mut wgpu::RenderPass<'_>) {
        for (handle, region) in self.draws.drain(..) {
            let Some(buffers) = self.buffers.get(&handle) else {
                continue;
            };
            pass.set_vertex_buffer(0, buffers.vertex.slice(..));
            pass.set_index_buffer(buffers.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(
                region.first_index..region.first_index + region.index_count,
                0,
                0..1,
            );
        }
    }

    /// Discards recorded draws without encoding them.
    pub fn clear_draws(&mut self) -> usize {
        let count = self.draws.len();
        self.draws.clear();
        count
    }

    /// Bytes allocated across all buffers.
    pub fn get_total_allocated_memory(&self) -> u64 {
        self.buffers.values().map(|b| b.layout.total_bytes()).sum()
    }

    /// Bytes written by the latest update of every buffer.
    pub fn get_total_used_memory(&self) -> u64 {
        self.buffers.values().map(|b| b.used_memory).sum()
    }

    /// Updates performed across all live buffers.
    pub fn get_total_writes(&self) -> u64 {
        self.buffers.values().map(|b| b.times_written).sum()
    }

    /// The device, for hosts that build pipelines against it.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The queue, for hosts that submit their own work.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }
}

impl RenderBackend for WgpuBackend {
    fn allocate_buffer(&mut self, layout: BufferLayout) -> Result<BufferHandle, BackendError> {
        let limit = self.device.limits().max_buffer_size;
        let requested = layout.vertex_bytes.max(layout.index_bytes);
        if requested > limit {
            return Err(BackendError::AllocationFailed {
                requested,
                available: limit,
            });
        }

        let vertex =
            self.create_gpu_buffer("chunk vertices", layout.vertex_bytes, wgpu::BufferUsages::VERTEX);
        let index =
            self.create_gpu_buffer("chunk indices", layout.index_bytes, wgpu::BufferUsages::INDEX);
        let handle = BufferHandle::new(self.next_id());
        self.buffers.insert(
            handle,
            GpuMeshBuffers {
                vertex,
                index,
                layout,
                used_memory: 0,
                times_written: 0,
            },
        );
        Ok(handle)
    }

    fn update_buffer(
        &mut self,
        handle: BufferHandle,
        vertices: &[u8],
        indices: &[u8],
    ) -> Result<(), BackendError> {
        let buffers = self
            .buffers
            .get_mut(&handle)
            .ok_or(BackendError::UnknownBuffer(handle))?;

        for (data, capacity) in [
            (vertices, buffers.layout.vertex_bytes),
            (indices, buffers.layout.index_bytes),
        ] {
            if data.len() as u64 > capacity {
                return Err(BackendError::OutOfBounds {
                    handle,
                    requested: data.len() as u64,
                    capacity,
                });
            }
        }

        if !vertices.is_empty() {
            self.queue.write_buffer(&buffers.vertex, 0, vertices);
        }
        if !indices.is_empty() {
            self.queue.write_buffer(&buffers.index, 0, indices);
        }
        buffers.used_memory = (vertices.len() + indices.len()) as u64;
        buffers.times_written += 1;
        Ok(())
    }

    fn free_buffer(&mut self, handle: BufferHandle) {
        if let Some(buffers) = self.buffers.remove(&handle) {
            buffers.vertex.destroy();
            buffers.index.destroy();
        }
    }

    fn create_fence(&mut self) -> Result<FenceHandle, BackendError> {
        let index = self.queue.submit(std::iter::empty());
        let fence = FenceHandle::new(self.next_id());
        self.fences.insert(fence, index);
        Ok(fence)
    }

    fn wait_fence(&mut self, fence: FenceHandle) -> Result<(), BackendError> {
        let index = self
            .fences
            .get(&fence)
            .cloned()
            .ok_or(BackendError::UnknownFence(fence))?;
        let status = self
            .device
            .poll(wgpu::PollType::WaitForSubmissionIndex(index))
            .map_err(|err| BackendError::Device(err.to_string()))?;
        debug!("Fence {:?} retired: {:?}", fence, status);
        Ok(())
    }

    fn delete_fence(&mut self, fence: FenceHandle) {
        self.fences.remove(&fence);
    }

    fn draw_indexed(&mut self, handle: BufferHandle, region: DrawRegion) {
        self.draws.push((handle, region));
    }
}
