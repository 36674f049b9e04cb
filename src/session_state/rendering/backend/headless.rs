//! # Headless Backend
//!
//! A [`RenderBackend`] that does the bookkeeping of a GPU without one. Buffers are byte
//! budgets with usage analytics, fences complete as soon as they are waited on, and draws
//! are logged per frame. Used by the headless runner and by tests that need to observe what
//! the core asked the GPU to do.

use std::collections::{HashMap, HashSet};

use crate::error::BackendError;

use super::{BufferHandle, BufferLayout, DrawRegion, FenceHandle, RenderBackend};

/// Analytics for one buffer pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferAnalytics {
    /// Bytes allocated for the pair.
    pub layout: BufferLayout,
    /// Bytes written by the last update.
    pub used_memory: u64,
    /// Number of updates.
    pub times_written: u64,
}

/// One recorded draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// Buffer drawn from.
    pub handle: BufferHandle,
    /// Index range drawn.
    pub region: DrawRegion,
}

/// CPU-only renderer backend.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    buffers: HashMap<BufferHandle, BufferAnalytics>,
    fences: HashSet<FenceHandle>,
    waited_fences: Vec<FenceHandle>,
    draws: Vec<DrawCall>,
    memory_budget: Option<u64>,
    allocated_memory: u64,
    allocations: u64,
}

impl HeadlessBackend {
    /// A backend with unlimited memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that refuses allocations once `bytes` are in use.
    pub fn with_memory_budget(bytes: u64) -> Self {
        Self {
            memory_budget: Some(bytes),
            ..Self::default()
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Analytics for a live buffer.
    pub fn buffer(&self, handle: BufferHandle) -> Option<&BufferAnalytics> {
        self.buffers.get(&handle)
    }

    /// Live buffer pairs.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Live fences.
    pub fn live_fence_count(&self) -> usize {
        self.fences.len()
    }

    /// Every fence waited on, in wait order.
    pub fn waited_fences(&self) -> &[FenceHandle] {
        &self.waited_fences
    }

    /// Bytes currently allocated.
    pub fn allocated_memory(&self) -> u64 {
        self.allocated_memory
    }

    /// Bytes written into live buffers.
    pub fn used_memory(&self) -> u64 {
        self.buffers.values().map(|b| b.used_memory).sum()
    }

    /// Allocations performed since creation.
    pub fn allocation_count(&self) -> u64 {
        self.allocations
    }

    /// Draws recorded since the last call.
    pub fn take_draws(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draws)
    }
}

impl RenderBackend for HeadlessBackend {
    fn allocate_buffer(&mut self, layout: BufferLayout) -> Result<BufferHandle, BackendError> {
        let requested = layout.total_bytes();
        if let Some(budget) = self.memory_budget {
            let available = budget.saturating_sub(self.allocated_memory);
            if requested > available {
                return Err(BackendError::AllocationFailed {
                    requested,
                    available,
                });
            }
        }

        let handle = BufferHandle::new(self.next_id());
        self.allocated_memory += requested;
        self.allocations += 1;
        self.buffers.insert(
            handle,
            BufferAnalytics {
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
        let analytics = self
            .buffers
            .get_mut(&handle)
            .ok_or(BackendError::UnknownBuffer(handle))?;

        for (requested, capacity) in [
            (vertices.len() as u64, analytics.layout.vertex_bytes),
            (indices.len() as u64, analytics.layout.index_bytes),
        ] {
            if requested > capacity {
                return Err(BackendError::OutOfBounds {
                    handle,
                    requested,
                    capacity,
                });
            }
        }

        analytics.used_memory = (vertices.len() + indices.len()) as u64;
        analytics.times_written += 1;
        Ok(())
    }

    fn free_buffer(&mut self, handle: BufferHandle) {
        if let Some(analytics) = self.buffers.remove(&handle) {
            self.allocated_memory -= analytics.layout.total_bytes();
        }
    }

    fn create_fence(&mut self) -> Result<FenceHandle, BackendError> {
        let fence = FenceHandle::new(self.next_id());
        self.fences.insert(fence);
        Ok(fence)
    }

    fn wait_fence(&mut self, fence: FenceHandle) -> Result<(), BackendError> {
        if !self.fences.contains(&fence) {
            return Err(BackendError::UnknownFence(fence));
        }
        self.waited_fences.push(fence);
        Ok(())
    }

    fn delete_fence(&mut self, fence: FenceHandle) {
        self.fences.remove(&fence);
    }

    fn draw_indexed(&mut self, handle: BufferHandle, region: DrawRegion) {
        self.draws.push(DrawCall { handle, region });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: BufferLayout = BufferLayout {
        vertex_bytes: 64,
        index_bytes: 32,
    };

    #[test]
    fn budget_refuses_oversized_allocations() {
        let mut backend = HeadlessBackend::with_memory_budget(100);
        let first = backend.allocate_buffer(LAYOUT).unwrap();

        let err = backend.allocate_buffer(LAYOUT).unwrap_err();
        assert!(matches!(
            err,
            BackendError::AllocationFailed {
                requested: 96,
                available: 4
            }
        ));

        backend.free_buffer(first);
        assert!(backend.allocate_buffer(LAYOUT).is_ok());
    }

    #[test]
    fn updates_are_bounds_checked() {
        let mut backend = HeadlessBackend::new();
        let handle = backend.allocate_buffer(LAYOUT).unwrap();

        backend.update_buffer(handle, &[0; 64], &[0; 8]).unwrap();
        assert_eq!(backend.buffer(handle).unwrap().used_memory, 72);

        let err = backend.update_buffer(handle, &[0; 65], &[]).unwrap_err();
        assert!(matches!(err, BackendError::OutOfBounds { requested: 65, .. }));
    }

    #[test]
    fn fences_are_tracked_until_deleted() {
        let mut backend = HeadlessBackend::new();
        let fence = backend.create_fence().unwrap();
        backend.wait_fence(fence).unwrap();
        backend.delete_fence(fence);

        assert_eq!(backend.live_fence_count(), 0);
        assert_eq!(backend.waited_fences(), &[fence]);
        assert!(backend.wait_fence(fence).is_err());
    }
}
