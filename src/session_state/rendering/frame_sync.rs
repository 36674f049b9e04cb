//! # Frame Sync Gate
//!
//! Bounds how many submitted frames the CPU may run ahead of the GPU. Each submitted frame
//! leaves a fence behind; once more than the allowed number are outstanding the oldest is
//! waited on and deleted. This is the only place the session loop deliberately blocks.

use std::collections::VecDeque;

use log::{error, trace};

use crate::error::BackendError;
use crate::session_state::rendering::backend::{FenceHandle, RenderBackend};

/// FIFO of fences for frames the GPU may not have finished yet.
#[derive(Debug, Default)]
pub struct FrameSyncGate {
    in_flight: VecDeque<FenceHandle>,
    eager_sync: bool,
}

impl FrameSyncGate {
    /// Creates a gate. With `eager_sync` every frame waits for the GPU to finish it.
    pub fn new(eager_sync: bool) -> Self {
        Self {
            in_flight: VecDeque::new(),
            eager_sync,
        }
    }

    /// Records a fence after the frame just submitted.
    pub fn on_frame_submitted(&mut self, backend: &mut impl RenderBackend) -> Result<(), BackendError> {
        let fence = backend.create_fence()?;
        trace!("Frame fence {:?} submitted", fence);
        self.in_flight.push_back(fence);
        Ok(())
    }

    /// Waits on the oldest fences until at most `max_ahead` remain.
    ///
    /// # Returns
    /// The number of fences waited on.
    pub fn enforce_bound(
        &mut self,
        backend: &mut impl RenderBackend,
        max_ahead: usize,
    ) -> Result<usize, BackendError> {
        let bound = if self.eager_sync { 0 } else { max_ahead };
        let mut waited = 0;
        while self.in_flight.len() > bound {
            let Some(fence) = self.in_flight.pop_front() else {
                break;
            };
            let result = backend.wait_fence(fence);
            backend.delete_fence(fence);
            result?;
            waited += 1;
        }
        Ok(waited)
    }

    /// Waits on and deletes every outstanding fence.
    ///
    /// Every fence is deleted even when a wait fails; the first failure is returned.
    pub fn teardown(&mut self, backend: &mut impl RenderBackend) -> Result<(), BackendError> {
        let mut first_error = None;
        for fence in self.in_flight.drain(..) {
            if let Err(err) = backend.wait_fence(fence) {
                error!("Waiting on fence {:?} during teardown failed: {}", fence, err);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            backend.delete_fence(fence);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Fences not yet waited on.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether every frame waits for full GPU completion.
    pub fn eager_sync(&self) -> bool {
        self.eager_sync
    }
}
