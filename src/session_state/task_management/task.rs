//! # Task Trait
//!
//! A [`Task`] is a self-contained unit of work run on a worker thread. It owns (or shares
//! through [`crate::core::MtResource`]) everything it reads, and its output travels back to
//! the session thread through the [`super::TaskManager`] that ran it.

/// A unit of work that can be executed on a worker thread.
///
/// # Implementation Guidelines
/// - Must be `Send` to be transferred to the worker
/// - Should be coarse-grained enough to amortize scheduling overhead
/// - Must not touch session-thread-only state; everything it needs is captured up front
pub trait Task: Send {
    /// Value sent back to the session thread.
    type Output: Send + 'static;

    /// Performs the work. Runs on a worker thread.
    fn process(&self) -> Self::Output;

    /// Output sent back when [`Task::process`] panics. The default sends nothing.
    fn on_panic(&self) -> Option<Self::Output> {
        None
    }
}
