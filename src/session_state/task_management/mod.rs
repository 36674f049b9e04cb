//! # Task Management System
//!
//! A small worker pool for executing [`Task`]s off the session thread, used for mesh
//! building.
//!
//! ## Platform-Specific Behavior
//!
//! ### Native
//! - One `std::thread` per worker, each fed by a dedicated channel
//! - Workers are joined when the manager shuts down
//!
//! ### Web (WASM)
//! - Workers are spawned through `wasm_thread` as Web Workers
//! - The browser main thread may not block, so workers are detached instead of joined
//!
//! ## Task Lifecycle
//! 1. A task is handed to [`TaskManager::publish_task`]
//! 2. The manager sends it to a free worker (round-robin) or queues it
//! 3. The worker runs [`Task::process`] and sends the output back
//! 4. [`TaskManager::collect_completed`] drains outputs on the session thread
//! 5. [`TaskManager::process_queued_tasks`] feeds queued tasks to workers that became free
//!
//! A task that panics is logged and sends whatever [`Task::on_panic`] reports; its worker
//! keeps running.

pub mod task;

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};

use log::{debug, error};
use task::Task;

cfg_if::cfg_if! {
    if #[cfg(target_family = "wasm")] {
        use wasm_thread::{self as thread, JoinHandle};
    } else {
        use std::thread::{self, JoinHandle};
    }
}

/// Boxed task producing `R`.
pub type BoxedTask<R> = Box<dyn Task<Output = R>>;

/// Maximum number of tasks that can be in flight per worker channel.
///
/// Kept at 1 so that a busy worker never has a backlog; waiting work stays in the
/// manager's queue where it can still be inspected.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

/// A communication channel between the session thread and one worker.
struct TaskChannel<R> {
    task_sender: Option<Sender<BoxedTask<R>>>,
    result_receiver: Receiver<Option<R>>,
    num_tasks_in_flight: usize,
    worker: Option<JoinHandle<()>>,
}

/// Manages a pool of worker threads and coordinates task execution.
pub struct TaskManager<R> {
    channels: Vec<TaskChannel<R>>,
    queued_tasks: VecDeque<BoxedTask<R>>,
    current_channel: usize,
}

impl<R: Send + 'static> TaskManager<R> {
    /// Creates a new `TaskManager` with the specified number of worker threads.
    ///
    /// # Arguments
    /// * `num_workers` - Number of worker threads to create. With zero workers every task
    ///   stays queued.
    ///
    /// # Errors
    /// Returns the spawn error when the platform refuses to create a worker thread.
    pub fn new(num_workers: usize) -> std::io::Result<Self> {
        let mut channels = Vec::with_capacity(num_workers);

        for index in 0..num_workers {
            let (task_tx, task_rx) = channel::<BoxedTask<R>>();
            let (result_tx, result_rx) = channel::<Option<R>>();

            let worker = thread::Builder::new()
                .name(format!("task-worker-{index}"))
                .spawn(move || {
                    while let Ok(task) = task_rx.recv() {
                        let output = match catch_unwind(AssertUnwindSafe(|| task.process())) {
                            Ok(output) => Some(output),
                            Err(_) => {
                                error!("Task panicked on worker {index}");
                                task.on_panic()
                            }
                        };
                        if result_tx.send(output).is_err() {
                            break;
                        }
                    }
                })?;

            channels.push(TaskChannel {
                task_sender: Some(task_tx),
                result_receiver: result_rx,
                num_tasks_in_flight: 0,
                worker: Some(worker),
            });
        }

        debug!("Started {num_workers} task workers");

        Ok(TaskManager {
            channels,
            queued_tasks: VecDeque::new(),
            current_channel: 0,
        })
    }

    /// Attempts to send a task to a specific worker channel.
    ///
    /// # Returns
    /// The task back if the worker has disconnected.
    fn try_send_task(&mut self, task: BoxedTask<R>, channel_idx: usize) -> Result<(), BoxedTask<R>> {
        let channel = &mut self.channels[channel_idx];
        let Some(sender) = &channel.task_sender else {
            return Err(task);
        };
        match sender.send(task) {
            Ok(()) => {
                channel.num_tasks_in_flight += 1;
                Ok(())
            }
            Err(err) => Err(err.0),
        }
    }

    /// Finds the next channel, round-robin from the last used one, that can take a task.
    fn find_available_channel(&self) -> Option<usize> {
        let count = self.channels.len();
        (0..count)
            .map(|offset| (self.current_channel + offset) % count)
            .find(|&idx| {
                let channel = &self.channels[idx];
                channel.task_sender.is_some() && channel.num_tasks_in_flight < MAX_TASKS_IN_FLIGHT
            })
    }

    /// Publishes a task for execution.
    ///
    /// # Returns
    /// `true` if the task went straight to a worker, `false` if it was queued.
    pub fn publish_task(&mut self, task: BoxedTask<R>) -> bool {
        let Some(channel_idx) = self.find_available_channel() else {
            self.queued_tasks.push_back(task);
            return false;
        };
        match self.try_send_task(task, channel_idx) {
            Ok(()) => {
                self.current_channel = (channel_idx + 1) % self.channels.len();
                true
            }
            Err(task) => {
                self.queued_tasks.push_back(task);
                false
            }
        }
    }

    /// Sends queued tasks, oldest first, to workers that have become free.
    pub fn process_queued_tasks(&mut self) {
        while !self.queued_tasks.is_empty() {
            let Some(channel_idx) = self.find_available_channel() else {
                return;
            };
            let Some(task) = self.queued_tasks.pop_front() else {
                return;
            };
            if let Err(task) = self.try_send_task(task, channel_idx) {
                error!("Task worker {channel_idx} disconnected");
                self.channels[channel_idx].task_sender = None;
                self.queued_tasks.push_front(task);
                continue;
            }
            self.current_channel = (channel_idx + 1) % self.channels.len();
        }
    }

    /// Drains the outputs of every finished task without blocking.
    pub fn collect_completed(&mut self) -> Vec<R> {
        let mut outputs = Vec::new();
        for channel in &mut self.channels {
            while let Ok(output) = channel.result_receiver.try_recv() {
                channel.num_tasks_in_flight = channel.num_tasks_in_flight.saturating_sub(1);
                outputs.extend(output);
            }
        }
        outputs
    }

    /// Tasks currently running on a worker.
    pub fn in_flight_count(&self) -> usize {
        self.channels.iter().map(|c| c.num_tasks_in_flight).sum()
    }

    /// Tasks waiting for a free worker.
    pub fn queued_count(&self) -> usize {
        self.queued_tasks.len()
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.channels.len()
    }

    /// Drops queued tasks, disconnects every worker and waits for native workers to exit.
    ///
    /// Outputs of tasks still running are discarded. Calling this more than once is a no-op.
    pub fn shutdown(&mut self) {
        self.queued_tasks.clear();
        for channel in &mut self.channels {
            channel.task_sender = None;
        }
        for channel in &mut self.channels {
            if let Some(worker) = channel.worker.take() {
                join_worker(worker);
            }
            channel.num_tasks_in_flight = 0;
        }
    }
}

impl<R> Drop for TaskManager<R> {
    fn drop(&mut self) {
        for channel in &mut self.channels {
            channel.task_sender = None;
        }
        for channel in &mut self.channels {
            if let Some(worker) = channel.worker.take() {
                join_worker(worker);
            }
        }
    }
}

/// Waits for a disconnected worker to exit. Web Workers are detached instead.
fn join_worker(worker: JoinHandle<()>) {
    cfg_if::cfg_if! {
        if #[cfg(target_family = "wasm")] {
            drop(worker);
        } else {
            if worker.join().is_err() {
                error!("Task worker exited with a panic");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    struct Square(u64);

    impl Task for Square {
        type Output = u64;

        fn process(&self) -> u64 {
            self.0 * self.0
        }
    }

    struct Explode;

    impl Task for Explode {
        type Output = u64;

        fn process(&self) -> u64 {
            panic!("boom");
        }
    }

    fn run_until_idle(manager: &mut TaskManager<u64>) -> Vec<u64> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut outputs = Vec::new();
        while manager.in_flight_count() + manager.queued_count() > 0 {
            assert!(Instant::now() < deadline, "tasks did not finish");
            outputs.extend(manager.collect_completed());
            manager.process_queued_tasks();
            std::thread::yield_now();
        }
        outputs
    }

    #[test]
    fn tasks_beyond_worker_count_are_queued_then_completed() {
        let mut manager = TaskManager::new(2).unwrap();
        let mut sent = 0;
        for n in 1..=5 {
            if manager.publish_task(Box::new(Square(n))) {
                sent += 1;
            }
        }
        assert_eq!(sent, 2);
        assert_eq!(manager.queued_count(), 3);

        let mut outputs = run_until_idle(&mut manager);
        outputs.sort_unstable();
        assert_eq!(outputs, vec![1, 4, 9, 16, 25]);
    }

    #[test]
    fn panicking_task_frees_its_worker() {
        let mut manager = TaskManager::new(1).unwrap();
        manager.publish_task(Box::new(Explode));
        manager.publish_task(Box::new(Square(3)));

        assert_eq!(run_until_idle(&mut manager), vec![9]);
        assert_eq!(manager.in_flight_count(), 0);
    }

    struct ExplodeLoudly;

    impl Task for ExplodeLoudly {
        type Output = u64;

        fn process(&self) -> u64 {
            panic!("boom");
        }

        fn on_panic(&self) -> Option<u64> {
            Some(u64::MAX)
        }
    }

    #[test]
    fn panicking_task_can_report_its_failure() {
        let mut manager = TaskManager::new(1).unwrap();
        manager.publish_task(Box::new(ExplodeLoudly));
        manager.publish_task(Box::new(Square(2)));

        let mut outputs = run_until_idle(&mut manager);
        outputs.sort_unstable();
        assert_eq!(outputs, vec![4, u64::MAX]);
    }

    #[test]
    fn zero_workers_keep_tasks_queued() {
        let mut manager = TaskManager::<u64>::new(0).unwrap();
        assert!(!manager.publish_task(Box::new(Square(2))));
        manager.process_queued_tasks();
        assert_eq!(manager.queued_count(), 1);
        assert!(manager.collect_completed().is_empty());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut manager = TaskManager::new(2).unwrap();
        manager.publish_task(Box::new(Square(2)));
        manager.shutdown();
        manager.shutdown();
        assert_eq!(manager.in_flight_count(), 0);
        assert!(!manager.publish_task(Box::new(Square(3))));
    }
}
