// SPDX-License-Identifier: GPL-3.0-only
//! Dedicated background context for hardware callbacks
//!
//! Every hardware callback and every capture/configure call the backend
//! makes on our behalf runs on one named thread, in submission order. No two
//! camera operations ever execute concurrently.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Cloneable handle used to post work onto the executor thread
#[derive(Clone)]
pub struct ExecutorHandle {
    sender: mpsc::Sender<Message>,
    name: String,
}

impl ExecutorHandle {
    /// Queue a job behind everything already posted
    ///
    /// Returns `false` if the executor has already shut down; the job is
    /// dropped without running.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.send(Message::Run(Box::new(job))) {
            Ok(()) => true,
            Err(_) => {
                debug!(name = %self.name, "Executor gone, dropping job");
                false
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorHandle")
            .field("name", &self.name)
            .finish()
    }
}

/// Owner of the background callback thread
///
/// # Example
///
/// ```ignore
/// let executor = CallbackExecutor::start("camera-callbacks");
/// let handle = executor.handle();
/// handle.post(|| println!("runs on camera-callbacks"));
/// ```
pub struct CallbackExecutor {
    thread_handle: Option<JoinHandle<()>>,
    handle: ExecutorHandle,
}

impl CallbackExecutor {
    /// Spawn the executor thread
    pub fn start(name: &str) -> Self {
        let (sender, receiver) = mpsc::channel::<Message>();
        let name_clone = name.to_string();

        info!(name = %name, "Starting callback executor");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Callback executor thread started");
                while let Ok(message) = receiver.recv() {
                    match message {
                        Message::Run(job) => job(),
                        Message::Stop => {
                            debug!(name = %name_clone, "Stop signal received");
                            break;
                        }
                    }
                }
                info!(name = %name_clone, "Callback executor thread exiting");
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn callback executor thread");
                None
            }
        };

        Self {
            thread_handle,
            handle: ExecutorHandle {
                sender,
                name: name.to_string(),
            },
        }
    }

    /// Handle for posting jobs
    pub fn handle(&self) -> ExecutorHandle {
        self.handle.clone()
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Run everything already queued, then stop the thread and wait for it
    pub fn shutdown(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        let _ = self.handle.sender.send(Message::Stop);

        // Joining from the executor's own thread would never return.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if let Err(e) = handle.join() {
            warn!(name = %self.handle.name, "Callback executor thread panicked: {:?}", e);
        }
    }
}

impl Drop for CallbackExecutor {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.handle.name, "CallbackExecutor dropped, stopping thread");
            self.shutdown();
        }
    }
}
