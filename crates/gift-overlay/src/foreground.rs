// Copyright 2025 gift-overlay contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The foreground execution context.
//!
//! Every visible-state mutation in this crate runs as a job on a single
//! [`ForegroundDriver`]: notification handling, timer-expiry effects and
//! the application of resolved images. Background work never touches
//! widget state directly; it posts a continuation through a [`Foreground`]
//! handle instead. This is what makes the liveness check performed at
//! image-delivery time race-free.

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Posting handle for the foreground context.
///
/// Cheap to clone; every clone posts onto the same driver.
#[derive(Clone)]
pub struct Foreground {
    sender: mpsc::UnboundedSender<Job>,
}

/// The job loop behind the [`Foreground`] handles.
///
/// The host owns this and drives it on its UI loop, either by awaiting
/// [`run`](Self::run) or by calling [`run_until_idle`](Self::run_until_idle)
/// once per frame.
pub struct ForegroundDriver {
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl Foreground {
    /// Create a connected handle/driver pair.
    pub fn new() -> (Self, ForegroundDriver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, ForegroundDriver { receiver })
    }

    /// Post a job onto the foreground context.
    ///
    /// If the driver has already stopped, the job is dropped: the overlay
    /// is shutting down and there is nothing left to paint.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(job)).is_err() {
            debug!("foreground driver is gone, dropping job");
        }
    }
}

impl fmt::Debug for Foreground {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Foreground").finish_non_exhaustive()
    }
}

impl ForegroundDriver {
    /// Run jobs until every [`Foreground`] handle has been dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.receiver.recv().await {
            job();
        }
    }

    /// Run the jobs that are already queued, without waiting for more.
    pub fn run_until_idle(&mut self) {
        while let Ok(job) = self.receiver.try_recv() {
            job();
        }
    }
}

impl fmt::Debug for ForegroundDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForegroundDriver").finish_non_exhaustive()
    }
}
