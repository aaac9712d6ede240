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

//! Configuration for overlay widgets.

use std::time::Duration;

/// How long a finished gift row stays readable before the widget retires
/// itself.
const DEFAULT_RETIRE_DELAY: Duration = Duration::from_secs(2);

/// Display-lifetime configuration for the overlay.
#[derive(Clone, Debug)]
pub struct OverlayConfig {
    pub(crate) retire_delay: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self { retire_delay: DEFAULT_RETIRE_DELAY }
    }
}

impl OverlayConfig {
    /// Create an `OverlayConfig` with the default settings.
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the delay between a streak finishing and its widget retiring.
    pub fn retire_delay(mut self, delay: Duration) -> Self {
        self.retire_delay = delay;
        self
    }
}
