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

use thiserror::Error;

/// Errors returned by the widget's public API.
///
/// These are programming errors on the host's side; none of them is
/// recoverable by retrying the same call.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// [`init`](crate::GiftWidget::init) was called on a widget that is
    /// already bound to a streak. The existing binding is left intact.
    #[error("widget is already bound to a gift streak")]
    AlreadyBound,

    /// [`init`](crate::GiftWidget::init) was called on a widget that has
    /// already been torn down.
    #[error("widget has already been destroyed")]
    AlreadyDestroyed,
}

/// Result alias for widget API calls.
pub type Result<T, E = Error> = std::result::Result<T, E>;
