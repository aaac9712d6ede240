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

//! Picture descriptors and the asynchronous image-provider seam.

use async_trait::async_trait;
use thiserror::Error;

/// Descriptor for a remote picture, as carried on gift events.
///
/// A descriptor is a list of candidate URLs for the same picture, ordered
/// by the source's preference. It is resolution input only; the actual
/// bytes live in [`Image`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Picture {
    urls: Vec<String>,
}

impl Picture {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }

    /// The preferred URL for this picture, if the descriptor carries any.
    pub fn preferred_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }

    /// All candidate URLs, in preference order.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}

/// A resolved image, ready to hand to the renderer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    data: Vec<u8>,
}

impl Image {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Errors an [`ImageProvider`] can report for a resolution attempt.
///
/// These are absorbed at the delivery site: the target image slot is left
/// unchanged and the failure never reaches the widget's caller.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ResolveError {
    /// No asset could be located for the descriptor.
    #[error("no asset found for the picture")]
    NotFound,

    /// The asset was located but could not be decoded into an image.
    #[error("failed to decode image data: {0}")]
    Decode(String),

    /// The provider could not be reached or gave up.
    #[error("image provider unavailable: {0}")]
    Unavailable(String),
}

/// Resolves picture descriptors into displayable images.
///
/// Resolution runs off the foreground context and may take unbounded
/// time. Callers must re-marshal the result onto the foreground context
/// before touching any widget-owned state.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn resolve(&self, picture: &Picture) -> Result<Image, ResolveError>;
}
