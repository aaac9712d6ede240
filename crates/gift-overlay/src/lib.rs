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

//! Overlay widget for live gift streaks.
//!
//! A [`GiftStreak`] is a live, externally-mutated event: the same viewer
//! keeps sending the same gift, the amount climbs, and at some point the
//! streak finishes. A [`GiftWidget`] follows exactly one such streak: it
//! renders the sender and the running amount, resolves the two pictures
//! (sender profile, gift icon) asynchronously, and retires itself a short
//! while after the streak finishes.
//!
//! All visible-state mutation happens on a single foreground context, see
//! the [`foreground`] module. Image resolution is the one piece of work
//! that runs elsewhere; its result is re-marshaled onto the foreground
//! context and checked against widget liveness before it is applied.

pub mod config;
mod error;
pub mod executor;
pub mod foreground;
pub mod media;
pub mod streak;
pub mod widget;

pub use self::{
    config::OverlayConfig,
    error::{Error, Result},
    foreground::{Foreground, ForegroundDriver},
    media::{Image, ImageProvider, Picture, ResolveError},
    streak::{GiftKind, GiftSender, GiftStreak, SubscriptionHandle, WeakGiftStreak},
    widget::{GiftWidget, ImageSlot, WidgetPhase},
};
