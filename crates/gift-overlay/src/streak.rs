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

//! The gift-streak entity and its notification fan-out.
//!
//! A [`GiftStreak`] is owned and mutated by the gift-stream source; widgets
//! only subscribe to it. Two notifications exist: *amount changed* while
//! the streak is open, and *streak finished* exactly once at the end. The
//! streak enforces that no amount change is emitted after the finish.
//!
//! Subscriptions are boxed closures keyed by a numeric id; the returned
//! [`SubscriptionHandle`] removes them again. All notifications are
//! dispatched synchronously on the caller's (foreground) context.

use std::sync::{
    atomic::{AtomicU64, Ordering::SeqCst},
    Arc, Mutex, RwLock, Weak,
};

use tracing::warn;

use crate::media::Picture;

/// Identity of the viewer sending a gift.
#[derive(Clone, Debug)]
pub struct GiftSender {
    /// Stable unique id of the viewer, also used for display.
    pub unique_id: String,
    /// Descriptor of the viewer's profile picture.
    pub profile_picture: Picture,
}

/// The kind of gift being sent.
#[derive(Clone, Debug)]
pub struct GiftKind {
    /// Human-readable gift name.
    pub name: String,
    /// Descriptor of the gift's icon.
    pub picture: Picture,
}

/// A notification callback. The streak and the effective amount are passed
/// to every subscriber.
type NotifyFn = Arc<dyn Fn(&GiftStreak, u64) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NotificationKind {
    AmountChanged,
    StreakFinished,
}

/// Handle to remove a registered notification handler by passing it to
/// [`GiftStreak::unsubscribe`].
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    kind: NotificationKind,
    id: u64,
}

#[derive(Default)]
struct SubscriberStore {
    amount_changed: Vec<(u64, NotifyFn)>,
    streak_finished: Vec<(u64, NotifyFn)>,
}

impl SubscriberStore {
    fn slot(&mut self, kind: NotificationKind) -> &mut Vec<(u64, NotifyFn)> {
        match kind {
            NotificationKind::AmountChanged => &mut self.amount_changed,
            NotificationKind::StreakFinished => &mut self.streak_finished,
        }
    }

    fn snapshot(&self, kind: NotificationKind) -> Vec<NotifyFn> {
        let slot = match kind {
            NotificationKind::AmountChanged => &self.amount_changed,
            NotificationKind::StreakFinished => &self.streak_finished,
        };
        slot.iter().map(|(_, f)| f.clone()).collect()
    }

    fn len(&self) -> usize {
        self.amount_changed.len() + self.streak_finished.len()
    }
}

struct StreakState {
    amount: u64,
    finished: bool,
}

struct StreakInner {
    sender: GiftSender,
    gift: GiftKind,
    state: Mutex<StreakState>,
    subscribers: RwLock<SubscriberStore>,
    counter: AtomicU64,
}

/// One logical gift event: a sequence of same-sender, same-gift
/// contributions treated as one row until the finish signal closes it.
///
/// Cloning is cheap and clones observe the same underlying streak.
#[derive(Clone)]
pub struct GiftStreak {
    inner: Arc<StreakInner>,
}

impl GiftStreak {
    /// Create a new, open streak with the given starting amount.
    pub fn new(sender: GiftSender, gift: GiftKind, amount: u64) -> Self {
        Self {
            inner: Arc::new(StreakInner {
                sender,
                gift,
                state: Mutex::new(StreakState { amount, finished: false }),
                subscribers: RwLock::new(SubscriberStore::default()),
                counter: AtomicU64::new(0),
            }),
        }
    }

    pub fn sender(&self) -> &GiftSender {
        &self.inner.sender
    }

    pub fn gift(&self) -> &GiftKind {
        &self.inner.gift
    }

    /// The current accumulated amount.
    pub fn amount(&self) -> u64 {
        self.inner.state.lock().unwrap().amount
    }

    /// Whether the finish signal has already fired.
    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().unwrap().finished
    }

    /// Update the accumulated amount and notify subscribers.
    ///
    /// The amount is monotonically non-decreasing while the streak is
    /// open; a lower value is a source bug and is ignored. Calls after
    /// [`finish`](Self::finish) are ignored as well, keeping the
    /// invariant that no amount change is observed after the finish.
    pub fn set_amount(&self, new_amount: u64) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.finished {
                warn!(new_amount, "amount update on a finished streak, ignoring");
                return;
            }
            if new_amount < state.amount {
                warn!(
                    new_amount,
                    current = state.amount,
                    "non-monotonic amount update, ignoring"
                );
                return;
            }
            state.amount = new_amount;
        }
        self.emit(NotificationKind::AmountChanged, new_amount);
    }

    /// Close the streak and notify subscribers of the final amount.
    ///
    /// Fires at most once; repeated calls are ignored.
    pub fn finish(&self) {
        let final_amount = {
            let mut state = self.inner.state.lock().unwrap();
            if state.finished {
                warn!("finish on an already finished streak, ignoring");
                return;
            }
            state.finished = true;
            state.amount
        };
        self.emit(NotificationKind::StreakFinished, final_amount);
    }

    /// Subscribe to amount changes.
    pub fn subscribe_amount_changed(
        &self,
        handler: impl Fn(&GiftStreak, u64) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe(NotificationKind::AmountChanged, Arc::new(handler))
    }

    /// Subscribe to the finish signal.
    pub fn subscribe_streak_finished(
        &self,
        handler: impl Fn(&GiftStreak, u64) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe(NotificationKind::StreakFinished, Arc::new(handler))
    }

    /// Remove a previously registered handler.
    ///
    /// Unknown or already-removed handles are a no-op.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut store = self.inner.subscribers.write().unwrap();
        store.slot(handle.kind).retain(|(id, _)| *id != handle.id);
    }

    /// A weak reference for back-pointers that must not keep the streak
    /// alive.
    pub fn downgrade(&self) -> WeakGiftStreak {
        WeakGiftStreak { inner: Arc::downgrade(&self.inner) }
    }

    fn subscribe(&self, kind: NotificationKind, handler: NotifyFn) -> SubscriptionHandle {
        let id = self.inner.counter.fetch_add(1, SeqCst);
        self.inner.subscribers.write().unwrap().slot(kind).push((id, handler));
        SubscriptionHandle { kind, id }
    }

    fn emit(&self, kind: NotificationKind, amount: u64) {
        // Invoke the handlers with the subscriber lock no longer being
        // held, so a handler may subscribe or unsubscribe reentrantly.
        let handlers = self.inner.subscribers.read().unwrap().snapshot(kind);
        for handler in handlers {
            handler(self, amount);
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().unwrap().len()
    }

    /// Deliver a notification without going through the streak's own state
    /// guards. Exists to exercise the widget's defensive paths against a
    /// misbehaving source.
    #[cfg(test)]
    pub(crate) fn emit_unchecked(&self, finished: bool, amount: u64) {
        let kind = if finished {
            NotificationKind::StreakFinished
        } else {
            NotificationKind::AmountChanged
        };
        self.emit(kind, amount);
    }
}

impl std::fmt::Debug for GiftStreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GiftStreak")
            .field("sender", &self.inner.sender.unique_id)
            .field("gift", &self.inner.gift.name)
            .finish_non_exhaustive()
    }
}

/// Weak counterpart of [`GiftStreak`].
#[derive(Clone, Debug)]
pub struct WeakGiftStreak {
    inner: Weak<StreakInner>,
}

impl WeakGiftStreak {
    /// Attempt to get back a strong reference, if the source still keeps
    /// the streak alive.
    pub fn upgrade(&self) -> Option<GiftStreak> {
        self.inner.upgrade().map(|inner| GiftStreak { inner })
    }

    /// Whether this weak reference points at the given streak.
    pub(crate) fn is(&self, streak: &GiftStreak) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(&streak.inner))
    }
}
