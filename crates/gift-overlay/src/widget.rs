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

//! The on-screen widget for a single gift streak.
//!
//! A [`GiftWidget`] is created empty by the host, bound to a streak exactly
//! once with [`init`](GiftWidget::init), and from then on follows the
//! streak's notifications: every amount change re-renders the amount label,
//! and the finish signal arms a retirement timer after which the widget
//! tears itself down. The host can also discard the widget early at any
//! point; teardown runs on every destruction path and unsubscribes both
//! handlers.
//!
//! The two pictures (sender profile, gift icon) are resolved off the
//! foreground context. Their results are posted back onto the foreground
//! driver, where a liveness check decides between applying the image and
//! silently discarding a result that lost the race against teardown.

use std::sync::{Arc, Mutex};

use eyeball::{SharedObservable, Subscriber};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    config::OverlayConfig,
    error::{Error, Result},
    executor::{spawn, AbortOnDrop, JoinHandleExt},
    foreground::Foreground,
    media::{Image, ImageProvider, Picture},
    streak::{GiftStreak, SubscriptionHandle, WeakGiftStreak},
};

/// Lifecycle phase of a [`GiftWidget`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetPhase {
    /// Created by the host, not yet bound to a streak.
    Unbound,
    /// Bound to a streak and following its updates.
    Active,
    /// The streak finished; the retirement timer is armed.
    Finishing,
    /// Torn down. Terminal.
    Destroyed,
}

/// Which of the widget's two image slots a request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSlot {
    /// The sender's profile picture.
    UserProfile,
    /// The gift's icon.
    GiftIcon,
}

/// Displays one gift streak: sender line, running amount and two images.
///
/// The handle is the sole owner of the widget; dropping it tears the
/// widget down if that has not happened yet.
#[derive(Debug)]
pub struct GiftWidget {
    inner: Arc<WidgetInner>,
}

struct WidgetInner {
    config: OverlayConfig,
    foreground: Foreground,
    provider: Arc<dyn ImageProvider>,
    phase: SharedObservable<WidgetPhase>,
    state: Mutex<WidgetState>,
}

#[derive(Default)]
struct WidgetState {
    binding: Option<Binding>,
    sender_line: String,
    amount_label: String,
    user_image: Option<Image>,
    gift_image: Option<Image>,
    retire_timer: Option<AbortOnDrop<()>>,
}

/// The subscriptions tied to the bound streak, removed again on teardown.
struct Binding {
    streak: WeakGiftStreak,
    amount_sub: SubscriptionHandle,
    finish_sub: SubscriptionHandle,
}

impl GiftWidget {
    /// Create an unbound widget wired to its collaborators.
    pub fn new(
        config: OverlayConfig,
        foreground: Foreground,
        provider: Arc<dyn ImageProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(WidgetInner {
                config,
                foreground,
                provider,
                phase: SharedObservable::new(WidgetPhase::Unbound),
                state: Mutex::new(WidgetState::default()),
            }),
        }
    }

    /// Bind this widget to a streak.
    ///
    /// Renders the sender line and the current amount, subscribes to the
    /// streak's notifications and issues the two image requests. Must be
    /// called on the foreground context, exactly once.
    pub fn init(&self, streak: &GiftStreak) -> Result<()> {
        match self.inner.phase.get() {
            WidgetPhase::Unbound => {}
            WidgetPhase::Destroyed => return Err(Error::AlreadyDestroyed),
            WidgetPhase::Active | WidgetPhase::Finishing => return Err(Error::AlreadyBound),
        }

        debug!(sender = %streak.sender().unique_id, "binding widget to streak");

        let amount_sub = streak.subscribe_amount_changed({
            let inner = Arc::downgrade(&self.inner);
            move |streak, amount| {
                if let Some(inner) = inner.upgrade() {
                    inner.on_amount_changed(streak, amount);
                }
            }
        });
        let finish_sub = streak.subscribe_streak_finished({
            let inner = Arc::downgrade(&self.inner);
            move |streak, final_amount| {
                if let Some(inner) = inner.upgrade() {
                    WidgetInner::on_streak_finished(&inner, streak, final_amount);
                }
            }
        });

        {
            let mut state = self.inner.state.lock().unwrap();
            state.sender_line = format!("{} sent a Gift!", streak.sender().unique_id);
            state.amount_label = format!("{}x", streak.amount());
            state.binding =
                Some(Binding { streak: streak.downgrade(), amount_sub, finish_sub });
        }
        self.inner.phase.set(WidgetPhase::Active);

        self.inner.request_image(ImageSlot::UserProfile, streak.sender().profile_picture.clone());
        self.inner.request_image(ImageSlot::GiftIcon, streak.gift().picture.clone());

        Ok(())
    }

    /// Forced external removal: tear the widget down right away,
    /// cancelling a pending retirement timer.
    ///
    /// Safe to call in any phase, including before [`init`](Self::init)
    /// and after the widget already retired.
    pub fn discard(&self) {
        self.inner.teardown();
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> WidgetPhase {
        self.inner.phase.get()
    }

    /// Subscribe to lifecycle transitions; the host uses this to learn
    /// when the widget has destroyed itself.
    pub fn subscribe_phase(&self) -> Subscriber<WidgetPhase> {
        self.inner.phase.subscribe()
    }

    /// The rendered sender line ("`<sender>` sent a Gift!").
    pub fn sender_line(&self) -> String {
        self.inner.state.lock().unwrap().sender_line.clone()
    }

    /// The rendered amount label ("`<amount>`x").
    pub fn amount_label(&self) -> String {
        self.inner.state.lock().unwrap().amount_label.clone()
    }

    /// The resolved sender profile picture, once it arrived.
    pub fn user_image(&self) -> Option<Image> {
        self.inner.state.lock().unwrap().user_image.clone()
    }

    /// The resolved gift icon, once it arrived.
    pub fn gift_image(&self) -> Option<Image> {
        self.inner.state.lock().unwrap().gift_image.clone()
    }
}

impl Drop for GiftWidget {
    fn drop(&mut self) {
        // The host may drop the handle without going through `discard`,
        // e.g. when the whole overlay is torn down.
        self.inner.teardown();
    }
}

impl WidgetInner {
    fn on_amount_changed(&self, streak: &GiftStreak, amount: u64) {
        if self.phase.get() != WidgetPhase::Active {
            // The final amount has already been rendered; anything still
            // arriving is a late or duplicate delivery.
            debug!(amount, "amount change on a non-active widget, ignoring");
            return;
        }
        let mut state = self.state.lock().unwrap();
        if !state.is_bound_to(streak) {
            debug!("amount change from an unrelated streak, ignoring");
            return;
        }
        state.amount_label = format!("{amount}x");
    }

    fn on_streak_finished(this: &Arc<Self>, streak: &GiftStreak, final_amount: u64) {
        match this.phase.get() {
            WidgetPhase::Active => {}
            WidgetPhase::Finishing | WidgetPhase::Destroyed => {
                warn!("repeated streak-finished notification, ignoring");
                return;
            }
            WidgetPhase::Unbound => return,
        }

        {
            let mut state = this.state.lock().unwrap();
            if !state.is_bound_to(streak) {
                debug!("finish from an unrelated streak, ignoring");
                return;
            }
            state.amount_label = format!("{final_amount}x");

            // Keep the final amount readable for a moment, then retire.
            // The expiry effect is re-marshaled onto the foreground
            // context like any other widget mutation.
            let widget = Arc::downgrade(this);
            let foreground = this.foreground.clone();
            let delay = this.config.retire_delay;
            state.retire_timer = Some(
                spawn(async move {
                    sleep(delay).await;
                    foreground.post(move || {
                        if let Some(widget) = widget.upgrade() {
                            widget.teardown();
                        }
                    });
                })
                .abort_on_drop(),
            );
        }

        this.phase.set(WidgetPhase::Finishing);
    }

    fn request_image(self: &Arc<Self>, slot: ImageSlot, picture: Picture) {
        let provider = self.provider.clone();
        let foreground = self.foreground.clone();
        let widget = Arc::downgrade(self);

        let _ = spawn(async move {
            // Resolution may block or take unbounded time; it must not
            // hold up widget updates.
            let resolved = provider.resolve(&picture).await;

            foreground.post(move || {
                let image = match resolved {
                    Ok(image) => image,
                    Err(error) => {
                        // Provider-level failure: the slot stays
                        // unchanged, nothing reaches the widget's caller.
                        warn!(?slot, %error, "image resolution failed");
                        return;
                    }
                };

                // Liveness check, on the foreground context: the widget
                // may have been torn down while the image was resolving.
                // Losing that race is the expected outcome, not an error.
                let Some(widget) = widget.upgrade() else {
                    debug!(?slot, "image resolved after widget teardown, discarding");
                    return;
                };
                widget.apply_image(slot, image);
            });
        });
    }

    fn apply_image(&self, slot: ImageSlot, image: Image) {
        if self.phase.get() == WidgetPhase::Destroyed {
            debug!(?slot, "image resolved after widget teardown, discarding");
            return;
        }
        let mut state = self.state.lock().unwrap();
        match slot {
            ImageSlot::UserProfile => state.user_image = Some(image),
            ImageSlot::GiftIcon => state.gift_image = Some(image),
        }
    }

    /// Tear the widget down: unsubscribe from the streak, cancel the
    /// retirement timer, release the image slots. Idempotent; runs on
    /// every destruction path (retirement, discard, handle drop).
    fn teardown(&self) {
        let binding = {
            let mut state = self.state.lock().unwrap();
            state.retire_timer = None;
            state.user_image = None;
            state.gift_image = None;
            state.binding.take()
        };

        if let Some(binding) = binding {
            if let Some(streak) = binding.streak.upgrade() {
                streak.unsubscribe(binding.amount_sub);
                streak.unsubscribe(binding.finish_sub);
            }
        }

        self.phase.set_if_not_eq(WidgetPhase::Destroyed);
    }
}

impl std::fmt::Debug for WidgetInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetInner").field("phase", &self.phase.get()).finish_non_exhaustive()
    }
}

impl WidgetState {
    fn is_bound_to(&self, streak: &GiftStreak) -> bool {
        self.binding.as_ref().is_some_and(|b| b.streak.is(streak))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use tokio::{
        sync::Notify,
        task::yield_now,
        time::{advance, sleep},
    };

    use super::{GiftWidget, WidgetInner, WidgetPhase};
    use crate::{
        config::OverlayConfig,
        error::Error,
        foreground::{Foreground, ForegroundDriver},
        media::{Image, ImageProvider, Picture, ResolveError},
        streak::{GiftKind, GiftSender, GiftStreak},
    };

    /// Provider that waits for a per-test release signal before answering,
    /// so tests control when results race against teardown.
    struct GatedProvider {
        release: Notify,
        response: Result<Image, ResolveError>,
    }

    impl GatedProvider {
        fn new(response: Result<Image, ResolveError>) -> Arc<Self> {
            Arc::new(Self { release: Notify::new(), response })
        }

        fn release_all(&self) {
            self.release.notify_waiters();
        }
    }

    #[async_trait]
    impl ImageProvider for GatedProvider {
        async fn resolve(&self, _picture: &Picture) -> Result<Image, ResolveError> {
            self.release.notified().await;
            self.response.clone()
        }
    }

    /// Provider that fails every resolution.
    struct FailingProvider;

    #[async_trait]
    impl ImageProvider for FailingProvider {
        async fn resolve(&self, _picture: &Picture) -> Result<Image, ResolveError> {
            Err(ResolveError::NotFound)
        }
    }

    /// Provider answering instantly, for tests that don't care about the
    /// resolution race.
    struct InstantProvider;

    #[async_trait]
    impl ImageProvider for InstantProvider {
        async fn resolve(&self, picture: &Picture) -> Result<Image, ResolveError> {
            let url = picture.preferred_url().unwrap_or_default();
            Ok(Image::new(url.as_bytes().to_vec()))
        }
    }

    fn alice_streak(amount: u64) -> GiftStreak {
        GiftStreak::new(
            GiftSender {
                unique_id: "Alice".to_owned(),
                profile_picture: Picture::new(vec!["https://cdn.test/alice.png".to_owned()]),
            },
            GiftKind {
                name: "Rose".to_owned(),
                picture: Picture::new(vec!["https://cdn.test/rose.png".to_owned()]),
            },
            amount,
        )
    }

    fn widget_with(provider: Arc<dyn ImageProvider>) -> (GiftWidget, ForegroundDriver) {
        let (foreground, driver) = Foreground::new();
        (GiftWidget::new(OverlayConfig::new(), foreground, provider), driver)
    }

    /// Let spawned resolution tasks and posted foreground jobs settle.
    async fn settle(driver: &mut ForegroundDriver) {
        for _ in 0..10 {
            yield_now().await;
        }
        driver.run_until_idle();
    }

    #[tokio::test]
    async fn test_init_renders_sender_and_amount() {
        let (widget, _driver) = widget_with(Arc::new(InstantProvider));
        let streak = alice_streak(1);

        widget.init(&streak).unwrap();

        assert_eq!(widget.phase(), WidgetPhase::Active);
        assert_eq!(widget.sender_line(), "Alice sent a Gift!");
        assert_eq!(widget.amount_label(), "1x");
    }

    #[tokio::test]
    async fn test_double_init_is_rejected_and_keeps_binding() {
        let (widget, _driver) = widget_with(Arc::new(InstantProvider));
        let streak = alice_streak(1);
        let other = alice_streak(9);

        widget.init(&streak).unwrap();
        assert_matches!(widget.init(&other), Err(Error::AlreadyBound));

        // The original binding still drives the widget.
        streak.set_amount(3);
        assert_eq!(widget.amount_label(), "3x");
        other.set_amount(11);
        assert_eq!(widget.amount_label(), "3x");
    }

    #[tokio::test]
    async fn test_init_after_discard_is_rejected() {
        let (widget, _driver) = widget_with(Arc::new(InstantProvider));
        let streak = alice_streak(1);

        widget.discard();
        assert_matches!(widget.init(&streak), Err(Error::AlreadyDestroyed));
        assert_eq!(streak.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_displayed_amount_follows_every_update() {
        let (widget, _driver) = widget_with(Arc::new(InstantProvider));
        let streak = alice_streak(1);
        widget.init(&streak).unwrap();

        for amount in [2, 5, 5, 8] {
            streak.set_amount(amount);
            assert_eq!(widget.amount_label(), format!("{amount}x"));
        }
    }

    #[tokio::test]
    async fn test_amount_updates_after_finish_are_ignored() {
        let (widget, _driver) = widget_with(Arc::new(InstantProvider));
        let streak = alice_streak(1);
        widget.init(&streak).unwrap();

        streak.finish();
        assert_eq!(widget.amount_label(), "1x");
        assert_eq!(widget.phase(), WidgetPhase::Finishing);

        // A source in violation of its contract keeps sending updates;
        // the widget must not pick them up.
        streak.emit_unchecked(false, 42);
        assert_eq!(widget.amount_label(), "1x");
    }

    #[tokio::test]
    async fn test_repeated_finish_is_ignored() {
        let (widget, _driver) = widget_with(Arc::new(InstantProvider));
        let streak = alice_streak(5);
        widget.init(&streak).unwrap();

        streak.finish();
        streak.emit_unchecked(true, 99);

        assert_eq!(widget.phase(), WidgetPhase::Finishing);
        assert_eq!(widget.amount_label(), "5x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_widget_retires_after_the_configured_delay() {
        let (foreground, mut driver) = Foreground::new();
        let config = OverlayConfig::new().retire_delay(Duration::from_secs(2));
        let widget = GiftWidget::new(config, foreground, Arc::new(InstantProvider));
        let streak = alice_streak(1);

        widget.init(&streak).unwrap();
        streak.set_amount(5);
        streak.finish();
        assert_eq!(widget.amount_label(), "5x");
        assert_eq!(widget.phase(), WidgetPhase::Finishing);

        // Not yet: the delay has not elapsed.
        advance(Duration::from_millis(1900)).await;
        settle(&mut driver).await;
        assert_eq!(widget.phase(), WidgetPhase::Finishing);

        advance(Duration::from_millis(200)).await;
        settle(&mut driver).await;
        assert_eq!(widget.phase(), WidgetPhase::Destroyed);
        assert_eq!(streak.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_cancels_the_retirement_timer() {
        let (widget, mut driver) = widget_with(Arc::new(InstantProvider));
        let streak = alice_streak(1);

        widget.init(&streak).unwrap();
        streak.finish();
        widget.discard();

        assert_eq!(widget.phase(), WidgetPhase::Destroyed);
        assert_eq!(streak.subscriber_count(), 0);

        // The timer firing later must not do anything further.
        advance(Duration::from_secs(5)).await;
        settle(&mut driver).await;
        assert_eq!(widget.phase(), WidgetPhase::Destroyed);
    }

    #[tokio::test]
    async fn test_images_apply_while_the_widget_is_alive() {
        let (widget, mut driver) = widget_with(Arc::new(InstantProvider));
        let streak = alice_streak(1);

        widget.init(&streak).unwrap();
        settle(&mut driver).await;

        assert_eq!(
            widget.user_image(),
            Some(Image::new(b"https://cdn.test/alice.png".to_vec()))
        );
        assert_eq!(widget.gift_image(), Some(Image::new(b"https://cdn.test/rose.png".to_vec())));
    }

    #[tokio::test]
    async fn test_late_image_delivery_after_discard_is_dropped() {
        let provider = GatedProvider::new(Ok(Image::new(b"late".to_vec())));
        let (widget, mut driver) = widget_with(provider.clone());
        let streak = alice_streak(1);

        widget.init(&streak).unwrap();
        // Let both resolution tasks reach the gate, then tear down.
        settle(&mut driver).await;
        widget.discard();

        // Resolution completes only now, well after teardown.
        provider.release_all();
        settle(&mut driver).await;

        assert_eq!(widget.user_image(), None);
        assert_eq!(widget.gift_image(), None);
        assert_eq!(widget.phase(), WidgetPhase::Destroyed);
    }

    #[tokio::test]
    async fn test_late_image_delivery_after_drop_is_dropped() {
        let provider = GatedProvider::new(Ok(Image::new(b"late".to_vec())));
        let (widget, mut driver) = widget_with(provider.clone());
        let streak = alice_streak(1);

        widget.init(&streak).unwrap();
        settle(&mut driver).await;
        drop(widget);
        assert_eq!(streak.subscriber_count(), 0);

        provider.release_all();
        // Must simply discard; there is no widget left to write to.
        settle(&mut driver).await;
    }

    #[tokio::test]
    async fn test_resolution_failure_leaves_the_slot_unchanged() {
        let provider = Arc::new(FailingProvider);
        let (widget, mut driver) = widget_with(provider);
        let streak = alice_streak(1);

        widget.init(&streak).unwrap();
        settle(&mut driver).await;

        assert_eq!(widget.user_image(), None);
        assert_eq!(widget.gift_image(), None);
        assert_eq!(widget.phase(), WidgetPhase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_resolution_does_not_block_updates() {
        struct SlowProvider;

        #[async_trait]
        impl ImageProvider for SlowProvider {
            async fn resolve(&self, _picture: &Picture) -> Result<Image, ResolveError> {
                sleep(Duration::from_secs(3600)).await;
                Ok(Image::new(Vec::new()))
            }
        }

        let (widget, _driver) = widget_with(Arc::new(SlowProvider));
        let streak = alice_streak(1);

        widget.init(&streak).unwrap();
        streak.set_amount(4);

        assert_eq!(widget.amount_label(), "4x");
        assert_eq!(widget.user_image(), None);
    }

    #[tokio::test]
    async fn test_phase_subscription_sees_transitions() {
        let (widget, _driver) = widget_with(Arc::new(InstantProvider));
        let mut phases = widget.subscribe_phase();
        let streak = alice_streak(1);

        widget.init(&streak).unwrap();
        assert_eq!(phases.next().await, Some(WidgetPhase::Active));

        streak.finish();
        assert_eq!(phases.next().await, Some(WidgetPhase::Finishing));

        widget.discard();
        assert_eq!(phases.next().await, Some(WidgetPhase::Destroyed));
    }

    #[tokio::test]
    async fn test_updates_from_an_unrelated_streak_are_ignored() {
        let (widget, _driver) = widget_with(Arc::new(InstantProvider));
        let streak = alice_streak(1);
        let unrelated = alice_streak(7);
        widget.init(&streak).unwrap();

        // Simulate a stale subscription delivering from the wrong streak
        // by invoking the handlers directly.
        widget.inner.on_amount_changed(&unrelated, 8);
        assert_eq!(widget.amount_label(), "1x");

        WidgetInner::on_streak_finished(&widget.inner, &unrelated, 8);
        assert_eq!(widget.phase(), WidgetPhase::Active);
    }
}
