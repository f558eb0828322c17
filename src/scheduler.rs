//! Coalescing of layout triggers.
//!
//! Everything here is single-threaded and driven by explicit millisecond
//! timestamps. The host calls [`Scheduler::trigger`] for every notification,
//! [`Scheduler::poll`] from its timer, and [`Scheduler::on_animation_frame`]
//! from its paint callback; the last returns the pass to run, if any.

use std::cell::Cell;
use std::rc::Rc;

/// Fires once after a quiet interval; a new value replaces the pending one.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay_ms: u64,
    pending: Option<(T, u64)>,
}

impl<T> Debouncer<T> {
    pub const fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            pending: None,
        }
    }

    pub fn queue(&mut self, value: T, now_ms: u64) {
        self.pending = Some((value, now_ms));
    }

    pub fn take_ready(&mut self, now_ms: u64) -> Option<T> {
        let queued_at = self.pending.as_ref()?.1;
        if now_ms.saturating_sub(queued_at) >= self.delay_ms {
            self.pending.take().map(|(value, _)| value)
        } else {
            None
        }
    }

    /// When the pending value becomes ready.
    pub fn deadline(&self) -> Option<u64> {
        self.pending
            .as_ref()
            .map(|(_, queued_at)| queued_at + self.delay_ms)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Hard minimum interval between firings.
///
/// A trigger inside the interval is held back and fires once the interval
/// has passed, so the last trigger of a burst is never lost.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval_ms: u64,
    last_fired: Option<u64>,
    trailing: bool,
}

impl Throttle {
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fired: None,
            trailing: false,
        }
    }

    /// Returns true if the caller may fire now.
    pub fn trigger(&mut self, now_ms: u64) -> bool {
        if self.ready(now_ms) {
            self.last_fired = Some(now_ms);
            self.trailing = false;
            true
        } else {
            self.trailing = true;
            false
        }
    }

    /// Fire the held-back trigger once the interval has passed.
    pub fn take_trailing(&mut self, now_ms: u64) -> bool {
        if self.trailing && self.ready(now_ms) {
            self.trailing = false;
            self.last_fired = Some(now_ms);
            true
        } else {
            false
        }
    }

    pub fn deadline(&self) -> Option<u64> {
        if !self.trailing {
            return None;
        }
        Some(self.last_fired.map_or(0, |last| last + self.interval_ms))
    }

    pub const fn cancel(&mut self) {
        self.trailing = false;
    }

    pub const fn is_pending(&self) -> bool {
        self.trailing
    }

    fn ready(&self, now_ms: u64) -> bool {
        self.last_fired
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.interval_ms)
    }
}

/// Waits two paint frames: the first lets inserted elements settle, the
/// second reads geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDefer {
    frames_left: Option<u8>,
}

impl FrameDefer {
    /// Request a deferred read; an outstanding request is restarted.
    pub const fn request(&mut self) {
        self.frames_left = Some(2);
    }

    /// Advance one frame. Returns true on the frame the read should happen.
    pub const fn on_frame(&mut self) -> bool {
        match self.frames_left {
            Some(n) if n > 1 => {
                self.frames_left = Some(n - 1);
                false
            }
            Some(_) => {
                self.frames_left = None;
                true
            }
            None => false,
        }
    }

    pub const fn cancel(&mut self) {
        self.frames_left = None;
    }

    pub const fn is_pending(&self) -> bool {
        self.frames_left.is_some()
    }
}

/// Shared flag set while the engine writes to the document itself.
#[derive(Debug, Clone, Default)]
pub struct SuppressFlag(Rc<Cell<bool>>);

impl SuppressFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suppressed(&self) -> bool {
        self.0.get()
    }

    /// Set the flag until the returned guard drops.
    #[must_use = "the flag is cleared as soon as the guard drops"]
    pub fn suppress(&self) -> SuppressGuard {
        let previous = self.0.replace(true);
        SuppressGuard {
            flag: Rc::clone(&self.0),
            previous,
        }
    }
}

/// Restores the suppress flag on drop.
#[derive(Debug)]
pub struct SuppressGuard {
    flag: Rc<Cell<bool>>,
    previous: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

/// A notification that may require a layout pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    DocumentChanged,
    SettingsChanged,
    Resize,
    Scroll,
    FileSwitch,
}

/// Work to run in the next render pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassRequest {
    /// Markers must be rescanned from the source
    pub rescan: bool,
    /// Container geometry changed: mode, width and offset
    pub relayout: bool,
    /// Anchors moved: vertical positions and collisions
    pub reposition: bool,
}

impl PassRequest {
    pub const RESCAN: Self = Self {
        rescan: true,
        relayout: true,
        reposition: true,
    };
    pub const RELAYOUT: Self = Self {
        rescan: false,
        relayout: true,
        reposition: true,
    };
    pub const REPOSITION: Self = Self {
        rescan: false,
        relayout: false,
        reposition: true,
    };

    pub const fn merge(self, other: Self) -> Self {
        Self {
            rescan: self.rescan || other.rescan,
            relayout: self.relayout || other.relayout,
            reposition: self.reposition || other.reposition,
        }
    }

    pub const fn is_empty(self) -> bool {
        !(self.rescan || self.relayout || self.reposition)
    }
}

/// Delays, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTiming {
    pub document_debounce_ms: u64,
    pub settings_debounce_ms: u64,
    pub resize_debounce_ms: u64,
    pub resize_throttle_ms: u64,
    pub scroll_debounce_ms: u64,
    pub scroll_throttle_ms: u64,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            document_debounce_ms: 300,
            settings_debounce_ms: 100,
            resize_debounce_ms: 150,
            resize_throttle_ms: 50,
            scroll_debounce_ms: 100,
            scroll_throttle_ms: 32,
        }
    }
}

/// Turns bursts of triggers into a small number of deferred render passes.
#[derive(Debug, Clone)]
pub struct Scheduler {
    document: Debouncer<()>,
    settings: Debouncer<()>,
    resize: Debouncer<()>,
    resize_throttle: Throttle,
    scroll: Debouncer<()>,
    scroll_throttle: Throttle,
    frames: FrameDefer,
    /// Work waiting on the frame defer
    queued: PassRequest,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerTiming::default())
    }
}

impl Scheduler {
    pub const fn new(timing: SchedulerTiming) -> Self {
        Self {
            document: Debouncer::new(timing.document_debounce_ms),
            settings: Debouncer::new(timing.settings_debounce_ms),
            resize: Debouncer::new(timing.resize_debounce_ms),
            resize_throttle: Throttle::new(timing.resize_throttle_ms),
            scroll: Debouncer::new(timing.scroll_debounce_ms),
            scroll_throttle: Throttle::new(timing.scroll_throttle_ms),
            frames: FrameDefer { frames_left: None },
            queued: PassRequest {
                rescan: false,
                relayout: false,
                reposition: false,
            },
        }
    }

    pub fn trigger(&mut self, trigger: Trigger, now_ms: u64) {
        tracing::trace!(?trigger, now_ms, "layout trigger");
        match trigger {
            Trigger::DocumentChanged => self.document.queue((), now_ms),
            Trigger::SettingsChanged => self.settings.queue((), now_ms),
            Trigger::Resize => {
                self.resize.queue((), now_ms);
                if self.resize_throttle.trigger(now_ms) {
                    self.enqueue(PassRequest::RELAYOUT);
                }
            }
            Trigger::Scroll => {
                self.scroll.queue((), now_ms);
                if self.scroll_throttle.trigger(now_ms) {
                    self.enqueue(PassRequest::REPOSITION);
                }
            }
            Trigger::FileSwitch => {
                self.cancel_timers();
                self.queued = PassRequest::default();
                self.enqueue(PassRequest::RESCAN);
            }
        }
    }

    /// Move expired timers into the frame defer.
    pub fn poll(&mut self, now_ms: u64) {
        if self.document.take_ready(now_ms).is_some() || self.settings.take_ready(now_ms).is_some() {
            self.enqueue(PassRequest::RESCAN);
        }
        if self.resize.take_ready(now_ms).is_some() {
            // The settle pass supersedes any held-back throttled pass
            self.resize_throttle.cancel();
            self.enqueue(PassRequest::RELAYOUT);
        } else if self.resize_throttle.take_trailing(now_ms) {
            self.enqueue(PassRequest::RELAYOUT);
        }
        if self.scroll.take_ready(now_ms).is_some() {
            self.scroll_throttle.cancel();
            self.enqueue(PassRequest::REPOSITION);
        } else if self.scroll_throttle.take_trailing(now_ms) {
            self.enqueue(PassRequest::REPOSITION);
        }
    }

    /// Advance the frame defer; returns the pass to run on the second frame.
    pub fn on_animation_frame(&mut self) -> Option<PassRequest> {
        if !self.frames.on_frame() {
            return None;
        }
        let pass = std::mem::take(&mut self.queued);
        (!pass.is_empty()).then_some(pass)
    }

    /// Earliest timestamp at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.document.deadline(),
            self.settings.deadline(),
            self.resize.deadline(),
            self.resize_throttle.deadline(),
            self.scroll.deadline(),
            self.scroll_throttle.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub const fn is_idle(&self) -> bool {
        !(self.document.is_pending()
            || self.settings.is_pending()
            || self.resize.is_pending()
            || self.resize_throttle.is_pending()
            || self.scroll.is_pending()
            || self.scroll_throttle.is_pending()
            || self.frames.is_pending())
    }

    /// Cancel every pending timer and frame request.
    pub fn teardown(&mut self) {
        self.cancel_timers();
        self.frames.cancel();
        self.queued = PassRequest::default();
    }

    fn cancel_timers(&mut self) {
        self.document.cancel();
        self.settings.cancel();
        self.resize.cancel();
        self.resize_throttle.cancel();
        self.scroll.cancel();
        self.scroll_throttle.cancel();
    }

    fn enqueue(&mut self, pass: PassRequest) {
        self.queued = self.queued.merge(pass);
        self.frames.request();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frames(scheduler: &mut Scheduler) -> Option<PassRequest> {
        assert!(scheduler.on_animation_frame().is_none());
        scheduler.on_animation_frame()
    }

    #[test]
    fn test_debouncer_waits_for_quiet_period() {
        let mut debouncer = Debouncer::new(150);
        debouncer.queue(3, 0);

        assert!(debouncer.take_ready(100).is_none());
        assert_eq!(debouncer.deadline(), Some(150));
        assert_eq!(debouncer.take_ready(150), Some(3));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_debouncer_uses_latest_value() {
        let mut debouncer = Debouncer::new(150);
        debouncer.queue(3, 0);
        debouncer.queue(5, 50);

        assert!(debouncer.take_ready(150).is_none());
        assert_eq!(debouncer.take_ready(200), Some(5));
    }

    #[test]
    fn test_debouncer_cancel_clears_pending() {
        let mut debouncer = Debouncer::new(150);
        debouncer.queue(3, 0);
        debouncer.cancel();

        assert!(debouncer.take_ready(200).is_none());
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_throttle_fires_leading_and_trailing() {
        let mut throttle = Throttle::new(50);
        assert!(throttle.trigger(0));
        assert!(!throttle.trigger(10));
        assert!(!throttle.trigger(20));
        assert_eq!(throttle.deadline(), Some(50));
        assert!(!throttle.take_trailing(40));
        assert!(throttle.take_trailing(50));
        // Only one trailing call for the whole burst
        assert!(!throttle.take_trailing(200));
    }

    #[test]
    fn test_throttle_allows_trigger_after_interval() {
        let mut throttle = Throttle::new(50);
        assert!(throttle.trigger(0));
        assert!(throttle.trigger(60));
        assert!(!throttle.is_pending());
    }

    #[test]
    fn test_frame_defer_reads_on_second_frame() {
        let mut frames = FrameDefer::default();
        assert!(!frames.on_frame());
        frames.request();
        assert!(!frames.on_frame());
        assert!(frames.on_frame());
        assert!(!frames.is_pending());
    }

    #[test]
    fn test_frame_defer_cancel() {
        let mut frames = FrameDefer::default();
        frames.request();
        frames.cancel();
        assert!(!frames.on_frame());
        assert!(!frames.on_frame());
    }

    #[test]
    fn test_suppress_guard_restores_flag() {
        let flag = SuppressFlag::new();
        assert!(!flag.is_suppressed());
        {
            let _outer = flag.suppress();
            assert!(flag.is_suppressed());
            {
                let _inner = flag.clone().suppress();
                assert!(flag.is_suppressed());
            }
            // Inner guard restores the outer state
            assert!(flag.is_suppressed());
        }
        assert!(!flag.is_suppressed());
    }

    #[test]
    fn test_document_burst_coalesces_into_one_rescan() {
        let mut scheduler = Scheduler::default();
        for t in [0, 100, 200] {
            scheduler.trigger(Trigger::DocumentChanged, t);
        }
        scheduler.poll(400);
        assert!(scheduler.on_animation_frame().is_none());
        scheduler.poll(500);
        assert_eq!(run_frames(&mut scheduler), Some(PassRequest::RESCAN));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_resize_drag_is_throttled_then_settles() {
        let mut scheduler = Scheduler::default();
        // Leading edge relays out right away
        scheduler.trigger(Trigger::Resize, 0);
        assert_eq!(run_frames(&mut scheduler), Some(PassRequest::RELAYOUT));

        scheduler.trigger(Trigger::Resize, 10);
        scheduler.trigger(Trigger::Resize, 20);
        scheduler.poll(40);
        assert!(run_frames(&mut scheduler).is_none());
        scheduler.poll(50);
        assert_eq!(run_frames(&mut scheduler), Some(PassRequest::RELAYOUT));

        // Quiet period after the last trigger yields the settle pass
        scheduler.poll(170);
        assert_eq!(run_frames(&mut scheduler), Some(PassRequest::RELAYOUT));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_passes_merge_while_waiting_for_frames() {
        let mut scheduler = Scheduler::default();
        scheduler.trigger(Trigger::Scroll, 0);
        scheduler.trigger(Trigger::Resize, 0);
        assert_eq!(run_frames(&mut scheduler), Some(PassRequest::RELAYOUT));
    }

    #[test]
    fn test_next_deadline_reports_earliest_timer() {
        let mut scheduler = Scheduler::default();
        assert_eq!(scheduler.next_deadline(), None);
        scheduler.trigger(Trigger::DocumentChanged, 10);
        scheduler.trigger(Trigger::SettingsChanged, 20);
        assert_eq!(scheduler.next_deadline(), Some(120));
    }

    #[test]
    fn test_file_switch_replaces_pending_work() {
        let mut scheduler = Scheduler::default();
        scheduler.trigger(Trigger::DocumentChanged, 0);
        scheduler.trigger(Trigger::FileSwitch, 10);
        assert_eq!(run_frames(&mut scheduler), Some(PassRequest::RESCAN));
        scheduler.poll(1_000);
        assert!(scheduler.on_animation_frame().is_none());
    }

    #[test]
    fn test_teardown_cancels_everything() {
        let mut scheduler = Scheduler::default();
        scheduler.trigger(Trigger::DocumentChanged, 0);
        scheduler.trigger(Trigger::Resize, 0);
        scheduler.trigger(Trigger::Resize, 10);
        scheduler.teardown();
        assert!(scheduler.is_idle());
        scheduler.poll(10_000);
        assert!(scheduler.on_animation_frame().is_none());
        assert!(scheduler.on_animation_frame().is_none());
    }
}
