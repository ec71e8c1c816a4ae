//! Playback state machine over an execution log.
//!
//! [`Playback`] is the only owner of the playback state. It is `Empty` until a
//! non-empty log is loaded and `Loaded` afterwards. Navigation is clamped and
//! never fails; requests that make no sense while `Empty` are ignored.
//!
//! Autoplay is a repeating timer obtained from an injected [`TickScheduler`].
//! The controller keeps the timer's handle and drops it (cancelling the
//! timer) on every transition that invalidates it: toggling autoplay off,
//! `reset`, `load_log`, and the automatic stop at the end of the log. Each
//! timer is started with a fresh [`TickToken`]; ticks that arrive with any
//! other token are stale and ignored.

use std::time::Duration;

use crate::event::{ExecutionEvent, ExecutionLog};

/// Identity of one autoplay timer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TickToken(u64);

impl TickToken {
    pub fn new(generation: u64) -> Self {
        Self(generation)
    }

    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Source of repeating autoplay ticks.
///
/// `start` begins delivering `token` every `interval` until the returned
/// handle is dropped. Delivery happens outside the controller: whoever drives
/// the scheduler passes each token to [`Playback::on_tick`].
pub trait TickScheduler {
    type Handle;

    fn start(&mut self, interval: Duration, token: TickToken) -> Self::Handle;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Loaded,
}

/// Which transition produced a [`PlaybackChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Load,
    Reset,
    StepForward,
    StepBackward,
    SetStep,
    ToggleAutoPlay,
    /// Autoplay advanced one step.
    Tick,
    /// Autoplay reached the last step and switched itself off.
    AutoStop,
}

/// State after a transition, as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackChange {
    pub transition: Transition,
    pub step: usize,
    pub len: usize,
    pub auto_play: bool,
}

type Observer = Box<dyn FnMut(&PlaybackChange)>;

pub struct Playback<S: TickScheduler> {
    log: ExecutionLog,
    current_step: usize,
    auto_play: bool,
    interval: Duration,
    scheduler: S,
    /// Live autoplay timer; dropping it cancels the timer.
    ticker: Option<S::Handle>,
    generation: u64,
    observers: Vec<Observer>,
}

impl<S: TickScheduler> Playback<S> {
    pub fn new(scheduler: S, interval: Duration) -> Self {
        Self {
            log: ExecutionLog::default(),
            current_step: 0,
            auto_play: false,
            interval,
            scheduler,
            ticker: None,
            generation: 0,
            observers: Vec::new(),
        }
    }

    /// Register an observer, notified after every applied transition.
    pub fn subscribe(&mut self, observer: impl FnMut(&PlaybackChange) + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn phase(&self) -> Phase {
        if self.log.is_empty() {
            Phase::Empty
        } else {
            Phase::Loaded
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.phase() == Phase::Loaded
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Current step. Meaningless (always 0) while `Empty`.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn current_event(&self) -> Option<&ExecutionEvent> {
        self.log.get(self.current_step)
    }

    pub fn auto_play(&self) -> bool {
        self.auto_play
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_at_end(&self) -> bool {
        self.log.last_index() == Some(self.current_step)
    }

    /// Token of the live autoplay timer, if any.
    pub fn active_token(&self) -> Option<TickToken> {
        self.ticker.as_ref().map(|_| TickToken(self.generation))
    }

    /// Replace the log. Autoplay stops and playback restarts at step 0.
    pub fn load_log(&mut self, log: ExecutionLog) {
        self.stop_timer();
        self.log = log;
        self.current_step = 0;
        self.auto_play = false;
        self.notify(Transition::Load);
    }

    /// Drop the log and return to `Empty`.
    pub fn reset(&mut self) {
        self.stop_timer();
        self.log = ExecutionLog::default();
        self.current_step = 0;
        self.auto_play = false;
        self.notify(Transition::Reset);
    }

    pub fn step_forward(&mut self) {
        let Some(last) = self.log.last_index() else {
            log::debug!("step_forward ignored: no log loaded");
            return;
        };
        self.current_step = (self.current_step + 1).min(last);
        self.notify(Transition::StepForward);
    }

    pub fn step_backward(&mut self) {
        if self.log.is_empty() {
            log::debug!("step_backward ignored: no log loaded");
            return;
        }
        self.current_step = self.current_step.saturating_sub(1);
        self.notify(Transition::StepBackward);
    }

    /// Jump to `step`, clamped to the log.
    pub fn set_step(&mut self, step: usize) {
        let Some(last) = self.log.last_index() else {
            log::debug!("set_step ignored: no log loaded");
            return;
        };
        self.current_step = step.min(last);
        self.notify(Transition::SetStep);
    }

    pub fn toggle_auto_play(&mut self) {
        if self.log.is_empty() {
            log::debug!("toggle_auto_play ignored: no log loaded");
            return;
        }
        self.auto_play = !self.auto_play;
        if self.auto_play {
            self.start_timer();
        } else {
            self.stop_timer();
        }
        self.notify(Transition::ToggleAutoPlay);
    }

    /// Deliver one autoplay tick.
    ///
    /// A tick that finds playback on the last step switches autoplay off
    /// instead of advancing.
    pub fn on_tick(&mut self, token: TickToken) {
        if self.active_token() != Some(token) {
            log::debug!("ignoring stale tick {token:?}");
            return;
        }
        if !self.auto_play || self.log.is_empty() {
            return;
        }

        if self.is_at_end() {
            self.auto_play = false;
            self.stop_timer();
            self.notify(Transition::AutoStop);
        } else {
            self.current_step += 1;
            self.notify(Transition::Tick);
        }
    }

    fn start_timer(&mut self) {
        self.stop_timer();
        self.generation += 1;
        let token = TickToken(self.generation);
        self.ticker = Some(self.scheduler.start(self.interval, token));
    }

    fn stop_timer(&mut self) {
        self.ticker = None;
    }

    fn notify(&mut self, transition: Transition) {
        let change = PlaybackChange {
            transition,
            step: self.current_step,
            len: self.log.len(),
            auto_play: self.auto_play,
        };
        for observer in &mut self.observers {
            observer(&change);
        }
    }
}
