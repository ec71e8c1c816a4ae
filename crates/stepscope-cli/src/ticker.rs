//! Autoplay ticks from the tokio timer.
//!
//! Each started timer is a spawned task that sends its token over a channel
//! on every interval. The event loop receives the tokens and feeds them to
//! the playback controller. Dropping the handle aborts the task.

use std::time::Duration;

use stepscope::{TickScheduler, TickToken};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub struct TokioTicker {
    sender: mpsc::UnboundedSender<TickToken>,
}

pub fn channel() -> (TokioTicker, mpsc::UnboundedReceiver<TickToken>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (TokioTicker { sender }, receiver)
}

pub struct TickerHandle {
    task: JoinHandle<()>,
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TickScheduler for TokioTicker {
    type Handle = TickerHandle;

    /// Must be called from within a tokio runtime.
    fn start(&mut self, interval: Duration, token: TickToken) -> TickerHandle {
        let interval = interval.max(Duration::from_millis(1));
        let sender = self.sender.clone();
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if sender.send(token).is_err() {
                    break;
                }
            }
        });
        TickerHandle { task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_until_dropped() {
        let (mut ticker, mut ticks) = channel();
        let handle = ticker.start(Duration::from_millis(100), TickToken::new(3));

        assert_eq!(ticks.recv().await, Some(TickToken::new(3)));
        assert_eq!(ticks.recv().await, Some(TickToken::new(3)));

        drop(handle);
        drop(ticker);
        // Aborted task drops its sender, closing the channel
        while ticks.recv().await.is_some() {}
    }
}
