//! Automatic playback through the day.
//!
//! [`PlaybackConfig`] is always available. With the `player` feature, a
//! [`Player`] runs a tokio task that emits the next [`TimeBucket`] on every
//! tick while playing; play, pause and speed changes are sent over a watch
//! channel and take effect immediately.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

pub const MIN_SPEED: u8 = 1;
pub const MAX_SPEED: u8 = 10;

/// Playback rate in windows per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Ticks per second, 1..=10.
    /// Default: 1
    pub speed: u8,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { speed: MIN_SPEED }
    }
}

impl PlaybackConfig {
    pub fn new(speed: u8) -> Result<Self> {
        let config = Self { speed };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if (MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            Ok(())
        } else {
            Err(Error::InvalidConfig {
                name: "speed",
                value: self.speed.to_string(),
                reason: "must be between 1 and 10",
            })
        }
    }

    /// Time between ticks.
    ///
    /// ```
    /// use ride_pulse::PlaybackConfig;
    /// use std::time::Duration;
    ///
    /// assert_eq!(PlaybackConfig { speed: 4 }.period(), Duration::from_millis(250));
    /// ```
    pub fn period(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.speed.max(MIN_SPEED)))
    }
}

#[cfg(feature = "player")]
pub use timer::Player;

#[cfg(feature = "player")]
mod timer {
    use log::{debug, info};
    use tokio::sync::mpsc::{self, error::TrySendError};
    use tokio::sync::watch;
    use tokio::task::JoinHandle;
    use tokio::time::{interval_at, Instant, MissedTickBehavior};

    use super::PlaybackConfig;
    use crate::error::Result;
    use crate::TimeBucket;

    const TICK_BUFFER: usize = 16;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Control {
        playing: bool,
        config: PlaybackConfig,
        /// Bumped on every play/pause transition; ticks from an older
        /// generation are discarded on receipt.
        generation: u64,
    }

    /// Handle to a running playback task.
    ///
    /// Starts paused. The handle owns the current bucket: the task only
    /// emits ticks, so ticks queued before a pause never move the position.
    /// Dropping the handle stops the task.
    #[derive(Debug)]
    pub struct Player {
        control: watch::Sender<Control>,
        ticks: mpsc::Receiver<u64>,
        bucket: TimeBucket,
        task: JoinHandle<()>,
    }

    impl Player {
        /// Spawn the playback task on the current tokio runtime.
        ///
        /// Must be called from within a runtime.
        pub fn spawn(from: TimeBucket, config: PlaybackConfig) -> Result<Self> {
            config.validate()?;
            let (control, control_rx) = watch::channel(Control {
                playing: false,
                config,
                generation: 0,
            });
            let (tick_tx, ticks) = mpsc::channel(TICK_BUFFER);
            let task = tokio::spawn(run(control_rx, tick_tx));
            Ok(Self {
                control,
                ticks,
                bucket: from,
                task,
            })
        }

        pub fn play(&self) {
            self.set_playing(true);
            info!("Playback started");
        }

        pub fn pause(&self) {
            self.set_playing(false);
            info!("Playback paused");
        }

        /// Flip between playing and paused; returns the new state.
        pub fn toggle(&self) -> bool {
            let playing = !self.is_playing();
            self.set_playing(playing);
            playing
        }

        fn set_playing(&self, playing: bool) {
            self.control.send_if_modified(|c| {
                if c.playing == playing {
                    return false;
                }
                c.playing = playing;
                c.generation += 1;
                true
            });
        }

        pub fn is_playing(&self) -> bool {
            self.control.borrow().playing
        }

        pub fn speed(&self) -> u8 {
            self.control.borrow().config.speed
        }

        /// Current position.
        pub fn bucket(&self) -> TimeBucket {
            self.bucket
        }

        /// Change the tick rate. Rejected values leave the player unchanged.
        pub fn set_speed(&self, speed: u8) -> Result<()> {
            let config = PlaybackConfig::new(speed)?;
            self.control.send_modify(|c| c.config = config);
            debug!("Playback speed set to {} ({:?} per window)", speed, config.period());
            Ok(())
        }

        /// Advance on the next tick of the current play session and return
        /// the new bucket. Waits while paused; `None` once the task has
        /// stopped.
        pub async fn next_bucket(&mut self) -> Option<TimeBucket> {
            loop {
                let generation = self.ticks.recv().await?;
                if generation == self.control.borrow().generation {
                    self.bucket = self.bucket.next();
                    return Some(self.bucket);
                }
            }
        }

        pub fn stop(self) {
            self.task.abort();
        }
    }

    impl Drop for Player {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    async fn run(mut control: watch::Receiver<Control>, ticks: mpsc::Sender<u64>) {
        loop {
            let current = *control.borrow_and_update();
            if !current.playing {
                if control.changed().await.is_err() {
                    return;
                }
                continue;
            }

            let period = current.config.period();
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // A full buffer means the consumer is behind; skip the tick
                        match ticks.try_send(current.generation) {
                            Ok(()) | Err(TrySendError::Full(_)) => {}
                            Err(TrySendError::Closed(_)) => return,
                        }
                    }
                    changed = control.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        break;
                    }
                }
            }
        }
    }
}
