//! Fixed-period frame ticks on the tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Longest frame step the animation accepts, in seconds.
pub const MAX_FRAME_DT: f32 = 0.033;

pub struct FrameLoop;

impl FrameLoop {
    /// Call `on_frame` every `period` until the returned handle is cancelled
    /// or dropped.
    pub fn start<F>(runtime: &Handle, period: Duration, mut on_frame: F) -> FrameLoopHandle
    where
        F: FnMut() + Send + 'static,
    {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopped);
        let period = period.max(Duration::from_millis(1));

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                on_frame();
            }
        });

        FrameLoopHandle {
            stopped,
            task: Some(task),
        }
    }
}

pub struct FrameLoopHandle {
    stopped: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FrameLoopHandle {
    pub fn cancel(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Frame loop cancelled");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for FrameLoopHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Turns wall-clock instants into clamped frame deltas.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    max_dt: f32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(MAX_FRAME_DT)
    }
}

impl FrameClock {
    pub fn new(max_dt: f32) -> Self {
        Self { last: None, max_dt }
    }

    /// Seconds since the previous call, in `[0, max_dt]`. The first call is 0.
    pub fn delta(&mut self, now: Instant) -> f32 {
        let dt = match self.last {
            Some(last) => now.saturating_duration_since(last).as_secs_f32(),
            None => 0.0,
        };
        self.last = Some(now);
        dt.clamp(0.0, self.max_dt)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
