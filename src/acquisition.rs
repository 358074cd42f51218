//! Stale-frame flushing and bounded frame acquisition.
//!
//! The camera runs in continuous video mode and keeps a small pool of
//! completed frames. A single exposure is obtained by draining that pool and
//! then polling for the next frame until it arrives, the watchdog expires, or
//! the caller cancels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::traits::{CameraId, CameraSdk, SdkStatus};

/// Number of internal frame buffers on the camera.
pub const FLUSH_FRAME_LIMIT: usize = 2;

/// Upper bound of a single frame poll, in milliseconds.
pub const MAX_POLL_MS: u32 = 100;

/// Default extra allowance on top of exposure and device timeout.
pub const DEFAULT_WATCHDOG_SLACK: Duration = Duration::from_secs(10);

const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Cooperative cancellation flag shared between the guiding loop and a capture.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` if the sleep was interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Wall-clock limit for one capture attempt.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    started: Instant,
    limit: Duration,
}

impl Watchdog {
    /// Total time allowed for an exposure of `duration_ms`.
    #[must_use]
    pub fn limit_for(duration_ms: u32, device_timeout: Duration, slack: Duration) -> Duration {
        Duration::from_millis(u64::from(duration_ms)) + device_timeout + slack
    }

    /// Start a watchdog for an exposure of `duration_ms`.
    #[must_use]
    pub fn start(duration_ms: u32, device_timeout: Duration, slack: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Self::limit_for(duration_ms, device_timeout, slack),
        }
    }

    /// Configured limit.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }

    /// Time since the watchdog started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the limit has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.elapsed() > self.limit
    }
}

/// Poll interval for an exposure of `duration_ms`.
#[must_use]
pub fn poll_interval_ms(duration_ms: u32) -> u32 {
    duration_ms.min(MAX_POLL_MS)
}

/// Drain frames the camera buffered before this request.
///
/// Each attempt is a zero-wait poll; draining stops at the first poll that
/// returns no data or after [`FLUSH_FRAME_LIMIT`] frames. Returns the number
/// of frames discarded.
pub fn flush_buffered_frames<S: CameraSdk>(sdk: &mut S, id: CameraId, scratch: &mut [u8]) -> usize {
    let mut cleared = 0;
    while cleared < FLUSH_FRAME_LIMIT {
        if sdk.video_data(id, scratch, 0).is_err() {
            break;
        }
        cleared += 1;
        debug!(camera = id, cleared, "flushed buffered frame");
    }
    cleared
}

/// How a wait for a frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// `buffer` holds a new frame.
    FrameReady,
    /// The cancellation token was raised.
    Cancelled,
    /// The watchdog expired.
    TimedOut {
        /// Time spent waiting.
        elapsed: Duration,
        /// Status of the last failed poll.
        last_status: SdkStatus,
    },
}

/// Poll for the next frame until one arrives, the watchdog expires or the
/// token is cancelled.
///
/// Cancellation and the watchdog are checked after every failed poll, so the
/// worst-case reaction time is one poll interval.
pub fn wait_for_frame<S: CameraSdk>(
    sdk: &mut S,
    id: CameraId,
    buffer: &mut [u8],
    poll_ms: u32,
    watchdog: &Watchdog,
    cancel: &CancellationToken,
) -> AcquireOutcome {
    loop {
        let status = match sdk.video_data(id, buffer, poll_ms) {
            Ok(()) => return AcquireOutcome::FrameReady,
            Err(status) => status,
        };

        if cancel.is_cancelled() {
            return AcquireOutcome::Cancelled;
        }

        if watchdog.expired() {
            debug!(camera = id, %status, "video data poll failed");
            return AcquireOutcome::TimedOut {
                elapsed: watchdog.elapsed(),
                last_status: status,
            };
        }
    }
}
