//! Blockierende Eingabe-Warteschlange pro Controller-Port.
//!
//! Frames are stored under their delay-adjusted number. Readers request frames
//! strictly in order and may block until the writer (local input or the event
//! stream) delivered the frame.

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tracing::{error, trace};

/// How long [`InputQueue::get_buttons`] may wait for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Forever,
    Immediate,
    After(Duration),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("invalid frame {0}")]
    NegativeFrame(i32),
    #[error("delayed frame {frame} is within the initial delay of {initial_delay} frames")]
    WithinInitialDelay { frame: i32, initial_delay: i32 },
    #[error("delayed frame {frame} was already requested (latest request {latest})")]
    AlreadyRequested { frame: i32, latest: i32 },
    #[error("duplicate buttons for delayed frame {0}")]
    Duplicate(i32),
    #[error("unexpected frame {requested}, expected {expected}")]
    UnexpectedFrame { requested: i32, expected: i32 },
    #[error("timed out waiting for frame {0}")]
    Timeout(i32),
    #[error("frame {frame} shifted by {delay} frames overflows")]
    FrameOverflow { frame: i32, delay: i32 },
}

#[derive(Debug)]
struct QueueState<B> {
    latest_frame_requested: i32,
    frames: BTreeMap<i32, B>,
}

#[derive(Debug)]
pub struct InputQueue<B> {
    delay_frames: i32,
    initial_frame_delay: i32,
    state: Mutex<QueueState<B>>,
    available: Condvar,
}

impl<B: Default + Clone> InputQueue<B> {
    fn new(delay_frames: i32, initial_frame_delay: i32) -> Self {
        Self {
            delay_frames,
            initial_frame_delay,
            state: Mutex::new(QueueState {
                latest_frame_requested: -1,
                frames: BTreeMap::new(),
            }),
            available: Condvar::new(),
        }
    }

    /// Queue for input read on this machine. Every put is shifted by `delay_frames`.
    pub fn local(delay_frames: i32) -> Self {
        Self::new(delay_frames, delay_frames)
    }

    /// Queue for input from another client, which already shifted its frames.
    pub fn remote(delay_frames: i32) -> Self {
        Self::new(0, delay_frames)
    }

    pub fn delay_frames(&self) -> i32 {
        self.delay_frames
    }

    pub fn initial_frame_delay(&self) -> i32 {
        self.initial_frame_delay
    }

    /// Number of frames waiting to be read.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<B>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `buttons` so they become readable at `frame + delay_frames`.
    pub fn put_buttons(&self, frame: i32, buttons: B) -> Result<(), QueueError> {
        if frame < 0 {
            error!(frame, "attempted to put buttons into invalid frame");
            return Err(QueueError::NegativeFrame(frame));
        }
        let delayed = frame
            .checked_add(self.delay_frames)
            .ok_or(QueueError::FrameOverflow {
                frame,
                delay: self.delay_frames,
            })?;
        if delayed < self.initial_frame_delay {
            error!(delayed, initial_delay = self.initial_frame_delay, "put within initial delay");
            return Err(QueueError::WithinInitialDelay {
                frame: delayed,
                initial_delay: self.initial_frame_delay,
            });
        }

        {
            let mut state = self.lock();
            if delayed <= state.latest_frame_requested {
                error!(delayed, latest = state.latest_frame_requested, "put for frame already read");
                return Err(QueueError::AlreadyRequested {
                    frame: delayed,
                    latest: state.latest_frame_requested,
                });
            }
            if state.frames.contains_key(&delayed) {
                error!(delayed, "put duplicate buttons");
                return Err(QueueError::Duplicate(delayed));
            }
            state.frames.insert(delayed, buttons);
        }
        self.available.notify_all();
        Ok(())
    }

    /// Removes and returns the buttons for `frame`.
    ///
    /// Frames must be requested one at a time and in order. A timed out
    /// request may be repeated for the same frame.
    pub fn get_buttons(&self, frame: i32, timeout: Timeout) -> Result<B, QueueError> {
        trace!(frame, ?timeout, "requesting buttons");
        let mut state = self.lock();

        let expected = state.latest_frame_requested + 1;
        if frame != expected {
            error!(frame, expected, "requested unexpected frame");
            return Err(QueueError::UnexpectedFrame {
                requested: frame,
                expected,
            });
        }

        if frame < self.initial_frame_delay {
            state.latest_frame_requested = frame;
            return Ok(B::default());
        }

        let missing = |state: &mut QueueState<B>| !state.frames.contains_key(&frame);
        state = match timeout {
            Timeout::Forever => self
                .available
                .wait_while(state, missing)
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            Timeout::Immediate => state,
            Timeout::After(duration) => {
                let (state, result) = self
                    .available
                    .wait_timeout_while(state, duration, missing)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if result.timed_out() {
                    error!(frame, ?duration, "timed out waiting for buttons");
                }
                state
            }
        };

        match state.frames.remove(&frame) {
            Some(buttons) => {
                state.latest_frame_requested = frame;
                Ok(buttons)
            }
            None => Err(QueueError::Timeout(frame)),
        }
    }
}
