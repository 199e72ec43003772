//! Frame delivery queue and cross-channel synchronizer
//!
//! One slot per sensor channel holds the most recent unconsumed frame;
//! newer arrivals overwrite it. In dual mode a put on either channel runs a
//! pair check spanning both slots: timestamps within tolerance promote both
//! frames atomically as the delivered pair, a larger gap discards the older
//! slot so the channels keep reaching for alignment instead of drifting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;
use metrics::counter;
use tracing::{debug, error, warn};

use crate::capture::frame::{Frame, FrameOutput, SensorChannel};
use crate::capture::grabber::{DeviceFault, FrameSink};

type FrameCallback = Box<dyn Fn(&Frame) + Send + Sync>;

#[derive(Default)]
struct Stats {
    received: AtomicU64,
    delivered: AtomicU64,
    overwritten: AtomicU64,
    stale_dropped: AtomicU64,
    malformed: AtomicU64,
    rejected: AtomicU64,
}

/// Counter snapshot for observability of the drop decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Frames handed to `put`.
    pub received: u64,
    /// Outputs promoted (singles, or pairs counted once).
    pub delivered: u64,
    /// Slot overwrites of a still-unconsumed frame.
    pub overwritten: u64,
    /// Older-of-pair frames discarded for exceeding the tolerance.
    pub stale_dropped: u64,
    /// Frames filtered at ingestion for inconsistent buffer/dimensions.
    pub malformed: u64,
    /// Frames from a sensor id the configured channel does not carry.
    pub rejected: u64,
}

/// Bounded, freshness-biased frame queue with optional pair synchronization.
///
/// `put` is safe to call from the grabber's capture threads concurrently
/// with consumer reads and with puts on the other channel; the pair check
/// and clear runs as one critical section over both slots. `latest` is a
/// lock-free pointer load.
pub struct FrameQueue {
    channel: SensorChannel,
    tolerance_us: u64,
    slots: Mutex<[Option<Frame>; 2]>,
    /// Most recent fully-assembled output; repeated reads observe the same
    /// value until the next promotion.
    last: ArcSwapOption<FrameOutput>,
    subscribers: RwLock<Vec<FrameCallback>>,
    last_fault: Mutex<Option<DeviceFault>>,
    stats: CachePadded<Stats>,
}

impl FrameQueue {
    pub fn new(channel: SensorChannel, tolerance_us: u64) -> Self {
        Self {
            channel,
            tolerance_us,
            slots: Mutex::new([None, None]),
            last: ArcSwapOption::const_empty(),
            subscribers: RwLock::new(Vec::new()),
            last_fault: Mutex::new(None),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Ingest one frame from the grabber. Never blocks the caller beyond a
    /// short two-slot critical section and never fails: invalid input is
    /// filtered and counted, valid input is stored, promoted or dropped by
    /// the staleness rules.
    pub fn put(&self, frame: Frame) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        if frame.is_empty() || !frame.is_well_formed() {
            self.stats.malformed.fetch_add(1, Ordering::Relaxed);
            counter!("gemini_frames_malformed").increment(1);
            debug!(
                sensor_id = frame.sensor_id,
                len = frame.pixels.len(),
                width = frame.width,
                height = frame.height,
                "dropping malformed frame"
            );
            return;
        }
        if !self.channel.accepts(frame.sensor_id) {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            counter!("gemini_frames_rejected").increment(1);
            warn!(
                sensor_id = frame.sensor_id,
                channel = ?self.channel,
                "frame from inactive sensor discarded"
            );
            return;
        }

        let promoted = {
            let mut slots = lock_unpoisoned(&self.slots);

            let idx = usize::from(frame.sensor_id);
            if slots[idx].replace(frame).is_some() {
                self.stats.overwritten.fetch_add(1, Ordering::Relaxed);
                counter!("gemini_frames_overwritten").increment(1);
            }

            let promoted = if self.channel.is_dual() {
                self.try_pair(&mut slots)
            } else {
                slots[idx].take().map(FrameOutput::Single)
            };

            // Publish while still holding the slot lock so consecutive
            // promotions become visible in promotion order.
            if let Some(output) = &promoted {
                self.last.store(Some(Arc::new(output.clone())));
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            promoted
        };

        if let Some(output) = promoted {
            self.notify(&output);
        }
    }

    /// Pair check over both slots; caller holds the slot lock.
    fn try_pair(&self, slots: &mut [Option<Frame>; 2]) -> Option<FrameOutput> {
        let (t0, t1) = match (&slots[0], &slots[1]) {
            (Some(left), Some(right)) => (left.timestamp_us, right.timestamp_us),
            _ => return None,
        };

        if t0.abs_diff(t1) <= self.tolerance_us {
            let left = slots[0].take()?;
            let right = slots[1].take()?;
            return Some(FrameOutput::Pair { left, right });
        }

        // Too far apart: discard the older frame and keep waiting for a
        // closer partner to the newer one.
        let stale_idx = usize::from(t0 > t1);
        slots[stale_idx] = None;
        self.stats.stale_dropped.fetch_add(1, Ordering::Relaxed);
        counter!("gemini_frames_stale_dropped").increment(1);
        debug!(
            sensor_id = stale_idx,
            gap_us = t0.abs_diff(t1),
            tolerance_us = self.tolerance_us,
            "discarding stale frame outside pair tolerance"
        );
        None
    }

    /// Most recent delivered output, or `None` before the first promotion.
    ///
    /// Non-blocking and idempotent: with no new promotion in between,
    /// repeated calls return the same value.
    pub fn latest(&self) -> Option<Arc<FrameOutput>> {
        self.last.load_full()
    }

    /// Register a callback invoked once per delivered frame (twice per
    /// synchronized pair, left then right).
    ///
    /// Callbacks run synchronously on whichever thread delivered the
    /// triggering event; marshal to another thread in the callback if the
    /// target environment needs it.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        lock_unpoisoned_write(&self.subscribers).push(Box::new(callback));
    }

    fn notify(&self, output: &FrameOutput) {
        let subscribers = match self.subscribers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for callback in subscribers.iter() {
            for frame in output.frames() {
                callback(frame);
            }
        }
    }

    /// Most recent fault reported by the grabber, if any.
    pub fn last_fault(&self) -> Option<DeviceFault> {
        lock_unpoisoned(&self.last_fault).clone()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            received: self.stats.received.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            overwritten: self.stats.overwritten.load(Ordering::Relaxed),
            stale_dropped: self.stats.stale_dropped.load(Ordering::Relaxed),
            malformed: self.stats.malformed.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
        }
    }
}

impl FrameSink for FrameQueue {
    fn on_frame(&self, frame: Frame) {
        self.put(frame);
    }

    fn on_fault(&self, fault: &DeviceFault) {
        error!(description = %fault.description, "frame grabber fault");
        *lock_unpoisoned(&self.last_fault) = Some(fault.clone());
    }
}

/// A poisoned lock only means another thread panicked mid-update of data we
/// overwrite wholesale anyway, so recover the guard instead of panicking.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_unpoisoned_write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
