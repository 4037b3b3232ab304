use crate::detection::Detection;
use crate::track::Track;
use crate::Errors;
use crossbeam::epoch::{self, Atomic, Owned, Pointer, Shared};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Point-in-time state of one track slot
///
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub slot: usize,
    pub track_id: Option<u64>,
    pub class_id: i32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub is_tracking: bool,
    pub last_detection: Option<Detection>,
}

impl TrackSnapshot {
    /// Copies the state of `track` reported for the objects of `class_id`
    ///
    pub fn of(track: &Track, class_id: i32) -> Self {
        let (x, y) = track.position();
        let (vx, vy) = track.velocity();
        Self {
            slot: track.slot(),
            track_id: track.track_id(),
            class_id,
            x,
            y,
            vx,
            vy,
            is_tracking: track.is_tracking(),
            last_detection: track.last_detection().cloned(),
        }
    }
}

/// Immutable state of all track slots produced by one tracker step
///
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackingSnapshot {
    /// Number of the tracker step the snapshot was taken after, `0` for the empty snapshot
    pub sequence: u64,
    /// Tracker clock, seconds
    pub clock: f64,
    pub tracks: Vec<TrackSnapshot>,
}

impl TrackingSnapshot {
    /// The "no tracks" sentinel
    ///
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks which are confirmed and reported as valid
    ///
    pub fn tracking(&self) -> impl Iterator<Item = &TrackSnapshot> {
        self.tracks.iter().filter(|t| t.is_tracking)
    }

    /// Positions of the confirmed tracks
    ///
    pub fn positions(&self) -> Vec<(f32, f32)> {
        self.tracking().map(|t| (t.x, t.y)).collect()
    }
}

/// Single-producer multi-consumer cell holding the latest published snapshot.
///
/// Readers never block: they pin the epoch, load the pointer and clone the `Arc`. The
/// writer replaces the pointer with a compare-and-swap and retires the previous value
/// through epoch-based reclamation. A null pointer is read as the empty snapshot.
///
pub struct SnapshotCell {
    current: Atomic<Arc<TrackingSnapshot>>,
    empty: Arc<TrackingSnapshot>,
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCell")
            .field("sequence", &self.load().sequence)
            .finish()
    }
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self {
            current: Atomic::null(),
            empty: Arc::new(TrackingSnapshot::empty()),
        }
    }

    /// Latest published snapshot or the empty sentinel
    ///
    pub fn load(&self) -> Arc<TrackingSnapshot> {
        let guard = epoch::pin();
        let current = self.current.load(Ordering::Acquire, &guard);
        // SAFETY: the pointer is retired with `defer_destroy` only, so it stays valid while
        // the guard is pinned
        match unsafe { current.as_ref() } {
            Some(snapshot) => snapshot.clone(),
            None => self.empty.clone(),
        }
    }

    /// Replaces the snapshot only if the cell still holds `expected`.
    ///
    /// Fails with [`Errors::SnapshotRace`] when another writer replaced the value after
    /// `expected` was read; the new snapshot is dropped in that case.
    ///
    pub fn compare_and_publish(
        &self,
        expected: &Arc<TrackingSnapshot>,
        snapshot: Arc<TrackingSnapshot>,
    ) -> Result<(), Errors> {
        let guard = epoch::pin();
        let current = self.current.load(Ordering::Acquire, &guard);
        // SAFETY: see `load`
        let unchanged = match unsafe { current.as_ref() } {
            Some(c) => Arc::ptr_eq(c, expected),
            None => Arc::ptr_eq(&self.empty, expected),
        };
        if !unchanged {
            return Err(Errors::SnapshotRace);
        }

        match self.current.compare_exchange(
            current,
            Owned::new(snapshot),
            Ordering::AcqRel,
            Ordering::Acquire,
            &guard,
        ) {
            Ok(_) => {
                if !current.is_null() {
                    // SAFETY: the pointer is unlinked, readers pinned before the swap keep it alive
                    unsafe { guard.defer_destroy(current) };
                }
                Ok(())
            }
            Err(_) => Err(Errors::SnapshotRace),
        }
    }

    /// Unconditionally replaces the snapshot
    ///
    pub fn store(&self, snapshot: Arc<TrackingSnapshot>) {
        self.swap(Owned::new(snapshot));
    }

    /// Publishes the empty sentinel
    ///
    pub fn clear(&self) {
        self.swap(Shared::null());
    }

    fn swap<P: Pointer<Arc<TrackingSnapshot>>>(&self, new: P) {
        let guard = epoch::pin();
        let previous = self.current.swap(new, Ordering::AcqRel, &guard);
        if !previous.is_null() {
            // SAFETY: the pointer is unlinked, readers pinned before the swap keep it alive
            unsafe { guard.defer_destroy(previous) };
        }
    }
}

impl Drop for SnapshotCell {
    fn drop(&mut self) {
        // SAFETY: `&mut self` guarantees there are no concurrent readers
        unsafe {
            let guard = epoch::unprotected();
            let current = self.current.swap(Shared::null(), Ordering::AcqRel, guard);
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}

/// Cloneable read handle for the threads consuming snapshots
///
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    cell: Arc<SnapshotCell>,
}

impl SnapshotReader {
    pub fn new(cell: Arc<SnapshotCell>) -> Self {
        Self { cell }
    }

    /// Non-blocking read of the latest snapshot
    ///
    pub fn current(&self) -> Arc<TrackingSnapshot> {
        self.cell.load()
    }
}
