use crate::detection::Detection;
use crate::track::Track;
use crate::utils::kalman::kalman_2d_point::Point2DKalmanFilter;
use crate::Errors;
use anyhow::Result;
use std::collections::BTreeSet;

/// Ordered arena of track slots.
///
/// Slots are never removed: deactivated tracks return to the free list and are recycled,
/// so the capacity only grows. The free list always holds exactly the inactive slots and
/// the lowest free slot is handed out first.
///
#[derive(Debug, Clone)]
pub struct TrackPool {
    tracks: Vec<Track>,
    free: BTreeSet<usize>,
    confirmation_threshold: usize,
    next_track_id: u64,
}

impl TrackPool {
    /// Creates an empty pool
    ///
    /// # Parameters
    /// * `confirmation_threshold` - passed to every track created by the pool
    ///
    pub fn new(confirmation_threshold: usize) -> Self {
        Self {
            tracks: Vec::default(),
            free: BTreeSet::default(),
            confirmation_threshold,
            next_track_id: 0,
        }
    }

    pub fn with_capacity(capacity: usize, confirmation_threshold: usize) -> Self {
        let mut pool = Self::new(confirmation_threshold);
        pool.grow_to(capacity);
        pool
    }

    pub fn capacity(&self) -> usize {
        self.tracks.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn active_count(&self) -> usize {
        self.tracks.len() - self.free.len()
    }

    /// Grows the pool to at least `capacity` slots. Never shrinks.
    ///
    pub fn grow_to(&mut self, capacity: usize) {
        while self.tracks.len() < capacity {
            let slot = self.tracks.len();
            self.tracks
                .push(Track::new(slot, self.confirmation_threshold));
            self.free.insert(slot);
        }
    }

    /// Grows the pool until at least `n` slots are free
    ///
    pub fn ensure_free(&mut self, n: usize) {
        if self.free.len() < n {
            let missing = n - self.free.len();
            self.grow_to(self.tracks.len() + missing);
        }
    }

    /// Slots of all active tracks in ascending order
    ///
    pub fn active_slots(&self) -> Vec<usize> {
        self.tracks
            .iter()
            .filter(|t| t.is_active())
            .map(|t| t.slot())
            .collect()
    }

    pub fn get(&self, slot: usize) -> Option<&Track> {
        self.tracks.get(slot)
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut Track> {
        self.tracks.get_mut(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.iter_mut()
    }

    fn gen_track_id(&mut self) -> u64 {
        self.next_track_id += 1;
        self.next_track_id
    }

    /// Activates a specific free slot with the detection
    ///
    /// Returns the identity assigned to the new track. Activating a slot that is already
    /// active is an invariant violation and fails with [`Errors::SlotNotFree`].
    ///
    pub fn activate(
        &mut self,
        slot: usize,
        filter: &Point2DKalmanFilter,
        detection: &Detection,
        now: f64,
    ) -> Result<u64> {
        if slot >= self.tracks.len() {
            return Err(Errors::MissingSlot(slot).into());
        }
        if !self.free.remove(&slot) {
            return Err(Errors::SlotNotFree(slot).into());
        }
        let track_id = self.gen_track_id();
        self.tracks[slot].reset(track_id, filter, detection, now);
        Ok(track_id)
    }

    /// Takes the lowest free slot and activates it with the detection
    ///
    pub fn activate_free(
        &mut self,
        filter: &Point2DKalmanFilter,
        detection: &Detection,
        now: f64,
    ) -> Result<usize> {
        let slot = *self.free.iter().next().ok_or(Errors::NoFreeSlot)?;
        self.activate(slot, filter, detection, now)?;
        Ok(slot)
    }

    /// Applies a detection to the track in `slot`. An inactive track is implicitly
    /// reactivated instead of corrected.
    ///
    pub fn observe(
        &mut self,
        slot: usize,
        filter: &Point2DKalmanFilter,
        detection: &Detection,
        now: f64,
    ) -> Result<()> {
        let active = self
            .tracks
            .get(slot)
            .ok_or(Errors::MissingSlot(slot))?
            .is_active();
        if active {
            self.tracks[slot].correct(filter, detection, now);
        } else {
            self.activate(slot, filter, detection, now)?;
        }
        Ok(())
    }

    /// Deactivates the track in `slot` and returns it to the free list
    ///
    pub fn release(&mut self, slot: usize) -> Result<()> {
        let track = self.tracks.get_mut(slot).ok_or(Errors::MissingSlot(slot))?;
        track.deactivate();
        self.free.insert(slot);
        Ok(())
    }
}
