use crate::detection::Detection;
use crate::utils::kalman::kalman_2d_point::{Point2DKalmanFilter, DIM_2D_POINT_X2};
use crate::utils::kalman::KalmanState;
use log::{debug, trace};
use nalgebra::{SMatrix, SVector};

/// Arena of track slots with a free list
pub mod pool;

/// Number of detections a track must collect (strictly more than) before it is reported
pub const DEFAULT_CONFIRMATION_THRESHOLD: usize = 5;

/// Lifecycle state of a track slot
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// The slot is free and may be recycled
    Inactive,
    /// The track is alive but has not collected enough detections yet
    Provisional,
    /// The track is alive and reported to consumers
    Confirmed,
}

/// Rectangle centered at the origin that bounds the valid estimated positions
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub half_width: f32,
    pub half_height: f32,
}

impl Envelope {
    pub fn new(half_width: f32, half_height: f32) -> Self {
        Self {
            half_width,
            half_height,
        }
    }

    /// Points on the border are inside
    ///
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x.abs() <= self.half_width && y.abs() <= self.half_height
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(40.0, 27.5)
    }
}

/// One slot of the track pool: the belief about a single physical object plus its
/// lifecycle bookkeeping.
///
#[derive(Debug, Clone)]
pub struct Track {
    slot: usize,
    track_id: Option<u64>,
    active: bool,
    state: KalmanState<DIM_2D_POINT_X2>,
    detection_streak: usize,
    age: usize,
    confirmation_threshold: usize,
    last_detection: Option<Detection>,
    last_measurement_time: Option<f64>,
}

impl Track {
    /// Creates an inactive track occupying `slot`
    ///
    pub fn new(slot: usize, confirmation_threshold: usize) -> Self {
        Self {
            slot,
            track_id: None,
            active: false,
            state: KalmanState::new(SVector::zeros(), SMatrix::zeros()),
            detection_streak: 0,
            age: 0,
            confirmation_threshold,
            last_detection: None,
            last_measurement_time: None,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Identity assigned on the latest activation. Recycled slots receive a new one.
    ///
    pub fn track_id(&self) -> Option<u64> {
        self.track_id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The track is reported to consumers when it is active and its detection streak
    /// exceeds the confirmation threshold
    ///
    pub fn is_tracking(&self) -> bool {
        self.active && self.detection_streak > self.confirmation_threshold
    }

    pub fn status(&self) -> TrackStatus {
        if !self.active {
            TrackStatus::Inactive
        } else if self.is_tracking() {
            TrackStatus::Confirmed
        } else {
            TrackStatus::Provisional
        }
    }

    pub fn state(&self) -> &KalmanState<DIM_2D_POINT_X2> {
        &self.state
    }

    pub fn position(&self) -> (f32, f32) {
        (self.state.mean[0], self.state.mean[1])
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state.mean[2], self.state.mean[3])
    }

    pub fn detection_streak(&self) -> usize {
        self.detection_streak
    }

    /// Frames elapsed since the latest activation
    ///
    pub fn age(&self) -> usize {
        self.age
    }

    pub fn last_detection(&self) -> Option<&Detection> {
        self.last_detection.as_ref()
    }

    pub fn last_measurement_time(&self) -> Option<f64> {
        self.last_measurement_time
    }

    #[cfg(test)]
    pub(crate) fn set_state(&mut self, state: KalmanState<DIM_2D_POINT_X2>) {
        self.state = state;
    }

    /// (Re)activates the slot with a fresh belief centered at the detection
    ///
    pub(crate) fn reset(
        &mut self,
        track_id: u64,
        filter: &Point2DKalmanFilter,
        detection: &Detection,
        now: f64,
    ) {
        self.track_id = Some(track_id);
        self.active = true;
        self.state = filter.initiate(&detection.center());
        self.detection_streak = 1;
        self.age = 0;
        self.last_detection = Some(detection.clone());
        self.last_measurement_time = Some(now);
    }

    pub(crate) fn predict(&mut self, filter: &Point2DKalmanFilter, dt: f32) {
        if self.active {
            self.state = filter.predict(&self.state, dt);
            self.age += 1;
        }
    }

    /// Corrects an active track. A degenerate correction keeps the prior belief but the
    /// detection still counts towards the streak.
    ///
    pub(crate) fn correct(&mut self, filter: &Point2DKalmanFilter, detection: &Detection, now: f64) {
        match filter.update(&self.state, &detection.center()) {
            Ok(state) => self.state = state,
            Err(e) => {
                debug!(
                    "Track {:?} in slot {} keeps the prior estimate: {}",
                    self.track_id, self.slot, e
                );
                trace!("Prior of slot {}: {}", self.slot, self.state.dump());
            }
        }
        self.detection_streak += 1;
        self.last_detection = Some(detection.clone());
        self.last_measurement_time = Some(now);
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
        self.detection_streak = 0;
        self.last_detection = None;
        self.last_measurement_time = None;
    }

    /// The track is stale when it was not measured for longer than `timeout` seconds or the
    /// estimate left the envelope. Inactive tracks are never stale.
    ///
    pub fn is_stale(&self, now: f64, timeout: f64, envelope: &Envelope) -> bool {
        if !self.active {
            return false;
        }
        let (x, y) = self.position();
        let expired = self
            .last_measurement_time
            .map(|t| now - t > timeout)
            .unwrap_or(true);
        expired || !envelope.contains(x, y)
    }
}
