use crate::detection::Detection;
use crate::snapshot::{TrackSnapshot, TrackingSnapshot};
use crate::track::Track;
use crate::trackers::options::TrackerOptions;
use crate::utils::kalman::kalman_2d_point::Point2DKalmanFilter;

/// Simplified tracker following a single object of the target class.
///
/// Shares the filter and the track lifecycle with [`crate::trackers::multi_target::MultiTargetTracker`]
/// but skips the assignment: an active track takes the detection closest to its estimate,
/// an inactive one is activated by the first detection of the frame.
///
#[derive(Debug)]
pub struct SingleTargetTracker {
    opts: TrackerOptions,
    filter: Point2DKalmanFilter,
    track: Track,
    clock: f64,
    sequence: u64,
    track_id: u64,
}

impl SingleTargetTracker {
    pub fn new(opts: TrackerOptions) -> Self {
        Self {
            filter: opts.filter(),
            track: Track::new(0, opts.confirmation_threshold),
            clock: 0.0,
            sequence: 0,
            track_id: 0,
            opts,
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Drops the current estimate, the next detection starts a new track
    ///
    pub fn reset(&mut self) {
        self.track.deactivate();
    }

    pub fn is_tracking(&self) -> bool {
        self.track.is_tracking()
    }

    /// Estimated position while the track is active
    ///
    pub fn position(&self) -> Option<(f32, f32)> {
        self.track.is_active().then(|| self.track.position())
    }

    pub fn velocity(&self) -> Option<(f32, f32)> {
        self.track.is_active().then(|| self.track.velocity())
    }

    /// Tracker clock, seconds
    ///
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            sequence: self.sequence,
            clock: self.clock,
            tracks: vec![TrackSnapshot::of(&self.track, self.opts.target_class)],
        }
    }

    pub fn step(&mut self, detections: &[Detection], dt: f32) {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.clock += dt as f64;
        self.sequence += 1;
        self.track.predict(&self.filter, dt);

        let mut candidates = detections
            .iter()
            .filter(|d| d.class_id() == self.opts.target_class);

        if self.track.is_active() {
            let (x, y) = self.track.position();
            let nearest = candidates.min_by(|a, b| {
                let da = (a.center_x() - x).hypot(a.center_y() - y);
                let db = (b.center_x() - x).hypot(b.center_y() - y);
                da.total_cmp(&db)
            });
            if let Some(d) = nearest {
                self.track.correct(&self.filter, d, self.clock);
            }
        } else if let Some(d) = candidates.next() {
            self.track_id += 1;
            self.track.reset(self.track_id, &self.filter, d, self.clock);
        }
    }

    /// Deactivates the track when it became stale, returns `true` if it was lost
    ///
    pub fn update(&mut self) -> bool {
        let stale = self
            .track
            .is_stale(self.clock, self.opts.stale_timeout, &self.opts.envelope);
        if stale {
            self.track.deactivate();
        }
        stale
    }
}
