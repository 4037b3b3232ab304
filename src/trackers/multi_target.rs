use crate::detection::Detection;
use crate::snapshot::{TrackSnapshot, TrackingSnapshot};
use crate::track::pool::TrackPool;
use crate::track::Track;
use crate::trackers::assignment::Assigner;
use crate::trackers::options::TrackerOptions;
use crate::utils::kalman::kalman_2d_point::Point2DKalmanFilter;
use anyhow::Result;
use log::{debug, error};
use nalgebra::Point2;

/// Tracker of all objects of one class.
///
/// Every frame is processed in two calls: [`MultiTargetTracker::step`] predicts the active
/// tracks, associates the frame detections and corrects the matched tracks;
/// [`MultiTargetTracker::update`] ages out the tracks which became stale.
///
#[derive(Debug)]
pub struct MultiTargetTracker {
    opts: TrackerOptions,
    filter: Point2DKalmanFilter,
    assigner: Assigner,
    pool: TrackPool,
    clock: f64,
    sequence: u64,
    max_detections: usize,
}

impl MultiTargetTracker {
    /// Creates the tracker; use [`crate::trackers::options::TrackerBuilder`] to get validated options
    ///
    pub fn new(opts: TrackerOptions) -> Self {
        Self {
            filter: opts.filter(),
            assigner: Assigner::new(opts.max_association_distance),
            pool: TrackPool::with_capacity(opts.initial_capacity, opts.confirmation_threshold),
            clock: 0.0,
            sequence: 0,
            max_detections: 0,
            opts,
        }
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.opts
    }

    pub fn target_class(&self) -> i32 {
        self.opts.target_class
    }

    /// Tracker time, the sum of all `dt` passed to [`Self::step`]
    ///
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Number of processed steps
    ///
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pool_capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    /// The largest number of target-class detections observed in one frame
    ///
    pub fn max_detections(&self) -> usize {
        self.max_detections
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.pool.iter()
    }

    pub fn track(&self, slot: usize) -> Option<&Track> {
        self.pool.get(slot)
    }

    #[cfg(test)]
    pub(crate) fn pool_mut(&mut self) -> &mut TrackPool {
        &mut self.pool
    }

    /// Processes one frame of detections
    ///
    /// # Parameters
    /// * `detections` - all detections of the frame, other classes are ignored
    /// * `dt` - seconds elapsed since the previous frame
    ///
    /// Errors are invariant violations of the pool or the assignment engine.
    ///
    pub fn step(&mut self, detections: &[Detection], dt: f32) -> Result<()> {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.clock += dt as f64;
        self.sequence += 1;

        for track in self.pool.iter_mut() {
            track.predict(&self.filter, dt);
        }

        let candidates = detections
            .iter()
            .filter(|d| d.class_id() == self.opts.target_class)
            .collect::<Vec<_>>();

        self.max_detections = self.max_detections.max(candidates.len());
        self.pool.grow_to(self.max_detections);

        if candidates.is_empty() {
            return Ok(());
        }

        let active = self.pool.active_slots();
        if active.is_empty() {
            for d in candidates {
                let slot = self.pool.activate_free(&self.filter, d, self.clock)?;
                debug!("Slot {} activated at {:?}", slot, d.center());
            }
            return Ok(());
        }

        let track_points = active
            .iter()
            .map(|slot| {
                let (x, y) = self.pool.get(*slot).map(Track::position).unwrap_or_default();
                Point2::new(x, y)
            })
            .collect::<Vec<_>>();
        let detection_points = candidates.iter().map(|d| d.center()).collect::<Vec<_>>();

        let assignment = self.assigner.solve(&track_points, &detection_points)?;

        for (row, col) in assignment.matches {
            self.pool
                .observe(active[row], &self.filter, candidates[col], self.clock)?;
        }

        self.pool
            .ensure_free(assignment.unmatched_detections.len());
        for col in assignment.unmatched_detections {
            let d = candidates[col];
            let slot = self.pool.activate_free(&self.filter, d, self.clock)?;
            debug!("Slot {} activated at {:?}", slot, d.center());
        }

        Ok(())
    }

    /// Deactivates the tracks that were not measured for too long or left the envelope
    ///
    /// Returns the number of deactivated tracks.
    ///
    pub fn update(&mut self) -> usize {
        let stale = self
            .pool
            .iter()
            .filter(|t| t.is_stale(self.clock, self.opts.stale_timeout, &self.opts.envelope))
            .map(|t| t.slot())
            .collect::<Vec<_>>();

        for slot in &stale {
            debug!(
                "Slot {} lost at {:?}",
                slot,
                self.pool.get(*slot).map(Track::position)
            );
            if let Err(e) = self.pool.release(*slot) {
                error!("Unable to release slot {}: {:?}", slot, e);
            }
        }
        stale.len()
    }

    /// Immutable copy of all track slots
    ///
    pub fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            sequence: self.sequence,
            clock: self.clock,
            tracks: self
                .pool
                .iter()
                .map(|t| TrackSnapshot::of(t, self.opts.target_class))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::detection::Detection;
    use crate::track::TrackStatus;
    use crate::trackers::multi_target::MultiTargetTracker;
    use crate::trackers::options::TrackerBuilder;
    use crate::utils::kalman::KalmanState;
    use nalgebra::SVector;

    const DT: f32 = 0.02;

    fn tracker() -> MultiTargetTracker {
        TrackerBuilder::new(1).build().unwrap()
    }

    fn confirm(t: &mut MultiTargetTracker, points: &[(f32, f32)]) {
        let detections = points
            .iter()
            .map(|(x, y)| Detection::point(1, *x, *y))
            .collect::<Vec<_>>();
        for _ in 0..6 {
            t.step(&detections, DT).unwrap();
            t.update();
        }
        assert_eq!(t.snapshot().tracking().count(), points.len());
    }

    fn slot_near(t: &MultiTargetTracker, x: f32, y: f32) -> usize {
        t.tracks()
            .filter(|t| t.is_active())
            .min_by(|a, b| {
                let da = (a.position().0 - x).hypot(a.position().1 - y);
                let db = (b.position().0 - x).hypot(b.position().1 - y);
                da.total_cmp(&db)
            })
            .unwrap()
            .slot()
    }

    #[test]
    fn round_trip() {
        let mut t = tracker();
        let d = Detection::point(1, 5.0, 3.0);
        for i in 0..6 {
            assert_eq!(t.snapshot().tracking().count(), 0, "frame {}", i);
            t.step(&[d.clone()], DT).unwrap();
            t.update();
        }
        let track = t.track(0).unwrap();
        assert_eq!(track.status(), TrackStatus::Confirmed);
        assert!(track.is_tracking());
        let (x, y) = track.position();
        let (vx, vy) = track.velocity();
        assert!((x - 5.0).abs() < 0.1);
        assert!((y - 3.0).abs() < 0.1);
        assert!(vx.abs() < 0.1);
        assert!(vy.abs() < 0.1);

        let snapshot = t.snapshot();
        assert_eq!(snapshot.sequence, 6);
        let s = snapshot.tracking().next().unwrap();
        assert_eq!(s.class_id, 1);
        assert_eq!(s.last_detection.as_ref(), Some(&d));
    }

    #[test]
    fn confirmation_threshold() {
        let mut t = tracker();
        let d = Detection::point(1, 1.0, 1.0);
        for _ in 0..5 {
            t.step(&[d.clone()], DT).unwrap();
        }
        let track = t.track(0).unwrap();
        assert!(track.is_active());
        assert_eq!(track.detection_streak(), 5);
        assert!(!track.is_tracking());

        t.step(&[d.clone()], DT).unwrap();
        assert!(t.track(0).unwrap().is_tracking());

        t.pool_mut().release(0).unwrap();
        let track = t.track(0).unwrap();
        assert!(!track.is_active());
        assert!(!track.is_tracking());
    }

    #[test]
    fn other_classes_are_ignored() {
        let mut t = tracker();
        t.step(&[Detection::point(2, 1.0, 1.0)], DT).unwrap();
        assert_eq!(t.active_count(), 0);
        assert_eq!(t.pool_capacity(), 0);
    }

    #[test]
    fn loss() {
        let mut t = tracker();
        confirm(&mut t, &[(5.0, 3.0)]);

        let mut lost_at = None;
        for i in 0..60 {
            t.step(&[], DT).unwrap();
            if t.update() > 0 && lost_at.is_none() {
                lost_at = Some(i);
            }
        }
        assert!(lost_at.unwrap() >= 49);
        let track = t.track(0).unwrap();
        assert_eq!(track.status(), TrackStatus::Inactive);
        assert!(!track.is_tracking());
        assert_eq!(track.detection_streak(), 0);
        assert!(track.last_detection().is_none());
        assert!(t.snapshot().tracking().next().is_none());
    }

    #[test]
    fn predict_only_idempotence() {
        let mut t = tracker();
        let d = Detection::point(1, 0.0, 0.0);
        t.step(&[d.clone()], DT).unwrap();
        t.step(&[Detection::point(1, 0.5, 0.2)], DT).unwrap();

        let before = t.track(0).unwrap().clone();
        assert!(before.velocity().0 > 0.0);
        let mut prev_cov = before.state().covariance[(0, 0)];
        let mut prev_x = before.position().0;
        for _ in 0..10 {
            t.step(&[], DT).unwrap();
            let track = t.track(0).unwrap();
            assert_eq!(track.detection_streak(), before.detection_streak());
            assert_eq!(track.last_detection(), before.last_detection());
            assert_eq!(track.velocity(), before.velocity());
            assert!(track.position().0 > prev_x);
            assert!(track.state().covariance[(0, 0)] > prev_cov);
            prev_x = track.position().0;
            prev_cov = track.state().covariance[(0, 0)];
        }
    }

    #[test]
    fn multi_object_reassignment() {
        let mut t = tracker();
        confirm(&mut t, &[(0.0, 0.0), (10.0, 10.0)]);
        let near_origin = slot_near(&t, 0.0, 0.0);
        let far = slot_near(&t, 10.0, 10.0);
        assert_ne!(near_origin, far);

        // detections are listed in the order opposite to the slots
        t.step(
            &[Detection::point(1, 10.1, 10.1), Detection::point(1, 0.1, 0.1)],
            DT,
        )
        .unwrap();

        let (x, y) = t.track(near_origin).unwrap().position();
        assert!(x > 0.0 && x <= 0.1 && y > 0.0 && y <= 0.1);
        let (x, y) = t.track(far).unwrap().position();
        assert!(x > 10.0 && x <= 10.1 && y > 10.0 && y <= 10.1);
        assert_eq!(t.active_count(), 2);
        assert!(t.track(near_origin).unwrap().is_tracking());
        assert!(t.track(far).unwrap().is_tracking());
    }

    #[test]
    fn new_detection_spawns_track() {
        let mut t = tracker();
        confirm(&mut t, &[(0.0, 0.0)]);
        assert_eq!(t.pool_capacity(), 1);

        t.step(
            &[Detection::point(1, 0.0, 0.0), Detection::point(1, -8.0, 4.0)],
            DT,
        )
        .unwrap();
        assert_eq!(t.pool_capacity(), 2);
        assert_eq!(t.active_count(), 2);
        let spawned = t.track(1).unwrap();
        assert_eq!(spawned.status(), TrackStatus::Provisional);
        assert_eq!(spawned.position(), (-8.0, 4.0));
        assert_eq!(t.track(0).unwrap().detection_streak(), 7);
    }

    #[test]
    fn gated_detection_spawns_track() {
        let mut t = TrackerBuilder::new(1)
            .max_association_distance(1.0)
            .build()
            .unwrap();
        confirm(&mut t, &[(0.0, 0.0)]);

        t.step(&[Detection::point(1, 5.0, 5.0)], DT).unwrap();
        assert_eq!(t.active_count(), 2);
        assert_eq!(t.pool_capacity(), 2);
        assert_eq!(t.track(0).unwrap().detection_streak(), 6);
        assert_eq!(t.track(1).unwrap().position(), (5.0, 5.0));
    }

    #[test]
    fn out_of_bounds_eviction() {
        let mut t = tracker();
        confirm(&mut t, &[(5.0, 3.0)]);
        let track = t.track(0).unwrap();
        assert!(track.is_tracking());

        let covariance = track.state().covariance;
        t.pool_mut()
            .get_mut(0)
            .unwrap()
            .set_state(KalmanState::new(SVector::from([50.0, 3.0, 0.0, 0.0]), covariance));

        assert_eq!(t.update(), 1);
        let track = t.track(0).unwrap();
        assert_eq!(track.status(), TrackStatus::Inactive);
        assert_eq!(track.detection_streak(), 0);
    }

    #[test]
    fn capacity_monotonicity_and_injectivity() {
        let mut t = tracker();
        let frames: Vec<Vec<(f32, f32)>> = vec![
            vec![(0.0, 0.0)],
            vec![(0.0, 0.0), (5.0, 5.0), (-5.0, 5.0)],
            vec![],
            vec![(0.1, 0.0)],
            vec![(0.2, 0.0), (5.0, 5.1)],
            vec![(0.3, 0.0), (5.0, 5.2), (-5.0, 5.0), (9.0, -9.0), (-9.0, -9.0)],
            vec![],
            vec![(1.0, 1.0)],
        ];

        let mut capacity = t.pool_capacity();
        for frame in frames.iter().cycle().take(100) {
            let detections = frame
                .iter()
                .map(|(x, y)| Detection::point(1, *x, *y))
                .collect::<Vec<_>>();
            t.step(&detections, DT).unwrap();
            t.update();

            assert!(t.pool_capacity() >= capacity);
            assert!(t.pool_capacity() >= detections.len());
            capacity = t.pool_capacity();

            // every frame detection was consumed by exactly one track
            let consumed = t
                .tracks()
                .filter(|tr| {
                    tr.last_measurement_time()
                        .map(|time| time == t.clock())
                        .unwrap_or(false)
                })
                .collect::<Vec<_>>();
            assert_eq!(consumed.len(), detections.len());
            for d in &detections {
                assert_eq!(
                    consumed
                        .iter()
                        .filter(|tr| tr.last_detection() == Some(d))
                        .count(),
                    1
                );
            }
        }
        assert_eq!(t.pool_capacity(), 5);
        assert_eq!(t.max_detections(), 5);
    }

    #[test]
    fn zero_dt_and_empty_frames() {
        let mut t = tracker();
        t.step(&[], DT).unwrap();
        assert_eq!(t.update(), 0);
        t.step(&[Detection::point(1, 1.0, 1.0)], f32::NAN).unwrap();
        assert_eq!(t.clock(), DT as f64);
        assert_eq!(t.active_count(), 1);
    }
}
