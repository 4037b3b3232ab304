use crate::track::{Envelope, DEFAULT_CONFIRMATION_THRESHOLD};
use crate::trackers::multi_target::MultiTargetTracker;
use crate::trackers::single_target::SingleTargetTracker;
use crate::utils::kalman::kalman_2d_point::{
    Point2DKalmanFilter, DEFAULT_INITIAL_COVARIANCE, DEFAULT_MEASUREMENT_NOISE,
    DEFAULT_POSITION_NOISE, DEFAULT_VELOCITY_NOISE,
};
use crate::Errors;
use anyhow::Result;

/// Seconds without a measurement after which a track is lost
pub const DEFAULT_STALE_TIMEOUT: f64 = 1.0;

/// Tracker configuration
///
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    /// Only detections of this class are tracked
    pub target_class: i32,
    /// A track is reported when its detection streak exceeds the value
    pub confirmation_threshold: usize,
    /// Seconds without measurement after which a track is deactivated
    pub stale_timeout: f64,
    /// Valid region of the estimated positions
    pub envelope: Envelope,
    /// Process noise variance of positions, per second
    pub position_noise: f32,
    /// Process noise variance of velocities, per second
    pub velocity_noise: f32,
    /// Measurement noise variance
    pub measurement_noise: f32,
    /// Prior covariance diagonal `[x, y, vx, vy]`
    pub initial_covariance: [f32; 4],
    /// Optional association gate, disabled by default
    pub max_association_distance: Option<f32>,
    /// Slots allocated upfront
    pub initial_capacity: usize,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            target_class: 0,
            confirmation_threshold: DEFAULT_CONFIRMATION_THRESHOLD,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            envelope: Envelope::default(),
            position_noise: DEFAULT_POSITION_NOISE,
            velocity_noise: DEFAULT_VELOCITY_NOISE,
            measurement_noise: DEFAULT_MEASUREMENT_NOISE,
            initial_covariance: DEFAULT_INITIAL_COVARIANCE,
            max_association_distance: None,
            initial_capacity: 0,
        }
    }
}

impl TrackerOptions {
    /// Filter configured with the noise parameters of the options
    ///
    pub fn filter(&self) -> Point2DKalmanFilter {
        Point2DKalmanFilter::new(
            self.position_noise,
            self.velocity_noise,
            self.measurement_noise,
        )
        .with_initial_covariance(self.initial_covariance)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> {
            Err(Errors::InvalidOption(msg.to_string()).into())
        };

        if !(self.stale_timeout.is_finite() && self.stale_timeout > 0.0) {
            return invalid("stale timeout must be a positive number of seconds");
        }
        if !(self.envelope.half_width > 0.0 && self.envelope.half_height > 0.0) {
            return invalid("envelope must have positive extents");
        }
        if [
            self.position_noise,
            self.velocity_noise,
            self.measurement_noise,
        ]
        .iter()
        .any(|v| !(v.is_finite() && *v >= 0.0))
        {
            return invalid("noise variances must be non-negative");
        }
        if self
            .initial_covariance
            .iter()
            .any(|v| !(v.is_finite() && *v > 0.0))
        {
            return invalid("initial covariance must be positive");
        }
        if let Some(d) = self.max_association_distance {
            if d.is_nan() || d <= 0.0 {
                return invalid("association gate must be positive");
            }
        }
        Ok(())
    }
}

/// Builder for trackers
///
/// ```
/// use tracktor::prelude::TrackerBuilder;
///
/// let tracker = TrackerBuilder::new(1)
///     .confirmation_threshold(5)
///     .stale_timeout(1.0)
///     .envelope(40.0, 27.5)
///     .build()
///     .unwrap();
/// assert_eq!(tracker.target_class(), 1);
/// ```
///
#[derive(Debug, Clone, Default)]
pub struct TrackerBuilder {
    opts: TrackerOptions,
}

impl TrackerBuilder {
    /// Creates a builder with default options for the class `target_class`
    ///
    pub fn new(target_class: i32) -> Self {
        Self {
            opts: TrackerOptions {
                target_class,
                ..Default::default()
            },
        }
    }

    pub fn from_options(opts: TrackerOptions) -> Self {
        Self { opts }
    }

    pub fn confirmation_threshold(mut self, threshold: usize) -> Self {
        self.opts.confirmation_threshold = threshold;
        self
    }

    pub fn stale_timeout(mut self, seconds: f64) -> Self {
        self.opts.stale_timeout = seconds;
        self
    }

    pub fn envelope(mut self, half_width: f32, half_height: f32) -> Self {
        self.opts.envelope = Envelope::new(half_width, half_height);
        self
    }

    /// Sets the process noise variances of position and velocity and the measurement noise
    ///
    pub fn noise(mut self, position: f32, velocity: f32, measurement: f32) -> Self {
        self.opts.position_noise = position;
        self.opts.velocity_noise = velocity;
        self.opts.measurement_noise = measurement;
        self
    }

    pub fn initial_covariance(mut self, diagonal: [f32; 4]) -> Self {
        self.opts.initial_covariance = diagonal;
        self
    }

    pub fn max_association_distance(mut self, distance: f32) -> Self {
        self.opts.max_association_distance = Some(distance);
        self
    }

    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.opts.initial_capacity = capacity;
        self
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.opts
    }

    /// Builds the multi-target tracker
    ///
    pub fn build(self) -> Result<MultiTargetTracker> {
        self.opts.validate()?;
        Ok(MultiTargetTracker::new(self.opts))
    }

    /// Builds the single-target tracker sharing the same options
    ///
    pub fn build_single(self) -> Result<SingleTargetTracker> {
        self.opts.validate()?;
        Ok(SingleTargetTracker::new(self.opts))
    }
}
