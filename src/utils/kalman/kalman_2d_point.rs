use crate::utils::kalman::KalmanState;
use crate::{Errors, EPS};
use nalgebra::{Point2, SMatrix, SVector};

pub const DIM_2D_POINT: usize = 2;
pub const DIM_2D_POINT_X2: usize = DIM_2D_POINT * 2;

/// Process noise of the position components, variance per second
pub const DEFAULT_POSITION_NOISE: f32 = 3.0;
/// Process noise of the velocity components, variance per second
pub const DEFAULT_VELOCITY_NOISE: f32 = 10.0;
/// Measurement noise variance on each axis
pub const DEFAULT_MEASUREMENT_NOISE: f32 = 0.1;
/// Prior covariance diagonal `[x, y, vx, vy]` used when a track is (re)activated
pub const DEFAULT_INITIAL_COVARIANCE: [f32; DIM_2D_POINT_X2] = [10.0, 10.0, 5.0, 5.0];

/// Constant-velocity Kalman filter for a point on a plane.
///
/// The state is `[x, y, vx, vy]`, the measurement is `[x, y]`. The filter is stateless,
/// the belief is passed in and returned as [`KalmanState`], time steps are explicit.
///
#[derive(Debug, Clone)]
pub struct Point2DKalmanFilter {
    update_matrix: SMatrix<f32, DIM_2D_POINT, DIM_2D_POINT_X2>,
    process_noise: SMatrix<f32, DIM_2D_POINT_X2, DIM_2D_POINT_X2>,
    measurement_noise: SMatrix<f32, DIM_2D_POINT, DIM_2D_POINT>,
    initial_covariance: SMatrix<f32, DIM_2D_POINT_X2, DIM_2D_POINT_X2>,
}

/// Default initializer
impl Default for Point2DKalmanFilter {
    fn default() -> Self {
        Point2DKalmanFilter::new(
            DEFAULT_POSITION_NOISE,
            DEFAULT_VELOCITY_NOISE,
            DEFAULT_MEASUREMENT_NOISE,
        )
    }
}

impl Point2DKalmanFilter {
    /// Creates the filter
    ///
    /// # Parameters
    /// * `position_noise` - process noise variance for `x` and `y`, per second
    /// * `velocity_noise` - process noise variance for `vx` and `vy`, per second
    /// * `measurement_noise` - measurement noise variance for `x` and `y`
    ///
    pub fn new(position_noise: f32, velocity_noise: f32, measurement_noise: f32) -> Self {
        Point2DKalmanFilter {
            update_matrix: SMatrix::identity(),
            process_noise: SMatrix::from_diagonal(&SVector::from([
                position_noise,
                position_noise,
                velocity_noise,
                velocity_noise,
            ])),
            measurement_noise: SMatrix::from_diagonal(&SVector::from([
                measurement_noise,
                measurement_noise,
            ])),
            initial_covariance: SMatrix::from_diagonal(&SVector::from(
                DEFAULT_INITIAL_COVARIANCE,
            )),
        }
    }

    /// Overrides the prior covariance diagonal used by [`Self::initiate`]
    ///
    pub fn with_initial_covariance(mut self, diagonal: [f32; DIM_2D_POINT_X2]) -> Self {
        self.initial_covariance = SMatrix::from_diagonal(&SVector::from(diagonal));
        self
    }

    fn motion_matrix(dt: f32) -> SMatrix<f32, DIM_2D_POINT_X2, DIM_2D_POINT_X2> {
        let mut motion_matrix: SMatrix<f32, DIM_2D_POINT_X2, DIM_2D_POINT_X2> =
            SMatrix::identity();

        for i in 0..DIM_2D_POINT {
            motion_matrix[(i, DIM_2D_POINT + i)] = dt;
        }
        motion_matrix
    }

    /// Initial belief for a freshly observed point: zero velocity and a wide prior
    ///
    pub fn initiate(&self, p: &Point2<f32>) -> KalmanState<DIM_2D_POINT_X2> {
        let mean: SVector<f32, DIM_2D_POINT_X2> = SVector::from_iterator([p.x, p.y, 0.0, 0.0]);
        KalmanState {
            mean,
            covariance: self.initial_covariance,
        }
    }

    /// Propagates the belief `dt` seconds forward. Negative or non-finite `dt` is treated as zero.
    ///
    pub fn predict(
        &self,
        state: &KalmanState<DIM_2D_POINT_X2>,
        dt: f32,
    ) -> KalmanState<DIM_2D_POINT_X2> {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let (mean, covariance) = (state.mean, state.covariance);
        let motion_matrix = Self::motion_matrix(dt);

        let mean = motion_matrix * mean;
        let covariance =
            motion_matrix * covariance * motion_matrix.transpose() + self.process_noise * dt;
        KalmanState { mean, covariance }
    }

    fn project(
        &self,
        mean: SVector<f32, DIM_2D_POINT_X2>,
        covariance: SMatrix<f32, DIM_2D_POINT_X2, DIM_2D_POINT_X2>,
    ) -> KalmanState<DIM_2D_POINT> {
        let mean = self.update_matrix * mean;
        let covariance = self.update_matrix * covariance * self.update_matrix.transpose()
            + self.measurement_noise;
        KalmanState { mean, covariance }
    }

    /// Corrects the belief with a measured position.
    ///
    /// Returns [`Errors::DegenerateInnovation`] when the innovation covariance is singular
    /// or the corrected belief is not finite; the caller is expected to keep the prior.
    ///
    pub fn update(
        &self,
        state: &KalmanState<DIM_2D_POINT_X2>,
        p: &Point2<f32>,
    ) -> Result<KalmanState<DIM_2D_POINT_X2>, Errors> {
        let (mean, covariance) = (state.mean, state.covariance);
        let projected_state = self.project(mean, covariance);
        let (projected_mean, projected_cov) = (projected_state.mean, projected_state.covariance);

        let scale = projected_cov.trace();
        if !projected_cov.iter().all(|v| v.is_finite())
            || projected_cov.determinant() <= EPS * scale * scale
        {
            return Err(Errors::DegenerateInnovation);
        }

        let choletsky = projected_cov
            .cholesky()
            .ok_or(Errors::DegenerateInnovation)?;
        let b = (covariance * self.update_matrix.transpose()).transpose();
        let kalman_gain = choletsky.solve(&b);

        let innovation = SVector::from_iterator([p.x, p.y]) - projected_mean;
        let innovation: SMatrix<f32, 1, DIM_2D_POINT> = innovation.transpose();

        let mean = mean + (innovation * kalman_gain).transpose();
        let covariance = covariance - kalman_gain.transpose() * projected_cov * kalman_gain;
        let state = KalmanState { mean, covariance };
        if state.is_finite() {
            Ok(state)
        } else {
            Err(Errors::DegenerateInnovation)
        }
    }

    /// Euclidean distance between the estimated position and a point
    ///
    pub fn distance(&self, state: &KalmanState<DIM_2D_POINT_X2>, p: &Point2<f32>) -> f32 {
        let projected = self.update_matrix * state.mean;
        (projected - SVector::from_iterator([p.x, p.y])).norm()
    }
}

impl From<KalmanState<{ DIM_2D_POINT_X2 }>> for Point2<f32> {
    fn from(s: KalmanState<{ DIM_2D_POINT_X2 }>) -> Self {
        Point2::from([s.mean.x, s.mean.y])
    }
}
