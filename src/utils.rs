/// Kalman filter
pub mod kalman;
