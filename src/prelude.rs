pub use crate::detection::Detection;
pub use crate::snapshot::{SnapshotCell, SnapshotReader, TrackSnapshot, TrackingSnapshot};
pub use crate::track::pool::TrackPool;
pub use crate::track::{Track, TrackStatus};
pub use crate::trackers::assignment::{Assigner, Assignment};
pub use crate::trackers::multi_target::MultiTargetTracker;
pub use crate::trackers::options::{TrackerBuilder, TrackerOptions};
pub use crate::trackers::single_target::SingleTargetTracker;
pub use crate::utils::kalman::kalman_2d_point::Point2DKalmanFilter;
pub use crate::utils::kalman::KalmanState;
pub use crate::worker::{DetectionSource, TrackingWorker, WorkerOptions};
pub use crate::Errors;
