use crate::Errors;
use anyhow::Result;
use itertools::Itertools;
use log::debug;
use nalgebra::Point2;
use pathfinding::kuhn_munkres::kuhn_munkres_min;
use pathfinding::matrix::Matrix;

const F32_I64_MULT: f32 = 1_000_000.0;
/// Distances above the value are clamped so that the scaled total cost cannot overflow
const MAX_DISTANCE: f32 = 1_000_000.0;

/// Result of a single frame association. Indices refer to the slices passed to
/// [`Assigner::solve`].
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    /// `(track, detection)` pairs
    pub matches: Vec<(usize, usize)>,
    /// Tracks which received no detection and are left to prediction
    pub unmatched_tracks: Vec<usize>,
    /// Detections that have no track yet
    pub unmatched_detections: Vec<usize>,
}

/// Optimal detection-to-track assignment.
///
/// The cost of a pair is the Euclidean distance between the track estimate and the detection
/// center. The cost matrix is padded with zero-cost cells to a square and solved for the
/// minimum total cost with the Hungarian (Kuhn-Munkres) method. Padding rows stand for
/// virtual tracks, padding columns for virtual detections.
///
#[derive(Debug, Clone, Default)]
pub struct Assigner {
    max_distance: Option<f32>,
}

impl Assigner {
    /// Creates the assigner
    ///
    /// # Parameters
    /// * `max_distance` - optional gate; real pairs farther apart than the gate are split into
    ///   an unmatched track and an unmatched detection
    ///
    pub fn new(max_distance: Option<f32>) -> Self {
        Self { max_distance }
    }

    pub fn max_distance(&self) -> Option<f32> {
        self.max_distance
    }

    fn weight(distance: f32) -> i64 {
        let distance = if distance.is_finite() {
            distance.min(MAX_DISTANCE)
        } else {
            MAX_DISTANCE
        };
        (distance * F32_I64_MULT) as i64
    }

    /// Square cost matrix of size `max(tracks, detections)`, rows are tracks
    ///
    pub fn cost_matrix(tracks: &[Point2<f32>], detections: &[Point2<f32>]) -> Matrix<i64> {
        let size = tracks.len().max(detections.len());
        let mut cost_matrix = Matrix::new(size, size, 0i64);
        for ((row, t), (col, d)) in tracks
            .iter()
            .enumerate()
            .cartesian_product(detections.iter().enumerate())
        {
            cost_matrix[(row, col)] = Self::weight(nalgebra::distance(t, d));
        }
        cost_matrix
    }

    /// Solves the association for one frame
    ///
    /// # Parameters
    /// * `tracks` - estimated positions of the active tracks
    /// * `detections` - centers of the frame detections
    ///
    pub fn solve(&self, tracks: &[Point2<f32>], detections: &[Point2<f32>]) -> Result<Assignment> {
        if tracks.is_empty() || detections.is_empty() {
            return Ok(Assignment {
                matches: Vec::default(),
                unmatched_tracks: (0..tracks.len()).collect(),
                unmatched_detections: (0..detections.len()).collect(),
            });
        }

        let cost_matrix = Self::cost_matrix(tracks, detections);
        let (total, solution) = kuhn_munkres_min(&cost_matrix);
        debug!(
            "Assignment of {} tracks and {} detections, total cost {}: {:?}",
            tracks.len(),
            detections.len(),
            total as f32 / F32_I64_MULT,
            &solution
        );

        if solution.len() != cost_matrix.rows || !solution.iter().all_unique() {
            return Err(Errors::InvalidAssignment(format!(
                "solution {:?} is not a permutation of {} columns",
                solution, cost_matrix.columns
            ))
            .into());
        }

        let mut res = Assignment::default();
        let mut matched_detections = vec![false; detections.len()];

        for (row, col) in solution.into_iter().enumerate() {
            let real_track = row < tracks.len();
            let real_detection = col < detections.len();
            match (real_track, real_detection) {
                (true, true) => {
                    let distance = nalgebra::distance(&tracks[row], &detections[col]);
                    let gated = self
                        .max_distance
                        .map(|max| distance > max || distance.is_nan())
                        .unwrap_or(false);
                    if gated {
                        res.unmatched_tracks.push(row);
                    } else {
                        matched_detections[col] = true;
                        res.matches.push((row, col));
                    }
                }
                (true, false) => res.unmatched_tracks.push(row),
                (false, true) => {}
                (false, false) => {
                    return Err(Errors::InvalidAssignment(format!(
                        "padding cell ({}, {}) in a square matrix of {} tracks and {} detections",
                        row,
                        col,
                        tracks.len(),
                        detections.len()
                    ))
                    .into())
                }
            }
        }

        res.unmatched_detections = matched_detections
            .into_iter()
            .enumerate()
            .filter(|(_, matched)| !matched)
            .map(|(col, _)| col)
            .collect();

        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use crate::trackers::assignment::{Assigner, Assignment};
    use itertools::Itertools;
    use nalgebra::Point2;

    fn points(v: &[(f32, f32)]) -> Vec<Point2<f32>> {
        v.iter().map(|(x, y)| Point2::new(*x, *y)).collect()
    }

    #[test]
    fn cost_matrix_is_padded() {
        let m = Assigner::cost_matrix(&points(&[(0.0, 0.0)]), &points(&[(3.0, 4.0), (0.0, 1.0)]));
        assert_eq!(m.rows, 2);
        assert_eq!(m.columns, 2);
        assert_eq!(m[(0, 0)], 5_000_000);
        assert_eq!(m[(0, 1)], 1_000_000);
        assert_eq!(m[(1, 0)], 0);
        assert_eq!(m[(1, 1)], 0);
    }

    #[test]
    fn nearest_pairs() {
        let a = Assigner::default();
        let res = a
            .solve(
                &points(&[(0.0, 0.0), (10.0, 10.0)]),
                &points(&[(10.1, 10.1), (0.1, 0.1)]),
            )
            .unwrap();
        assert_eq!(
            res,
            Assignment {
                matches: vec![(0, 1), (1, 0)],
                unmatched_tracks: vec![],
                unmatched_detections: vec![],
            }
        );
    }

    #[test]
    fn global_optimum_beats_greedy() {
        // greedy matching takes the closest pair (0, 0) first and ends with the total of 5.5
        let a = Assigner::default();
        let res = a
            .solve(
                &points(&[(0.0, 0.0), (2.5, 0.0)]),
                &points(&[(1.0, 0.0), (-2.0, 0.0)]),
            )
            .unwrap();
        assert_eq!(res.matches, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn more_detections_than_tracks() {
        let a = Assigner::default();
        let res = a
            .solve(
                &points(&[(5.0, 5.0)]),
                &points(&[(0.0, 0.0), (5.2, 5.1), (-7.0, 3.0)]),
            )
            .unwrap();
        assert_eq!(res.matches, vec![(0, 1)]);
        assert!(res.unmatched_tracks.is_empty());
        assert_eq!(res.unmatched_detections, vec![0, 2]);
    }

    #[test]
    fn more_tracks_than_detections() {
        let a = Assigner::default();
        let res = a
            .solve(
                &points(&[(0.0, 0.0), (5.0, 5.0), (-5.0, -5.0)]),
                &points(&[(-4.9, -5.0)]),
            )
            .unwrap();
        assert_eq!(res.matches, vec![(2, 0)]);
        assert_eq!(res.unmatched_tracks, vec![0, 1]);
        assert!(res.unmatched_detections.is_empty());
    }

    #[test]
    fn empty_sides() {
        let a = Assigner::default();
        let res = a.solve(&points(&[(0.0, 0.0)]), &[]).unwrap();
        assert_eq!(res.unmatched_tracks, vec![0]);
        let res = a.solve(&[], &points(&[(0.0, 0.0), (1.0, 1.0)])).unwrap();
        assert_eq!(res.unmatched_detections, vec![0, 1]);
        assert!(res.matches.is_empty());
    }

    #[test]
    fn gate_splits_far_pairs() {
        let a = Assigner::new(Some(2.0));
        let res = a
            .solve(
                &points(&[(0.0, 0.0), (10.0, 0.0)]),
                &points(&[(0.5, 0.0), (20.0, 0.0)]),
            )
            .unwrap();
        assert_eq!(res.matches, vec![(0, 0)]);
        assert_eq!(res.unmatched_tracks, vec![1]);
        assert_eq!(res.unmatched_detections, vec![1]);
    }

    #[test]
    fn injective() {
        let a = Assigner::default();
        let tracks = points(&[(0.0, 0.0), (0.1, 0.0), (0.2, 0.0), (9.0, 9.0)]);
        let detections = points(&[(0.05, 0.0), (0.05, 0.0), (0.05, 0.0), (0.05, 0.0), (3.0, 3.0)]);
        let res = a.solve(&tracks, &detections).unwrap();
        assert_eq!(res.matches.len(), 4);
        assert!(res.matches.iter().map(|(t, _)| t).all_unique());
        assert!(res.matches.iter().map(|(_, d)| d).all_unique());
        assert_eq!(res.unmatched_detections.len(), 1);
    }
}
