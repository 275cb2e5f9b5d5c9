//! Per-step observation extraction from raw activity streams.
//!
//! Turns one activity's cumulative (time, distance, altitude) samples into
//! per-step training observations: gradient in percent, pace in seconds per
//! meter, and a forward-filled cumulative elevation gain. The activity's
//! static trip metadata is attached to every surviving row.
//!
//! ## Example
//! ```rust
//! use pace_predictor::{ActivityRecord, ActivityStream};
//! use pace_predictor::extract::training_observations;
//!
//! let record = ActivityRecord {
//!     id: "a1".to_string(),
//!     athlete_id: "athlete-1".to_string(),
//!     activity_type: "Run".to_string(),
//!     start_date: 1_700_000_000,
//!     distance: 200.0,
//!     total_elevation_gain: 5.0,
//!     commute: false,
//!     gear: None,
//!     workout_type: None,
//!     stream: ActivityStream {
//!         time: vec![0.0, 10.0, 25.0],
//!         distance: vec![0.0, 100.0, 200.0],
//!         altitude: vec![0.0, 5.0, 5.0],
//!         moving: vec![true, true, true],
//!     },
//! };
//!
//! let observations = training_observations(&record);
//! assert_eq!(observations.len(), 2);
//! assert_eq!(observations[0].gradient, 5.0);
//! ```

use crate::ActivityRecord;

/// Label used when a record carries no gear or workout-type metadata.
pub const NONE_CATEGORY: &str = "None";

/// One per-step training observation derived from an activity stream.
///
/// Transient: observations exist only while training or predicting and are
/// never persisted individually.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingObservation {
    /// Slope of the step in percent (altitude change / distance change * 100)
    pub gradient: f64,
    /// Seconds required to travel one meter during the step
    pub pace: f64,
    /// Sum of positive altitude changes up to and including this step, in meters
    pub cumulative_elevation_gain: f64,
    /// Total distance of the source activity in meters
    pub total_distance: f64,
    /// Total elevation gain of the source activity in meters
    pub total_elevation_gain: f64,
    /// Was the source activity flagged as a commute?
    pub commute: bool,
    /// Gear identifier, or "None" when the record has no gear
    pub gear: String,
    /// Workout-type label, or "None" when the record has none
    pub workout_type: String,
}

/// Slope of a step in percent grade.
///
/// Shared by training extraction and schedule computation so both sides of
/// the model see the same formula. The result is non-finite when
/// `step_distance` is zero; callers decide how to handle that.
pub(crate) fn gradient_percent(altitude_diff: f64, step_distance: f64) -> f64 {
    altitude_diff / step_distance * 100.0
}

/// Extract per-step training observations from one activity record.
///
/// The first sample has no predecessor and is always dropped, as is any step
/// whose gradient or pace is non-finite (zero or backwards step distance,
/// non-finite altitude). A record with an unusable stream yields an empty
/// vector; callers treat that as "no training data" for this record.
pub fn training_observations(record: &ActivityRecord) -> Vec<TrainingObservation> {
    let stream = &record.stream;
    if !stream.is_usable() {
        return Vec::new();
    }

    let gear = record
        .gear
        .clone()
        .unwrap_or_else(|| NONE_CATEGORY.to_string());
    let workout_type = record
        .workout_type
        .clone()
        .unwrap_or_else(|| NONE_CATEGORY.to_string());

    let mut observations = Vec::with_capacity(stream.len() - 1);
    let mut cumulative_elevation_gain = 0.0;

    for i in 1..stream.len() {
        let step_distance = stream.distance[i] - stream.distance[i - 1];
        let altitude_diff = stream.altitude[i] - stream.altitude[i - 1];
        let time_diff = stream.time[i] - stream.time[i - 1];

        // Gain accumulates over the whole series, even across steps that are
        // dropped below, so surviving rows carry the true running climb.
        if altitude_diff.is_finite() && altitude_diff > 0.0 {
            cumulative_elevation_gain += altitude_diff;
        }

        let gradient = gradient_percent(altitude_diff, step_distance);
        let pace = time_diff / step_distance;

        if !gradient.is_finite() || !pace.is_finite() {
            continue;
        }

        observations.push(TrainingObservation {
            gradient,
            pace,
            cumulative_elevation_gain,
            total_distance: record.distance,
            total_elevation_gain: record.total_elevation_gain,
            commute: record.commute,
            gear: gear.clone(),
            workout_type: workout_type.clone(),
        });
    }

    observations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActivityStream;

    fn record_with_stream(stream: ActivityStream) -> ActivityRecord {
        ActivityRecord {
            id: "a1".to_string(),
            athlete_id: "athlete-1".to_string(),
            activity_type: "Run".to_string(),
            start_date: 1_700_000_000,
            distance: 200.0,
            total_elevation_gain: 5.0,
            commute: true,
            gear: Some("g1".to_string()),
            workout_type: Some("long run".to_string()),
            stream,
        }
    }

    fn stream(time: Vec<f64>, distance: Vec<f64>, altitude: Vec<f64>) -> ActivityStream {
        let moving = vec![true; time.len()];
        ActivityStream {
            time,
            distance,
            altitude,
            moving,
        }
    }

    #[test]
    fn test_gradient_and_pace_formula() {
        let record = record_with_stream(stream(
            vec![0.0, 10.0, 25.0],
            vec![0.0, 100.0, 200.0],
            vec![0.0, 5.0, 5.0],
        ));

        let observations = training_observations(&record);

        // First sample has no predecessor and is dropped
        assert_eq!(observations.len(), 2);

        assert!((observations[0].gradient - 5.0).abs() < 1e-12);
        assert!((observations[0].pace - 0.1).abs() < 1e-12);

        assert!((observations[1].gradient - 0.0).abs() < 1e-12);
        assert!((observations[1].pace - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_cumulative_elevation_gain_forward_fill() {
        let record = record_with_stream(stream(
            vec![0.0, 10.0, 20.0, 30.0],
            vec![0.0, 100.0, 200.0, 300.0],
            vec![0.0, 5.0, 3.0, 8.0],
        ));

        let observations = training_observations(&record);
        assert_eq!(observations.len(), 3);

        let gains: Vec<f64> = observations
            .iter()
            .map(|o| o.cumulative_elevation_gain)
            .collect();
        assert_eq!(gains, vec![5.0, 5.0, 10.0]);
    }

    #[test]
    fn test_zero_step_distance_dropped() {
        let record = record_with_stream(stream(
            vec![0.0, 10.0, 20.0],
            vec![0.0, 0.0, 100.0],
            vec![0.0, 2.0, 4.0],
        ));

        let observations = training_observations(&record);

        // The stalled step divides by zero distance and is dropped; its climb
        // still counts toward the running gain.
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].cumulative_elevation_gain, 4.0);
        assert!((observations[0].pace - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_altitude_dropped() {
        let record = record_with_stream(stream(
            vec![0.0, 10.0, 20.0],
            vec![0.0, 100.0, 200.0],
            vec![0.0, f64::NAN, 4.0],
        ));

        let observations = training_observations(&record);
        assert_eq!(observations.len(), 0);
    }

    #[test]
    fn test_too_few_samples_yields_no_rows() {
        let record = record_with_stream(stream(vec![0.0], vec![0.0], vec![0.0]));
        assert!(training_observations(&record).is_empty());
    }

    #[test]
    fn test_mismatched_stream_yields_no_rows() {
        let record = record_with_stream(ActivityStream {
            time: vec![0.0, 10.0],
            distance: vec![0.0, 100.0],
            altitude: vec![0.0],
            moving: vec![true, true],
        });
        assert!(training_observations(&record).is_empty());
    }

    #[test]
    fn test_metadata_attached_to_every_row() {
        let record = record_with_stream(stream(
            vec![0.0, 10.0, 25.0],
            vec![0.0, 100.0, 200.0],
            vec![0.0, 5.0, 5.0],
        ));

        for observation in training_observations(&record) {
            assert_eq!(observation.gear, "g1");
            assert_eq!(observation.workout_type, "long run");
            assert_eq!(observation.total_distance, 200.0);
            assert_eq!(observation.total_elevation_gain, 5.0);
            assert!(observation.commute);
        }
    }

    #[test]
    fn test_missing_metadata_defaults_to_none_label() {
        let mut record = record_with_stream(stream(
            vec![0.0, 10.0],
            vec![0.0, 100.0],
            vec![0.0, 5.0],
        ));
        record.gear = None;
        record.workout_type = None;

        let observations = training_observations(&record);
        assert_eq!(observations[0].gear, "None");
        assert_eq!(observations[0].workout_type, "None");
    }
}
