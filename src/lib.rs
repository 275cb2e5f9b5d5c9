//! # Pace Predictor
//!
//! Pace prediction and route schedule computation from GPS activity history.
//!
//! This library provides:
//! - Per-step observation extraction from raw activity streams
//! - Per-athlete and activity-type-wide pace regression models
//! - Route schedule computation (time of arrival at every route point)
//!
//! ## Features
//!
//! - **`parallel`** - Parallel training across subjects with rayon
//! - **`persistence`** - SQLite storage for fitted model parameters
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use pace_predictor::{
//!     calculate_schedule, ActivityRecord, ActivityStream, ActivityType, RouteProfile,
//!     TripConditions,
//! };
//!
//! // One historical run: 300 m in 90 s with a short climb
//! let record = ActivityRecord {
//!     id: "a1".to_string(),
//!     athlete_id: "athlete-1".to_string(),
//!     activity_type: "Run".to_string(),
//!     start_date: 1_700_000_000,
//!     distance: 300.0,
//!     total_elevation_gain: 5.0,
//!     commute: false,
//!     gear: None,
//!     workout_type: None,
//!     stream: ActivityStream {
//!         time: vec![0.0, 30.0, 60.0, 90.0],
//!         distance: vec![0.0, 100.0, 200.0, 300.0],
//!         altitude: vec![500.0, 505.0, 505.0, 505.0],
//!         moving: vec![true, true, true, true],
//!     },
//! };
//!
//! // Train the type-wide model and predict a new route
//! let mut run = ActivityType::new("Run");
//! let outcome = run.train(&[record], None).unwrap();
//! assert!(outcome.to_string().contains("successfully trained"));
//!
//! let model = run.prediction_model().unwrap();
//! let route = RouteProfile::new(
//!     vec![0.0, 100.0, 250.0],
//!     vec![600.0, 604.0, 602.0],
//! ).unwrap();
//! let schedule = calculate_schedule(&model, &route, &TripConditions::default()).unwrap();
//!
//! assert_eq!(schedule.schedule[0], 0.0);
//! assert!(schedule.total_seconds() > 0.0);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{PredictionError, Result};

// Per-step observation extraction from raw activity streams
pub mod extract;
pub use extract::{training_observations, TrainingObservation};

// Pace regression pipeline (encoding, fitting, reconstruction)
pub mod model;
pub use model::{
    CategoricalColumn, ModelParameters, PredictionModel, TripConditions, CV_FOLDS,
    DEFAULT_FLAT_PACE, NUMERIC_FEATURE_COUNT,
};

// Training-set assembly for prediction subjects
pub mod training;
pub use training::{build_training_set, TrainingSubject};

// Prediction subjects with durable parameters
pub mod subjects;
pub use subjects::{ActivityPerformance, ActivityType, TrainingOutcome};

// Route schedule computation
pub mod schedule;
pub use schedule::{calculate_schedule, RouteProfile, RouteSchedule};

// Stateful prediction engine (singleton with records and subjects)
pub mod engine;
pub use engine::{with_engine, EngineStats, PredictionEngine, ENGINE};

// SQLite store for fitted model parameters
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::ModelStore;

// ============================================================================
// Core Types
// ============================================================================

/// Raw time series of one activity: parallel vectors of cumulative elapsed
/// time (s), cumulative distance (m), altitude (m), and a moving flag, one
/// entry per sample.
///
/// The moving flag is carried through from the source; observation
/// extraction works on time, distance, and altitude only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStream {
    pub time: Vec<f64>,
    pub distance: Vec<f64>,
    pub altitude: Vec<f64>,
    pub moving: Vec<bool>,
}

impl ActivityStream {
    /// Number of samples in the stream.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// A stream is usable for training when all four vectors have the same
    /// length and there are at least two samples to difference.
    pub fn is_usable(&self) -> bool {
        let n = self.time.len();
        n >= 2 && self.distance.len() == n && self.altitude.len() == n && self.moving.len() == n
    }
}

/// One completed exercise session with its raw stream and static metadata.
///
/// Records arrive from an external source already materialized; this crate
/// never fetches them. A record without gear or workout-type metadata trains
/// under the "None" label for those columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub athlete_id: String,
    /// Activity type name, e.g. "Run" or "Ride"
    pub activity_type: String,
    /// Start of the activity as unix seconds
    pub start_date: i64,
    /// Total distance in meters
    pub distance: f64,
    /// Total elevation gain in meters
    pub total_elevation_gain: f64,
    /// Was the activity flagged as a commute?
    pub commute: bool,
    /// Gear identifier, if any
    pub gear: Option<String>,
    /// Workout-type label, if any (e.g. "long run", "race ride")
    pub workout_type: Option<String>,
    pub stream: ActivityStream,
}

/// Plausible pace and gradient ranges of an activity type, used to reject
/// outlier observations before training. Bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    /// Fastest plausible pace in s/m. Default 0.1: 1:40/km or 36 km/h
    pub min_pace: f64,
    /// Slowest plausible pace in s/m. Default 2.4: 40:00/km or 1.5 km/h
    pub max_pace: f64,
    /// Steepest plausible descent in percent. Default -100: -45 degrees
    pub min_gradient: f64,
    /// Steepest plausible climb in percent. Default 100: 45 degrees
    pub max_gradient: f64,
}

impl Default for OutlierBounds {
    fn default() -> Self {
        Self {
            min_pace: 0.1,
            max_pace: 2.4,
            min_gradient: -100.0,
            max_gradient: 100.0,
        }
    }
}

impl OutlierBounds {
    /// Is the observation inside the plausible ranges?
    pub fn contains(&self, observation: &TrainingObservation) -> bool {
        observation.pace > self.min_pace
            && observation.pace < self.max_pace
            && observation.gradient > self.min_gradient
            && observation.gradient < self.max_gradient
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream() -> ActivityStream {
        ActivityStream {
            time: vec![0.0, 30.0, 60.0],
            distance: vec![0.0, 100.0, 200.0],
            altitude: vec![500.0, 505.0, 505.0],
            moving: vec![true, true, true],
        }
    }

    #[test]
    fn test_stream_usability() {
        assert!(sample_stream().is_usable());

        let mut short = sample_stream();
        short.time.truncate(1);
        short.distance.truncate(1);
        short.altitude.truncate(1);
        short.moving.truncate(1);
        assert!(!short.is_usable());

        let mut ragged = sample_stream();
        ragged.altitude.pop();
        assert!(!ragged.is_usable());
    }

    #[test]
    fn test_outlier_bounds_are_exclusive() {
        let bounds = OutlierBounds::default();

        let observation = TrainingObservation {
            gradient: 0.0,
            pace: 0.3,
            cumulative_elevation_gain: 0.0,
            total_distance: 100.0,
            total_elevation_gain: 0.0,
            commute: false,
            gear: "None".to_string(),
            workout_type: "None".to_string(),
        };
        assert!(bounds.contains(&observation));

        let on_min_pace = TrainingObservation {
            pace: 0.1,
            ..observation.clone()
        };
        assert!(!bounds.contains(&on_min_pace));

        let beyond_max_gradient = TrainingObservation {
            gradient: 100.0,
            ..observation
        };
        assert!(!bounds.contains(&beyond_max_gradient));
    }
}
