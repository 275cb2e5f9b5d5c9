//! Route schedule computation.
//!
//! Applies a reconstructed prediction model to a route's per-point distance
//! and altitude profile: each step's gradient is derived with the same
//! formula used for training observations, the model predicts a pace per
//! point, and pace times step distance accumulates into a time-of-arrival
//! schedule aligned to the route's point sequence.

use serde::{Deserialize, Serialize};

use crate::error::{PredictionError, Result};
use crate::extract::gradient_percent;
use crate::model::{PredictionModel, TripConditions};

/// A route's per-point profile: cumulative distance and altitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteProfile {
    /// Cumulative distance along the path in meters
    pub distance: Vec<f64>,
    /// Altitude in meters
    pub altitude: Vec<f64>,
}

impl RouteProfile {
    /// Create a profile, validating that both vectors have the same length
    /// and at least one point.
    pub fn new(distance: Vec<f64>, altitude: Vec<f64>) -> Result<Self> {
        if distance.len() != altitude.len() {
            return Err(PredictionError::route(format!(
                "distance has {} points, altitude has {}",
                distance.len(),
                altitude.len()
            )));
        }
        if distance.is_empty() {
            return Err(PredictionError::route("route has no points"));
        }
        Ok(RouteProfile { distance, altitude })
    }

    pub fn len(&self) -> usize {
        self.distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }
}

/// Predicted pace and cumulative elapsed time for every route point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSchedule {
    /// Predicted pace in seconds per meter, one entry per route point
    pub pace: Vec<f64>,
    /// Cumulative elapsed seconds at each route point; always 0.0 first
    pub schedule: Vec<f64>,
}

impl RouteSchedule {
    /// Total predicted duration of the route in seconds.
    pub fn total_seconds(&self) -> f64 {
        self.schedule.last().copied().unwrap_or(0.0)
    }

    /// Serialize for downstream rendering.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Compute the time-of-arrival schedule for a route.
///
/// Per step, the gradient comes from the same differencing formula as
/// training extraction; a step with non-positive or non-finite distance
/// predicts as flat and contributes zero elapsed time. The first point's
/// schedule value is zero by definition and its reported pace is the first
/// segment's pace.
pub fn calculate_schedule(
    model: &PredictionModel,
    route: &RouteProfile,
    conditions: &TripConditions,
) -> Result<RouteSchedule> {
    let n = route.len();
    let mut pace = Vec::with_capacity(n);
    let mut schedule = Vec::with_capacity(n);

    // Leading entries are placeholders until the first segment is known.
    pace.push(0.0);
    schedule.push(0.0);

    let mut elapsed = 0.0;
    for i in 1..n {
        let step_distance = route.distance[i] - route.distance[i - 1];
        let altitude_diff = route.altitude[i] - route.altitude[i - 1];

        let gradient = gradient_percent(altitude_diff, step_distance);
        let gradient = if gradient.is_finite() { gradient } else { 0.0 };

        let step_pace = model.predict_pace(gradient, conditions);
        if step_distance.is_finite() && step_distance > 0.0 {
            elapsed += step_pace * step_distance;
        }

        pace.push(step_pace);
        schedule.push(elapsed);
    }

    if n > 1 {
        pace[0] = pace[1];
    } else {
        pace[0] = model.predict_pace(0.0, conditions);
    }

    Ok(RouteSchedule { pace, schedule })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoricalColumn, ModelParameters};
    use crate::PredictionModel;

    /// Constant-pace model: the untrained default at 0.36 s/m.
    fn flat_model() -> PredictionModel {
        let parameters = ModelParameters::default_for(&[CategoricalColumn::WorkoutType]);
        PredictionModel::from_parameters(vec![CategoricalColumn::WorkoutType], &parameters)
            .unwrap()
    }

    #[test]
    fn test_profile_validation() {
        assert!(RouteProfile::new(vec![0.0, 10.0], vec![0.0]).is_err());
        assert!(RouteProfile::new(Vec::new(), Vec::new()).is_err());
        assert!(RouteProfile::new(vec![0.0], vec![500.0]).is_ok());
    }

    #[test]
    fn test_flat_model_schedule_values() {
        let route = RouteProfile::new(
            vec![0.0, 100.0, 250.0, 400.0],
            vec![500.0, 510.0, 505.0, 520.0],
        )
        .unwrap();

        let schedule =
            calculate_schedule(&flat_model(), &route, &TripConditions::default()).unwrap();

        assert_eq!(schedule.schedule[0], 0.0);
        assert!((schedule.schedule[1] - 36.0).abs() < 1e-9);
        assert!((schedule.schedule[2] - 90.0).abs() < 1e-9);
        assert!((schedule.schedule[3] - 144.0).abs() < 1e-9);
        assert!((schedule.total_seconds() - 144.0).abs() < 1e-9);

        for pace in &schedule.pace {
            assert!((pace - 0.36).abs() < 1e-12);
        }
    }

    #[test]
    fn test_schedule_is_non_decreasing() {
        let route = RouteProfile::new(
            (0..50).map(|i| i as f64 * 37.0).collect(),
            (0..50).map(|i| 500.0 + (i as f64 * 0.7).sin() * 40.0).collect(),
        )
        .unwrap();

        let schedule =
            calculate_schedule(&flat_model(), &route, &TripConditions::default()).unwrap();

        for window in schedule.schedule.windows(2) {
            assert!(window[1] >= window[0]);
        }
    }

    #[test]
    fn test_zero_length_step_adds_no_time() {
        let route = RouteProfile::new(
            vec![0.0, 100.0, 100.0, 200.0],
            vec![0.0, 5.0, 8.0, 8.0],
        )
        .unwrap();

        let schedule =
            calculate_schedule(&flat_model(), &route, &TripConditions::default()).unwrap();

        assert_eq!(schedule.schedule[1], schedule.schedule[2]);
        assert!(schedule.schedule[3] > schedule.schedule[2]);
    }

    #[test]
    fn test_single_point_route() {
        let route = RouteProfile::new(vec![0.0], vec![500.0]).unwrap();
        let schedule =
            calculate_schedule(&flat_model(), &route, &TripConditions::default()).unwrap();

        assert_eq!(schedule.schedule, vec![0.0]);
        assert_eq!(schedule.pace.len(), 1);
        assert!((schedule.pace[0] - 0.36).abs() < 1e-12);
    }

    #[test]
    fn test_first_point_carries_first_segment_pace() {
        let route = RouteProfile::new(vec![0.0, 100.0], vec![500.0, 520.0]).unwrap();
        let schedule =
            calculate_schedule(&flat_model(), &route, &TripConditions::default()).unwrap();

        assert_eq!(schedule.pace[0], schedule.pace[1]);
    }

    #[test]
    fn test_schedule_json_export() {
        let route = RouteProfile::new(vec![0.0, 100.0], vec![0.0, 0.0]).unwrap();
        let schedule =
            calculate_schedule(&flat_model(), &route, &TripConditions::default()).unwrap();

        let json = schedule.to_json();
        assert!(json.contains("\"schedule\""));
        assert!(json.contains("\"pace\""));
    }

    #[test]
    fn test_gradient_matches_training_formula() {
        // A model trained on gradient-dependent pace must see route gradients
        // computed the same way as its training observations.
        use crate::extract::TrainingObservation;

        let observations: Vec<TrainingObservation> = (0..8)
            .map(|i| {
                let gradient = i as f64 * 2.0 - 4.0;
                TrainingObservation {
                    gradient,
                    pace: 0.3 + 0.02 * gradient,
                    cumulative_elevation_gain: 0.0,
                    total_distance: 0.0,
                    total_elevation_gain: 0.0,
                    commute: false,
                    gear: "None".to_string(),
                    workout_type: "None".to_string(),
                }
            })
            .collect();
        let model =
            PredictionModel::fit(vec![CategoricalColumn::WorkoutType], &observations).unwrap();

        // One 100 m step climbing 4 m: gradient 4%, pace 0.3 + 0.08
        let route = RouteProfile::new(vec![0.0, 100.0], vec![0.0, 4.0]).unwrap();
        let schedule = calculate_schedule(&model, &route, &TripConditions::default()).unwrap();

        assert!((schedule.pace[1] - 0.38).abs() < 1e-6);
        assert!((schedule.total_seconds() - 38.0).abs() < 1e-4);
    }
}
