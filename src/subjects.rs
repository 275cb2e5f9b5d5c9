//! Prediction subjects: activity types and per-athlete performances.
//!
//! Both subjects own durable model parameters and share the same
//! train/reconstruct behavior; they differ in which records qualify as
//! training input and which categorical columns their model encodes.
//!
//! An [`ActivityType`] is trained across all athletes and encodes only the
//! workout type. An [`ActivityPerformance`] is scoped to one athlete's own
//! history and adds a gear column, so its fitted vocabulary doubles as the
//! list of gear the athlete has used.

use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{CategoricalColumn, ModelParameters, PredictionModel};
use crate::training::{fit_parameters, TrainingSubject};
use crate::{ActivityRecord, OutlierBounds};

/// Result of a training run, reported to the caller as a descriptive outcome.
///
/// "No training data" is a normal state, not an error: the subject's durable
/// parameters keep their previous values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainingOutcome {
    Trained {
        subject: String,
        observations: usize,
        model_score: f64,
        cv_scores: Vec<f64>,
    },
    NoTrainingData {
        activity_type: String,
    },
}

impl fmt::Display for TrainingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingOutcome::Trained {
                subject,
                observations,
                model_score,
                cv_scores,
            } => {
                write!(
                    f,
                    "{} successfully trained with {} observations. Model score: {:.3}, cross-validation scores: {:?}",
                    subject, observations, model_score, cv_scores
                )
            }
            TrainingOutcome::NoTrainingData { activity_type } => {
                write!(f, "No training data found for activity type: {}", activity_type)
            }
        }
    }
}

/// A kind of physical activity (e.g. "Run", "Ride") with its plausible-range
/// bounds and a model trained from all qualifying records of that type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityType {
    pub name: String,
    /// Plausible pace/gradient ranges used to reject outlier observations
    pub bounds: OutlierBounds,
    /// Durable fitted parameters; a valid constant-pace default when untrained
    pub parameters: ModelParameters,
}

impl ActivityType {
    pub const CATEGORICAL_COLUMNS: &'static [CategoricalColumn] =
        &[CategoricalColumn::WorkoutType];

    /// Create an untrained activity type with default bounds.
    pub fn new(name: impl Into<String>) -> Self {
        ActivityType {
            name: name.into(),
            bounds: OutlierBounds::default(),
            parameters: ModelParameters::default_for(Self::CATEGORICAL_COLUMNS),
        }
    }

    /// Create an untrained activity type with custom bounds.
    pub fn with_bounds(name: impl Into<String>, bounds: OutlierBounds) -> Self {
        ActivityType {
            name: name.into(),
            bounds,
            parameters: ModelParameters::default_for(Self::CATEGORICAL_COLUMNS),
        }
    }

    /// Train the type-wide model from all qualifying records in the pool.
    pub fn train<'a, I>(&mut self, records: I, limit: Option<usize>) -> Result<TrainingOutcome>
    where
        I: IntoIterator<Item = &'a ActivityRecord>,
    {
        let outcome = match fit_parameters(&*self, records, limit)? {
            Some((parameters, observations)) => {
                self.parameters = parameters;
                TrainingOutcome::Trained {
                    subject: format!("ActivityType {}", self.name),
                    observations,
                    model_score: self.parameters.model_score,
                    cv_scores: self.parameters.cv_scores.clone(),
                }
            }
            None => TrainingOutcome::NoTrainingData {
                activity_type: self.name.clone(),
            },
        };
        info!("[Training] {}", outcome);
        Ok(outcome)
    }

    /// Reconstruct the prediction model from the stored parameters.
    pub fn prediction_model(&self) -> Result<PredictionModel> {
        PredictionModel::from_parameters(Self::CATEGORICAL_COLUMNS.to_vec(), &self.parameters)
    }

    /// Workout-type labels discovered at the last training run.
    pub fn workout_type_categories(&self) -> &[String] {
        &self.parameters.categories[0]
    }
}

impl TrainingSubject for ActivityType {
    fn activity_type(&self) -> &str {
        &self.name
    }

    fn outlier_bounds(&self) -> OutlierBounds {
        self.bounds
    }

    fn categorical_columns(&self) -> &'static [CategoricalColumn] {
        Self::CATEGORICAL_COLUMNS
    }

    fn qualifies(&self, record: &ActivityRecord) -> bool {
        record.activity_type == self.name && record.stream.is_usable()
    }
}

/// One athlete's prediction model for one activity type, trained from the
/// athlete's own history only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPerformance {
    pub athlete_id: String,
    pub activity_type: String,
    /// Copy of the activity type's bounds, taken at creation
    pub bounds: OutlierBounds,
    /// Durable fitted parameters; a valid constant-pace default when untrained
    pub parameters: ModelParameters,
}

impl ActivityPerformance {
    pub const CATEGORICAL_COLUMNS: &'static [CategoricalColumn] =
        &[CategoricalColumn::Gear, CategoricalColumn::WorkoutType];

    /// Create an untrained performance for an athlete and activity type.
    pub fn new(athlete_id: impl Into<String>, activity_type: &ActivityType) -> Self {
        ActivityPerformance {
            athlete_id: athlete_id.into(),
            activity_type: activity_type.name.clone(),
            bounds: activity_type.bounds,
            parameters: ModelParameters::default_for(Self::CATEGORICAL_COLUMNS),
        }
    }

    /// Train the athlete-scoped model from the athlete's qualifying records.
    pub fn train<'a, I>(&mut self, records: I, limit: Option<usize>) -> Result<TrainingOutcome>
    where
        I: IntoIterator<Item = &'a ActivityRecord>,
    {
        let outcome = match fit_parameters(&*self, records, limit)? {
            Some((parameters, observations)) => {
                self.parameters = parameters;
                TrainingOutcome::Trained {
                    subject: format!("{} - {}", self.athlete_id, self.activity_type),
                    observations,
                    model_score: self.parameters.model_score,
                    cv_scores: self.parameters.cv_scores.clone(),
                }
            }
            None => TrainingOutcome::NoTrainingData {
                activity_type: self.activity_type.clone(),
            },
        };
        info!("[Training] {}", outcome);
        Ok(outcome)
    }

    /// Reconstruct the prediction model from the stored parameters.
    pub fn prediction_model(&self) -> Result<PredictionModel> {
        PredictionModel::from_parameters(Self::CATEGORICAL_COLUMNS.to_vec(), &self.parameters)
    }

    /// Gear identifiers the athlete has used, discovered at the last
    /// training run.
    pub fn gear_categories(&self) -> &[String] {
        &self.parameters.categories[0]
    }

    /// Workout-type labels discovered at the last training run.
    pub fn workout_type_categories(&self) -> &[String] {
        &self.parameters.categories[1]
    }
}

impl TrainingSubject for ActivityPerformance {
    fn activity_type(&self) -> &str {
        &self.activity_type
    }

    fn outlier_bounds(&self) -> OutlierBounds {
        self.bounds
    }

    fn categorical_columns(&self) -> &'static [CategoricalColumn] {
        Self::CATEGORICAL_COLUMNS
    }

    fn qualifies(&self, record: &ActivityRecord) -> bool {
        record.activity_type == self.activity_type
            && record.athlete_id == self.athlete_id
            && record.stream.is_usable()
    }
}
