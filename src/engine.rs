//! # Prediction Engine
//!
//! Stateful registry that drives the whole pipeline: activity records in,
//! trained subjects and route schedules out.
//!
//! ## Architecture
//!
//! The engine maintains:
//! - Activity records keyed by id
//! - Activity types, created on demand with default bounds
//! - Per-athlete performances, created on demand from the athlete's records
//! - Dirty tracking so subjects are only retrained when their inputs changed
//!
//! Training runs lazily before a schedule is computed, or eagerly through
//! [`PredictionEngine::train_all`]. With the `parallel` feature, eager
//! retraining fans the independent subjects out across rayon workers; each
//! subject's fitted parameters are written back serially afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use log::info;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::Result;
use crate::model::TripConditions;
use crate::schedule::{calculate_schedule, RouteProfile, RouteSchedule};
use crate::subjects::{ActivityPerformance, ActivityType, TrainingOutcome};
#[cfg(feature = "parallel")]
use crate::training::fit_parameters;
use crate::ActivityRecord;

/// Key of an athlete's performance: (athlete id, activity type name).
type PerformanceKey = (String, String);

/// The main stateful prediction engine.
pub struct PredictionEngine {
    // Core state
    activities: HashMap<String, ActivityRecord>,
    activity_types: HashMap<String, ActivityType>,
    performances: HashMap<PerformanceKey, ActivityPerformance>,

    // Dirty tracking for lazy retraining
    dirty_types: HashSet<String>,
    dirty_performances: HashSet<PerformanceKey>,

    // Maximum number of records per subject at training time
    training_limit: Option<usize>,
}

impl PredictionEngine {
    /// Create a new engine with no record cap at training time.
    pub fn new() -> Self {
        Self {
            activities: HashMap::new(),
            activity_types: HashMap::new(),
            performances: HashMap::new(),
            dirty_types: HashSet::new(),
            dirty_performances: HashSet::new(),
            training_limit: None,
        }
    }

    /// Cap the number of (most recent) records each subject trains on.
    pub fn set_training_limit(&mut self, limit: Option<usize>) {
        self.training_limit = limit;
        // Existing models were fitted on a different record selection
        self.dirty_types = self.activity_types.keys().cloned().collect();
        self.dirty_performances = self.performances.keys().cloned().collect();
    }

    // ========================================================================
    // Activity Management
    // ========================================================================

    /// Register an activity type with custom bounds.
    ///
    /// Types are otherwise created on demand with default bounds when the
    /// first record of their kind arrives.
    pub fn register_activity_type(&mut self, activity_type: ActivityType) {
        self.dirty_types.insert(activity_type.name.clone());
        self.activity_types
            .insert(activity_type.name.clone(), activity_type);
    }

    /// Add (or replace) an activity record.
    ///
    /// Creates the record's activity type and the athlete's performance on
    /// demand and marks both dirty.
    pub fn add_activity(&mut self, record: ActivityRecord) {
        let type_name = record.activity_type.clone();
        let athlete_id = record.athlete_id.clone();

        self.activity_types
            .entry(type_name.clone())
            .or_insert_with(|| ActivityType::new(type_name.clone()));

        let key = (athlete_id, type_name.clone());
        if !self.performances.contains_key(&key) {
            let activity_type = &self.activity_types[&type_name];
            self.performances.insert(
                key.clone(),
                ActivityPerformance::new(key.0.clone(), activity_type),
            );
        }

        self.dirty_types.insert(type_name);
        self.dirty_performances.insert(key);
        self.activities.insert(record.id.clone(), record);
    }

    /// Remove an activity record; its subjects are marked for retraining.
    pub fn remove_activity(&mut self, id: &str) {
        if let Some(record) = self.activities.remove(id) {
            self.dirty_types.insert(record.activity_type.clone());
            self.dirty_performances
                .insert((record.athlete_id, record.activity_type));
        }
    }

    /// Clear all records, subjects, and dirty state.
    pub fn clear(&mut self) {
        self.activities.clear();
        self.activity_types.clear();
        self.performances.clear();
        self.dirty_types.clear();
        self.dirty_performances.clear();
    }

    /// Get the number of registered activity records.
    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }

    /// Check if an activity record exists.
    pub fn has_activity(&self, id: &str) -> bool {
        self.activities.contains_key(id)
    }

    /// Get a registered activity type.
    pub fn activity_type(&self, name: &str) -> Option<&ActivityType> {
        self.activity_types.get(name)
    }

    /// Get an athlete's performance for an activity type.
    pub fn performance(&self, athlete_id: &str, activity_type: &str) -> Option<&ActivityPerformance> {
        self.performances
            .get(&(athlete_id.to_string(), activity_type.to_string()))
    }

    // ========================================================================
    // Training
    // ========================================================================

    /// Retrain every dirty subject, serially.
    fn ensure_models(&mut self) -> Result<Vec<TrainingOutcome>> {
        let mut outcomes = Vec::new();

        let dirty_types: Vec<String> = self.dirty_types.drain().collect();
        for name in dirty_types {
            if let Some(activity_type) = self.activity_types.get_mut(&name) {
                let records = self.activities.values();
                outcomes.push(activity_type.train(records, self.training_limit)?);
            }
        }

        let dirty_performances: Vec<PerformanceKey> = self.dirty_performances.drain().collect();
        for key in dirty_performances {
            if let Some(performance) = self.performances.get_mut(&key) {
                let records = self.activities.values();
                outcomes.push(performance.train(records, self.training_limit)?);
            }
        }

        Ok(outcomes)
    }

    /// Retrain every dirty subject across rayon workers.
    ///
    /// Fits run read-only against the record pool; each subject's parameters
    /// are applied serially afterwards, so no subject sees interleaved
    /// writes.
    #[cfg(feature = "parallel")]
    fn ensure_models_parallel(&mut self) -> Result<Vec<TrainingOutcome>> {
        let dirty_types: Vec<String> = self.dirty_types.drain().collect();
        let dirty_performances: Vec<PerformanceKey> = self.dirty_performances.drain().collect();

        let limit = self.training_limit;
        let activities = &self.activities;

        let type_fits: Vec<_> = dirty_types
            .par_iter()
            .filter_map(|name| {
                self.activity_types.get(name).map(|activity_type| {
                    let fitted = fit_parameters(activity_type, activities.values(), limit);
                    (name.clone(), fitted)
                })
            })
            .collect();

        let performance_fits: Vec<_> = dirty_performances
            .par_iter()
            .filter_map(|key| {
                self.performances.get(key).map(|performance| {
                    let fitted = fit_parameters(performance, activities.values(), limit);
                    (key.clone(), fitted)
                })
            })
            .collect();

        let mut outcomes = Vec::new();

        for (name, fitted) in type_fits {
            let activity_type = match self.activity_types.get_mut(&name) {
                Some(activity_type) => activity_type,
                None => continue,
            };
            let outcome = match fitted? {
                Some((parameters, observations)) => {
                    activity_type.parameters = parameters;
                    TrainingOutcome::Trained {
                        subject: format!("ActivityType {}", activity_type.name),
                        observations,
                        model_score: activity_type.parameters.model_score,
                        cv_scores: activity_type.parameters.cv_scores.clone(),
                    }
                }
                None => TrainingOutcome::NoTrainingData {
                    activity_type: name.clone(),
                },
            };
            outcomes.push(outcome);
        }

        for (key, fitted) in performance_fits {
            let performance = match self.performances.get_mut(&key) {
                Some(performance) => performance,
                None => continue,
            };
            let outcome = match fitted? {
                Some((parameters, observations)) => {
                    performance.parameters = parameters;
                    TrainingOutcome::Trained {
                        subject: format!("{} - {}", key.0, key.1),
                        observations,
                        model_score: performance.parameters.model_score,
                        cv_scores: performance.parameters.cv_scores.clone(),
                    }
                }
                None => TrainingOutcome::NoTrainingData {
                    activity_type: key.1.clone(),
                },
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Retrain every subject whose inputs changed since the last run.
    ///
    /// Returns one outcome per retrained subject; subjects that were already
    /// current are skipped.
    pub fn train_all(&mut self) -> Result<Vec<TrainingOutcome>> {
        #[cfg(feature = "parallel")]
        let outcomes = self.ensure_models_parallel()?;
        #[cfg(not(feature = "parallel"))]
        let outcomes = self.ensure_models()?;

        info!("[Engine] Retrained {} subjects", outcomes.len());
        Ok(outcomes)
    }

    // ========================================================================
    // Schedules
    // ========================================================================

    /// Compute the schedule for a route, retraining stale subjects first.
    ///
    /// Uses the athlete's performance model when the athlete has one for the
    /// route's activity type, else the type-wide model. An activity type
    /// never seen before gets a default (constant-pace) model, so routes
    /// without any training history still receive a schedule.
    pub fn schedule_for(
        &mut self,
        athlete_id: Option<&str>,
        activity_type: &str,
        route: &RouteProfile,
        conditions: &TripConditions,
    ) -> Result<RouteSchedule> {
        self.ensure_models()?;

        let model = match athlete_id
            .and_then(|athlete| self.performance(athlete, activity_type))
        {
            Some(performance) => performance.prediction_model()?,
            None => match self.activity_types.get(activity_type) {
                Some(activity_type) => activity_type.prediction_model()?,
                None => ActivityType::new(activity_type).prediction_model()?,
            },
        };

        calculate_schedule(&model, route, conditions)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            activity_count: self.activities.len() as u32,
            activity_type_count: self.activity_types.len() as u32,
            performance_count: self.performances.len() as u32,
            stale_subject_count: (self.dirty_types.len() + self.dirty_performances.len()) as u32,
        }
    }

    /// Get engine statistics as JSON.
    pub fn stats_json(&self) -> String {
        serde_json::to_string(&self.stats()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine statistics for monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub activity_count: u32,
    pub activity_type_count: u32,
    pub performance_count: u32,
    /// Subjects waiting for retraining
    pub stale_subject_count: u32,
}

// ============================================================================
// Global Singleton
// ============================================================================

/// Global engine instance.
///
/// Batch jobs and embedding applications can share one engine without
/// threading it through call sites.
pub static ENGINE: Lazy<Mutex<PredictionEngine>> = Lazy::new(|| {
    Mutex::new(PredictionEngine::new())
});

/// Get a lock on the global engine.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&mut PredictionEngine) -> R,
{
    let mut engine = ENGINE.lock().unwrap();
    f(&mut engine)
}

// ============================================================================
// Tests
// ============================================================================
