//! Training-set assembly for prediction subjects.
//!
//! A subject is anything that owns a fitted model: an activity type (trained
//! across all athletes) or an athlete's performance for one activity type.
//! Subjects expose their training inputs through [`TrainingSubject`], an
//! explicit capability carrying the outlier bounds, the categorical column
//! configuration, and per-record qualification. This module turns a pool of
//! activity records into a cleaned observation table for them.

use log::debug;

use crate::error::Result;
use crate::extract::{training_observations, TrainingObservation};
use crate::model::{CategoricalColumn, ModelParameters, PredictionModel};
use crate::{ActivityRecord, OutlierBounds};

/// Capability exposed by every trainable subject.
pub trait TrainingSubject {
    /// Name of the activity type the subject belongs to.
    fn activity_type(&self) -> &str;

    /// Plausible pace/gradient ranges used to reject outlier observations.
    /// Always the bounds of the subject's activity type.
    fn outlier_bounds(&self) -> OutlierBounds;

    /// Categorical columns of the subject's model, in encoding order.
    fn categorical_columns(&self) -> &'static [CategoricalColumn];

    /// Does a record feed this subject's model?
    fn qualifies(&self, record: &ActivityRecord) -> bool;
}

/// Collect, extract, and clean the training set for a subject.
///
/// Qualifying records are ordered most-recent-first by start date before the
/// optional cap is applied, so a limit keeps the freshest history.
/// Observations with a pace or gradient outside the subject's exclusive
/// bounds are dropped. An empty result is the normal "no training data"
/// state.
pub fn build_training_set<'a, I>(
    subject: &dyn TrainingSubject,
    records: I,
    limit: Option<usize>,
) -> Vec<TrainingObservation>
where
    I: IntoIterator<Item = &'a ActivityRecord>,
{
    let mut qualifying: Vec<&ActivityRecord> = records
        .into_iter()
        .filter(|record| subject.qualifies(record))
        .collect();
    qualifying.sort_by_key(|record| std::cmp::Reverse(record.start_date));
    if let Some(limit) = limit {
        qualifying.truncate(limit);
    }

    let bounds = subject.outlier_bounds();
    let mut observations = Vec::new();
    for record in &qualifying {
        observations.extend(
            training_observations(record)
                .into_iter()
                .filter(|observation| bounds.contains(observation)),
        );
    }

    debug!(
        "[Training] {} observations from {} records for activity type {}",
        observations.len(),
        qualifying.len(),
        subject.activity_type()
    );

    observations
}

/// Build the training set for a subject and fit its model.
///
/// Returns `None` when the subject has no qualifying observations; the
/// caller reports that as a "no training data" outcome and leaves the
/// subject's durable parameters untouched.
pub(crate) fn fit_parameters<'a, I>(
    subject: &dyn TrainingSubject,
    records: I,
    limit: Option<usize>,
) -> Result<Option<(ModelParameters, usize)>>
where
    I: IntoIterator<Item = &'a ActivityRecord>,
{
    let observations = build_training_set(subject, records, limit);
    if observations.is_empty() {
        return Ok(None);
    }

    let model = PredictionModel::fit(subject.categorical_columns().to_vec(), &observations)?;
    Ok(Some((model.parameters(), observations.len())))
}
