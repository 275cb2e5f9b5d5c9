//! Pace regression pipeline: one-hot encoding, polynomial gradient expansion,
//! and least-squares fitting.
//!
//! The model predicts pace (seconds per meter) from the gradient of a step
//! and the static characteristics of the trip. Fitted parameters are fully
//! captured by [`ModelParameters`], so a model can be reconstructed from
//! storage and predict without retraining.
//!
//! ## Feature layout
//!
//! The coefficient vector follows one canonical order, shared by fitting,
//! storage, and reconstruction:
//!
//! 1. one dummy per vocabulary entry, per categorical column in declared
//!    order (vocabularies are stored sorted),
//! 2. `total_elevation_gain`, `total_distance`, commute flag,
//! 3. `gradient`, `gradient²`.
//!
//! ## Example
//! ```rust
//! use pace_predictor::{CategoricalColumn, PredictionModel, TripConditions};
//! use pace_predictor::extract::TrainingObservation;
//!
//! let observations: Vec<TrainingObservation> = (0..6)
//!     .map(|i| TrainingObservation {
//!         gradient: i as f64 * 2.0,
//!         pace: 0.3 + 0.01 * (i as f64 * 2.0),
//!         cumulative_elevation_gain: 10.0,
//!         total_distance: 5_000.0,
//!         total_elevation_gain: 120.0,
//!         commute: false,
//!         gear: "None".to_string(),
//!         workout_type: "None".to_string(),
//!     })
//!     .collect();
//!
//! let model = PredictionModel::fit(vec![CategoricalColumn::WorkoutType], &observations).unwrap();
//! let pace = model.predict_pace(4.0, &TripConditions::default());
//! assert!((pace - 0.34).abs() < 1e-6);
//! ```

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{PredictionError, Result};
use crate::extract::{TrainingObservation, NONE_CATEGORY};

/// Number of non-categorical features: total elevation gain, total distance,
/// commute flag, gradient, gradient squared.
pub const NUMERIC_FEATURE_COUNT: usize = 5;

/// Intercept of an untrained model: 0.36 s/m, i.e. 6:00/km or 10 km/h.
pub const DEFAULT_FLAT_PACE: f64 = 0.36;

/// Number of cross-validation folds (capped at the observation count).
pub const CV_FOLDS: usize = 5;

/// Relative cutoff below which singular values are treated as zero.
const SINGULAR_VALUE_CUTOFF: f64 = 1e-10;

/// A categorical column of the observation table.
///
/// Subjects declare which columns they encode: activity types use only
/// `WorkoutType`, athlete performances use `Gear` and `WorkoutType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoricalColumn {
    Gear,
    WorkoutType,
}

impl CategoricalColumn {
    pub fn name(self) -> &'static str {
        match self {
            CategoricalColumn::Gear => "gear",
            CategoricalColumn::WorkoutType => "workout_type",
        }
    }
}

/// Static characteristics of a planned trip, used at prediction time.
///
/// Categorical values left as `None` map to the "None" vocabulary bucket;
/// values never seen during training encode as all zeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripConditions {
    /// Planned total distance in meters
    pub total_distance: f64,
    /// Planned total elevation gain in meters
    pub total_elevation_gain: f64,
    /// Is the trip a commute?
    pub commute: bool,
    /// Gear identifier, if chosen
    pub gear: Option<String>,
    /// Workout-type label, if chosen
    pub workout_type: Option<String>,
}

/// Durable representation of a fitted model.
///
/// Holds everything needed to reconstruct a [`PredictionModel`] without the
/// raw training data: coefficients in canonical order, the intercept (flat
/// pace), one ordered vocabulary per categorical column, and quality scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub coefficients: Vec<f64>,
    /// Flat pace in seconds per meter: the intercept of the regression
    pub intercept: f64,
    /// One sorted vocabulary per categorical column, in column order
    pub categories: Vec<Vec<String>>,
    /// R² of the model on its training data, 0.0 when untrained
    pub model_score: f64,
    /// Held-out R² per cross-validation fold
    pub cv_scores: Vec<f64>,
}

impl ModelParameters {
    /// Untrained default: a valid constant-pace model.
    ///
    /// Coefficients are zero-filled to the declared column configuration
    /// (vocabulary `["None"]` per categorical column) and every vector is a
    /// fresh allocation per instance.
    pub fn default_for(categorical_columns: &[CategoricalColumn]) -> Self {
        let categories: Vec<Vec<String>> = categorical_columns
            .iter()
            .map(|_| vec![NONE_CATEGORY.to_string()])
            .collect();
        let feature_count = categorical_columns.len() + NUMERIC_FEATURE_COUNT;

        ModelParameters {
            coefficients: vec![0.0; feature_count],
            intercept: DEFAULT_FLAT_PACE,
            categories,
            model_score: 0.0,
            cv_scores: Vec::new(),
        }
    }
}

/// Number of features implied by a column configuration and its vocabularies.
pub fn expected_feature_count(categories: &[Vec<String>]) -> usize {
    categories.iter().map(Vec::len).sum::<usize>() + NUMERIC_FEATURE_COUNT
}

/// A fitted (or reconstructed) pace regression model.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionModel {
    categorical_columns: Vec<CategoricalColumn>,
    categories: Vec<Vec<String>>,
    coefficients: Vec<f64>,
    intercept: f64,
    model_score: f64,
    cv_scores: Vec<f64>,
}

impl PredictionModel {
    /// Fit the pipeline on a cleaned training set.
    ///
    /// Vocabularies are discovered from the observations (sorted, so the fit
    /// is deterministic for a given training set). Alongside the fit itself,
    /// computes the training R² and contiguous k-fold cross-validation
    /// scores, refitting the full pipeline per fold.
    ///
    /// Fitting on an empty set is a caller error: check for "no training
    /// data" before calling.
    pub fn fit(
        categorical_columns: Vec<CategoricalColumn>,
        observations: &[TrainingObservation],
    ) -> Result<Self> {
        if observations.is_empty() {
            return Err(PredictionError::config(
                "cannot fit a prediction model on an empty training set",
            ));
        }

        let (categories, coefficients, intercept) =
            fit_core(&categorical_columns, observations)?;

        let mut model = PredictionModel {
            categorical_columns,
            categories,
            coefficients,
            intercept,
            model_score: 0.0,
            cv_scores: Vec::new(),
        };

        let predicted: Vec<f64> = observations
            .iter()
            .map(|o| model.predict_observation(o))
            .collect();
        let actual: Vec<f64> = observations.iter().map(|o| o.pace).collect();
        model.model_score = r_squared(&predicted, &actual);
        model.cv_scores = cross_validate(&model.categorical_columns, observations);

        Ok(model)
    }

    /// Reconstruct a model from persisted parameters, without refitting.
    ///
    /// Validates the stored shape against the declared columns: the number of
    /// vocabularies must match the column count and the coefficient length
    /// must match the implied feature count. A mismatch (e.g. parameters
    /// stored before a column was added) is a configuration error, never a
    /// silent misprediction.
    pub fn from_parameters(
        categorical_columns: Vec<CategoricalColumn>,
        parameters: &ModelParameters,
    ) -> Result<Self> {
        if parameters.categories.len() != categorical_columns.len() {
            return Err(PredictionError::config(format!(
                "stored parameters have {} category vocabularies, expected {}",
                parameters.categories.len(),
                categorical_columns.len()
            )));
        }

        let expected = expected_feature_count(&parameters.categories);
        if parameters.coefficients.len() != expected {
            return Err(PredictionError::SchemaMismatch {
                expected_features: expected,
                actual_features: parameters.coefficients.len(),
            });
        }

        Ok(PredictionModel {
            categorical_columns,
            categories: parameters.categories.clone(),
            coefficients: parameters.coefficients.clone(),
            intercept: parameters.intercept,
            model_score: parameters.model_score,
            cv_scores: parameters.cv_scores.clone(),
        })
    }

    /// Export the fitted parameters for storage.
    pub fn parameters(&self) -> ModelParameters {
        ModelParameters {
            coefficients: self.coefficients.clone(),
            intercept: self.intercept,
            categories: self.categories.clone(),
            model_score: self.model_score,
            cv_scores: self.cv_scores.clone(),
        }
    }

    /// Predict the pace (s/m) for one step gradient under the given trip
    /// conditions.
    pub fn predict_pace(&self, gradient: f64, conditions: &TripConditions) -> f64 {
        let features = encode_features(
            &self.categorical_columns,
            &self.categories,
            conditions.gear.as_deref().unwrap_or(NONE_CATEGORY),
            conditions.workout_type.as_deref().unwrap_or(NONE_CATEGORY),
            conditions.total_elevation_gain,
            conditions.total_distance,
            conditions.commute,
            gradient,
        );
        self.predict_features(&features)
    }

    /// Predict the pace for a sequence of step gradients sharing one set of
    /// trip conditions.
    pub fn predict_paces(&self, gradients: &[f64], conditions: &TripConditions) -> Vec<f64> {
        gradients
            .iter()
            .map(|&gradient| self.predict_pace(gradient, conditions))
            .collect()
    }

    /// R² of the model on its training data.
    pub fn model_score(&self) -> f64 {
        self.model_score
    }

    /// Held-out R² per cross-validation fold.
    pub fn cv_scores(&self) -> &[f64] {
        &self.cv_scores
    }

    /// The declared categorical columns, in encoding order.
    pub fn categorical_columns(&self) -> &[CategoricalColumn] {
        &self.categorical_columns
    }

    /// The discovered vocabulary for one categorical column.
    pub fn categories(&self, column: CategoricalColumn) -> Option<&[String]> {
        self.categorical_columns
            .iter()
            .position(|&c| c == column)
            .map(|index| self.categories[index].as_slice())
    }

    fn predict_features(&self, features: &[f64]) -> f64 {
        let mut pace = self.intercept;
        for (coefficient, feature) in self.coefficients.iter().zip(features) {
            pace += coefficient * feature;
        }
        pace
    }

    fn predict_observation(&self, observation: &TrainingObservation) -> f64 {
        let features = encode_features(
            &self.categorical_columns,
            &self.categories,
            &observation.gear,
            &observation.workout_type,
            observation.total_elevation_gain,
            observation.total_distance,
            observation.commute,
            observation.gradient,
        );
        self.predict_features(&features)
    }
}

fn observation_value(column: CategoricalColumn, observation: &TrainingObservation) -> &str {
    match column {
        CategoricalColumn::Gear => &observation.gear,
        CategoricalColumn::WorkoutType => &observation.workout_type,
    }
}

/// Encode one row into the canonical feature order.
#[allow(clippy::too_many_arguments)]
fn encode_features(
    columns: &[CategoricalColumn],
    categories: &[Vec<String>],
    gear: &str,
    workout_type: &str,
    total_elevation_gain: f64,
    total_distance: f64,
    commute: bool,
    gradient: f64,
) -> Vec<f64> {
    let mut features = Vec::with_capacity(expected_feature_count(categories));

    for (column, vocabulary) in columns.iter().zip(categories) {
        let value = match column {
            CategoricalColumn::Gear => gear,
            CategoricalColumn::WorkoutType => workout_type,
        };
        for entry in vocabulary {
            features.push(if entry == value { 1.0 } else { 0.0 });
        }
    }

    features.push(total_elevation_gain);
    features.push(total_distance);
    features.push(if commute { 1.0 } else { 0.0 });
    features.push(gradient);
    features.push(gradient * gradient);

    features
}

/// Discover the sorted vocabulary of each categorical column.
fn discover_categories(
    columns: &[CategoricalColumn],
    observations: &[TrainingObservation],
) -> Vec<Vec<String>> {
    columns
        .iter()
        .map(|&column| {
            let values: std::collections::BTreeSet<&str> = observations
                .iter()
                .map(|observation| observation_value(column, observation))
                .collect();
            values.into_iter().map(str::to_string).collect()
        })
        .collect()
}

/// Encode the training set and solve the least-squares problem.
fn fit_core(
    columns: &[CategoricalColumn],
    observations: &[TrainingObservation],
) -> Result<(Vec<Vec<String>>, Vec<f64>, f64)> {
    let categories = discover_categories(columns, observations);
    let feature_count = expected_feature_count(&categories);

    let mut rows = Vec::with_capacity(observations.len() * feature_count);
    for observation in observations {
        rows.extend(encode_features(
            columns,
            &categories,
            &observation.gear,
            &observation.workout_type,
            observation.total_elevation_gain,
            observation.total_distance,
            observation.commute,
            observation.gradient,
        ));
    }

    let x = DMatrix::from_row_slice(observations.len(), feature_count, &rows);
    let y = DVector::from_iterator(
        observations.len(),
        observations.iter().map(|observation| observation.pace),
    );

    let (coefficients, intercept) = solve_least_squares(&x, &y)?;
    Ok((categories, coefficients, intercept))
}

/// Ordinary least squares with intercept, solved by centered SVD.
///
/// One-hot blocks are exactly collinear with the intercept and small training
/// sets leave trip-level columns constant, so the design matrix is routinely
/// rank-deficient. The SVD pseudo-inverse yields the deterministic
/// minimum-norm solution; constant columns get a coefficient of exactly zero.
fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<(Vec<f64>, f64)> {
    let rows = x.nrows();
    let cols = x.ncols();

    let column_means: Vec<f64> = (0..cols).map(|j| x.column(j).mean()).collect();
    let y_mean = y.mean();

    let centered = DMatrix::from_fn(rows, cols, |i, j| x[(i, j)] - column_means[j]);
    let centered_y = y.add_scalar(-y_mean);

    let svd = centered
        .try_svd(true, true, f64::EPSILON, 1000)
        .ok_or_else(|| {
            PredictionError::training("singular value decomposition did not converge")
        })?;

    let max_singular_value = svd
        .singular_values
        .iter()
        .fold(0.0_f64, |max, &value| max.max(value));
    let cutoff = max_singular_value * SINGULAR_VALUE_CUTOFF;

    let solution = svd
        .solve(&centered_y, cutoff)
        .map_err(PredictionError::training)?;

    let coefficients: Vec<f64> = solution.iter().copied().collect();
    let intercept = y_mean
        - column_means
            .iter()
            .zip(&coefficients)
            .map(|(mean, coefficient)| mean * coefficient)
            .sum::<f64>();

    Ok((coefficients, intercept))
}

/// Coefficient of determination. Defined as 0.0 for a constant target.
fn r_squared(predicted: &[f64], actual: &[f64]) -> f64 {
    let n = actual.len();
    if n == 0 {
        return 0.0;
    }

    let mean = actual.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean) * (a - mean)).sum();
    if ss_tot <= f64::EPSILON {
        return 0.0;
    }

    let ss_res: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (a - p) * (a - p))
        .sum();

    1.0 - ss_res / ss_tot
}

/// Contiguous k-fold cross-validation, refitting the full pipeline per fold.
///
/// Folds with an empty train or validation split are skipped; fewer than two
/// usable folds yields an empty score vector.
fn cross_validate(
    columns: &[CategoricalColumn],
    observations: &[TrainingObservation],
) -> Vec<f64> {
    let n = observations.len();
    let folds = CV_FOLDS.min(n);
    if folds < 2 {
        return Vec::new();
    }

    let mut scores = Vec::with_capacity(folds);
    for fold in 0..folds {
        let start = fold * n / folds;
        let end = (fold + 1) * n / folds;
        if start == end {
            continue;
        }

        let train: Vec<TrainingObservation> = observations[..start]
            .iter()
            .chain(observations[end..].iter())
            .cloned()
            .collect();
        if train.is_empty() {
            continue;
        }

        let (categories, coefficients, intercept) = match fit_core(columns, &train) {
            Ok(fitted) => fitted,
            Err(_) => continue,
        };
        let fold_model = PredictionModel {
            categorical_columns: columns.to_vec(),
            categories,
            coefficients,
            intercept,
            model_score: 0.0,
            cv_scores: Vec::new(),
        };

        let validation = &observations[start..end];
        let predicted: Vec<f64> = validation
            .iter()
            .map(|o| fold_model.predict_observation(o))
            .collect();
        let actual: Vec<f64> = validation.iter().map(|o| o.pace).collect();
        scores.push(r_squared(&predicted, &actual));
    }

    scores
}
