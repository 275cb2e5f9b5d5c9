//! # Persistent Model Store
//!
//! SQLite-backed storage for fitted model parameters. Subjects train
//! in memory; this store makes their durable fields survive restarts so a
//! route can be scheduled without retraining.
//!
//! Coefficients, scores, and category vocabularies are packed as MessagePack
//! blobs: the store only needs to round-trip ordered float sequences and
//! ordered string lists, not expose them to SQL.

#[cfg(feature = "persistence")]
use rusqlite::{params, Connection, OptionalExtension};

#[cfg(feature = "persistence")]
use log::info;

#[cfg(feature = "persistence")]
use crate::error::Result;

#[cfg(feature = "persistence")]
use crate::model::ModelParameters;

#[cfg(feature = "persistence")]
use crate::subjects::{ActivityPerformance, ActivityType};

#[cfg(feature = "persistence")]
use crate::OutlierBounds;

/// SQLite-backed store for fitted model parameters.
#[cfg(feature = "persistence")]
pub struct ModelStore {
    db: Connection,
}

#[cfg(feature = "persistence")]
impl ModelStore {
    /// Open (or create) a store at the given database path.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Type-wide models, one row per activity type
            CREATE TABLE IF NOT EXISTS activity_types (
                name TEXT PRIMARY KEY,
                min_pace REAL NOT NULL,
                max_pace REAL NOT NULL,
                min_gradient REAL NOT NULL,
                max_gradient REAL NOT NULL,
                intercept REAL NOT NULL,
                model_score REAL NOT NULL,
                coefficients BLOB NOT NULL,
                categories BLOB NOT NULL,
                cv_scores BLOB NOT NULL
            );

            -- Athlete-scoped models
            CREATE TABLE IF NOT EXISTS activity_performances (
                athlete_id TEXT NOT NULL,
                activity_type TEXT NOT NULL,
                min_pace REAL NOT NULL,
                max_pace REAL NOT NULL,
                min_gradient REAL NOT NULL,
                max_gradient REAL NOT NULL,
                intercept REAL NOT NULL,
                model_score REAL NOT NULL,
                coefficients BLOB NOT NULL,
                categories BLOB NOT NULL,
                cv_scores BLOB NOT NULL,
                PRIMARY KEY (athlete_id, activity_type)
            );
            "#,
        )?;
        Ok(())
    }

    // ========================================================================
    // Activity Types
    // ========================================================================

    /// Insert or replace an activity type's bounds and fitted parameters.
    pub fn save_activity_type(&self, activity_type: &ActivityType) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO activity_types
             (name, min_pace, max_pace, min_gradient, max_gradient,
              intercept, model_score, coefficients, categories, cv_scores)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                activity_type.name,
                activity_type.bounds.min_pace,
                activity_type.bounds.max_pace,
                activity_type.bounds.min_gradient,
                activity_type.bounds.max_gradient,
                activity_type.parameters.intercept,
                activity_type.parameters.model_score,
                rmp_serde::to_vec(&activity_type.parameters.coefficients)?,
                rmp_serde::to_vec(&activity_type.parameters.categories)?,
                rmp_serde::to_vec(&activity_type.parameters.cv_scores)?,
            ],
        )?;
        Ok(())
    }

    /// Load an activity type by name.
    pub fn load_activity_type(&self, name: &str) -> Result<Option<ActivityType>> {
        let row = self
            .db
            .query_row(
                "SELECT name, min_pace, max_pace, min_gradient, max_gradient,
                        intercept, model_score, coefficients, categories, cv_scores
                 FROM activity_types WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, Vec<u8>>(7)?,
                        row.get::<_, Vec<u8>>(8)?,
                        row.get::<_, Vec<u8>>(9)?,
                    ))
                },
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ActivityType {
            name: row.0,
            bounds: OutlierBounds {
                min_pace: row.1,
                max_pace: row.2,
                min_gradient: row.3,
                max_gradient: row.4,
            },
            parameters: unpack_parameters(row.5, row.6, &row.7, &row.8, &row.9)?,
        }))
    }

    /// Load every stored activity type.
    pub fn load_all_activity_types(&self) -> Result<Vec<ActivityType>> {
        let mut statement = self.db.prepare("SELECT name FROM activity_types")?;
        let names: Vec<String> = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<_, _>>()?;

        let mut activity_types = Vec::with_capacity(names.len());
        for name in names {
            if let Some(activity_type) = self.load_activity_type(&name)? {
                activity_types.push(activity_type);
            }
        }

        info!("[Store] Loaded {} activity types", activity_types.len());
        Ok(activity_types)
    }

    // ========================================================================
    // Activity Performances
    // ========================================================================

    /// Insert or replace an athlete's fitted parameters for an activity type.
    pub fn save_performance(&self, performance: &ActivityPerformance) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO activity_performances
             (athlete_id, activity_type, min_pace, max_pace, min_gradient, max_gradient,
              intercept, model_score, coefficients, categories, cv_scores)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                performance.athlete_id,
                performance.activity_type,
                performance.bounds.min_pace,
                performance.bounds.max_pace,
                performance.bounds.min_gradient,
                performance.bounds.max_gradient,
                performance.parameters.intercept,
                performance.parameters.model_score,
                rmp_serde::to_vec(&performance.parameters.coefficients)?,
                rmp_serde::to_vec(&performance.parameters.categories)?,
                rmp_serde::to_vec(&performance.parameters.cv_scores)?,
            ],
        )?;
        Ok(())
    }

    /// Load an athlete's performance for an activity type.
    pub fn load_performance(
        &self,
        athlete_id: &str,
        activity_type: &str,
    ) -> Result<Option<ActivityPerformance>> {
        let row = self
            .db
            .query_row(
                "SELECT athlete_id, activity_type, min_pace, max_pace, min_gradient,
                        max_gradient, intercept, model_score, coefficients, categories, cv_scores
                 FROM activity_performances
                 WHERE athlete_id = ?1 AND activity_type = ?2",
                params![athlete_id, activity_type],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, f64>(7)?,
                        row.get::<_, Vec<u8>>(8)?,
                        row.get::<_, Vec<u8>>(9)?,
                        row.get::<_, Vec<u8>>(10)?,
                    ))
                },
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ActivityPerformance {
            athlete_id: row.0,
            activity_type: row.1,
            bounds: OutlierBounds {
                min_pace: row.2,
                max_pace: row.3,
                min_gradient: row.4,
                max_gradient: row.5,
            },
            parameters: unpack_parameters(row.6, row.7, &row.8, &row.9, &row.10)?,
        }))
    }

    /// Load every performance stored for an athlete.
    pub fn load_athlete_performances(&self, athlete_id: &str) -> Result<Vec<ActivityPerformance>> {
        let mut statement = self
            .db
            .prepare("SELECT activity_type FROM activity_performances WHERE athlete_id = ?1")?;
        let types: Vec<String> = statement
            .query_map(params![athlete_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<_, _>>()?;

        let mut performances = Vec::with_capacity(types.len());
        for activity_type in types {
            if let Some(performance) = self.load_performance(athlete_id, &activity_type)? {
                performances.push(performance);
            }
        }
        Ok(performances)
    }
}

#[cfg(feature = "persistence")]
fn unpack_parameters(
    intercept: f64,
    model_score: f64,
    coefficients: &[u8],
    categories: &[u8],
    cv_scores: &[u8],
) -> Result<ModelParameters> {
    Ok(ModelParameters {
        coefficients: rmp_serde::from_slice(coefficients)?,
        intercept,
        categories: rmp_serde::from_slice(categories)?,
        model_score,
        cv_scores: rmp_serde::from_slice(cv_scores)?,
    })
}

#[cfg(all(test, feature = "persistence"))]
mod tests {
    use super::*;
    use crate::{ActivityRecord, ActivityStream};

    fn run_record(id: &str, athlete: &str) -> ActivityRecord {
        ActivityRecord {
            id: id.to_string(),
            athlete_id: athlete.to_string(),
            activity_type: "Run".to_string(),
            start_date: 1_700_000_000,
            distance: 900.0,
            total_elevation_gain: 16.0,
            commute: false,
            gear: Some("g1".to_string()),
            workout_type: Some("long run".to_string()),
            stream: ActivityStream {
                time: (0..10).map(|i| i as f64 * 30.0).collect(),
                distance: (0..10).map(|i| i as f64 * 100.0).collect(),
                altitude: vec![0.0, 2.0, 3.0, 3.0, 6.0, 10.0, 11.0, 13.0, 14.0, 16.0],
                moving: vec![true; 10],
            },
        }
    }

    #[test]
    fn test_activity_type_round_trip() {
        let store = ModelStore::in_memory().unwrap();

        let records = vec![run_record("a1", "athlete-1")];
        let mut activity_type = ActivityType::new("Run");
        activity_type.train(&records, None).unwrap();

        store.save_activity_type(&activity_type).unwrap();
        let loaded = store.load_activity_type("Run").unwrap().unwrap();

        assert_eq!(loaded, activity_type);
    }

    #[test]
    fn test_performance_round_trip() {
        let store = ModelStore::in_memory().unwrap();

        let records = vec![run_record("a1", "athlete-1")];
        let activity_type = ActivityType::new("Run");
        let mut performance = ActivityPerformance::new("athlete-1", &activity_type);
        performance.train(&records, None).unwrap();

        store.save_performance(&performance).unwrap();
        let loaded = store
            .load_performance("athlete-1", "Run")
            .unwrap()
            .unwrap();

        assert_eq!(loaded, performance);

        // The reconstructed model predicts identically
        let original = performance.prediction_model().unwrap();
        let restored = loaded.prediction_model().unwrap();
        let conditions = crate::TripConditions::default();
        for gradient in [-5.0, 0.0, 3.0, 12.0] {
            let a = original.predict_pace(gradient, &conditions);
            let b = restored.predict_pace(gradient, &conditions);
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_missing_rows_load_as_none() {
        let store = ModelStore::in_memory().unwrap();
        assert!(store.load_activity_type("Run").unwrap().is_none());
        assert!(store
            .load_performance("athlete-1", "Run")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_save_replaces_existing_row() {
        let store = ModelStore::in_memory().unwrap();

        let untrained = ActivityType::new("Run");
        store.save_activity_type(&untrained).unwrap();

        let records = vec![run_record("a1", "athlete-1")];
        let mut trained = ActivityType::new("Run");
        trained.train(&records, None).unwrap();
        store.save_activity_type(&trained).unwrap();

        let loaded = store.load_activity_type("Run").unwrap().unwrap();
        assert_eq!(loaded, trained);
        assert_ne!(loaded, untrained);
    }

    #[test]
    fn test_load_all_activity_types() {
        let store = ModelStore::in_memory().unwrap();
        store.save_activity_type(&ActivityType::new("Run")).unwrap();
        store.save_activity_type(&ActivityType::new("Ride")).unwrap();

        let loaded = store.load_all_activity_types().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_load_athlete_performances() {
        let store = ModelStore::in_memory().unwrap();
        let run = ActivityType::new("Run");
        let ride = ActivityType::new("Ride");

        store
            .save_performance(&ActivityPerformance::new("athlete-1", &run))
            .unwrap();
        store
            .save_performance(&ActivityPerformance::new("athlete-1", &ride))
            .unwrap();
        store
            .save_performance(&ActivityPerformance::new("athlete-2", &run))
            .unwrap();

        let loaded = store.load_athlete_performances("athlete-1").unwrap();
        assert_eq!(loaded.len(), 2);
    }
}
