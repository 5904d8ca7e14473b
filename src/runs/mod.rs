//! # Runs Module
//!
//! Activity log records: plain field-level CRUD with no invariants.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::{Database, RunRecord};

/// Time taken for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    /// Hours component
    pub hours: i64,
    /// Minutes component
    pub minutes: i64,
    /// Seconds component
    pub seconds: i64,
}

/// A logged run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique id, assigned by the store
    pub id: i64,
    /// Owning account id
    pub user_id: i64,
    /// Free-form label ("morning loop")
    pub label: Option<String>,
    /// Time taken, if recorded
    pub duration: Option<Duration>,
    /// Distance in miles
    pub mileage: f64,
}

impl From<RunRecord> for Run {
    fn from(record: RunRecord) -> Self {
        let duration = match (
            record.duration_hours,
            record.duration_minutes,
            record.duration_seconds,
        ) {
            (Some(hours), Some(minutes), Some(seconds)) => Some(Duration {
                hours,
                minutes,
                seconds,
            }),
            _ => None,
        };
        Self {
            id: record.id,
            user_id: record.user_id,
            label: record.label,
            duration,
            mileage: record.mileage,
        }
    }
}

fn to_record(run: &Run) -> RunRecord {
    RunRecord {
        id: run.id,
        user_id: run.user_id,
        label: run.label.clone(),
        mileage: run.mileage,
        duration_hours: run.duration.map(|d| d.hours),
        duration_minutes: run.duration.map(|d| d.minutes),
        duration_seconds: run.duration.map(|d| d.seconds),
    }
}

/// Service for managing run records
pub struct RunService {
    /// Database for persistence
    db: Arc<Database>,
}

impl RunService {
    /// Create a new run service
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Log a new run
    pub fn create_run(&self, run: &Run) -> Result<Run> {
        let id = self.db.create_run(&to_record(run))?;
        tracing::info!("Logged run {} for user {}", id, run.user_id);
        Ok(Run {
            id,
            ..run.clone()
        })
    }

    /// Get a run by id
    pub fn get_run(&self, id: i64) -> Result<Run> {
        let record = self.db.get_run(id)?.ok_or(Error::RunNotFound)?;
        Ok(record.into())
    }

    /// Get all runs for a user
    pub fn get_runs_by_user_id(&self, user_id: i64) -> Result<Vec<Run>> {
        Ok(self
            .db
            .get_runs_by_user(user_id)?
            .into_iter()
            .map(Run::from)
            .collect())
    }

    /// Get all runs
    pub fn get_all_runs(&self) -> Result<Vec<Run>> {
        Ok(self
            .db
            .get_all_runs()?
            .into_iter()
            .map(Run::from)
            .collect())
    }

    /// Update a run's label, duration, and mileage
    pub fn update_run(&self, id: i64, updated: &Run) -> Result<Run> {
        let existing = self.db.get_run(id)?.ok_or(Error::RunNotFound)?;

        let record = RunRecord {
            id,
            user_id: existing.user_id,
            label: updated.label.clone(),
            mileage: updated.mileage,
            duration_hours: updated.duration.map(|d| d.hours),
            duration_minutes: updated.duration.map(|d| d.minutes),
            duration_seconds: updated.duration.map(|d| d.seconds),
        };
        self.db.update_run(&record)?;

        Ok(record.into())
    }

    /// Delete a run
    pub fn delete_run(&self, id: i64) -> Result<()> {
        if !self.db.delete_run(id)? {
            return Err(Error::RunNotFound);
        }
        tracing::info!("Deleted run {}", id);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
