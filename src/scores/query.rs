//! Read-side views over the score store
//!
//! Lists, per-exam and per-student reports with averages. A lookup that
//! matches nothing returns `Ok(None)`: not found is an expected outcome,
//! not a store failure.

use super::model::Score;
use super::schema::{
    ScoreStore, EXAM_INDEX, PRIMARY_INDEX, STUDENT_INDEX, UNIQUE_EXAMS_INDEX, UNIQUE_STUDENTS_INDEX,
};
use crate::store::{StoreError, StoreStats};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Scores of one exam, with the mean across students
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamReport {
    pub exam: i64,
    pub scores: Vec<StudentScore>,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentScore {
    pub student: String,
    pub score: f64,
}

/// Scores of one student, with the mean across exams
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentReport {
    pub student: String,
    pub exams: Vec<ExamScore>,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamScore {
    pub exam: i64,
    pub score: f64,
}

/// Query and aggregation entry point shared by request handlers
#[derive(Clone)]
pub struct ScoreQueries {
    store: Arc<ScoreStore>,
}

impl ScoreQueries {
    pub fn new(store: Arc<ScoreStore>) -> Self {
        ScoreQueries { store }
    }

    pub fn store(&self) -> &Arc<ScoreStore> {
        &self.store
    }

    /// Every student with at least one score
    pub fn students(&self) -> Result<Vec<String>, StoreError> {
        let result = self.store.query(UNIQUE_STUDENTS_INDEX, &[])?;
        Ok(result.iter().map(|s| s.student_id.clone()).collect())
    }

    /// Every exam with at least one score
    pub fn exams(&self) -> Result<Vec<i64>, StoreError> {
        let result = self.store.query(UNIQUE_EXAMS_INDEX, &[])?;
        Ok(result.iter().map(|s| s.exam).collect())
    }

    /// Every stored score, ordered by exam then student
    pub fn all(&self) -> Result<Vec<Score>, StoreError> {
        Ok(self.store.query(PRIMARY_INDEX, &[])?.to_vec())
    }

    pub fn exam(&self, exam: i64) -> Result<Option<ExamReport>, StoreError> {
        let result = self.store.query(EXAM_INDEX, &[exam.into()])?;
        let scores: Vec<StudentScore> = result
            .iter()
            .map(|s| StudentScore {
                student: s.student_id.clone(),
                score: s.score,
            })
            .collect();

        Ok(mean(scores.iter().map(|s| s.score)).map(|average| ExamReport {
            exam,
            scores,
            average,
        }))
    }

    pub fn student(&self, student: &str) -> Result<Option<StudentReport>, StoreError> {
        let result = self.store.query(STUDENT_INDEX, &[student.into()])?;
        let exams: Vec<ExamScore> = result
            .iter()
            .map(|s| ExamScore {
                exam: s.exam,
                score: s.score,
            })
            .collect();

        Ok(mean(exams.iter().map(|e| e.score)).map(|average| StudentReport {
            student: student.to_string(),
            exams,
            average,
        }))
    }

    /// Store a validated score
    pub fn add(&self, score: Score) -> Result<(), StoreError> {
        self.store.upsert(score)
    }

    /// Delete every score of an exam, returning how many were removed
    pub fn delete_exam(&self, exam: i64) -> Result<usize, StoreError> {
        let removed = self.store.delete_by_index(EXAM_INDEX, &[exam.into()])?;
        info!(exam, removed, "deleted exam scores");
        Ok(removed)
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}

/// Arithmetic mean, `None` for an empty sequence
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
