//! Exam score domain
//!
//! The `Score` record, the five-index table that holds it, and the
//! read-side queries the HTTP layer serves.

mod model;
mod query;
mod schema;

pub use model::{DecodeError, Score, ScoreEvent, ValidationError};
pub use query::{ExamReport, ExamScore, ScoreQueries, StudentReport, StudentScore};
pub use schema::{
    new_score_store, score_schema, ScoreStore, EXAM_INDEX, FIELD_EXAM, FIELD_STUDENT, PRIMARY_INDEX,
    SCORE_TABLE, STUDENT_INDEX, UNIQUE_EXAMS_INDEX, UNIQUE_STUDENTS_INDEX,
};
