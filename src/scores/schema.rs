//! Table and index definitions for exam scores

use super::model::Score;
use crate::store::{IndexSchema, IndexedStore, Indexer, SchemaError, TableSchema, ID_INDEX};

pub const SCORE_TABLE: &str = "score";

/// Primary index: `(exam, studentid)`
pub const PRIMARY_INDEX: &str = ID_INDEX;
/// All scores of one student
pub const STUDENT_INDEX: &str = "student_idx";
/// One row per distinct student
pub const UNIQUE_STUDENTS_INDEX: &str = "u_student_idx";
/// All scores of one exam
pub const EXAM_INDEX: &str = "exam_idx";
/// One row per distinct exam
pub const UNIQUE_EXAMS_INDEX: &str = "u_exam_idx";

pub const FIELD_EXAM: &str = "exam";
pub const FIELD_STUDENT: &str = "studentid";

/// Store holding exam scores
pub type ScoreStore = IndexedStore<Score>;

/// Schema of the `score` table
pub fn score_schema() -> TableSchema {
    TableSchema::new(
        SCORE_TABLE,
        vec![
            IndexSchema::unique(
                PRIMARY_INDEX,
                Indexer::compound(
                    vec![Indexer::int(FIELD_EXAM), Indexer::string(FIELD_STUDENT)],
                    true,
                ),
            ),
            IndexSchema::non_unique(STUDENT_INDEX, Indexer::string(FIELD_STUDENT)),
            IndexSchema::unique(UNIQUE_STUDENTS_INDEX, Indexer::string(FIELD_STUDENT)),
            IndexSchema::non_unique(EXAM_INDEX, Indexer::int(FIELD_EXAM)),
            IndexSchema::unique(UNIQUE_EXAMS_INDEX, Indexer::int(FIELD_EXAM)),
        ],
    )
}

/// Create an empty score store
pub fn new_score_store() -> Result<ScoreStore, SchemaError> {
    IndexedStore::new(score_schema())
}
