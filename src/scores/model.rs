//! Exam score record and its wire format

use super::schema::{FIELD_EXAM, FIELD_STUDENT};
use crate::store::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One student's score on one exam
///
/// `(exam, student_id)` identifies the record; a newer score for the same
/// pair replaces the older one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    pub exam: i64,
    #[serde(rename = "studentid")]
    pub student_id: String,
    pub score: f64,
}

impl Score {
    pub fn new(exam: i64, student_id: impl Into<String>, score: f64) -> Self {
        Score {
            exam,
            student_id: student_id.into(),
            score,
        }
    }

    /// Decode and validate a JSON payload (`{"exam", "studentid", "score"}`)
    pub fn from_json(payload: &[u8]) -> Result<Self, DecodeError> {
        let event: ScoreEvent = serde_json::from_slice(payload).map_err(DecodeError::Json)?;
        Score::try_from(event).map_err(DecodeError::Invalid)
    }
}

impl Record for Score {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            FIELD_EXAM => Some(FieldValue::Int(self.exam)),
            FIELD_STUDENT => Some(FieldValue::Str(&self.student_id)),
            _ => None,
        }
    }
}

/// Score as it arrives on the wire, every field optional
///
/// Presence is tracked explicitly so that a score of exactly 0 is a real
/// score and only an absent field is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoreEvent {
    pub exam: Option<i64>,
    pub studentid: Option<String>,
    pub score: Option<f64>,
}

impl TryFrom<ScoreEvent> for Score {
    type Error = ValidationError;

    fn try_from(event: ScoreEvent) -> Result<Self, Self::Error> {
        let exam = match event.exam {
            Some(exam) if exam != 0 => exam,
            _ => return Err(ValidationError::InvalidExam),
        };
        let student_id = match event.studentid {
            Some(id) if !id.is_empty() => id,
            _ => return Err(ValidationError::InvalidStudent),
        };
        let score = match event.score {
            Some(score) if score.is_finite() => score,
            _ => return Err(ValidationError::InvalidScore),
        };

        Ok(Score {
            exam,
            student_id,
            score,
        })
    }
}

/// A record field that is missing or unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    InvalidExam,
    InvalidStudent,
    InvalidScore,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidExam => write!(f, "invalid exam id"),
            ValidationError::InvalidStudent => write!(f, "invalid studentid"),
            ValidationError::InvalidScore => write!(f, "invalid score"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// A payload that could not be turned into a `Score`
#[derive(Debug)]
pub enum DecodeError {
    /// Not JSON, or JSON of the wrong shape
    Json(serde_json::Error),

    /// Well-formed JSON with an invalid field
    Invalid(ValidationError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Json(e) => write!(f, "malformed score payload: {}", e),
            DecodeError::Invalid(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Json(e) => Some(e),
            DecodeError::Invalid(e) => Some(e),
        }
    }
}
