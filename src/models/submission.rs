use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: Uuid,
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub window_id: Uuid,
    pub raw_answer_text: String,
    pub parsed_answers: sqlx::types::Json<Vec<Option<String>>>,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SubmissionDetail {
    pub question_number: i32,
    pub given_answer: Option<String>,
    pub correct_answer: String,
    pub is_correct: bool,
}

/// Everything written in the submit transaction besides the window transition.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub window_id: Uuid,
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub raw_answer_text: String,
    pub parsed_answers: Vec<Option<String>>,
    pub score: i32,
    pub details: Vec<SubmissionDetail>,
    pub submitted_at: DateTime<Utc>,
}

/// Row used by the bot's result listings.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SubmissionSummary {
    pub id: Uuid,
    pub score: i32,
    pub total_questions: i32,
    pub lesson_number: i32,
    pub test_title: String,
    pub created_at: DateTime<Utc>,
}
