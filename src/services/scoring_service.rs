use crate::models::submission::SubmissionDetail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredAnswers {
    pub score: i32,
    pub details: Vec<SubmissionDetail>,
}

pub struct ScoringService;

impl ScoringService {
    /// Compares each question's answer with the key. Questions past the end of a
    /// short key are graded against an empty answer and can never be correct.
    pub fn score(
        by_question: &[Option<String>],
        answer_key: &[String],
        total_questions: usize,
    ) -> ScoredAnswers {
        let mut score: i32 = 0;
        let mut details = Vec::with_capacity(total_questions);

        for idx in 0..total_questions {
            let given = by_question.get(idx).cloned().flatten();
            let correct = answer_key.get(idx).cloned().unwrap_or_default();
            let is_correct = given.as_deref() == Some(correct.as_str()) && !correct.is_empty();
            if is_correct {
                score += 1;
            }

            details.push(SubmissionDetail {
                question_number: idx as i32 + 1,
                given_answer: given,
                correct_answer: correct,
                is_correct,
            });
        }

        ScoredAnswers { score, details }
    }
}
