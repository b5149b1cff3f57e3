//! Parser for the compact answer format students type into the bot, e.g. `1A2B3C`.

use serde::Serialize;

const MIN_RAW_LEN: usize = 2;
const MAX_RAW_LEN: usize = 3000;
const MAX_NUMBER_DIGITS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAnswer {
    pub question_number: u32,
    pub answer: char,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAnswers {
    /// Accepted answers in the order they appeared.
    pub parsed: Vec<ParsedAnswer>,
    /// One slot per question, `None` where no answer was given.
    pub by_question: Vec<Option<char>>,
}

impl ParsedAnswers {
    /// 1-indexed numbers of questions without an answer.
    pub fn missing_numbers(&self) -> Vec<u32> {
        self.by_question
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_none())
            .map(|(idx, _)| idx as u32 + 1)
            .collect()
    }

    pub fn as_strings(&self) -> Vec<Option<String>> {
        self.by_question
            .iter()
            .map(|a| a.map(|c| c.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("answer text must be between {MIN_RAW_LEN} and {MAX_RAW_LEN} characters")]
    Length,
    #[error("no answers of the form <number><A-D> were found")]
    NoAnswers,
}

impl From<ParseError> for crate::error::Error {
    fn from(_: ParseError) -> Self {
        crate::error::Error::InvalidAnswerFormat
    }
}

pub fn parse_answer_text(raw_text: &str, total_questions: usize) -> Result<ParsedAnswers, ParseError> {
    let compact: Vec<char> = raw_text
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_uppercase())
        .collect();

    if compact.len() < MIN_RAW_LEN || compact.len() > MAX_RAW_LEN {
        return Err(ParseError::Length);
    }

    let mut by_question: Vec<Option<char>> = vec![None; total_questions];
    let mut parsed = Vec::new();

    let mut idx = 0;
    while idx < compact.len() {
        if !compact[idx].is_ascii_digit() {
            idx += 1;
            continue;
        }

        let run_start = idx;
        while idx < compact.len() && compact[idx].is_ascii_digit() {
            idx += 1;
        }

        let letter_pos = idx;
        let Some(&letter) = compact.get(letter_pos) else { break };
        if !matches!(letter, 'A'..='D') {
            continue;
        }
        idx += 1;

        // A longer digit run only binds its last three digits to the letter.
        let digits_from = run_start.max(letter_pos.saturating_sub(MAX_NUMBER_DIGITS));
        let number: String = compact[digits_from..letter_pos].iter().collect();
        let Ok(question_number) = number.parse::<u32>() else { continue };

        if question_number < 1 || question_number as usize > total_questions {
            continue;
        }
        let slot = &mut by_question[question_number as usize - 1];
        if slot.is_some() {
            continue;
        }

        *slot = Some(letter);
        parsed.push(ParsedAnswer {
            question_number,
            answer: letter,
        });
    }

    if parsed.is_empty() {
        return Err(ParseError::NoAnswers);
    }

    Ok(ParsedAnswers { parsed, by_question })
}
