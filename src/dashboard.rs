//! Session state behind the student and faculty dashboards.
use crate::client::CheckResult;
use crate::error::AppError;
use crate::models::*;
use crate::unlock::{self, PollTimer};
use crate::visibility::{Form, FormEntry};
use chrono::{DateTime, Utc};
use std::time::Instant;

pub const FY_NOTICE: &str =
    "FY Student Notice: Some advanced questions are hidden as they're not applicable for first-year students.";

/// What a single answer change did to the rest of the form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Change {
    /// Answers dropped because their question left the form.
    pub cleared: Vec<i32>,
    /// The first-year restriction is now in effect.
    pub restricted: bool,
}

/// One student's form. Owns the answer map; nothing else writes to it.
pub struct StudentSession {
    student_id: i32,
    questions: Vec<Question>,
    answers: Answers,
}

impl StudentSession {
    pub fn new(student_id: i32, questions: Vec<Question>) -> Self {
        StudentSession {
            student_id,
            questions,
            answers: Answers::new(),
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn answer(&self, question_id: i32) -> Option<&str> {
        self.answers.get(&question_id).map(|s| s.as_str())
    }

    fn form(&self) -> Form<'_> {
        Form::new(&self.questions)
    }

    /// Merges answers loaded from the server over the in-memory ones.
    pub fn merge_loaded(&mut self, loaded: Answers) -> Change {
        self.answers.extend(loaded);
        self.reapply()
    }

    fn reapply(&mut self) -> Change {
        let form = Form::new(&self.questions);
        let cleared = form.apply_removal(&mut self.answers);
        Change {
            cleared,
            restricted: form.first_year(&self.answers),
        }
    }

    /// Records an answer for a question currently on the form and editable.
    pub fn set_answer(&mut self, question_id: i32, value: &str) -> Result<Change, AppError> {
        {
            let form = self.form();
            let entry = form
                .layout(&self.answers)
                .into_iter()
                .find(|e| e.question.id == question_id)
                .ok_or(AppError::NotFound("Question"))?;
            if !entry.editable {
                return Err(AppError::validation("Question is not editable"));
            }
            if !entry.is_shown() {
                return Err(AppError::validation("Question is hidden"));
            }
        }
        self.answers.insert(question_id, value.to_string());
        Ok(self.reapply())
    }

    pub fn layout(&self) -> Vec<FormEntry<'_>> {
        self.form().layout(&self.answers)
    }

    /// Entries a student currently sees.
    pub fn visible(&self) -> Vec<FormEntry<'_>> {
        self.layout().into_iter().filter(|e| e.is_shown()).collect()
    }

    pub fn is_visible(&self, question_id: i32) -> bool {
        self.form().is_visible(question_id, &self.answers)
    }

    pub fn restricted(&self) -> bool {
        self.form().first_year(&self.answers)
    }

    /// Answers to every question still on the form, hidden children included.
    pub fn save_payload(&self) -> SaveRequest {
        let form = self.form();
        let removed = form.removed(&self.answers);
        let responses = self
            .answers
            .iter()
            .filter(|(id, _)| !removed.contains(id))
            .filter(|(id, _)| {
                form.question(**id)
                    .map_or(false, |q| q.question_type != QuestionType::Header)
            })
            .map(|(id, answer)| (id.to_string(), answer.clone()))
            .collect();
        SaveRequest {
            student_id: self.student_id,
            responses,
        }
    }
}

/// Faculty view of the questionnaire plus the auto-unlock poll clock.
pub struct FacultySession {
    questions: Vec<Question>,
    poll: PollTimer,
}

impl FacultySession {
    pub fn new(questions: Vec<Question>) -> Self {
        FacultySession {
            questions,
            poll: PollTimer::new(unlock::POLL_INTERVAL),
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn replace_questions(&mut self, questions: Vec<Question>) {
        self.questions = questions;
    }

    pub fn poll_due(&mut self, now: Instant) -> bool {
        self.poll.due(now)
    }

    /// Locked questions with an unlock time, soonest first.
    pub fn scheduled(&self) -> Vec<&Question> {
        let mut scheduled = self
            .questions
            .iter()
            .filter(|q| q.is_locked && q.auto_unlock_at.is_some())
            .collect::<Vec<_>>();
        scheduled.sort_by_key(|q| q.auto_unlock_at);
        scheduled
    }

    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<&Question> {
        unlock::due(&self.questions, now)
    }

    /// Banner text for a check result, if anything changed.
    pub fn check_notice(result: &CheckResult) -> Option<String> {
        if result.unlocked_count > 0 {
            Some(format!(
                "{} question(s) automatically unlocked!",
                result.unlocked_count
            ))
        } else {
            None
        }
    }
}
