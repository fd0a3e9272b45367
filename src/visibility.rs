//! Which questions a student form shows, given the current answers.
use crate::models::{Answers, Question, QuestionTag, QuestionType};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

pub const YES: &str = "Yes";
pub const FIRST_YEAR: &str = "FY";

/// Texts of the questions first-year students never see. Only consulted for
/// rows that were stored without a tag.
pub const ADVANCED_QUESTIONS: &[&str] = &[
    "Enrolled in any certificate course at present?",
    "Advance Excel",
    "MS Word",
    "Tally Prime",
    "PPT",
    "AI",
    "Programming",
    "Coding",
    "Participated in any Intra collegiate competition?",
    "Participated in Inter collegiate event?",
    "Are you working part time or full time or doing internship?",
];

static ADVANCED_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ADVANCED_QUESTIONS.iter().copied().collect());

/// The tag of a question, falling back to its text for untagged rows.
pub fn effective_tag(question: &Question) -> Option<QuestionTag> {
    if question.tag.is_some() {
        return question.tag;
    }
    let text = question.question_text.as_str();
    if text == "Name" {
        Some(QuestionTag::Name)
    } else if text == "Class" {
        Some(QuestionTag::Class)
    } else if text.contains("Gender") {
        Some(QuestionTag::Gender)
    } else if text.contains("Occupation") {
        Some(QuestionTag::Occupation)
    } else if ADVANCED_SET.contains(text) {
        Some(QuestionTag::Advanced)
    } else {
        None
    }
}

/// First question carrying `tag`. Explicitly tagged rows win over text matches.
pub fn find_tagged(questions: &[Question], tag: QuestionTag) -> Option<&Question> {
    questions
        .iter()
        .find(|q| q.tag == Some(tag))
        .or_else(|| {
            questions
                .iter()
                .find(|q| q.tag.is_none() && effective_tag(q) == Some(tag))
        })
}

pub fn is_advanced(question: &Question) -> bool {
    effective_tag(question) == Some(QuestionTag::Advanced)
}

/// Stable sort by `order_index`, treating a missing index as 0.
pub fn sorted(questions: &[Question]) -> Vec<&Question> {
    let mut sorted = questions.iter().collect::<Vec<_>>();
    sorted.sort_by_key(|q| q.order_index.unwrap_or(0));
    sorted
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// Section label without an input.
    Section,
    Shown,
    /// Conditional child whose parent is not answered "Yes".
    Hidden,
}

#[derive(Clone, Debug)]
pub struct FormEntry<'a> {
    pub question: &'a Question,
    pub visibility: Visibility,
    pub conditional: bool,
    /// Locked questions keep their label but lose their input.
    pub editable: bool,
}

impl FormEntry<'_> {
    pub fn is_shown(&self) -> bool {
        self.visibility != Visibility::Hidden
    }
}

/// Read-only view over one question set, indexed by id.
pub struct Form<'a> {
    questions: &'a [Question],
    by_id: HashMap<i32, &'a Question>,
}

impl<'a> Form<'a> {
    pub fn new(questions: &'a [Question]) -> Self {
        Form {
            questions,
            by_id: questions.iter().map(|q| (q.id, q)).collect(),
        }
    }

    pub fn question(&self, id: i32) -> Option<&'a Question> {
        self.by_id.get(&id).copied()
    }

    /// Parent of a conditional child. A parent absent from the set (for
    /// example locked and filtered out) makes the question unconditional.
    pub fn conditional_parent(&self, question: &Question) -> Option<&'a Question> {
        if question.question_type == QuestionType::Header {
            return None;
        }
        question
            .parent_question_id
            .and_then(|id| self.question(id))
            .filter(|parent| parent.question_type == QuestionType::YesNo)
    }

    pub fn class_answer<'b>(&self, answers: &'b Answers) -> Option<&'b str> {
        find_tagged(self.questions, QuestionTag::Class)
            .and_then(|q| answers.get(&q.id))
            .map(|s| s.as_str())
    }

    pub fn first_year(&self, answers: &Answers) -> bool {
        self.class_answer(answers) == Some(FIRST_YEAR)
    }

    /// Ids removed from the form by the first-year rule: every advanced
    /// question plus its direct children.
    pub fn removed(&self, answers: &Answers) -> HashSet<i32> {
        if !self.first_year(answers) {
            return HashSet::new();
        }
        let advanced = self
            .questions
            .iter()
            .filter(|q| is_advanced(q))
            .map(|q| q.id)
            .collect::<HashSet<_>>();
        self.questions
            .iter()
            .filter(|q| {
                advanced.contains(&q.id)
                    || q.parent_question_id
                        .map_or(false, |parent| advanced.contains(&parent))
            })
            .map(|q| q.id)
            .collect()
    }

    /// Drops answers to removed questions. Returns the ids whose answer was cleared.
    pub fn apply_removal(&self, answers: &mut Answers) -> Vec<i32> {
        let removed = self.removed(answers);
        let mut cleared = removed
            .into_iter()
            .filter(|id| answers.remove(id).is_some())
            .collect::<Vec<_>>();
        cleared.sort_unstable();
        cleared
    }

    pub fn visibility(&self, question: &Question, answers: &Answers) -> Visibility {
        if question.question_type == QuestionType::Header {
            return Visibility::Section;
        }
        match self.conditional_parent(question) {
            Some(parent) if answers.get(&parent.id).map(|s| s.as_str()) != Some(YES) => {
                Visibility::Hidden
            }
            _ => Visibility::Shown,
        }
    }

    /// Every question still on the form, in display order.
    pub fn layout(&self, answers: &Answers) -> Vec<FormEntry<'a>> {
        let removed = self.removed(answers);
        sorted(self.questions)
            .into_iter()
            .filter(|q| !removed.contains(&q.id))
            .map(|q| FormEntry {
                question: q,
                visibility: self.visibility(q, answers),
                conditional: self.conditional_parent(q).is_some(),
                editable: !q.is_locked && q.question_type != QuestionType::Header,
            })
            .collect()
    }

    pub fn is_visible(&self, id: i32, answers: &Answers) -> bool {
        self.question(id).map_or(false, |q| {
            !self.removed(answers).contains(&id)
                && self.visibility(q, answers) != Visibility::Hidden
        })
    }
}
