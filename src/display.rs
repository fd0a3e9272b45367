use crate::models::{Question, QuestionType, StudentSummary};
use crate::visibility::{effective_tag, FormEntry, Visibility};
use chrono::{DateTime, Local, Utc};

/// Choices of a select question; empty for free-form ones.
pub fn select_options(question: &Question) -> &'static [&'static str] {
    if question.question_type != QuestionType::Select {
        return &[];
    }
    match effective_tag(question) {
        Some(tag) => tag.options(),
        None => &[],
    }
}

pub fn input_hint(question: &Question) -> String {
    match question.question_type {
        QuestionType::YesNo => String::from("Yes/No"),
        QuestionType::Select => {
            let options = select_options(question);
            if options.is_empty() {
                String::from("Enter your answer here...")
            } else {
                options.join("/")
            }
        }
        QuestionType::Textarea => String::from("Please provide detailed information..."),
        _ => String::from("Enter your answer here..."),
    }
}

/// One line per form entry; hidden conditional children render as nothing.
pub fn form_entry(entry: &FormEntry, answer: Option<&str>) -> Option<String> {
    let question = entry.question;
    let indent = if entry.conditional { "    " } else { "" };
    match entry.visibility {
        Visibility::Hidden => None,
        Visibility::Section => Some(format!("\n== {} ==", question.question_text)),
        Visibility::Shown if !entry.editable => Some(format!(
            "{}{:>3}. {} [locked]",
            indent, question.id, question.question_text
        )),
        Visibility::Shown => Some(format!(
            "{}{:>3}. {} ({}): {}",
            indent,
            question.id,
            question.question_text,
            input_hint(question),
            answer.unwrap_or("")
        )),
    }
}

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Faculty row: id, lock marker, text and pending schedule.
pub fn question_row(question: &Question) -> String {
    let lock = if question.is_locked { "locked" } else { "open" };
    let mut row = format!(
        "{:>3} [{:<6}] {} ({})",
        question.id,
        lock,
        question.question_text,
        question.question_type.as_str()
    );
    if let Some(at) = question.auto_unlock_at {
        row.push_str(&format!(" unlocks at {}", local(at)));
    }
    row
}

pub fn student_row(student: &StudentSummary) -> String {
    format!(
        "{} ({}) name: {} class: {}",
        student.id,
        student.username,
        student.name.as_deref().unwrap_or("-"),
        student.class_name.as_deref().unwrap_or("-")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answers, QuestionTag};
    use crate::visibility::tests::sample;
    use crate::visibility::Form;

    #[test]
    fn select_options_follow_tag() {
        let qs = sample();
        assert_eq!(select_options(&qs[1]), &["FY", "SY", "TY"]);
        assert_eq!(
            select_options(&qs[8]),
            &["Business", "Government Job", "Private Job"]
        );
        assert!(select_options(&qs[0]).is_empty());

        let mut gender = qs[1].clone();
        gender.question_text = "Sex".to_string();
        gender.tag = Some(QuestionTag::Gender);
        assert_eq!(input_hint(&gender), "Male/Female/Other");
    }

    #[test]
    fn hidden_children_render_nothing() {
        let qs = sample();
        let form = Form::new(&qs);
        let answers = Answers::new();
        let lines = form
            .layout(&answers)
            .iter()
            .filter_map(|e| form_entry(e, answers.get(&e.question.id).map(|s| s.as_str())))
            .collect::<Vec<_>>();
        assert!(lines.iter().all(|l| !l.contains("If yes, name of course")));
        assert!(lines.iter().any(|l| l.contains("== Do you know the following ==")));
    }

    #[test]
    fn locked_questions_have_no_input() {
        let mut qs = sample();
        qs[0].is_locked = true;
        let form = Form::new(&qs);
        let entries = form.layout(&Answers::new());
        let line = form_entry(&entries[0], Some("Ann")).unwrap();
        assert!(line.ends_with("[locked]"));
        assert!(!line.contains("Ann"));
    }

    #[test]
    fn student_row_marks_missing_fields() {
        let row = student_row(&StudentSummary {
            id: 3,
            username: "student1".to_string(),
            name: None,
            class_name: Some("TY".to_string()),
        });
        assert_eq!(row, "3 (student1) name: - class: TY");
    }
}
