//! Demo accounts and the fixed questionnaire.
use crate::actions::{self, NewUserForm};
use crate::error::AppError;
use crate::models::*;
use crate::schema::*;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::info;
use std::collections::HashMap;

pub struct SeedQuestion {
    pub text: &'static str,
    pub kind: QuestionType,
    pub tag: Option<QuestionTag>,
    /// Order number of the parent question.
    pub parent: Option<i32>,
    pub order: i32,
}

const fn q(text: &'static str, kind: QuestionType, order: i32) -> SeedQuestion {
    SeedQuestion {
        text,
        kind,
        tag: None,
        parent: None,
        order,
    }
}

const fn tagged(text: &'static str, kind: QuestionType, tag: QuestionTag, order: i32) -> SeedQuestion {
    SeedQuestion {
        text,
        kind,
        tag: Some(tag),
        parent: None,
        order,
    }
}

const fn child(text: &'static str, parent: i32, order: i32) -> SeedQuestion {
    SeedQuestion {
        text,
        kind: QuestionType::Text,
        tag: None,
        parent: Some(parent),
        order,
    }
}

use self::QuestionTag::{Advanced, Class, Gender, Name, Occupation};
use self::QuestionType::{Header, Select, Text, Textarea, YesNo};

pub const QUESTIONNAIRE: &[SeedQuestion] = &[
    tagged("Name", Text, Name, 1),
    tagged("Class", Select, Class, 2),
    tagged("Gender", Select, Gender, 3),
    q("Enrolled for DLLE?", YesNo, 4),
    q("Enrolled for NSS?", YesNo, 5),
    q("Enrolled for any NPTEL course?", YesNo, 6),
    child("If yes, name of the course", 6, 7),
    tagged("Enrolled in any certificate course at present?", YesNo, Advanced, 8),
    child("If yes, name of the certificate course", 8, 9),
    q("Grade in latest semester, in case of FY students, HSC percentage", Text, 10),
    tagged("Occupation of parents - Business/Government Job/Private Job", Select, Occupation, 11),
    child("In case of Job, name of the company or entity or department", 11, 12),
    q("Sports enthusiast?", YesNo, 13),
    child("If yes, name of the sport/s", 13, 14),
    q("Whether training or coaching for any sport?", YesNo, 15),
    q("Whether played for any sport at district, zonal, state, national level?", YesNo, 16),
    q("Ever been involved in cultural events like dancing, singing, drawing, painting, yoga, drama, etc", YesNo, 17),
    child("If yes, name of the activity", 17, 18),
    q("Whether training or coaching for any cultural event?", YesNo, 19),
    q("Whether performed at district, zonal, state, national level?", YesNo, 20),
    q("Ever been involved in literary events like PPT competition, Debate, Essay writing, Quiz, etc", YesNo, 21),
    child("If yes, name of the event", 21, 22),
    q("Do you know the following", Header, 23),
    tagged("Advance Excel", YesNo, Advanced, 24),
    tagged("MS Word", YesNo, Advanced, 25),
    tagged("Tally Prime", YesNo, Advanced, 26),
    tagged("PPT", YesNo, Advanced, 27),
    tagged("AI", YesNo, Advanced, 28),
    tagged("Programming", YesNo, Advanced, 29),
    tagged("Coding", YesNo, Advanced, 30),
    tagged("Participated in any Intra collegiate competition?", YesNo, Advanced, 31),
    child("If yes, name of the competition", 31, 32),
    tagged("Participated in Inter collegiate event?", YesNo, Advanced, 33),
    child("If yes, name of the college event and the competition", 33, 34),
    q("Address of Residence?", Textarea, 35),
    tagged("Are you working part time or full time or doing internship?", YesNo, Advanced, 36),
    child("If yes, name of the company or entity or firm", 36, 37),
    q("Any suggestions/recommendations for overall college development", Textarea, 38),
];

pub fn demo_users() -> Vec<NewUserForm> {
    vec![
        NewUserForm {
            username: String::from("student1"),
            role: Some(Role::Student),
            password: Some(String::from("student123")),
            email: Some(String::from("student1@example.com")),
            name: Some(String::from("Student One")),
            student_number: Some(String::from("STU001")),
            ..Default::default()
        },
        NewUserForm {
            username: String::from("faculty1"),
            role: Some(Role::Faculty),
            password: Some(String::from("faculty123")),
            email: Some(String::from("faculty1@example.com")),
            name: Some(String::from("Faculty One")),
            department: Some(String::from("Computer Science")),
            teacher_id: Some(String::from("TEA001")),
            ..Default::default()
        },
    ]
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users_created: usize,
    pub questions_created: usize,
}

/// Inserts the questionnaire in one transaction, linking each child to the
/// id its parent received.
pub fn insert_questionnaire(conn: &mut PgConnection) -> Result<usize, AppError> {
    conn.transaction::<_, AppError, _>(|conn| {
        let mut ids_by_order = HashMap::new();
        for question in QUESTIONNAIRE {
            let parent = match question.parent {
                Some(order) => Some(
                    *ids_by_order
                        .get(&order)
                        .ok_or_else(|| AppError::Internal(format!("parent {} not seeded", order)))?,
                ),
                None => None,
            };
            let id = diesel::insert_into(questions::table)
                .values(&NewQuestion {
                    question_text: question.text,
                    question_type: question.kind.as_str(),
                    tag: question.tag.map(QuestionTag::as_str),
                    parent_question_id: parent,
                    is_locked: false,
                    order_index: Some(question.order),
                })
                .returning(questions::id)
                .get_result::<i32>(conn)?;
            ids_by_order.insert(question.order, id);
        }
        Ok(QUESTIONNAIRE.len())
    })
}

/// Idempotent: existing users are kept and questions are only inserted into
/// an empty table.
pub fn seed(conn: &mut PgConnection) -> Result<SeedReport, AppError> {
    let mut report = SeedReport::default();
    for user in demo_users() {
        let role = user.role.unwrap_or(Role::Student);
        if !actions::user_exists(conn, &user.username, role)? {
            actions::create_user(conn, &user)?;
            info!("Created demo user: {}", user.username);
            report.users_created += 1;
        }
    }
    let count = questions::table.count().get_result::<i64>(conn)?;
    if count == 0 {
        report.questions_created = insert_questionnaire(conn)?;
        info!("Inserted {} questions", report.questions_created);
    } else {
        info!("Found {} existing questions in database", count);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn questionnaire_is_ordered_and_parents_precede_children() {
        let mut seen = HashSet::new();
        for (idx, question) in QUESTIONNAIRE.iter().enumerate() {
            assert_eq!(question.order, idx as i32 + 1);
            if let Some(parent) = question.parent {
                assert!(seen.contains(&parent), "{}", question.text);
                let parent = &QUESTIONNAIRE[parent as usize - 1];
                assert!(
                    matches!(parent.kind, YesNo | Select),
                    "{}",
                    question.text
                );
            }
            seen.insert(question.order);
        }
    }

    #[test]
    fn headers_have_no_parent() {
        assert!(QUESTIONNAIRE
            .iter()
            .filter(|q| q.kind == Header)
            .all(|q| q.parent.is_none()));
    }

    #[test]
    fn advanced_tags_match_fixed_texts() {
        let tagged = QUESTIONNAIRE
            .iter()
            .filter(|q| q.tag == Some(Advanced))
            .map(|q| q.text)
            .collect::<Vec<_>>();
        assert_eq!(tagged, crate::visibility::ADVANCED_QUESTIONS);
    }

    #[test]
    fn demo_accounts_have_complete_profiles() {
        let users = demo_users();
        assert_eq!(users.len(), 2);
        assert!(users[0].student_number.is_some());
        assert!(users[1].department.is_some() && users[1].teacher_id.is_some());
    }
}
