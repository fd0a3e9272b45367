use crate::error::AppError;
use crate::models::*;
use crate::schema::*;
use crate::unlock::LockStatus;
use crate::visibility::find_tagged;
use chrono::{DateTime, Utc};
use diesel::dsl::not;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::upsert::excluded;
use log::{error, warn};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Which slice of the questionnaire a caller may list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QuestionScope {
    /// Unlocked questions only.
    Student,
    All,
}

impl From<Role> for QuestionScope {
    fn from(role: Role) -> Self {
        match role {
            Role::Student => QuestionScope::Student,
            Role::Faculty => QuestionScope::All,
        }
    }
}

pub fn list_questions(conn: &mut PgConnection, scope: QuestionScope) -> Result<Vec<Question>, AppError> {
    let mut query = questions::table
        .select(QuestionRow::as_select())
        .order((questions::order_index.asc(), questions::id.asc()))
        .into_boxed();
    if scope == QuestionScope::Student {
        query = query.filter(questions::is_locked.eq(false));
    }
    let mut questions = query
        .load::<QuestionRow>(conn)?
        .into_iter()
        .map(Question::from)
        .collect::<Vec<_>>();
    // NULL order indexes sort last in SQL but count as 0 on the form.
    questions.sort_by_key(|q| q.order_index.unwrap_or(0));
    Ok(questions)
}

/// Flips the lock flag in place and returns the new value.
pub fn toggle_lock(conn: &mut PgConnection, id: i32) -> Result<bool, AppError> {
    diesel::update(questions::table.find(id))
        .set(questions::is_locked.eq(not(questions::is_locked)))
        .returning(questions::is_locked)
        .get_result(conn)
        .map_err(AppError::db("Question"))
}

pub fn set_schedule(conn: &mut PgConnection, id: i32, at: DateTime<Utc>) -> Result<(), AppError> {
    let updated = diesel::update(questions::table.find(id))
        .set(questions::auto_unlock_at.eq(Some(at)))
        .execute(conn)?;
    if updated == 0 {
        return Err(AppError::NotFound("Question"));
    }
    Ok(())
}

pub fn clear_schedule(conn: &mut PgConnection, id: i32) -> Result<(), AppError> {
    let updated = diesel::update(questions::table.find(id))
        .set(questions::auto_unlock_at.eq(None::<DateTime<Utc>>))
        .execute(conn)?;
    if updated == 0 {
        return Err(AppError::NotFound("Question"));
    }
    Ok(())
}

/// Unlocks every locked question whose schedule has elapsed, one row at a
/// time. A failed row is logged and counted; the rest still go through.
/// Rows already unlocked by a concurrent sweep are skipped.
pub fn sweep_auto_unlock(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
    let candidates = questions::table
        .filter(questions::is_locked.eq(true))
        .filter(questions::auto_unlock_at.le(now))
        .select(QuestionRow::as_select())
        .load::<QuestionRow>(conn)?;
    let mut report = SweepReport::default();
    for question in candidates.into_iter().map(Question::from) {
        let next = match LockStatus::of(&question).swept(now) {
            Some(next) => next,
            None => continue,
        };
        let result = conn.transaction(|conn| {
            diesel::update(
                questions::table
                    .find(question.id)
                    .filter(questions::is_locked.eq(true)),
            )
            .set((
                questions::is_locked.eq(next.locked),
                questions::auto_unlock_at.eq(next.unlock_at),
            ))
            .execute(conn)
        });
        match result {
            Ok(0) => {}
            Ok(_) => report.unlocked_count += 1,
            Err(e) => {
                error!("Error auto-unlocking question {}: {}", question.id, e);
                report.failed_count += 1;
            }
        }
    }
    Ok(report)
}

pub fn upsert_response(
    conn: &mut PgConnection,
    student_id: i32,
    question_id: i32,
    answer: &str,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    diesel::insert_into(student_responses::table)
        .values(&NewResponse {
            student_id,
            question_id,
            response: answer,
            updated_at: now,
        })
        .on_conflict((student_responses::student_id, student_responses::question_id))
        .do_update()
        .set((
            student_responses::response.eq(excluded(student_responses::response)),
            student_responses::updated_at.eq(excluded(student_responses::updated_at)),
        ))
        .execute(conn)
}

/// Splits submitted answers into numeric question ids and a count of keys
/// that are not ids.
pub fn plan_responses(responses: &BTreeMap<String, String>) -> (Vec<(i32, &str)>, usize) {
    let mut planned = Vec::with_capacity(responses.len());
    let mut invalid = 0;
    for (key, answer) in responses {
        match key.trim().parse::<i32>() {
            Ok(id) => planned.push((id, answer.as_str())),
            Err(_) => {
                warn!("Skipping response for invalid question id {:?}", key);
                invalid += 1;
            }
        }
    }
    (planned, invalid)
}

/// Upserts each answer in its own transaction. Nothing is rolled back when
/// one fails.
pub fn save_responses(
    conn: &mut PgConnection,
    student_id: i32,
    responses: &BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> SaveReport {
    let (planned, invalid) = plan_responses(responses);
    let mut report = SaveReport {
        saved_count: 0,
        failed_count: invalid,
    };
    for (question_id, answer) in planned {
        let result = conn.transaction(|conn| upsert_response(conn, student_id, question_id, answer, now));
        match result {
            Ok(_) => report.saved_count += 1,
            Err(e) => {
                error!(
                    "Error saving response of student {} for question {}: {}",
                    student_id, question_id, e
                );
                report.failed_count += 1;
            }
        }
    }
    report
}

/// All non-empty answers of one student.
pub fn responses_of(conn: &mut PgConnection, student_id: i32) -> Result<Answers, AppError> {
    Ok(student_responses::table
        .filter(student_responses::student_id.eq(student_id))
        .select((student_responses::question_id, student_responses::response))
        .load::<(i32, String)>(conn)?
        .into_iter()
        .filter(|(_, answer)| !answer.is_empty())
        .collect())
}

/// Escapes LIKE wildcards and wraps the query for substring matching.
pub fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Union of id lists, first occurrence wins.
pub fn merge_matches<I>(lists: I) -> Vec<i32>
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = i32>,
{
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Question ids of the Name and Class questions.
#[derive(Copy, Clone, Debug, Default)]
pub struct ProfileQuestions {
    pub name: Option<i32>,
    pub class: Option<i32>,
}

impl ProfileQuestions {
    pub fn resolve(questions: &[Question]) -> Self {
        ProfileQuestions {
            name: find_tagged(questions, QuestionTag::Name).map(|q| q.id),
            class: find_tagged(questions, QuestionTag::Class).map(|q| q.id),
        }
    }

    pub fn load(conn: &mut PgConnection) -> Result<Self, AppError> {
        Ok(Self::resolve(&list_questions(conn, QuestionScope::All)?))
    }

    fn ids(&self) -> Vec<i32> {
        self.name.iter().chain(self.class.iter()).copied().collect()
    }
}

/// Builds summaries in the order of `ids`, dropping ids with no student row.
pub fn enrich(
    ids: &[i32],
    students: &[(i32, String)],
    answers: &[(i32, i32, String)],
    profile: ProfileQuestions,
) -> Vec<StudentSummary> {
    let usernames = students.iter().cloned().collect::<HashMap<_, _>>();
    let lookup = answers
        .iter()
        .map(|(student, question, answer)| ((*student, *question), answer.clone()))
        .collect::<HashMap<_, _>>();
    let answer_of = |student: i32, question: Option<i32>| {
        question.and_then(|q| lookup.get(&(student, q)).cloned())
    };
    ids.iter()
        .filter_map(|id| {
            usernames.get(id).map(|username| StudentSummary {
                id: *id,
                username: username.clone(),
                name: answer_of(*id, profile.name),
                class_name: answer_of(*id, profile.class),
            })
        })
        .collect()
}

fn summaries(
    conn: &mut PgConnection,
    ids: &[i32],
    profile: ProfileQuestions,
) -> Result<Vec<StudentSummary>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let students = users::table
        .filter(users::id.eq_any(ids.to_vec()))
        .filter(users::role.eq(Role::Student.as_str()))
        .select((users::id, users::username))
        .load::<(i32, String)>(conn)?;
    let answers = student_responses::table
        .filter(student_responses::student_id.eq_any(ids.to_vec()))
        .filter(student_responses::question_id.eq_any(profile.ids()))
        .select((
            student_responses::student_id,
            student_responses::question_id,
            student_responses::response,
        ))
        .load::<(i32, i32, String)>(conn)?;
    Ok(enrich(ids, &students, &answers, profile))
}

/// Students whose username or Name answer contains `query`, case-insensitively.
pub fn search_students(conn: &mut PgConnection, query: &str) -> Result<Vec<StudentSummary>, AppError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::validation("Missing search query"));
    }
    let pattern = like_pattern(query);
    let profile = ProfileQuestions::load(conn)?;
    let by_username = users::table
        .filter(users::role.eq(Role::Student.as_str()))
        .filter(users::username.ilike(pattern.as_str()))
        .order(users::id.asc())
        .select(users::id)
        .load::<i32>(conn)?;
    let by_name = match profile.name {
        Some(name_question) => student_responses::table
            .filter(student_responses::question_id.eq(name_question))
            .filter(student_responses::response.ilike(pattern.as_str()))
            .order(student_responses::student_id.asc())
            .select(student_responses::student_id)
            .load::<i32>(conn)?,
        None => {
            warn!("No Name question found, searching usernames only");
            Vec::new()
        }
    };
    let ids = merge_matches(vec![by_username, by_name]);
    summaries(conn, &ids, profile)
}

/// Students whose Class answer is exactly `class_name`.
pub fn students_by_class(conn: &mut PgConnection, class_name: &str) -> Result<Vec<StudentSummary>, AppError> {
    let profile = ProfileQuestions::load(conn)?;
    let class_question = profile.class.ok_or(AppError::NotFound("Class question"))?;
    let ids = student_responses::table
        .filter(student_responses::question_id.eq(class_question))
        .filter(student_responses::response.eq(class_name))
        .order(student_responses::student_id.asc())
        .select(student_responses::student_id)
        .load::<i32>(conn)?;
    summaries(conn, &ids, profile)
}

/// Account creation form used by the admin tool and the seed data.
#[derive(Clone, Debug, Default)]
pub struct NewUserForm {
    pub username: String,
    pub role: Option<Role>,
    pub password: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub student_number: Option<String>,
    pub department: Option<String>,
    pub teacher_id: Option<String>,
}

pub fn create_user(conn: &mut PgConnection, form: &NewUserForm) -> Result<i32, AppError> {
    if form.username.trim().is_empty() {
        return Err(AppError::validation("Username is required"));
    }
    let role = form.role.ok_or_else(|| AppError::validation("Role is required"))?;
    if form.password.is_none() && form.provider_id.is_none() {
        return Err(AppError::validation(
            "Either a password or a federated identity is required",
        ));
    }
    let password_hash = form
        .password
        .as_deref()
        .map(crate::auth::hash_password)
        .transpose()?;
    Ok(diesel::insert_into(users::table)
        .values(&NewUser {
            username: form.username.trim(),
            password_hash: password_hash.as_deref(),
            role: role.as_str(),
            email: form.email.as_deref(),
            name: form.name.as_deref(),
            student_number: form.student_number.as_deref(),
            department: form.department.as_deref(),
            teacher_id: form.teacher_id.as_deref(),
            provider: form.provider.as_deref(),
            provider_id: form.provider_id.as_deref(),
        })
        .returning(users::id)
        .get_result(conn)?)
}

pub fn user_exists(conn: &mut PgConnection, username: &str, role: Role) -> Result<bool, AppError> {
    Ok(diesel::select(diesel::dsl::exists(
        users::table
            .filter(users::username.eq(username))
            .filter(users::role.eq(role.as_str())),
    ))
    .get_result(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::tests::sample;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ann"), "%ann%");
        assert_eq!(like_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
    }

    #[test]
    fn merge_dedupes_students_matched_twice() {
        let ids = merge_matches(vec![vec![3, 1], vec![1, 5, 3, 5]]);
        assert_eq!(ids, vec![3, 1, 5]);
    }

    #[test]
    fn profile_questions_resolve_by_text_fallback() {
        let profile = ProfileQuestions::resolve(&sample());
        assert_eq!(profile.name, Some(1));
        assert_eq!(profile.class, Some(2));
    }

    #[test]
    fn enrich_attaches_name_and_class() {
        let profile = ProfileQuestions {
            name: Some(1),
            class: Some(2),
        };
        let students = vec![(4, "student1".to_string()), (9, "anna".to_string())];
        let answers = vec![
            (4, 1, "Student One".to_string()),
            (4, 2, "SY".to_string()),
            (9, 2, "FY".to_string()),
            (9, 3, "Yes".to_string()),
        ];
        let out = enrich(&[9, 4, 12], &students, &answers, profile);
        assert_eq!(
            out,
            vec![
                StudentSummary {
                    id: 9,
                    username: "anna".to_string(),
                    name: None,
                    class_name: Some("FY".to_string()),
                },
                StudentSummary {
                    id: 4,
                    username: "student1".to_string(),
                    name: Some("Student One".to_string()),
                    class_name: Some("SY".to_string()),
                },
            ]
        );
    }

    #[test]
    fn planning_counts_non_numeric_keys_as_failures() {
        let responses = vec![
            (" 3".to_string(), "Yes".to_string()),
            ("12".to_string(), "Data Structures".to_string()),
            ("abc".to_string(), "x".to_string()),
            ("".to_string(), "y".to_string()),
        ]
        .into_iter()
        .collect::<BTreeMap<_, _>>();
        let (planned, invalid) = plan_responses(&responses);
        assert_eq!(invalid, 2);
        let mut planned = planned;
        planned.sort();
        assert_eq!(planned, vec![(3, "Yes"), (12, "Data Structures")]);
    }

    #[test]
    fn faculty_scope_sees_everything() {
        assert_eq!(QuestionScope::from(Role::Faculty), QuestionScope::All);
        assert_eq!(QuestionScope::from(Role::Student), QuestionScope::Student);
    }

    mod db {
        use super::super::*;
        use crate::db::test_db::with_db;
        use chrono::Duration;

        pub fn add_student(conn: &mut PgConnection, username: &str) -> Result<i32, AppError> {
            Ok(diesel::insert_into(users::table)
                .values(&NewUser {
                    username,
                    password_hash: None,
                    role: Role::Student.as_str(),
                    email: None,
                    name: None,
                    student_number: None,
                    department: None,
                    teacher_id: None,
                    provider: None,
                    provider_id: None,
                })
                .returning(users::id)
                .get_result(conn)?)
        }

        pub fn add_question(
            conn: &mut PgConnection,
            text: &str,
            tag: Option<QuestionTag>,
            locked: bool,
        ) -> Result<i32, AppError> {
            Ok(diesel::insert_into(questions::table)
                .values(&NewQuestion {
                    question_text: text,
                    question_type: QuestionType::Text.as_str(),
                    tag: tag.map(QuestionTag::as_str),
                    parent_question_id: None,
                    is_locked: locked,
                    order_index: None,
                })
                .returning(questions::id)
                .get_result(conn)?)
        }

        fn stored(conn: &mut PgConnection, student: i32) -> Result<Vec<(i32, String)>, AppError> {
            Ok(student_responses::table
                .filter(student_responses::student_id.eq(student))
                .order(student_responses::question_id.asc())
                .select((student_responses::question_id, student_responses::response))
                .load(conn)?)
        }

        fn answers_for(pairs: &[(i32, &str)]) -> BTreeMap<String, String> {
            pairs
                .iter()
                .map(|(id, answer)| (id.to_string(), answer.to_string()))
                .collect()
        }

        #[test]
        fn saving_twice_changes_nothing() {
            with_db(|conn| {
                let student = add_student(conn, "anna")?;
                let a = add_question(conn, "Enrolled for NPTEL?", None, false)?;
                let b = add_question(conn, "If yes, name of the course", None, false)?;
                let answers = answers_for(&[(a, "Yes"), (b, "Data Structures")]);
                let now = Utc::now();

                let first = save_responses(conn, student, &answers, now);
                let after_first = stored(conn, student)?;
                let second = save_responses(conn, student, &answers, now + Duration::minutes(1));
                assert_eq!(first, second);
                assert_eq!(first.saved_count, 2);
                assert_eq!(stored(conn, student)?, after_first);
                assert_eq!(after_first.len(), 2);
                Ok(())
            });
        }

        #[test]
        fn one_failed_answer_does_not_stop_the_rest() {
            with_db(|conn| {
                let student = add_student(conn, "anna")?;
                let a = add_question(conn, "Name", Some(QuestionTag::Name), false)?;
                let b = add_question(conn, "Gender", Some(QuestionTag::Gender), false)?;
                let mut answers = answers_for(&[(a, "Anna"), (b, "Female"), (a + b + 1000, "ghost")]);
                answers.insert("abc".to_string(), "junk".to_string());

                let report = save_responses(conn, student, &answers, Utc::now());
                assert_eq!(
                    report,
                    SaveReport {
                        saved_count: 2,
                        failed_count: 2,
                    }
                );
                let saved = responses_of(conn, student)?;
                assert_eq!(saved.get(&a).map(|s| s.as_str()), Some("Anna"));
                assert_eq!(saved.get(&b).map(|s| s.as_str()), Some("Female"));
                assert_eq!(saved.len(), 2);
                Ok(())
            });
        }

        #[test]
        fn sweep_only_unlocks_locked_and_elapsed() {
            with_db(|conn| {
                let now = Utc::now();
                let past = now - Duration::minutes(5);
                let future = now + Duration::hours(1);
                let due = add_question(conn, "Due", None, true)?;
                let later = add_question(conn, "Later", None, true)?;
                let open = add_question(conn, "Open", None, false)?;
                let held = add_question(conn, "Held", None, true)?;
                set_schedule(conn, due, past)?;
                set_schedule(conn, later, future)?;
                set_schedule(conn, open, past)?;

                let report = sweep_auto_unlock(conn, now)?;
                assert_eq!(
                    report,
                    SweepReport {
                        unlocked_count: 1,
                        failed_count: 0,
                    }
                );
                let state = list_questions(conn, QuestionScope::All)?
                    .into_iter()
                    .map(|q| (q.id, (q.is_locked, q.auto_unlock_at.is_some())))
                    .collect::<HashMap<_, _>>();
                assert_eq!(state[&due], (false, false));
                assert_eq!(state[&later], (true, true));
                assert_eq!(state[&open], (false, true));
                assert_eq!(state[&held], (true, false));

                assert_eq!(sweep_auto_unlock(conn, now)?, SweepReport::default());
                Ok(())
            });
        }

        #[test]
        fn search_lists_a_double_match_once() {
            with_db(|conn| {
                let name = add_question(conn, "Name", Some(QuestionTag::Name), false)?;
                let class = add_question(conn, "Class", Some(QuestionTag::Class), false)?;
                let anna = add_student(conn, "anna")?;
                let bob = add_student(conn, "bob")?;
                let now = Utc::now();
                save_responses(conn, anna, &answers_for(&[(name, "Anna Smith"), (class, "SY")]), now);
                save_responses(conn, bob, &answers_for(&[(name, "Bob"), (class, "FY")]), now);

                let found = search_students(conn, "ANNA")?;
                assert_eq!(
                    found,
                    vec![StudentSummary {
                        id: anna,
                        username: "anna".to_string(),
                        name: Some("Anna Smith".to_string()),
                        class_name: Some("SY".to_string()),
                    }]
                );
                let fy = students_by_class(conn, "FY")?;
                assert_eq!(fy.iter().map(|s| s.id).collect::<Vec<_>>(), vec![bob]);
                Ok(())
            });
        }
    }
}
