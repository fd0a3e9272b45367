use crate::schema::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Answers of one student, keyed by question id.
pub type Answers = BTreeMap<i32, String>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Text,
    Textarea,
    Select,
    YesNo,
    Header,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Text => "text",
            QuestionType::Textarea => "textarea",
            QuestionType::Select => "select",
            QuestionType::YesNo => "yesno",
            QuestionType::Header => "header",
        }
    }

    /// Unknown stored types render as a plain text box.
    pub fn from_db(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            log::warn!("Unknown question type {:?}, treating as text", s);
            QuestionType::Text
        })
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "text" => QuestionType::Text,
            "textarea" => QuestionType::Textarea,
            "select" => QuestionType::Select,
            "yesno" => QuestionType::YesNo,
            "header" => QuestionType::Header,
            _ => return Err(format!("invalid question type: {}", s)),
        })
    }
}

/// Stable semantic role of a question, assigned when the questionnaire is authored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionTag {
    Name,
    Class,
    Gender,
    Occupation,
    Advanced,
}

impl QuestionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionTag::Name => "name",
            QuestionTag::Class => "class",
            QuestionTag::Gender => "gender",
            QuestionTag::Occupation => "occupation",
            QuestionTag::Advanced => "advanced",
        }
    }

    /// Choices offered by select questions carrying this tag.
    pub fn options(self) -> &'static [&'static str] {
        match self {
            QuestionTag::Class => &["FY", "SY", "TY"],
            QuestionTag::Gender => &["Male", "Female", "Other"],
            QuestionTag::Occupation => &["Business", "Government Job", "Private Job"],
            _ => &[],
        }
    }
}

impl FromStr for QuestionTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "name" => QuestionTag::Name,
            "class" => QuestionTag::Class,
            "gender" => QuestionTag::Gender,
            "occupation" => QuestionTag::Occupation,
            "advanced" => QuestionTag::Advanced,
            _ => return Err(format!("invalid question tag: {}", s)),
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            _ => Err(String::from("Invalid role. Must be student or faculty")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = questions)]
pub struct QuestionRow {
    pub id: i32,
    pub question_text: String,
    pub question_type: String,
    pub tag: Option<String>,
    pub parent_question_id: Option<i32>,
    pub is_locked: bool,
    pub order_index: Option<i32>,
    pub auto_unlock_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i32,
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub tag: Option<QuestionTag>,
    #[serde(default)]
    pub parent_question_id: Option<i32>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub order_index: Option<i32>,
    #[serde(default)]
    pub auto_unlock_at: Option<DateTime<Utc>>,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        let tag = row.tag.as_deref().and_then(|tag| match tag.parse() {
            Ok(tag) => Some(tag),
            Err(e) => {
                log::warn!("Question {}: {}", row.id, e);
                None
            }
        });
        Question {
            id: row.id,
            question_type: QuestionType::from_db(&row.question_type),
            question_text: row.question_text,
            tag,
            parent_question_id: row.parent_question_id,
            is_locked: row.is_locked,
            order_index: row.order_index,
            auto_unlock_at: row.auto_unlock_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = questions)]
pub struct NewQuestion<'a> {
    pub question_text: &'a str,
    pub question_type: &'a str,
    pub tag: Option<&'a str>,
    pub parent_question_id: Option<i32>,
    pub is_locked: bool,
    pub order_index: Option<i32>,
}

#[derive(Insertable)]
#[diesel(table_name = student_responses)]
pub struct NewResponse<'a> {
    pub student_id: i32,
    pub question_id: i32,
    pub response: &'a str,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: Option<String>,
    pub role: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub student_number: Option<String>,
    pub department: Option<String>,
    pub teacher_id: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
}

impl User {
    /// Federated accounts must finish their role-specific profile before signing in.
    pub fn profile_complete(&self) -> bool {
        match self.role.parse() {
            Ok(Role::Student) => self.student_number.is_some(),
            Ok(Role::Faculty) => self.department.is_some() && self.teacher_id.is_some(),
            Err(_) => false,
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            role: self.role.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            student_number: self.student_number.clone(),
            department: self.department.clone(),
            teacher_id: self.teacher_id.clone(),
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: Option<&'a str>,
    pub role: &'a str,
    pub email: Option<&'a str>,
    pub name: Option<&'a str>,
    pub student_number: Option<&'a str>,
    pub department: Option<&'a str>,
    pub teacher_id: Option<&'a str>,
    pub provider: Option<&'a str>,
    pub provider_id: Option<&'a str>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = sessions)]
pub struct Session {
    pub user_id: i32,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub token_hash: &'a [u8],
    pub user_id: i32,
    pub role: &'a str,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub role: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub student_number: Option<String>,
    pub department: Option<String>,
    pub teacher_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionIdRequest {
    pub question_id: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub question_id: i32,
    pub unlock_date: DateTime<Utc>,
}

/// Bulk answer submission. Keys are question ids as sent over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub student_id: i32,
    pub responses: BTreeMap<String, String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    pub saved_count: usize,
    pub failed_count: usize,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub unlocked_count: usize,
    pub failed_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockResponse {
    pub message: String,
    pub is_locked: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new<T: Into<String>>(message: T) -> Self {
        Message {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub id: i32,
    pub username: String,
    pub name: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct ClassQuery {
    #[serde(rename = "class")]
    pub class_name: Option<String>,
}
