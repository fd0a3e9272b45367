use crate::models::*;
use chrono::{DateTime, Utc};
use failure::Error;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckResult {
    pub message: String,
    pub unlocked_count: usize,
    #[serde(default)]
    pub failed_count: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SaveResult {
    pub message: String,
    #[serde(default)]
    pub saved_count: usize,
    #[serde(default)]
    pub failed_count: usize,
}

/// HTTP client for the `/api` surface. Holds the bearer token after login.
pub struct ApiClient {
    base: String,
    client: Client,
    token: Option<String>,
}

impl ApiClient {
    pub fn new<T: Into<String>>(base: T) -> Self {
        ApiClient {
            base: base.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            token: None,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base, path)
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let text = resp.text().await.unwrap_or_default();
        let msg = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(failure::format_err!("{} ({})", msg, status))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, Error> {
        let req = self.authed(self.client.get(&self.url(path)).query(query));
        Self::parse(req.send().await?).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, Error> {
        let req = self.authed(self.client.post(&self.url(path)).json(body));
        Self::parse(req.send().await?).await
    }

    pub async fn login(&mut self, req: &LoginRequest) -> Result<LoginResponse, Error> {
        let resp: LoginResponse = self.post("/login", req).await?;
        self.token = Some(resp.token.clone());
        Ok(resp)
    }

    pub async fn logout(&mut self) -> Result<(), Error> {
        let _: Message = self.post("/logout", &json!({})).await?;
        self.token = None;
        Ok(())
    }

    pub async fn questions(&self, role: Role) -> Result<Vec<Question>, Error> {
        let path = match role {
            Role::Student => "/questions/student",
            Role::Faculty => "/questions/faculty",
        };
        self.get(path, &[]).await
    }

    pub async fn toggle_lock(&self, question_id: i32) -> Result<LockResponse, Error> {
        self.post("/questions/toggle-lock", &QuestionIdRequest { question_id })
            .await
    }

    pub async fn schedule_unlock(&self, question_id: i32, unlock_date: DateTime<Utc>) -> Result<Message, Error> {
        self.post(
            "/questions/schedule-unlock",
            &ScheduleRequest {
                question_id,
                unlock_date,
            },
        )
        .await
    }

    pub async fn clear_schedule(&self, question_id: i32) -> Result<Message, Error> {
        self.post("/questions/clear-schedule", &QuestionIdRequest { question_id })
            .await
    }

    pub async fn check_auto_unlock(&self) -> Result<CheckResult, Error> {
        self.post("/questions/check-auto-unlock", &json!({})).await
    }

    pub async fn save_responses(&self, req: &SaveRequest) -> Result<SaveResult, Error> {
        self.post("/responses", req).await
    }

    pub async fn my_responses(&self) -> Result<Answers, Error> {
        self.get("/responses/me", &[]).await
    }

    pub async fn student_responses(&self, student_id: i32) -> Result<Answers, Error> {
        self.get(&format!("/responses/{}", student_id), &[]).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<StudentSummary>, Error> {
        self.get("/search", &[("q", query)]).await
    }

    pub async fn students_by_class(&self, class_name: &str) -> Result<Vec<StudentSummary>, Error> {
        self.get("/students/by-class", &[("class", class_name)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_api_path() {
        let client = ApiClient::new("http://127.0.0.1:5000/");
        assert_eq!(
            client.url("/questions/student"),
            "http://127.0.0.1:5000/api/questions/student"
        );
        assert!(!client.is_logged_in());
    }

    #[test]
    fn check_result_tolerates_missing_failed_count() {
        let res: CheckResult = serde_json::from_str(
            r#"{"message": "Auto-unlock check completed", "unlocked_count": 2}"#,
        )
        .unwrap();
        assert_eq!(res.unlocked_count, 2);
        assert_eq!(res.failed_count, 0);
    }
}
