use crate::actions::{self, QuestionScope};
use crate::auth::{self, authorize};
use crate::db::Store;
use crate::error::AppError;
use crate::models::*;
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{get, post, web, HttpResponse};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use chrono::Utc;
use log::info;

/// Lifetime of issued bearer tokens.
#[derive(Copy, Clone)]
pub struct TokenTtl(pub chrono::Duration);

#[post("/login")]
async fn api_login(
    store: web::Data<Store>,
    ttl: web::Data<TokenTtl>,
    web::Json(req): web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    store.ensure_configured()?;
    let ttl = ttl.0;
    let resp = store
        .run(move |conn| auth::login(conn, &req, ttl, Utc::now()))
        .await?;
    Ok(HttpResponse::Ok().json(resp))
}

#[post("/logout")]
async fn api_logout(store: web::Data<Store>, bearer: Option<BearerAuth>) -> Result<HttpResponse, AppError> {
    store.ensure_configured()?;
    let token = bearer
        .map(|b| b.token().to_owned())
        .ok_or(AppError::MissingToken)?;
    store
        .run(move |conn| auth::revoke_session(conn, &token))
        .await?;
    Ok(HttpResponse::Ok().json(Message::new("Logged out")))
}

async fn list_for(store: &Store, bearer: Option<&BearerAuth>, role: Role) -> Result<HttpResponse, AppError> {
    authorize(store, bearer, role).await?;
    let questions = store
        .run(move |conn| actions::list_questions(conn, QuestionScope::from(role)))
        .await?;
    Ok(HttpResponse::Ok().json(questions))
}

#[get("/questions/student")]
async fn api_student_questions(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
) -> Result<HttpResponse, AppError> {
    list_for(&store, bearer.as_ref(), Role::Student).await
}

#[get("/questions/faculty")]
async fn api_faculty_questions(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
) -> Result<HttpResponse, AppError> {
    list_for(&store, bearer.as_ref(), Role::Faculty).await
}

#[post("/questions/toggle-lock")]
async fn api_toggle_lock(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
    web::Json(req): web::Json<QuestionIdRequest>,
) -> Result<HttpResponse, AppError> {
    let caller = authorize(&store, bearer.as_ref(), Role::Faculty).await?;
    let id = req.question_id;
    let is_locked = store.run(move |conn| actions::toggle_lock(conn, id)).await?;
    info!(
        "Question {} {} by user {}",
        id,
        if is_locked { "locked" } else { "unlocked" },
        caller.user_id
    );
    Ok(HttpResponse::Ok().json(LockResponse {
        message: String::from("Question lock status updated"),
        is_locked,
    }))
}

#[post("/questions/schedule-unlock")]
async fn api_schedule_unlock(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
    web::Json(req): web::Json<ScheduleRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(&store, bearer.as_ref(), Role::Faculty).await?;
    store
        .run(move |conn| actions::set_schedule(conn, req.question_id, req.unlock_date))
        .await?;
    Ok(HttpResponse::Ok().json(Message::new("Auto-unlock scheduled successfully")))
}

#[post("/questions/clear-schedule")]
async fn api_clear_schedule(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
    web::Json(req): web::Json<QuestionIdRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(&store, bearer.as_ref(), Role::Faculty).await?;
    store
        .run(move |conn| actions::clear_schedule(conn, req.question_id))
        .await?;
    Ok(HttpResponse::Ok().json(Message::new("Auto-unlock schedule cleared")))
}

#[post("/questions/check-auto-unlock")]
async fn api_check_auto_unlock(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
) -> Result<HttpResponse, AppError> {
    authorize(&store, bearer.as_ref(), Role::Faculty).await?;
    let report = store
        .run(|conn| actions::sweep_auto_unlock(conn, Utc::now()))
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Auto-unlock check completed",
        "unlocked_count": report.unlocked_count,
        "failed_count": report.failed_count,
    })))
}

#[post("/responses")]
async fn api_save_responses(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
    web::Json(req): web::Json<SaveRequest>,
) -> Result<HttpResponse, AppError> {
    let caller = authorize(&store, bearer.as_ref(), Role::Student).await?;
    if req.student_id != caller.user_id {
        return Err(AppError::Forbidden);
    }
    let report = store
        .run(move |conn| {
            Ok(actions::save_responses(
                conn,
                req.student_id,
                &req.responses,
                Utc::now(),
            ))
        })
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Responses saved successfully",
        "saved_count": report.saved_count,
        "failed_count": report.failed_count,
    })))
}

#[get("/responses/me")]
async fn api_my_responses(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
) -> Result<HttpResponse, AppError> {
    let caller = authorize(&store, bearer.as_ref(), Role::Student).await?;
    let answers = store
        .run(move |conn| actions::responses_of(conn, caller.user_id))
        .await?;
    Ok(HttpResponse::Ok().json(answers))
}

#[get("/responses/{student_id}")]
async fn api_student_responses(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    authorize(&store, bearer.as_ref(), Role::Faculty).await?;
    let student_id = path.into_inner();
    let answers = store
        .run(move |conn| actions::responses_of(conn, student_id))
        .await?;
    Ok(HttpResponse::Ok().json(answers))
}

#[get("/search")]
async fn api_search(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
    web::Query(query): web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    authorize(&store, bearer.as_ref(), Role::Faculty).await?;
    let q = query
        .q
        .ok_or_else(|| AppError::validation("Missing search query"))?;
    let students = store
        .run(move |conn| actions::search_students(conn, &q))
        .await?;
    Ok(HttpResponse::Ok().json(students))
}

#[get("/students/by-class")]
async fn api_students_by_class(
    store: web::Data<Store>,
    bearer: Option<BearerAuth>,
    web::Query(query): web::Query<ClassQuery>,
) -> Result<HttpResponse, AppError> {
    authorize(&store, bearer.as_ref(), Role::Faculty).await?;
    let class_name = query
        .class_name
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::validation("Missing class parameter"))?;
    let students = store
        .run(move |conn| actions::students_by_class(conn, &class_name))
        .await?;
    Ok(HttpResponse::Ok().json(students))
}

/// Extractor failures answer with the same `{"error": ...}` body as handlers.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(1024 * 1024)
            .error_handler(|e, _| AppError::validation(e.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|e, _| AppError::validation(e.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|e, _| AppError::validation(e.to_string()).into()),
    )
    .service(api());
}

/// `/responses/me` is registered before `/responses/{student_id}` so it is
/// not parsed as an id.
pub fn api() -> actix_web::Scope {
    web::scope("/api")
        .service(api_login)
        .service(api_logout)
        .service(api_student_questions)
        .service(api_faculty_questions)
        .service(api_toggle_lock)
        .service(api_schedule_unlock)
        .service(api_clear_schedule)
        .service(api_check_auto_unlock)
        .service(api_save_responses)
        .service(api_my_responses)
        .service(api_student_responses)
        .service(api_search)
        .service(api_students_by_class)
}

pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(3600)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    fn app_data(store: Store) -> (web::Data<Store>, web::Data<TokenTtl>) {
        (
            web::Data::new(store),
            web::Data::new(TokenTtl(chrono::Duration::hours(24))),
        )
    }

    #[actix_rt::test]
    async fn unconfigured_store_answers_503() {
        let (store, ttl) = app_data(Store::unconfigured());
        let app = test::init_service(App::new().app_data(store).app_data(ttl).configure(config)).await;
        let req = test::TestRequest::get()
            .uri("/api/questions/faculty")
            .insert_header((header::AUTHORIZATION, "Bearer abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let req = test::TestRequest::post()
            .uri("/api/login")
            .set_json(&LoginRequest::default())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_rt::test]
    async fn missing_bearer_is_401() {
        let (store, ttl) = app_data(Store::connect("postgres://nobody@127.0.0.1:1/none"));
        let app = test::init_service(App::new().app_data(store).app_data(ttl).configure(config)).await;
        for uri in &["/api/questions/student", "/api/search?q=ann", "/api/responses/3"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[actix_rt::test]
    async fn malformed_requests_get_json_errors() {
        let (store, ttl) = app_data(Store::unconfigured());
        let app = test::init_service(App::new().app_data(store).app_data(ttl).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/questions/toggle-lock")
            .insert_header((header::AUTHORIZATION, "Bearer abc"))
            .set_json(&serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("question_id"));

        let req = test::TestRequest::get()
            .uri("/api/responses/abc")
            .insert_header((header::AUTHORIZATION, "Bearer abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }

    #[actix_rt::test]
    async fn error_bodies_are_json() {
        let (store, ttl) = app_data(Store::unconfigured());
        let app = test::init_service(App::new().app_data(store).app_data(ttl).configure(config)).await;
        let req = test::TestRequest::post()
            .uri("/api/questions/check-auto-unlock")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body["error"],
            "Service unavailable - Database not configured"
        );
    }
}
