//! Password checks, bearer sessions and role enforcement.
use crate::db::Store;
use crate::error::AppError;
use crate::models::*;
use crate::schema::*;
use actix_web_httpauth::extractors::bearer::BearerAuth;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use blake2::Blake2b512;
use chrono::{DateTime, Duration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use digest::Digest;
use log::{info, warn};
use rand::Rng;

pub const GOOGLE_PROVIDER: &str = "google";

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("unable to hash password: {}", e)))
}

/// A malformed stored hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Invalid password hash format: {}", e);
            false
        }
    }
}

pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

pub fn token_digest(token: &str) -> Vec<u8> {
    Blake2b512::digest(token.as_bytes()).to_vec()
}

/// How a login request wants to authenticate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Password {
        username: String,
        password: String,
        role: Role,
    },
    Federated {
        provider: String,
        provider_id: String,
        role: Role,
    },
}

impl Credentials {
    pub fn from_request(req: &LoginRequest) -> Result<Self, AppError> {
        let non_empty = |s: &Option<String>| s.as_ref().filter(|s| !s.is_empty()).cloned();
        if let (Some(provider), Some(provider_id)) = (non_empty(&req.provider), non_empty(&req.provider_id)) {
            if provider == GOOGLE_PROVIDER {
                let role = non_empty(&req.role)
                    .ok_or_else(|| AppError::validation("Role is required"))?
                    .parse()
                    .map_err(AppError::Validation)?;
                return Ok(Credentials::Federated {
                    provider,
                    provider_id,
                    role,
                });
            }
        }
        match (non_empty(&req.username), non_empty(&req.password), non_empty(&req.role)) {
            (Some(username), Some(password), Some(role)) => Ok(Credentials::Password {
                username,
                password,
                role: role.parse().map_err(AppError::Validation)?,
            }),
            _ => Err(AppError::validation(
                "Username, password, and role are required",
            )),
        }
    }
}

/// The authenticated user behind a bearer token.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i32,
    pub role: Role,
}

pub fn find_user(conn: &mut PgConnection, creds: &Credentials) -> Result<User, AppError> {
    match creds {
        Credentials::Password {
            username,
            password,
            role,
        } => {
            let user = users::table
                .filter(users::username.eq(username))
                .filter(users::role.eq(role.as_str()))
                .select(User::as_select())
                .first::<User>(conn)
                .optional()?
                .ok_or_else(|| {
                    AppError::InvalidCredentials(String::from("Invalid credentials or role mismatch"))
                })?;
            let hash = user.password_hash.as_deref().ok_or_else(|| {
                AppError::InvalidCredentials(String::from(
                    "This account uses Google authentication. Please sign in with Google.",
                ))
            })?;
            if !verify_password(password, hash) {
                return Err(AppError::InvalidCredentials(String::from("Invalid credentials")));
            }
            Ok(user)
        }
        Credentials::Federated {
            provider,
            provider_id,
            role,
        } => {
            let user = users::table
                .filter(users::provider.eq(provider))
                .filter(users::provider_id.eq(provider_id))
                .filter(users::role.eq(role.as_str()))
                .select(User::as_select())
                .first::<User>(conn)
                .optional()?
                .ok_or_else(|| {
                    AppError::InvalidCredentials(String::from(
                        "Google user not found. Please sign up first.",
                    ))
                })?;
            if !user.profile_complete() {
                return Err(AppError::ProfileIncomplete { user_id: user.id });
            }
            Ok(user)
        }
    }
}

/// Stores a new session and returns its token. Expired sessions of the same
/// user are dropped on the way.
pub fn issue_session(
    conn: &mut PgConnection,
    user_id: i32,
    role: Role,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    diesel::delete(
        sessions::table
            .filter(sessions::user_id.eq(user_id))
            .filter(sessions::expires_at.le(now)),
    )
    .execute(conn)?;
    let token = generate_token();
    let digest = token_digest(&token);
    diesel::insert_into(sessions::table)
        .values(&NewSession {
            token_hash: &digest,
            user_id,
            role: role.as_str(),
            expires_at: now + ttl,
        })
        .execute(conn)?;
    Ok(token)
}

pub fn login(
    conn: &mut PgConnection,
    req: &LoginRequest,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<LoginResponse, AppError> {
    let creds = Credentials::from_request(req)?;
    let user = find_user(conn, &creds)?;
    let role = user.role.parse::<Role>().map_err(AppError::Internal)?;
    let token = issue_session(conn, user.id, role, ttl, now)?;
    info!("User {} ({}) logged in", user.username, role);
    Ok(LoginResponse {
        token,
        message: format!("Welcome {}!", user.name.as_deref().unwrap_or(&user.username)),
        user: user.profile(),
    })
}

pub fn lookup_session(conn: &mut PgConnection, token: &str, now: DateTime<Utc>) -> Result<Caller, AppError> {
    let session = sessions::table
        .find(token_digest(token))
        .select(Session::as_select())
        .first::<Session>(conn)
        .optional()?
        .ok_or(AppError::InvalidToken)?;
    if session.expires_at <= now {
        return Err(AppError::InvalidToken);
    }
    Ok(Caller {
        user_id: session.user_id,
        role: session.role.parse().map_err(|_| AppError::InvalidToken)?,
    })
}

pub fn revoke_session(conn: &mut PgConnection, token: &str) -> Result<(), AppError> {
    diesel::delete(sessions::table.find(token_digest(token))).execute(conn)?;
    Ok(())
}

/// Drops every session past its expiry. Returns how many were removed.
pub fn purge_expired_sessions(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<usize, AppError> {
    Ok(diesel::delete(sessions::table.filter(sessions::expires_at.le(now))).execute(conn)?)
}

pub fn require_role(caller: Caller, role: Role) -> Result<Caller, AppError> {
    if caller.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(caller)
}

/// Resolves the bearer token and checks the caller holds `role`.
pub async fn authorize(store: &Store, bearer: Option<&BearerAuth>, role: Role) -> Result<Caller, AppError> {
    store.ensure_configured()?;
    let token = bearer
        .map(|b| b.token().to_owned())
        .ok_or(AppError::MissingToken)?;
    let caller = store
        .run(move |conn| lookup_session(conn, &token, Utc::now()))
        .await?;
    require_role(caller, role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db::with_db;
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;

    fn request(pairs: &[(&str, &str)]) -> LoginRequest {
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        };
        LoginRequest {
            username: get("username"),
            password: get("password"),
            role: get("role"),
            provider: get("provider"),
            provider_id: get("provider_id"),
        }
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("student123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("student123", &hash));
        assert!(!verify_password("student124", &hash));
        assert!(!verify_password("student123", "not-a-hash"));
    }

    #[test]
    fn tokens_are_random_and_digested() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(token_digest(&a), token_digest(&a));
        assert_ne!(token_digest(&a), token_digest(&b));
        assert_eq!(token_digest(&a).len(), 64);
    }

    #[test]
    fn password_login_requires_all_fields() {
        let err = Credentials::from_request(&request(&[("username", "student1"), ("role", "student")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Username, password, and role are required");
    }

    #[test]
    fn password_login_rejects_unknown_role() {
        let err = Credentials::from_request(&request(&[
            ("username", "student1"),
            ("password", "x"),
            ("role", "admin"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid role. Must be student or faculty");
    }

    #[test]
    fn google_identity_takes_precedence() {
        let creds = Credentials::from_request(&request(&[
            ("provider", "google"),
            ("provider_id", "1234"),
            ("role", "faculty"),
        ]))
        .unwrap();
        assert_eq!(
            creds,
            Credentials::Federated {
                provider: "google".to_string(),
                provider_id: "1234".to_string(),
                role: Role::Faculty,
            }
        );
    }

    #[test]
    fn unknown_provider_falls_back_to_password() {
        let creds = Credentials::from_request(&request(&[
            ("provider", "github"),
            ("provider_id", "1"),
            ("username", "faculty1"),
            ("password", "faculty123"),
            ("role", "faculty"),
        ]))
        .unwrap();
        assert!(matches!(creds, Credentials::Password { .. }));
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let caller = Caller {
            user_id: 4,
            role: Role::Student,
        };
        assert_eq!(require_role(caller, Role::Student).unwrap(), caller);
        let err = require_role(caller, Role::Faculty).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn expired_sessions_are_rejected_and_purged() {
        with_db(|conn| {
            let alice = create_account(conn, "alice")?;
            let bob = create_account(conn, "bob")?;
            let now = Utc::now();
            let live = issue_session(conn, alice, Role::Student, Duration::hours(1), now)?;
            let stale = issue_session(conn, alice, Role::Student, Duration::hours(1), now - Duration::days(2))?;
            let abandoned = issue_session(conn, bob, Role::Student, Duration::hours(1), now - Duration::days(3))?;

            assert_eq!(
                lookup_session(conn, &live, now)?,
                Caller {
                    user_id: alice,
                    role: Role::Student,
                }
            );
            let err = lookup_session(conn, &stale, now).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            assert!(lookup_session(conn, "not-a-token", now).is_err());

            assert_eq!(purge_expired_sessions(conn, now)?, 2);
            assert!(lookup_session(conn, &abandoned, now - Duration::days(3)).is_err());
            assert!(lookup_session(conn, &live, now).is_ok());
            Ok(())
        });
    }

    fn create_account(conn: &mut PgConnection, username: &str) -> Result<i32, AppError> {
        crate::actions::create_user(
            conn,
            &crate::actions::NewUserForm {
                username: username.to_string(),
                role: Some(Role::Student),
                provider: Some(GOOGLE_PROVIDER.to_string()),
                provider_id: Some(format!("id-{}", username)),
                student_number: Some("STU001".to_string()),
                ..Default::default()
            },
        )
    }
}
