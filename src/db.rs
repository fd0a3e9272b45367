use crate::error::AppError;
use actix_web::web;
use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use std::time::Duration;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Handle to the backing database. A store without a pool still serves
/// requests, answering every one of them with `StoreUnavailable`.
#[derive(Clone)]
pub struct Store {
    pool: Option<DbPool>,
}

impl Store {
    /// Builds the pool without connecting so an unreachable database surfaces
    /// per request instead of at startup.
    pub fn connect(database_url: &str) -> Self {
        let cm = ConnectionManager::new(database_url);
        let pool = DbPool::builder()
            .min_idle(Some(0))
            .connection_timeout(Duration::from_secs(5))
            .build_unchecked(cm);
        Store { pool: Some(pool) }
    }

    pub fn unconfigured() -> Self {
        Store { pool: None }
    }

    pub fn is_configured(&self) -> bool {
        self.pool.is_some()
    }

    pub fn ensure_configured(&self) -> Result<(), AppError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(AppError::StoreUnavailable)
        }
    }

    /// Runs `f` with a pooled connection on the blocking thread pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone().ok_or(AppError::StoreUnavailable)?;
        web::block(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await?
    }
}
