use std::path::{Path, PathBuf};
use std::sync::Arc;

use le_core::{AnalyticsRecord, Fold, IngestLimits, LectureId};
use le_db::{Database, DbError};

use crate::auth::Authenticator;
use crate::response::AppError;

/// Shared handler state.
///
/// Holds no connection: every store call opens its own on the blocking pool,
/// so concurrent requests never serialize on an application lock.
#[derive(Clone)]
pub struct AppState {
    db_path: Arc<PathBuf>,
    limits: IngestLimits,
    authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    /// Creates the state, initializing the database schema at `db_path`.
    pub fn open(
        db_path: impl Into<PathBuf>,
        limits: IngestLimits,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self, DbError> {
        let db_path = db_path.into();
        Database::open(&db_path)?;
        Ok(Self {
            db_path: Arc::new(db_path),
            limits,
            authenticator,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub const fn limits(&self) -> &IngestLimits {
        &self.limits
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    /// Runs `f` against a fresh connection on the blocking pool.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Database) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        let path = Arc::clone(&self.db_path);
        let result = tokio::task::spawn_blocking(move || {
            let mut db = Database::open(&path)?;
            f(&mut db)
        })
        .await?;
        Ok(result?)
    }

    pub async fn fold(&self, lecture_id: LectureId, fold: Fold) -> Result<(), AppError> {
        self.with_db(move |db| db.fold(&lecture_id, &fold)).await
    }

    pub async fn read(&self, lecture_id: LectureId) -> Result<AnalyticsRecord, AppError> {
        self.with_db(move |db| db.read(&lecture_id)).await
    }

    pub async fn ensure(&self, lecture_id: LectureId) -> Result<AnalyticsRecord, AppError> {
        self.with_db(move |db| db.ensure(&lecture_id)).await
    }
}
