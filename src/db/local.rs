//! SQLite-backed system of record for offline or single-host use.

use crate::backend::{
    AttendanceBackend, BreakRequest, ClockInRequest, ClockOutRequest, StoreDirectory,
};
use crate::db::initialize::init_db;
use crate::db::log::ttlog;
use crate::db::pool::DbPool;
use crate::db::queries;
use crate::errors::{AppError, AppResult, AttendanceError, AttendanceResult};
use crate::models::{AttendanceSession, Store};
use rusqlite::{Connection, ErrorCode};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

fn db_err(e: rusqlite::Error) -> AttendanceError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => {
            AttendanceError::Conflict(format!("rejected by the attendance store: {e}"))
        }
        _ => AttendanceError::Transport(format!("attendance store failure: {e}")),
    }
}

fn app_err(e: AppError) -> AttendanceError {
    match e {
        AppError::Db(inner) => db_err(inner),
        AppError::Attendance(inner) => inner,
        other => AttendanceError::Transport(other.to_string()),
    }
}

pub struct LocalBackend {
    pool: Mutex<DbPool>,
    tenant_id: String,
}

impl LocalBackend {
    /// Wrap an open database, applying pending migrations.
    pub fn new(pool: DbPool, tenant_id: impl Into<String>) -> AppResult<Self> {
        init_db(&pool.conn)?;
        Ok(Self {
            pool: Mutex::new(pool),
            tenant_id: tenant_id.into(),
        })
    }

    pub fn open(path: &str, tenant_id: impl Into<String>) -> AppResult<Self> {
        Self::new(DbPool::new(path)?, tenant_id)
    }

    pub fn in_memory(tenant_id: impl Into<String>) -> AppResult<Self> {
        Self::new(DbPool::in_memory()?, tenant_id)
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn lock(&self) -> MutexGuard<'_, DbPool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` inside a transaction; rolled back unless `f` succeeds.
    fn in_tx<T>(
        &self,
        f: impl FnOnce(&Connection) -> AttendanceResult<T>,
    ) -> AttendanceResult<T> {
        let mut pool = self.lock();
        let tx = pool.conn.transaction().map_err(db_err)?;
        let out = f(&tx)?;
        tx.commit().map_err(db_err)?;
        Ok(out)
    }

    // ---------------------------
    // Store management
    // ---------------------------

    pub fn add_store(&self, store: &Store) -> AppResult<()> {
        let pool = self.lock();
        queries::insert_store(&pool.conn, &self.tenant_id, store).map_err(|e| {
            match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => AppError::Attendance(
                    AttendanceError::Conflict(format!("store '{}' already exists", store.id)),
                ),
                _ => AppError::Db(e),
            }
        })?;
        ttlog(&pool.conn, "store_add", &store.id, &store.name)?;
        Ok(())
    }

    pub fn remove_store(&self, store_id: &str) -> AppResult<bool> {
        let pool = self.lock();
        let removed = queries::delete_store(&pool.conn, &self.tenant_id, store_id)?;
        if removed {
            ttlog(&pool.conn, "store_remove", store_id, "Store removed")?;
        }
        Ok(removed)
    }

    pub fn stores(&self) -> AppResult<Vec<Store>> {
        let pool = self.lock();
        Ok(queries::load_stores(&pool.conn, &self.tenant_id)?)
    }

    pub fn recent_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> AppResult<Vec<AttendanceSession>> {
        let pool = self.lock();
        Ok(queries::recent_sessions(&pool.conn, user_id, limit)?)
    }

    // ---------------------------
    // Transitions
    // ---------------------------

    fn owned_session(
        conn: &Connection,
        session_id: Uuid,
        user_id: &str,
    ) -> AttendanceResult<AttendanceSession> {
        let session = queries::find_session(conn, session_id)
            .map_err(db_err)?
            .ok_or_else(|| AttendanceError::Validation(format!("unknown session {session_id}")))?;
        if session.user_id != user_id {
            return Err(AttendanceError::Validation(format!(
                "session {session_id} does not belong to '{user_id}'"
            )));
        }
        Ok(session)
    }

    fn reload(conn: &Connection, session_id: Uuid) -> AttendanceResult<AttendanceSession> {
        queries::find_session(conn, session_id)
            .map_err(db_err)?
            .ok_or_else(|| AttendanceError::Transport(format!("session {session_id} vanished")))
    }

    fn do_clock_in(&self, request: &ClockInRequest) -> AttendanceResult<AttendanceSession> {
        self.in_tx(|conn| {
            let open = queries::find_open_session(conn, &request.user_id).map_err(db_err)?;
            if let Some(open) = open {
                return Err(AttendanceError::Conflict(format!(
                    "'{}' already clocked in at {} (session {})",
                    request.user_id, open.clock_in_at, open.id
                )));
            }
            if !queries::store_exists(conn, &self.tenant_id, &request.store_id).map_err(db_err)? {
                return Err(AttendanceError::Validation(format!(
                    "unknown store '{}'",
                    request.store_id
                )));
            }

            let session = AttendanceSession::open(
                Uuid::new_v4(),
                request.user_id.clone(),
                request.store_id.clone(),
                request.tracking_method,
                request.clock_in_at,
                request.geo_location.clone(),
            );
            queries::insert_session(
                conn,
                &session,
                request.evidence.as_ref(),
                &request.device_info,
            )
            .map_err(app_err)?;
            ttlog(
                conn,
                "clock_in",
                &session.id.to_string(),
                &format!(
                    "{} at {} via {}",
                    session.user_id, session.store_id, session.tracking_method
                ),
            )
            .map_err(app_err)?;

            info!(session = %session.id, user = %session.user_id, "clock-in recorded");
            Self::reload(conn, session.id)
        })
    }

    fn do_start_break(&self, request: &BreakRequest) -> AttendanceResult<AttendanceSession> {
        self.in_tx(|conn| {
            let mut session = Self::owned_session(conn, request.session_id, &request.user_id)?;
            session.begin_break(request.at)?;
            queries::insert_break(conn, session.id, request.at).map_err(db_err)?;
            ttlog(conn, "break_start", &session.id.to_string(), "Break started").map_err(app_err)?;
            debug!(session = %session.id, "break start recorded");
            Self::reload(conn, session.id)
        })
    }

    fn do_end_break(&self, request: &BreakRequest) -> AttendanceResult<AttendanceSession> {
        self.in_tx(|conn| {
            let mut session = Self::owned_session(conn, request.session_id, &request.user_id)?;
            session.finish_break(request.at)?;
            queries::close_open_break(conn, session.id, request.at).map_err(db_err)?;
            ttlog(conn, "break_end", &session.id.to_string(), "Break ended").map_err(app_err)?;
            debug!(session = %session.id, "break end recorded");
            Self::reload(conn, session.id)
        })
    }

    fn do_clock_out(&self, request: &ClockOutRequest) -> AttendanceResult<AttendanceSession> {
        self.in_tx(|conn| {
            let mut session = Self::owned_session(conn, request.session_id, &request.user_id)?;
            let auto_closed = session.close(request.at, request.close_open_break)?;
            if auto_closed {
                queries::close_open_break(conn, session.id, request.at).map_err(db_err)?;
            }
            if !queries::set_clock_out(conn, session.id, request.at).map_err(db_err)? {
                return Err(AttendanceError::Conflict(format!(
                    "session {} was closed concurrently",
                    session.id
                )));
            }

            let message = if auto_closed {
                "Clocked out (open break closed)"
            } else {
                "Clocked out"
            };
            ttlog(conn, "clock_out", &session.id.to_string(), message).map_err(app_err)?;
            info!(session = %session.id, auto_closed, "clock-out recorded");
            Self::reload(conn, session.id)
        })
    }
}

impl AttendanceBackend for LocalBackend {
    async fn open_session(&self, user_id: &str) -> AttendanceResult<Option<AttendanceSession>> {
        let pool = self.lock();
        queries::find_open_session(&pool.conn, user_id).map_err(db_err)
    }

    async fn clock_in(&self, request: &ClockInRequest) -> AttendanceResult<AttendanceSession> {
        self.do_clock_in(request)
    }

    async fn start_break(&self, request: &BreakRequest) -> AttendanceResult<AttendanceSession> {
        self.do_start_break(request)
    }

    async fn end_break(&self, request: &BreakRequest) -> AttendanceResult<AttendanceSession> {
        self.do_end_break(request)
    }

    async fn clock_out(&self, request: &ClockOutRequest) -> AttendanceResult<AttendanceSession> {
        self.do_clock_out(request)
    }
}

impl StoreDirectory for LocalBackend {
    async fn list_stores(&self, tenant_id: &str) -> AttendanceResult<Vec<Store>> {
        let pool = self.lock();
        queries::load_stores(&pool.conn, tenant_id).map_err(db_err)
    }
}
