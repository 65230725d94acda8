use crate::errors::{AppError, AppResult};
use crate::models::{
    AttendanceSession, BreakInterval, Coordinates, DeviceInfo, Evidence, GeoSnapshot, Store,
    TrackingMethod,
};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result, Row, params};
use uuid::Uuid;

/// Fixed-width RFC 3339, so stored instants also sort as text.
pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_err(col: usize, err: AppError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(err))
}

fn parse_ts(col: usize, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| conversion_err(col, AppError::InvalidDate(raw.to_string())))
}

// ---------------------------
// Stores
// ---------------------------

pub fn insert_store(conn: &Connection, tenant_id: &str, store: &Store) -> Result<()> {
    conn.execute(
        "INSERT INTO stores (id, tenant_id, name, address, latitude, longitude, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            store.id,
            tenant_id,
            store.name,
            store.address,
            store.coordinates.latitude,
            store.coordinates.longitude,
            Local::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn delete_store(conn: &Connection, tenant_id: &str, store_id: &str) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM stores WHERE tenant_id = ?1 AND id = ?2",
        params![tenant_id, store_id],
    )?;
    Ok(n > 0)
}

fn map_store(row: &Row) -> Result<Store> {
    Ok(Store {
        id: row.get("id")?,
        name: row.get("name")?,
        address: row.get("address")?,
        coordinates: Coordinates {
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
        },
    })
}

pub fn load_stores(conn: &Connection, tenant_id: &str) -> Result<Vec<Store>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, address, latitude, longitude FROM stores
         WHERE tenant_id = ?1
         ORDER BY name ASC, id ASC",
    )?;
    let rows = stmt.query_map([tenant_id], map_store)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn store_exists(conn: &Connection, tenant_id: &str, store_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM stores WHERE tenant_id = ?1 AND id = ?2",
        params![tenant_id, store_id],
        |_| Ok(()),
    )
    .optional()
    .map(|r| r.is_some())
}

// ---------------------------
// Sessions
// ---------------------------

const SESSION_COLUMNS: &str = "id, user_id, store_id, tracking_method, clock_in_at, clock_out_at,
     latitude, longitude, accuracy_m, address";

/// Session row without its breaks.
fn map_session(row: &Row) -> Result<AttendanceSession> {
    let id_str: String = row.get("id")?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|_| conversion_err(0, AppError::Other(format!("invalid session id '{id_str}'"))))?;

    let method_str: String = row.get("tracking_method")?;
    let tracking_method = TrackingMethod::from_db_str(&method_str)
        .ok_or_else(|| conversion_err(3, AppError::InvalidMethod(method_str.clone())))?;

    let clock_in_raw: String = row.get("clock_in_at")?;
    let clock_out_raw: Option<String> = row.get("clock_out_at")?;

    let latitude: Option<f64> = row.get("latitude")?;
    let longitude: Option<f64> = row.get("longitude")?;
    let geo_location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoSnapshot {
            latitude,
            longitude,
            accuracy_m: row.get("accuracy_m")?,
            address: row.get("address")?,
        }),
        _ => None,
    };

    Ok(AttendanceSession {
        id,
        user_id: row.get("user_id")?,
        store_id: row.get("store_id")?,
        tracking_method,
        clock_in_at: parse_ts(4, &clock_in_raw)?,
        clock_out_at: clock_out_raw.as_deref().map(|s| parse_ts(5, s)).transpose()?,
        breaks: Vec::new(),
        geo_location,
    })
}

pub fn load_breaks(conn: &Connection, session_id: Uuid) -> Result<Vec<BreakInterval>> {
    let mut stmt = conn.prepare_cached(
        "SELECT start_at, end_at FROM breaks
         WHERE session_id = ?1
         ORDER BY start_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([session_id.to_string()], |row| {
        let start: String = row.get(0)?;
        let end: Option<String> = row.get(1)?;
        Ok(BreakInterval {
            start: parse_ts(0, &start)?,
            end: end.as_deref().map(|s| parse_ts(1, s)).transpose()?,
        })
    })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn with_breaks(
    conn: &Connection,
    session: Option<AttendanceSession>,
) -> Result<Option<AttendanceSession>> {
    match session {
        Some(mut s) => {
            s.breaks = load_breaks(conn, s.id)?;
            Ok(Some(s))
        }
        None => Ok(None),
    }
}

pub fn find_session(conn: &Connection, id: Uuid) -> Result<Option<AttendanceSession>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
    let session = conn
        .query_row(&sql, [id.to_string()], map_session)
        .optional()?;
    with_breaks(conn, session)
}

pub fn find_open_session(conn: &Connection, user_id: &str) -> Result<Option<AttendanceSession>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sessions
         WHERE user_id = ?1 AND clock_out_at IS NULL"
    );
    let session = conn.query_row(&sql, [user_id], map_session).optional()?;
    with_breaks(conn, session)
}

/// Most recent sessions of a user, newest first.
pub fn recent_sessions(
    conn: &Connection,
    user_id: &str,
    limit: usize,
) -> Result<Vec<AttendanceSession>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sessions
         WHERE user_id = ?1
         ORDER BY clock_in_at DESC
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, limit as i64], map_session)?;

    let mut out = Vec::new();
    for r in rows {
        let mut s = r?;
        s.breaks = load_breaks(conn, s.id)?;
        out.push(s);
    }
    Ok(out)
}

pub fn insert_session(
    conn: &Connection,
    session: &AttendanceSession,
    evidence: Option<&Evidence>,
    device: &DeviceInfo,
) -> AppResult<()> {
    let geo = session.geo_location.as_ref();
    let evidence_json = evidence.map(serde_json::to_string).transpose()?;
    let device_json = serde_json::to_string(device)?;

    conn.execute(
        "INSERT INTO sessions (id, user_id, store_id, tracking_method, clock_in_at, clock_out_at,
                               latitude, longitude, accuracy_m, address,
                               evidence, device_info, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            session.id.to_string(),
            session.user_id,
            session.store_id,
            session.tracking_method.to_db_str(),
            ts(session.clock_in_at),
            geo.map(|g| g.latitude),
            geo.map(|g| g.longitude),
            geo.and_then(|g| g.accuracy_m),
            geo.and_then(|g| g.address.clone()),
            evidence_json,
            device_json,
            Local::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn insert_break(conn: &Connection, session_id: Uuid, start: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO breaks (session_id, start_at) VALUES (?1, ?2)",
        params![session_id.to_string(), ts(start)],
    )?;
    Ok(())
}

/// Close the open break of a session. Returns false when there was none.
pub fn close_open_break(conn: &Connection, session_id: Uuid, end: DateTime<Utc>) -> Result<bool> {
    let n = conn.execute(
        "UPDATE breaks SET end_at = ?2 WHERE session_id = ?1 AND end_at IS NULL",
        params![session_id.to_string(), ts(end)],
    )?;
    Ok(n > 0)
}

pub fn set_clock_out(conn: &Connection, session_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let n = conn.execute(
        "UPDATE sessions SET clock_out_at = ?2 WHERE id = ?1 AND clock_out_at IS NULL",
        params![session_id.to_string(), ts(at)],
    )?;
    Ok(n > 0)
}
