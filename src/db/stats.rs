use crate::db::migrate::latest_version;
use crate::db::pool::DbPool;
use crate::utils::colors::{CYAN, GREEN, GREY, RESET, YELLOW};
use chrono::DateTime;
use rusqlite::OptionalExtension;
use std::fs;

fn count(pool: &DbPool, sql: &str) -> rusqlite::Result<i64> {
    pool.conn.query_row(sql, [], |row| row.get(0))
}

pub fn print_db_info(pool: &mut DbPool, db_path: &str) -> rusqlite::Result<()> {
    println!();

    //
    // 1) FILE SIZE
    //
    let file_size = fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);
    let file_mb = (file_size as f64) / (1024.0 * 1024.0);

    println!("{}• File:{} {}{}{}", CYAN, RESET, YELLOW, db_path, RESET);
    println!("{}• Size:{} {:.2} MB", CYAN, RESET, file_mb);

    let schema: Option<String> = pool
        .conn
        .query_row(
            "SELECT target FROM log WHERE operation = 'migration_applied'
             ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let schema = schema.unwrap_or_else(|| format!("{GREY}--{RESET}"));
    println!("{}• Schema:{} {} (latest {})", CYAN, RESET, schema, latest_version());

    //
    // 2) TOTALS
    //
    let stores = count(pool, "SELECT COUNT(*) FROM stores")?;
    let sessions = count(pool, "SELECT COUNT(*) FROM sessions")?;
    let open = count(pool, "SELECT COUNT(*) FROM sessions WHERE clock_out_at IS NULL")?;
    let breaks = count(pool, "SELECT COUNT(*) FROM breaks")?;

    println!("{}• Stores:{} {}{}{}", CYAN, RESET, GREEN, stores, RESET);
    println!(
        "{}• Sessions:{} {}{}{} ({} open)",
        CYAN, RESET, GREEN, sessions, RESET, open
    );
    println!("{}• Breaks:{} {}{}{}", CYAN, RESET, GREEN, breaks, RESET);

    //
    // 3) CLOCK-IN RANGE
    //
    let first: Option<String> = pool
        .conn
        .query_row("SELECT MIN(clock_in_at) FROM sessions", [], |row| row.get(0))?;
    let last: Option<String> = pool
        .conn
        .query_row("SELECT MAX(clock_in_at) FROM sessions", [], |row| row.get(0))?;

    let fmt = |v: Option<String>| match v.as_deref().map(DateTime::parse_from_rfc3339) {
        Some(Ok(dt)) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Some(Err(_)) => v.unwrap_or_default(),
        None => format!("{GREY}--{RESET}"),
    };

    println!("{}• Clock-in range:{}", CYAN, RESET);
    println!("    from: {}", fmt(first));
    println!("    to:   {}", fmt(last));

    println!();
    Ok(())
}
