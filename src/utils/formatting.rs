//! Formatting utilities used for CLI output.

pub fn pad_right(s: &str, width: usize) -> String {
    format!("{:<width$}", s, width = width)
}

/// `9000` → `02h 30m`; short form `02:30`.
pub fn secs2readable(secs: i64, short: bool) -> String {
    let mins = secs.max(0) / 60;
    let hours = mins / 60;
    let minutes = mins % 60;

    if short {
        format!("{:02}:{:02}", hours, minutes)
    } else {
        format!("{:02}h {:02}m", hours, minutes)
    }
}

/// `152.4` → `152 m`, `1520.0` → `1.52 km`.
pub fn meters2readable(m: f64) -> String {
    if m < 1000.0 {
        format!("{:.0} m", m)
    } else {
        format!("{:.2} km", m / 1000.0)
    }
}
