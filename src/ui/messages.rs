//! One-line status messages for the CLI.
//!
//! Everything goes to stdout except errors, which go to stderr so that
//! scripted callers can tell them apart.

use crate::utils::colors::{BLUE, BOLD, GREEN, RED, RESET, YELLOW};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Info,
    Success,
    Warning,
    Error,
}

impl Tone {
    fn icon(self) -> &'static str {
        match self {
            Tone::Info => "ℹ️",
            Tone::Success => "✅",
            Tone::Warning => "⚠️",
            Tone::Error => "❌",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Tone::Info => BLUE,
            Tone::Success => GREEN,
            Tone::Warning => YELLOW,
            Tone::Error => RED,
        }
    }
}

fn emit(tone: Tone, msg: impl fmt::Display) {
    let line = format!("{}{}{} {}{}", tone.color(), BOLD, tone.icon(), RESET, msg);
    if tone == Tone::Error {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

pub fn info<T: fmt::Display>(msg: T) {
    emit(Tone::Info, msg);
}

pub fn success<T: fmt::Display>(msg: T) {
    emit(Tone::Success, msg);
}

pub fn warning<T: fmt::Display>(msg: T) {
    emit(Tone::Warning, msg);
}

/// Print every verification warning under a common prefix.
pub fn verification_warnings<I, T>(method: impl fmt::Display, warnings: I)
where
    I: IntoIterator<Item = T>,
    T: fmt::Display,
{
    for w in warnings {
        emit(Tone::Warning, format_args!("{method}: {w}"));
    }
}

pub fn error<T: fmt::Display>(msg: T) {
    emit(Tone::Error, msg);
}
