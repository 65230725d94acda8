pub mod colors;
pub mod formatting;
pub mod logging;
pub mod time;

pub use formatting::secs2readable;
