pub mod initialize;
pub mod local;
pub mod log;
pub mod migrate;
pub mod pool;
pub mod queries;
pub mod stats;
