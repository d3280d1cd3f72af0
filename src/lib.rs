pub mod clean;
pub mod config;
pub mod logging;
pub mod seed;
pub mod table;
