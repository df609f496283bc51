pub mod adb;
pub mod advisor;
pub mod archives;
pub mod batch;
pub mod bridge;
pub mod config;
pub mod error;
pub mod labels;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod session;
pub mod store;
pub mod sync;
