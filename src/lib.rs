pub mod config;
pub mod deps;
pub mod error;
pub mod lifecycle;
pub mod logs;
pub mod pidfile;
pub mod process;
pub mod smoke;
