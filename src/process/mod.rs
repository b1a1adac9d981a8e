pub mod manager;
pub mod port;
pub mod scanner;
