pub mod config;
pub mod highlight;
pub mod history;
pub mod session;
