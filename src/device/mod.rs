pub mod connection;
pub mod constants;
pub mod discovery;
pub mod parser;
pub mod session;
pub mod types;
