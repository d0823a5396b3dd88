pub mod constants;
pub mod controller;
pub mod executor;
pub mod machine;
