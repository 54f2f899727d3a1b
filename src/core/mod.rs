pub mod balance;
pub mod errors;
pub mod lifecycle;
pub mod matcher;
pub mod models;
pub mod services;
