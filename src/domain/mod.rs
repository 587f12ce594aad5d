pub mod balance;
pub mod models;
pub mod week;
