pub mod auth_client;
pub mod config;
pub mod entry_store;
pub mod error;
pub mod session_store;
pub mod supabase_client;
pub mod week_slot_store;
