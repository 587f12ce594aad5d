pub mod bootstrap;
pub mod busy;
pub mod commands;
pub mod session;
pub mod status;
pub mod week_sync;
