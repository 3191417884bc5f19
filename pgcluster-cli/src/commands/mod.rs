pub mod database;
pub mod init;
pub mod interactive;
pub mod setup;
pub mod status;
