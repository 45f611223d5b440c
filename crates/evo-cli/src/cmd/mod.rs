pub mod config;
pub mod detect;
pub mod init;
pub mod run;
pub mod state;
pub mod validate;
