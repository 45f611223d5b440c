pub mod artifact;
pub mod config;
pub mod detect;
pub mod error;
pub mod generate;
pub mod github;
pub mod io;
pub mod paths;
pub mod proc;
pub mod quality;
pub mod sandbox;
pub mod scheduler;
pub mod state;
pub mod types;
pub mod version;

pub use error::{EvoError, Result};
