pub mod jobs;
pub mod monitor;
pub mod system;
