pub mod agent;
pub mod cli;
