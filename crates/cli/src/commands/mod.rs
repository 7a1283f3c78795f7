pub mod classify;
pub mod config_cmd;
pub mod doctor;
pub mod retrieve;
