pub mod action_planner;
pub mod parse;
pub mod prompt;
pub mod types;
