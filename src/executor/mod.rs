pub mod action_executor;
pub mod input;
pub mod safety;
pub mod types;
