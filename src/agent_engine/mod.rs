pub mod engine;
pub mod history;
pub mod iteration;
pub mod loop_control;
pub mod state;
pub mod status;
