pub mod arbitration;
pub mod command;
pub mod inbox;
pub mod rate_limit;
pub mod twitch;
