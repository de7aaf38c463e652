pub mod consolidation;
pub mod objectives;
pub mod prompts;
pub mod rolling;
pub mod store;
pub mod world_map;
