pub mod grid;
pub mod pipeline;
pub mod som_grid;
pub mod types;
pub mod window;
