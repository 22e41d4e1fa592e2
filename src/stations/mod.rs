pub mod error;
pub mod registry;
pub mod resolver;
pub mod spatial_index;
