pub mod audit;
pub mod config;
pub mod error;
pub mod gate;
pub mod io;
pub mod lock;
pub mod paths;
pub mod registry;
pub mod render;
pub mod roadmap;
pub mod store;
pub mod sync;
pub mod types;

pub use error::{ErrorClass, Result, RoadmapError};
