pub mod engine;
pub mod error;
pub mod forms;
pub mod gate;
pub mod purchase;
pub mod render;
pub mod sessions;
pub mod view;

pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
pub use render::render;
pub use sessions::{Sessions, run_sweep_loop};
pub use view::{Notice, Reply, View};
