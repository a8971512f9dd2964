//! Concrete per-agent tasks instantiated from the catalog.

pub mod model;

pub use model::{StageRef, Task, TaskInput, TaskStatus};
