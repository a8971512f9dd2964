//! Task catalog — reusable task templates and named task sets.

pub mod model;

pub use model::{Priority, TaskSet, TaskSetInput, TaskTemplate, TemplateInput};
