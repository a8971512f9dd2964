//! Roles, permissions, and user accounts.

pub mod model;

pub use model::{Permission, Role, RoleInput, RoleUpdate, User, UserInput};
