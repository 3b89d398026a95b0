// Core modules implementing the student store, field validation, and error modeling.
pub mod error;
pub mod store;
pub mod validate;
