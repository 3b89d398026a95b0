//! Purpose: Define the public Rust API boundary for the student registry.
//! Exports: Registry operations, request/response types, errors, and the HTTP client.
//! Role: Stable surface for the CLI, the server, and tests; hides module layout.
//! Invariants: This module is the only public path to registry operations.

mod registry;
mod remote;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::store::{Grades, ID_BASE, StudentId, StudentRecord, StudentStore};
pub use crate::core::validate::semester_is_valid;
pub use registry::{
    REGISTERED_MESSAGE, RegisterRequest, Registration, Registry, StudentInfo, student_not_found,
};
pub use remote::RemoteClient;
