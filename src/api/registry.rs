//! Purpose: Implement the register and lookup operations over a `StudentStore`.
//! Exports: `Registry`, `RegisterRequest`, `Registration`, `StudentInfo`, `student_not_found`.
//! Role: Transport-independent operations shared by the HTTP server and tests.
//! Invariants: Registration validates name, email, then courses; the store is untouched on failure.
//! Invariants: Lookup reports an unknown ID before checking the semester.

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::store::{Grades, StudentId, StudentRecord, StudentStore};
use crate::core::validate::{semester_is_valid, validate_courses, validate_email, validate_name};

pub const REGISTERED_MESSAGE: &str = "Student registered successfully.";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub age: i64,
    pub courses: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub student_id: StudentId,
    pub message: String,
}

/// Public view of a student returned by lookups.
///
/// `grades` is only present when requested; `semester` is always present
/// and echoes the query value (null when absent).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StudentInfo {
    pub student_id: StudentId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grades: Option<Grades>,
    pub semester: Option<String>,
}

#[derive(Debug, Default)]
pub struct Registry {
    store: StudentStore,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &StudentStore {
        &self.store
    }

    pub fn register(&mut self, request: RegisterRequest) -> Result<Registration, Error> {
        validate_name(&request.name)?;
        validate_email(&request.email)?;
        let courses = validate_courses(request.courses)?;

        let student_id = self.store.insert(StudentRecord {
            name: request.name,
            email: request.email,
            age: request.age,
            courses,
            grades: Grades::new(),
        });
        Ok(Registration {
            student_id,
            message: REGISTERED_MESSAGE.to_string(),
        })
    }

    pub fn lookup(
        &self,
        student_id: StudentId,
        include_grades: bool,
        semester: Option<&str>,
    ) -> Result<StudentInfo, Error> {
        let Some(record) = self.store.get(student_id) else {
            return Err(student_not_found().with_student_id(student_id));
        };

        let mut info = StudentInfo {
            student_id,
            name: record.name.clone(),
            email: record.email.clone(),
            grades: None,
            semester: None,
        };
        if include_grades {
            info.grades = Some(record.grades.clone());
        }

        if !semester_is_valid(semester) {
            return Err(Error::new(ErrorKind::BadRequest)
                .with_message("semester format is invalid")
                .with_field("semester")
                .with_hint("Use Fall<YYYY>, spring<YYYY>, or summer<YYYY>."));
        }
        info.semester = semester.map(str::to_string);
        Ok(info)
    }
}

/// Not-found error for a lookup; callers attach `student_id` when it fits a `StudentId`.
pub fn student_not_found() -> Error {
    Error::new(ErrorKind::NotFound)
        .with_message("student not found")
        .with_field("student_id")
}
