// Field validators for student registration and lookup parameters.
// Each check is a plain function; callers compose them in a fixed order.
// Course checks run count, then duplicates, then per-course length.
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::error::{Error, ErrorKind};

pub const MIN_COURSES: usize = 1;
pub const MAX_COURSES: usize = 5;
pub const MIN_COURSE_LEN: usize = 5;
pub const MAX_COURSE_LEN: usize = 30;

const MAX_EMAIL_LEN: usize = 254;
const MAX_EMAIL_LOCAL_LEN: usize = 64;
const MAX_DOMAIN_LABEL_LEN: usize = 63;

// `Fall` is capitalized while `spring`/`summer` are not; matching is exact-case.
// Only the start is anchored, so trailing text after the year is accepted.
static SEMESTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Fall|spring|summer)[0-9]{4}").expect("semester pattern compiles")
});

static EMAIL_LOCAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*$")
        .expect("email local-part pattern compiles")
});

static DOMAIN_LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?$").expect("domain label pattern compiles")
});

/// Returns true when `semester` is absent or starts with `<Term><YYYY>`.
pub fn semester_is_valid(semester: Option<&str>) -> bool {
    match semester {
        None => true,
        Some(value) => SEMESTER_PATTERN.is_match(value),
    }
}

pub fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(invalid("name", "name must not be empty"));
    }
    Ok(())
}

/// Checks that `email` has the shape `local@domain.tld`.
///
/// This is a structural check only: dot-atom local part, at least two
/// hostname labels, and a non-numeric top-level label. No DNS lookups.
pub fn validate_email(email: &str) -> Result<(), Error> {
    if email.len() > MAX_EMAIL_LEN {
        return Err(invalid("email", "email address is too long"));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(invalid("email", "email address must contain an @-sign")
            .with_hint("Use an address like name@example.edu."));
    };
    if local.is_empty() || local.len() > MAX_EMAIL_LOCAL_LEN {
        return Err(invalid(
            "email",
            "email local part must be between 1 and 64 characters",
        ));
    }
    if !EMAIL_LOCAL_PATTERN.is_match(local) {
        return Err(invalid("email", "email local part contains invalid characters"));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("email", "email domain must contain a period")
            .with_hint("Use an address like name@example.edu."));
    }
    for label in &labels {
        if label.is_empty() || label.len() > MAX_DOMAIN_LABEL_LEN {
            return Err(invalid("email", "email domain has an empty or oversized label"));
        }
        if !DOMAIN_LABEL_PATTERN.is_match(label) {
            return Err(invalid("email", "email domain contains invalid characters"));
        }
    }
    let tld = labels[labels.len() - 1];
    if tld.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(invalid("email", "email domain must not end in a numeric label"));
    }
    Ok(())
}

/// Validates a course list and hands it back unchanged.
///
/// Only the first violated rule is reported: count, then duplicates, then
/// length of each course (measured in characters).
pub fn validate_courses(courses: Vec<String>) -> Result<Vec<String>, Error> {
    if courses.len() < MIN_COURSES || courses.len() > MAX_COURSES {
        return Err(
            invalid("courses", "courses must be between 1 and 5 items").with_hint(format!(
                "Got {} course(s); submit between {MIN_COURSES} and {MAX_COURSES}.",
                courses.len()
            )),
        );
    }

    let mut seen = HashSet::with_capacity(courses.len());
    for course in &courses {
        if !seen.insert(course.as_str()) {
            return Err(invalid("courses", "duplicate courses are not allowed")
                .with_hint(format!("'{course}' appears more than once.")));
        }
    }

    for course in &courses {
        let len = course.chars().count();
        if !(MIN_COURSE_LEN..=MAX_COURSE_LEN).contains(&len) {
            return Err(
                invalid("courses", "course name should be between 5-30 characters")
                    .with_hint(format!("'{course}' is {len} character(s) long.")),
            );
        }
    }

    Ok(courses)
}

fn invalid(field: &str, message: &str) -> Error {
    Error::new(ErrorKind::Validation)
        .with_message(message)
        .with_field(field)
}
