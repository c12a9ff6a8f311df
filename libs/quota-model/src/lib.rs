//! # eduq-model
//!
//! Domain types shared by the reconciliation engine and the API service.
//!
//! - [`QuotaProfile`]: the eight additive entitlement fields
//! - [`ProfileCatalog`]: named profile templates (`basic`, `lab`, ...)
//! - [`Student`], [`Course`], [`Enrollment`]: records owned by the
//!   student/course/enrollment stores and read by reconciliation
//!
//! Nothing in this crate performs I/O.

mod course;
mod enrollment;
mod profile;
mod student;

pub use course::{Course, CourseDefaults};
pub use enrollment::{Enrollment, EnrollmentStatus, ParseStatusError};
pub use profile::{CatalogError, ProfileCatalog, QuotaProfile, BASELINE_PROFILE, LAB_PROFILE};
pub use student::Student;
