use ulid::Ulid;

use crate::model::Role;

/// Every way a scheduling call can be refused. All variants are recoverable:
/// a rejected call leaves the booking set exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidInterval,
    RoomUnavailable(Ulid),
    ProfessorConflict(Ulid),
    StudentConflict { student_id: Ulid, booking_id: Ulid },
    EnrollmentCapExceeded(Ulid),
    DuplicateEnrollment { student_id: Ulid, booking_id: Ulid },
    DuplicateSubjectLink { subject_id: Ulid, booking_id: Ulid },
    NotFound(Ulid),
    AlreadyExists(Ulid),
    RoleMismatch { id: Ulid, expected: Role, actual: Role },
    InvalidCapacity,
    /// Entity is still referenced (e.g. a professor with bookings).
    InUse(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInterval => "invalid_interval",
            EngineError::RoomUnavailable(_) => "room_unavailable",
            EngineError::ProfessorConflict(_) => "professor_conflict",
            EngineError::StudentConflict { .. } => "student_conflict",
            EngineError::EnrollmentCapExceeded(_) => "enrollment_cap_exceeded",
            EngineError::DuplicateEnrollment { .. } => "duplicate_enrollment",
            EngineError::DuplicateSubjectLink { .. } => "duplicate_subject_link",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::RoleMismatch { .. } => "role_mismatch",
            EngineError::InvalidCapacity => "invalid_capacity",
            EngineError::InUse(_) => "in_use",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval => write!(f, "start must be before end"),
            EngineError::RoomUnavailable(id) => {
                write!(f, "room {id} is not available in that time slot")
            }
            EngineError::ProfessorConflict(id) => {
                write!(f, "professor {id} has a schedule conflict")
            }
            EngineError::StudentConflict { student_id, booking_id } => write!(
                f,
                "student {student_id} has a schedule conflict with booking {booking_id}"
            ),
            EngineError::EnrollmentCapExceeded(id) => write!(
                f,
                "student {id} already has the maximum of {} enrollments",
                crate::limits::MAX_ENROLLMENTS_PER_STUDENT
            ),
            EngineError::DuplicateEnrollment { student_id, booking_id } => {
                write!(f, "student {student_id} is already enrolled in booking {booking_id}")
            }
            EngineError::DuplicateSubjectLink { subject_id, booking_id } => {
                write!(f, "subject {subject_id} is already linked to booking {booking_id}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::RoleMismatch { id, expected, actual } => {
                write!(f, "user {id} is a {actual}, expected a {expected}")
            }
            EngineError::InvalidCapacity => write!(f, "room capacity must be at least 1"),
            EngineError::InUse(id) => write!(f, "{id} is still referenced by bookings"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
