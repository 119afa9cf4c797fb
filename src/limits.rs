use crate::model::Ms;

/// Maximum enrollments a single student may hold at once.
pub const MAX_ENROLLMENTS_PER_STUDENT: usize = 6;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_SUBJECT_CODE_LEN: usize = 20;

pub const MAX_USERS_PER_TENANT: usize = 100_000;
pub const MAX_ROOMS_PER_TENANT: usize = 10_000;
pub const MAX_SUBJECTS_PER_TENANT: usize = 10_000;
pub const MAX_BOOKINGS_PER_TENANT: usize = 1_000_000;

pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 128;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single booking may not span more than a week.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;
