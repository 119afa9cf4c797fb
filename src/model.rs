use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    /// True when `start < end`. Callers validate before committing anything.
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }
}

/// Two half-open intervals intersect iff each starts before the other ends.
/// Touching intervals (`a_end == b_start`) do not overlap.
pub fn overlaps(a_start: Ms, a_end: Ms, b_start: Ms, b_end: Ms) -> bool {
    a_start < b_end && b_start < a_end
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Professor,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Professor => "professor",
            Role::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "professor" | "profesor" => Some(Role::Professor),
            "student" | "estudiante" => Some(Role::Student),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whose time is being scheduled. Each actor is subject to the no-overlap rule on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Room,
    Professor,
    Student,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Ulid,
    pub name: String,
    pub code: String,
}

/// A room reserved for a professor over `span`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub professor_id: Ulid,
    pub span: Span,
}

/// Who is asking for a calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub id: Ulid,
    pub role: Role,
}

impl Viewer {
    pub fn new(id: Ulid, role: Role) -> Self {
        Self { id, role }
    }

    /// Administrator not backed by a directory entry (the configured superuser).
    pub fn superuser() -> Self {
        Self { id: Ulid::nil(), role: Role::Admin }
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        id: Ulid,
        name: String,
        role: Role,
    },
    UserRemoved {
        id: Ulid,
    },
    RoomCreated {
        id: Ulid,
        name: String,
        capacity: u32,
    },
    RoomUpdated {
        id: Ulid,
        name: String,
        capacity: u32,
    },
    /// Cascades to the room's bookings, their enrollments and subject links.
    RoomDeleted {
        id: Ulid,
    },
    SubjectCreated {
        id: Ulid,
        name: String,
        code: String,
    },
    SubjectUpdated {
        id: Ulid,
        name: String,
        code: String,
    },
    SubjectDeleted {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        professor_id: Ulid,
        span: Span,
    },
    BookingUpdated {
        id: Ulid,
        room_id: Ulid,
        professor_id: Ulid,
        span: Span,
    },
    BookingDeleted {
        id: Ulid,
    },
    StudentEnrolled {
        booking_id: Ulid,
        student_id: Ulid,
    },
    StudentUnenrolled {
        booking_id: Ulid,
        student_id: Ulid,
    },
    SubjectLinked {
        booking_id: Ulid,
        subject_id: Ulid,
    },
    SubjectUnlinked {
        booking_id: Ulid,
        subject_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub professor_id: Ulid,
    pub start: Ms,
    pub end: Ms,
}

impl From<&Booking> for BookingInfo {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            room_id: b.room_id,
            professor_id: b.professor_id,
            start: b.span.start,
            end: b.span.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentInfo {
    pub booking_id: Ulid,
    pub student_id: Ulid,
}

/// One calendar-export record. `start`/`end` are ISO-8601 local date-times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEntry {
    pub id: Ulid,
    pub title: String,
    pub start: String,
    pub end: String,
}
