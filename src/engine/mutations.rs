use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_room_and_professor, find_conflict, require_role, validate_span};
use super::store::BookingStore;
use super::{rejected, Engine, EngineError, WalCommand};

fn validate_name(name: &str, what: &'static str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::LimitExceeded(what));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn validate_room(name: &str, capacity: u32) -> Result<(), EngineError> {
    validate_name(name, "room name is empty")?;
    if capacity == 0 {
        return Err(EngineError::InvalidCapacity);
    }
    Ok(())
}

fn validate_subject(name: &str, code: &str) -> Result<(), EngineError> {
    validate_name(name, "subject name is empty")?;
    if code.trim().is_empty() {
        return Err(EngineError::LimitExceeded("subject code is empty"));
    }
    if code.len() > MAX_SUBJECT_CODE_LEN {
        return Err(EngineError::LimitExceeded("subject code too long"));
    }
    Ok(())
}

/// Shared create/edit gate, run after the interval is validated. Order: room,
/// professor, then overlaps for room and professor. `exclude` is the booking
/// being edited.
fn check_booking(
    store: &BookingStore,
    room_id: &Ulid,
    professor_id: &Ulid,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    if store.room(room_id).is_none() {
        return Err(EngineError::NotFound(*room_id));
    }
    require_role(store, professor_id, Role::Professor)?;
    check_room_and_professor(store, room_id, professor_id, span, exclude)
}

impl Engine {
    // ── Directory ────────────────────────────────────────────

    pub async fn register_user(&self, id: Ulid, name: String, role: Role) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        let check = || -> Result<(), EngineError> {
            validate_name(&name, "user name is empty")?;
            if store.user(&id).is_some() {
                return Err(EngineError::AlreadyExists(id));
            }
            if store.user_count() >= MAX_USERS_PER_TENANT {
                return Err(EngineError::LimitExceeded("too many users"));
            }
            Ok(())
        };
        check().or_else(|e| rejected("register_user", e))?;

        let event = Event::UserRegistered { id, name, role };
        self.persist_and_apply(&mut store, &event).await
    }

    /// Refused while the user still teaches a booking or holds an enrollment.
    pub async fn remove_user(&self, id: Ulid) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        if store.user(&id).is_none() {
            return rejected("remove_user", EngineError::NotFound(id));
        }
        if store.user_in_use(&id) {
            return rejected("remove_user", EngineError::InUse(id));
        }
        self.persist_and_apply(&mut store, &Event::UserRemoved { id }).await
    }

    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(&self, id: Ulid, name: String, capacity: u32) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        let check = || -> Result<(), EngineError> {
            validate_room(&name, capacity)?;
            if store.room(&id).is_some() {
                return Err(EngineError::AlreadyExists(id));
            }
            if store.room_count() >= MAX_ROOMS_PER_TENANT {
                return Err(EngineError::LimitExceeded("too many rooms"));
            }
            Ok(())
        };
        check().or_else(|e| rejected("create_room", e))?;

        let event = Event::RoomCreated { id, name, capacity };
        self.persist_and_apply(&mut store, &event).await
    }

    pub async fn update_room(&self, id: Ulid, name: String, capacity: u32) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        let check = || -> Result<(), EngineError> {
            if store.room(&id).is_none() {
                return Err(EngineError::NotFound(id));
            }
            validate_room(&name, capacity)
        };
        check().or_else(|e| rejected("update_room", e))?;

        let event = Event::RoomUpdated { id, name, capacity };
        self.persist_and_apply(&mut store, &event).await
    }

    /// Deletes the room together with its bookings, their enrollments and subject links.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        if store.room(&id).is_none() {
            return rejected("delete_room", EngineError::NotFound(id));
        }
        let cascaded = store.bookings_for_room(&id).len();
        self.persist_and_apply(&mut store, &Event::RoomDeleted { id }).await?;
        info!("deleted room {id} and {cascaded} bookings");
        Ok(())
    }

    // ── Subjects ─────────────────────────────────────────────

    pub async fn create_subject(&self, id: Ulid, name: String, code: String) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        let check = || -> Result<(), EngineError> {
            validate_subject(&name, &code)?;
            if store.subject(&id).is_some() {
                return Err(EngineError::AlreadyExists(id));
            }
            if let Some(existing) = store.subject_by_code(&code) {
                return Err(EngineError::AlreadyExists(existing));
            }
            if store.subject_count() >= MAX_SUBJECTS_PER_TENANT {
                return Err(EngineError::LimitExceeded("too many subjects"));
            }
            Ok(())
        };
        check().or_else(|e| rejected("create_subject", e))?;

        let event = Event::SubjectCreated { id, name, code };
        self.persist_and_apply(&mut store, &event).await
    }

    pub async fn update_subject(&self, id: Ulid, name: String, code: String) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        let check = || -> Result<(), EngineError> {
            if store.subject(&id).is_none() {
                return Err(EngineError::NotFound(id));
            }
            validate_subject(&name, &code)?;
            match store.subject_by_code(&code) {
                Some(existing) if existing != id => Err(EngineError::AlreadyExists(existing)),
                _ => Ok(()),
            }
        };
        check().or_else(|e| rejected("update_subject", e))?;

        let event = Event::SubjectUpdated { id, name, code };
        self.persist_and_apply(&mut store, &event).await
    }

    pub async fn delete_subject(&self, id: Ulid) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        if store.subject(&id).is_none() {
            return rejected("delete_subject", EngineError::NotFound(id));
        }
        self.persist_and_apply(&mut store, &Event::SubjectDeleted { id }).await
    }

    // ── Bookings ─────────────────────────────────────────────

    /// Reserve `room_id` for `professor_id` over `span`. Returns the booking id.
    pub async fn create_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        professor_id: Ulid,
        span: Span,
    ) -> Result<Ulid, EngineError> {
        let mut store = self.store.write().await;
        let check = || -> Result<(), EngineError> {
            validate_span(&span)?;
            if store.booking(&id).is_some() {
                return Err(EngineError::AlreadyExists(id));
            }
            if store.booking_count() >= MAX_BOOKINGS_PER_TENANT {
                return Err(EngineError::LimitExceeded("too many bookings"));
            }
            check_booking(&store, &room_id, &professor_id, &span, None)
        };
        check().or_else(|e| rejected("create_booking", e))?;

        let event = Event::BookingCreated { id, room_id, professor_id, span };
        self.persist_and_apply(&mut store, &event).await?;
        debug!("booked room {room_id} for {professor_id} [{}, {})", span.start, span.end);
        Ok(id)
    }

    /// Move a booking in place. The booking never conflicts with its own
    /// previous interval; enrolled students are re-checked against their
    /// other enrollments.
    pub async fn edit_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        professor_id: Ulid,
        span: Span,
    ) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        let check = || -> Result<(), EngineError> {
            validate_span(&span)?;
            if store.booking(&id).is_none() {
                return Err(EngineError::NotFound(id));
            }
            check_booking(&store, &room_id, &professor_id, &span, Some(id))?;
            for student_id in store.enrolled_students(&id) {
                if let Some(booking_id) =
                    find_conflict(&store, ActorKind::Student, &student_id, &span, Some(id))
                {
                    return Err(EngineError::StudentConflict { student_id, booking_id });
                }
            }
            Ok(())
        };
        check().or_else(|e| rejected("edit_booking", e))?;

        let event = Event::BookingUpdated { id, room_id, professor_id, span };
        self.persist_and_apply(&mut store, &event).await
    }

    /// Delete a booking with its enrollments and subject links.
    pub async fn delete_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        if store.booking(&id).is_none() {
            return rejected("delete_booking", EngineError::NotFound(id));
        }
        self.persist_and_apply(&mut store, &Event::BookingDeleted { id }).await
    }

    // ── Enrollments ──────────────────────────────────────────

    /// Order: booking, student, cap, duplicate, overlap.
    pub async fn enroll_student(&self, student_id: Ulid, booking_id: Ulid) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        let check = || -> Result<(), EngineError> {
            let span = store
                .booking(&booking_id)
                .map(|b| b.span)
                .ok_or(EngineError::NotFound(booking_id))?;
            require_role(&store, &student_id, Role::Student)?;
            if store.enrollment_count(&student_id) >= MAX_ENROLLMENTS_PER_STUDENT {
                return Err(EngineError::EnrollmentCapExceeded(student_id));
            }
            if store.is_enrolled(&student_id, &booking_id) {
                return Err(EngineError::DuplicateEnrollment { student_id, booking_id });
            }
            if let Some(other) = find_conflict(&store, ActorKind::Student, &student_id, &span, None) {
                return Err(EngineError::StudentConflict { student_id, booking_id: other });
            }
            Ok(())
        };
        check().or_else(|e| rejected("enroll_student", e))?;

        let event = Event::StudentEnrolled { booking_id, student_id };
        self.persist_and_apply(&mut store, &event).await
    }

    pub async fn unenroll_student(&self, student_id: Ulid, booking_id: Ulid) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        if store.booking(&booking_id).is_none() {
            return rejected("unenroll_student", EngineError::NotFound(booking_id));
        }
        if !store.is_enrolled(&student_id, &booking_id) {
            return rejected("unenroll_student", EngineError::NotFound(student_id));
        }
        let event = Event::StudentUnenrolled { booking_id, student_id };
        self.persist_and_apply(&mut store, &event).await
    }

    // ── Subject links ────────────────────────────────────────

    pub async fn link_subject(&self, subject_id: Ulid, booking_id: Ulid) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        let check = || -> Result<(), EngineError> {
            if store.booking(&booking_id).is_none() {
                return Err(EngineError::NotFound(booking_id));
            }
            if store.subject(&subject_id).is_none() {
                return Err(EngineError::NotFound(subject_id));
            }
            if store.is_linked(&subject_id, &booking_id) {
                return Err(EngineError::DuplicateSubjectLink { subject_id, booking_id });
            }
            Ok(())
        };
        check().or_else(|e| rejected("link_subject", e))?;

        let event = Event::SubjectLinked { booking_id, subject_id };
        self.persist_and_apply(&mut store, &event).await
    }

    pub async fn unlink_subject(&self, subject_id: Ulid, booking_id: Ulid) -> Result<(), EngineError> {
        let mut store = self.store.write().await;
        if !store.is_linked(&subject_id, &booking_id) {
            return rejected("unlink_subject", EngineError::NotFound(subject_id));
        }
        let event = Event::SubjectUnlinked { booking_id, subject_id };
        self.persist_and_apply(&mut store, &event).await
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current state.
    /// Holding the read lock keeps writers (and their appends) out until the swap is done.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let store = self.store.read().await;
        let events = store.snapshot_events();
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        drop(store);
        info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
