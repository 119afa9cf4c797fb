use ulid::Ulid;

use crate::model::*;
use crate::time::format_instant;

use super::conflict;
use super::store::BookingStore;
use super::{Engine, EngineError};

fn sorted_infos<'a>(bookings: impl IntoIterator<Item = &'a Booking>) -> Vec<BookingInfo> {
    let mut infos: Vec<BookingInfo> = bookings.into_iter().map(BookingInfo::from).collect();
    infos.sort_by_key(|b| (b.start, b.id));
    infos
}

fn calendar_title(store: &BookingStore, booking: &Booking) -> String {
    let room = store
        .room(&booking.room_id)
        .map_or_else(|| booking.room_id.to_string(), |r| r.name.clone());
    let professor = store
        .user(&booking.professor_id)
        .map_or_else(|| booking.professor_id.to_string(), |u| u.name.clone());
    format!("{room} - {professor}")
}

impl Engine {
    pub async fn list_users(&self) -> Vec<User> {
        self.store.read().await.users().cloned().collect()
    }

    pub async fn list_rooms(&self) -> Vec<Room> {
        self.store.read().await.rooms().cloned().collect()
    }

    pub async fn list_subjects(&self) -> Vec<Subject> {
        self.store.read().await.subjects().cloned().collect()
    }

    pub async fn list_bookings(&self) -> Vec<BookingInfo> {
        sorted_infos(self.store.read().await.bookings())
    }

    pub async fn bookings_for_room(&self, room_id: Ulid) -> Vec<BookingInfo> {
        sorted_infos(self.store.read().await.bookings_for_room(&room_id))
    }

    pub async fn bookings_for_professor(&self, professor_id: Ulid) -> Vec<BookingInfo> {
        sorted_infos(self.store.read().await.bookings_for_professor(&professor_id))
    }

    pub async fn bookings_for_student(&self, student_id: Ulid) -> Vec<BookingInfo> {
        sorted_infos(self.store.read().await.bookings_for_student(&student_id))
    }

    pub async fn enrollment_count(&self, student_id: Ulid) -> usize {
        self.store.read().await.enrollment_count(&student_id)
    }

    /// Enrollments of one booking, or of every booking when `booking_id` is `None`.
    pub async fn list_enrollments(&self, booking_id: Option<Ulid>) -> Result<Vec<EnrollmentInfo>, EngineError> {
        let store = self.store.read().await;
        let booking_ids: Vec<Ulid> = match booking_id {
            Some(id) => {
                if store.booking(&id).is_none() {
                    return Err(EngineError::NotFound(id));
                }
                vec![id]
            }
            None => store.bookings().map(|b| b.id).collect(),
        };
        Ok(booking_ids
            .into_iter()
            .flat_map(|booking_id| {
                store
                    .enrolled_students(&booking_id)
                    .into_iter()
                    .map(move |student_id| EnrollmentInfo { booking_id, student_id })
            })
            .collect())
    }

    pub async fn subjects_for_booking(&self, booking_id: Ulid) -> Result<Vec<Subject>, EngineError> {
        let store = self.store.read().await;
        if store.booking(&booking_id).is_none() {
            return Err(EngineError::NotFound(booking_id));
        }
        Ok(store
            .linked_subjects(&booking_id)
            .iter()
            .filter_map(|id| store.subject(id).cloned())
            .collect())
    }

    /// Would `span` collide with anything `actor_id` already holds?
    /// `exclude` skips one booking, as when editing it in place.
    pub async fn has_conflict(
        &self,
        kind: ActorKind,
        actor_id: Ulid,
        span: Span,
        exclude: Option<Ulid>,
    ) -> bool {
        let store = self.store.read().await;
        conflict::has_conflict(&store, kind, &actor_id, &span, exclude)
    }

    /// Calendar export: admins see every booking, professors their own,
    /// students the bookings they are enrolled in. Ordered by start.
    pub async fn calendar(&self, viewer: Viewer) -> Vec<CalendarEntry> {
        let store = self.store.read().await;
        let mut bookings: Vec<&Booking> = match viewer.role {
            Role::Admin => store.bookings().collect(),
            Role::Professor => store.bookings_for_professor(&viewer.id),
            Role::Student => store.bookings_for_student(&viewer.id),
        };
        bookings.sort_by_key(|b| (b.span.start, b.id));
        bookings
            .into_iter()
            .map(|b| CalendarEntry {
                id: b.id,
                title: calendar_title(&store, b),
                start: format_instant(b.span.start),
                end: format_instant(b.span.end),
            })
            .collect()
    }

    /// `calendar` as a JSON array of `{id, title, start, end}`.
    pub async fn calendar_json(&self, viewer: Viewer) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.calendar(viewer).await)
    }
}
