use std::collections::{BTreeMap, BTreeSet, HashMap};

use ulid::Ulid;

use crate::model::*;

/// Authoritative in-memory booking set with per-actor indexes.
///
/// Mutators are private; the only way in is `apply_event`, which the engine
/// calls after every check has passed and the event is durable.
#[derive(Debug, Default)]
pub struct BookingStore {
    users: BTreeMap<Ulid, User>,
    rooms: BTreeMap<Ulid, Room>,
    subjects: BTreeMap<Ulid, Subject>,
    subject_codes: HashMap<String, Ulid>,
    bookings: BTreeMap<Ulid, Booking>,
    by_room: HashMap<Ulid, BTreeSet<Ulid>>,
    by_professor: HashMap<Ulid, BTreeSet<Ulid>>,
    /// booking → enrolled students
    enrollments: HashMap<Ulid, BTreeSet<Ulid>>,
    /// student → bookings
    by_student: HashMap<Ulid, BTreeSet<Ulid>>,
    /// booking → linked subjects
    subject_links: HashMap<Ulid, BTreeSet<Ulid>>,
    /// subject → bookings
    by_subject: HashMap<Ulid, BTreeSet<Ulid>>,
}

impl BookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lookups ──────────────────────────────────────────────

    pub fn user(&self, id: &Ulid) -> Option<&User> {
        self.users.get(id)
    }

    pub fn room(&self, id: &Ulid) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn subject(&self, id: &Ulid) -> Option<&Subject> {
        self.subjects.get(id)
    }

    pub fn subject_by_code(&self, code: &str) -> Option<Ulid> {
        self.subject_codes.get(code).copied()
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.get(id)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.values()
    }

    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.values()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    fn resolve<'a>(&'a self, ids: Option<&'a BTreeSet<Ulid>>) -> Vec<&'a Booking> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.bookings.get(id))
            .collect()
    }

    pub fn bookings_for_room(&self, room_id: &Ulid) -> Vec<&Booking> {
        self.resolve(self.by_room.get(room_id))
    }

    pub fn bookings_for_professor(&self, professor_id: &Ulid) -> Vec<&Booking> {
        self.resolve(self.by_professor.get(professor_id))
    }

    /// Bookings the student is enrolled in.
    pub fn bookings_for_student(&self, student_id: &Ulid) -> Vec<&Booking> {
        self.resolve(self.by_student.get(student_id))
    }

    pub fn bookings_for_actor(&self, kind: ActorKind, actor_id: &Ulid) -> Vec<&Booking> {
        match kind {
            ActorKind::Room => self.bookings_for_room(actor_id),
            ActorKind::Professor => self.bookings_for_professor(actor_id),
            ActorKind::Student => self.bookings_for_student(actor_id),
        }
    }

    pub fn enrollment_count(&self, student_id: &Ulid) -> usize {
        self.by_student.get(student_id).map_or(0, BTreeSet::len)
    }

    pub fn is_enrolled(&self, student_id: &Ulid, booking_id: &Ulid) -> bool {
        self.enrollments
            .get(booking_id)
            .is_some_and(|students| students.contains(student_id))
    }

    pub fn enrolled_students(&self, booking_id: &Ulid) -> Vec<Ulid> {
        self.enrollments
            .get(booking_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_linked(&self, subject_id: &Ulid, booking_id: &Ulid) -> bool {
        self.subject_links
            .get(booking_id)
            .is_some_and(|subjects| subjects.contains(subject_id))
    }

    pub fn linked_subjects(&self, booking_id: &Ulid) -> Vec<Ulid> {
        self.subject_links
            .get(booking_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// True when any booking or enrollment still points at the user.
    pub fn user_in_use(&self, user_id: &Ulid) -> bool {
        self.by_professor.get(user_id).is_some_and(|b| !b.is_empty())
            || self.by_student.get(user_id).is_some_and(|b| !b.is_empty())
    }

    // ── Event application ────────────────────────────────────

    pub(crate) fn apply_event(&mut self, event: &Event) {
        match event {
            Event::UserRegistered { id, name, role } => {
                self.users.insert(*id, User { id: *id, name: name.clone(), role: *role });
            }
            Event::UserRemoved { id } => {
                self.users.remove(id);
            }
            Event::RoomCreated { id, name, capacity } | Event::RoomUpdated { id, name, capacity } => {
                self.rooms.insert(*id, Room { id: *id, name: name.clone(), capacity: *capacity });
            }
            Event::RoomDeleted { id } => self.delete_room(id),
            Event::SubjectCreated { id, name, code } | Event::SubjectUpdated { id, name, code } => {
                if let Some(old) = self.subjects.get(id) {
                    self.subject_codes.remove(&old.code);
                }
                self.subject_codes.insert(code.clone(), *id);
                self.subjects.insert(
                    *id,
                    Subject { id: *id, name: name.clone(), code: code.clone() },
                );
            }
            Event::SubjectDeleted { id } => self.delete_subject(id),
            Event::BookingCreated { id, room_id, professor_id, span } => {
                self.insert_booking(Booking {
                    id: *id,
                    room_id: *room_id,
                    professor_id: *professor_id,
                    span: *span,
                });
            }
            Event::BookingUpdated { id, room_id, professor_id, span } => {
                self.update_booking(Booking {
                    id: *id,
                    room_id: *room_id,
                    professor_id: *professor_id,
                    span: *span,
                });
            }
            Event::BookingDeleted { id } => self.delete_booking(id),
            Event::StudentEnrolled { booking_id, student_id } => {
                self.insert_enrollment(*student_id, *booking_id);
            }
            Event::StudentUnenrolled { booking_id, student_id } => {
                self.delete_enrollment(student_id, booking_id);
            }
            Event::SubjectLinked { booking_id, subject_id } => {
                self.insert_subject_link(*subject_id, *booking_id);
            }
            Event::SubjectUnlinked { booking_id, subject_id } => {
                self.delete_subject_link(subject_id, booking_id);
            }
        }
    }

    fn insert_booking(&mut self, booking: Booking) {
        self.by_room.entry(booking.room_id).or_default().insert(booking.id);
        self.by_professor.entry(booking.professor_id).or_default().insert(booking.id);
        self.bookings.insert(booking.id, booking);
    }

    /// Overwrite room/professor/span in place. Enrollments and links stay attached to the id.
    fn update_booking(&mut self, booking: Booking) {
        if let Some(old) = self.bookings.get(&booking.id).copied() {
            remove_from_index(&mut self.by_room, &old.room_id, &old.id);
            remove_from_index(&mut self.by_professor, &old.professor_id, &old.id);
        }
        self.insert_booking(booking);
    }

    fn delete_booking(&mut self, id: &Ulid) {
        if let Some(students) = self.enrollments.remove(id) {
            for student in students {
                remove_from_index(&mut self.by_student, &student, id);
            }
        }
        if let Some(subjects) = self.subject_links.remove(id) {
            for subject in subjects {
                remove_from_index(&mut self.by_subject, &subject, id);
            }
        }
        if let Some(old) = self.bookings.remove(id) {
            remove_from_index(&mut self.by_room, &old.room_id, id);
            remove_from_index(&mut self.by_professor, &old.professor_id, id);
        }
    }

    fn delete_room(&mut self, id: &Ulid) {
        let booking_ids: Vec<Ulid> = self
            .by_room
            .get(id)
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default();
        for booking_id in booking_ids {
            self.delete_booking(&booking_id);
        }
        self.by_room.remove(id);
        self.rooms.remove(id);
    }

    fn delete_subject(&mut self, id: &Ulid) {
        if let Some(bookings) = self.by_subject.remove(id) {
            for booking in bookings {
                remove_from_index(&mut self.subject_links, &booking, id);
            }
        }
        if let Some(old) = self.subjects.remove(id) {
            self.subject_codes.remove(&old.code);
        }
    }

    fn insert_enrollment(&mut self, student_id: Ulid, booking_id: Ulid) {
        self.enrollments.entry(booking_id).or_default().insert(student_id);
        self.by_student.entry(student_id).or_default().insert(booking_id);
    }

    fn delete_enrollment(&mut self, student_id: &Ulid, booking_id: &Ulid) {
        remove_from_index(&mut self.enrollments, booking_id, student_id);
        remove_from_index(&mut self.by_student, student_id, booking_id);
    }

    fn insert_subject_link(&mut self, subject_id: Ulid, booking_id: Ulid) {
        self.subject_links.entry(booking_id).or_default().insert(subject_id);
        self.by_subject.entry(subject_id).or_default().insert(booking_id);
    }

    fn delete_subject_link(&mut self, subject_id: &Ulid, booking_id: &Ulid) {
        remove_from_index(&mut self.subject_links, booking_id, subject_id);
        remove_from_index(&mut self.by_subject, subject_id, booking_id);
    }

    // ── Compaction ───────────────────────────────────────────

    /// Minimal event list that rebuilds this store, parents before children.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for u in self.users.values() {
            events.push(Event::UserRegistered { id: u.id, name: u.name.clone(), role: u.role });
        }
        for r in self.rooms.values() {
            events.push(Event::RoomCreated { id: r.id, name: r.name.clone(), capacity: r.capacity });
        }
        for s in self.subjects.values() {
            events.push(Event::SubjectCreated {
                id: s.id,
                name: s.name.clone(),
                code: s.code.clone(),
            });
        }
        for b in self.bookings.values() {
            events.push(Event::BookingCreated {
                id: b.id,
                room_id: b.room_id,
                professor_id: b.professor_id,
                span: b.span,
            });
            for student_id in self.enrolled_students(&b.id) {
                events.push(Event::StudentEnrolled { booking_id: b.id, student_id });
            }
            for subject_id in self.linked_subjects(&b.id) {
                events.push(Event::SubjectLinked { booking_id: b.id, subject_id });
            }
        }
        events
    }
}

/// Remove `value` from the set under `key`, dropping the set once empty.
fn remove_from_index(index: &mut HashMap<Ulid, BTreeSet<Ulid>>, key: &Ulid, value: &Ulid) {
    if let Some(set) = index.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            index.remove(key);
        }
    }
}
