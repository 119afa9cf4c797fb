use ulid::Ulid;

use crate::model::*;

use super::store::BookingStore;
use super::EngineError;

/// `start < end`, then sanity bounds on the timestamps themselves.
pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if !span.is_valid() {
        return Err(EngineError::InvalidInterval);
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// First booking of `actor_id` overlapping `span`, ignoring `exclude`.
pub(crate) fn find_conflict(
    store: &BookingStore,
    kind: ActorKind,
    actor_id: &Ulid,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    store
        .bookings_for_actor(kind, actor_id)
        .into_iter()
        .filter(|b| Some(b.id) != exclude)
        .find(|b| b.span.overlaps(span))
        .map(|b| b.id)
}

pub(crate) fn has_conflict(
    store: &BookingStore,
    kind: ActorKind,
    actor_id: &Ulid,
    span: &Span,
    exclude: Option<Ulid>,
) -> bool {
    find_conflict(store, kind, actor_id, span, exclude).is_some()
}

/// Room then professor, each against its own bookings.
pub(crate) fn check_room_and_professor(
    store: &BookingStore,
    room_id: &Ulid,
    professor_id: &Ulid,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    if has_conflict(store, ActorKind::Room, room_id, span, exclude) {
        return Err(EngineError::RoomUnavailable(*room_id));
    }
    if has_conflict(store, ActorKind::Professor, professor_id, span, exclude) {
        return Err(EngineError::ProfessorConflict(*professor_id));
    }
    Ok(())
}

/// The user must exist and hold `expected`.
pub(crate) fn require_role(
    store: &BookingStore,
    user_id: &Ulid,
    expected: Role,
) -> Result<(), EngineError> {
    let user = store.user(user_id).ok_or(EngineError::NotFound(*user_id))?;
    if user.role != expected {
        return Err(EngineError::RoleMismatch { id: *user_id, expected, actual: user.role });
    }
    Ok(())
}
