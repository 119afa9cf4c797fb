use std::net::SocketAddr;

use crate::sql::{BookingFilter, Command, Query};

// ── Request metrics ─────────────────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "classbook_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "classbook_query_duration_seconds";

/// Counter: scheduling calls refused by the engine. Labels: kind.
pub const REJECTIONS_TOTAL: &str = "classbook_rejections_total";

/// Counter: commands refused by the role check. Labels: command.
pub const ACCESS_DENIED_TOTAL: &str = "classbook_access_denied_total";

// ── Resource metrics ────────────────────────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "classbook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "classbook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "classbook_connections_rejected_total";

/// Gauge: number of loaded tenant engines.
pub const TENANTS_ACTIVE: &str = "classbook_tenants_active";

/// Counter: WAL compactions run by the background compactor.
pub const WAL_COMPACTIONS_TOTAL: &str = "classbook_wal_compactions_total";

/// Histogram: WAL append-and-fsync duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "classbook_wal_flush_duration_seconds";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a command, used on metrics and in logs.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertUser { .. } => "insert_user",
        Command::DeleteUser { .. } => "delete_user",
        Command::InsertRoom { .. } => "insert_room",
        Command::UpdateRoom { .. } => "update_room",
        Command::DeleteRoom { .. } => "delete_room",
        Command::InsertSubject { .. } => "insert_subject",
        Command::UpdateSubject { .. } => "update_subject",
        Command::DeleteSubject { .. } => "delete_subject",
        Command::InsertBooking { .. } => "insert_booking",
        Command::UpdateBooking { .. } => "update_booking",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::InsertEnrollment { .. } => "insert_enrollment",
        Command::DeleteEnrollment { .. } => "delete_enrollment",
        Command::InsertSubjectLink { .. } => "insert_subject_link",
        Command::DeleteSubjectLink { .. } => "delete_subject_link",
        Command::Batch(_) => "batch",
        Command::Select(q) => match q {
            Query::Users => "select_users",
            Query::Rooms => "select_rooms",
            Query::Subjects => "select_subjects",
            Query::Bookings(BookingFilter::All) => "select_bookings",
            Query::Bookings(BookingFilter::Room(_)) => "select_bookings_by_room",
            Query::Bookings(BookingFilter::Professor(_)) => "select_bookings_by_professor",
            Query::Bookings(BookingFilter::Student(_)) => "select_bookings_by_student",
            Query::Enrollments { .. } => "select_enrollments",
            Query::SubjectLinks { .. } => "select_subject_links",
            Query::Calendar { .. } => "select_calendar",
        },
    }
}
