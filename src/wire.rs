use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::data::DataRow;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::debug;

use crate::access::{AccessError, Principal};
use crate::auth::ClassbookAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, BookingFilter, Command, Query, SqlError};
use crate::tenant::TenantManager;

pub struct ClassbookHandler {
    tenant_manager: Arc<TenantManager>,
    superuser: String,
    query_parser: Arc<ClassbookQueryParser>,
}

impl ClassbookHandler {
    pub fn new(tenant_manager: Arc<TenantManager>, superuser: String) -> Self {
        Self {
            tenant_manager,
            superuser,
            query_parser: Arc::new(ClassbookQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("tenant error: {e}")))
    }

    /// Parse, authorize, execute, and record metrics for one statement.
    async fn run<C: ClientInfo>(&self, client: &C, sql_text: &str) -> PgWireResult<Response> {
        let engine = self.resolve_engine(client)?;
        let login = client.metadata().get("user").cloned().unwrap_or_default();
        let cmd = sql::parse_sql(sql_text).map_err(sql_err)?;
        let label = command_label(&cmd);

        let started = Instant::now();
        let result = self.execute_command(&engine, &login, cmd).await;
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        debug!(command = label, status, "query from {login}");
        result
    }

    async fn execute_command(&self, engine: &Engine, login: &str, cmd: Command) -> PgWireResult<Response> {
        let principal = {
            let store = engine.read().await;
            Principal::resolve(login, &self.superuser, &store).map_err(access_err)?
        };
        principal.authorize(&cmd).map_err(access_err)?;

        match cmd {
            Command::Select(query) => select(engine, &principal, query).await,
            Command::Batch(cmds) => {
                let mut rows = 0;
                for cmd in cmds {
                    apply(engine, cmd).await.map_err(engine_err)?;
                    rows += 1;
                }
                Ok(Response::Execution(Tag::new("INSERT").with_rows(rows)))
            }
            cmd => {
                let tag = apply(engine, cmd).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new(tag).with_rows(1)))
            }
        }
    }
}

/// Run one mutation; returns the command tag.
async fn apply(engine: &Engine, cmd: Command) -> Result<&'static str, EngineError> {
    match cmd {
        Command::InsertUser { id, name, role } => engine.register_user(id, name, role).await.map(|_| "INSERT"),
        Command::DeleteUser { id } => engine.remove_user(id).await.map(|_| "DELETE"),
        Command::InsertRoom { id, name, capacity } => {
            engine.create_room(id, name, capacity).await.map(|_| "INSERT")
        }
        Command::UpdateRoom { id, name, capacity } => {
            engine.update_room(id, name, capacity).await.map(|_| "UPDATE")
        }
        Command::DeleteRoom { id } => engine.delete_room(id).await.map(|_| "DELETE"),
        Command::InsertSubject { id, name, code } => {
            engine.create_subject(id, name, code).await.map(|_| "INSERT")
        }
        Command::UpdateSubject { id, name, code } => {
            engine.update_subject(id, name, code).await.map(|_| "UPDATE")
        }
        Command::DeleteSubject { id } => engine.delete_subject(id).await.map(|_| "DELETE"),
        Command::InsertBooking { id, room_id, professor_id, start, end } => engine
            .create_booking(id, room_id, professor_id, Span::new(start, end))
            .await
            .map(|_| "INSERT"),
        Command::UpdateBooking { id, room_id, professor_id, start, end } => engine
            .edit_booking(id, room_id, professor_id, Span::new(start, end))
            .await
            .map(|_| "UPDATE"),
        Command::DeleteBooking { id } => engine.delete_booking(id).await.map(|_| "DELETE"),
        Command::InsertEnrollment { booking_id, student_id } => {
            engine.enroll_student(student_id, booking_id).await.map(|_| "INSERT")
        }
        Command::DeleteEnrollment { booking_id, student_id } => {
            engine.unenroll_student(student_id, booking_id).await.map(|_| "DELETE")
        }
        Command::InsertSubjectLink { booking_id, subject_id } => {
            engine.link_subject(subject_id, booking_id).await.map(|_| "INSERT")
        }
        Command::DeleteSubjectLink { booking_id, subject_id } => {
            engine.unlink_subject(subject_id, booking_id).await.map(|_| "DELETE")
        }
        Command::Batch(_) | Command::Select(_) => unreachable!("handled by execute_command"),
    }
}

enum Cell {
    Text(String),
    Int(i64),
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<ulid::Ulid> for Cell {
    fn from(id: ulid::Ulid) -> Self {
        Cell::Text(id.to_string())
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Int(n)
    }
}

async fn select(engine: &Engine, principal: &Principal, query: Query) -> PgWireResult<Response> {
    let schema = Arc::new(query_schema(query_table(query)));
    let mut rows: Vec<Vec<Cell>> = Vec::new();
    match query {
        Query::Users => {
            for u in engine.list_users().await {
                rows.push(vec![u.id.into(), u.name.into(), u.role.to_string().into()]);
            }
        }
        Query::Rooms => {
            for r in engine.list_rooms().await {
                rows.push(vec![r.id.into(), r.name.into(), i64::from(r.capacity).into()]);
            }
        }
        Query::Subjects => {
            for s in engine.list_subjects().await {
                rows.push(vec![s.id.into(), s.name.into(), s.code.into()]);
            }
        }
        Query::Bookings(filter) => {
            let bookings = match filter {
                BookingFilter::All => engine.list_bookings().await,
                BookingFilter::Room(id) => engine.bookings_for_room(id).await,
                BookingFilter::Professor(id) => engine.bookings_for_professor(id).await,
                BookingFilter::Student(id) => engine.bookings_for_student(id).await,
            };
            for b in bookings {
                rows.push(vec![
                    b.id.into(),
                    b.room_id.into(),
                    b.professor_id.into(),
                    b.start.into(),
                    b.end.into(),
                ]);
            }
        }
        Query::Enrollments { booking_id } => {
            for e in engine.list_enrollments(booking_id).await.map_err(engine_err)? {
                rows.push(vec![e.booking_id.into(), e.student_id.into()]);
            }
        }
        Query::SubjectLinks { booking_id } => {
            for s in engine.subjects_for_booking(booking_id).await.map_err(engine_err)? {
                rows.push(vec![booking_id.into(), s.id.into(), s.code.into(), s.name.into()]);
            }
        }
        Query::Calendar { viewer_id } => {
            let viewer = {
                let store = engine.read().await;
                principal.calendar_viewer(viewer_id, &store).map_err(access_err)?
            };
            for entry in engine.calendar(viewer).await {
                rows.push(vec![entry.id.into(), entry.title.into(), entry.start.into(), entry.end.into()]);
            }
        }
    }

    let encoded: Vec<PgWireResult<DataRow>> = rows
        .into_iter()
        .map(|row| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            for cell in row {
                match cell {
                    Cell::Text(s) => encoder.encode_field(&s)?,
                    Cell::Int(n) => encoder.encode_field(&n)?,
                }
            }
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(encoded))))
}

fn query_table(query: Query) -> &'static str {
    match query {
        Query::Users => "users",
        Query::Rooms => "rooms",
        Query::Subjects => "subjects",
        Query::Bookings(_) => "bookings",
        Query::Enrollments { .. } => "enrollments",
        Query::SubjectLinks { .. } => "subject_links",
        Query::Calendar { .. } => "calendar",
    }
}

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

/// Row shape returned by `SELECT * FROM <table>`.
fn query_schema(table: &str) -> Vec<FieldInfo> {
    match table {
        "users" => vec![text_field("id"), text_field("name"), text_field("role")],
        "rooms" => vec![text_field("id"), text_field("name"), int_field("capacity")],
        "subjects" => vec![text_field("id"), text_field("name"), text_field("code")],
        "bookings" => vec![
            text_field("id"),
            text_field("room_id"),
            text_field("professor_id"),
            int_field("start"),
            int_field("end"),
        ],
        "enrollments" => vec![text_field("booking_id"), text_field("student_id")],
        "subject_links" => vec![
            text_field("booking_id"),
            text_field("subject_id"),
            text_field("code"),
            text_field("name"),
        ],
        "calendar" => vec![text_field("id"), text_field("title"), text_field("start"), text_field("end")],
        _ => vec![],
    }
}

fn statement_schema(sql_text: &str) -> Vec<FieldInfo> {
    sql::select_table(sql_text).map(query_schema).unwrap_or_default()
}

#[async_trait]
impl SimpleQueryHandler for ClassbookHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(&*client, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct ClassbookQueryParser;

#[async_trait]
impl QueryParser for ClassbookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(statement_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for ClassbookHandler {
    type Statement = String;
    type QueryParser = ClassbookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql_text = substitute_params(portal);
        self.run(&*client, &sql_text).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(param_types, statement_schema(&target.statement)))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(statement_schema(&target.statement.statement)))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    max = max.max(n);
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    substitute(&portal.statement.statement, &portal.parameters)
}

fn substitute(sql_text: &str, params: &[Option<bytes::Bytes>]) -> String {
    let mut result = sql_text.to_string();
    // Highest index first so $1 never clobbers the prefix of $10.
    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct ClassbookFactory {
    handler: Arc<ClassbookHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<ClassbookAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl ClassbookFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String, superuser: String) -> Self {
        let auth_source = ClassbookAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(ClassbookHandler::new(tenant_manager, superuser)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for ClassbookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client socket until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    superuser: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(ClassbookFactory::new(tenant_manager, password, superuser));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error("P0001", e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

fn access_err(e: AccessError) -> PgWireError {
    user_error(e.code(), e.to_string())
}
