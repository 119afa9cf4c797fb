use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject,
    Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertUser {
        id: Ulid,
        name: String,
        role: Role,
    },
    DeleteUser {
        id: Ulid,
    },
    InsertRoom {
        id: Ulid,
        name: String,
        capacity: u32,
    },
    UpdateRoom {
        id: Ulid,
        name: String,
        capacity: u32,
    },
    DeleteRoom {
        id: Ulid,
    },
    InsertSubject {
        id: Ulid,
        name: String,
        code: String,
    },
    UpdateSubject {
        id: Ulid,
        name: String,
        code: String,
    },
    DeleteSubject {
        id: Ulid,
    },
    InsertBooking {
        id: Ulid,
        room_id: Ulid,
        professor_id: Ulid,
        start: Ms,
        end: Ms,
    },
    UpdateBooking {
        id: Ulid,
        room_id: Ulid,
        professor_id: Ulid,
        start: Ms,
        end: Ms,
    },
    DeleteBooking {
        id: Ulid,
    },
    InsertEnrollment {
        booking_id: Ulid,
        student_id: Ulid,
    },
    DeleteEnrollment {
        booking_id: Ulid,
        student_id: Ulid,
    },
    InsertSubjectLink {
        booking_id: Ulid,
        subject_id: Ulid,
    },
    DeleteSubjectLink {
        booking_id: Ulid,
        subject_id: Ulid,
    },
    /// Multi-row INSERT. Rows run one after another; a rejected row stops the batch.
    Batch(Vec<Command>),
    Select(Query),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Query {
    Users,
    Rooms,
    Subjects,
    Bookings(BookingFilter),
    Enrollments { booking_id: Option<Ulid> },
    SubjectLinks { booking_id: Ulid },
    /// `viewer_id = None` means the caller's own calendar.
    Calendar { viewer_id: Option<Ulid> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BookingFilter {
    All,
    Room(Ulid),
    Professor(Ulid),
    Student(Ulid),
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Table a SELECT reads from, without validating its filters. Lets the
/// extended protocol describe a statement before its parameters are bound.
pub fn select_table(sql: &str) -> Option<&'static str> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql).ok()?;
    let Some(Statement::Query(query)) = stmts.first() else { return None };
    let SetExpr::Select(select) = query.body.as_ref() else { return None };
    let name = table_factor_name(&select.from.first()?.relation).ok()?;
    table_columns(&name).ok().map(|(table, _)| table)
}

// ── Rows ──────────────────────────────────────────────────────

/// Column/value pairs from one VALUES row or one SET list.
struct Row {
    table: &'static str,
    cols: Vec<(String, Expr)>,
}

impl Row {
    fn get(&self, col: &'static str) -> Result<&Expr, SqlError> {
        self.cols
            .iter()
            .find(|(name, _)| name == col)
            .map(|(_, expr)| expr)
            .ok_or(SqlError::MissingColumn(self.table, col))
    }

    fn ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        parse_ulid_expr(self.get(col)?)
    }

    fn text(&self, col: &'static str) -> Result<String, SqlError> {
        parse_text_expr(self.get(col)?)
    }

    fn time(&self, col: &'static str) -> Result<Ms, SqlError> {
        parse_time_expr(self.get(col)?)
    }

    fn capacity(&self) -> Result<u32, SqlError> {
        parse_u32(self.get("capacity")?)
    }

    fn role(&self) -> Result<Role, SqlError> {
        let raw = self.text("role")?;
        Role::parse(&raw).ok_or_else(|| SqlError::Parse(format!("unknown role: {raw}")))
    }
}

const USER_COLUMNS: &[&str] = &["id", "name", "role"];
const ROOM_COLUMNS: &[&str] = &["id", "name", "capacity"];
const SUBJECT_COLUMNS: &[&str] = &["id", "name", "code"];
const BOOKING_COLUMNS: &[&str] = &["id", "room_id", "professor_id", "start", "end"];
const ENROLLMENT_COLUMNS: &[&str] = &["booking_id", "student_id"];
const SUBJECT_LINK_COLUMNS: &[&str] = &["booking_id", "subject_id"];
const NO_COLUMNS: &[&str] = &[];

/// Canonical table name and the column order assumed when an INSERT omits its column list.
fn table_columns(table: &str) -> Result<(&'static str, &'static [&'static str]), SqlError> {
    Ok(match table {
        "users" => ("users", USER_COLUMNS),
        "rooms" => ("rooms", ROOM_COLUMNS),
        "subjects" => ("subjects", SUBJECT_COLUMNS),
        "bookings" => ("bookings", BOOKING_COLUMNS),
        "enrollments" => ("enrollments", ENROLLMENT_COLUMNS),
        "subject_links" => ("subject_links", SUBJECT_LINK_COLUMNS),
        "calendar" => ("calendar", NO_COLUMNS),
        _ => return Err(SqlError::UnknownTable(table.to_string())),
    })
}

fn insert_row(table: &'static str, row: &Row) -> Result<Command, SqlError> {
    match table {
        "users" => Ok(Command::InsertUser {
            id: row.ulid("id")?,
            name: row.text("name")?,
            role: row.role()?,
        }),
        "rooms" => Ok(Command::InsertRoom {
            id: row.ulid("id")?,
            name: row.text("name")?,
            capacity: row.capacity()?,
        }),
        "subjects" => Ok(Command::InsertSubject {
            id: row.ulid("id")?,
            name: row.text("name")?,
            code: row.text("code")?,
        }),
        "bookings" => Ok(Command::InsertBooking {
            id: row.ulid("id")?,
            room_id: row.ulid("room_id")?,
            professor_id: row.ulid("professor_id")?,
            start: row.time("start")?,
            end: row.time("end")?,
        }),
        "enrollments" => Ok(Command::InsertEnrollment {
            booking_id: row.ulid("booking_id")?,
            student_id: row.ulid("student_id")?,
        }),
        "subject_links" => Ok(Command::InsertSubjectLink {
            booking_id: row.ulid("booking_id")?,
            subject_id: row.ulid("subject_id")?,
        }),
        other => Err(SqlError::Unsupported(format!("INSERT into {other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let (table, defaults) = table_columns(&insert_table_name(insert)?)?;
    let names: Vec<String> = if insert.columns.is_empty() {
        defaults.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };

    let rows = extract_all_insert_rows(insert)?;
    let mut commands = Vec::with_capacity(rows.len());
    for (i, values) in rows.into_iter().enumerate() {
        if values.len() != names.len() {
            return Err(SqlError::WrongArity(table, names.len(), values.len()));
        }
        let row = Row {
            table,
            cols: names.iter().cloned().zip(values).collect(),
        };
        let cmd = insert_row(table, &row).map_err(|e| match e {
            SqlError::Parse(msg) if i > 0 => SqlError::Parse(format!("row {i}: {msg}")),
            other => other,
        })?;
        commands.push(cmd);
    }

    if commands.len() == 1 {
        Ok(commands.remove(0))
    } else {
        Ok(Command::Batch(commands))
    }
}

/// UPDATE replaces the whole record: every mutable column must be in SET.
fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let (table, _) = table_columns(&table_factor_name(&table.relation)?)?;
    let id = extract_where_id(selection)?;

    let mut cols = Vec::with_capacity(assignments.len());
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        cols.push((col, a.value.clone()));
    }
    let row = Row { table, cols };

    match table {
        "rooms" => Ok(Command::UpdateRoom {
            id,
            name: row.text("name")?,
            capacity: row.capacity()?,
        }),
        "subjects" => Ok(Command::UpdateSubject {
            id,
            name: row.text("name")?,
            code: row.text("code")?,
        }),
        "bookings" => Ok(Command::UpdateBooking {
            id,
            room_id: row.ulid("room_id")?,
            professor_id: row.ulid("professor_id")?,
            start: row.time("start")?,
            end: row.time("end")?,
        }),
        other => Err(SqlError::Unsupported(format!("UPDATE on {other}"))),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let (table, _) = table_columns(&delete_table_name(delete)?)?;
    match table {
        "enrollments" | "subject_links" => {
            let filters = collect_filters(delete.selection.as_ref())?;
            let row = Row { table, cols: filters };
            let booking_id = row.ulid("booking_id")?;
            if table == "enrollments" {
                Ok(Command::DeleteEnrollment { booking_id, student_id: row.ulid("student_id")? })
            } else {
                Ok(Command::DeleteSubjectLink { booking_id, subject_id: row.ulid("subject_id")? })
            }
        }
        _ => {
            let id = extract_where_id(&delete.selection)?;
            match table {
                "users" => Ok(Command::DeleteUser { id }),
                "rooms" => Ok(Command::DeleteRoom { id }),
                "subjects" => Ok(Command::DeleteSubject { id }),
                "bookings" => Ok(Command::DeleteBooking { id }),
                other => Err(SqlError::Unsupported(format!("DELETE from {other}"))),
            }
        }
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let (table, _) = table_columns(&table_factor_name(&select.from[0].relation)?)?;
    let filters = collect_filters(select.selection.as_ref())?;
    let allowed: &[&str] = match table {
        "bookings" => &["room_id", "professor_id", "student_id"],
        "enrollments" | "subject_links" => &["booking_id"],
        "calendar" => &["viewer_id"],
        _ => &[],
    };
    if let Some((col, _)) = filters.iter().find(|(c, _)| !allowed.contains(&c.as_str())) {
        return Err(SqlError::Unsupported(format!("filter on {table}.{col}")));
    }
    let row = Row { table, cols: filters };
    let optional = |col: &'static str| -> Result<Option<Ulid>, SqlError> {
        match row.get(col) {
            Ok(expr) => parse_ulid_expr(expr).map(Some),
            Err(_) => Ok(None),
        }
    };

    let query = match table {
        "users" => Query::Users,
        "rooms" => Query::Rooms,
        "subjects" => Query::Subjects,
        "bookings" => {
            if row.cols.len() > 1 {
                return Err(SqlError::Unsupported("more than one bookings filter".into()));
            }
            if let Some(id) = optional("room_id")? {
                Query::Bookings(BookingFilter::Room(id))
            } else if let Some(id) = optional("professor_id")? {
                Query::Bookings(BookingFilter::Professor(id))
            } else if let Some(id) = optional("student_id")? {
                Query::Bookings(BookingFilter::Student(id))
            } else {
                Query::Bookings(BookingFilter::All)
            }
        }
        "enrollments" => Query::Enrollments { booking_id: optional("booking_id")? },
        "subject_links" => Query::SubjectLinks { booking_id: row.ulid("booking_id")? },
        "calendar" => Query::Calendar { viewer_id: optional("viewer_id")? },
        other => return Err(SqlError::UnknownTable(other.to_string())),
    };
    Ok(Command::Select(query))
}

/// `col = value` terms joined by AND. Anything else is rejected.
fn collect_filters(selection: Option<&Expr>) -> Result<Vec<(String, Expr)>, SqlError> {
    fn walk(expr: &Expr, out: &mut Vec<(String, Expr)>) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => walk(inner, out),
            Expr::BinaryOp { left, op: ast::BinaryOperator::And, right } => {
                walk(left, out)?;
                walk(right, out)
            }
            Expr::BinaryOp { left, op: ast::BinaryOperator::Eq, right } => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
                out.push((col, right.as_ref().clone()));
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("filter {other}"))),
        }
    }
    let mut out = Vec::new();
    if let Some(expr) = selection {
        walk(expr, &mut out)?;
    }
    Ok(out)
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_text_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

/// Milliseconds, either as a number or a `'YYYY-MM-DDThh:mm'` string.
fn parse_time_expr(expr: &Expr) -> Result<Ms, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) if s.contains('T') => {
            crate::time::parse_instant(s).map_err(|e| SqlError::Parse(e.to_string()))
        }
        _ => parse_i64_expr(expr),
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    MissingColumn(&'static str, &'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MissingColumn(t, col) => write!(f, "{t}: missing column {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const B: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";
    const C: &str = "01BX5ZZKBKACTAV9WEVGEMMVS0";

    fn ulid(s: &str) -> Ulid {
        Ulid::from_string(s).unwrap()
    }

    #[test]
    fn parse_insert_user_with_columns() {
        let sql = format!("INSERT INTO users (role, id, name) VALUES ('profesor', '{A}', 'Paula')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertUser { id: ulid(A), name: "Paula".into(), role: Role::Professor }
        );
    }

    #[test]
    fn parse_insert_user_unknown_role() {
        let sql = format!("INSERT INTO users VALUES ('{A}', 'Paula', 'janitor')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_insert_room_positional() {
        let sql = format!("INSERT INTO rooms VALUES ('{A}', 'Aula 1', 30)");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertRoom { id: ulid(A), name: "Aula 1".into(), capacity: 30 }
        );
    }

    #[test]
    fn parse_insert_room_negative_capacity() {
        let sql = format!("INSERT INTO rooms VALUES ('{A}', 'Aula 1', -3)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_insert_booking_with_datetime_strings() {
        let sql = format!(
            r#"INSERT INTO bookings (id, room_id, professor_id, start, "end") VALUES ('{A}', '{B}', '{C}', '2024-10-01T10:00', '2024-10-01T12:00')"#
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking { id, room_id, professor_id, start, end } => {
                assert_eq!((id, room_id, professor_id), (ulid(A), ulid(B), ulid(C)));
                assert_eq!(start, 1_727_776_800_000);
                assert_eq!(end - start, 2 * 3_600_000);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_with_millis() {
        let sql = format!(r#"INSERT INTO bookings VALUES ('{A}', '{B}', '{C}', 1000, 2000)"#);
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::InsertBooking { start: 1000, end: 2000, .. }
        ));
    }

    #[test]
    fn parse_insert_booking_bad_datetime() {
        let sql = format!(r#"INSERT INTO bookings VALUES ('{A}', '{B}', '{C}', '2024-13-01T10:00', 2000)"#);
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_insert_wrong_arity() {
        let sql = format!("INSERT INTO rooms VALUES ('{A}', 'Aula 1')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("rooms", 3, 2))));
    }

    #[test]
    fn parse_insert_missing_column() {
        let sql = format!("INSERT INTO rooms (id, name) VALUES ('{A}', 'Aula 1')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn("rooms", "capacity"))));
    }

    #[test]
    fn parse_multi_row_enrollments_is_batch() {
        let sql = format!("INSERT INTO enrollments (booking_id, student_id) VALUES ('{A}', '{B}'), ('{A}', '{C}')");
        match parse_sql(&sql).unwrap() {
            Command::Batch(cmds) => {
                assert_eq!(cmds.len(), 2);
                assert_eq!(cmds[1], Command::InsertEnrollment { booking_id: ulid(A), student_id: ulid(C) });
            }
            other => panic!("expected Batch, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_subject_link() {
        let sql = format!("INSERT INTO subject_links VALUES ('{A}', '{B}')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertSubjectLink { booking_id: ulid(A), subject_id: ulid(B) }
        );
    }

    #[test]
    fn parse_update_booking() {
        let sql = format!(
            r#"UPDATE bookings SET room_id = '{B}', professor_id = '{C}', start = 3000, "end" = 4000 WHERE id = '{A}'"#
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateBooking { id: ulid(A), room_id: ulid(B), professor_id: ulid(C), start: 3000, end: 4000 }
        );
    }

    #[test]
    fn parse_update_requires_every_column() {
        let sql = format!("UPDATE rooms SET name = 'Aula 2' WHERE id = '{A}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn("rooms", "capacity"))));
        let sql = "UPDATE rooms SET name = 'Aula 2', capacity = 3";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_update_subject() {
        let sql = format!("UPDATE subjects SET name = 'Algebra', code = 'MAT110' WHERE id = '{A}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateSubject { id: ulid(A), name: "Algebra".into(), code: "MAT110".into() }
        );
    }

    #[test]
    fn parse_update_users_unsupported() {
        let sql = format!("UPDATE users SET name = 'X' WHERE id = '{A}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_deletes() {
        assert_eq!(
            parse_sql(&format!("DELETE FROM bookings WHERE id = '{A}'")).unwrap(),
            Command::DeleteBooking { id: ulid(A) }
        );
        assert_eq!(
            parse_sql(&format!("DELETE FROM users WHERE id = '{A}'")).unwrap(),
            Command::DeleteUser { id: ulid(A) }
        );
        assert_eq!(
            parse_sql(&format!("DELETE FROM enrollments WHERE student_id = '{B}' AND booking_id = '{A}'")).unwrap(),
            Command::DeleteEnrollment { booking_id: ulid(A), student_id: ulid(B) }
        );
        assert!(matches!(
            parse_sql(&format!("DELETE FROM subject_links WHERE booking_id = '{A}'")),
            Err(SqlError::MissingColumn("subject_links", "subject_id"))
        ));
    }

    #[test]
    fn parse_select_bookings_filters() {
        assert_eq!(
            parse_sql("SELECT * FROM bookings").unwrap(),
            Command::Select(Query::Bookings(BookingFilter::All))
        );
        assert_eq!(
            parse_sql(&format!("SELECT * FROM bookings WHERE professor_id = '{A}'")).unwrap(),
            Command::Select(Query::Bookings(BookingFilter::Professor(ulid(A))))
        );
        assert_eq!(
            parse_sql(&format!("SELECT * FROM bookings WHERE student_id = '{A}'")).unwrap(),
            Command::Select(Query::Bookings(BookingFilter::Student(ulid(A))))
        );
        assert!(matches!(
            parse_sql(&format!("SELECT * FROM bookings WHERE room_id = '{A}' AND student_id = '{B}'")),
            Err(SqlError::Unsupported(_))
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM bookings WHERE start = 5"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn parse_select_calendar() {
        assert_eq!(
            parse_sql("SELECT * FROM calendar").unwrap(),
            Command::Select(Query::Calendar { viewer_id: None })
        );
        assert_eq!(
            parse_sql(&format!("SELECT * FROM calendar WHERE viewer_id = '{A}'")).unwrap(),
            Command::Select(Query::Calendar { viewer_id: Some(ulid(A)) })
        );
    }

    #[test]
    fn parse_select_subject_links_needs_booking() {
        assert!(matches!(
            parse_sql("SELECT * FROM subject_links"),
            Err(SqlError::MissingColumn("subject_links", "booking_id"))
        ));
        assert_eq!(
            parse_sql(&format!("SELECT * FROM enrollments WHERE booking_id = '{A}'")).unwrap(),
            Command::Select(Query::Enrollments { booking_id: Some(ulid(A)) })
        );
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{A}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn select_table_ignores_placeholders() {
        assert_eq!(select_table("SELECT * FROM bookings WHERE room_id = $1"), Some("bookings"));
        assert_eq!(select_table("SELECT * FROM Calendar"), Some("calendar"));
        assert_eq!(select_table("DELETE FROM rooms WHERE id = $1"), None);
        assert_eq!(select_table("SELECT * FROM nowhere"), None);
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
