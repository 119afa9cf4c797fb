use ulid::Ulid;

use crate::engine::BookingStore;
use crate::model::{Role, Viewer};
use crate::observability::command_label;
use crate::sql::{BookingFilter, Command, Query};

/// Who is issuing commands on a connection. Resolved against the tenant's
/// directory on every query so role changes apply immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    viewer: Viewer,
}

impl Principal {
    /// `login` is the pgwire user name. The configured superuser is always
    /// admin; anyone else must log in with their directory id.
    pub fn resolve(login: &str, superuser: &str, store: &BookingStore) -> Result<Self, AccessError> {
        if login == superuser {
            return Ok(Self { viewer: Viewer::superuser() });
        }
        let id = Ulid::from_string(login).map_err(|_| AccessError::UnknownLogin(login.to_string()))?;
        let user = store.user(&id).ok_or_else(|| AccessError::UnknownLogin(login.to_string()))?;
        Ok(Self { viewer: Viewer::new(user.id, user.role) })
    }

    pub fn viewer(&self) -> Viewer {
        self.viewer
    }

    /// The viewer whose calendar a `SELECT * FROM calendar` returns.
    /// Only admins may look at someone else's.
    pub fn calendar_viewer(&self, requested: Option<Ulid>, store: &BookingStore) -> Result<Viewer, AccessError> {
        match requested {
            None => Ok(self.viewer),
            Some(id) if id == self.viewer.id => Ok(self.viewer),
            Some(id) => {
                if self.viewer.role != Role::Admin {
                    return Err(AccessError::Denied { role: self.viewer.role, command: "select_calendar" });
                }
                let user = store.user(&id).ok_or(AccessError::UnknownUser(id))?;
                Ok(Viewer::new(user.id, user.role))
            }
        }
    }

    pub fn authorize(&self, cmd: &Command) -> Result<(), AccessError> {
        if let Command::Batch(cmds) = cmd {
            return cmds.iter().try_for_each(|c| self.authorize(c));
        }
        if self.allows(cmd) {
            Ok(())
        } else {
            metrics::counter!(crate::observability::ACCESS_DENIED_TOTAL, "command" => command_label(cmd))
                .increment(1);
            Err(AccessError::Denied { role: self.viewer.role, command: command_label(cmd) })
        }
    }

    fn allows(&self, cmd: &Command) -> bool {
        let me = self.viewer.id;
        match self.viewer.role {
            Role::Admin => true,
            Role::Professor => match cmd {
                Command::InsertBooking { professor_id, .. } => *professor_id == me,
                Command::Select(q) => match q {
                    Query::Users | Query::Rooms | Query::Subjects => true,
                    Query::Bookings(BookingFilter::Professor(id)) => *id == me,
                    Query::Calendar { viewer_id } => viewer_id.is_none_or(|id| id == me),
                    _ => false,
                },
                _ => false,
            },
            Role::Student => match cmd {
                Command::Select(q) => match q {
                    Query::Rooms | Query::Subjects => true,
                    Query::Bookings(BookingFilter::Student(id)) => *id == me,
                    Query::Calendar { viewer_id } => viewer_id.is_none_or(|id| id == me),
                    _ => false,
                },
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    UnknownLogin(String),
    UnknownUser(Ulid),
    Denied { role: Role, command: &'static str },
}

impl AccessError {
    /// SQLSTATE reported to the client.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::UnknownLogin(_) => "28000",
            AccessError::UnknownUser(_) => "P0001",
            AccessError::Denied { .. } => "42501",
        }
    }
}

impl std::fmt::Display for AccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessError::UnknownLogin(login) => write!(f, "login {login} is not a registered user"),
            AccessError::UnknownUser(id) => write!(f, "not found: {id}"),
            AccessError::Denied { role, command } => write!(f, "a {role} may not run {command}"),
        }
    }
}

impl std::error::Error for AccessError {}
