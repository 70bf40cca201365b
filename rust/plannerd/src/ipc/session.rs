use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::ipc::error::err;
use crate::ipc::helpers::required_str;
use crate::ipc::types::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
        }
    }

    pub fn landing_page(self) -> &'static str {
        match self {
            Self::Student => "studentDashboard",
            Self::Teacher => "teacherDashboard",
        }
    }
}

/// Who is making the current request. Built from `params.sessionToken` when a
/// handler starts and dropped when it returns; only the store outlives it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
    pub class_group: Option<String>,
    pub profile_image: Option<String>,
}

impl Session {
    pub fn open(conn: &Connection, token: &str) -> rusqlite::Result<Option<Session>> {
        conn.query_row(
            "SELECT u.id, u.name, u.role, u.class_group, u.profile_image
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token = ?",
            [token],
            |r| {
                let role: String = r.get(2)?;
                Ok(Session {
                    token: token.to_string(),
                    user_id: r.get(0)?,
                    user_name: r.get(1)?,
                    role: Role::parse(&role).unwrap_or(Role::Student),
                    class_group: r.get(3)?,
                    profile_image: r.get(4)?,
                })
            },
        )
        .optional()
    }

    pub fn from_request(conn: &Connection, req: &Request) -> Result<Session, Value> {
        let token = required_str(req, "sessionToken")?;
        match Session::open(conn, &token) {
            Ok(Some(s)) => Ok(s),
            Ok(None) => Err(err(
                &req.id,
                "unauthorized",
                "log in to use this page",
                None,
            )),
            Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "userId": self.user_id,
            "name": self.user_name,
            "role": self.role.as_str(),
            "classGroup": self.class_group,
            "profileImage": self.profile_image
        })
    }
}
