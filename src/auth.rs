/*!
Credential verification and role-gated sessions.

A login checks a submitted username/password pair against the `Users`
sheet and, on success, snapshots the matched row into a `Session`. The
verifier itself does no I/O; callers fetch the sheet and hand the rows in.

Stored credentials come in two formats. Rows migrated from the old
spreadsheet hold an unsalted hex SHA-256 digest; rows created here hold a
salted Argon2 hash in PHC string form. `verify_password` dispatches on the
stored format so both keep working.
*/
use std::collections::HashMap;
use std::fmt::Write;

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::store::{self, Record};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Clerk,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Clerk => "clerk",
        };
        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "clerk" => Ok(Role::Clerk),
            _ => Err(format!("{:?} is not a valid role", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    ManageUsers,
    PublishNews,
    ImportStudents,
    RecordAttendance,
    RecordBehavior,
    EnterGrades,
    PostHomework,
    SendMessages,
    ViewRoster,
    ExportSheets,
}

impl Role {
    /// The first three capabilities are administrative; everything else is
    /// open to any authenticated role.
    pub fn allows(self, cap: Capability) -> bool {
        match cap {
            Capability::ManageUsers | Capability::PublishNews | Capability::ImportStudents => {
                matches!(self, Role::Admin)
            }
            Capability::RecordAttendance
            | Capability::RecordBehavior
            | Capability::EnterGrades
            | Capability::PostHomework
            | Capability::SendMessages
            | Capability::ViewRoster
            | Capability::ExportSheets => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    UserNotFound,
    InvalidPassword,
    StoreUnavailable(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::UserNotFound => "user_not_found",
            AuthError::InvalidPassword => "invalid_password",
            AuthError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AuthError::UserNotFound => write!(f, "no user with that username"),
            AuthError::InvalidPassword => write!(f, "password does not match"),
            AuthError::StoreUnavailable(e) => write!(f, "user store unavailable: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

/// Unsalted single-pass SHA-256, hex-encoded. This is how the old
/// spreadsheet stored every password; kept only so those rows still
/// verify. New credentials go through `hash_password`.
pub fn digest(plaintext: &str) -> String {
    let out = Sha256::digest(plaintext.as_bytes());
    let mut hex = String::with_capacity(out.len() * 2);
    for b in out {
        let _ = write!(hex, "{:02x}", b);
    }
    hex
}

/// Salted Argon2 hash in PHC string form, for newly created users.
pub fn hash_password(plaintext: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// True iff `plaintext` matches the stored credential, whichever format
/// the row holds.
pub fn verify_password(plaintext: &str, stored: &str) -> bool {
    if stored.starts_with("$argon2") {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        return Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok();
    }
    digest(plaintext) == stored
}

/// Snapshot of one `Users` row, copied into the session at login.
#[derive(Debug, Clone)]
pub struct StaffRecord {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub name: String,
    pub subjects: Vec<String>,
}

impl StaffRecord {
    pub fn from_record(rec: &Record) -> Result<StaffRecord, String> {
        let username =
            store::field_str(rec, "Username").ok_or_else(|| "user row has no Username".to_string())?;
        let password_hash =
            store::field_str(rec, "Password").ok_or_else(|| "user row has no Password".to_string())?;
        let role: Role = store::field_str(rec, "Role")
            .ok_or_else(|| "user row has no Role".to_string())?
            .parse()?;
        let name = store::field_str(rec, "Name").unwrap_or_else(|| username.clone());
        let subjects = store::field_str(rec, "Subjects")
            .map(|s| {
                s.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(StaffRecord {
            username,
            password_hash,
            role,
            name,
            subjects,
        })
    }

    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("Username".to_string(), self.username.clone().into());
        rec.insert("Password".to_string(), self.password_hash.clone().into());
        rec.insert("Role".to_string(), self.role.to_string().into());
        rec.insert("Name".to_string(), self.name.clone().into());
        rec.insert("Subjects".to_string(), self.subjects.join(", ").into());
        rec
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: StaffRecord,
    pub started_at: DateTime<Utc>,
}

impl Session {
    fn new(user: StaffRecord) -> Session {
        Session {
            token: Uuid::new_v4().to_string(),
            user,
            started_at: Utc::now(),
        }
    }
}

/// Check `username`/`plaintext` against the fetched `Users` rows and
/// return a fresh session on success. The first row in sheet order wins
/// when usernames repeat; rows after the match are never consulted.
pub fn authenticate(
    username: &str,
    plaintext: &str,
    records: &[Record],
) -> Result<Session, AuthError> {
    let rec = records
        .iter()
        .find(|r| store::field_str(r, "Username").as_deref() == Some(username))
        .ok_or(AuthError::UserNotFound)?;

    let user = StaffRecord::from_record(rec).map_err(AuthError::StoreUnavailable)?;

    if !verify_password(plaintext, &user.password_hash) {
        return Err(AuthError::InvalidPassword);
    }

    log::info!("login {} role={}", user.username, user.role);
    Ok(Session::new(user))
}

/// The live sessions, keyed by token. Lives for the life of the process;
/// logout is the only other way out.
pub struct SessionSet {
    sessions: HashMap<String, Session>,
}

impl SessionSet {
    pub fn new() -> SessionSet {
        SessionSet {
            sessions: HashMap::new(),
        }
    }

    pub fn insert(&mut self, session: Session) -> String {
        let token = session.token.clone();
        self.sessions.insert(token.clone(), session);
        token
    }

    pub fn get(&self, token: &str) -> Option<&Session> {
        self.sessions.get(token)
    }

    pub fn logout(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }
}
