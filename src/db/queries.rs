use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use serde::Serialize;

use super::{Database, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A user as returned to clients. The password column is never selected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: i64,
    pub is_active: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: i64,
}

/// Partial update of a user. Only fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<i64>,
    pub is_active: Option<i64>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }

    /// Column/value pairs for the fields that are set, in column order.
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut set = Vec::new();
        if let Some(name) = &self.name {
            set.push(("name", SqlValue::Text(name.clone())));
        }
        if let Some(email) = &self.email {
            set.push(("email", SqlValue::Text(email.clone())));
        }
        if let Some(role) = self.role {
            set.push(("role", SqlValue::Integer(role)));
        }
        if let Some(is_active) = self.is_active {
            set.push(("is_active", SqlValue::Integer(is_active)));
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(i64),
    DuplicateEmail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Done,
    NotFound,
}

const USER_COLUMNS: &str = "id, name, email, role, is_active, created_at, updated_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

// ---------------------------------------------------------------------------
// User queries
// ---------------------------------------------------------------------------

pub fn list_users(db: &Database) -> Result<Vec<UserRow>, DbError> {
    let conn = db.conn()?;
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
    let rows = stmt
        .query_map([], map_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_user(db: &Database, id: i64) -> Result<Option<UserRow>, DbError> {
    let conn = db.conn()?;
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_user,
        )
        .optional()?;
    Ok(user)
}

/// Insert a user unless the email is already taken.
///
/// The duplicate check and the insert run under one connection lock.
pub fn create_user(db: &Database, user: &NewUser) -> Result<CreateOutcome, DbError> {
    let conn = db.conn()?;
    let taken = conn
        .query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![user.email],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if taken {
        return Ok(CreateOutcome::DuplicateEmail);
    }

    conn.execute(
        "INSERT INTO users (name, email, password, role, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 1, datetime('now'), datetime('now'))",
        params![user.name, user.email, user.password, user.role],
    )?;
    Ok(CreateOutcome::Created(conn.last_insert_rowid()))
}

/// Apply `update` to user `id`. Callers must reject empty updates first.
pub fn update_user(db: &Database, id: i64, update: &UserUpdate) -> Result<WriteOutcome, DbError> {
    let conn = db.conn()?;
    if !user_exists(&conn, id)? {
        return Ok(WriteOutcome::NotFound);
    }

    let (columns, mut values): (Vec<_>, Vec<_>) = update.assignments().into_iter().unzip();
    let mut set: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| format!("{column} = ?{}", idx + 1))
        .collect();
    set.push("updated_at = datetime('now')".to_string());
    values.push(SqlValue::Integer(id));

    let sql = format!("UPDATE users SET {} WHERE id = ?{}", set.join(", "), values.len());
    conn.execute(&sql, params_from_iter(values))?;
    Ok(WriteOutcome::Done)
}

pub fn delete_user(db: &Database, id: i64) -> Result<WriteOutcome, DbError> {
    let conn = db.conn()?;
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Ok(WriteOutcome::NotFound);
    }
    Ok(WriteOutcome::Done)
}

fn user_exists(conn: &rusqlite::Connection, id: i64) -> Result<bool, DbError> {
    let found = conn
        .query_row("SELECT id FROM users WHERE id = ?1", params![id], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".to_string(),
            email: email.to_string(),
            password: "hunter2".to_string(),
            role: 1,
        }
    }

    #[test]
    fn create_rejects_duplicate_email_without_inserting() {
        let db = Database::open_in_memory().unwrap();
        let first = create_user(&db, &new_user("ada@example.com")).unwrap();
        assert!(matches!(first, CreateOutcome::Created(_)));

        let second = create_user(&db, &new_user("ada@example.com")).unwrap();
        assert_eq!(second, CreateOutcome::DuplicateEmail);
        assert_eq!(list_users(&db).unwrap().len(), 1);
    }

    #[test]
    fn get_user_returns_none_for_unknown_id() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(get_user(&db, 99).unwrap(), None);

        let CreateOutcome::Created(id) = create_user(&db, &new_user("a@b.c")).unwrap() else {
            panic!("expected insert");
        };
        let user = get_user(&db, id).unwrap().unwrap();
        assert_eq!(user.email, "a@b.c");
        assert_eq!(user.is_active, 1);
        assert!(!user.created_at.is_empty());
    }

    #[test]
    fn update_writes_only_supplied_fields() {
        let db = Database::open_in_memory().unwrap();
        let CreateOutcome::Created(id) = create_user(&db, &new_user("a@b.c")).unwrap() else {
            panic!("expected insert");
        };

        let update = UserUpdate {
            role: Some(3),
            is_active: Some(0),
            ..Default::default()
        };
        assert_eq!(update_user(&db, id, &update).unwrap(), WriteOutcome::Done);

        let user = get_user(&db, id).unwrap().unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(user.role, 3);
        assert_eq!(user.is_active, 0);
    }

    #[test]
    fn update_and_delete_report_missing_users() {
        let db = Database::open_in_memory().unwrap();
        let update = UserUpdate {
            name: Some("Grace".into()),
            ..Default::default()
        };
        assert_eq!(update_user(&db, 7, &update).unwrap(), WriteOutcome::NotFound);
        assert_eq!(delete_user(&db, 7).unwrap(), WriteOutcome::NotFound);
    }

    #[test]
    fn delete_removes_the_row() {
        let db = Database::open_in_memory().unwrap();
        let CreateOutcome::Created(id) = create_user(&db, &new_user("a@b.c")).unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(delete_user(&db, id).unwrap(), WriteOutcome::Done);
        assert!(get_user(&db, id).unwrap().is_none());
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(UserUpdate::default().is_empty());
        assert!(
            !UserUpdate {
                is_active: Some(1),
                ..Default::default()
            }
            .is_empty()
        );
    }
}
