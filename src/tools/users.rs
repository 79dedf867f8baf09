/// User Store Tools
///
/// CRUD over the SQLite user table. rusqlite is synchronous, so every query
/// runs on tokio's blocking pool and never holds the connection lock across
/// an await point.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::core::error::ToolError;
use crate::core::registry::{Arguments, RegistryError, ToolDescriptor, ToolHandler, ToolRegistry};
use crate::db::queries::{self, CreateOutcome, NewUser, UserUpdate, WriteOutcome};
use crate::db::{Database, DbError};
use crate::tools::{int_arg, required_int, required_str, str_arg};

pub const DEFAULT_ROLE: i64 = 1;

/// Names of the user tools, in catalog order.
pub const USER_TOOLS: [&str; 5] = [
    "get_all_users",
    "get_user_by_id",
    "create_user",
    "update_user",
    "delete_user",
];

pub fn register(registry: &mut ToolRegistry, db: &Arc<Database>) -> Result<(), RegistryError> {
    registry.register(
        ToolDescriptor::new(
            "get_all_users",
            "Get all users from the database. Returns a list of all users with their details.",
            json!({ "type": "object", "properties": {}, "required": [] }),
        ),
        Arc::new(GetAllUsers { db: db.clone() }),
    )?;

    registry.register(
        ToolDescriptor::new(
            "get_user_by_id",
            "Get a specific user by their ID.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer", "description": "The user ID to retrieve" }
                },
                "required": ["id"]
            }),
        ),
        Arc::new(GetUserById { db: db.clone() }),
    )?;

    registry.register(
        ToolDescriptor::new(
            "create_user",
            "Create a new user in the database.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "minLength": 1, "description": "Full name of the user" },
                    "email": { "type": "string", "minLength": 1, "description": "Email address of the user" },
                    "password": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Password for the user (will be stored as provided)"
                    },
                    "role": { "type": "integer", "description": "Role ID of the user (default: 1)" }
                },
                "required": ["name", "email", "password"]
            }),
        ),
        Arc::new(CreateUser { db: db.clone() }),
    )?;

    registry.register(
        ToolDescriptor::new(
            "update_user",
            "Update an existing user's information.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer", "description": "The user ID to update" },
                    "name": { "type": "string", "description": "New name for the user (optional)" },
                    "email": { "type": "string", "description": "New email for the user (optional)" },
                    "role": { "type": "integer", "description": "New role ID for the user (optional)" },
                    "is_active": {
                        "type": "integer",
                        "description": "Set user active status (0 or 1, optional)"
                    }
                },
                "required": ["id"]
            }),
        ),
        Arc::new(UpdateUser { db: db.clone() }),
    )?;

    registry.register(
        ToolDescriptor::new(
            "delete_user",
            "Delete a user from the database by their ID.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer", "description": "The user ID to delete" }
                },
                "required": ["id"]
            }),
        ),
        Arc::new(DeleteUser { db: db.clone() }),
    )
}

/// Run a store query on the blocking pool.
async fn blocking<T, F>(db: &Arc<Database>, query: F) -> Result<T, ToolError>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> Result<T, DbError> + Send + 'static,
{
    let db = Arc::clone(db);
    let outcome = tokio::task::spawn_blocking(move || query(&db))
        .await
        .map_err(|e| ToolError::Internal(format!("user store task failed: {e}")))?;
    Ok(outcome?)
}

struct GetAllUsers {
    db: Arc<Database>,
}

#[async_trait]
impl ToolHandler for GetAllUsers {
    async fn call(&self, _args: Arguments) -> Result<Value, ToolError> {
        let users = blocking(&self.db, queries::list_users).await?;
        Ok(json!({ "count": users.len(), "users": users }))
    }
}

struct GetUserById {
    db: Arc<Database>,
}

#[async_trait]
impl ToolHandler for GetUserById {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let id = required_int(&args, "id")?;
        match blocking(&self.db, move |db| queries::get_user(db, id)).await? {
            Some(user) => Ok(json!({ "user": user })),
            None => Err(ToolError::failed(format!("User with id {id} not found"))),
        }
    }
}

struct CreateUser {
    db: Arc<Database>,
}

#[async_trait]
impl ToolHandler for CreateUser {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let user = NewUser {
            name: required_str(&args, "name")?.to_string(),
            email: required_str(&args, "email")?.to_string(),
            password: required_str(&args, "password")?.to_string(),
            role: int_arg(&args, "role")?.unwrap_or(DEFAULT_ROLE),
        };
        let email = user.email.clone();

        match blocking(&self.db, move |db| queries::create_user(db, &user)).await? {
            CreateOutcome::Created(id) => {
                tracing::info!(id, "user created");
                Ok(json!({
                    "success": true,
                    "message": "User created successfully",
                    "id": id,
                }))
            }
            CreateOutcome::DuplicateEmail => Err(ToolError::failed(format!(
                "User with email {email} already exists"
            ))),
        }
    }
}

struct UpdateUser {
    db: Arc<Database>,
}

#[async_trait]
impl ToolHandler for UpdateUser {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let id = required_int(&args, "id")?;
        let update = UserUpdate {
            name: str_arg(&args, "name").map(str::to_string),
            email: str_arg(&args, "email").map(str::to_string),
            role: int_arg(&args, "role")?,
            is_active: int_arg(&args, "is_active")?,
        };
        if update.is_empty() {
            return Err(ToolError::failed(
                "No fields to update. Provide at least one of: name, email, role, is_active",
            ));
        }

        match blocking(&self.db, move |db| queries::update_user(db, id, &update)).await? {
            WriteOutcome::Done => Ok(json!({
                "success": true,
                "message": format!("User {id} updated successfully"),
            })),
            WriteOutcome::NotFound => Err(ToolError::failed(format!("User with id {id} not found"))),
        }
    }
}

struct DeleteUser {
    db: Arc<Database>,
}

#[async_trait]
impl ToolHandler for DeleteUser {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError> {
        let id = required_int(&args, "id")?;
        match blocking(&self.db, move |db| queries::delete_user(db, id)).await? {
            WriteOutcome::Done => Ok(json!({
                "success": true,
                "message": format!("User {id} deleted successfully"),
            })),
            WriteOutcome::NotFound => Err(ToolError::failed(format!("User with id {id} not found"))),
        }
    }
}
