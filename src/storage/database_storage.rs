use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbErr, EntityTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
};

use crate::container_management::types::ContainerStatus;
use crate::error_handling::types::StorageError;
use crate::storage::db_entities::{containers, users};
use crate::storage::storage_trait::ContainerStore;
use crate::storage::types::{ContainerRecord, NewUser, RecordPhase, User};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS containers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        runtime_id TEXT,
        name TEXT NOT NULL UNIQUE,
        port INTEGER NOT NULL,
        status TEXT NOT NULL,
        phase TEXT NOT NULL,
        owner_id INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY(owner_id) REFERENCES users(id)
    );",
    // Only live records hold their port.
    "CREATE UNIQUE INDEX IF NOT EXISTS containers_live_port
        ON containers(port) WHERE status <> 'removed';",
];

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StorageError::ReadFailed(format!("bad timestamp {}: {}", raw, e)))
}

fn into_user(model: users::Model) -> Result<User, StorageError> {
    Ok(User {
        id: model.id,
        created_at: parse_timestamp(&model.created_at)?,
        username: model.username,
        email: model.email,
        password_hash: model.password_hash,
    })
}

fn into_record(model: containers::Model) -> Result<ContainerRecord, StorageError> {
    let port = u16::try_from(model.port)
        .map_err(|_| StorageError::ReadFailed(format!("bad port {}", model.port)))?;
    let phase = RecordPhase::parse(&model.phase)
        .ok_or_else(|| StorageError::ReadFailed(format!("bad phase {}", model.phase)))?;
    let status = model.status.parse().unwrap_or(ContainerStatus::Unknown);
    Ok(ContainerRecord {
        id: model.id,
        created_at: parse_timestamp(&model.created_at)?,
        runtime_id: model.runtime_id,
        name: model.name,
        port,
        status,
        owner_id: model.owner_id,
        phase,
    })
}

fn read_err(err: DbErr) -> StorageError {
    StorageError::ReadFailed(err.to_string())
}

fn write_err(err: DbErr) -> StorageError {
    StorageError::WriteFailed(err.to_string())
}

/// Maps a failed container insert or update onto the conflict it reports.
fn container_conflict(err: DbErr, name: &str, port: u16) -> StorageError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains("containers.name") => {
            StorageError::NameTaken(name.to_string())
        }
        Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains("containers.port") => {
            StorageError::PortTaken(port)
        }
        _ => write_err(err),
    }
}

fn user_conflict(err: DbErr, user: &NewUser) -> StorageError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains("users.username") => {
            StorageError::UsernameTaken(user.username.clone())
        }
        Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains("users.email") => {
            StorageError::EmailTaken(user.email.clone())
        }
        _ => write_err(err),
    }
}

/// SQLite-backed [`ContainerStore`] built on SeaORM.
pub struct DatabaseStorage {
    db: DatabaseConnection,
}

impl DatabaseStorage {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
            }
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(5).sqlx_logging(false);
        let db = Database::connect(opts)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        for statement in SCHEMA {
            db.execute_unprepared(statement).await.map_err(write_err)?;
        }
        info!("Opened container database at {}", path.display());
        Ok(Self { db })
    }

    async fn find_record(&self, id: i64) -> Result<containers::Model, StorageError> {
        containers::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(read_err)?
            .ok_or(StorageError::NotFound(id))
    }
}

#[async_trait]
impl ContainerStore for DatabaseStorage {
    async fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        let model = users::ActiveModel {
            id: NotSet,
            username: Set(user.username.clone()),
            email: Set(user.email.clone()),
            password_hash: Set(user.password_hash.clone()),
            created_at: Set(Utc::now().to_rfc3339()),
        }
        .insert(&self.db)
        .await
        .map_err(|e| user_conflict(e, &user))?;
        into_user(model)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(read_err)?
            .map(into_user)
            .transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await
            .map_err(read_err)?
            .map(into_user)
            .transpose()
    }

    async fn occupied_ports(&self) -> Result<HashSet<u16>, StorageError> {
        let rows = containers::Entity::find()
            .filter(containers::Column::Status.ne(ContainerStatus::Removed.as_str()))
            .all(&self.db)
            .await
            .map_err(read_err)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| u16::try_from(row.port).ok())
            .collect())
    }

    async fn reserve(
        &self,
        owner_id: i64,
        name: &str,
        port: u16,
    ) -> Result<ContainerRecord, StorageError> {
        let model = containers::ActiveModel {
            id: NotSet,
            runtime_id: Set(None),
            name: Set(name.to_string()),
            port: Set(i32::from(port)),
            status: Set(ContainerStatus::Unknown.as_str().to_string()),
            phase: Set(RecordPhase::Reserved.as_str().to_string()),
            owner_id: Set(owner_id),
            created_at: Set(Utc::now().to_rfc3339()),
        }
        .insert(&self.db)
        .await
        .map_err(|e| container_conflict(e, name, port))?;
        debug!("Reserved port {} for {} (record {})", port, name, model.id);
        into_record(model)
    }

    async fn commit_reservation(
        &self,
        id: i64,
        runtime_id: &str,
        status: ContainerStatus,
    ) -> Result<ContainerRecord, StorageError> {
        let existing = self.find_record(id).await?;
        let (name, port) = (existing.name.clone(), existing.port);
        let mut active: containers::ActiveModel = existing.into();
        active.runtime_id = Set(Some(runtime_id.to_string()));
        active.status = Set(status.as_str().to_string());
        active.phase = Set(RecordPhase::Committed.as_str().to_string());
        let model = active
            .update(&self.db)
            .await
            .map_err(|e| container_conflict(e, &name, port as u16))?;
        into_record(model)
    }

    async fn release_reservation(&self, id: i64) -> Result<(), StorageError> {
        containers::Entity::delete_many()
            .filter(containers::Column::Id.eq(id))
            .filter(containers::Column::Phase.eq(RecordPhase::Reserved.as_str()))
            .exec(&self.db)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn reservations(&self) -> Result<Vec<ContainerRecord>, StorageError> {
        containers::Entity::find()
            .filter(containers::Column::Phase.eq(RecordPhase::Reserved.as_str()))
            .order_by_asc(containers::Column::Id)
            .all(&self.db)
            .await
            .map_err(read_err)?
            .into_iter()
            .map(into_record)
            .collect()
    }

    async fn get_container(&self, id: i64) -> Result<Option<ContainerRecord>, StorageError> {
        containers::Entity::find_by_id(id)
            .filter(containers::Column::Phase.eq(RecordPhase::Committed.as_str()))
            .one(&self.db)
            .await
            .map_err(read_err)?
            .map(into_record)
            .transpose()
    }

    async fn list_containers(&self, owner_id: i64) -> Result<Vec<ContainerRecord>, StorageError> {
        containers::Entity::find()
            .filter(containers::Column::OwnerId.eq(owner_id))
            .filter(containers::Column::Phase.eq(RecordPhase::Committed.as_str()))
            .order_by_asc(containers::Column::Id)
            .all(&self.db)
            .await
            .map_err(read_err)?
            .into_iter()
            .map(into_record)
            .collect()
    }

    async fn count_containers(&self, owner_id: i64) -> Result<usize, StorageError> {
        let count = containers::Entity::find()
            .filter(containers::Column::OwnerId.eq(owner_id))
            .count(&self.db)
            .await
            .map_err(read_err)?;
        Ok(count as usize)
    }

    async fn name_exists(&self, name: &str) -> Result<bool, StorageError> {
        let count = containers::Entity::find()
            .filter(containers::Column::Name.eq(name))
            .count(&self.db)
            .await
            .map_err(read_err)?;
        Ok(count > 0)
    }

    async fn update_status(&self, id: i64, status: ContainerStatus) -> Result<(), StorageError> {
        let existing = self.find_record(id).await?;
        let (name, port) = (existing.name.clone(), existing.port);
        let result = containers::Entity::update_many()
            .col_expr(containers::Column::Status, Expr::value(status.as_str()))
            .filter(containers::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| container_conflict(e, &name, port as u16))?;
        if result.rows_affected == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    async fn delete_container(&self, id: i64) -> Result<(), StorageError> {
        containers::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}
