use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set, SqlErr,
};
use tracing::{debug, info};

use crate::credentials::CredentialRecord;
use crate::entities::users;

/// User row with its credential state decoded.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub credentials: CredentialRecord,
    pub lock_version: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<users::Model> for User {
    type Error = anyhow::Error;

    fn try_from(model: users::Model) -> Result<Self> {
        let activated_at = model
            .activated_at
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .with_context(|| format!("Invalid activated_at for user {}", model.id))
            })
            .transpose()?;

        Ok(Self {
            id: model.id,
            name: model.name,
            email: model.email,
            credentials: CredentialRecord {
                password_digest: model.password_digest,
                remember_digest: model.remember_digest,
                activation_digest: model.activation_digest,
                activated: model.activated,
                activated_at,
            },
            lock_version: model.lock_version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Data for a new row. `email` must already be normalized.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub credentials: CredentialRecord,
}

#[derive(Debug)]
pub enum InsertOutcome {
    Created(User),
    DuplicateEmail,
}

/// Columns to overwrite in one optimistic write. `None` leaves a column alone;
/// `remember_digest: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_digest: Option<String>,
    pub remember_digest: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The row changed (or vanished) since it was read.
    Stale,
    DuplicateEmail,
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        user.map(User::try_from).transpose()
    }

    /// Exact match; callers pass a normalized address.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        user.map(User::try_from).transpose()
    }

    pub async fn email_taken(&self, email: &str, except_id: Option<i32>) -> Result<bool> {
        let mut query = users::Entity::find().filter(users::Column::Email.eq(email));
        if let Some(id) = except_id {
            query = query.filter(users::Column::Id.ne(id));
        }

        let count = query
            .count(&self.conn)
            .await
            .context("Failed to check email uniqueness")?;

        Ok(count > 0)
    }

    pub async fn insert(&self, new_user: NewUser) -> Result<InsertOutcome> {
        let now = Utc::now().to_rfc3339();
        let credentials = new_user.credentials;

        let active = users::ActiveModel {
            name: Set(new_user.name),
            email: Set(new_user.email),
            password_digest: Set(credentials.password_digest),
            remember_digest: Set(credentials.remember_digest),
            activation_digest: Set(credentials.activation_digest),
            activated: Set(credentials.activated),
            activated_at: Set(credentials.activated_at.map(|at| at.to_rfc3339())),
            lock_version: Set(0),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        match active.insert(&self.conn).await {
            Ok(model) => {
                info!(user_id = model.id, "Created user");
                Ok(InsertOutcome::Created(User::try_from(model)?))
            }
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::DuplicateEmail),
            Err(e) => Err(e).context("Failed to insert user"),
        }
    }

    /// Apply `changes` only if the row still carries `expected_version`.
    pub async fn update(
        &self,
        id: i32,
        expected_version: i32,
        changes: UserChanges,
    ) -> Result<UpdateOutcome> {
        let now = Utc::now().to_rfc3339();

        let mut update = users::Entity::update_many()
            .col_expr(
                users::Column::LockVersion,
                Expr::col(users::Column::LockVersion).add(1),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::LockVersion.eq(expected_version));

        if let Some(name) = changes.name {
            update = update.col_expr(users::Column::Name, Expr::value(name));
        }
        if let Some(email) = changes.email {
            update = update.col_expr(users::Column::Email, Expr::value(email));
        }
        if let Some(digest) = changes.password_digest {
            update = update.col_expr(users::Column::PasswordDigest, Expr::value(digest));
        }
        if let Some(digest) = changes.remember_digest {
            update = update.col_expr(users::Column::RememberDigest, Expr::value(digest));
        }

        match update.exec(&self.conn).await {
            Ok(res) if res.rows_affected == 0 => {
                debug!(user_id = id, expected_version, "Stale user write");
                Ok(UpdateOutcome::Stale)
            }
            Ok(_) => Ok(UpdateOutcome::Updated),
            Err(e) if is_unique_violation(&e) => Ok(UpdateOutcome::DuplicateEmail),
            Err(e) => Err(e).context("Failed to update user"),
        }
    }

    /// Set `activated` and `activated_at` in a single statement.
    ///
    /// Returns `false` when the row was already activated or changed since
    /// `expected_version` was read.
    pub async fn activate(
        &self,
        id: i32,
        expected_version: i32,
        activated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let res = users::Entity::update_many()
            .col_expr(users::Column::Activated, Expr::value(true))
            .col_expr(
                users::Column::ActivatedAt,
                Expr::value(activated_at.to_rfc3339()),
            )
            .col_expr(
                users::Column::LockVersion,
                Expr::col(users::Column::LockVersion).add(1),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now().to_rfc3339()))
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::LockVersion.eq(expected_version))
            .filter(users::Column::Activated.eq(false))
            .exec(&self.conn)
            .await
            .context("Failed to activate user")?;

        Ok(res.rows_affected == 1)
    }
}
