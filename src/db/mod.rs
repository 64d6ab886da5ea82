use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::user::{InsertOutcome, NewUser, UpdateOutcome, User, UserChanges};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");
        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // every pooled connection to an in-memory database is its own database
        let max_connections = if in_memory { 1 } else { max_connections };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections.min(max_connections))
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn email_taken(&self, email: &str, except_id: Option<i32>) -> Result<bool> {
        self.user_repo().email_taken(email, except_id).await
    }

    pub async fn insert_user(&self, user: NewUser) -> Result<InsertOutcome> {
        self.user_repo().insert(user).await
    }

    pub async fn update_user(
        &self,
        id: i32,
        expected_version: i32,
        changes: UserChanges,
    ) -> Result<UpdateOutcome> {
        self.user_repo().update(id, expected_version, changes).await
    }

    pub async fn activate_user(
        &self,
        id: i32,
        expected_version: i32,
        activated_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.user_repo()
            .activate(id, expected_version, activated_at)
            .await
    }
}
