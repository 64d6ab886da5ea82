use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    /// Always stored lower-cased
    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password digest
    pub password_digest: String,

    /// Digest of the current remember token, if any
    pub remember_digest: Option<String>,

    pub activation_digest: String,

    pub activated: bool,

    pub activated_at: Option<String>,

    /// Bumped on every write; guards against lost updates.
    pub lock_version: i32,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
