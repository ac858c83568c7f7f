//! grant entity for database storage.

use chrono::{DateTime, Utc};
use sea_orm::Set;
use sea_orm::entity::prelude::*;

use keygate_types::{Grant, ServerId, UserId};

/// grant database model, keyed by `(user_id, server_id)`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "grants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub server_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::server::Entity",
        from = "Column::ServerId",
        to = "super::server::Column::Id"
    )]
    Server,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::server::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Server.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Grant {
    fn from(model: Model) -> Self {
        Grant {
            user_id: UserId(model.user_id as u64),
            server_id: ServerId(model.server_id as u64),
            created_at: model.created_at,
        }
    }
}

impl From<&Grant> for ActiveModel {
    fn from(grant: &Grant) -> Self {
        ActiveModel {
            user_id: Set(grant.user_id.0 as i64),
            server_id: Set(grant.server_id.0 as i64),
            created_at: Set(grant.created_at),
        }
    }
}
