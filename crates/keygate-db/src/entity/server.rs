//! server entity for database storage.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};
use secrecy::{ExposeSecret, SecretString};

use keygate_types::{Credential, Server, ServerId};

/// server database model.
///
/// a null `password` means the server is reached with the gateway key.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "servers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub host: String,
    pub port: i32,
    pub login: Option<String>,
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::grant::Entity")]
    Grants,
}

impl Related<super::grant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Grants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Server {
    fn from(model: Model) -> Self {
        let credential = match model.password {
            Some(password) => Credential::Password(SecretString::from(password)),
            None => Credential::GatewayKey,
        };

        Server {
            id: ServerId(model.id as u64),
            host: model.host,
            port: model.port as u16,
            login: model.login,
            credential,
            created_at: model.created_at,
        }
    }
}

impl From<&Server> for ActiveModel {
    fn from(server: &Server) -> Self {
        let password = match &server.credential {
            Credential::Password(secret) => Some(secret.expose_secret().to_string()),
            Credential::GatewayKey => None,
        };

        ActiveModel {
            id: if server.id.0 == 0 {
                NotSet
            } else {
                Set(server.id.0 as i64)
            },
            host: Set(server.host.clone()),
            port: Set(i32::from(server.port)),
            login: Set(server.login.clone()),
            password: Set(password),
            created_at: Set(server.created_at),
        }
    }
}
