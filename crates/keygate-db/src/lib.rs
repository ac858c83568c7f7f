//! directory store for keygate.
//!
//! this crate provides persistent storage for:
//! - Users
//! - Servers
//! - Grants (the `(user, server)` access relation)
//!
//! grant rows are never removed by the database on behalf of a user or server
//! delete: the foreign keys restrict, and [`Database::delete_user`] /
//! [`Database::delete_server`] refuse while grants remain. revoking the remote
//! key first is the caller's job.

#![warn(missing_docs)]

mod entity;
mod error;
mod migration;

pub use error::Error;

use std::future::Future;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database as SeaOrmDatabase,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait,
};
use sea_orm::sea_query::JoinType;
use sea_orm_migration::MigratorTrait;

use keygate_types::{Config, DatabaseConfig, Grant, GrantKey, Server, ServerId, User, UserId};

/// result type for database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// directory store operations.
///
/// lookups by id fail with [`Error::NotFound`] when the row is absent;
/// inserts fail with [`Error::Conflict`] on uniqueness violations.
pub trait Database: Send + Sync {
    // ─── Health Check ─────────────────────────────────────────────────────────

    /// ping the database to verify connectivity.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;

    // ─── User Operations ─────────────────────────────────────────────────────

    /// create a new user. returns the created user with its assigned id.
    fn create_user(&self, user: &User) -> impl Future<Output = Result<User>> + Send;

    /// get a user by id.
    fn get_user(&self, id: UserId) -> impl Future<Output = Result<User>> + Send;

    /// get a user by username. returns `None` if no such user exists.
    fn get_user_by_name(&self, name: &str) -> impl Future<Output = Result<Option<User>>> + Send;

    /// list all users ordered by id.
    fn list_users(&self) -> impl Future<Output = Result<Vec<User>>> + Send;

    /// delete a user. fails with a conflict while the user still has grants.
    fn delete_user(&self, id: UserId) -> impl Future<Output = Result<()>> + Send;

    // ─── Server Operations ───────────────────────────────────────────────────

    /// register a new server. returns the server with its assigned id.
    fn create_server(&self, server: &Server) -> impl Future<Output = Result<Server>> + Send;

    /// get a server by id.
    fn get_server(&self, id: ServerId) -> impl Future<Output = Result<Server>> + Send;

    /// get a server by host and port. returns `None` if not registered.
    fn get_server_by_address(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<Option<Server>>> + Send;

    /// list all servers ordered by id.
    fn list_servers(&self) -> impl Future<Output = Result<Vec<Server>>> + Send;

    /// list the servers a user holds grants on, ordered by id.
    fn list_servers_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Server>>> + Send;

    /// delete a server. fails with a conflict while grants against it remain.
    fn delete_server(&self, id: ServerId) -> impl Future<Output = Result<()>> + Send;

    // ─── Grant Operations ────────────────────────────────────────────────────

    /// record a grant. fails with a conflict if it already exists.
    fn create_grant(&self, grant: &Grant) -> impl Future<Output = Result<Grant>> + Send;

    /// get a grant by its key. returns `None` if absent.
    fn get_grant(&self, key: GrantKey) -> impl Future<Output = Result<Option<Grant>>> + Send;

    /// list a user's grants ordered by server id.
    fn list_grants_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Grant>>> + Send;

    /// list the grants against a server ordered by user id.
    fn list_grants_for_server(
        &self,
        server_id: ServerId,
    ) -> impl Future<Output = Result<Vec<Grant>>> + Send;

    /// delete a grant.
    fn delete_grant(&self, key: GrantKey) -> impl Future<Output = Result<()>> + Send;
}

/// the main database implementation using sea-orm.
#[derive(Clone)]
pub struct KeygateDb {
    conn: DatabaseConnection,
}

impl KeygateDb {
    /// create a new database connection from config and run migrations.
    pub async fn new(config: &Config) -> Result<Self> {
        let url = Self::build_connection_url(&config.database)?;
        let conn: DatabaseConnection = SeaOrmDatabase::connect(&url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    /// build a sea-orm compatible connection url from config.
    fn build_connection_url(config: &DatabaseConfig) -> Result<String> {
        match config.db_type.as_str() {
            "sqlite" => {
                let path = if config.connection_string.starts_with("sqlite:") {
                    config.connection_string.clone()
                } else {
                    format!("sqlite:{}", config.connection_string)
                };
                // ?mode=rwc creates the file if it doesn't exist
                if path.contains('?') {
                    Ok(path)
                } else {
                    Ok(format!("{}?mode=rwc", path))
                }
            }
            "postgres" | "postgresql" => Ok(config.connection_string.clone()),
            other => Err(Error::InvalidData(format!(
                "unsupported database type: {}",
                other
            ))),
        }
    }

    /// create an in-memory sqlite database for testing.
    pub async fn new_in_memory() -> Result<Self> {
        let conn: DatabaseConnection = SeaOrmDatabase::connect("sqlite::memory:")
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    /// run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        migration::Migrator::up(&self.conn, None)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;
        Ok(())
    }

    /// the underlying sea-orm connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// close the database connection.
    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        tracing::debug!("database connection closed");
        Ok(())
    }

    async fn count_grants_for_user(&self, user_id: UserId) -> Result<u64> {
        let count = entity::grant::Entity::find()
            .filter(entity::grant::Column::UserId.eq(user_id.0 as i64))
            .count(&self.conn)
            .await?;
        Ok(count)
    }

    async fn count_grants_for_server(&self, server_id: ServerId) -> Result<u64> {
        let count = entity::grant::Entity::find()
            .filter(entity::grant::Column::ServerId.eq(server_id.0 as i64))
            .count(&self.conn)
            .await?;
        Ok(count)
    }
}

impl Database for KeygateDb {
    // health check

    async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(())
    }

    // user operations

    async fn create_user(&self, user: &User) -> Result<User> {
        let model: entity::user::ActiveModel = user.into();
        let result = model.insert(&self.conn).await?;
        Ok(result.into())
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        entity::user::Entity::find_by_id(id.0 as i64)
            .one(&self.conn)
            .await?
            .map(Into::into)
            .ok_or_else(|| Error::NotFound(format!("user {}", id)))
    }

    async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let result = entity::user::Entity::find()
            .filter(entity::user::Column::Name.eq(name))
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let results = entity::user::Entity::find()
            .order_by_asc(entity::user::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        let remaining = self.count_grants_for_user(id).await?;
        if remaining > 0 {
            return Err(Error::Conflict(format!(
                "user {} still has {} grant(s)",
                id, remaining
            )));
        }

        let result = entity::user::Entity::delete_by_id(id.0 as i64)
            .exec(&self.conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(Error::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    // server operations

    async fn create_server(&self, server: &Server) -> Result<Server> {
        let model: entity::server::ActiveModel = server.into();
        let result = model.insert(&self.conn).await?;
        Ok(result.into())
    }

    async fn get_server(&self, id: ServerId) -> Result<Server> {
        entity::server::Entity::find_by_id(id.0 as i64)
            .one(&self.conn)
            .await?
            .map(Into::into)
            .ok_or_else(|| Error::NotFound(format!("server {}", id)))
    }

    async fn get_server_by_address(&self, host: &str, port: u16) -> Result<Option<Server>> {
        let result = entity::server::Entity::find()
            .filter(entity::server::Column::Host.eq(host))
            .filter(entity::server::Column::Port.eq(i32::from(port)))
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        let results = entity::server::Entity::find()
            .order_by_asc(entity::server::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn list_servers_for_user(&self, user_id: UserId) -> Result<Vec<Server>> {
        let results = entity::server::Entity::find()
            .join(JoinType::InnerJoin, entity::server::Relation::Grants.def())
            .filter(entity::grant::Column::UserId.eq(user_id.0 as i64))
            .order_by_asc(entity::server::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn delete_server(&self, id: ServerId) -> Result<()> {
        let remaining = self.count_grants_for_server(id).await?;
        if remaining > 0 {
            return Err(Error::Conflict(format!(
                "server {} still has {} grant(s)",
                id, remaining
            )));
        }

        let result = entity::server::Entity::delete_by_id(id.0 as i64)
            .exec(&self.conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(Error::NotFound(format!("server {}", id)));
        }
        Ok(())
    }

    // grant operations

    async fn create_grant(&self, grant: &Grant) -> Result<Grant> {
        let model: entity::grant::ActiveModel = grant.into();
        // composite key without auto-increment, so skip the last-insert-id lookup
        entity::grant::Entity::insert(model)
            .exec_without_returning(&self.conn)
            .await?;
        Ok(grant.clone())
    }

    async fn get_grant(&self, key: GrantKey) -> Result<Option<Grant>> {
        let result = entity::grant::Entity::find_by_id((key.user_id.0 as i64, key.server_id.0 as i64))
            .one(&self.conn)
            .await?;
        Ok(result.map(Into::into))
    }

    async fn list_grants_for_user(&self, user_id: UserId) -> Result<Vec<Grant>> {
        let results = entity::grant::Entity::find()
            .filter(entity::grant::Column::UserId.eq(user_id.0 as i64))
            .order_by_asc(entity::grant::Column::ServerId)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn list_grants_for_server(&self, server_id: ServerId) -> Result<Vec<Grant>> {
        let results = entity::grant::Entity::find()
            .filter(entity::grant::Column::ServerId.eq(server_id.0 as i64))
            .order_by_asc(entity::grant::Column::UserId)
            .all(&self.conn)
            .await?;
        Ok(results.into_iter().map(Into::into).collect())
    }

    async fn delete_grant(&self, key: GrantKey) -> Result<()> {
        let result = entity::grant::Entity::delete_by_id((key.user_id.0 as i64, key.server_id.0 as i64))
            .exec(&self.conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(Error::NotFound(format!("grant for {}", key)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_types::Credential;
    use secrecy::{ExposeSecret, SecretString};

    async fn setup_test_db() -> KeygateDb {
        KeygateDb::new_in_memory().await.unwrap()
    }

    fn alice() -> User {
        User::new(
            UserId(0),
            "alice".to_string(),
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 alice".to_string(),
        )
    }

    #[tokio::test]
    async fn test_ping() {
        let db = setup_test_db().await;
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_user_crud() {
        let db = setup_test_db().await;

        let created = db.create_user(&alice()).await.unwrap();
        assert!(created.id.0 > 0);

        let fetched = db.get_user(created.id).await.unwrap();
        assert_eq!(fetched.name, "alice");
        assert_eq!(fetched.public_key, "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 alice");

        let by_name = db.get_user_by_name("alice").await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(created.id));
        assert!(db.get_user_by_name("bob").await.unwrap().is_none());

        assert_eq!(db.list_users().await.unwrap().len(), 1);

        db.delete_user(created.id).await.unwrap();
        let err = db.get_user(created.id).await.unwrap_err();
        assert!(err.is_not_found());

        let err = db.delete_user(created.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let db = setup_test_db().await;
        db.create_user(&alice()).await.unwrap();

        let err = db.create_user(&alice()).await.unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err:?}");
    }

    #[tokio::test]
    async fn test_server_crud_and_credentials() {
        let db = setup_test_db().await;

        let mut server = Server::new(ServerId(0), "10.0.0.5".to_string(), 22);
        server.login = Some("root".to_string());
        server.credential = Credential::Password(SecretString::from("s3cret".to_string()));
        let created = db.create_server(&server).await.unwrap();

        let fetched = db.get_server(created.id).await.unwrap();
        assert_eq!(fetched.host, "10.0.0.5");
        assert_eq!(fetched.port, 22);
        assert_eq!(fetched.login.as_deref(), Some("root"));
        match fetched.credential {
            Credential::Password(p) => assert_eq!(p.expose_secret(), "s3cret"),
            other => panic!("expected password credential, got {other:?}"),
        }

        let gw = db
            .create_server(&Server::new(ServerId(0), "10.0.0.6".to_string(), 2222))
            .await
            .unwrap();
        assert!(matches!(
            db.get_server(gw.id).await.unwrap().credential,
            Credential::GatewayKey
        ));

        let found = db.get_server_by_address("10.0.0.6", 2222).await.unwrap();
        assert_eq!(found.map(|s| s.id), Some(gw.id));
        assert!(db.get_server_by_address("10.0.0.6", 22).await.unwrap().is_none());

        assert_eq!(db.list_servers().await.unwrap().len(), 2);

        db.delete_server(created.id).await.unwrap();
        assert!(db.get_server(created.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_address_is_conflict() {
        let db = setup_test_db().await;
        let server = Server::new(ServerId(0), "db1".to_string(), 22);
        db.create_server(&server).await.unwrap();

        let err = db.create_server(&server).await.unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err:?}");
    }

    #[tokio::test]
    async fn test_grant_crud() {
        let db = setup_test_db().await;
        let user = db.create_user(&alice()).await.unwrap();
        let s1 = db
            .create_server(&Server::new(ServerId(0), "s1".to_string(), 22))
            .await
            .unwrap();
        let s2 = db
            .create_server(&Server::new(ServerId(0), "s2".to_string(), 22))
            .await
            .unwrap();

        // insert in reverse order to check listing is ordered
        for server_id in [s2.id, s1.id] {
            db.create_grant(&Grant::new(GrantKey::new(user.id, server_id)))
                .await
                .unwrap();
        }

        let err = db
            .create_grant(&Grant::new(GrantKey::new(user.id, s1.id)))
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "duplicate grant should conflict: {err:?}");

        let grants = db.list_grants_for_user(user.id).await.unwrap();
        let servers: Vec<ServerId> = grants.iter().map(|g| g.server_id).collect();
        assert_eq!(servers, vec![s1.id, s2.id]);

        let reachable = db.list_servers_for_user(user.id).await.unwrap();
        assert_eq!(reachable.len(), 2);

        assert_eq!(db.list_grants_for_server(s2.id).await.unwrap().len(), 1);
        assert!(
            db.get_grant(GrantKey::new(user.id, s1.id))
                .await
                .unwrap()
                .is_some()
        );

        db.delete_grant(GrantKey::new(user.id, s1.id)).await.unwrap();
        let err = db
            .delete_grant(GrantKey::new(user.id, s1.id))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_refused_while_grants_remain() {
        let db = setup_test_db().await;
        let user = db.create_user(&alice()).await.unwrap();
        let server = db
            .create_server(&Server::new(ServerId(0), "db1".to_string(), 22))
            .await
            .unwrap();
        let key = GrantKey::new(user.id, server.id);
        db.create_grant(&Grant::new(key)).await.unwrap();

        assert!(db.delete_user(user.id).await.unwrap_err().is_conflict());
        assert!(db.delete_server(server.id).await.unwrap_err().is_conflict());

        // grant survives both attempts
        assert!(db.get_grant(key).await.unwrap().is_some());

        db.delete_grant(key).await.unwrap();
        db.delete_user(user.id).await.unwrap();
        db.delete_server(server.id).await.unwrap();
    }

    #[test]
    fn test_build_connection_url() {
        let sqlite = DatabaseConfig {
            db_type: "sqlite".to_string(),
            connection_string: "/tmp/keygate.sqlite".to_string(),
        };
        assert_eq!(
            KeygateDb::build_connection_url(&sqlite).unwrap(),
            "sqlite:/tmp/keygate.sqlite?mode=rwc"
        );

        let mysql = DatabaseConfig {
            db_type: "mysql".to_string(),
            connection_string: "mysql://localhost".to_string(),
        };
        assert!(KeygateDb::build_connection_url(&mysql).is_err());
    }
}
