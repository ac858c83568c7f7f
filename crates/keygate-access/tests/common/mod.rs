//! shared fixtures for access integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use keygate_access::AccessOrchestrator;
use keygate_db::{Database, Error, KeygateDb, Result};
use keygate_shell::test_utils::MemoryShell;
use keygate_types::{Grant, GrantKey, Server, ServerId, User, UserId};

/// session timeout used by the harness; hung operations fail after this.
pub const SESSION_TIMEOUT: Duration = Duration::from_millis(500);

/// switches and counters for [`FaultyDb`].
#[derive(Default)]
pub struct Faults {
    /// `create_grant` fails with a conflict.
    pub fail_create_grant: AtomicBool,
    /// `delete_grant` fails with a database error.
    pub fail_delete_grant: AtomicBool,
    /// grant deleted from the store right after the next grant listing
    /// returns it, as if revoked concurrently.
    pub vanish_after_listing: Mutex<Option<GrantKey>>,
    /// every store call made through the wrapper.
    pub calls: AtomicUsize,
}

/// directory store wrapper that can fail grant writes on demand.
#[derive(Clone)]
pub struct FaultyDb {
    inner: KeygateDb,
    pub faults: Arc<Faults>,
}

impl FaultyDb {
    pub fn calls(&self) -> usize {
        self.faults.calls.load(Ordering::SeqCst)
    }

    pub fn fail_create_grant(&self, fail: bool) {
        self.faults.fail_create_grant.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_grant(&self, fail: bool) {
        self.faults.fail_delete_grant.store(fail, Ordering::SeqCst);
    }

    pub fn vanish_after_listing(&self, key: GrantKey) {
        *self.faults.vanish_after_listing.lock().unwrap() = Some(key);
    }

    async fn vanish_listed(&self, grants: &[Grant]) -> Result<()> {
        let pending = self.faults.vanish_after_listing.lock().unwrap().take();
        if let Some(key) = pending
            && grants.iter().any(|g| g.key() == key)
        {
            self.inner.delete_grant(key).await?;
        }
        Ok(())
    }

    fn count(&self) {
        self.faults.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Database for FaultyDb {
    async fn ping(&self) -> Result<()> {
        self.count();
        self.inner.ping().await
    }

    async fn create_user(&self, user: &User) -> Result<User> {
        self.count();
        self.inner.create_user(user).await
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        self.count();
        self.inner.get_user(id).await
    }

    async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        self.count();
        self.inner.get_user_by_name(name).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.count();
        self.inner.list_users().await
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        self.count();
        self.inner.delete_user(id).await
    }

    async fn create_server(&self, server: &Server) -> Result<Server> {
        self.count();
        self.inner.create_server(server).await
    }

    async fn get_server(&self, id: ServerId) -> Result<Server> {
        self.count();
        self.inner.get_server(id).await
    }

    async fn get_server_by_address(&self, host: &str, port: u16) -> Result<Option<Server>> {
        self.count();
        self.inner.get_server_by_address(host, port).await
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        self.count();
        self.inner.list_servers().await
    }

    async fn list_servers_for_user(&self, user_id: UserId) -> Result<Vec<Server>> {
        self.count();
        self.inner.list_servers_for_user(user_id).await
    }

    async fn delete_server(&self, id: ServerId) -> Result<()> {
        self.count();
        self.inner.delete_server(id).await
    }

    async fn create_grant(&self, grant: &Grant) -> Result<Grant> {
        self.count();
        if self.faults.fail_create_grant.load(Ordering::SeqCst) {
            return Err(Error::Conflict(format!("grant for {} already exists", grant.key())));
        }
        self.inner.create_grant(grant).await
    }

    async fn get_grant(&self, key: GrantKey) -> Result<Option<Grant>> {
        self.count();
        self.inner.get_grant(key).await
    }

    async fn list_grants_for_user(&self, user_id: UserId) -> Result<Vec<Grant>> {
        self.count();
        let grants = self.inner.list_grants_for_user(user_id).await?;
        self.vanish_listed(&grants).await?;
        Ok(grants)
    }

    async fn list_grants_for_server(&self, server_id: ServerId) -> Result<Vec<Grant>> {
        self.count();
        let grants = self.inner.list_grants_for_server(server_id).await?;
        self.vanish_listed(&grants).await?;
        Ok(grants)
    }

    async fn delete_grant(&self, key: GrantKey) -> Result<()> {
        self.count();
        if self.faults.fail_delete_grant.load(Ordering::SeqCst) {
            return Err(Error::Database("store unavailable".to_string()));
        }
        self.inner.delete_grant(key).await
    }
}

pub struct Harness {
    pub orchestrator: AccessOrchestrator<FaultyDb, MemoryShell>,
    pub db: FaultyDb,
    pub shell: MemoryShell,
}

pub async fn harness() -> Harness {
    let db = FaultyDb {
        inner: KeygateDb::new_in_memory().await.unwrap(),
        faults: Arc::new(Faults::default()),
    };
    let shell = MemoryShell::new();
    let orchestrator = AccessOrchestrator::new(db.clone(), shell.clone(), SESSION_TIMEOUT);
    Harness {
        orchestrator,
        db,
        shell,
    }
}

/// the key line stored for a fixture user.
pub fn key_for(name: &str) -> String {
    format!("ssh-ed25519 AAAAC3NzaC1lZDI1NTE5{} {}@laptop", name, name)
}

pub async fn add_user(db: &FaultyDb, name: &str) -> User {
    db.create_user(&User::new(UserId(0), name.to_string(), key_for(name)))
        .await
        .unwrap()
}

pub async fn add_server(db: &FaultyDb, host: &str) -> Server {
    db.create_server(&Server::new(ServerId(0), host.to_string(), 22))
        .await
        .unwrap()
}
