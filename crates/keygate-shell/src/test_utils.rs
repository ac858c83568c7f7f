//! in-memory remote shell for tests.
//!
//! [`MemoryShell`] keeps one authorized_keys file per `host:port` and applies
//! the same idempotent add/remove semantics as the real scripts. faults can be
//! injected per host, per operation and per key.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use keygate_types::{PublicKey, Server};

use crate::{Error, KeyOperation, RemoteShell, Result, ShellSession};

/// one recorded `run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCall {
    /// `host:port` the command was sent to.
    pub address: String,
    /// operation requested.
    pub operation: KeyOperation,
    /// key line the operation targeted.
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultMode {
    /// exit non-zero.
    Fail,
    /// never complete.
    Hang,
}

#[derive(Debug, Clone)]
struct Fault {
    address: String,
    operation: KeyOperation,
    key: Option<String>,
    mode: FaultMode,
}

impl Fault {
    fn matches(&self, address: &str, operation: KeyOperation, key: &str) -> bool {
        self.address == address
            && self.operation == operation
            && self.key.as_deref().is_none_or(|k| k == key)
    }
}

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<String>>,
    unreachable: HashSet<String>,
    faults: Vec<Fault>,
    calls: Vec<ShellCall>,
    latency: Duration,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
    in_flight_total: usize,
    max_in_flight_total: usize,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    open_sessions: AtomicUsize,
    sessions_opened: AtomicUsize,
}

/// in-memory [`RemoteShell`]. clones share state.
#[derive(Clone, Default)]
pub struct MemoryShell {
    inner: Arc<Inner>,
}

impl MemoryShell {
    /// create an empty shell: every host is reachable with an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// current authorized_keys lines on `address`.
    pub fn authorized_keys(&self, address: &str) -> Vec<String> {
        self.state().files.get(address).cloned().unwrap_or_default()
    }

    /// whether `address` holds exactly the line `key`.
    pub fn has_key(&self, address: &str, key: &str) -> bool {
        self.authorized_keys(address).iter().any(|line| line == key)
    }

    /// replace the authorized_keys lines on `address`.
    pub fn set_authorized_keys(&self, address: &str, lines: Vec<String>) {
        self.state().files.insert(address.to_string(), lines);
    }

    /// make `open` fail for `address`.
    pub fn set_unreachable(&self, address: &str, unreachable: bool) {
        let mut state = self.state();
        if unreachable {
            state.unreachable.insert(address.to_string());
        } else {
            state.unreachable.remove(address);
        }
    }

    /// make every `operation` on `address` exit non-zero.
    pub fn fail_operation(&self, address: &str, operation: KeyOperation) {
        self.add_fault(address, operation, None, FaultMode::Fail);
    }

    /// make `operation` for one key on `address` exit non-zero.
    pub fn fail_key(&self, address: &str, operation: KeyOperation, key: &str) {
        self.add_fault(address, operation, Some(key), FaultMode::Fail);
    }

    /// make `operation` for one key on `address` never return.
    pub fn hang_key(&self, address: &str, operation: KeyOperation, key: &str) {
        self.add_fault(address, operation, Some(key), FaultMode::Hang);
    }

    /// make every `operation` on `address` never return.
    pub fn hang_operation(&self, address: &str, operation: KeyOperation) {
        self.add_fault(address, operation, None, FaultMode::Hang);
    }

    fn add_fault(&self, address: &str, operation: KeyOperation, key: Option<&str>, mode: FaultMode) {
        self.state().faults.push(Fault {
            address: address.to_string(),
            operation,
            key: key.map(str::to_string),
            mode,
        });
    }

    /// remove all injected faults.
    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.faults.clear();
        state.unreachable.clear();
    }

    /// delay applied to every `run` call.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// every `run` call so far, in order, including failed ones.
    pub fn calls(&self) -> Vec<ShellCall> {
        self.state().calls.clone()
    }

    /// sessions opened and not yet closed or dropped.
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    /// total sessions ever opened.
    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }

    /// highest number of commands observed running at once on `address`.
    pub fn max_in_flight(&self, address: &str) -> usize {
        self.state()
            .max_in_flight
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    /// highest number of commands observed running at once on any host.
    pub fn max_in_flight_total(&self) -> usize {
        self.state().max_in_flight_total
    }
}

impl RemoteShell for MemoryShell {
    type Session = MemorySession;

    async fn open(&self, server: &Server) -> Result<MemorySession> {
        let address = server.address();
        if self.state().unreachable.contains(&address) {
            return Err(Error::Connect {
                address,
                message: "connection refused".to_string(),
            });
        }

        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            shell: self.clone(),
            address,
        })
    }
}

/// session handed out by [`MemoryShell`]. releases its slot on drop.
pub struct MemorySession {
    shell: MemoryShell,
    address: String,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shell.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// tracks one running command; decrements the in-flight counters on drop so
/// cancelled commands are accounted for too.
struct InFlight<'a> {
    shell: &'a MemoryShell,
    address: &'a str,
}

impl<'a> InFlight<'a> {
    fn enter(shell: &'a MemoryShell, address: &'a str) -> Self {
        let mut state = shell.state();
        let current = state.in_flight.entry(address.to_string()).or_default();
        *current += 1;
        let current = *current;
        let max = state.max_in_flight.entry(address.to_string()).or_default();
        *max = (*max).max(current);
        state.in_flight_total += 1;
        state.max_in_flight_total = state.max_in_flight_total.max(state.in_flight_total);
        Self { shell, address }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.shell.state();
        if let Some(current) = state.in_flight.get_mut(self.address) {
            *current = current.saturating_sub(1);
        }
        state.in_flight_total = state.in_flight_total.saturating_sub(1);
    }
}

impl ShellSession for MemorySession {
    async fn run(&mut self, operation: KeyOperation, key: &PublicKey) -> Result<()> {
        let key = key.as_str().to_string();
        let (latency, fault) = {
            let mut state = self.shell.state();
            state.calls.push(ShellCall {
                address: self.address.clone(),
                operation,
                key: key.clone(),
            });
            let fault = state
                .faults
                .iter()
                .find(|f| f.matches(&self.address, operation, &key))
                .map(|f| f.mode);
            (state.latency, fault)
        };

        let _in_flight = InFlight::enter(&self.shell, &self.address);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match fault {
            Some(FaultMode::Fail) => {
                return Err(Error::Command {
                    exit_status: 1,
                    stderr: format!("injected {} failure", operation),
                });
            }
            Some(FaultMode::Hang) => std::future::pending::<()>().await,
            None => {}
        }

        let mut state = self.shell.state();
        let lines = state.files.entry(self.address.clone()).or_default();
        match operation {
            KeyOperation::AddKey => {
                if !lines.contains(&key) {
                    lines.push(key);
                }
            }
            KeyOperation::RemoveKey => lines.retain(|line| *line != key),
        }
        Ok(())
    }

    async fn close(self) {}
}
