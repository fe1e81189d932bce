//! Authentication framework seam: backend contract, per-attempt handle,
//! and the process-wide backend registry

pub mod crypto;
pub mod reply;
pub mod user_info;
pub mod wbclient;
pub mod winbind;


use crate::directory::DirectoryStore;
use crate::error::{Error, NtStatus, Result};
use crate::rpc::MessagingContext;
use reply::UserInfoDc;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use user_info::UserSuppliedInfo;

/// Outcome of a backend's eligibility check
///
/// Distinct from authentication failure: `NotApplicable` tells the
/// framework to keep trying other backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// This backend will rule on the logon attempt
    Eligible,
    /// This backend cannot address the attempt; try another
    NotApplicable,
}

/// Server configuration visible to the backends
#[derive(Debug, Clone)]
pub struct Config {
    /// NetBIOS short domain name
    pub domain: String,
    /// DNS realm
    pub realm: String,
}

impl Config {
    pub fn new<D: Into<String>, R: Into<String>>(domain: D, realm: R) -> Self {
        Self {
            domain: domain.into(),
            realm: realm.into(),
        }
    }

    /// Whether the given name refers to the local domain (short or DNS form)
    pub fn is_my_domain(&self, domain: &str) -> bool {
        domain.eq_ignore_ascii_case(&self.domain) || domain.eq_ignore_ascii_case(&self.realm)
    }
}

/// Framework-supplied context shared by all backends on one event context
pub struct AuthContext {
    config: Arc<Config>,
    sam_ctx: Option<Arc<dyn DirectoryStore>>,
    msg_ctx: Option<Arc<MessagingContext>>,
    challenge: [u8; 8],
}

impl AuthContext {
    /// Build a context with a freshly generated server challenge
    pub fn new(
        config: Arc<Config>,
        sam_ctx: Option<Arc<dyn DirectoryStore>>,
        msg_ctx: Option<Arc<MessagingContext>>,
    ) -> Self {
        Self {
            config,
            sam_ctx,
            msg_ctx,
            challenge: crypto::generate_challenge(),
        }
    }

    /// Replace the server challenge with a caller-chosen one
    pub fn with_challenge(mut self, challenge: [u8; 8]) -> Self {
        self.challenge = challenge;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Local directory handle, absent on hosts without a directory
    pub fn directory(&self) -> Option<&Arc<dyn DirectoryStore>> {
        self.sam_ctx.as_ref()
    }

    /// Messaging client bound to this event context
    pub fn messaging(&self) -> Result<Arc<MessagingContext>> {
        self.msg_ctx
            .as_ref()
            .cloned()
            .ok_or(Error::Status(NtStatus::INVALID_SERVER_STATE))
    }

    /// The 8-byte server challenge for this authentication context
    pub fn get_challenge(&self) -> Result<[u8; 8]> {
        Ok(self.challenge)
    }
}

type LogonFuture = Pin<Box<dyn Future<Output = (Result<UserInfoDc>, bool)> + Send>>;

enum HandleState {
    Failed(Error),
    Pending(LogonFuture),
}

/// Per-attempt logon request state
///
/// Created by `check_password_send`, consumed by `recv`. Dropping the
/// handle before `recv` cancels the pending dispatch with no observable
/// side effects.
pub struct LogonHandle {
    state: HandleState,
}

impl LogonHandle {
    /// Handle that failed during submission; always authoritative
    pub fn failed<E: Into<Error>>(err: E) -> Self {
        Self {
            state: HandleState::Failed(err.into()),
        }
    }

    /// Handle awaiting the broker round-trip
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = (Result<UserInfoDc>, bool)> + Send + 'static,
    {
        Self {
            state: HandleState::Pending(Box::pin(fut)),
        }
    }

    /// Await completion, yielding the descriptor (or error) and the
    /// authoritative bit
    pub async fn recv(self) -> (Result<UserInfoDc>, bool) {
        match self.state {
            HandleState::Failed(err) => (Err(err), true),
            HandleState::Pending(fut) => fut.await,
        }
    }
}

/// One registered authentication backend
pub trait AuthBackend: Send + Sync {
    /// Stable registry name
    fn name(&self) -> &'static str;

    /// Whether this backend is eligible to rule on the attempt
    fn want_check(&self, ctx: &AuthContext, user_info: &UserSuppliedInfo) -> Eligibility;

    /// Submit the credential for verification
    fn check_password_send(
        &self,
        ctx: &Arc<AuthContext>,
        user_info: &UserSuppliedInfo,
    ) -> LogonHandle;
}

/// Process-wide backend registry
///
/// Populated at initialization, read-only afterwards.
#[derive(Default)]
pub struct AuthRegistry {
    backends: HashMap<&'static str, Arc<dyn AuthBackend>>,
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its stable name
    pub fn register(&mut self, backend: Arc<dyn AuthBackend>) -> Result<()> {
        let name = backend.name();
        if self.backends.contains_key(name) {
            return Err(Error::Registration(format!(
                "backend '{}' already registered",
                name
            )));
        }
        self.backends.insert(name, backend);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn AuthBackend>> {
        self.backends.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.backends.keys().copied()
    }
}
