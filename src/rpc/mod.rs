//! Message-bus RPC fabric used to reach the winbind broker
//!
//! Models the in-process message fabric: services register under a logical
//! endpoint name, callers resolve a binding handle by name and dispatch
//! typed calls with a per-call deadline.

use crate::error::{Error, NtStatus, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Logon request level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum LogonLevel {
    /// Interactive logon carrying hashed secrets
    Interactive = 1,
    /// Network logon carrying a challenge/response pair
    Network = 2,
}

impl TryFrom<u16> for LogonLevel {
    type Error = Error;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(LogonLevel::Interactive),
            2 => Ok(LogonLevel::Network),
            _ => Err(Error::Status(NtStatus::INVALID_PARAMETER)),
        }
    }
}

/// Validation level requested from, and returned by, the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ValidationLevel {
    /// netr_SamInfo3-shaped validation
    Sam3 = 3,
    /// netr_SamInfo6-shaped validation
    Sam6 = 6,
}

impl TryFrom<u16> for ValidationLevel {
    type Error = Error;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        match value {
            3 => Ok(ValidationLevel::Sam3),
            6 => Ok(ValidationLevel::Sam6),
            _ => Err(Error::Status(NtStatus::INVALID_PARAMETER)),
        }
    }
}

/// Identity block shared by both logon payload shapes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityInfo {
    pub domain_name: String,
    pub account_name: String,
    pub workstation: String,
    /// MSV1_0 parameter-control bits, passed through from the caller
    pub parameter_control: u32,
    pub logon_id_low: u32,
    pub logon_id_high: u32,
}

/// Interactive logon payload: the two one-way-function hashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordInfo {
    pub identity: IdentityInfo,
    pub lm_password: [u8; 16],
    pub nt_password: [u8; 16],
}

/// Network logon payload: server challenge plus the client's responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub identity: IdentityInfo,
    pub challenge: [u8; 8],
    pub lm: Bytes,
    pub nt: Bytes,
}

/// Level-tagged logon payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogonPayload {
    Password(PasswordInfo),
    Network(NetworkInfo),
}

impl LogonPayload {
    pub fn identity(&self) -> &IdentityInfo {
        match self {
            LogonPayload::Password(info) => &info.identity,
            LogonPayload::Network(info) => &info.identity,
        }
    }

    pub fn level(&self) -> LogonLevel {
        match self {
            LogonPayload::Password(_) => LogonLevel::Interactive,
            LogonPayload::Network(_) => LogonLevel::Network,
        }
    }
}

/// SamLogon request as dispatched to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamLogonRequest {
    pub logon_level: LogonLevel,
    pub logon: LogonPayload,
    pub validation_level: ValidationLevel,
}

/// Security identifier in S-1-... string form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sid(String);

impl Sid {
    pub fn new<S: Into<String>>(sid: S) -> Self {
        Sid(sid.into())
    }

    /// Compose a SID from a domain SID and a relative identifier
    pub fn with_rid(&self, rid: u32) -> Sid {
        Sid(format!("{}-{}", self.0, rid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Group membership entry: relative identifier plus attribute bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMembership {
    pub rid: u32,
    pub attributes: u32,
}

/// Base validation block common to both validation shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamBaseInfo {
    pub account_name: String,
    pub full_name: String,
    pub logon_domain: String,
    pub domain_sid: Sid,
    pub rid: u32,
    pub primary_gid: u32,
    pub groups: Vec<GroupMembership>,
    pub user_flags: u32,
    pub session_key: Option<[u8; 16]>,
    pub logon_count: u16,
    pub bad_password_count: u16,
}

/// Level-3 validation payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamInfo3 {
    pub base: SamBaseInfo,
    /// Extra SIDs with their attribute bits
    pub sids: Vec<(Sid, u32)>,
}

/// Level-6 validation payload: level 3 plus principal naming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamInfo6 {
    pub base: SamBaseInfo,
    pub sids: Vec<(Sid, u32)>,
    pub dns_domain_name: String,
    pub principal_name: String,
}

/// Validation payload tagged by level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Sam3(SamInfo3),
    Sam6(SamInfo6),
}

impl Validation {
    pub fn level(&self) -> ValidationLevel {
        match self {
            Validation::Sam3(_) => ValidationLevel::Sam3,
            Validation::Sam6(_) => ValidationLevel::Sam6,
        }
    }
}

/// SamLogon response envelope from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamLogonResponse {
    /// Application-layer result of the credential check
    pub result: NtStatus,
    /// Whether this broker definitively ruled on the credential
    pub authoritative: bool,
    /// Validation payload, present on success
    pub validation: Option<Validation>,
}

/// Service endpoint reachable through the fabric
#[async_trait::async_trait]
pub trait SamLogonService: Send + Sync {
    /// Verify a credential, returning the response envelope.
    ///
    /// Errors are transport-level; an authentication verdict, including a
    /// failed one, is carried inside the envelope.
    async fn sam_logon(&self, req: &SamLogonRequest) -> Result<SamLogonResponse>;
}

/// Default per-call deadline when the caller sets none
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Binding handle addressed to one logical endpoint
pub struct BindingHandle {
    service: Arc<dyn SamLogonService>,
    timeout: Duration,
}

impl BindingHandle {
    fn new(service: Arc<dyn SamLogonService>) -> Self {
        Self {
            service,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the per-call deadline
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Dispatch a SamLogon call, honoring the per-call deadline
    pub async fn sam_logon(&self, req: &SamLogonRequest) -> Result<SamLogonResponse> {
        match tokio::time::timeout(self.timeout, self.service.sam_logon(req)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }
}

/// Per-event-context messaging client
///
/// Endpoints are registered at startup; lookups afterwards are read-only.
#[derive(Default)]
pub struct MessagingContext {
    endpoints: HashMap<String, Arc<dyn SamLogonService>>,
}

impl MessagingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under a logical endpoint name
    pub fn register_endpoint<S: Into<String>>(&mut self, name: S, service: Arc<dyn SamLogonService>) {
        self.endpoints.insert(name.into(), service);
    }

    /// Resolve a binding handle by logical endpoint name
    pub fn binding_handle(&self, name: &str) -> Option<BindingHandle> {
        self.endpoints
            .get(name)
            .map(|service| BindingHandle::new(Arc::clone(service)))
    }
}
