//! Local directory store used for role detection and account reconciliation

use crate::error::{Error, NtStatus, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tracing::debug;

/// Replication role of the local directory node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    /// Full replica; handles writes and trust resolution locally
    ReadWrite,
    /// Read-only replica; forwards write-requiring work to a full replica
    ReadOnly,
}

/// Distinguished name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dn(String);

impl Dn {
    pub fn new<S: Into<String>>(dn: S) -> Self {
        Dn(dn.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directory record for one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub dn: Dn,
    pub account_name: String,
    pub bad_password_count: u32,
    pub logon_count: u32,
}

/// Read-mostly handle onto the local directory
///
/// Each operation is a point-in-time read; no transaction is held across
/// suspension points.
pub trait DirectoryStore: Send + Sync {
    /// Replication role of this node
    fn server_role(&self) -> Result<ServerRole>;

    /// Default base DN for account searches, if the directory has one
    fn default_base_dn(&self) -> Option<Dn>;

    /// Look up an account record by short name under the given base DN
    fn search_account(&self, account_name: &str, base_dn: &Dn) -> Result<Option<AccountRecord>>;

    /// Crack a user-principal name into (NT4 domain, NT4 account)
    fn crack_upn(&self, upn: &str) -> Result<(String, String)>;

    /// Record a successful logon: reset bad-password counters, bump
    /// last-logon bookkeeping
    fn logon_success_accounting(
        &self,
        record: &AccountRecord,
        base_dn: &Dn,
        interactive: bool,
    ) -> Result<()>;
}

/// In-memory directory store
///
/// Backs the read-only-replica deployments used in tests and small setups;
/// accounts are keyed by lowercased short name.
pub struct MemoryDirectory {
    role: ServerRole,
    base_dn: Option<Dn>,
    domain: String,
    accounts: RwLock<HashMap<String, AccountRecord>>,
}

impl MemoryDirectory {
    pub fn new(role: ServerRole, base_dn: Option<Dn>, domain: &str) -> Self {
        Self {
            role,
            base_dn,
            domain: domain.to_string(),
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Add an account record
    pub fn add_account(&self, record: AccountRecord) {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.insert(record.account_name.to_lowercase(), record);
    }
}

impl DirectoryStore for MemoryDirectory {
    fn server_role(&self) -> Result<ServerRole> {
        Ok(self.role)
    }

    fn default_base_dn(&self) -> Option<Dn> {
        self.base_dn.clone()
    }

    fn search_account(&self, account_name: &str, _base_dn: &Dn) -> Result<Option<AccountRecord>> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        Ok(accounts.get(&account_name.to_lowercase()).cloned())
    }

    fn crack_upn(&self, upn: &str) -> Result<(String, String)> {
        let (account, domain) = upn
            .split_once('@')
            .ok_or(Error::Status(NtStatus::INVALID_PARAMETER))?;
        if account.is_empty() || domain.is_empty() {
            return Err(Error::Status(NtStatus::INVALID_PARAMETER));
        }
        // The NT4 domain for the local realm is the configured short name;
        // foreign realms come back as-is for the caller to reject.
        let nt4_domain = if domain.eq_ignore_ascii_case(&self.domain)
            || domain
                .split_once('.')
                .is_some_and(|(label, _)| label.eq_ignore_ascii_case(&self.domain))
        {
            self.domain.clone()
        } else {
            domain.to_string()
        };
        Ok((nt4_domain.to_uppercase(), account.to_string()))
    }

    fn logon_success_accounting(
        &self,
        record: &AccountRecord,
        _base_dn: &Dn,
        interactive: bool,
    ) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        let key = record.account_name.to_lowercase();
        let stored = accounts
            .get_mut(&key)
            .ok_or(Error::Status(NtStatus::NO_SUCH_USER))?;
        stored.bad_password_count = 0;
        stored.logon_count = stored.logon_count.saturating_add(1);
        debug!(
            account = %record.account_name,
            interactive,
            "recorded successful logon"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryDirectory {
        let dir = MemoryDirectory::new(
            ServerRole::ReadOnly,
            Some(Dn::new("DC=corp,DC=example")),
            "CORP",
        );
        dir.add_account(AccountRecord {
            dn: Dn::new("CN=alice,DC=corp,DC=example"),
            account_name: "alice".into(),
            bad_password_count: 3,
            logon_count: 7,
        });
        dir
    }

    #[test]
    fn test_search_account() {
        let dir = store();
        let base = dir.default_base_dn().unwrap();
        let found = dir.search_account("Alice", &base).unwrap();
        assert_eq!(found.unwrap().account_name, "alice");
        assert!(dir.search_account("bob", &base).unwrap().is_none());
    }

    #[test]
    fn test_crack_upn() {
        let dir = store();
        let (domain, account) = dir.crack_upn("alice@corp.example").unwrap();
        assert_eq!(domain, "CORP");
        assert_eq!(account, "alice");

        let (domain, _) = dir.crack_upn("bob@other.example").unwrap();
        assert_eq!(domain, "OTHER.EXAMPLE");

        assert!(dir.crack_upn("no-at-sign").is_err());
        assert!(dir.crack_upn("@corp.example").is_err());
    }

    #[test]
    fn test_logon_success_accounting() {
        let dir = store();
        let base = dir.default_base_dn().unwrap();
        let record = dir.search_account("alice", &base).unwrap().unwrap();

        dir.logon_success_accounting(&record, &base, true).unwrap();

        let updated = dir.search_account("alice", &base).unwrap().unwrap();
        assert_eq!(updated.bad_password_count, 0);
        assert_eq!(updated.logon_count, 8);
    }
}
