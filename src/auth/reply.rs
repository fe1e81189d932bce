//! Conversion of broker validation payloads into the canonical
//! authenticated-user descriptor

use crate::error::{Error, NtStatus, Result};
use crate::rpc::{SamBaseInfo, Sid, Validation, ValidationLevel};

/// Canonical post-authentication descriptor consumed by the framework
///
/// Carries the resolved SIDs, group memberships and session attributes of
/// the authenticated subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfoDc {
    pub account_name: String,
    pub full_name: String,
    pub domain_name: String,
    /// User SID first, then primary group, then remaining memberships
    pub sids: Vec<Sid>,
    pub user_flags: u32,
    pub session_key: Option<[u8; 16]>,
    pub dns_domain_name: Option<String>,
    pub principal_name: Option<String>,
    /// Whether the subject actually proved the credential
    pub authenticated: bool,
}

fn sids_from_base(base: &SamBaseInfo, extra: &[(Sid, u32)]) -> Vec<Sid> {
    let mut sids = Vec::with_capacity(2 + base.groups.len() + extra.len());
    sids.push(base.domain_sid.with_rid(base.rid));
    sids.push(base.domain_sid.with_rid(base.primary_gid));
    for group in &base.groups {
        sids.push(base.domain_sid.with_rid(group.rid));
    }
    for (sid, _attributes) in extra {
        sids.push(sid.clone());
    }
    sids
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Build the canonical descriptor from a netlogon validation payload
///
/// `account_name` is the caller-asserted name, used when the broker left
/// the validation's account field empty. The declared `validation_level`
/// must match the payload's actual shape.
pub fn make_user_info_dc_netlogon_validation(
    account_name: &str,
    validation_level: ValidationLevel,
    validation: &Validation,
    authenticated: bool,
) -> Result<UserInfoDc> {
    if validation.level() != validation_level {
        return Err(Error::Status(NtStatus::INVALID_PARAMETER));
    }

    let (base, extra, dns_domain_name, principal_name) = match validation {
        Validation::Sam3(info) => (&info.base, &info.sids, None, None),
        Validation::Sam6(info) => (
            &info.base,
            &info.sids,
            non_empty(&info.dns_domain_name),
            non_empty(&info.principal_name),
        ),
    };

    let resolved_name = if base.account_name.is_empty() {
        account_name.to_string()
    } else {
        base.account_name.clone()
    };

    Ok(UserInfoDc {
        account_name: resolved_name,
        full_name: base.full_name.clone(),
        domain_name: base.logon_domain.clone(),
        sids: sids_from_base(base, extra),
        user_flags: base.user_flags,
        session_key: base.session_key,
        dns_domain_name,
        principal_name,
        authenticated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{GroupMembership, SamInfo3, SamInfo6};

    fn base() -> SamBaseInfo {
        SamBaseInfo {
            account_name: "alice".into(),
            full_name: "Alice Liddell".into(),
            logon_domain: "CORP".into(),
            domain_sid: Sid::new("S-1-5-21-1-2-3"),
            rid: 1104,
            primary_gid: 513,
            groups: vec![GroupMembership {
                rid: 512,
                attributes: 0x07,
            }],
            user_flags: 0x20,
            session_key: Some([0xAB; 16]),
            logon_count: 42,
            bad_password_count: 0,
        }
    }

    #[test]
    fn test_sam3_conversion() {
        let validation = Validation::Sam3(SamInfo3 {
            base: base(),
            sids: vec![(Sid::new("S-1-5-21-9-9-9-500"), 0x07)],
        });

        let dc =
            make_user_info_dc_netlogon_validation("alice", ValidationLevel::Sam3, &validation, true)
                .unwrap();

        assert!(dc.authenticated);
        assert_eq!(dc.account_name, "alice");
        assert_eq!(dc.domain_name, "CORP");
        assert_eq!(
            dc.sids,
            vec![
                Sid::new("S-1-5-21-1-2-3-1104"),
                Sid::new("S-1-5-21-1-2-3-513"),
                Sid::new("S-1-5-21-1-2-3-512"),
                Sid::new("S-1-5-21-9-9-9-500"),
            ]
        );
        assert!(dc.principal_name.is_none());
    }

    #[test]
    fn test_sam6_conversion() {
        let validation = Validation::Sam6(SamInfo6 {
            base: base(),
            sids: Vec::new(),
            dns_domain_name: "corp.example".into(),
            principal_name: "alice@corp.example".into(),
        });

        let dc =
            make_user_info_dc_netlogon_validation("alice", ValidationLevel::Sam6, &validation, true)
                .unwrap();

        assert_eq!(dc.dns_domain_name.as_deref(), Some("corp.example"));
        assert_eq!(dc.principal_name.as_deref(), Some("alice@corp.example"));
    }

    #[test]
    fn test_level_mismatch() {
        let validation = Validation::Sam3(SamInfo3 {
            base: base(),
            sids: Vec::new(),
        });
        let err =
            make_user_info_dc_netlogon_validation("alice", ValidationLevel::Sam6, &validation, true)
                .unwrap_err();
        assert_eq!(err.nt_status(), NtStatus::INVALID_PARAMETER);
    }

    #[test]
    fn test_empty_account_falls_back_to_caller() {
        let mut info = base();
        info.account_name.clear();
        let validation = Validation::Sam3(SamInfo3 {
            base: info,
            sids: Vec::new(),
        });

        let dc =
            make_user_info_dc_netlogon_validation("alice", ValidationLevel::Sam3, &validation, true)
                .unwrap();
        assert_eq!(dc.account_name, "alice");
    }
}
