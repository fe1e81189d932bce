//! Framework-supplied credential bundle and its canonical conversions

use crate::auth::crypto;
use crate::auth::AuthContext;
use crate::error::{Error, NtStatus, Result};
use bitflags::bitflags;
use bytes::Bytes;

bitflags! {
    /// Per-attempt behavior flags supplied by the framework
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UserInfoFlags: u32 {
        const CASE_INSENSITIVE_USERNAME = 0x01;
        const CASE_INSENSITIVE_PASSWORD = 0x02;
        const DONT_CHECK_UNIX_ACCOUNT   = 0x04;
        /// Credential was typed locally; submitted as hashed secrets
        const INTERACTIVE_LOGON         = 0x08;
    }
}

bitflags! {
    /// MSV1_0 parameter-control bits, passed through to the broker
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LogonParameters: u32 {
        const CLEARTEXT_PASSWORD_ALLOWED      = 0x0000_0002;
        const UPDATE_LOGON_STATISTICS         = 0x0000_0004;
        const RETURN_USER_PARAMETERS          = 0x0000_0008;
        const DONT_TRY_GUEST_ACCOUNT          = 0x0000_0010;
        const ALLOW_SERVER_TRUST_ACCOUNT      = 0x0000_0020;
        const RETURN_PASSWORD_EXPIRY          = 0x0000_0040;
        const ALLOW_WORKSTATION_TRUST_ACCOUNT = 0x0000_0080;
        const TRY_GUEST_ACCOUNT_ONLY          = 0x0000_0100;
        const RETURN_PROFILE_PATH             = 0x0000_0200;
        const TRY_SPECIFIED_DOMAIN_ONLY       = 0x0000_0400;
    }
}

/// Identity exactly as the client asserted it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    pub account_name: String,
    pub domain_name: String,
}

/// Identity after the framework's name mapping
///
/// An empty `account_name` means the attempt is not addressable by
/// name-mapped backends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedIdentity {
    pub account_name: String,
    pub domain_name: String,
}

/// The supplied credential, exhaustively tagged by form
///
/// The forms are disjoint so a hybrid logon request cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Password as typed; never reaches the wire
    Plaintext(String),
    /// Interactive secrets: LM and NT one-way hashes
    Hashed {
        lm: Option<[u8; 16]>,
        nt: [u8; 16],
    },
    /// Network challenge/response pair
    Response { lm: Bytes, nt: Bytes },
}

/// Credential form a submission path needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialForm {
    Hash,
    Response,
}

/// Framework-provided credential bundle for one logon attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSuppliedInfo {
    pub client: ClientIdentity,
    pub mapped: MappedIdentity,
    pub workstation_name: String,
    pub logon_parameters: LogonParameters,
    pub flags: UserInfoFlags,
    pub password: Credentials,
}

/// Convert the supplied credential into the requested wire form
///
/// Produces a fresh view of the user info; conversions that would require
/// inverting a one-way function are rejected.
pub fn encrypt_user_info(
    ctx: &AuthContext,
    form: CredentialForm,
    user_info: &UserSuppliedInfo,
) -> Result<UserSuppliedInfo> {
    let password = match (form, &user_info.password) {
        (CredentialForm::Hash, Credentials::Plaintext(password)) => Credentials::Hashed {
            lm: None,
            nt: crypto::nt_hash(password)?,
        },
        (CredentialForm::Hash, hashed @ Credentials::Hashed { .. }) => hashed.clone(),
        (CredentialForm::Response, Credentials::Plaintext(password)) => {
            let server_challenge = ctx.get_challenge()?;
            let client_challenge = crypto::generate_challenge();
            let v2_hash = crypto::ntlmv2_hash(
                &user_info.client.account_name,
                &user_info.client.domain_name,
                password,
            )?;
            let blob = crypto::Ntlmv2Blob::new(
                crypto::windows_timestamp(),
                client_challenge,
                Vec::new(),
            );
            let nt = crypto::ntlmv2_response(&v2_hash, &server_challenge, &blob)?;
            let lm = crypto::lmv2_response(&v2_hash, &server_challenge, &client_challenge)?;
            Credentials::Response {
                lm: Bytes::from(lm),
                nt: Bytes::from(nt),
            }
        }
        (CredentialForm::Response, response @ Credentials::Response { .. }) => response.clone(),
        // One-way conversions only
        (CredentialForm::Hash, Credentials::Response { .. })
        | (CredentialForm::Response, Credentials::Hashed { .. }) => {
            return Err(Error::Status(NtStatus::INVALID_PARAMETER));
        }
    };

    Ok(UserSuppliedInfo {
        password,
        ..user_info.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Config;
    use std::sync::Arc;

    fn ctx() -> AuthContext {
        AuthContext::new(Arc::new(Config::new("CORP", "corp.example")), None, None)
            .with_challenge([0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77])
    }

    fn plaintext_info() -> UserSuppliedInfo {
        UserSuppliedInfo {
            client: ClientIdentity {
                account_name: "alice".into(),
                domain_name: "CORP".into(),
            },
            mapped: MappedIdentity {
                account_name: "alice".into(),
                domain_name: "CORP".into(),
            },
            workstation_name: "WS1".into(),
            logon_parameters: LogonParameters::empty(),
            flags: UserInfoFlags::INTERACTIVE_LOGON,
            password: Credentials::Plaintext("password".into()),
        }
    }

    #[test]
    fn test_encrypt_to_hash() {
        let info = encrypt_user_info(&ctx(), CredentialForm::Hash, &plaintext_info()).unwrap();
        match info.password {
            Credentials::Hashed { lm, nt } => {
                assert!(lm.is_none());
                assert_eq!(nt, crypto::nt_hash("password").unwrap());
            }
            other => panic!("expected hashed credentials, got {:?}", other),
        }
        // Identity fields carry over untouched
        assert_eq!(info.client.account_name, "alice");
        assert_eq!(info.workstation_name, "WS1");
    }

    #[test]
    fn test_encrypt_to_response() {
        let info = encrypt_user_info(&ctx(), CredentialForm::Response, &plaintext_info()).unwrap();
        match info.password {
            Credentials::Response { lm, nt } => {
                assert_eq!(lm.len(), 24);
                assert!(nt.len() > 16);
            }
            other => panic!("expected response credentials, got {:?}", other),
        }
    }

    #[test]
    fn test_encrypt_identity_passthrough() {
        let mut info = plaintext_info();
        info.password = Credentials::Response {
            lm: Bytes::from_static(&[1u8; 24]),
            nt: Bytes::from_static(&[2u8; 24]),
        };
        let converted = encrypt_user_info(&ctx(), CredentialForm::Response, &info).unwrap();
        assert_eq!(converted.password, info.password);
    }

    #[test]
    fn test_encrypt_one_way_only() {
        let mut info = plaintext_info();
        info.password = Credentials::Response {
            lm: Bytes::new(),
            nt: Bytes::new(),
        };
        assert!(encrypt_user_info(&ctx(), CredentialForm::Hash, &info).is_err());

        info.password = Credentials::Hashed {
            lm: None,
            nt: [0u8; 16],
        };
        assert!(encrypt_user_info(&ctx(), CredentialForm::Response, &info).is_err());
    }
}
