//! Legacy synchronous path through the samba3-protocol winbind client library

use crate::auth::reply::{make_user_info_dc_netlogon_validation, UserInfoDc};
use crate::auth::user_info::{
    encrypt_user_info, CredentialForm, Credentials, LogonParameters, UserSuppliedInfo,
};
use crate::auth::AuthContext;
use crate::error::{Error, NtStatus, Result};
use crate::rpc::{GroupMembership, SamBaseInfo, SamInfo6, Sid, Validation, ValidationLevel};
use bytes::Bytes;
use tracing::{debug, warn};

/// Client-library status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WbcStatus {
    Success,
    NotImplemented,
    UnknownFailure,
    NoMemory,
    InvalidSid,
    InvalidParam,
    WinbindNotAvailable,
    DomainNotFound,
    InvalidResponse,
    NssError,
    AuthError,
    UnknownUser,
    UnknownGroup,
}

impl WbcStatus {
    pub fn error_string(self) -> &'static str {
        match self {
            WbcStatus::Success => "WBC_ERR_SUCCESS",
            WbcStatus::NotImplemented => "WBC_ERR_NOT_IMPLEMENTED",
            WbcStatus::UnknownFailure => "WBC_ERR_UNKNOWN_FAILURE",
            WbcStatus::NoMemory => "WBC_ERR_NO_MEMORY",
            WbcStatus::InvalidSid => "WBC_ERR_INVALID_SID",
            WbcStatus::InvalidParam => "WBC_ERR_INVALID_PARAM",
            WbcStatus::WinbindNotAvailable => "WBC_ERR_WINBIND_NOT_AVAILABLE",
            WbcStatus::DomainNotFound => "WBC_ERR_DOMAIN_NOT_FOUND",
            WbcStatus::InvalidResponse => "WBC_ERR_INVALID_RESPONSE",
            WbcStatus::NssError => "WBC_ERR_NSS_ERROR",
            WbcStatus::AuthError => "WBC_ERR_AUTH_ERROR",
            WbcStatus::UnknownUser => "WBC_ERR_UNKNOWN_USER",
            WbcStatus::UnknownGroup => "WBC_ERR_UNKNOWN_GROUP",
        }
    }
}

/// Credential level of an authentication request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WbcAuthUserLevel {
    Plain,
    Response,
}

/// Flat parameter block for `authenticate_user_ex`
#[derive(Debug, Clone)]
pub struct WbcAuthUserParams {
    pub account_name: String,
    pub domain_name: String,
    pub workstation_name: String,
    pub parameter_control: LogonParameters,
    pub level: WbcAuthUserLevel,
    pub challenge: [u8; 8],
    pub lm_response: Bytes,
    pub nt_response: Bytes,
}

/// Successful authentication payload from the client library
#[derive(Debug, Clone)]
pub struct WbcAuthUserInfo {
    pub account_name: String,
    pub full_name: String,
    pub domain_name: String,
    pub dns_domain_name: String,
    pub principal_name: String,
    pub domain_sid: Sid,
    pub user_rid: u32,
    pub primary_gid: u32,
    pub groups: Vec<GroupMembership>,
    pub user_flags: u32,
}

/// Error detail the older protocol may attach to an authentication failure
#[derive(Debug, Clone)]
pub struct WbcAuthError {
    /// Carried NT status, when the broker supplied one
    pub nt_status: Option<NtStatus>,
    pub nt_string: String,
    pub display_string: String,
}

/// Failure returned by the client library
#[derive(Debug, Clone)]
pub struct WbcFailure {
    pub status: WbcStatus,
    pub error: Option<WbcAuthError>,
}

/// The winbind client library surface this path depends on
pub trait WbClient: Send + Sync {
    fn authenticate_user_ex(
        &self,
        params: &WbcAuthUserParams,
    ) -> std::result::Result<WbcAuthUserInfo, WbcFailure>;
}

/// Adapt the client library's user info into a level-6 validation payload
///
/// Allocation failure inside the adapter surfaces as `None`.
fn auth_user_info_to_sam_info6(info: &WbcAuthUserInfo) -> Option<SamInfo6> {
    Some(SamInfo6 {
        base: SamBaseInfo {
            account_name: info.account_name.clone(),
            full_name: info.full_name.clone(),
            logon_domain: info.domain_name.clone(),
            domain_sid: info.domain_sid.clone(),
            rid: info.user_rid,
            primary_gid: info.primary_gid,
            groups: info.groups.clone(),
            user_flags: info.user_flags,
            session_key: None,
            logon_count: 0,
            bad_password_count: 0,
        },
        sids: Vec::new(),
        dns_domain_name: info.dns_domain_name.clone(),
        principal_name: info.principal_name.clone(),
    })
}

/// Authenticate a challenge/response pair through the legacy client library
///
/// The older protocol has no authoritative channel, so this path reports
/// authoritative on every outcome.
pub fn winbind_check_password_wbclient(
    client: &dyn WbClient,
    ctx: &AuthContext,
    user_info: &UserSuppliedInfo,
) -> (Result<UserInfoDc>, bool) {
    (check_password(client, ctx, user_info), true)
}

fn check_password(
    client: &dyn WbClient,
    ctx: &AuthContext,
    user_info: &UserSuppliedInfo,
) -> Result<UserInfoDc> {
    let user_info = encrypt_user_info(ctx, CredentialForm::Response, user_info)?;
    let Credentials::Response { lm, nt } = user_info.password.clone() else {
        return Err(Error::Status(NtStatus::INVALID_PARAMETER));
    };

    let parameter_control = user_info.logon_parameters
        | LogonParameters::ALLOW_WORKSTATION_TRUST_ACCOUNT
        | LogonParameters::ALLOW_SERVER_TRUST_ACCOUNT;

    let params = WbcAuthUserParams {
        account_name: user_info.client.account_name.clone(),
        domain_name: user_info.client.domain_name.clone(),
        workstation_name: user_info.workstation_name.clone(),
        parameter_control,
        level: WbcAuthUserLevel::Response,
        challenge: ctx.get_challenge()?,
        lm_response: lm,
        nt_response: nt,
    };

    debug!(
        "looking up {}@{} logging in from {}",
        params.account_name, params.domain_name, params.workstation_name
    );

    let info = match client.authenticate_user_ex(&params) {
        Ok(info) => info,
        Err(failure) if failure.status == WbcStatus::AuthError => {
            let status = match failure.error {
                Some(err) => {
                    warn!(
                        "error was {} (0x{:08x}), message '{}'",
                        err.nt_string,
                        err.nt_status.map(NtStatus::as_u32).unwrap_or(0),
                        err.display_string
                    );
                    err.nt_status.unwrap_or(NtStatus::LOGON_FAILURE)
                }
                None => NtStatus::LOGON_FAILURE,
            };
            return Err(Error::Status(status));
        }
        Err(failure) => {
            warn!(
                "authenticate_user_ex failed: {}",
                failure.status.error_string()
            );
            if let Some(err) = failure.error {
                warn!(
                    "error was {}, message '{}'",
                    err.nt_string, err.display_string
                );
            }
            return Err(Error::Status(NtStatus::LOGON_FAILURE));
        }
    };

    let info6 = auth_user_info_to_sam_info6(&info).ok_or(Error::Status(NtStatus::NO_MEMORY))?;
    make_user_info_dc_netlogon_validation(
        &user_info.client.account_name,
        ValidationLevel::Sam6,
        &Validation::Sam6(info6),
        true,
    )
}
