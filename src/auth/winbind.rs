//! Winbind authentication backends
//!
//! Delegates credential verification to the out-of-process winbind broker:
//! asynchronously over the message fabric, or synchronously through the
//! legacy client library. On broker success the local directory record is
//! reconciled best-effort and the validation payload is normalized into
//! the canonical descriptor.

use crate::auth::reply::{make_user_info_dc_netlogon_validation, UserInfoDc};
use crate::auth::user_info::{
    encrypt_user_info, CredentialForm, Credentials, UserInfoFlags, UserSuppliedInfo,
};
use crate::auth::wbclient::{winbind_check_password_wbclient, WbClient};
use crate::auth::{AuthBackend, AuthContext, AuthRegistry, Eligibility, LogonHandle};
use crate::directory::ServerRole;
use crate::error::{Error, NtStatus, Result};
use crate::rpc::{
    BindingHandle, IdentityInfo, LogonPayload, NetworkInfo, PasswordInfo, SamLogonRequest,
    ValidationLevel,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Logical endpoint name of the winbind broker task
pub const WINBIND_SERVER: &str = "winbind_server";

/// Per-call deadline for the broker round-trip.
///
/// Trust lookups may traverse multiple hops; winbindd itself reports
/// NO_LOGON_SERVERS after 90-100 seconds when it can't reach a read-write
/// replica, so 120 seconds is the upper envelope.
pub const WINBIND_CALL_TIMEOUT: Duration = Duration::from_secs(120);

fn winbind_want_check(user_info: &UserSuppliedInfo) -> Eligibility {
    if user_info.mapped.account_name.is_empty() {
        return Eligibility::NotApplicable;
    }

    // TODO: maybe limit the user scope to remote users only
    Eligibility::Eligible
}

fn winbind_rodc_want_check(ctx: &AuthContext, user_info: &UserSuppliedInfo) -> Eligibility {
    if user_info.mapped.account_name.is_empty() {
        return Eligibility::NotApplicable;
    }

    let Some(sam_ctx) = ctx.directory() else {
        error!("no directory handle, don't check");
        return Eligibility::NotApplicable;
    };

    let role = match sam_ctx.server_role() {
        Ok(role) => role,
        Err(err) => {
            error!("directory role query failed ({}), don't check", err);
            return Eligibility::NotApplicable;
        }
    };

    if role != ServerRole::ReadOnly {
        // Full replicas handle trusts on their own path; it must not
        // re-enter this backend.
        return Eligibility::NotApplicable;
    }

    // We're a read-only replica, so forward the request to our winbind.
    // The reconciliation steps below may briefly block the event context;
    // the read-only-replica path is not yet production ready.
    Eligibility::Eligible
}

fn identity_info(user_info: &UserSuppliedInfo) -> IdentityInfo {
    IdentityInfo {
        domain_name: user_info.client.domain_name.clone(),
        account_name: user_info.client.account_name.clone(),
        workstation: user_info.workstation_name.clone(),
        parameter_control: user_info.logon_parameters.bits(),
        logon_id_low: 0,
        logon_id_high: 0,
    }
}

fn build_logon_request(
    ctx: &AuthContext,
    user_info: &UserSuppliedInfo,
) -> Result<(SamLogonRequest, UserSuppliedInfo)> {
    let interactive = user_info.flags.contains(UserInfoFlags::INTERACTIVE_LOGON);

    let (user_info, logon) = if interactive {
        let user_info = encrypt_user_info(ctx, CredentialForm::Hash, user_info)?;
        let Credentials::Hashed { lm, nt } = user_info.password.clone() else {
            return Err(Error::Status(NtStatus::INVALID_PARAMETER));
        };
        let payload = PasswordInfo {
            identity: identity_info(&user_info),
            lm_password: lm.unwrap_or([0u8; 16]),
            nt_password: nt,
        };
        (user_info, LogonPayload::Password(payload))
    } else {
        let user_info = encrypt_user_info(ctx, CredentialForm::Response, user_info)?;
        let Credentials::Response { lm, nt } = user_info.password.clone() else {
            return Err(Error::Status(NtStatus::INVALID_PARAMETER));
        };
        let payload = NetworkInfo {
            identity: identity_info(&user_info),
            challenge: ctx.get_challenge()?,
            lm,
            nt,
        };
        (user_info, LogonPayload::Network(payload))
    };

    let request = SamLogonRequest {
        logon_level: logon.level(),
        logon,
        validation_level: ValidationLevel::Sam3,
    };
    Ok((request, user_info))
}

/// Submit a credential to the winbind broker over the message fabric
///
/// All submission failures surface through the returned handle, never as a
/// panic or early return to the framework.
fn winbind_check_password_send(
    ctx: &Arc<AuthContext>,
    user_info: &UserSuppliedInfo,
) -> LogonHandle {
    let msg_ctx = match ctx.messaging() {
        Ok(msg_ctx) => msg_ctx,
        Err(_) => {
            warn!("messaging client init failed");
            return LogonHandle::failed(NtStatus::INVALID_SERVER_STATE);
        }
    };

    let Some(mut irpc_handle) = msg_ctx.binding_handle(WINBIND_SERVER) else {
        error!(
            "winbind authentication for [{}]\\[{}] failed, no winbind_server running",
            user_info.client.domain_name, user_info.client.account_name
        );
        return LogonHandle::failed(NtStatus::NO_LOGON_SERVERS);
    };

    irpc_handle.set_timeout(WINBIND_CALL_TIMEOUT);

    let (request, user_info) = match build_logon_request(ctx, user_info) {
        Ok(built) => built,
        Err(err) => return LogonHandle::failed(err),
    };

    let ctx = Arc::clone(ctx);
    LogonHandle::pending(winbind_check_password_done(
        ctx,
        irpc_handle,
        request,
        user_info,
    ))
}

async fn winbind_check_password_done(
    ctx: Arc<AuthContext>,
    irpc_handle: BindingHandle,
    request: SamLogonRequest,
    user_info: UserSuppliedInfo,
) -> (Result<UserInfoDc>, bool) {
    let response = match irpc_handle.sam_logon(&request).await {
        Ok(response) => response,
        // No broker answered before the deadline; report it as a missing
        // logon server rather than a user failure.
        Err(Error::Timeout) => return (Err(Error::Status(NtStatus::NO_LOGON_SERVERS)), true),
        Err(err) => return (Err(err), true),
    };

    if !response.result.is_success() {
        return (Err(Error::Status(response.result)), response.authoritative);
    }

    // At best, reset the badPwdCount to 0 if the account exists. Lockouts
    // then trigger at a badPwdCount earlier than normal, but the logon
    // stays fault tolerant.
    logon_success_reconcile(&ctx, &user_info);

    let Some(validation) = response.validation.as_ref() else {
        return (Err(Error::Status(NtStatus::INVALID_PARAMETER)), true);
    };

    let converted = make_user_info_dc_netlogon_validation(
        &user_info.client.account_name,
        request.validation_level,
        validation,
        true,
    );
    (converted, true)
}

/// Best-effort local bookkeeping after a broker-confirmed logon
///
/// The broker already decided the authentication; nothing here may fail
/// the attempt.
fn logon_success_reconcile(ctx: &AuthContext, user_info: &UserSuppliedInfo) {
    let Some(sam_ctx) = ctx.directory() else {
        return;
    };

    let mut account_name = user_info.mapped.account_name.clone();
    if account_name.contains('@') {
        match sam_ctx.crack_upn(&account_name) {
            Ok((nt4_domain, nt4_account)) if ctx.config().is_my_domain(&nt4_domain) => {
                account_name = nt4_account;
            }
            Ok(_) => {}
            Err(err) => debug!("cracking '{}' failed: {}", account_name, err),
        }
    }

    let Some(base_dn) = sam_ctx.default_base_dn() else {
        return;
    };

    let record = match sam_ctx.search_account(&account_name, &base_dn) {
        Ok(Some(record)) => record,
        Ok(None) => return,
        Err(err) => {
            debug!("account search for '{}' failed: {}", account_name, err);
            return;
        }
    };

    let interactive = user_info.flags.contains(UserInfoFlags::INTERACTIVE_LOGON);
    if let Err(err) = sam_ctx.logon_success_accounting(&record, &base_dn, interactive) {
        warn!("success accounting for '{}' failed: {}", account_name, err);
    }
}

/// Asynchronous winbind backend
pub struct WinbindBackend;

impl AuthBackend for WinbindBackend {
    fn name(&self) -> &'static str {
        "winbind"
    }

    fn want_check(&self, _ctx: &AuthContext, user_info: &UserSuppliedInfo) -> Eligibility {
        winbind_want_check(user_info)
    }

    fn check_password_send(
        &self,
        ctx: &Arc<AuthContext>,
        user_info: &UserSuppliedInfo,
    ) -> LogonHandle {
        winbind_check_password_send(ctx, user_info)
    }
}

/// Asynchronous winbind backend gated to read-only replicas
pub struct WinbindRodcBackend;

impl AuthBackend for WinbindRodcBackend {
    fn name(&self) -> &'static str {
        "winbind_rodc"
    }

    fn want_check(&self, ctx: &AuthContext, user_info: &UserSuppliedInfo) -> Eligibility {
        winbind_rodc_want_check(ctx, user_info)
    }

    fn check_password_send(
        &self,
        ctx: &Arc<AuthContext>,
        user_info: &UserSuppliedInfo,
    ) -> LogonHandle {
        winbind_check_password_send(ctx, user_info)
    }
}

/// Synchronous backend speaking the samba3 winbind protocol
pub struct WinbindWbclientBackend {
    client: Arc<dyn WbClient>,
}

impl WinbindWbclientBackend {
    pub fn new(client: Arc<dyn WbClient>) -> Self {
        Self { client }
    }
}

impl AuthBackend for WinbindWbclientBackend {
    fn name(&self) -> &'static str {
        "winbind_wbclient"
    }

    fn want_check(&self, _ctx: &AuthContext, user_info: &UserSuppliedInfo) -> Eligibility {
        winbind_want_check(user_info)
    }

    fn check_password_send(
        &self,
        ctx: &Arc<AuthContext>,
        user_info: &UserSuppliedInfo,
    ) -> LogonHandle {
        let client = Arc::clone(&self.client);
        let ctx = Arc::clone(ctx);
        let user_info = user_info.clone();
        LogonHandle::pending(async move {
            winbind_check_password_wbclient(client.as_ref(), &ctx, &user_info)
        })
    }
}

/// Register the winbind backend variants under their stable names
///
/// Called once at module initialization; a failure is fatal and propagates.
pub fn register_winbind_backends(
    registry: &mut AuthRegistry,
    wbclient: Arc<dyn WbClient>,
) -> Result<()> {
    let backends: [Arc<dyn AuthBackend>; 3] = [
        Arc::new(WinbindBackend),
        Arc::new(WinbindRodcBackend),
        Arc::new(WinbindWbclientBackend::new(wbclient)),
    ];

    for backend in backends {
        let name = backend.name();
        if let Err(err) = registry.register(backend) {
            error!("failed to register '{}' auth backend", name);
            return Err(err);
        }
    }

    Ok(())
}
