//! Error types for the winbind authentication backends

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for authentication operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for authentication operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Authentication-domain status returned by the broker or the core
    #[error("status: {0}")]
    Status(NtStatus),

    /// Transport deadline expired before the broker replied
    #[error("Operation timed out")]
    Timeout,

    /// Transport-level failure reaching the broker
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Encryption error
    #[error("Encryption/Decryption error: {0}")]
    CryptoError(String),

    /// Backend registration failed
    #[error("Backend registration failed: {0}")]
    Registration(String),
}

impl From<NtStatus> for Error {
    fn from(status: NtStatus) -> Self {
        Error::Status(status)
    }
}

impl Error {
    /// Domain status equivalent of this error.
    ///
    /// Transport timeouts map to `IO_TIMEOUT`; other non-status errors
    /// collapse to `UNSUCCESSFUL`.
    pub fn nt_status(&self) -> NtStatus {
        match self {
            Error::Status(status) => *status,
            Error::Timeout => NtStatus::IO_TIMEOUT,
            _ => NtStatus::UNSUCCESSFUL,
        }
    }
}

/// Windows logon status codes (subset of NTSTATUS)
///
/// Codes the broker may return that this crate does not name are kept
/// verbatim rather than collapsed to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtStatus(u32);

impl NtStatus {
    /// The operation completed successfully
    pub const SUCCESS: NtStatus = NtStatus(0x0000_0000);
    /// The operation failed for an unspecified reason
    pub const UNSUCCESSFUL: NtStatus = NtStatus(0xC000_0001);
    /// The requested operation is not implemented
    pub const NOT_IMPLEMENTED: NtStatus = NtStatus(0xC000_0002);
    /// The parameter is incorrect
    pub const INVALID_PARAMETER: NtStatus = NtStatus(0xC000_000D);
    /// Insufficient memory to complete the operation
    pub const NO_MEMORY: NtStatus = NtStatus(0xC000_0017);
    /// Access denied
    pub const ACCESS_DENIED: NtStatus = NtStatus(0xC000_0022);
    /// No logon server is available to service the request
    pub const NO_LOGON_SERVERS: NtStatus = NtStatus(0xC000_005E);
    /// The specified account does not exist
    pub const NO_SUCH_USER: NtStatus = NtStatus(0xC000_0064);
    /// The password is incorrect
    pub const WRONG_PASSWORD: NtStatus = NtStatus(0xC000_006A);
    /// The user name or password is incorrect
    pub const LOGON_FAILURE: NtStatus = NtStatus(0xC000_006D);
    /// Account is disabled
    pub const ACCOUNT_DISABLED: NtStatus = NtStatus(0xC000_0072);
    /// Account is locked out
    pub const ACCOUNT_LOCKED_OUT: NtStatus = NtStatus(0xC000_0234);
    /// The request timed out
    pub const IO_TIMEOUT: NtStatus = NtStatus(0xC000_00B5);
    /// The server is in an invalid state to service the request
    pub const INVALID_SERVER_STATE: NtStatus = NtStatus(0xC000_00DC);

    /// Create from a raw u32 value, keeping unknown codes as-is
    pub const fn from_u32(value: u32) -> Self {
        NtStatus(value)
    }

    /// Raw NTSTATUS code
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Check if this is a success status
    pub fn is_success(self) -> bool {
        self == NtStatus::SUCCESS
    }

    /// Check if this is an error status
    pub fn is_error(self) -> bool {
        self.0 & 0xC000_0000 == 0xC000_0000
    }

    /// Check if this is a warning status
    pub fn is_warning(self) -> bool {
        self.0 & 0x8000_0000 == 0x8000_0000 && !self.is_error()
    }

    fn message(self) -> Option<&'static str> {
        let msg = match self {
            NtStatus::SUCCESS => "Success",
            NtStatus::UNSUCCESSFUL => "Unsuccessful",
            NtStatus::NOT_IMPLEMENTED => "Not implemented",
            NtStatus::INVALID_PARAMETER => "Invalid parameter",
            NtStatus::NO_MEMORY => "No memory",
            NtStatus::ACCESS_DENIED => "Access denied",
            NtStatus::NO_LOGON_SERVERS => "No logon servers",
            NtStatus::NO_SUCH_USER => "No such user",
            NtStatus::WRONG_PASSWORD => "Wrong password",
            NtStatus::LOGON_FAILURE => "Logon failure",
            NtStatus::ACCOUNT_DISABLED => "Account disabled",
            NtStatus::ACCOUNT_LOCKED_OUT => "Account locked out",
            NtStatus::IO_TIMEOUT => "I/O timeout",
            NtStatus::INVALID_SERVER_STATE => "Invalid server state",
            _ => return None,
        };
        Some(msg)
    }
}

impl From<u32> for NtStatus {
    fn from(value: u32) -> Self {
        NtStatus(value)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{} (0x{:08X})", msg, self.0),
            None => write!(f, "Unknown status (0x{:08X})", self.0),
        }
    }
}
