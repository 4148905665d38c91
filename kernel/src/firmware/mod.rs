//! Supervisor Binary Interface definitions shared by every port.
//!
//! The calls themselves live in `arch::riscv64::instruction::sbi`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// Legacy console putchar.
    ConsolePutChar = 0x01,
    Base = 0x10,
    Ipi = 0x735049,
    Hsm = 0x48534d,
    Srst = 0x53525354,
}

pub mod base {
    pub const PROBE_EXTENSION: usize = 3;
}

pub mod ipi {
    pub const SEND_IPI: usize = 0;
}

pub mod hsm {
    pub const HART_START: usize = 0;
    pub const HART_GET_STATUS: usize = 2;
}

pub mod srst {
    pub const SYSTEM_RESET: usize = 0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SbiError {
    #[error("failed")]
    Failed,
    #[error("not supported")]
    NotSupported,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("denied")]
    Denied,
    #[error("invalid address")]
    InvalidAddress,
    #[error("already available")]
    AlreadyAvailable,
    #[error("already started")]
    AlreadyStarted,
    #[error("already stopped")]
    AlreadyStopped,
    #[error("unknown error {0}")]
    Unknown(isize),
}

impl SbiError {
    /// Maps the `error` register of an SBI return; zero is success.
    pub fn from_code(code: isize) -> Option<SbiError> {
        let error = match code {
            0 => return None,
            -1 => SbiError::Failed,
            -2 => SbiError::NotSupported,
            -3 => SbiError::InvalidParam,
            -4 => SbiError::Denied,
            -5 => SbiError::InvalidAddress,
            -6 => SbiError::AlreadyAvailable,
            -7 => SbiError::AlreadyStarted,
            -8 => SbiError::AlreadyStopped,
            other => SbiError::Unknown(other),
        };
        Some(error)
    }
}

/// Converts an `(error, value)` register pair into a result.
pub fn sbi_result(error: usize, value: usize) -> Result<usize, SbiError> {
    match SbiError::from_code(error as isize) {
        None => Ok(value),
        Some(err) => Err(err),
    }
}

/// HSM hart state as returned by `hart_get_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HartStatus {
    Started,
    Stopped,
    StartPending,
    StopPending,
    Suspended,
    SuspendPending,
    ResumePending,
    Unknown(usize),
}

impl HartStatus {
    pub fn from_raw(raw: usize) -> Self {
        match raw {
            0 => HartStatus::Started,
            1 => HartStatus::Stopped,
            2 => HartStatus::StartPending,
            3 => HartStatus::StopPending,
            4 => HartStatus::Suspended,
            5 => HartStatus::SuspendPending,
            6 => HartStatus::ResumePending,
            other => HartStatus::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    Shutdown = 0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    SystemFailure = 1,
}
