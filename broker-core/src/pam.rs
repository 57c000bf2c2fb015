//! PAM vocabulary shared by the responder and the backends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Client commands understood by the PAM responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum PamCommand {
    Authenticate,
    SetCred,
    AcctMgmt,
    OpenSession,
    CloseSession,
    ChAuthTok,
}

impl PamCommand {
    pub const fn code(self) -> u32 {
        match self {
            PamCommand::Authenticate => 0x00F1,
            PamCommand::SetCred => 0x00F2,
            PamCommand::AcctMgmt => 0x00F3,
            PamCommand::OpenSession => 0x00F4,
            PamCommand::CloseSession => 0x00F5,
            PamCommand::ChAuthTok => 0x00F6,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x00F1 => Some(PamCommand::Authenticate),
            0x00F2 => Some(PamCommand::SetCred),
            0x00F3 => Some(PamCommand::AcctMgmt),
            0x00F4 => Some(PamCommand::OpenSession),
            0x00F5 => Some(PamCommand::CloseSession),
            0x00F6 => Some(PamCommand::ChAuthTok),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PamCommand::Authenticate => "authenticate",
            PamCommand::SetCred => "setcred",
            PamCommand::AcctMgmt => "acct_mgmt",
            PamCommand::OpenSession => "open_session",
            PamCommand::CloseSession => "close_session",
            PamCommand::ChAuthTok => "chauthtok",
        }
    }
}

impl fmt::Display for PamCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PamCommand> for i32 {
    fn from(cmd: PamCommand) -> Self {
        cmd.code() as i32
    }
}

impl TryFrom<i32> for PamCommand {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .and_then(PamCommand::from_code)
            .ok_or_else(|| format!("unknown PAM command {:#x}", value))
    }
}

/// PAM result codes, numbered as in Linux-PAM. Codes the broker never
/// produces itself are carried through untouched in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum PamStatus {
    #[default]
    Success,
    SystemErr,
    PermDenied,
    AuthErr,
    CredInsufficient,
    AuthInfoUnavail,
    UserUnknown,
    MaxTries,
    NewAuthTokReqd,
    AcctExpired,
    CredErr,
    AuthTokErr,
    Other(i32),
}

impl From<i32> for PamStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => PamStatus::Success,
            4 => PamStatus::SystemErr,
            6 => PamStatus::PermDenied,
            7 => PamStatus::AuthErr,
            8 => PamStatus::CredInsufficient,
            9 => PamStatus::AuthInfoUnavail,
            10 => PamStatus::UserUnknown,
            11 => PamStatus::MaxTries,
            12 => PamStatus::NewAuthTokReqd,
            13 => PamStatus::AcctExpired,
            17 => PamStatus::CredErr,
            20 => PamStatus::AuthTokErr,
            other => PamStatus::Other(other),
        }
    }
}

impl From<PamStatus> for i32 {
    fn from(status: PamStatus) -> Self {
        match status {
            PamStatus::Success => 0,
            PamStatus::SystemErr => 4,
            PamStatus::PermDenied => 6,
            PamStatus::AuthErr => 7,
            PamStatus::CredInsufficient => 8,
            PamStatus::AuthInfoUnavail => 9,
            PamStatus::UserUnknown => 10,
            PamStatus::MaxTries => 11,
            PamStatus::NewAuthTokReqd => 12,
            PamStatus::AcctExpired => 13,
            PamStatus::CredErr => 17,
            PamStatus::AuthTokErr => 20,
            PamStatus::Other(code) => code,
        }
    }
}

impl From<u32> for PamStatus {
    fn from(code: u32) -> Self {
        PamStatus::from(code as i32)
    }
}

impl PamStatus {
    pub fn code(self) -> i32 {
        self.into()
    }
}

/// Authentication token kinds as carried in client requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum AuthTokType {
    #[default]
    Empty,
    Password,
    Other(u32),
}

impl From<u32> for AuthTokType {
    fn from(value: u32) -> Self {
        match value {
            0 => AuthTokType::Empty,
            1 => AuthTokType::Password,
            other => AuthTokType::Other(other),
        }
    }
}

impl From<AuthTokType> for u32 {
    fn from(value: AuthTokType) -> Self {
        match value {
            AuthTokType::Empty => 0,
            AuthTokType::Password => 1,
            AuthTokType::Other(other) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes() {
        for cmd in [
            PamCommand::Authenticate,
            PamCommand::SetCred,
            PamCommand::AcctMgmt,
            PamCommand::OpenSession,
            PamCommand::CloseSession,
            PamCommand::ChAuthTok,
        ] {
            assert_eq!(PamCommand::from_code(cmd.code()), Some(cmd));
        }
        assert_eq!(PamCommand::from_code(0x0001), None);
        assert!(PamCommand::try_from(-1).is_err());
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let status = PamStatus::from(27);
        assert_eq!(status, PamStatus::Other(27));
        assert_eq!(status.code(), 27);
        assert_eq!(PamStatus::from(9), PamStatus::AuthInfoUnavail);
    }

    #[test]
    fn test_status_serializes_as_number() {
        let json = serde_json::to_string(&PamStatus::UserUnknown).unwrap();
        assert_eq!(json, "10");
        let back: PamStatus = serde_json::from_str("4").unwrap();
        assert_eq!(back, PamStatus::SystemErr);
    }
}
