//! Domain models for the wallet ledger.
//!
//! These models are storage-agnostic. The [`Wallet`] aggregate is
//! persisted as a single document by the ledger store; everything
//! it owns (balances, audit events, transfer records) travels with it.

mod currency;
mod wallet;

pub use currency::{Balance, CurrencyCode, SUPPORTED_CURRENCIES};
pub(crate) use currency::ensure_positive;
pub use wallet::{LedgerEvent, LedgerEventKind, TransferEvent, TransferKind, TransferStatus, Wallet};

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WalletError, WalletResult};

// =============================================================================
// Identifiers
// =============================================================================

/// Macro to generate UUID-backed identifier newtypes.
///
/// Generates:
/// - `generate()` - Fresh random (v4) identifier
/// - `parse()` - Parse from the hyphenated string form
/// - `Display` and `From<Uuid>` implementations
macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from string form.
            pub fn parse(s: &str) -> WalletResult<Self> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|_| {
                    WalletError::InvalidInput(format!(
                        "{} is not a valid {}",
                        s,
                        stringify!($name)
                    ))
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_newtype!(
    /// Unique wallet identifier, assigned at creation.
    WalletId
);

uuid_newtype!(
    /// Unique transfer identifier, assigned when a transfer is proposed.
    TransferId
);

/// Account holder identifier as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id, rejecting blank values.
    pub fn new(id: impl Into<String>) -> WalletResult<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(WalletError::InvalidInput("user id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Platform role of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Rider,
    Driver,
    Admin,
}

impl Role {
    /// Drivers receive payouts, so only they may withdraw.
    pub fn is_payout_eligible(self) -> bool {
        matches!(self, Role::Driver)
    }
}

impl FromStr for Role {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RIDER" => Ok(Role::Rider),
            "DRIVER" => Ok(Role::Driver),
            "ADMIN" => Ok(Role::Admin),
            other => Err(WalletError::InvalidInput(format!("unknown role '{}'", other))),
        }
    }
}

/// Wallet owner. Display fields are denormalized for read convenience only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl Owner {
    /// Owner with only an id and no display fields.
    pub fn with_id(id: UserId) -> Self {
        Self {
            id,
            name: String::new(),
            last_name: String::new(),
            email: String::new(),
        }
    }
}

/// An already-authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub owner: Owner,
    pub role: Role,
}

impl Caller {
    pub fn new(owner: Owner, role: Role) -> Self {
        Self { owner, role }
    }

    pub fn id(&self) -> &UserId {
        &self.owner.id
    }
}

/// Per-request context carrying the resolved caller, if any.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    caller: Option<Caller>,
}

impl RequestContext {
    /// Context without an identity. Every wallet operation rejects it.
    pub fn anonymous() -> Self {
        Self { caller: None }
    }

    pub fn with_caller(caller: Caller) -> Self {
        Self {
            caller: Some(caller),
        }
    }

    /// The resolved caller, or `AccessDenied` if none is attached.
    pub fn caller(&self) -> WalletResult<&Caller> {
        self.caller
            .as_ref()
            .ok_or_else(|| WalletError::AccessDenied("no caller identity".into()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_id_parse_roundtrip() {
        let id = TransferId::generate();
        assert_eq!(TransferId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn transfer_id_rejects_garbage() {
        let err = TransferId::parse("not-a-uuid").unwrap_err();
        assert!(matches!(err, WalletError::InvalidInput(_)));
    }

    #[test]
    fn user_id_rejects_blank() {
        assert!(UserId::new("   ").is_err());
        assert_eq!(UserId::new(" u1 ").unwrap().as_str(), "u1");
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("driver".parse::<Role>().unwrap(), Role::Driver);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn anonymous_context_is_denied() {
        let err = RequestContext::anonymous().caller().unwrap_err();
        assert!(matches!(err, WalletError::AccessDenied(_)));
    }
}
