// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity types shared across adapter traits and the reconciliation engine.
//!
//! Phone numbers and account identifiers are normalized at construction, so
//! every value of [`PhoneNumber`] or [`AccountId`] that reaches the directory
//! is already in canonical form.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;

/// Minimum and maximum digit counts for an E.164 number (excluding `+`).
const E164_MIN_DIGITS: usize = 8;
const E164_MAX_DIGITS: usize = 15;

/// An E.164-normalized phone number, e.g. `+13215559876`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and normalize a phone number.
    ///
    /// Spaces, dashes, dots and parentheses are stripped. The remainder must be
    /// `+` followed by 8 to 15 digits, the first of which is non-zero.
    pub fn parse(raw: &str) -> Result<Self, ParleyError> {
        let compact: String = raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')' | '\t'))
            .collect();

        let digits = compact.strip_prefix('+').ok_or_else(|| {
            ParleyError::InvalidIdentifier(format!("phone number `{raw}` must start with `+`"))
        })?;

        let valid = (E164_MIN_DIGITS..=E164_MAX_DIGITS).contains(&digits.len())
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0');
        if !valid {
            return Err(ParleyError::InvalidIdentifier(format!(
                "phone number `{raw}` is not a valid E.164 number"
            )));
        }

        Ok(Self(compact))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhoneNumber({})", self.0)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PhoneNumber {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = ParleyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PhoneNumber> for String {
    fn from(p: PhoneNumber) -> String {
        p.0
    }
}

/// A server-issued account identifier, canonically lowercase.
///
/// Account identifiers are UUID-shaped in production but the type only
/// enforces the normalization rules: trimmed, non-empty, no interior
/// whitespace, lowercase.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn parse(raw: &str) -> Result<Self, ParleyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParleyError::InvalidIdentifier(
                "account identifier must not be empty".into(),
            ));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ParleyError::InvalidIdentifier(format!(
                "account identifier `{trimmed}` contains whitespace"
            )));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = ParleyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AccountId> for String {
    fn from(a: AccountId) -> String {
        a.0
    }
}

/// Stable local identifier for an identity record. Generated once, never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub String);

impl LocalId {
    /// Generate a fresh random local id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which directory index a conflict was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum IndexField {
    PhoneNumber,
    AccountId,
}

/// One known contact.
///
/// A record stored in the directory always holds a phone number, an account
/// id, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub local_id: LocalId,
    pub phone_number: Option<PhoneNumber>,
    pub account_id: Option<AccountId>,
    /// Alternate-namespace identifier from the last lookup. Never indexed.
    pub secondary_id: Option<String>,
    /// When an authoritative check last confirmed the number has no account.
    pub unregistered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// Create a record with a freshly generated local id.
    pub fn new(
        phone_number: Option<PhoneNumber>,
        account_id: Option<AccountId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id: LocalId::generate(),
            phone_number,
            account_id,
            secondary_id: None,
            unregistered_at: None,
            updated_at: now,
        }
    }

    /// True when the record holds neither a phone number nor an account id.
    pub fn is_empty(&self) -> bool {
        self.phone_number.is_none() && self.account_id.is_none()
    }

    pub fn is_unregistered(&self) -> bool {
        self.unregistered_at.is_some()
    }
}

/// One durable write produced by reconciliation, applied in order.
///
/// Order matters: a merge strips or removes the subsumed record before the
/// survivor takes over its phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    Put(IdentityRecord),
    Remove(LocalId),
}

impl RecordChange {
    pub fn local_id(&self) -> &LocalId {
        match self {
            RecordChange::Put(record) => &record.local_id,
            RecordChange::Remove(id) => id,
        }
    }
}

/// A directory lookup hit for one phone number.
///
/// Results carrying only a secondary id are dropped by adapters before they
/// reach this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    pub account_id: AccountId,
    pub secondary_id: Option<String>,
}

/// The key an existence check is issued against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountSubject {
    /// The account id a record currently holds.
    Account(AccountId),
    /// A phone number whose record has no account id yet.
    PhoneNumber(PhoneNumber),
}

impl fmt::Display for AccountSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountSubject::Account(a) => write!(f, "account {a}"),
            AccountSubject::PhoneNumber(p) => write!(f, "phone {p}"),
        }
    }
}

/// An inbound record admitted into the visible timeline, stamped with an
/// ordering counter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrival {
    pub id: String,
    pub local_id: LocalId,
    pub counter: u64,
    pub received_at: DateTime<Utc>,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Directory,
    Checkpoint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn phone_number_strips_formatting() {
        let p = PhoneNumber::parse("+1 (321) 555-9876").unwrap();
        assert_eq!(p.as_str(), "+13215559876");
    }

    #[test]
    fn phone_number_requires_plus() {
        assert!(PhoneNumber::parse("13215559876").is_err());
    }

    #[test]
    fn phone_number_rejects_letters_and_short_input() {
        assert!(PhoneNumber::parse("+1321555ABCD").is_err());
        assert!(PhoneNumber::parse("+1234").is_err());
        assert!(PhoneNumber::parse("+01234567890").is_err());
    }

    #[test]
    fn account_id_is_lowercased() {
        let a = AccountId::parse("  ABCDEF-0123 ").unwrap();
        assert_eq!(a.as_str(), "abcdef-0123");
        assert_eq!(a, AccountId::parse("abcdef-0123").unwrap());
    }

    #[test]
    fn account_id_rejects_empty_and_whitespace() {
        assert!(AccountId::parse("   ").is_err());
        assert!(AccountId::parse("abc def").is_err());
    }

    #[test]
    fn serde_rejects_invalid_phone() {
        let parsed: Result<PhoneNumber, _> = serde_json::from_str("\"not-a-number\"");
        assert!(parsed.is_err());
        let ok: PhoneNumber = serde_json::from_str("\"+16545559876\"").unwrap();
        assert_eq!(ok.as_str(), "+16545559876");
    }

    #[test]
    fn empty_record_detection() {
        let mut record = IdentityRecord::new(None, Some(AccountId::parse("u1").unwrap()), Utc::now());
        assert!(!record.is_empty());
        record.account_id = None;
        assert!(record.is_empty());
    }

    #[test]
    fn local_ids_are_unique() {
        assert_ne!(LocalId::generate(), LocalId::generate());
    }

    #[test]
    fn adapter_type_round_trips_through_display() {
        for variant in [AdapterType::Storage, AdapterType::Directory, AdapterType::Checkpoint] {
            let parsed = AdapterType::from_str(&variant.to_string()).unwrap();
            assert_eq!(variant, parsed);
        }
    }

    proptest! {
        #[test]
        fn formatting_does_not_change_normalized_number(digits in "[1-9][0-9]{9,13}") {
            let plain = PhoneNumber::parse(&format!("+{digits}")).unwrap();
            let (head, tail) = digits.split_at(3);
            let formatted = PhoneNumber::parse(&format!("+{head} {tail}")).unwrap();
            prop_assert_eq!(plain, formatted);
        }
    }
}
