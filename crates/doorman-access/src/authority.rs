//! Credential authority.
//!
//! Holds the deduplicated token table and answers lookups. The table is
//! immutable once built; a reload swaps in a whole new table, so a lookup
//! sees either the old set or the new one and never a mix.

use crate::records::{self, StoredCredential, TokenRecord};
use doorman_core::constants::OWNER_SEPARATOR;
use doorman_core::{CanonicalToken, PipelineConfig, Result, TokenKind};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use subtle::{Choice, ConstantTimeEq};
use tracing::{info, warn};

/// Result of a credential lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Allow { owner: String },
    Deny,
}

/// Deduplicated, immutable set of credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenTable {
    records: Vec<TokenRecord>,
}

impl TokenTable {
    /// Build a table, merging records with the same token and kind.
    ///
    /// The first occurrence keeps its position; later owners are appended
    /// to it.
    pub fn new(records: impl IntoIterator<Item = TokenRecord>) -> Self {
        let mut merged: Vec<TokenRecord> = Vec::new();
        let mut positions: HashMap<(String, TokenKind), usize> = HashMap::new();

        for record in records {
            match positions.get(&(record.token.clone(), record.kind)) {
                Some(&index) => {
                    let existing = &mut merged[index];
                    existing.owner.push_str(OWNER_SEPARATOR);
                    existing.owner.push_str(&record.owner);
                    warn!(kind = %record.kind, owners = %existing.owner, "duplicate credential merged");
                }
                None => {
                    positions.insert((record.token.clone(), record.kind), merged.len());
                    merged.push(record);
                }
            }
        }

        Self { records: merged }
    }

    /// Normalize stored records and build a table from them.
    pub fn from_stored(records: Vec<StoredCredential>, config: &PipelineConfig) -> Self {
        Self::new(records::normalize(records, config))
    }

    /// Parse a JSON credential store and build a table from it.
    ///
    /// # Errors
    /// Returns `Error::Json` if the document cannot be parsed.
    pub fn from_json(json: &str, config: &PipelineConfig) -> Result<Self> {
        Ok(Self::from_stored(records::parse_store(json)?, config))
    }

    /// Read a JSON credential store from disk and build a table from it.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read and `Error::Json` if it
    /// cannot be parsed.
    pub fn from_path(path: impl AsRef<Path>, config: &PipelineConfig) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?, config)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenRecord> {
        self.records.iter()
    }

    /// Find the record granting `token`.
    ///
    /// Every record is compared with [`ConstantTimeEq`], and the scan does
    /// not stop at the first match.
    #[must_use]
    pub fn lookup(&self, token: &CanonicalToken) -> Option<&TokenRecord> {
        let wanted = token.as_str().as_bytes();
        let mut found = None;
        for record in &self.records {
            let same_kind = Choice::from(u8::from(record.kind == token.kind()));
            let hit: bool = (same_kind & record.token.as_bytes().ct_eq(wanted)).into();
            if hit && found.is_none() {
                found = Some(record);
            }
        }
        found
    }
}

/// Shared credential authority.
///
/// Lookups clone the current table snapshot and release the lock at once,
/// so they never wait on each other and a reload never waits on a lookup
/// in progress.
#[derive(Debug, Default)]
pub struct CredentialAuthority {
    table: RwLock<Option<Arc<TokenTable>>>,
}

impl CredentialAuthority {
    /// Authority with no credential set loaded. Every lookup is denied.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: TokenTable) -> Self {
        Self {
            table: RwLock::new(Some(Arc::new(table))),
        }
    }

    /// Current table, if one is loaded.
    pub fn snapshot(&self) -> Option<Arc<TokenTable>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up a token.
    pub fn lookup(&self, token: &CanonicalToken) -> Lookup {
        let Some(table) = self.snapshot() else {
            warn!(kind = %token.kind(), "no credential set loaded, denying");
            return Lookup::Deny;
        };
        match table.lookup(token) {
            Some(record) => Lookup::Allow {
                owner: record.owner.clone(),
            },
            None => Lookup::Deny,
        }
    }

    /// Atomically replace the credential set.
    pub fn reload(&self, table: TokenTable) {
        let count = table.len();
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(table));
        info!(credentials = count, "credential set reloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorman_core::Error;
    use rstest::rstest;

    fn record(token: &str, kind: TokenKind, owner: &str) -> TokenRecord {
        TokenRecord {
            token: token.to_string(),
            kind,
            owner: owner.to_string(),
        }
    }

    fn table() -> TokenTable {
        TokenTable::new([
            record("04A2197B", TokenKind::Card, "alice"),
            record("1234", TokenKind::Code, "bob"),
        ])
    }

    #[test]
    fn test_duplicates_merge_owners() {
        let table = TokenTable::new([
            record("1234", TokenKind::Code, "bob"),
            record("04A2197B", TokenKind::Card, "alice"),
            record("1234", TokenKind::Code, "carol"),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.lookup(&CanonicalToken::code("1234")).unwrap().owner,
            "bob | carol"
        );
    }

    #[test]
    fn test_same_value_different_kind_kept_apart() {
        let table = TokenTable::new([
            record("1234", TokenKind::Code, "bob"),
            record("1234", TokenKind::Card, "dave"),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup(&CanonicalToken::card("1234")).unwrap().owner, "dave");
    }

    #[test]
    fn test_loading_twice_is_idempotent() {
        let json = r#"[
            {"value": "04a2197b", "type": "card", "user": "alice"},
            {"value": "04:A2:19:7B", "type": "card", "user": "eve"}
        ]"#;
        let config = PipelineConfig::default();
        let first = TokenTable::from_json(json, &config).unwrap();
        let second = TokenTable::from_json(json, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first.iter().next().unwrap().owner, "alice | eve");
    }

    #[rstest]
    #[case(CanonicalToken::card("04A2197B"), Lookup::Allow { owner: "alice".into() })]
    #[case(CanonicalToken::code("1234"), Lookup::Allow { owner: "bob".into() })]
    #[case(CanonicalToken::code("04A2197B"), Lookup::Deny)]
    #[case(CanonicalToken::card("04a2197b"), Lookup::Deny)]
    #[case(CanonicalToken::code("123"), Lookup::Deny)]
    #[case(CanonicalToken::code(""), Lookup::Deny)]
    fn test_lookup(#[case] token: CanonicalToken, #[case] expected: Lookup) {
        let authority = CredentialAuthority::with_table(table());
        assert_eq!(authority.lookup(&token), expected);
    }

    #[test]
    fn test_missing_token_file_is_io_error() {
        let config = PipelineConfig::default();
        let result = TokenTable::from_path("/nonexistent/doorman/tokens.json", &config);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_no_table_denies_everything() {
        let authority = CredentialAuthority::new();
        assert!(authority.snapshot().is_none());
        assert_eq!(authority.lookup(&CanonicalToken::code("1234")), Lookup::Deny);
    }

    #[test]
    fn test_reload_swaps_whole_table() {
        let authority = CredentialAuthority::with_table(table());
        let before = authority.snapshot().unwrap();

        authority.reload(TokenTable::new([record("9999", TokenKind::Code, "zed")]));

        // A snapshot taken before the reload still sees the old set.
        assert!(before.lookup(&CanonicalToken::code("1234")).is_some());
        assert_eq!(authority.lookup(&CanonicalToken::code("1234")), Lookup::Deny);
        assert_eq!(
            authority.lookup(&CanonicalToken::code("9999")),
            Lookup::Allow { owner: "zed".into() }
        );
    }
}
