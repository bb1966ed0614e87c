//! Credential-store records and their normalization.
//!
//! The store is a JSON array of loosely shaped records. Normalization runs
//! once per load and turns them into [`TokenRecord`]s whose tokens compare
//! byte-for-byte with canonical reader output:
//!
//! - records without a token or with an unknown kind are dropped
//! - a missing owner becomes `"USER NOT GIVEN"`
//! - `:` separators are stripped and hex is upper-cased
//! - card UIDs longer than the reader can report are shortened the way the
//!   reader shortens them
//!
//! Duplicate merging happens when the records are assembled into a
//! [`TokenTable`](crate::authority::TokenTable).

use doorman_core::constants::{
    LONG_UID_KEPT_CHARS, LONG_UID_PREFIX, MAX_READER_TOKEN_LEN, OWNER_NOT_GIVEN, TOKEN_SEPARATOR,
};
use doorman_core::{PipelineConfig, Result, TokenKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One record as written in the credential store.
///
/// Field names follow the store format; the older `value`, `type` and
/// `user` spellings are accepted too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(default, alias = "value")]
    pub token: Option<String>,

    #[serde(default, alias = "type")]
    pub kind: Option<String>,

    #[serde(default, alias = "user")]
    pub owner: Option<String>,
}

impl StoredCredential {
    pub fn new(token: impl Into<String>, kind: TokenKind, owner: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            kind: Some(kind.as_str().to_string()),
            owner: Some(owner.into()),
        }
    }
}

/// A normalized credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    pub kind: TokenKind,
    pub owner: String,
}

/// Parse a credential store from JSON.
///
/// # Errors
/// Returns `Error::Json` if the document is not an array of objects.
/// Individual bad records are dropped with a warning rather than failing
/// the whole load.
pub fn parse_store(json: &str) -> Result<Vec<StoredCredential>> {
    Ok(serde_json::from_str(json)?)
}

/// Normalize stored records for the card reader configured in `config`.
pub fn normalize(records: Vec<StoredCredential>, config: &PipelineConfig) -> Vec<TokenRecord> {
    let reader_width = config
        .card_layout()
        .map_or(MAX_READER_TOKEN_LEN, |layout| layout.width);

    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| normalize_record(index, record, reader_width))
        .collect()
}

fn normalize_record(index: usize, record: StoredCredential, reader_width: usize) -> Option<TokenRecord> {
    let Some(raw_token) = record.token.filter(|t| !t.trim().is_empty()) else {
        warn!(index, "credential without a token, skipping");
        return None;
    };

    let Some(kind) = record.kind.as_deref().and_then(TokenKind::from_name) else {
        warn!(index, kind = ?record.kind, "credential with unknown kind, skipping");
        return None;
    };

    let owner = match record.owner.map(|o| o.trim().to_string()) {
        Some(owner) if !owner.is_empty() => owner,
        _ => {
            warn!(index, "credential without an owner");
            OWNER_NOT_GIVEN.to_string()
        }
    };

    let mut token: String = raw_token
        .trim()
        .chars()
        .filter(|&c| c != TOKEN_SEPARATOR)
        .collect::<String>()
        .to_ascii_uppercase();

    if kind == TokenKind::Card {
        token = shorten_card_uid(token, reader_width);
    }

    if token.is_empty() {
        warn!(index, "credential token empty after normalization, skipping");
        return None;
    }

    Some(TokenRecord { token, kind, owner })
}

/// Reduce a stored card UID to what the reader reports for it.
///
/// 7-byte UIDs are reported as a `88` cascade tag followed by their first
/// three bytes. Readers narrower than four bytes report the leading bytes
/// only.
fn shorten_card_uid(mut token: String, reader_width: usize) -> String {
    if token.len() > MAX_READER_TOKEN_LEN {
        let kept: String = token.chars().take(LONG_UID_KEPT_CHARS).collect();
        token = format!("{LONG_UID_PREFIX}{kept}");
    }
    if reader_width < MAX_READER_TOKEN_LEN && token.len() == MAX_READER_TOKEN_LEN {
        token.truncate(reader_width);
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config_34() -> PipelineConfig {
        PipelineConfig::default()
    }

    fn config_26() -> PipelineConfig {
        PipelineConfig::default().card_bits(26)
    }

    fn card(token: &str) -> StoredCredential {
        StoredCredential::new(token, TokenKind::Card, "alice")
    }

    #[rstest]
    #[case("04a2197b", "04A2197B")]
    #[case("04:A2:19:7B", "04A2197B")]
    #[case(" 04a2197b ", "04A2197B")]
    #[case("04A2197B11", "8804A219")]
    #[case("04:a2:19:7b:11:22:33", "8804A219")]
    fn test_card_tokens_for_34_bit_reader(#[case] stored: &str, #[case] expected: &str) {
        let records = normalize(vec![card(stored)], &config_34());
        assert_eq!(records[0].token, expected);
    }

    #[rstest]
    #[case("04A2197B", "04A219")]
    #[case("04:A2:19:7B:11:22:33", "8804A2")]
    #[case("ABCD", "ABCD")]
    fn test_card_tokens_for_26_bit_reader(#[case] stored: &str, #[case] expected: &str) {
        let records = normalize(vec![card(stored)], &config_26());
        assert_eq!(records[0].token, expected);
    }

    #[test]
    fn test_codes_are_not_shortened() {
        let records = normalize(
            vec![StoredCredential::new("1234567890", TokenKind::Code, "bob")],
            &config_26(),
        );
        assert_eq!(records[0].token, "1234567890");
        assert_eq!(records[0].kind, TokenKind::Code);
    }

    #[test]
    fn test_parse_accepts_legacy_keys() {
        let json = r#"[
            {"value": "04a2197b", "type": "card", "user": "alice"},
            {"token": "4321", "kind": "code", "owner": "bob"}
        ]"#;
        let records = normalize(parse_store(json).unwrap(), &config_34());
        assert_eq!(
            records,
            vec![
                TokenRecord {
                    token: "04A2197B".into(),
                    kind: TokenKind::Card,
                    owner: "alice".into()
                },
                TokenRecord {
                    token: "4321".into(),
                    kind: TokenKind::Code,
                    owner: "bob".into()
                },
            ]
        );
    }

    #[test]
    fn test_bad_records_are_dropped() {
        let json = r#"[
            {"type": "card", "user": "no token"},
            {"value": "", "type": "card"},
            {"value": "::", "type": "card"},
            {"value": "1234", "type": "fingerprint"},
            {"value": "1234"},
            {"value": "1234", "type": "code"}
        ]"#;
        let records = normalize(parse_store(json).unwrap(), &config_34());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].token, "1234");
        assert_eq!(records[0].owner, OWNER_NOT_GIVEN);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_store(r#"{"value": "1234"}"#).is_err());
    }
}
