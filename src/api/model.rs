use crate::store::Account;
use base64::engine::general_purpose;
use base64::{alphabet, engine, DecodeError, Engine};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct RegisterRequest {
    #[serde(default)]
    pub allowfrom: Vec<String>,
    #[serde(default)]
    pub domain_name: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct RegisterResult {
    pub username: String,
    pub password: String,
    pub fulldomain: String,
    pub subdomain: String,
    pub allowfrom: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct UpdateRecordRequest {
    pub subdomain: String,
    pub txt: String,
}

#[derive(thiserror::Error, Debug)]
pub enum TxtValidationError {
    #[error("invalid encoding: {0}")]
    InvalidEncoding(DecodeError),
    #[error("invalid decoded length: found {actual} bytes, expected {expected}")]
    InvalidDecodedLength { actual: usize, expected: usize },
}

const DNS01_DECODED_LEN_BYTES: usize = 32;

lazy_static! {
    static ref BASE64_ENGINE: engine::GeneralPurpose =
        engine::GeneralPurpose::new(&alphabet::URL_SAFE, general_purpose::NO_PAD);
}

impl UpdateRecordRequest {
    pub fn valid_dns01(&self) -> Result<(), TxtValidationError> {
        let raw = BASE64_ENGINE
            .decode(&self.txt)
            .map_err(TxtValidationError::InvalidEncoding)?;
        if raw.len() == DNS01_DECODED_LEN_BYTES {
            Ok(())
        } else {
            Err(TxtValidationError::InvalidDecodedLength {
                actual: raw.len(),
                expected: DNS01_DECODED_LEN_BYTES,
            })
        }
    }
}

#[derive(Serialize, Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct UpdateRecordResult {
    pub txt: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct DomainResult {
    pub username: String,
    pub fulldomain: String,
    pub subdomain: String,
    pub allowfrom: Vec<String>,
    pub domain_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DomainResult {
    pub fn new(account: Account, domain: &str) -> Self {
        Self {
            username: account.identity.to_string(),
            fulldomain: account.fulldomain(domain),
            allowfrom: account.allow_from.normalize(),
            subdomain: account.subdomain,
            domain_name: account.label,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct UpdateNameRequest {
    pub fulldomain: String,
    #[serde(default)]
    pub domain_name: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct UpdateNameResult {
    pub success: bool,
    pub fulldomain: String,
    pub domain_name: String,
}
