use std::borrow::Cow;
use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const FINGERPRINT_PREFIX: &str = "sha256:";

/// Content fingerprint recorded in the managed baseline: `sha256:<hex>` over
/// the line-ending-normalized bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn parse(value: &str) -> Result<Self> {
        let Some(digest) = value.strip_prefix(FINGERPRINT_PREFIX) else {
            return Err(anyhow!(
                "invalid fingerprint '{value}': expected '{FINGERPRINT_PREFIX}' prefix"
            ));
        };
        if digest.len() != 64 || !digest.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(anyhow!(
                "invalid fingerprint '{value}': expected 64 hex characters"
            ));
        }
        Ok(Self(format!("{FINGERPRINT_PREFIX}{}", digest.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

pub fn normalize_line_endings(content: &[u8]) -> Cow<'_, [u8]> {
    if !content.windows(2).any(|pair| pair == b"\r\n") {
        return Cow::Borrowed(content);
    }

    let mut normalized = Vec::with_capacity(content.len());
    let mut index = 0;
    while index < content.len() {
        if content[index] == b'\r' && content.get(index + 1) == Some(&b'\n') {
            index += 1;
            continue;
        }
        normalized.push(content[index]);
        index += 1;
    }
    Cow::Owned(normalized)
}

pub fn fingerprint_content(content: &[u8]) -> Fingerprint {
    let normalized = normalize_line_endings(content);
    let digest = Sha256::digest(normalized.as_ref());
    Fingerprint(format!("{FINGERPRINT_PREFIX}{}", hex::encode(digest)))
}
