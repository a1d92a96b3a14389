use std::collections::HashMap;

use {
    hmac::{Hmac, Mac},
    sha2::Sha256,
    subtle::ConstantTimeEq,
};

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Literal separator between env content and its signature.
pub const SIGNATURE_SEPARATOR: &str = "\n---MK8-SIGNATURE---\n";

fn mac(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key)
        .map_err(|_| Error::Signature("invalid key length".to_string()))
}

/// Sign env content with the machine-local key. Output is the content, the
/// separator, and a lowercase hex HMAC-SHA256 of the content.
pub fn sign(content: &str, key: &[u8]) -> Result<String> {
    let mut m = mac(key)?;
    m.update(content.as_bytes());
    let tag = m.finalize().into_bytes();
    let hex: String = tag.iter().map(|b| format!("{b:02x}")).collect();
    Ok(format!("{content}{SIGNATURE_SEPARATOR}{hex}"))
}

/// Verify a signed env file and return the env content portion.
///
/// A missing separator, empty signature, undecodable hex, or mismatched tag
/// is a fatal [`Error::Signature`]. The tag comparison is constant-time.
pub fn verify_and_extract(raw: &str, key: &[u8]) -> Result<String> {
    let Some(split_at) = raw.find(SIGNATURE_SEPARATOR) else {
        return Err(Error::Signature("missing signature separator".to_string()));
    };
    let content = &raw[..split_at];
    let signature = raw[split_at + SIGNATURE_SEPARATOR.len()..].trim();
    if signature.is_empty() {
        return Err(Error::Signature("empty signature".to_string()));
    }

    let provided = decode_hex(signature)
        .ok_or_else(|| Error::Signature("signature is not valid hex".to_string()))?;

    let mut m = mac(key)?;
    m.update(content.as_bytes());
    let expected = m.finalize().into_bytes();

    if provided.len() != expected.len() || provided.ct_eq(expected.as_slice()).unwrap_u8() != 1 {
        return Err(Error::Signature("signature mismatch".to_string()));
    }

    Ok(content.to_string())
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Parse verified env content into a map. Blank lines and `#` comments are
/// ignored; values may carry surrounding single or double quotes.
#[must_use]
pub fn parse_env(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        out.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    out
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
