//! HTTP Digest authentication (RFC 2617, MD5 with `qop=auth`).

use std::collections::HashMap;

use md5::{Digest, Md5};
use rand::Rng;
use thiserror::Error;

/// Nonce count sent with every response; each negotiated header is used for
/// a fresh nonce only once before the device asks again.
pub const NONCE_COUNT: &str = "00000001";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("WWW-Authenticate header missing from 401 response")]
    MissingChallenge,
    #[error("WWW-Authenticate header is not Digest: '{0}'")]
    NotDigest(String),
    #[error("malformed digest challenge: {0}")]
    Malformed(String),
    #[error("digest algorithm not supported: {0} != MD5")]
    UnsupportedAlgorithm(String),
    #[error("digest qop not supported: {0} != auth")]
    UnsupportedQop(String),
}

/// Parameters of a `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub algorithm: Option<String>,
    pub opaque: Option<String>,
}

impl DigestChallenge {
    pub fn parse(header: &str) -> Result<Self, AuthError> {
        let header = header.trim();
        let params = match header.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("digest") => rest,
            _ => return Err(AuthError::NotDigest(header.to_string())),
        };
        let mut params = parse_params(params)?;
        let realm = params
            .remove("realm")
            .ok_or_else(|| AuthError::Malformed("realm missing".into()))?;
        let nonce = params
            .remove("nonce")
            .ok_or_else(|| AuthError::Malformed("nonce missing".into()))?;
        Ok(Self {
            realm,
            nonce,
            qop: params.remove("qop"),
            algorithm: params.remove("algorithm"),
            opaque: params.remove("opaque"),
        })
    }

    /// Build the `Authorization` header value answering this challenge.
    pub fn authorize(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> Result<String, AuthError> {
        let algorithm = self.algorithm.as_deref().unwrap_or("MD5");
        if !algorithm.eq_ignore_ascii_case("MD5") {
            return Err(AuthError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        let qop = self.qop.as_deref().unwrap_or_default();
        if !qop.split(',').any(|option| option.trim() == "auth") {
            return Err(AuthError::UnsupportedQop(qop.to_string()));
        }

        let ha1 = md5_hex(&format!("{username}:{}:{password}", self.realm));
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        let response = md5_hex(&format!(
            "{ha1}:{}:{NONCE_COUNT}:{cnonce}:auth:{ha2}",
            self.nonce
        ));

        let mut header = format!(
            "Digest username=\"{username}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", \
             cnonce=\"{cnonce}\", nc={NONCE_COUNT}, qop=auth, response=\"{response}\", algorithm=MD5",
            self.realm, self.nonce
        );
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        Ok(header)
    }
}

/// Eight random bytes from the thread-local CSPRNG, hex encoded.
pub fn random_cnonce() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Split `key=value, key="quoted, value"` pairs. Keys are lowercased.
fn parse_params(input: &str) -> Result<HashMap<String, String>, AuthError> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.next() != Some('=') {
            return Err(AuthError::Malformed(format!("parameter '{}' has no value", key.trim())));
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return Err(AuthError::Malformed(format!(
                    "unterminated quote in '{}'",
                    key.trim()
                )));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim_end().to_string();
        }
        params.insert(key.trim().to_ascii_lowercase(), value);
    }
    Ok(params)
}
