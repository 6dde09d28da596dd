//! Line-oriented credential handshake.
//!
//! The client sends `username\n` and then `sha256_hex(trim(password))\n`; the server
//! answers with a single verdict line. The server only ever sees the digest, so a
//! captured digest is as good as the password. The channel is not encrypted.
//!
//! Credentials live in an injected, read-only [`CredentialStore`]; there is no global
//! state and nothing is mutated after startup.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::core::reader::read_line;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::status::{AUTH_FAILED, AUTH_SUCCESS};

/// Length of a hex-encoded SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 of the password with surrounding whitespace removed.
pub fn sha256_hex(password: &str) -> String {
    let digest = Sha256::digest(password.trim().as_bytes());
    hex::encode(digest)
}

/// Whether `hash` looks like a lowercase hex SHA-256 digest.
pub fn is_valid_hash_hex(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(ProtocolError::InvalidCredential(
            constants::ERR_EMPTY_USERNAME.into(),
        ));
    }
    if username.contains('\n') {
        return Err(ProtocolError::InvalidCredential(
            constants::ERR_USERNAME_NEWLINE.into(),
        ));
    }
    Ok(())
}

/// A username and the digest of its password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password_hash_hex: String,
}

impl Credential {
    /// Build from an already-computed digest, which must be 64 lowercase hex characters.
    pub fn new(username: impl Into<String>, password_hash_hex: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password_hash_hex = password_hash_hex.into();
        validate_username(&username)?;
        if !is_valid_hash_hex(&password_hash_hex) {
            return Err(ProtocolError::InvalidCredential(
                constants::ERR_INVALID_HASH.into(),
            ));
        }
        Ok(Self {
            username,
            password_hash_hex,
        })
    }

    /// Build from a raw password, hashing it the same way the client does.
    pub fn from_password(username: impl Into<String>, password: &str) -> Result<Self> {
        Self::new(username, sha256_hex(password))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password_hash_hex(&self) -> &str {
        &self.password_hash_hex
    }
}

/// Read-only lookup of expected password digests by exact, case-sensitive username
pub trait CredentialStore: Send + Sync {
    fn get(&self, username: &str) -> Option<&str>;
}

/// In-memory credential store built once at startup
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    entries: HashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential while building the store
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.entries
            .insert(credential.username, credential.password_hash_hex);
        self
    }

    pub fn from_credentials(credentials: impl IntoIterator<Item = Credential>) -> Self {
        credentials
            .into_iter()
            .fold(Self::new(), |store, credential| store.with_credential(credential))
    }

    /// Build from `(username, digest)` pairs, validating every digest
    pub fn from_hashes(entries: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut store = Self::new();
        for (username, hash) in entries {
            store = store.with_credential(Credential::new(username, hash)?);
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, username: &str) -> Option<&str> {
        self.entries.get(username).map(String::as_str)
    }
}

/// Outcome of a server-side handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated { username: String },
    Rejected,
}

impl AuthResult {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthResult::Authenticated { .. })
    }

    /// The verdict line the server sends for this outcome
    pub fn verdict_line(&self) -> &'static str {
        match self {
            AuthResult::Authenticated { .. } => AUTH_SUCCESS,
            AuthResult::Rejected => AUTH_FAILED,
        }
    }
}

/// Check a supplied digest against the store.
///
/// The digest comparison runs in constant time with respect to its contents.
pub fn verify_credentials(
    store: &dyn CredentialStore,
    username: &str,
    password_hash_hex: &str,
) -> AuthResult {
    let Some(expected) = store.get(username) else {
        return AuthResult::Rejected;
    };
    if bool::from(expected.as_bytes().ct_eq(password_hash_hex.as_bytes())) {
        AuthResult::Authenticated {
            username: username.to_string(),
        }
    } else {
        AuthResult::Rejected
    }
}

/// Server side: read the username and digest lines and check them against `store`.
///
/// Transport failures are errors; bad credentials are an `AuthResult::Rejected` value.
#[instrument(skip(source, store))]
pub async fn authenticate<R>(source: &mut R, store: &dyn CredentialStore) -> Result<AuthResult>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let username = read_line(source).await?;
    let password_hash_hex = read_line(source).await?;
    debug!(%username, "Handshake credentials received");
    Ok(verify_credentials(store, &username, &password_hash_hex))
}

/// Client side: send the credentials and wait for the verdict.
///
/// Returns the verdict line when authenticated and
/// [`ProtocolError::AuthenticationRejected`] carrying the line otherwise. The username
/// line is written and flushed before the digest line.
#[instrument(skip(reader, writer, password))]
pub async fn client_handshake<R, W>(
    reader: &mut R,
    writer: &mut W,
    username: &str,
    password: &str,
) -> Result<String>
where
    R: AsyncBufRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let username = username.trim();
    validate_username(username)?;
    let hash = sha256_hex(password);

    writer.write_all(format!("{username}\n").as_bytes()).await?;
    writer.flush().await?;
    writer.write_all(format!("{hash}\n").as_bytes()).await?;
    writer.flush().await?;

    let verdict = read_line(reader).await?;
    if verdict == AUTH_SUCCESS {
        debug!("Handshake accepted");
        Ok(verdict)
    } else {
        debug!(%verdict, "Handshake rejected");
        Err(ProtocolError::AuthenticationRejected(verdict))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    const PASSWORD_HASH: &str = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";

    fn store() -> MemoryCredentialStore {
        MemoryCredentialStore::new()
            .with_credential(Credential::new("user1", PASSWORD_HASH).unwrap())
    }

    #[test]
    fn sha256_hex_trims_password() {
        assert_eq!(sha256_hex("password"), PASSWORD_HASH);
        assert_eq!(sha256_hex("  password\n"), PASSWORD_HASH);
        assert_eq!(sha256_hex("password").len(), HASH_HEX_LEN);
    }

    #[test]
    fn hash_validation() {
        assert!(is_valid_hash_hex(PASSWORD_HASH));
        assert!(!is_valid_hash_hex(&PASSWORD_HASH.to_uppercase()));
        assert!(!is_valid_hash_hex(&PASSWORD_HASH[..63]));
        assert!(!is_valid_hash_hex(""));
        assert!(Credential::new("user1", "not-a-hash").is_err());
        assert!(Credential::new("", PASSWORD_HASH).is_err());
    }

    #[test]
    fn verify_requires_exact_match() {
        let store = store();
        assert_eq!(
            verify_credentials(&store, "user1", PASSWORD_HASH),
            AuthResult::Authenticated {
                username: "user1".into()
            }
        );
        assert_eq!(
            verify_credentials(&store, "User1", PASSWORD_HASH),
            AuthResult::Rejected
        );
        assert_eq!(
            verify_credentials(&store, "user1", &sha256_hex("wrong")),
            AuthResult::Rejected
        );
        assert_eq!(verify_credentials(&store, "", ""), AuthResult::Rejected);
        assert_eq!(verify_credentials(&store, "user1", ""), AuthResult::Rejected);
    }

    #[tokio::test]
    async fn authenticate_reads_two_lines() {
        let input = format!("user1\n{PASSWORD_HASH}\n");
        let mut source = input.as_bytes();
        let result = authenticate(&mut source, &store()).await.unwrap();
        assert!(result.is_authenticated());
        assert_eq!(result.verdict_line(), AUTH_SUCCESS);
    }

    #[tokio::test]
    async fn authenticate_rejects_empty_input_lines() {
        let mut source: &[u8] = b"\n\n";
        let result = authenticate(&mut source, &store()).await.unwrap();
        assert_eq!(result, AuthResult::Rejected);
        assert_eq!(result.verdict_line(), AUTH_FAILED);
    }

    #[tokio::test]
    async fn authenticate_fails_on_early_close() {
        let mut source: &[u8] = b"user1\n";
        let err = authenticate(&mut source, &store()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn client_handshake_sends_username_then_digest() {
        let reply = format!("{AUTH_SUCCESS}\n").into_bytes();
        let mut reader: &[u8] = &reply;
        let mut sent = Vec::new();
        let verdict = client_handshake(&mut reader, &mut sent, "user1", "password\n")
            .await
            .unwrap();
        assert_eq!(verdict, AUTH_SUCCESS);
        assert_eq!(sent, format!("user1\n{PASSWORD_HASH}\n").into_bytes());
    }

    #[tokio::test]
    async fn client_handshake_surfaces_rejection_verbatim() {
        let mut reader: &[u8] = b"Authentication failed\n";
        let mut sent = Vec::new();
        let err = client_handshake(&mut reader, &mut sent, "user1", "nope")
            .await
            .unwrap_err();
        match err {
            ProtocolError::AuthenticationRejected(line) => assert_eq!(line, AUTH_FAILED),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
