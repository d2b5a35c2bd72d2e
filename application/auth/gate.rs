use std::fmt;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::oracle::DynAuthOracle;
use crate::repository::{CredentialError, DynCredentialRepository};

/// Which kinds of credentials a route accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthPolicy {
    BasicOrKey,
    KeyOnly,
    BasicOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    Basic,
    ApiKey,
}

/// The caller of the current request, once verified.
#[derive(Clone)]
pub struct AuthenticatedIdentity {
    pub identity: String,
    pub method: AuthMethod,
    /// The password, when the caller authenticated with one.
    pub secret: Option<String>,
}

impl fmt::Debug for AuthenticatedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedIdentity")
            .field("identity", &self.identity)
            .field("method", &self.method)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthRejection {
    #[error("authorization required")]
    AuthRequired,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Backend(#[from] CredentialError),
}

enum Presented<'a> {
    Basic(&'a str),
    Key(&'a str),
    Other(&'a str),
}

fn parse_authorization(value: &str) -> Presented<'_> {
    let value = value.trim();
    match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("basic") => {
            Presented::Basic(rest.trim())
        }
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => {
            Presented::Key(rest.trim())
        }
        Some((scheme, _)) => Presented::Other(scheme),
        // `gem push` sends the bare key
        None => Presented::Key(value),
    }
}

/// Lowercased `username` if it is an acceptable directory identity.
pub fn validate_username(username: &str) -> Option<String> {
    let mut bytes = username.bytes();
    let first = bytes.next()?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    if !bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return None;
    }

    Some(username.to_ascii_lowercase())
}

/// Decides who is making a request from its `Authorization` header.
pub struct AuthGate {
    oracle: DynAuthOracle,
    credentials: DynCredentialRepository,
    realm: String,
}

impl AuthGate {
    pub fn new(oracle: DynAuthOracle, credentials: DynCredentialRepository, realm: String) -> Self {
        Self {
            oracle,
            credentials,
            realm,
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        policy: AuthPolicy,
    ) -> Result<AuthenticatedIdentity, AuthRejection> {
        let Some(header) = headers.get(AUTHORIZATION) else {
            debug!("no credentials presented");
            return Err(AuthRejection::AuthRequired);
        };
        let header = header
            .to_str()
            .map_err(|_| AuthRejection::BadRequest("unreadable Authorization header".into()))?;

        match (parse_authorization(header), policy) {
            (Presented::Basic(encoded), AuthPolicy::BasicOnly | AuthPolicy::BasicOrKey) => {
                self.authenticate_basic(encoded).await
            }
            (Presented::Key(key), AuthPolicy::KeyOnly | AuthPolicy::BasicOrKey) => {
                self.authenticate_key(key).await
            }
            (Presented::Basic(_), AuthPolicy::KeyOnly) => {
                warn!("password presented where an api key is required");
                Err(AuthRejection::AuthRequired)
            }
            (Presented::Other(scheme), AuthPolicy::KeyOnly) => {
                warn!(scheme, "unsupported authorization scheme");
                Err(AuthRejection::AuthRequired)
            }
            (Presented::Key(_), AuthPolicy::BasicOnly) => Err(AuthRejection::BadRequest(
                "Basic credentials are required".into(),
            )),
            (Presented::Other(scheme), _) => Err(AuthRejection::BadRequest(format!(
                "unsupported authorization scheme {scheme}"
            ))),
        }
    }

    async fn authenticate_basic(
        &self,
        encoded: &str,
    ) -> Result<AuthenticatedIdentity, AuthRejection> {
        let decoded = STANDARD
            .decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| AuthRejection::BadRequest("malformed Basic credentials".into()))?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| AuthRejection::BadRequest("malformed Basic credentials".into()))?;

        let Some(identity) = validate_username(username) else {
            warn!("rejected invalid username");
            return Err(AuthRejection::AuthRequired);
        };

        if !self.oracle.bind(&identity, password).await {
            warn!(%identity, "authentication failed");
            return Err(AuthRejection::AuthRequired);
        }

        debug!(%identity, "authenticated with password");
        Ok(AuthenticatedIdentity {
            identity,
            method: AuthMethod::Basic,
            secret: Some(password.to_string()),
        })
    }

    async fn authenticate_key(&self, key: &str) -> Result<AuthenticatedIdentity, AuthRejection> {
        if key.is_empty() {
            return Err(AuthRejection::AuthRequired);
        }
        let Some(credential) = self.credentials.find_by_key(key).await? else {
            warn!("unknown api key presented");
            return Err(AuthRejection::AuthRequired);
        };

        debug!(identity = %credential.identity, "authenticated with api key");
        Ok(AuthenticatedIdentity {
            identity: credential.identity,
            method: AuthMethod::ApiKey,
            secret: None,
        })
    }
}
