use std::fmt;
use thiserror::Error;

/// The kind of a cluster certificate authority.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CaKind {
    /// The cluster's host certificate authority; its JWT key pair mints
    /// application assertions.
    Host,

    /// The user certificate authority. Not consulted by the gateway.
    User,
}

impl CaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaKind::Host => "host",
            CaKind::User => "user",
        }
    }
}

impl fmt::Display for CaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Identifies a certificate authority in the cluster's key store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CertAuthorityId {
    pub kind: CaKind,
    pub domain: String,
}

impl CertAuthorityId {
    pub fn host(domain: impl Into<String>) -> Self {
        Self {
            kind: CaKind::Host,
            domain: domain.into(),
        }
    }
}

impl fmt::Display for CertAuthorityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.domain)
    }
}

/// Signing algorithms the assertion signer supports.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JwtAlgorithm {
    /// RSA-SHA256 with PEM-encoded keys; the production configuration.
    Rs256,

    /// HMAC-SHA256 with a shared secret; single-process deployments.
    Hs256,
}

/// JWT signing material carried by a certificate authority.
#[derive(Clone, PartialEq, Eq)]
pub struct JwtKeyPair {
    pub algorithm: JwtAlgorithm,

    /// PEM private key (RS256) or the raw secret (HS256).
    pub signing_key: Vec<u8>,

    /// PEM public key (RS256) or the same secret (HS256). Distributed to
    /// backends for assertion verification.
    pub verifying_key: Vec<u8>,
}

// Key material stays out of logs.
impl fmt::Debug for JwtKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeyPair")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
#[error("certificate authority {id} has no JWT key pair")]
pub struct NoJwtKeyPair {
    pub id: CertAuthorityId,
}

/// A certificate authority fetched from the cluster's key store. The store
/// owns rotation and caching; the gateway reads it fresh per request.
#[derive(Clone, Debug)]
pub struct CertAuthority {
    pub id: CertAuthorityId,
    jwt_key_pair: Option<JwtKeyPair>,
}

// === impl CertAuthority ===

impl CertAuthority {
    pub fn new(id: CertAuthorityId, jwt_key_pair: Option<JwtKeyPair>) -> Self {
        Self { id, jwt_key_pair }
    }

    pub fn jwt_key_pair(&self) -> Result<&JwtKeyPair, NoJwtKeyPair> {
        self.jwt_key_pair.as_ref().ok_or_else(|| NoJwtKeyPair {
            id: self.id.clone(),
        })
    }
}
