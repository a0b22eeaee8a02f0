//! Bearer-token authentication.
//!
//! Components, leaf-first:
//!
//! - [`key_cache`] - kid → RSA public key, replaced atomically
//! - [`jwks`] - fetches the issuer's key set and feeds the cache
//! - [`token`] - splits and decodes compact tokens
//! - [`validator`] - signature and claim policy
//! - [`revocation`] - fail-closed revocation lookups
//! - [`identity`] - verified identity and downstream headers
//! - [`rejection`] - failure taxonomy and the opaque 401

pub mod identity;
pub mod jwks;
pub mod key_cache;
pub mod rejection;
pub mod revocation;
pub mod token;
pub mod validator;

pub use identity::{AuthenticationResult, USER_ID_HEADER, USER_ROLES_HEADER};
pub use jwks::{
    JwksClient, KeyDescriptor, KeySetDocument, KeySource, RefreshOutcome, MAX_KEY_SET_BYTES,
};
pub use key_cache::{KeyCache, KeyParseError, SigningKeyEntry};
pub use rejection::{AuthRejection, KeyFetchError};
pub use revocation::{
    InMemoryRevocationStore, RedisRevocationStore, RevocationChecker, RevocationStore,
    RevocationStoreError,
};
pub use token::{decode, DecodedToken, TokenClaims, TokenHeader};
pub use validator::{ClaimPolicy, ClaimValidator};
