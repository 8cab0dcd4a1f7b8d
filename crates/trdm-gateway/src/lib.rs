//! Signed access to the TRDM API gateway.
//!
//! Requests are signed with AWS Signature Version 4 ([`SigV4Signer`]) using
//! short-lived credentials obtained by assuming a role
//! ([`AssumeRoleProvider`]). A request that cannot be signed is never sent.

pub mod credentials;
pub mod error;
pub mod sigv4;
pub mod sts;

pub use credentials::{CredentialProvider, StaticCredentialProvider, TemporaryCredentials};
pub use error::{GatewayError, GatewayResult};
pub use sigv4::{GatewayRequest, SigV4Signer, DEFAULT_SERVICE};
pub use sts::{AssumeRoleConfig, AssumeRoleProvider, CredentialCache};
