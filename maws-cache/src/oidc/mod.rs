//! OIDC ID token handling and validation.

pub mod token;
pub mod validation;

pub use token::{IdToken, IdTokenClaims, StringOrVec, VerifiedIdToken};
pub use validation::{TokenValidator, ValidationError};
