//! Staff authentication: roles and page access, JWT access tokens, Argon2
//! password hashing and logout revocation.

pub mod passwords;
pub mod roles;
pub mod session;
pub mod tokens;

pub use roles::{Page, Role, DEFAULT_PAGE};
pub use session::SessionRegistry;
pub use tokens::{IssuedToken, TokenClaims, TokenService};
