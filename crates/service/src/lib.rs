//! Service layer for the auth proxy.
//! - Talks to the identity provider through the `IdentityProvider` seam.
//! - Owns the server-side session store.
//! - Implements the login/register/logout/user/refresh workflow independent of the web framework.

pub mod auth;
pub mod session;
