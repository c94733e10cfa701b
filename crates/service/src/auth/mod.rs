//! Auth module: provider client, validation, and the proxy workflow.
//!
//! The workflow never hands raw provider tokens to its callers; they live in the session.

pub mod domain;
pub mod errors;
pub mod provider;
pub mod supabase;
pub mod validation;
pub mod service;

pub use provider::IdentityProvider;
pub use service::AuthService;
pub use supabase::SupabaseClient;
