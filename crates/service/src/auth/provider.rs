use async_trait::async_trait;
use serde_json::Value;

use super::domain::TokenGrant;
use super::errors::ProviderError;

/// Uniform result of every identity provider call: data or error, never both.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Outbound identity provider operations. One network call each, no retries.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<TokenGrant>;
    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<TokenGrant>;
    async fn sign_out(&self, access_token: &str) -> ProviderResult<()>;
    async fn get_user(&self, access_token: &str) -> ProviderResult<Value>;
    async fn refresh(&self, refresh_token: &str) -> ProviderResult<TokenGrant>;
}

/// In-memory provider for tests and local development.
///
/// Issues `access-N` / `refresh-N` token pairs, rotates refresh tokens on use,
/// and counts calls per operation.
pub mod mock {
    use super::*;
    use serde_json::{json, Map};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct State {
        accounts: HashMap<String, (String, Value)>,
        access: HashMap<String, Value>,
        refresh: HashMap<String, Value>,
        calls: HashMap<&'static str, usize>,
        issued: u64,
        unavailable: bool,
        requires_confirmation: bool,
    }

    #[derive(Default)]
    pub struct MockIdentityProvider {
        state: Mutex<State>,
        refresh_delay: Mutex<Option<Duration>>,
    }

    impl MockIdentityProvider {
        pub fn new() -> Self { Self::default() }

        /// Register an account that can sign in with the given password.
        pub fn with_account(self, email: &str, password: &str) -> Self {
            {
                let mut st = self.state.lock().unwrap();
                let user = json!({"id": format!("user-{}", st.accounts.len() + 1), "email": email});
                st.accounts.insert(email.to_string(), (password.to_string(), user));
            }
            self
        }

        /// Make an access token valid for `user`.
        pub fn register_access(&self, token: &str, user: Value) {
            self.state.lock().unwrap().access.insert(token.to_string(), user);
        }

        /// Make a refresh token redeemable once for `user`.
        pub fn register_refresh(&self, token: &str, user: Value) {
            self.state.lock().unwrap().refresh.insert(token.to_string(), user);
        }

        /// Invalidate every issued access token, as if they all expired.
        pub fn expire_access_tokens(&self) {
            self.state.lock().unwrap().access.clear();
        }

        /// Invalidate every refresh token.
        pub fn revoke_refresh_tokens(&self) {
            self.state.lock().unwrap().refresh.clear();
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.state.lock().unwrap().unavailable = unavailable;
        }

        /// Sign-ups return a user but no tokens, like an email-confirmation flow.
        pub fn set_requires_confirmation(&self, on: bool) {
            self.state.lock().unwrap().requires_confirmation = on;
        }

        pub fn set_refresh_delay(&self, delay: Duration) {
            *self.refresh_delay.lock().unwrap() = Some(delay);
        }

        pub fn calls(&self, op: &str) -> usize {
            self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
        }

        fn enter(&self, op: &'static str) -> ProviderResult<()> {
            let mut st = self.state.lock().unwrap();
            *st.calls.entry(op).or_default() += 1;
            if st.unavailable {
                return Err(ProviderError::Unavailable);
            }
            Ok(())
        }

        fn issue(st: &mut State, user: Value) -> TokenGrant {
            st.issued += 1;
            let access = format!("access-{}", st.issued);
            let refresh = format!("refresh-{}", st.issued);
            st.access.insert(access.clone(), user.clone());
            st.refresh.insert(refresh.clone(), user.clone());
            let mut extra = Map::new();
            extra.insert("token_type".into(), json!("bearer"));
            extra.insert("expires_in".into(), json!(3600));
            TokenGrant { access_token: Some(access), refresh_token: Some(refresh), user: Some(user), extra }
        }
    }

    #[async_trait]
    impl IdentityProvider for MockIdentityProvider {
        async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<TokenGrant> {
            self.enter("sign_in")?;
            let mut st = self.state.lock().unwrap();
            match st.accounts.get(email).cloned() {
                Some((pw, user)) if pw == password => Ok(Self::issue(&mut st, user)),
                _ => Err(ProviderError::Rejected("Invalid login credentials".into())),
            }
        }

        async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<TokenGrant> {
            self.enter("sign_up")?;
            let mut st = self.state.lock().unwrap();
            if st.accounts.contains_key(email) {
                return Err(ProviderError::Rejected("User already registered".into()));
            }
            let user = json!({"id": format!("user-{}", st.accounts.len() + 1), "email": email});
            st.accounts.insert(email.to_string(), (password.to_string(), user.clone()));
            if st.requires_confirmation {
                return Ok(TokenGrant { user: Some(user), ..TokenGrant::default() });
            }
            Ok(Self::issue(&mut st, user))
        }

        async fn sign_out(&self, access_token: &str) -> ProviderResult<()> {
            self.enter("sign_out")?;
            let mut st = self.state.lock().unwrap();
            match st.access.remove(access_token) {
                Some(_) => Ok(()),
                None => Err(ProviderError::Rejected("invalid JWT".into())),
            }
        }

        async fn get_user(&self, access_token: &str) -> ProviderResult<Value> {
            self.enter("get_user")?;
            let st = self.state.lock().unwrap();
            st.access
                .get(access_token)
                .cloned()
                .ok_or_else(|| ProviderError::Rejected("invalid JWT: token is expired".into()))
        }

        async fn refresh(&self, refresh_token: &str) -> ProviderResult<TokenGrant> {
            self.enter("refresh")?;
            let delay = *self.refresh_delay.lock().unwrap();
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            let mut st = self.state.lock().unwrap();
            match st.refresh.remove(refresh_token) {
                Some(user) => Ok(Self::issue(&mut st, user)),
                None => Err(ProviderError::Rejected("Invalid Refresh Token: Refresh Token Not Found".into())),
            }
        }
    }

}
