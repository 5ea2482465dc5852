use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::models::User;
use crate::store::{CollaboratorError, DocumentStore, UserFilter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("{0} is not supported by this identity provider")]
    Unsupported(&'static str),
    #[error("no active session")]
    NoSession,
    #[error("signed in as {0}, but no user profile exists for that account")]
    MissingProfile(String),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// The signed-in user. Passed explicitly to every service call.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
}

#[allow(async_fn_in_trait)]
pub trait IdentityProvider {
    async fn current_session(&self) -> Result<Session, IdentityError>;
    async fn create_session(&self, email: &str, password: &str) -> Result<Session, IdentityError>;
    async fn delete_session(&self) -> Result<(), IdentityError>;
    async fn update_password(&self, old_password: &str, new_password: &str)
        -> Result<(), IdentityError>;
    /// Returns the provider's account id for the new account.
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<String, IdentityError>;
    async fn delete_account(&self, account_id: &str) -> Result<(), IdentityError>;
    async fn update_name(&self, account_id: &str, name: &str) -> Result<(), IdentityError>;
}

/// Resolves sessions for a trusted operator from the profile store.
///
/// Credentials live with the external identity provider, so every
/// password and account operation reports `Unsupported`.
pub struct ProfileDirectory<'s, S> {
    store: &'s S,
    operator: Option<String>,
    signed_out: AtomicBool,
}

impl<'s, S: DocumentStore> ProfileDirectory<'s, S> {
    pub fn new(store: &'s S, operator: Option<String>) -> Self {
        Self {
            store,
            operator,
            signed_out: AtomicBool::new(false),
        }
    }
}

impl<S: DocumentStore> IdentityProvider for ProfileDirectory<'_, S> {
    async fn current_session(&self) -> Result<Session, IdentityError> {
        if self.signed_out.load(Ordering::SeqCst) {
            return Err(IdentityError::NoSession);
        }
        let email = self.operator.as_deref().ok_or(IdentityError::NoSession)?;

        let user = self
            .store
            .list_users(&UserFilter::by_email(email), 1, 0)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::MissingProfile(email.to_string()))?;

        tracing::debug!(email, role = %user.role, "session resolved");
        Ok(Session { user })
    }

    async fn create_session(&self, _email: &str, _password: &str) -> Result<Session, IdentityError> {
        Err(IdentityError::Unsupported("password sign-in"))
    }

    async fn delete_session(&self) -> Result<(), IdentityError> {
        self.signed_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn update_password(
        &self,
        _old_password: &str,
        _new_password: &str,
    ) -> Result<(), IdentityError> {
        Err(IdentityError::Unsupported("password change"))
    }

    async fn create_account(
        &self,
        _email: &str,
        _password: &str,
        _name: &str,
    ) -> Result<String, IdentityError> {
        Err(IdentityError::Unsupported("account creation"))
    }

    async fn delete_account(&self, _account_id: &str) -> Result<(), IdentityError> {
        Err(IdentityError::Unsupported("account deletion"))
    }

    async fn update_name(&self, _account_id: &str, _name: &str) -> Result<(), IdentityError> {
        Err(IdentityError::Unsupported("account rename"))
    }
}
