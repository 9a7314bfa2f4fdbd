//! Identity token sources.

use async_trait::async_trait;
use std::future::Future;

use crate::error::SyncError;

/// Supplies the identity token appended to the connection URI.
///
/// Called once per connect attempt, retries included. Implementations should
/// return a fresh token every time; the connection never keeps one.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<String, SyncError>;
}

/// Token provider backed by an async closure
pub struct TokenFn<F>(F);

/// Wrap `f` as a [`TokenProvider`].
pub fn token_fn<F, Fut>(f: F) -> TokenFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, SyncError>> + Send,
{
    TokenFn(f)
}

#[async_trait]
impl<F, Fut> TokenProvider for TokenFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, SyncError>> + Send,
{
    async fn fetch_token(&self) -> Result<String, SyncError> {
        (self.0)().await
    }
}

/// Fixed token, for local development servers
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn fetch_token(&self) -> Result<String, SyncError> {
        if self.0.is_empty() {
            return Err(SyncError::token("empty token"));
        }
        Ok(self.0.clone())
    }
}
