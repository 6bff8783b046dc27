//! Background execution budget seam.

use async_trait::async_trait;

use crate::result::AppResult;

/// Callback invoked when the host revokes a grant before the work finishes.
pub type ExpirationHandler = Box<dyn FnOnce() + Send + 'static>;

/// Obtains permission from the host environment to keep running while the
/// application is suspended.
#[async_trait]
pub trait BackgroundExecution: Send + Sync {
    /// Begin a named background grant. `on_expire` fires at most once, if
    /// the host revokes the grant before [`BackgroundGrant::end`] is called.
    async fn begin(
        &self,
        name: &str,
        on_expire: ExpirationHandler,
    ) -> AppResult<Box<dyn BackgroundGrant>>;
}

/// A held background-execution grant.
#[async_trait]
pub trait BackgroundGrant: Send + Sync {
    /// Release the grant. Idempotent with respect to expiration: ending an
    /// already-expired grant is a no-op.
    async fn end(self: Box<Self>);
}

/// A [`BackgroundExecution`] for hosts without an execution budget
/// (servers, tests): grants never expire and `end` does nothing.
#[derive(Debug, Default, Clone)]
pub struct UnboundedExecution;

#[async_trait]
impl BackgroundExecution for UnboundedExecution {
    async fn begin(
        &self,
        _name: &str,
        _on_expire: ExpirationHandler,
    ) -> AppResult<Box<dyn BackgroundGrant>> {
        Ok(Box::new(UnboundedGrant))
    }
}

struct UnboundedGrant;

#[async_trait]
impl BackgroundGrant for UnboundedGrant {
    async fn end(self: Box<Self>) {}
}
