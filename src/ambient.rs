use std::future::Future;

use tokio::task::JoinHandle;

use crate::error::{StorageError, StorageResult};
use crate::map::StorageMap;
use crate::registry::ScopeRegistry;
use crate::session::SessionId;

tokio::task_local! {
    static CURRENT: AmbientContext;
}

/// Explicit handle to the "current request" bindings: the session identifier,
/// its browser mapping, and the owning registry.
///
/// The request layer installs one with [`AmbientContext::scope`] around the
/// request future; work spawned through [`AmbientContext::spawn`] carries the
/// handle along, so background tasks keep resolving the correct user and
/// browser mappings after the originating response has completed.
#[derive(Clone)]
pub struct AmbientContext {
    registry: ScopeRegistry,
    session: SessionId,
    browser: StorageMap,
}

impl AmbientContext {
    pub(crate) fn new(registry: ScopeRegistry, session: SessionId, browser: StorageMap) -> Self {
        Self {
            registry,
            session,
            browser,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    /// The browser mapping decoded from this request's cookie. Frozen once
    /// the response is finalized.
    pub fn browser(&self) -> StorageMap {
        self.browser.clone()
    }

    /// The user mapping for this context's session.
    pub fn user(&self) -> StorageResult<StorageMap> {
        self.registry.user(&self.session)
    }

    /// The process-wide general mapping.
    pub fn general(&self) -> StorageMap {
        self.registry.general()
    }

    /// Runs `fut` with this context installed, making the [`current`] family
    /// of accessors resolve to it.
    pub async fn scope<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self.clone(), fut).await
    }

    /// Spawns `fut` with this context explicitly propagated, so the task can
    /// keep using ambient accessors after the request itself has finished.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let ctx = self.clone();
        tokio::spawn(CURRENT.scope(ctx, fut))
    }

    /// Serializes the browser mapping into the outgoing signed cookie and
    /// freezes it. Any later browser mutation, from any task lineage, fails
    /// with [`StorageError::StorageFrozen`].
    pub fn finalize_response(&self) -> StorageResult<String> {
        let cookie_value = self.registry.encode_browser_cookie(&self.browser)?;
        self.browser.freeze();
        Ok(cookie_value)
    }
}

/// The context installed for the executing task, or `NoActiveContext` when
/// called outside a bound request scope and without a captured handle.
pub fn current() -> StorageResult<AmbientContext> {
    CURRENT
        .try_with(|ctx| ctx.clone())
        .map_err(|_| StorageError::NoActiveContext)
}

/// Ambient accessor for the current session's user mapping.
pub fn user() -> StorageResult<StorageMap> {
    current()?.user()
}

/// Ambient accessor for the current request's browser mapping.
pub fn browser() -> StorageResult<StorageMap> {
    Ok(current()?.browser())
}

/// Ambient accessor for the shared general mapping.
pub fn general() -> StorageResult<StorageMap> {
    Ok(current()?.general())
}
