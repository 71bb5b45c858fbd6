//! The browser pool: a bounded set of page leases over an external browser
//! backend. Acquiring returns a guard; the slot frees when the guard drops,
//! on success and error paths alike.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// External browser automation (Playwright et al. live outside the core).
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn new_page(&self, headless: bool) -> anyhow::Result<Box<dyn BrowserPage>>;
}

/// One leased page.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and return the rendered content.
    async fn goto(&mut self, url: &str) -> anyhow::Result<String>;
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Backend used when no browser automation is wired in: website scrape jobs
/// fail fast with a clear message instead of hanging.
pub struct DisconnectedBrowserBackend;

#[async_trait]
impl BrowserBackend for DisconnectedBrowserBackend {
    async fn new_page(&self, _headless: bool) -> anyhow::Result<Box<dyn BrowserPage>> {
        anyhow::bail!("no browser backend configured for this worker")
    }
}

pub struct BrowserPool {
    backend: Arc<dyn BrowserBackend>,
    slots: Arc<Semaphore>,
    headless: bool,
}

/// A leased page plus its pool slot. The slot releases on drop; call
/// `release` to also close the page cleanly.
pub struct PageGuard {
    page: Option<Box<dyn BrowserPage>>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard").finish_non_exhaustive()
    }
}

impl PageGuard {
    pub fn page(&mut self) -> &mut dyn BrowserPage {
        // Present until release() consumes the guard.
        self.page.as_mut().map(|p| p.as_mut()).unwrap_or_else(|| {
            unreachable!("page taken out of guard")
        })
    }

    /// Close the page and free the slot.
    pub async fn release(mut self) {
        if let Some(mut page) = self.page.take() {
            if let Err(e) = page.close().await {
                tracing::warn!(error = %e, "Browser page close failed");
            }
        }
    }
}

impl BrowserPool {
    pub fn new(backend: Arc<dyn BrowserBackend>, size: usize, headless: bool) -> Self {
        Self {
            backend,
            slots: Arc::new(Semaphore::new(size.max(1))),
            headless,
        }
    }

    /// Lease a page, waiting for a free slot.
    pub async fn acquire(&self) -> anyhow::Result<PageGuard> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("browser pool closed"))?;
        let page = self.backend.new_page(self.headless).await?;
        Ok(PageGuard {
            page: Some(page),
            _permit: permit,
        })
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubPage;

    #[async_trait]
    impl BrowserPage for StubPage {
        async fn goto(&mut self, _url: &str) -> anyhow::Result<String> {
            Ok("<html></html>".into())
        }
        async fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct StubBackend;

    #[async_trait]
    impl BrowserBackend for StubBackend {
        async fn new_page(&self, _headless: bool) -> anyhow::Result<Box<dyn BrowserPage>> {
            Ok(Box::new(StubPage))
        }
    }

    #[tokio::test]
    async fn pool_bounds_concurrent_leases() {
        let pool = BrowserPool::new(Arc::new(StubBackend), 2, true);
        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);

        a.release().await;
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn dropping_guard_frees_slot() {
        let pool = BrowserPool::new(Arc::new(StubBackend), 1, true);
        {
            let _guard = pool.acquire().await.unwrap();
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn disconnected_backend_fails_fast() {
        let pool = BrowserPool::new(Arc::new(DisconnectedBrowserBackend), 1, true);
        let err = pool.acquire().await.unwrap_err();
        assert!(err.to_string().contains("no browser backend"));
        // The failed acquire must not leak its slot.
        assert_eq!(pool.available(), 1);
    }
}
