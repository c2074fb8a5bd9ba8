use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::envelope::Envelope;

/// A single link in the produce-side chain of responsibility.
///
/// Implementations call `next.invoke(envelope, cancel)` to continue the
/// chain, or return early (optionally after calling
/// [`Envelope::mark_cleaned`]) to short-circuit it. The outbox writer and
/// inbox deduplicator are both expressed this way.
#[async_trait]
pub trait ProducerMiddleware<T>: Send + Sync {
    async fn invoke(
        &self,
        envelope: Envelope<T>,
        cancel: &CancellationToken,
        next: &dyn ProducerNext<T>,
    ) -> Result<Envelope<T>, MiddlewareError>;
}

/// A single link in the consume-side chain of responsibility.
#[async_trait]
pub trait ConsumerMiddleware<T>: Send + Sync {
    async fn invoke(
        &self,
        envelope: Envelope<T>,
        cancel: &CancellationToken,
        next: &dyn ConsumerNext<T>,
    ) -> Result<Envelope<T>, MiddlewareError>;
}

/// Continuation handed to a middleware so it can invoke the rest of the
/// chain without the chain itself needing to be `Clone`.
#[async_trait]
pub trait ProducerNext<T>: Send + Sync {
    async fn invoke(
        &self,
        envelope: Envelope<T>,
        cancel: &CancellationToken,
    ) -> Result<Envelope<T>, MiddlewareError>;
}

#[async_trait]
pub trait ConsumerNext<T>: Send + Sync {
    async fn invoke(
        &self,
        envelope: Envelope<T>,
        cancel: &CancellationToken,
    ) -> Result<Envelope<T>, MiddlewareError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    #[error("middleware chain cancelled")]
    Cancelled,
    #[error("middleware failed: {0}")]
    Failed(#[source] anyhow::Error),
}

/// Terminal continuation that ends a chain: just returns the envelope as-is.
pub struct Terminal;

#[async_trait]
impl<T: Send + Sync> ProducerNext<T> for Terminal {
    async fn invoke(
        &self,
        envelope: Envelope<T>,
        _cancel: &CancellationToken,
    ) -> Result<Envelope<T>, MiddlewareError> {
        Ok(envelope)
    }
}

#[async_trait]
impl<T: Send + Sync> ConsumerNext<T> for Terminal {
    async fn invoke(
        &self,
        envelope: Envelope<T>,
        _cancel: &CancellationToken,
    ) -> Result<Envelope<T>, MiddlewareError> {
        Ok(envelope)
    }
}

/// Builds a linear producer chain out of an ordered list of middlewares,
/// running outermost-first, terminating in [`Terminal`].
pub struct ProducerChain<T> {
    middlewares: Vec<Box<dyn ProducerMiddleware<T>>>,
}

impl<T: Send + Sync + 'static> ProducerChain<T> {
    pub fn new(middlewares: Vec<Box<dyn ProducerMiddleware<T>>>) -> Self {
        Self { middlewares }
    }

    pub async fn run(
        &self,
        envelope: Envelope<T>,
        cancel: &CancellationToken,
    ) -> Result<Envelope<T>, MiddlewareError> {
        self.run_from(0, envelope, cancel).await
    }

    fn run_from<'a>(
        &'a self,
        index: usize,
        envelope: Envelope<T>,
        cancel: &'a CancellationToken,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Envelope<T>, MiddlewareError>> + Send + 'a>>
    {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(MiddlewareError::Cancelled);
            }
            match self.middlewares.get(index) {
                None => Terminal.invoke(envelope, cancel).await,
                Some(mw) => {
                    let next = ChainNext { chain: self, index: index + 1 };
                    mw.invoke(envelope, cancel, &next).await
                }
            }
        })
    }
}

struct ChainNext<'a, T> {
    chain: &'a ProducerChain<T>,
    index: usize,
}

#[async_trait]
impl<'a, T: Send + Sync + 'static> ProducerNext<T> for ChainNext<'a, T> {
    async fn invoke(
        &self,
        envelope: Envelope<T>,
        cancel: &CancellationToken,
    ) -> Result<Envelope<T>, MiddlewareError> {
        self.chain.run_from(self.index, envelope, cancel).await
    }
}

/// Mirror of [`ProducerChain`] for the consume side.
pub struct ConsumerChain<T> {
    middlewares: Vec<Box<dyn ConsumerMiddleware<T>>>,
}

impl<T: Send + Sync + 'static> ConsumerChain<T> {
    pub fn new(middlewares: Vec<Box<dyn ConsumerMiddleware<T>>>) -> Self {
        Self { middlewares }
    }

    pub async fn run(
        &self,
        envelope: Envelope<T>,
        cancel: &CancellationToken,
    ) -> Result<Envelope<T>, MiddlewareError> {
        self.run_from(0, envelope, cancel).await
    }

    fn run_from<'a>(
        &'a self,
        index: usize,
        envelope: Envelope<T>,
        cancel: &'a CancellationToken,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Envelope<T>, MiddlewareError>> + Send + 'a>>
    {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(MiddlewareError::Cancelled);
            }
            match self.middlewares.get(index) {
                None => Terminal.invoke(envelope, cancel).await,
                Some(mw) => {
                    let next = ConsumerChainNext { chain: self, index: index + 1 };
                    mw.invoke(envelope, cancel, &next).await
                }
            }
        })
    }
}

struct ConsumerChainNext<'a, T> {
    chain: &'a ConsumerChain<T>,
    index: usize,
}

#[async_trait]
impl<'a, T: Send + Sync + 'static> ConsumerNext<T> for ConsumerChainNext<'a, T> {
    async fn invoke(
        &self,
        envelope: Envelope<T>,
        cancel: &CancellationToken,
    ) -> Result<Envelope<T>, MiddlewareError> {
        self.chain.run_from(self.index, envelope, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingMiddleware {
        calls: Arc<AtomicUsize>,
        short_circuit: bool,
    }

    #[async_trait]
    impl ProducerMiddleware<u32> for CountingMiddleware {
        async fn invoke(
            &self,
            mut envelope: Envelope<u32>,
            cancel: &CancellationToken,
            next: &dyn ProducerNext<u32>,
        ) -> Result<Envelope<u32>, MiddlewareError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.short_circuit {
                envelope.mark_cleaned();
                return Ok(envelope);
            }
            next.invoke(envelope, cancel).await
        }
    }

    #[tokio::test]
    async fn chain_runs_middlewares_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ProducerChain::new(vec![
            Box::new(CountingMiddleware { calls: calls.clone(), short_circuit: false }),
            Box::new(CountingMiddleware { calls: calls.clone(), short_circuit: false }),
        ]);
        let cancel = CancellationToken::new();
        let result = chain.run(Envelope::new(1u32), &cancel).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!result.is_cleaned());
    }

    #[tokio::test]
    async fn short_circuit_skips_downstream_middlewares() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ProducerChain::new(vec![
            Box::new(CountingMiddleware { calls: calls.clone(), short_circuit: true }),
            Box::new(CountingMiddleware { calls: calls.clone(), short_circuit: false }),
        ]);
        let cancel = CancellationToken::new();
        let result = chain.run(Envelope::new(1u32), &cancel).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_cleaned());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ProducerChain::new(vec![Box::new(CountingMiddleware {
            calls: calls.clone(),
            short_circuit: false,
        })]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = chain.run(Envelope::new(1u32), &cancel).await;
        assert!(matches!(result, Err(MiddlewareError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
