//! Memoized operations and their two calling conventions.
//!
//! [`CachedOperation::call_with`] is the callback form and does all the work:
//! it posts a task to the runtime that consults the store, coalesces
//! concurrent misses and delivers exactly one result to the callback.
//! [`CachedOperation::call`] adapts it to a future through a one-shot channel.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::ready;
use obcache_core::{CacheKey, KeyError, SkipPositions};
use pin_project::pin_project;
use serde::{Serialize, de::DeserializeOwned};
use smol_str::SmolStr;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{Instrument, debug, field, info_span, warn};

use crate::error::CacheError;
use crate::memoizer::Shared;
use crate::pending::{Joined, PendingRegistry};

pub(crate) type BoxedOperation<Args, V, E> =
    Arc<dyn Fn(Args) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

type Callback<V, E> = Box<dyn FnOnce(Result<V, CacheError<E>>) + Send + 'static>;

/// A memoized asynchronous operation.
///
/// Created by [`Memoizer::wrap`](crate::Memoizer::wrap) and friends. Cloning
/// is cheap and clones share the in-flight registry, so a call on one clone
/// coalesces with a call on another.
pub struct CachedOperation<Args, V, E> {
    inner: Arc<Inner<Args, V, E>>,
}

struct Inner<Args, V, E> {
    id: SmolStr,
    skip: SkipPositions,
    operation: BoxedOperation<Args, V, E>,
    pending: Option<PendingRegistry<Callback<V, E>>>,
    shared: Arc<Shared>,
}

impl<Args, V, E> Clone for CachedOperation<Args, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Args, V, E> fmt::Debug for CachedOperation<Args, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedOperation")
            .field("id", &self.inner.id)
            .field("skip", &self.inner.skip)
            .field("queue_enabled", &self.inner.pending.is_some())
            .finish()
    }
}

impl<Args, V, E> CachedOperation<Args, V, E> {
    pub(crate) fn new(
        shared: Arc<Shared>,
        id: SmolStr,
        skip: SkipPositions,
        operation: BoxedOperation<Args, V, E>,
    ) -> Self {
        let pending = shared
            .queue_enabled
            .then(|| PendingRegistry::new(id.clone(), shared.stats.clone()));
        Self {
            inner: Arc::new(Inner {
                id,
                skip,
                operation,
                pending,
                shared,
            }),
        }
    }

    /// Identifier used as the key prefix, unique per memoizer.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn skip_positions(&self) -> &SkipPositions {
        &self.inner.skip
    }

    /// Number of keys with an invocation currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.pending.as_ref().map_or(0, PendingRegistry::len)
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<Shared>) -> bool {
        Arc::ptr_eq(&self.inner.shared, shared)
    }

    /// Derives the key a call with `args` would use.
    pub fn key<A>(&self, args: &A) -> Result<CacheKey, KeyError>
    where
        A: Serialize + ?Sized,
    {
        self.inner
            .shared
            .keys
            .derive(&self.inner.id, args, &self.inner.skip)
    }
}

impl<Args, V, E> CachedOperation<Args, V, E>
where
    Args: Serialize + Send + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Calls the operation and delivers the result to `callback`.
    ///
    /// Returns immediately. The callback runs later on the runtime, never on
    /// the caller's stack, and is invoked at most once.
    ///
    /// Every call is a separate task. Callers coalesced on one key are served
    /// in the order their tasks reached the in-flight registry, which on a
    /// multi-threaded runtime need not be the order of the `call_with`
    /// invocations themselves.
    ///
    /// Outside a Tokio runtime nothing is run and the callback receives
    /// [`CacheError::Cancelled`] immediately.
    pub fn call_with<F>(&self, args: Args, callback: F)
    where
        F: FnOnce(Result<V, CacheError<E>>) + Send + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            warn!(operation = %self.inner.id, "Memoized call outside of a Tokio runtime");
            callback(Err(CacheError::Cancelled));
            return;
        };
        let span = info_span!("memoized_call", operation = %self.inner.id, key = field::Empty);
        let this = self.clone();
        handle.spawn(this.run(args, Box::new(callback)).instrument(span));
    }

    /// Calls the operation and returns a future of the result.
    ///
    /// The call starts right away, before the returned future is polled.
    /// Dropping the future does not stop the call; its result is still
    /// written to the store.
    pub fn call(&self, args: Args) -> Call<V, E> {
        let (tx, rx) = oneshot::channel();
        self.call_with(args, move |result| {
            let _ = tx.send(result);
        });
        Call { rx }
    }

    async fn run(self, args: Args, callback: Callback<V, E>) {
        let inner = &self.inner;
        let shared = &inner.shared;

        shared.maybe_reset().await;

        let key = match self.key(&args) {
            Ok(key) => key,
            Err(error) => {
                debug!(%error, "Argument fingerprinting failed");
                callback(Err(CacheError::Key(error)));
                return;
            }
        };
        tracing::Span::current().record("key", key.as_str());

        if let Some(value) = shared.lookup::<V>(&key).await {
            debug!(%key, "Cache hit");
            shared.stats.record_hit(&inner.id);
            callback(Ok(value));
            return;
        }

        let (flight, callback) = match &inner.pending {
            Some(pending) => match pending.join(&key, callback) {
                Joined::Leader(flight, callback) => (Some(flight), callback),
                Joined::Follower => {
                    debug!(%key, "Invocation in flight, queued behind it");
                    return;
                }
            },
            None => (None, callback),
        };

        debug!(%key, "Cache miss, invoking operation");
        shared.stats.record_miss(&inner.id);
        let result = (inner.operation)(args).await;

        if let Ok(value) = &result {
            let (shared, key, value) = (shared.clone(), key.clone(), value.clone());
            tokio::spawn(async move { shared.persist(&key, &value).await }.in_current_span());
        }

        let waiters = flight.map(|flight| flight.complete()).unwrap_or_default();
        if waiters.is_empty() {
            callback(result.map_err(CacheError::Upstream));
            return;
        }

        callback(result.clone().map_err(CacheError::Upstream));
        debug!(%key, waiters = waiters.len(), "Delivering result to queued callers");
        tokio::spawn(
            async move {
                for waiter in waiters {
                    waiter(result.clone().map_err(CacheError::Upstream));
                }
            }
            .in_current_span(),
        );
    }
}

/// Future returned by [`CachedOperation::call`].
#[pin_project]
#[must_use = "the call runs regardless, but its result is only observable by awaiting"]
pub struct Call<V, E> {
    #[pin]
    rx: oneshot::Receiver<Result<V, CacheError<E>>>,
}

impl<V, E> Future for Call<V, E> {
    type Output = Result<V, CacheError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.rx.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_) => Poll::Ready(Err(CacheError::Cancelled)),
        }
    }
}
