//! Loader Module
//!
//! The expensive computation a cache memoizes, expressed as a statically
//! typed capability over a parameter tuple.

use std::fmt;
use std::marker::PhantomData;

use tokio_util::sync::CancellationToken;

use crate::cache::{CacheKey, Params};
use crate::error::{CacheError, Result};

// == Load Context ==
/// Per-load information handed to a [`Loader`].
///
/// The token is owned by the cache, never by a caller. It fires only when
/// the cache itself is dropped with cancellation support enabled; removing
/// or purging an entry does not touch it.
#[derive(Debug, Clone)]
pub struct LoadContext {
    key: CacheKey,
    token: CancellationToken,
}

impl LoadContext {
    pub(crate) fn new(key: CacheKey, token: CancellationToken) -> Self {
        Self { key, token }
    }

    /// Key of the entry being loaded.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Token that fires when the owning cache shuts down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the owning cache has shut down; long loads may stop early.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// == Loader Trait ==
/// Produces a value (or an error) for a parameter tuple.
///
/// `load` is synchronous and may block; the cache runs it on tokio's
/// blocking pool, never on the caller's task.
pub trait Loader: Send + Sync + 'static {
    type Params: Params;
    type Value: Clone + Send + Sync + 'static;
    type Error: Clone + Send + Sync + 'static;

    fn load(
        &self,
        params: &Self::Params,
        ctx: &LoadContext,
    ) -> std::result::Result<Self::Value, Self::Error>;

    /// Number of parameters this loader accepts.
    fn arity(&self) -> Option<usize> {
        <Self::Params as Params>::ARITY
    }

    /// Whether `error` is the resource-exhaustion sentinel. Such outcomes are
    /// never stored in the cached pair.
    fn is_resource_exhausted(&self, _error: &Self::Error) -> bool {
        false
    }
}

/// Resolves the arity every `get` is checked against.
pub(crate) fn declared_arity<L: Loader>(loader: &L) -> Result<usize> {
    match (<L::Params as Params>::ARITY, loader.arity()) {
        (Some(fixed), Some(declared)) if fixed == declared => Ok(fixed),
        (Some(fixed), Some(declared)) => Err(CacheError::InvalidLoader(format!(
            "declares {} params but accepts a tuple of {}",
            declared, fixed
        ))),
        (None, Some(declared)) => Ok(declared),
        (_, None) => Err(CacheError::InvalidLoader(
            "loader must declare a fixed parameter arity".to_string(),
        )),
    }
}

type ExhaustionPredicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

// == Closure Loader ==
/// [`Loader`] backed by a closure, see [`loader_fn`].
pub struct FnLoader<P, V, E, F> {
    f: F,
    arity: Option<usize>,
    exhausted: Option<ExhaustionPredicate<E>>,
    _marker: PhantomData<fn(&P) -> std::result::Result<V, E>>,
}

/// Wraps `f` as a loader. Tuple parameters carry their arity; variadic
/// `Vec` parameters need [`FnLoader::with_arity`].
pub fn loader_fn<P, V, E, F>(f: F) -> FnLoader<P, V, E, F>
where
    P: Params,
    F: Fn(&P) -> std::result::Result<V, E> + Send + Sync + 'static,
{
    FnLoader {
        f,
        arity: P::ARITY,
        exhausted: None,
        _marker: PhantomData,
    }
}

impl<P, V, E, F> FnLoader<P, V, E, F> {
    /// Declares how many parameters each call must carry.
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Marks errors matching `pred` as the resource-exhaustion sentinel.
    pub fn exhausted_when<G>(mut self, pred: G) -> Self
    where
        G: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.exhausted = Some(Box::new(pred));
        self
    }
}

impl<P, V, E, F> Loader for FnLoader<P, V, E, F>
where
    P: Params,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(&P) -> std::result::Result<V, E> + Send + Sync + 'static,
{
    type Params = P;
    type Value = V;
    type Error = E;

    fn load(&self, params: &P, _ctx: &LoadContext) -> std::result::Result<V, E> {
        (self.f)(params)
    }

    fn arity(&self) -> Option<usize> {
        self.arity
    }

    fn is_resource_exhausted(&self, error: &E) -> bool {
        self.exhausted.as_ref().is_some_and(|pred| pred(error))
    }
}

impl<P, V, E, F> fmt::Debug for FnLoader<P, V, E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLoader")
            .field("arity", &self.arity)
            .field("exhaustion_sentinel", &self.exhausted.is_some())
            .finish()
    }
}
