//! Handler trait, pipeline stages and type erasure.
//!
//! # How async handlers are stored
//!
//! A route's pipeline mixes middleware and handlers of *different* concrete
//! types in one `Vec`. Each of them is erased behind the same trait object,
//! a [`Stage`], so the whole pipeline is a flat slice:
//!
//! ```text
//! async fn show(req: Request) -> Response { … }     ← user writes this
//!        ↓ router.get("/users/:id", show)
//! show.into_stages()                                 ← Handler blanket impl
//!        ↓
//! Arc::new(Terminal(show))                           ← heap-allocated wrapper
//!        ↓  stored as Stage = Arc<dyn ErasedStage>
//! stage.call(req, next)  at request time             ← one vtable dispatch
//! ```
//!
//! A stage either produces a response or hands the request to [`Next`].
//! Running off the end of the pipeline yields [`Response::fallback`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResult, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to a stage's result.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_stages` method.
#[doc(hidden)]
pub trait ErasedStage {
    fn call(&self, req: Request, next: Next) -> BoxFuture;
}

/// A type-erased pipeline stage shared across concurrent requests.
#[doc(hidden)]
pub type Stage = Arc<dyn ErasedStage + Send + Sync + 'static>;

// ── Next ──────────────────────────────────────────────────────────────────────

/// The continuation handed to every stage.
///
/// Calling [`run`](Next::run) executes the rest of the pipeline and returns
/// its response; dropping it without calling short-circuits everything
/// downstream. Stages never start before their predecessor calls `run`.
pub struct Next {
    stages: Arc<[Stage]>,
    index: usize,
}

impl Next {
    pub(crate) fn new(stages: Arc<[Stage]>) -> Self {
        Self { stages, index: 0 }
    }

    /// Runs the remaining stages.
    pub async fn run(self, req: Request) -> Result<Response, Error> {
        let Some(stage) = self.stages.get(self.index).cloned() else {
            return Ok(Response::fallback());
        };
        let next = Self { stages: self.stages, index: self.index + 1 };
        stage.call(req, next).await
    }

    /// Number of stages not yet started.
    pub fn remaining(&self) -> usize {
        self.stages.len().saturating_sub(self.index)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResult              // terminal
/// async fn name(req: Request, next: Next) -> impl IntoResult  // may pass
/// Chain                                                       // several of the above
/// ```
///
/// The type parameter only disambiguates the blanket impls. The trait is
/// **sealed**: only the impls below can satisfy it.
pub trait Handler<T>: private::Sealed<T> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_stages(self) -> Vec<Stage>;
}

mod private {
    pub trait Sealed<T> {}
}

impl<F, Fut, R> private::Sealed<(Request,)> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResult + 'static,
{
}

impl<F, Fut, R> Handler<(Request,)> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResult + 'static,
{
    fn into_stages(self) -> Vec<Stage> {
        vec![Arc::new(Terminal(self))]
    }
}

impl<F, Fut, R> private::Sealed<(Request, Next)> for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResult + 'static,
{
}

impl<F, Fut, R> Handler<(Request, Next)> for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResult + 'static,
{
    fn into_stages(self) -> Vec<Stage> {
        vec![stage_fn(self)]
    }
}

impl private::Sealed<Chain> for Chain {}

impl Handler<Chain> for Chain {
    fn into_stages(self) -> Vec<Stage> {
        self.0
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// Several handlers registered for one route, run in order.
///
/// ```rust,no_run
/// # use issac::{Chain, Next, Request, Response, Router, Error};
/// # async fn authorize(req: Request, next: Next) -> Result<Response, Error> { next.run(req).await }
/// # async fn show(_: Request) -> Response { Response::text("") }
/// # fn build() -> Result<(), issac::ConfigError> {
/// let mut router = Router::new();
/// router.get("/admin", Chain::new(authorize).then(show))?;
/// # Ok(()) }
/// ```
#[derive(Clone, Default)]
pub struct Chain(Vec<Stage>);

impl Chain {
    pub fn new<T>(first: impl Handler<T>) -> Self {
        Self(first.into_stages())
    }

    pub fn then<T>(mut self, handler: impl Handler<T>) -> Self {
        self.0.extend(handler.into_stages());
        self
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

/// A handler that never passes: it ignores its continuation.
struct Terminal<F>(F);

impl<F, Fut, R> ErasedStage for Terminal<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResult,
{
    fn call(&self, req: Request, _next: Next) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_result() })
    }
}

/// A stage that receives the continuation. Shared by pass-through handlers
/// and middleware.
struct Continuing<F>(F);

impl<F, Fut, R> ErasedStage for Continuing<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResult,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let fut = (self.0)(req, next);
        Box::pin(async move { fut.await.into_result() })
    }
}

pub(crate) fn stage_fn<F, Fut, R>(f: F) -> Stage
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResult + 'static,
{
    Arc::new(Continuing(f))
}
