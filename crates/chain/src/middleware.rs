use std::sync::Arc;

use {anyhow::Result, async_trait::async_trait, futures::future::BoxFuture, tracing::trace};

use crate::context::Context;

/// Terminal handler of a chain: the bot's actual update logic.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut Context) -> Result<()>;
}

/// Wraps the rest of the chain. Implementations decide whether and when to
/// run [`Next`]; it can be run at most once.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in traces.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()>;
}

/// The remainder of a chain, handed to each middleware.
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Run the rest of the chain. Consumes `self`, so downstream runs once.
    pub async fn run(self, ctx: &mut Context) -> Result<()> {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                trace!(middleware = current.name(), "entering middleware");
                current
                    .handle(ctx, Next {
                        middleware: rest,
                        endpoint: self.endpoint,
                    })
                    .await
            },
            None => self.endpoint.call(ctx).await,
        }
    }
}

/// Ordered middleware around a terminal handler.
pub struct Chain {
    middleware: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Handler>,
}

impl Chain {
    pub fn new(endpoint: impl Handler + 'static) -> Self {
        Self {
            middleware: Vec::new(),
            endpoint: Arc::new(endpoint),
        }
    }

    /// Append a middleware; earlier ones wrap later ones.
    #[must_use]
    pub fn with(self, middleware: impl Middleware + 'static) -> Self {
        self.with_arc(Arc::new(middleware))
    }

    #[must_use]
    pub fn with_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Dispatch one update through the chain.
    pub async fn handle(&self, ctx: &mut Context) -> Result<()> {
        trace!(update_id = ctx.update_id, middleware = self.middleware.len(), "dispatching update");
        Next {
            middleware: &self.middleware,
            endpoint: self.endpoint.as_ref(),
        }
        .run(ctx)
        .await
    }
}

#[async_trait]
impl Handler for Chain {
    async fn call(&self, ctx: &mut Context) -> Result<()> {
        self.handle(ctx).await
    }
}

/// Handler built from a closure; see [`handler_fn`].
pub struct HandlerFn<F>(F);

/// Turn `|ctx| Box::pin(async move { .. })` into a [`Handler`].
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'c> Fn(&'c mut Context) -> BoxFuture<'c, Result<()>> + Send + Sync,
{
    HandlerFn(f)
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'c> Fn(&'c mut Context) -> BoxFuture<'c, Result<()>> + Send + Sync,
{
    async fn call(&self, ctx: &mut Context) -> Result<()> {
        (self.0)(ctx).await
    }
}

/// Middleware built from a closure; see [`middleware_fn`].
pub struct MiddlewareFn<F>(F);

/// Turn `|ctx, next| Box::pin(async move { .. })` into a [`Middleware`].
pub fn middleware_fn<F>(f: F) -> MiddlewareFn<F>
where
    F: for<'c> Fn(&'c mut Context, Next<'c>) -> BoxFuture<'c, Result<()>> + Send + Sync,
{
    MiddlewareFn(f)
}

#[async_trait]
impl<F> Middleware for MiddlewareFn<F>
where
    F: for<'c> Fn(&'c mut Context, Next<'c>) -> BoxFuture<'c, Result<()>> + Send + Sync,
{
    fn name(&self) -> &str {
        "middleware_fn"
    }

    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        (self.0)(ctx, next).await
    }
}
