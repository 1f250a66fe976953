//! Ordered middleware composition.
//!
//! A [`Chain`] is an immutable list of [`Middleware`] values. Composing it with
//! a terminal handler folds the list right-to-left once, so the first
//! middleware becomes the outermost layer and the per-request path is a plain
//! sequence of calls with no further allocation for the composition itself.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

/// A shareable asynchronous request handler.
pub type Handler<Req, Res> = Arc<dyn Fn(Req) -> BoxFuture<'static, Res> + Send + Sync>;

/// Wrap an async function into a [`Handler`].
pub fn handler_fn<Req, Res, F, Fut>(f: F) -> Handler<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Res> + Send + 'static,
{
    Arc::new(move |req: Req| f(req).boxed())
}

/// Takes the next handler and returns a handler wrapping it.
pub trait Middleware<Req, Res>: Send + Sync {
    fn wrap(&self, next: Handler<Req, Res>) -> Handler<Req, Res>;
}

impl<Req, Res, F> Middleware<Req, Res> for F
where
    F: Fn(Handler<Req, Res>) -> Handler<Req, Res> + Send + Sync,
{
    fn wrap(&self, next: Handler<Req, Res>) -> Handler<Req, Res> {
        self(next)
    }
}

/// Type-erase a middleware for use in a [`Chain`].
pub fn layer<Req, Res, M>(middleware: M) -> Arc<dyn Middleware<Req, Res>>
where
    M: Middleware<Req, Res> + 'static,
{
    Arc::new(middleware)
}

/// An immutable, ordered sequence of middlewares.
pub struct Chain<Req, Res> {
    middlewares: Arc<[Arc<dyn Middleware<Req, Res>>]>,
}

impl<Req, Res> Chain<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// The first middleware given is the outermost.
    pub fn new<I>(middlewares: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware<Req, Res>>>,
    {
        Self {
            middlewares: middlewares.into_iter().collect(),
        }
    }

    /// Compose the chain around `handler`.
    pub fn then(&self, handler: Handler<Req, Res>) -> Handler<Req, Res> {
        self.middlewares
            .iter()
            .rev()
            .fold(handler, |next, middleware| middleware.wrap(next))
    }

    /// A new chain running `more` after the existing middlewares. `self` is left untouched.
    pub fn append<I>(&self, more: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware<Req, Res>>>,
    {
        Self {
            middlewares: self.middlewares.iter().cloned().chain(more).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl<Req, Res> Clone for Chain<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            middlewares: self.middlewares.clone(),
        }
    }
}

impl<Req, Res> Default for Chain<Req, Res> {
    fn default() -> Self {
        Self {
            middlewares: Arc::from(Vec::new()),
        }
    }
}

impl<Req, Res> fmt::Debug for Chain<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.middlewares.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl Middleware<u32, u32> for Recorder {
        fn wrap(&self, next: Handler<u32, u32>) -> Handler<u32, u32> {
            let name = self.name;
            let log = self.log.clone();
            Arc::new(move |req: u32| {
                let next = next.clone();
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{name}:pre"));
                    let res = next(req).await;
                    log.lock().unwrap().push(format!("{name}:post"));
                    res
                }
                .boxed()
            })
        }
    }

    fn recorder(name: &'static str, log: &Log) -> Arc<dyn Middleware<u32, u32>> {
        layer(Recorder {
            name,
            log: log.clone(),
        })
    }

    fn terminal(log: &Log) -> Handler<u32, u32> {
        let log = log.clone();
        handler_fn(move |req: u32| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("handler".to_string());
                req * 2
            }
        })
    }

    #[tokio::test]
    async fn test_outermost_first_ordering() {
        let log: Log = Arc::default();
        let chain = Chain::new([recorder("a", &log), recorder("b", &log)]);

        let handler = chain.then(terminal(&log));
        assert_eq!(handler(21).await, 42);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:pre", "b:pre", "handler", "b:post", "a:post"]
        );
    }

    #[tokio::test]
    async fn test_each_middleware_runs_once_per_request() {
        let log: Log = Arc::default();
        let chain = Chain::new([recorder("m", &log), recorder("m", &log)]);
        let handler = chain.then(terminal(&log));

        handler(1).await;
        handler(2).await;

        let pre = log.lock().unwrap().iter().filter(|e| *e == "m:pre").count();
        assert_eq!(pre, 4);
    }

    #[tokio::test]
    async fn test_append_leaves_receiver_untouched() {
        let log: Log = Arc::default();
        let base = Chain::new([recorder("a", &log)]);
        let extended = base.append([recorder("b", &log)]);
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);

        base.then(terminal(&log))(1).await;
        assert_eq!(*log.lock().unwrap(), vec!["a:pre", "handler", "a:post"]);

        log.lock().unwrap().clear();
        extended.then(terminal(&log))(1).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:pre", "b:pre", "handler", "b:post", "a:post"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner_layers() {
        let log: Log = Arc::default();
        let deny = |_next: Handler<u32, u32>| -> Handler<u32, u32> {
            Arc::new(|_req: u32| async { 0 }.boxed())
        };
        let chain = Chain::new([recorder("a", &log), layer(deny), recorder("b", &log)]);

        assert_eq!(chain.then(terminal(&log))(5).await, 0);
        assert_eq!(*log.lock().unwrap(), vec!["a:pre", "a:post"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_the_handler() {
        let log: Log = Arc::default();
        let chain: Chain<u32, u32> = Chain::default();
        assert!(chain.is_empty());
        assert_eq!(chain.then(terminal(&log))(4).await, 8);
    }
}
