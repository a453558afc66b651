//! Concurrent execution of independent middleware chains.
//!
//! Each chain runs [`MiddlewareChain::execute`] on its own tokio task. A
//! coordinator task joins them all and then delivers every collected error,
//! once, through a [`Completion`]. Siblings are never cancelled when one of
//! them fails; the group simply waits for everyone and reports.

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::error;

use super::MiddlewareChain;
use crate::context::Context;
use crate::error::HandlerError;

/// The single-read result of an [`execute_async`] group.
#[must_use = "a fan-out group reports its errors only through `wait`"]
pub struct Completion {
    rx: oneshot::Receiver<Vec<HandlerError>>,
}

impl Completion {
    /// Waits for every chain in the group to finish and returns their errors.
    ///
    /// The order of the errors is the order in which chains *finished*, not
    /// the order they were submitted in. An empty list means every chain
    /// succeeded.
    pub async fn wait(self) -> Vec<HandlerError> {
        match self.rx.await {
            Ok(errors) => errors,
            Err(_) => vec![HandlerError::new("middleware group coordinator stopped unexpectedly")],
        }
    }
}

/// Runs every chain concurrently against clones of `ctx`.
///
/// Empty chains are skipped. Must be called from within a tokio runtime.
pub fn execute_async<I>(ctx: &Context, chains: I) -> Completion
where
    I: IntoIterator<Item = MiddlewareChain>,
{
    let mut tasks = JoinSet::new();
    for chain in chains.into_iter().filter(|c| !c.is_empty()) {
        let ctx = ctx.clone();
        tasks.spawn(async move { chain.execute(&ctx).await });
    }

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => {
                    error!("middleware task failed: {e}");
                    errors.push(HandlerError::new(format!("middleware task failed: {e}")));
                }
            }
        }
        // The receiver may already be gone if the request was abandoned.
        let _ = tx.send(errors);
    });

    Completion { rx }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use http::{StatusCode, Uri};

    use super::*;
    use crate::method::Method;
    use crate::middleware::{Middleware, from_fn};
    use crate::request::Request;

    fn ctx() -> Context {
        Context::new(Request::new(Method::Get, Uri::from_static("/")))
    }

    fn ok_after(ms: u64, counter: &Arc<AtomicUsize>) -> impl Middleware {
        let counter = Arc::clone(counter);
        from_fn(move |ctx, next| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                next.run(ctx).await
            }
        })
    }

    fn err(message: &'static str) -> impl Middleware {
        from_fn(move |_ctx, _next| async move {
            Err::<(), _>(HandlerError::with_status(StatusCode::UNAUTHORIZED, message))
        })
    }

    #[tokio::test]
    async fn one_failing_chain_is_reported_and_siblings_finish() {
        let done = Arc::new(AtomicUsize::new(0));
        let chains = vec![
            MiddlewareChain::new().with(ok_after(20, &done)),
            MiddlewareChain::new().with(err("no token")),
            MiddlewareChain::new().with(ok_after(40, &done)),
        ];

        let errors = execute_async(&ctx(), chains).wait().await;

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].status(), StatusCode::UNAUTHORIZED);
        assert_eq!(errors[0].message(), "no token");
        // Both slow siblings ran to completion despite the early failure.
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn every_error_is_collected() {
        let chains = vec![
            MiddlewareChain::new().with(err("a")),
            MiddlewareChain::new().with(err("b")),
        ];
        let mut messages: Vec<String> = execute_async(&ctx(), chains)
            .wait()
            .await
            .into_iter()
            .map(|e| e.message().to_owned())
            .collect();
        messages.sort();
        assert_eq!(messages, ["a", "b"]);
    }

    #[tokio::test]
    async fn chains_run_concurrently() {
        let done = Arc::new(AtomicUsize::new(0));
        let chains: Vec<_> = (0..4)
            .map(|_| MiddlewareChain::new().with(ok_after(100, &done)))
            .collect();

        let started = tokio::time::Instant::now();
        assert!(execute_async(&ctx(), chains).wait().await.is_empty());
        assert_eq!(done.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn empty_group_completes_immediately() {
        let errors = execute_async(&ctx(), [MiddlewareChain::new(), MiddlewareChain::new()])
            .wait()
            .await;
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn panicking_chain_becomes_a_generic_error() {
        let chains = [MiddlewareChain::new().with(from_fn(|_ctx, _next| async {
            if true {
                panic!("boom");
            }
            Ok::<(), HandlerError>(())
        }))];
        let errors = execute_async(&ctx(), chains).wait().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn values_added_in_one_branch_stay_in_that_branch() {
        let root = ctx().with_value("shared", 1_u8);
        let seen = Arc::new(AtomicUsize::new(0));

        let writer = from_fn(|ctx, next| async move {
            let ctx = ctx.with_value("private", 9_u8);
            next.run(ctx).await
        });
        let probe = {
            let seen = Arc::clone(&seen);
            from_fn(move |ctx, next| {
                let seen = Arc::clone(&seen);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    if ctx.value::<_, u8>(&"private").is_none() && ctx.value::<_, u8>(&"shared").is_some() {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }
                    next.run(ctx).await
                }
            })
        };

        let errors = execute_async(
            &root,
            [MiddlewareChain::new().with(writer), MiddlewareChain::new().with(probe)],
        )
        .wait()
        .await;
        assert!(errors.is_empty());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
