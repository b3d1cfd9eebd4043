use core::pin::Pin;
use core::task::{Context, Poll};

use futures::{Future, Stream};
use pin_project_lite::pin_project;
use tracing::info;

use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx, shutdown_signalled};

type ShutdownFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pin_project! {
    /// A stream adapter that stops yielding items once a shutdown is signalled.
    ///
    /// The shutdown signal is checked before the inner stream on every poll, so an item that is
    /// ready at the same time as a shutdown is never returned. After the shutdown is reported with
    /// [`ShutdownResult::Shutdown`] the stream ends and the inner stream is not polled again.
    #[must_use = "streams do nothing unless polled"]
    pub struct CancellableStream<S> {
        #[pin]
        stream: S,
        shutdown: ShutdownFuture,
        stopped: bool,
    }
}

impl<S> CancellableStream<S> {
    pub fn wrap(stream: S, mut shutdown_rx: ShutdownRx) -> Self {
        let shutdown = Box::pin(async move { shutdown_signalled(&mut shutdown_rx).await });

        Self {
            stream,
            shutdown,
            stopped: false,
        }
    }
}

impl<S: Stream> Stream for CancellableStream<S> {
    type Item = ShutdownResult<S::Item, ()>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        if *this.stopped {
            return Poll::Ready(None);
        }

        if this.shutdown.as_mut().poll(cx).is_ready() {
            info!("the stream has been forcefully stopped");
            *this.stopped = true;

            return Poll::Ready(Some(ShutdownResult::Shutdown(())));
        }

        match this.stream.poll_next(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(ShutdownResult::Ok(item))),
            Poll::Ready(None) => {
                *this.stopped = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
