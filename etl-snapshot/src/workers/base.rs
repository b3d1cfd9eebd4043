use std::future::Future;

use crate::error::EtlResult;

/// A trait for types that can be started as workers.
///
/// The generic parameter `H` represents the handle type that will be returned when the worker
/// starts, and `S` represents the state type that can be accessed through the handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Starts the worker and returns a future that resolves to its handle.
    fn start(self) -> impl Future<Output = EtlResult<H>> + Send;
}

/// A handle to a running worker that provides access to its state and completion status.
pub trait WorkerHandle<S> {
    /// Value the worker produces when it terminates successfully.
    type Output;

    /// Returns the current state of the worker.
    ///
    /// The state is not tied to the lifetime of the worker and stays readable after it stopped.
    fn state(&self) -> S;

    /// Returns a future that resolves when the worker terminates.
    fn wait(self) -> impl Future<Output = EtlResult<Self::Output>> + Send;
}
