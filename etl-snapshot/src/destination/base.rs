use std::future::Future;

use crate::error::EtlResult;
use crate::types::ChangeEvent;

/// The sink delivering change events to the downstream consumer.
///
/// Events of one call form a contiguous part of the stream and calls are delivered in the order
/// they are made. A call returning `Ok` means that the events were accepted.
pub trait Destination {
    fn write_events(
        &self,
        events: Vec<ChangeEvent>,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
