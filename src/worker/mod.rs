//! Background processing of webhook events.
//!
//! The webhook endpoint must answer quickly, so parsed message events are
//! handed to a [`Dispatcher`] and handled on a fixed pool of workers.
//!
//! - [`message`]: the [`WorkUnit`] handed to workers
//! - [`dispatch`]: the bounded queue and worker pool

mod dispatch;
mod message;

pub use dispatch::{Dispatcher, DispatcherConfig, EnqueueError, UnitHandler};
pub use message::{HandlerKind, WorkUnit};
