//! Async completion bridge.
//!
//! Turns the transport's single reply-callback invocation into a single settlement of the
//! call's completer. Nothing escapes the callback: settlement failures and panics become a
//! negative status for the transport.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use sdbus_transport::{RawMessage, ReplyCallback};
use tracing::{error, trace, warn};

use crate::{Completer, ErrorRegistry, Message};

/// Builds the reply callback registered for one async call.
pub(crate) fn reply_callback<M, C>(registry: Arc<ErrorRegistry>, completer: C) -> ReplyCallback<M>
where
	M: RawMessage,
	C: Completer<M>,
{
	Box::new(move |reply: M| settle(&registry, completer, reply))
}

/// Settles `completer` with the outcome carried by `reply`.
///
/// Returns `0` on success and `-ECANCELED` when the completion refused the outcome or
/// panicked.
pub(crate) fn settle<M, C>(registry: &ErrorRegistry, completer: C, reply: M) -> i32
where
	M: RawMessage,
	C: Completer<M>,
{
	let outcome = catch_unwind(AssertUnwindSafe(|| match reply.error() {
		Some(frame) => {
			let error = registry.error_for(frame);
			trace!(name = error.name(), kind = ?error.kind(), "bus.bridge.reject");
			completer.reject(error)
		}
		None => {
			trace!("bus.bridge.resolve");
			completer.resolve(Message::reply(reply))
		}
	}));

	match outcome {
		Ok(Ok(())) => 0,
		Ok(Err(err)) => {
			warn!(error = %err, "bus.bridge.settle_failed");
			-libc::ECANCELED
		}
		Err(_) => {
			error!("bus.bridge.settle_panicked");
			-libc::ECANCELED
		}
	}
}
