//! Completion objects for async calls.
//!
//! An async call hands its outcome to a [`Completer`] exactly once; the caller awaits the
//! matching handle through whatever scheduler produced the pair. Both settle methods take the
//! completer by value, so a second settlement cannot be expressed.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::{BusError, Error, Message, Result};

/// Why a completion could not be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SettleError {
	/// The handle was dropped; nobody is waiting for the outcome.
	#[error("completion handle was dropped before settlement")]
	Abandoned,
	/// The completion was already settled through another path.
	#[error("completion is already settled")]
	AlreadySettled,
}

/// Settle side of a completion object.
pub trait Completer<M>: Send + 'static {
	/// Settles with a reply.
	fn resolve(self, reply: Message<M>) -> Result<(), SettleError>;

	/// Settles with an error reply.
	fn reject(self, error: BusError) -> Result<(), SettleError>;
}

/// Produces completion objects, one per async call.
pub trait CompletionFactory<M>: Send + Sync + 'static {
	/// Settle side, moved into the completion bridge.
	type Completer: Completer<M>;
	/// Await side, returned to the caller.
	type Handle;

	/// Creates a fresh, unsettled completion.
	fn create(&self) -> (Self::Completer, Self::Handle);
}

/// Completion factory backed by [`tokio::sync::oneshot`] channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct OneshotCompletions;

impl<M: Send + 'static> CompletionFactory<M> for OneshotCompletions {
	type Completer = OneshotCompleter<M>;
	type Handle = PendingReply<M>;

	fn create(&self) -> (OneshotCompleter<M>, PendingReply<M>) {
		let (tx, rx) = oneshot::channel();
		(OneshotCompleter { tx }, PendingReply { rx })
	}
}

type Outcome<M> = std::result::Result<Message<M>, BusError>;

/// Settle side of [`OneshotCompletions`].
#[derive(Debug)]
pub struct OneshotCompleter<M> {
	tx: oneshot::Sender<Outcome<M>>,
}

impl<M: Send + 'static> Completer<M> for OneshotCompleter<M> {
	fn resolve(self, reply: Message<M>) -> Result<(), SettleError> {
		self.tx.send(Ok(reply)).map_err(|_| SettleError::Abandoned)
	}

	fn reject(self, error: BusError) -> Result<(), SettleError> {
		self.tx.send(Err(error)).map_err(|_| SettleError::Abandoned)
	}
}

/// The eventual reply of an async call.
///
/// Resolves to the reply message, to [`Error::Bus`] for an error reply, or to
/// [`Error::Dispatch`] when the call was dropped without ever being settled.
#[derive(Debug)]
#[must_use = "the reply is lost unless the handle is awaited"]
pub struct PendingReply<M> {
	rx: oneshot::Receiver<Outcome<M>>,
}

impl<M> Future for PendingReply<M> {
	type Output = Result<Message<M>>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx).poll(cx).map(|received| match received {
			Ok(Ok(reply)) => Ok(reply),
			Ok(Err(error)) => Err(Error::Bus(error)),
			Err(_) => Err(Error::Dispatch("call was dropped before a reply arrived".into())),
		})
	}
}
