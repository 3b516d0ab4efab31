//! Bus connections.

use std::fmt;
use std::sync::Arc;

use sdbus_transport::{BusKind, CallFailure, RawBus, describe};
use tracing::{debug, warn};

use crate::bridge::reply_callback;
use crate::{BusContext, CompletionFactory, Error, Message, OneshotCompletions, Result};

/// An owned connection to a bus.
///
/// The native connection is released when the `Connection` is dropped. A connection adds no
/// locking of its own: callers sharing one across threads synchronize access themselves, as
/// the native transport requires.
pub struct Connection<B: RawBus, F = OneshotCompletions> {
	bus: B,
	kind: BusKind,
	ctx: Arc<BusContext<F>>,
}

impl<B: RawBus, F> fmt::Debug for Connection<B, F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("kind", &self.kind)
			.finish_non_exhaustive()
	}
}

impl<B: RawBus, F> Connection<B, F> {
	/// Connects to the transport's default bus.
	pub fn connect_default(ctx: Arc<BusContext<F>>) -> Result<Self> {
		Self::connect(BusKind::Default, ctx)
	}

	/// Connects to the bus named by the context's configuration.
	pub fn open(ctx: Arc<BusContext<F>>) -> Result<Self> {
		let kind = ctx.config().bus;
		Self::connect(kind, ctx)
	}

	/// Connects to the given bus.
	pub fn connect(kind: BusKind, ctx: Arc<BusContext<F>>) -> Result<Self> {
		let bus = B::open(kind).map_err(|errno| {
			warn!(bus = %kind, errno = errno.raw_os_error(), "bus.connect_failed");
			Error::Connection {
				bus: kind,
				errno,
				reason: describe(errno),
			}
		})?;
		debug!(bus = %kind, "bus.connect");
		Ok(Self { bus, kind, ctx })
	}

	/// Wraps an already open native connection.
	pub fn from_raw(bus: B, kind: BusKind, ctx: Arc<BusContext<F>>) -> Self {
		Self { bus, kind, ctx }
	}

	/// The bus this connection was opened against.
	pub fn kind(&self) -> BusKind {
		self.kind
	}

	/// The native connection.
	pub fn raw(&self) -> &B {
		&self.bus
	}

	/// The shared context.
	pub fn context(&self) -> &Arc<BusContext<F>> {
		&self.ctx
	}

	/// Builds an outgoing method call.
	///
	/// Empty identifiers are rejected before the transport sees them; malformed ones are
	/// rejected by the transport's own validation. Both fail with
	/// [`Error::MessageConstruction`].
	pub fn new_method_call_message(
		&self,
		destination: &str,
		path: &str,
		interface: &str,
		member: &str,
	) -> Result<Message<B::Message>> {
		let fields = [
			("destination", destination),
			("path", path),
			("interface", interface),
			("member", member),
		];
		if let Some((field, _)) = fields.iter().find(|(_, value)| value.is_empty()) {
			return Err(Error::MessageConstruction(format!("{field} must not be empty")));
		}

		let raw = self
			.bus
			.new_method_call(destination, path, interface, member)
			.map_err(|errno| {
				Error::MessageConstruction(format!(
					"{interface}.{member} on {destination} {path}: {}",
					describe(errno)
				))
			})?;
		Ok(Message::outgoing(raw))
	}

	/// Sends a method call and blocks until its reply arrives.
	///
	/// An error reply fails with [`Error::Bus`], resolved through the registry, even when the
	/// transport also reports a negative status. A failure without an error reply is
	/// [`Error::Transport`].
	pub fn call(&self, message: &mut Message<B::Message>) -> Result<Message<B::Message>> {
		let raw = message.outgoing_mut()?;
		let timeout = self.ctx.config().timeout_usec();
		match self.bus.call(raw, timeout) {
			Ok(reply) => {
				debug!(member = message.member(), "bus.call");
				Ok(Message::reply(reply))
			}
			Err(CallFailure { frame: Some(frame), errno }) => {
				let error = self.ctx.registry().error_for(frame);
				debug!(
					member = message.member(),
					name = error.name(),
					errno = errno.raw_os_error(),
					"bus.call.error_reply"
				);
				Err(Error::Bus(error))
			}
			Err(CallFailure { frame: None, errno }) => {
				warn!(member = message.member(), errno = errno.raw_os_error(), "bus.call.failed");
				Err(Error::transport(errno))
			}
		}
	}

	/// Runs one dispatch step, delivering at most one async reply.
	///
	/// Returns whether anything was processed. External schedulers call this when the bus
	/// becomes readable. A completion that refuses its outcome is logged by the bridge and
	/// does not fail the step; only transport failures become [`Error::Dispatch`].
	pub fn process(&self) -> Result<bool> {
		self.bus.process().map_err(|errno| Error::Dispatch(describe(errno)))
	}

	/// Runs dispatch steps until the bus is idle, returning how many made progress.
	pub fn process_pending(&self) -> Result<usize> {
		let mut steps = 0;
		while self.process()? {
			steps += 1;
		}
		Ok(steps)
	}
}

impl<B: RawBus, F: CompletionFactory<B::Message>> Connection<B, F> {
	/// Sends a method call without blocking.
	///
	/// Returns the completion handle at once; the reply settles it later, from inside
	/// [`Connection::process`]. Only a rejected registration fails here, with
	/// [`Error::Dispatch`].
	pub fn call_async(&self, message: &mut Message<B::Message>) -> Result<F::Handle> {
		let raw = message.outgoing_mut()?;
		let timeout = self.ctx.config().timeout_usec();
		let (completer, handle) = self.ctx.completions().create();
		let callback = reply_callback(Arc::clone(self.ctx.registry()), completer);
		self.bus.call_async(raw, callback, timeout).map_err(|errno| {
			warn!(member = message.member(), errno = errno.raw_os_error(), "bus.call_async.rejected");
			Error::Dispatch(describe(errno))
		})?;
		debug!(member = message.member(), "bus.call_async.registered");
		Ok(handle)
	}
}
