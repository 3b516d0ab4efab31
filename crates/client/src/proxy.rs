//! Remote object proxies.

use sdbus_transport::{RawBus, Value};

use crate::{CompletionFactory, Connection, Message, OneshotCompletions, Result};

/// A remote object: destination, path and interface bound to a connection.
///
/// Each method call builds a fresh message, appends the arguments in order and dispatches it.
#[derive(Debug)]
pub struct Proxy<'c, B: RawBus, F = OneshotCompletions> {
	connection: &'c Connection<B, F>,
	destination: String,
	path: String,
	interface: String,
}

impl<'c, B: RawBus, F> Proxy<'c, B, F> {
	/// Binds a remote object. Names are validated when the first call is built.
	pub fn new(
		connection: &'c Connection<B, F>,
		destination: impl Into<String>,
		path: impl Into<String>,
		interface: impl Into<String>,
	) -> Self {
		Self {
			connection,
			destination: destination.into(),
			path: path.into(),
			interface: interface.into(),
		}
	}

	/// The connection calls are sent on.
	pub fn connection(&self) -> &'c Connection<B, F> {
		self.connection
	}

	/// Destination bus name.
	pub fn destination(&self) -> &str {
		&self.destination
	}

	/// Object path.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Interface name.
	pub fn interface(&self) -> &str {
		&self.interface
	}

	/// Builds a call to `member` with the given arguments, without sending it.
	pub fn method_call(&self, member: &str, args: &[Value]) -> Result<Message<B::Message>> {
		let mut message = self
			.connection
			.new_method_call_message(&self.destination, &self.path, &self.interface, member)?;
		message.append_all(args.iter().cloned())?;
		Ok(message)
	}

	/// Calls `member` and blocks for the reply.
	pub fn call(&self, member: &str, args: &[Value]) -> Result<Message<B::Message>> {
		let mut message = self.method_call(member, args)?;
		self.connection.call(&mut message)
	}
}

impl<B: RawBus, F: CompletionFactory<B::Message>> Proxy<'_, B, F> {
	/// Calls `member` without blocking. See [`Connection::call_async`].
	pub fn call_async(&self, member: &str, args: &[Value]) -> Result<F::Handle> {
		let mut message = self.method_call(member, args)?;
		self.connection.call_async(&mut message)
	}
}
