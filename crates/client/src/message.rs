//! Owned bus messages.

use std::io::{self, Write};

use sdbus_transport::{BasicType, ErrorFrame, RawMessage, Value, describe};

use crate::{Error, Result};

/// How a bound message was produced. Fixed for the message's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	/// A method call under construction, built by
	/// [`Connection::new_method_call_message`](crate::Connection::new_method_call_message).
	Outgoing,
	/// A reply produced by a call.
	Reply,
}

#[derive(Debug)]
enum State<M> {
	Empty,
	Bound { raw: M, role: Role },
}

/// An owned bus message.
///
/// A message is either empty (from [`Message::new`]) or bound to exactly one native message.
/// The native message is released when the `Message` is dropped.
#[derive(Debug)]
pub struct Message<M> {
	state: State<M>,
	/// Types of the fields read since the last rewind.
	consumed: Vec<BasicType>,
}

impl<M> Default for Message<M> {
	fn default() -> Self {
		Self::new()
	}
}

impl<M> Message<M> {
	/// Creates an empty, unbound message.
	pub const fn new() -> Self {
		Self {
			state: State::Empty,
			consumed: Vec::new(),
		}
	}

	pub(crate) fn outgoing(raw: M) -> Self {
		Self {
			state: State::Bound {
				raw,
				role: Role::Outgoing,
			},
			consumed: Vec::new(),
		}
	}

	pub(crate) fn reply(raw: M) -> Self {
		Self {
			state: State::Bound { raw, role: Role::Reply },
			consumed: Vec::new(),
		}
	}

	/// Whether the message holds a native message.
	pub fn is_bound(&self) -> bool {
		matches!(self.state, State::Bound { .. })
	}

	/// The role of a bound message.
	pub fn role(&self) -> Option<Role> {
		match self.state {
			State::Empty => None,
			State::Bound { role, .. } => Some(role),
		}
	}

	/// The native message, if bound.
	pub fn as_raw(&self) -> Option<&M> {
		match &self.state {
			State::Empty => None,
			State::Bound { raw, .. } => Some(raw),
		}
	}

	/// Consumes the message, returning the native message if bound.
	pub fn into_raw(self) -> Option<M> {
		match self.state {
			State::Empty => None,
			State::Bound { raw, .. } => Some(raw),
		}
	}

	fn bound(&self) -> Result<&M> {
		self.as_raw()
			.ok_or_else(|| Error::InvalidArgument("message is not bound".into()))
	}

	fn bound_mut(&mut self) -> Result<&mut M> {
		match &mut self.state {
			State::Empty => Err(Error::InvalidArgument("message is not bound".into())),
			State::Bound { raw, .. } => Ok(raw),
		}
	}

	/// The native message of a bound outgoing call.
	pub(crate) fn outgoing_mut(&mut self) -> Result<&mut M> {
		match &mut self.state {
			State::Empty => Err(Error::InvalidArgument("message is not bound".into())),
			State::Bound { role: Role::Reply, .. } => {
				Err(Error::InvalidArgument("message is a reply, not an outgoing call".into()))
			}
			State::Bound { raw, role: Role::Outgoing } => Ok(raw),
		}
	}
}

impl<M: RawMessage> Message<M> {
	/// Appends a string field.
	pub fn append_string(&mut self, value: &str) -> Result<()> {
		self.append(value)
	}

	/// Appends a basic-type field. Requires a bound outgoing call.
	pub fn append(&mut self, value: impl Into<Value>) -> Result<()> {
		let value = value.into();
		let raw = self.outgoing_mut()?;
		raw.append(&value)
			.map_err(|errno| Error::Encoding(format!("{}: {}", value.basic_type().code() as char, describe(errno))))
	}

	/// Appends fields in order, stopping at the first failure.
	pub fn append_all<I>(&mut self, values: I) -> Result<()>
	where
		I: IntoIterator,
		I::Item: Into<Value>,
	{
		values.into_iter().try_for_each(|value| self.append(value))
	}

	/// Reads the next field, which must be of type `ty`. Returns `None` at the end of the body.
	pub fn read(&mut self, ty: BasicType) -> Result<Option<Value>> {
		let value = self
			.bound_mut()?
			.read(ty)
			.map_err(|errno| Error::Decoding(format!("{}: {}", ty.code() as char, describe(errno))))?;
		if value.is_some() {
			self.consumed.push(ty);
		}
		Ok(value)
	}

	/// Moves the read cursor back to the first field.
	pub fn rewind(&mut self) -> Result<()> {
		self.bound_mut()?
			.rewind(true)
			.map_err(|errno| Error::Decoding(format!("cannot rewind: {}", describe(errno))))?;
		self.consumed.clear();
		Ok(())
	}

	/// Reads the next field as a string.
	pub fn read_string(&mut self) -> Result<Option<String>> {
		Ok(self.read(BasicType::Str)?.and_then(|value| match value {
			Value::Str(s) => Some(s),
			_ => None,
		}))
	}

	/// Writes a human-readable dump of headers and body to stdout.
	///
	/// The read cursor is restored afterwards, so dumping never changes what later reads return.
	pub fn dump(&mut self) -> Result<()> {
		let text = self.dump_string()?;
		io::stdout()
			.lock()
			.write_all(text.as_bytes())
			.map_err(|err| Error::Introspection(err.to_string()))
	}

	/// Writes the dump to `out`. See [`Message::dump`].
	pub fn dump_to<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<()> {
		let text = self.dump_string()?;
		out.write_all(text.as_bytes())
			.map_err(|err| Error::Introspection(err.to_string()))
	}

	/// Returns the dump as a string. See [`Message::dump`].
	pub fn dump_string(&mut self) -> Result<String> {
		let State::Bound { raw, .. } = &mut self.state else {
			return Err(Error::InvalidArgument("message is not bound".into()));
		};
		let text = raw
			.dump()
			.map_err(|errno| Error::Introspection(describe(errno)))?;
		raw.rewind(true)
			.map_err(|errno| Error::Introspection(format!("cannot rewind: {}", describe(errno))))?;
		for &ty in &self.consumed {
			raw.read(ty)
				.map_err(|errno| Error::Introspection(format!("cannot restore read cursor: {}", describe(errno))))?;
		}
		Ok(text)
	}

	/// The error name and text when this is an error reply.
	pub fn error_frame(&self) -> Option<ErrorFrame> {
		self.as_raw().and_then(RawMessage::error)
	}

	/// Destination header.
	pub fn destination(&self) -> Option<&str> {
		self.as_raw().and_then(RawMessage::destination)
	}

	/// Object path header.
	pub fn path(&self) -> Option<&str> {
		self.as_raw().and_then(RawMessage::path)
	}

	/// Interface header.
	pub fn interface(&self) -> Option<&str> {
		self.as_raw().and_then(RawMessage::interface)
	}

	/// Member header.
	pub fn member(&self) -> Option<&str> {
		self.as_raw().and_then(RawMessage::member)
	}

	/// Body signature. Fails for an unbound message.
	pub fn signature(&self) -> Result<String> {
		self.bound().map(RawMessage::signature)
	}
}
