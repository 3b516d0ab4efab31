//! Raw bus and message primitives for the sdbus client runtime.
//!
//! This crate describes the surface of a native D-Bus transport library as two traits,
//! [`RawBus`] and [`RawMessage`]. A value of either type owns exactly one native resource and
//! releases it exactly once when dropped. The client runtime (`sdbus-client`) is written
//! against these traits only, so it runs unchanged over any backend:
//!
//! - [`loopback`]: an in-process bus daemon with registered services. Async replies are
//!   queued and only delivered by [`RawBus::process`], which makes completion ordering fully
//!   observable in tests.
//! - [`sys`]: bindings to libsystemd's `sd-bus`.
//!
//! ## Cargo features
//!
//! - `loopback`: The in-process backend.
//!   *Enabled by default.*
//! - `libsystemd`: The `sd-bus` backend. Links against `libsystemd`.
//!   *Disabled by default.*
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

use std::fmt;

pub use rustix::io::Errno;
use serde::Deserialize;

mod frame;
pub mod names;
mod value;

pub use frame::{ErrorFrame, errno_for_error_name};
pub use value::{BasicType, Value};

#[cfg(feature = "loopback")]
#[cfg_attr(docsrs, doc(cfg(feature = "loopback")))]
pub mod loopback;

#[cfg(feature = "libsystemd")]
#[cfg_attr(docsrs, doc(cfg(feature = "libsystemd")))]
pub mod sys;

/// Reply callback registered with [`RawBus::call_async`].
///
/// The transport invokes it at most once, from inside its dispatch step, with the reply or
/// error message. A negative return value is logged by the transport and does not fail the
/// dispatch step.
pub type ReplyCallback<M> = Box<dyn FnOnce(M) -> i32 + Send>;

/// Which bus a connection is opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
	/// The transport's default bus: the user bus inside a user session, the system bus
	/// otherwise.
	#[default]
	Default,
	/// The per-user session bus.
	Session,
	/// The system-wide bus.
	System,
}

impl fmt::Display for BusKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Default => "default",
			Self::Session => "session",
			Self::System => "system",
		})
	}
}

/// Message type as carried in the D-Bus header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
	/// A method call.
	MethodCall,
	/// A successful method return.
	MethodReturn,
	/// An error reply.
	MethodError,
	/// A broadcast signal.
	Signal,
}

impl MessageType {
	/// Converts the wire type code.
	pub const fn from_code(code: u8) -> Option<Self> {
		match code {
			1 => Some(Self::MethodCall),
			2 => Some(Self::MethodReturn),
			3 => Some(Self::MethodError),
			4 => Some(Self::Signal),
			_ => None,
		}
	}

	/// Name used in message dumps.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::MethodCall => "method_call",
			Self::MethodReturn => "method_return",
			Self::MethodError => "method_error",
			Self::Signal => "signal",
		}
	}
}

/// Failure of a blocking [`RawBus::call`].
///
/// Mirrors a negative return code plus the optionally filled-in error structure. When the
/// peer answered with an error reply, `frame` carries its name and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
	/// The (positive) error number reported by the transport.
	pub errno: Errno,
	/// The protocol error reply, if one arrived.
	pub frame: Option<ErrorFrame>,
}

impl CallFailure {
	/// A low-level failure with no error reply.
	pub const fn bare(errno: Errno) -> Self {
		Self { errno, frame: None }
	}
}

impl fmt::Display for CallFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.frame {
			Some(frame) => write!(f, "bus call failed: {frame}"),
			None => write!(f, "bus call failed: {}", describe(self.errno)),
		}
	}
}

impl std::error::Error for CallFailure {}

/// Returns the platform's description of `errno`.
pub fn describe(errno: Errno) -> String {
	std::io::Error::from(errno).to_string()
}

/// An owned native message resource.
pub trait RawMessage: Sized + 'static {
	/// Returns the header message type, or `None` when it cannot be read or is not a known
	/// type.
	fn message_type(&self) -> Option<MessageType>;

	/// Appends a basic-type field to the body. Fails once the message is sealed.
	fn append(&mut self, value: &Value) -> Result<(), Errno>;

	/// Reads the next body field, which must be of type `ty`.
	///
	/// Returns `Ok(None)` at the end of the body.
	fn read(&mut self, ty: BasicType) -> Result<Option<Value>, Errno>;

	/// Renders headers and body in human-readable form.
	///
	/// Dumping walks the body with the read cursor; callers restore it with
	/// [`RawMessage::rewind`].
	fn dump(&mut self) -> Result<String, Errno>;

	/// Moves the read cursor back to the start of the body (`complete`) or of the current
	/// container.
	fn rewind(&mut self, complete: bool) -> Result<(), Errno>;

	/// Returns the error name and text when this is an error reply.
	fn error(&self) -> Option<ErrorFrame>;

	/// Destination bus name header.
	fn destination(&self) -> Option<&str>;

	/// Object path header.
	fn path(&self) -> Option<&str>;

	/// Interface header.
	fn interface(&self) -> Option<&str>;

	/// Member header.
	fn member(&self) -> Option<&str>;

	/// Body signature.
	fn signature(&self) -> String;
}

/// An owned native bus connection resource.
///
/// A timeout of `0` microseconds always means "the transport's default".
pub trait RawBus: Sized + 'static {
	/// Message resource type produced by this bus.
	type Message: RawMessage;

	/// Opens a connection to the bus of the given kind.
	fn open(kind: BusKind) -> Result<Self, Errno>;

	/// Builds a new outgoing method call. Malformed names fail with `EINVAL`.
	fn new_method_call(
		&self,
		destination: &str,
		path: &str,
		interface: &str,
		member: &str,
	) -> Result<Self::Message, Errno>;

	/// Sends `message` and blocks until its reply or error arrives.
	///
	/// Sending seals `message`.
	fn call(&self, message: &mut Self::Message, timeout_usec: u64) -> Result<Self::Message, CallFailure>;

	/// Sends `message` and registers `callback` for its reply without blocking.
	///
	/// The callback is delivered at most once, from [`RawBus::process`]. When registration
	/// fails the callback is dropped without being invoked.
	fn call_async(
		&self,
		message: &mut Self::Message,
		callback: ReplyCallback<Self::Message>,
		timeout_usec: u64,
	) -> Result<(), Errno>;

	/// Runs one dispatch step.
	///
	/// Returns `Ok(true)` when something was processed and more work may be pending, and
	/// `Ok(false)` when the bus is idle. Errors come from the transport itself, never from a
	/// reply callback's status.
	fn process(&self) -> Result<bool, Errno>;
}
