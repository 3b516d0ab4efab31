//! D-Bus client runtime.
//!
//! A thin layer over a native bus transport ([`sdbus_transport`]) that opens a connection,
//! builds method-call messages, performs blocking or non-blocking calls, and maps protocol
//! error replies onto a typed error hierarchy.
//!
//! The pieces, leaf first:
//!
//! - [`ErrorRegistry`]: total mapping from error names to [`ErrorKind`]s.
//! - [`Message`]: an owned bus message, either an outgoing call or an inbound reply.
//! - [`Connection`]: an owned bus connection; builds calls and dispatches them.
//! - The completion bridge: settles one [`Completer`] per async call from inside the
//!   transport's dispatch step.
//! - [`BusContext`]: the registry, completion factory and [`BusConfig`] built once at startup
//!   and shared by every connection.
//!
//! ```ignore
//! let ctx = BusContext::standard();
//! let conn = Connection::<SdBus>::connect_default(ctx)?;
//! let mut call = conn.new_method_call_message(
//! 	"org.freedesktop.Notifications",
//! 	"/org/freedesktop/Notifications",
//! 	"org.freedesktop.Notifications",
//! 	"GetServerInformation",
//! )?;
//! let mut reply = conn.call(&mut call)?;
//! reply.dump()?;
//! ```
//!
//! ## Cargo features
//!
//! - `loopback`: Re-exports the in-process backend from `sdbus-transport`.
//!   *Enabled by default.*
//! - `libsystemd`: The `sd-bus` backend.
//!   *Disabled by default.*
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

/// Re-export of the transport crate.
pub use sdbus_transport as transport;
pub use sdbus_transport::{BasicType, BusKind, Errno, ErrorFrame, RawBus, RawMessage, Value};

mod bridge;
mod bus_error;
mod completion;
mod config;
mod connection;
mod context;
mod message;
mod proxy;
mod registry;

pub use bus_error::{BusError, ErrorKind};
pub use completion::{Completer, CompletionFactory, OneshotCompleter, OneshotCompletions, PendingReply, SettleError};
pub use config::BusConfig;
pub use connection::Connection;
pub use context::{BusContext, BusContextBuilder};
pub use message::{Message, Role};
pub use proxy::Proxy;
pub use registry::{ErrorRegistry, ErrorRegistryBuilder};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// A caller broke an operation's contract, e.g. appended to a reply.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
	/// No bus of the requested kind was reachable.
	#[error("cannot connect to the {bus} bus: {reason}")]
	Connection {
		/// Requested bus.
		bus: BusKind,
		/// Error number reported by the transport.
		errno: Errno,
		/// Platform description of `errno`.
		reason: String,
	},
	/// A method call could not be constructed.
	#[error("cannot construct method call: {0}")]
	MessageConstruction(String),
	/// A field could not be appended.
	#[error("cannot append field: {0}")]
	Encoding(String),
	/// A field could not be read.
	#[error("cannot read field: {0}")]
	Decoding(String),
	/// Dumping a message or restoring its read cursor failed.
	#[error("cannot dump message: {0}")]
	Introspection(String),
	/// The transport failed without an error reply.
	#[error("transport failure: {description}")]
	Transport {
		/// Error number reported by the transport.
		errno: Errno,
		/// Platform description of `errno`.
		description: String,
	},
	/// An async call could not be registered, or a dispatch step failed.
	#[error("dispatch failed: {0}")]
	Dispatch(String),
	/// The peer answered with an error reply.
	#[error(transparent)]
	Bus(#[from] BusError),
}

impl Error {
	pub(crate) fn transport(errno: Errno) -> Self {
		Self::Transport {
			errno,
			description: sdbus_transport::describe(errno),
		}
	}

	/// Returns the bus error when this is an error reply.
	pub fn as_bus_error(&self) -> Option<&BusError> {
		match self {
			Self::Bus(err) => Some(err),
			_ => None,
		}
	}

	/// Returns the error kind of an error reply, or `None` for local and transport errors.
	pub fn bus_kind(&self) -> Option<ErrorKind> {
		self.as_bus_error().map(BusError::kind)
	}
}
