//! In-process bus daemon.
//!
//! A [`LoopbackDaemon`] routes method calls to services registered as closures. Connections
//! obtained from it implement [`RawBus`] with the same observable contract as sd-bus:
//!
//! - a blocking [`RawBus::call`] runs the target service synchronously and returns its reply,
//!   or a [`CallFailure`] whose frame carries the error reply;
//! - [`RawBus::call_async`] queues the reply and returns immediately; only
//!   [`RawBus::process`] delivers it, one reply per step, each callback at most once;
//! - a callback's negative status is logged and never stops dispatch;
//! - calls to unknown names fail with `org.freedesktop.DBus.Error.ServiceUnknown`, calls to
//!   [silent](LoopbackDaemon::silent) names never receive a reply. A blocking call reports
//!   `NoReply` at once; an async call is settled with a `NoReply` error reply by the first
//!   [`RawBus::process`] after its timeout (25 seconds when the caller passes `0`).
//!
//! ```ignore
//! let daemon = LoopbackDaemon::new();
//! daemon.serve("org.example.Echo", |call| Ok(call.args.to_vec()));
//! let bus = daemon.connect()?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustix::io::Errno;
use tracing::{debug, warn};

use crate::names::{validate_bus_name, validate_interface, validate_member, validate_object_path};
use crate::{
	BusKind, CallFailure, ErrorFrame, MessageType, RawBus, RawMessage, ReplyCallback, Value,
	errno_for_error_name,
};

mod message;

pub use message::LoopbackMessage;

#[cfg(test)]
mod tests;

const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";
const NO_REPLY: &str = "org.freedesktop.DBus.Error.NoReply";
/// sd-bus's method call timeout when the caller passes `0`.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

/// A method call as seen by a loopback service.
#[derive(Debug, Clone, Copy)]
pub struct MethodCall<'a> {
	/// Destination bus name.
	pub destination: &'a str,
	/// Object path.
	pub path: &'a str,
	/// Interface name.
	pub interface: &'a str,
	/// Member name.
	pub member: &'a str,
	/// Body fields in wire order.
	pub args: &'a [Value],
}

/// Outcome of a service handler: reply body fields or an error reply.
pub type ServiceReply = Result<Vec<Value>, ErrorFrame>;

type Handler = Arc<dyn Fn(&MethodCall<'_>) -> ServiceReply + Send + Sync>;

#[derive(Clone)]
enum Endpoint {
	Service(Handler),
	Silent,
}

struct DaemonState {
	endpoints: HashMap<String, Endpoint>,
	next_serial: u32,
	next_connection: u32,
	injected_failure: Option<Errno>,
	online: bool,
}

enum Route {
	Reply(LoopbackMessage),
	Silent,
	Failed(Errno),
}

/// An in-process bus daemon.
pub struct LoopbackDaemon {
	state: Mutex<DaemonState>,
}

impl std::fmt::Debug for LoopbackDaemon {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		let mut names: Vec<_> = state.endpoints.keys().collect();
		names.sort();
		f.debug_struct("LoopbackDaemon")
			.field("names", &names)
			.field("online", &state.online)
			.finish_non_exhaustive()
	}
}

impl LoopbackDaemon {
	/// Creates an isolated daemon with no registered names.
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(DaemonState {
				endpoints: HashMap::new(),
				next_serial: 1,
				next_connection: 1,
				injected_failure: None,
				online: true,
			}),
		})
	}

	/// Returns the process-wide daemon standing in for the given bus.
	///
	/// [`BusKind::Default`] and [`BusKind::Session`] share one daemon.
	pub fn global(kind: BusKind) -> Arc<Self> {
		static SESSION: OnceLock<Arc<LoopbackDaemon>> = OnceLock::new();
		static SYSTEM: OnceLock<Arc<LoopbackDaemon>> = OnceLock::new();
		let cell = match kind {
			BusKind::Default | BusKind::Session => &SESSION,
			BusKind::System => &SYSTEM,
		};
		Arc::clone(cell.get_or_init(Self::new))
	}

	/// Registers a service that answers every call to `name` with `handler`.
	pub fn serve<F>(&self, name: impl Into<String>, handler: F)
	where
		F: Fn(&MethodCall<'_>) -> ServiceReply + Send + Sync + 'static,
	{
		self.state
			.lock()
			.endpoints
			.insert(name.into(), Endpoint::Service(Arc::new(handler)));
	}

	/// Registers a name that accepts calls but never replies.
	pub fn silent(&self, name: impl Into<String>) {
		self.state.lock().endpoints.insert(name.into(), Endpoint::Silent);
	}

	/// Releases a registered name.
	pub fn release(&self, name: &str) -> bool {
		self.state.lock().endpoints.remove(name).is_some()
	}

	/// Makes the next call or call registration fail with `errno` and no error reply.
	pub fn fail_next_call(&self, errno: Errno) {
		self.state.lock().injected_failure = Some(errno);
	}

	/// Takes the daemon on- or offline. Offline daemons refuse new connections.
	pub fn set_online(&self, online: bool) {
		self.state.lock().online = online;
	}

	/// Opens a connection to this daemon.
	pub fn connect(self: &Arc<Self>) -> Result<LoopbackBus, Errno> {
		let mut state = self.state.lock();
		if !state.online {
			return Err(Errno::from_raw_os_error(libc::ECONNREFUSED));
		}
		let unique_name = format!(":1.{}", state.next_connection);
		state.next_connection += 1;
		drop(state);

		debug!(unique_name = %unique_name, "loopback.connect");
		Ok(LoopbackBus {
			daemon: Arc::clone(self),
			unique_name,
			queue: Mutex::new(VecDeque::new()),
			parked: Mutex::new(Vec::new()),
		})
	}

	fn next_serial(&self) -> u32 {
		let mut state = self.state.lock();
		let serial = state.next_serial;
		state.next_serial += 1;
		serial
	}

	fn route(&self, sender: &str, call: &mut LoopbackMessage) -> Route {
		let destination = call.destination().unwrap_or_default().to_owned();
		let endpoint = {
			let mut state = self.state.lock();
			if let Some(errno) = state.injected_failure.take() {
				return Route::Failed(errno);
			}
			let serial = state.next_serial;
			state.next_serial += 1;
			call.seal(serial);
			state.endpoints.get(&destination).cloned()
		};

		let mut reply = match endpoint {
			None => LoopbackMessage::method_error(
				call,
				sender,
				ErrorFrame::new(
					SERVICE_UNKNOWN,
					format!("The name {destination} was not provided by any .service files"),
				),
			),
			Some(Endpoint::Silent) => return Route::Silent,
			Some(Endpoint::Service(handler)) => {
				let view = MethodCall {
					destination: &destination,
					path: call.path().unwrap_or_default(),
					interface: call.interface().unwrap_or_default(),
					member: call.member().unwrap_or_default(),
					args: call.body(),
				};
				match handler(&view) {
					Ok(body) => LoopbackMessage::method_return(call, sender, body),
					Err(frame) => LoopbackMessage::method_error(call, sender, frame),
				}
			}
		};

		reply.seal(self.next_serial());
		debug!(
			destination = %destination,
			member = call.member().unwrap_or_default(),
			reply = reply.message_type().map_or("unknown", MessageType::as_str),
			"loopback.route"
		);
		Route::Reply(reply)
	}
}

struct Queued {
	reply: LoopbackMessage,
	callback: ReplyCallback<LoopbackMessage>,
}

/// An async call to a silent name, answered with `NoReply` once `deadline` passes.
struct Parked {
	timeout: LoopbackMessage,
	/// `None` when the timeout is too large to represent.
	deadline: Option<Instant>,
	callback: ReplyCallback<LoopbackMessage>,
}

/// A connection to a [`LoopbackDaemon`].
pub struct LoopbackBus {
	daemon: Arc<LoopbackDaemon>,
	unique_name: String,
	queue: Mutex<VecDeque<Queued>>,
	parked: Mutex<Vec<Parked>>,
}

impl std::fmt::Debug for LoopbackBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LoopbackBus")
			.field("unique_name", &self.unique_name)
			.field("pending", &self.pending())
			.field("unanswered", &self.unanswered())
			.finish_non_exhaustive()
	}
}

impl LoopbackBus {
	/// Unique name assigned by the daemon.
	pub fn unique_name(&self) -> &str {
		&self.unique_name
	}

	/// The daemon this connection talks to.
	pub fn daemon(&self) -> &Arc<LoopbackDaemon> {
		&self.daemon
	}

	/// Number of async replies waiting for [`RawBus::process`].
	pub fn pending(&self) -> usize {
		self.queue.lock().len()
	}

	/// Number of async calls sent to silent names whose timeout has not been delivered.
	pub fn unanswered(&self) -> usize {
		self.parked.lock().len()
	}

	fn park(&self, call: &LoopbackMessage, callback: ReplyCallback<LoopbackMessage>, timeout_usec: u64) {
		let timeout = match timeout_usec {
			0 => DEFAULT_TIMEOUT,
			usec => Duration::from_micros(usec),
		};
		let mut reply = LoopbackMessage::method_error(
			call,
			&self.unique_name,
			ErrorFrame::new(NO_REPLY, "Method call timed out"),
		);
		reply.seal(self.daemon.next_serial());
		self.parked.lock().push(Parked {
			timeout: reply,
			deadline: Instant::now().checked_add(timeout),
			callback,
		});
	}

	fn take_expired(&self) -> Option<Queued> {
		let now = Instant::now();
		let mut parked = self.parked.lock();
		let index = parked
			.iter()
			.position(|p| p.deadline.is_some_and(|deadline| deadline <= now))?;
		let Parked { timeout, callback, .. } = parked.remove(index);
		debug!(serial = timeout.serial(), "loopback.process.timed_out");
		Some(Queued {
			reply: timeout,
			callback,
		})
	}
}

impl RawBus for LoopbackBus {
	type Message = LoopbackMessage;

	fn open(kind: BusKind) -> Result<Self, Errno> {
		LoopbackDaemon::global(kind).connect()
	}

	fn new_method_call(
		&self,
		destination: &str,
		path: &str,
		interface: &str,
		member: &str,
	) -> Result<LoopbackMessage, Errno> {
		let checks = [
			validate_bus_name(destination),
			validate_object_path(path),
			validate_interface(interface),
			validate_member(member),
		];
		if let Some(err) = checks.into_iter().find_map(Result::err) {
			debug!(error = %err, "loopback.new_method_call.invalid");
			return Err(Errno::from_raw_os_error(libc::EINVAL));
		}
		Ok(LoopbackMessage::method_call(destination, path, interface, member))
	}

	fn call(&self, message: &mut LoopbackMessage, _timeout_usec: u64) -> Result<LoopbackMessage, CallFailure> {
		if message.message_type() != Some(MessageType::MethodCall) {
			return Err(CallFailure::bare(Errno::from_raw_os_error(libc::EINVAL)));
		}
		match self.daemon.route(&self.unique_name, message) {
			Route::Reply(reply) => match reply.error() {
				Some(frame) => Err(CallFailure {
					errno: errno_for_error_name(&frame.name),
					frame: Some(frame),
				}),
				None => Ok(reply),
			},
			Route::Silent => Err(CallFailure {
				errno: Errno::from_raw_os_error(libc::ETIMEDOUT),
				frame: Some(ErrorFrame::new(NO_REPLY, "Method call timed out")),
			}),
			Route::Failed(errno) => Err(CallFailure::bare(errno)),
		}
	}

	fn call_async(
		&self,
		message: &mut LoopbackMessage,
		callback: ReplyCallback<LoopbackMessage>,
		timeout_usec: u64,
	) -> Result<(), Errno> {
		if message.message_type() != Some(MessageType::MethodCall) {
			return Err(Errno::from_raw_os_error(libc::EINVAL));
		}
		match self.daemon.route(&self.unique_name, message) {
			Route::Reply(reply) => self.queue.lock().push_back(Queued { reply, callback }),
			Route::Silent => self.park(message, callback, timeout_usec),
			Route::Failed(errno) => return Err(errno),
		}
		Ok(())
	}

	fn process(&self) -> Result<bool, Errno> {
		let next = self.queue.lock().pop_front();
		let Some(Queued { reply, callback }) = next.or_else(|| self.take_expired()) else {
			return Ok(false);
		};
		let reply_serial = reply.serial();
		let status = callback(reply);
		if status < 0 {
			warn!(serial = reply_serial, status, "loopback.process.callback_failed");
		}
		Ok(true)
	}
}
