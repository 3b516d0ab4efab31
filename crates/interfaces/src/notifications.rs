//! `org.freedesktop.Notifications` client.
//!
//! Covers the methods whose arguments and replies are basic types. `Notify` and
//! `GetCapabilities` need container types and are not bound.

use std::future::Future;

use sdbus_client::{
	CompletionFactory, Connection, Error, Message, OneshotCompletions, Proxy, RawBus, RawMessage, Result, Value,
};
use tracing::debug;

/// Well-known bus name of the notification daemon.
pub const DESTINATION: &str = "org.freedesktop.Notifications";
/// Object path of the notification daemon.
pub const PATH: &str = "/org/freedesktop/Notifications";
/// Interface name.
pub const INTERFACE: &str = "org.freedesktop.Notifications";

/// Reply of `GetServerInformation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInformation {
	/// Product name of the server.
	pub name: String,
	/// Vendor name.
	pub vendor: String,
	/// Server version.
	pub version: String,
	/// Version of the notification specification the server implements.
	pub spec_version: String,
}

impl ServerInformation {
	/// Decodes a `(ssss)` reply body.
	pub fn from_reply<M: RawMessage>(reply: &mut Message<M>) -> Result<Self> {
		let mut next = |field: &str| -> Result<String> {
			reply
				.read_string()?
				.ok_or_else(|| Error::Decoding(format!("GetServerInformation reply is missing {field}")))
		};
		Ok(Self {
			name: next("name")?,
			vendor: next("vendor")?,
			version: next("version")?,
			spec_version: next("spec_version")?,
		})
	}
}

/// Client for the desktop notification daemon.
#[derive(Debug)]
pub struct Notifications<'c, B: RawBus, F = OneshotCompletions> {
	proxy: Proxy<'c, B, F>,
}

impl<'c, B: RawBus, F> Notifications<'c, B, F> {
	/// Binds the daemon at its well-known name and path.
	pub fn new(connection: &'c Connection<B, F>) -> Self {
		Self::at(connection, DESTINATION, PATH)
	}

	/// Binds a daemon at a custom name and path.
	pub fn at(connection: &'c Connection<B, F>, destination: &str, path: &str) -> Self {
		Self {
			proxy: Proxy::new(connection, destination, path, INTERFACE),
		}
	}

	/// The underlying proxy.
	pub fn proxy(&self) -> &Proxy<'c, B, F> {
		&self.proxy
	}

	/// Closes notification `id`.
	pub fn close_notification(&self, id: u32) -> Result<()> {
		debug!(id, "notifications.close");
		self.proxy.call("CloseNotification", &[Value::Uint32(id)]).map(drop)
	}

	/// Queries the server's identity.
	pub fn get_server_information(&self) -> Result<ServerInformation> {
		let mut reply = self.proxy.call("GetServerInformation", &[])?;
		ServerInformation::from_reply(&mut reply)
	}
}

impl<B, F> Notifications<'_, B, F>
where
	B: RawBus,
	F: CompletionFactory<B::Message>,
	F::Handle: Future<Output = Result<Message<B::Message>>>,
{
	/// Closes notification `id` without blocking.
	///
	/// The call is sent immediately; the returned future completes once the connection has
	/// dispatched the reply.
	pub fn close_notification_async(&self, id: u32) -> Result<impl Future<Output = Result<()>> + use<B, F>> {
		debug!(id, "notifications.close_async");
		let pending = self.proxy.call_async("CloseNotification", &[Value::Uint32(id)])?;
		Ok(async move { pending.await.map(drop) })
	}

	/// Queries the server's identity without blocking.
	pub fn get_server_information_async(&self) -> Result<impl Future<Output = Result<ServerInformation>> + use<B, F>> {
		let pending = self.proxy.call_async("GetServerInformation", &[])?;
		Ok(async move {
			let mut reply = pending.await?;
			ServerInformation::from_reply(&mut reply)
		})
	}
}
