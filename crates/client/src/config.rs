//! Runtime configuration.

use std::time::Duration;

use sdbus_transport::BusKind;
use serde::Deserialize;

/// Configuration shared by every connection of a [`BusContext`](crate::BusContext).
///
/// Deserializes from host configuration files; every field is optional:
///
/// ```toml
/// bus = "session"
/// method_call_timeout_ms = 2500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
	/// Bus opened by [`Connection::open`](crate::Connection::open).
	pub bus: BusKind,
	/// Timeout for blocking and async method calls, in milliseconds. `None` leaves the choice
	/// to the transport.
	pub method_call_timeout_ms: Option<u64>,
}

impl BusConfig {
	/// Creates the default configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the bus opened by [`Connection::open`](crate::Connection::open).
	pub fn bus(mut self, bus: BusKind) -> Self {
		self.bus = bus;
		self
	}

	/// Set the method call timeout.
	pub fn method_call_timeout(mut self, timeout: Duration) -> Self {
		self.method_call_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
		self
	}

	/// The configured method call timeout, if any.
	pub fn timeout(&self) -> Option<Duration> {
		self.method_call_timeout_ms.map(Duration::from_millis)
	}

	/// Timeout in the transport's unit; `0` selects the transport default.
	pub(crate) fn timeout_usec(&self) -> u64 {
		self.method_call_timeout_ms
			.map_or(0, |ms| ms.saturating_mul(1000).max(1))
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_is_default() {
		let config: BusConfig = toml::from_str("").unwrap();
		assert_eq!(config, BusConfig::default());
		assert_eq!(config.timeout_usec(), 0);
	}

	#[test]
	fn parses_bus_and_timeout() {
		let config: BusConfig = toml::from_str("bus = \"system\"\nmethod_call_timeout_ms = 2500\n").unwrap();
		assert_eq!(config.bus, BusKind::System);
		assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
		assert_eq!(config.timeout_usec(), 2_500_000);
	}

	#[test]
	fn rejects_unknown_fields_and_buses() {
		assert!(toml::from_str::<BusConfig>("bus = \"starter\"").is_err());
		assert!(toml::from_str::<BusConfig>("dump = true").is_err());
	}

	#[test]
	fn zero_timeout_does_not_mean_transport_default() {
		let config = BusConfig::new().method_call_timeout(Duration::ZERO);
		assert_eq!(config.timeout_usec(), 1);
		let config = BusConfig::new().bus(BusKind::Session).method_call_timeout(Duration::from_secs(5));
		assert_eq!(config.bus, BusKind::Session);
		assert_eq!(config.timeout_usec(), 5_000_000);
	}
}
