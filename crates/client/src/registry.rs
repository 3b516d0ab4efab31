//! Error-name to [`ErrorKind`] lookup.
//!
//! The registry is built once, then shared read-only by every blocking call and every
//! completion bridge. Lookup is total: names without a registration resolve to
//! [`ErrorKind::Generic`].

use rustc_hash::FxHashMap;
use sdbus_transport::ErrorFrame;
use tracing::{debug, warn};

use crate::{BusError, ErrorKind};

#[cfg(test)]
mod tests;

/// Immutable mapping from protocol error names to kinds.
#[derive(Debug, Clone, Default)]
pub struct ErrorRegistry {
	kinds: FxHashMap<Box<str>, ErrorKind>,
}

impl ErrorRegistry {
	/// Starts an empty registry.
	pub fn builder() -> ErrorRegistryBuilder {
		ErrorRegistryBuilder::default()
	}

	/// The registry of all well-known `org.freedesktop.DBus.Error.*` names.
	pub fn standard() -> Self {
		Self::builder().with_standard().build()
	}

	/// Resolves an error name. Never fails.
	pub fn lookup(&self, name: &str) -> ErrorKind {
		self.kinds.get(name).copied().unwrap_or(ErrorKind::Generic)
	}

	/// Resolves an error reply into a typed error, keeping name and text verbatim.
	pub fn error_for(&self, frame: ErrorFrame) -> BusError {
		let kind = self.lookup(&frame.name);
		BusError::new(kind, frame.name, frame.message)
	}

	/// Number of registered names.
	pub fn len(&self) -> usize {
		self.kinds.len()
	}

	/// Whether no names are registered.
	pub fn is_empty(&self) -> bool {
		self.kinds.is_empty()
	}

	/// Iterates registered names and their kinds, in no particular order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, ErrorKind)> {
		self.kinds.iter().map(|(name, kind)| (&**name, *kind))
	}
}

/// Collects registrations for an [`ErrorRegistry`].
#[derive(Debug, Clone, Default)]
pub struct ErrorRegistryBuilder {
	kinds: FxHashMap<Box<str>, ErrorKind>,
}

impl ErrorRegistryBuilder {
	/// Registers every well-known name with its kind.
	pub fn with_standard(mut self) -> Self {
		for &kind in ErrorKind::WELL_KNOWN {
			if let Some(name) = kind.well_known_name() {
				self.kinds.insert(name.into(), kind);
			}
		}
		self
	}

	/// Registers `name` as `kind`. A later registration of the same name replaces an earlier
	/// one. Empty names are ignored.
	pub fn register(mut self, name: impl Into<String>, kind: ErrorKind) -> Self {
		let name = name.into();
		if name.is_empty() {
			warn!(?kind, "bus.registry.empty_name");
			return self;
		}
		if let Some(previous) = self.kinds.insert(name.clone().into_boxed_str(), kind) {
			debug!(name = %name, ?previous, ?kind, "bus.registry.replaced");
		}
		self
	}

	/// Freezes the registrations.
	pub fn build(self) -> ErrorRegistry {
		ErrorRegistry { kinds: self.kinds }
	}
}
