//! Process-wide bus context.

use std::sync::Arc;

use tracing::debug;

use crate::{BusConfig, ErrorKind, ErrorRegistry, ErrorRegistryBuilder, OneshotCompletions};

/// Immutable state shared by every connection: the error registry, the completion factory and
/// the configuration.
///
/// Built once at startup and handed to connections as `Arc<BusContext<F>>`.
#[derive(Debug)]
pub struct BusContext<F = OneshotCompletions> {
	registry: Arc<ErrorRegistry>,
	completions: F,
	config: BusConfig,
}

impl BusContext {
	/// Starts a context with the standard registry, [`OneshotCompletions`] and the default
	/// configuration.
	pub fn builder() -> BusContextBuilder {
		BusContextBuilder {
			registry: ErrorRegistry::builder().with_standard(),
			completions: OneshotCompletions,
			config: BusConfig::default(),
		}
	}

	/// A context with all defaults.
	pub fn standard() -> Arc<Self> {
		Self::builder().build()
	}
}

impl<F> BusContext<F> {
	/// The error registry.
	pub fn registry(&self) -> &Arc<ErrorRegistry> {
		&self.registry
	}

	/// The completion factory.
	pub fn completions(&self) -> &F {
		&self.completions
	}

	/// The configuration.
	pub fn config(&self) -> &BusConfig {
		&self.config
	}
}

/// Builder for [`BusContext`].
#[derive(Debug)]
pub struct BusContextBuilder<F = OneshotCompletions> {
	registry: ErrorRegistryBuilder,
	completions: F,
	config: BusConfig,
}

impl<F> BusContextBuilder<F> {
	/// Replaces the registrations collected so far.
	pub fn registry(mut self, registry: ErrorRegistryBuilder) -> Self {
		self.registry = registry;
		self
	}

	/// Registers an additional error name.
	pub fn register_error(mut self, name: impl Into<String>, kind: ErrorKind) -> Self {
		self.registry = self.registry.register(name, kind);
		self
	}

	/// Replaces the completion factory.
	pub fn completions<G>(self, completions: G) -> BusContextBuilder<G> {
		BusContextBuilder {
			registry: self.registry,
			completions,
			config: self.config,
		}
	}

	/// Replaces the configuration.
	pub fn config(mut self, config: BusConfig) -> Self {
		self.config = config;
		self
	}

	/// Freezes the context.
	pub fn build(self) -> Arc<BusContext<F>> {
		let registry = self.registry.build();
		debug!(errors = registry.len(), bus = %self.config.bus, "bus.context.ready");
		Arc::new(BusContext {
			registry: Arc::new(registry),
			completions: self.completions,
			config: self.config,
		})
	}
}
