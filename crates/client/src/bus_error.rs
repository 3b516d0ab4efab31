//! Typed protocol errors.

use std::fmt;

macro_rules! error_kinds {
	($($(#[$meta:meta])* $kind:ident => $name:literal,)*) => {
		/// Kind of a protocol error reply.
		///
		/// Every kind specializes [`BusError`]: match `Error::Bus(_)` to handle any error reply,
		/// or [`BusError::kind`] to handle one.
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
		#[non_exhaustive]
		pub enum ErrorKind {
			$($(#[$meta])* $kind,)*
			/// An error name with no registered kind.
			Generic,
		}

		impl ErrorKind {
			/// All kinds keyed to a well-known `org.freedesktop.DBus.Error.*` name.
			pub const WELL_KNOWN: &[ErrorKind] = &[$(Self::$kind,)*];

			/// The well-known error name this kind is keyed to.
			pub const fn well_known_name(self) -> Option<&'static str> {
				match self {
					$(Self::$kind => Some($name),)*
					Self::Generic => None,
				}
			}
		}
	};
}

error_kinds! {
	/// Generic failure.
	Failed => "org.freedesktop.DBus.Error.Failed",
	/// Out of memory.
	NoMemory => "org.freedesktop.DBus.Error.NoMemory",
	/// No service provides the destination name.
	ServiceUnknown => "org.freedesktop.DBus.Error.ServiceUnknown",
	/// The destination name has no owner.
	NameHasNoOwner => "org.freedesktop.DBus.Error.NameHasNoOwner",
	/// No reply arrived in time.
	NoReply => "org.freedesktop.DBus.Error.NoReply",
	/// Input/output failure.
	IoError => "org.freedesktop.DBus.Error.IOError",
	/// Malformed bus address.
	BadAddress => "org.freedesktop.DBus.Error.BadAddress",
	/// Operation not supported.
	NotSupported => "org.freedesktop.DBus.Error.NotSupported",
	/// A resource limit was exceeded.
	LimitsExceeded => "org.freedesktop.DBus.Error.LimitsExceeded",
	/// Permission denied.
	AccessDenied => "org.freedesktop.DBus.Error.AccessDenied",
	/// Authentication failed.
	AuthFailed => "org.freedesktop.DBus.Error.AuthFailed",
	/// No server to connect to.
	NoServer => "org.freedesktop.DBus.Error.NoServer",
	/// The operation timed out.
	Timeout => "org.freedesktop.DBus.Error.Timeout",
	/// No network access.
	NoNetwork => "org.freedesktop.DBus.Error.NoNetwork",
	/// The address is already in use.
	AddressInUse => "org.freedesktop.DBus.Error.AddressInUse",
	/// The connection is closed.
	Disconnected => "org.freedesktop.DBus.Error.Disconnected",
	/// Arguments do not match the method's signature.
	InvalidArgs => "org.freedesktop.DBus.Error.InvalidArgs",
	/// The file already exists.
	FileExists => "org.freedesktop.DBus.Error.FileExists",
	/// The object has no such method.
	UnknownMethod => "org.freedesktop.DBus.Error.UnknownMethod",
	/// No object at the path.
	UnknownObject => "org.freedesktop.DBus.Error.UnknownObject",
	/// The object does not implement the interface.
	UnknownInterface => "org.freedesktop.DBus.Error.UnknownInterface",
	/// The interface has no such property.
	UnknownProperty => "org.freedesktop.DBus.Error.UnknownProperty",
	/// The property cannot be written.
	PropertyReadOnly => "org.freedesktop.DBus.Error.PropertyReadOnly",
	/// The peer's process id is unknown.
	UnixProcessIdUnknown => "org.freedesktop.DBus.Error.UnixProcessIdUnknown",
	/// Malformed type signature.
	InvalidSignature => "org.freedesktop.DBus.Error.InvalidSignature",
	/// The message is internally inconsistent.
	InconsistentMessage => "org.freedesktop.DBus.Error.InconsistentMessage",
	/// No such match rule.
	MatchRuleNotFound => "org.freedesktop.DBus.Error.MatchRuleNotFound",
	/// Malformed match rule.
	MatchRuleInvalid => "org.freedesktop.DBus.Error.MatchRuleInvalid",
	/// The call needs interactive authorization.
	InteractiveAuthorizationRequired => "org.freedesktop.DBus.Error.InteractiveAuthorizationRequired",
}

/// A protocol error reply.
///
/// Carries the error name and text exactly as the peer sent them, plus the kind the name
/// resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusError {
	kind: ErrorKind,
	name: String,
	message: Option<String>,
}

impl BusError {
	/// Creates an error of the given kind.
	pub fn new(kind: ErrorKind, name: impl Into<String>, message: Option<String>) -> Self {
		Self {
			kind,
			name: name.into(),
			message,
		}
	}

	/// The kind the error name resolved to.
	pub fn kind(&self) -> ErrorKind {
		self.kind
	}

	/// The protocol error name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The human-readable text, if the peer sent one.
	pub fn message(&self) -> Option<&str> {
		self.message.as_deref()
	}
}

impl fmt::Display for BusError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.message {
			Some(message) => write!(f, "{}: {message}", self.name),
			None => f.write_str(&self.name),
		}
	}
}

impl std::error::Error for BusError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn well_known_names_are_distinct_and_complete() {
		assert_eq!(ErrorKind::WELL_KNOWN.len(), 29);
		let mut names: Vec<_> = ErrorKind::WELL_KNOWN
			.iter()
			.filter_map(|kind| kind.well_known_name())
			.collect();
		names.sort_unstable();
		names.dedup();
		assert_eq!(names.len(), 29);
		assert_eq!(ErrorKind::Generic.well_known_name(), None);
		assert_eq!(
			ErrorKind::IoError.well_known_name(),
			Some("org.freedesktop.DBus.Error.IOError")
		);
	}

	#[test]
	fn display_includes_text_when_present() {
		let err = BusError::new(
			ErrorKind::AccessDenied,
			"org.freedesktop.DBus.Error.AccessDenied",
			Some("not allowed".into()),
		);
		assert_eq!(err.to_string(), "org.freedesktop.DBus.Error.AccessDenied: not allowed");
		let bare = BusError::new(ErrorKind::Generic, "com.example.Oops", None);
		assert_eq!(bare.to_string(), "com.example.Oops");
	}
}
