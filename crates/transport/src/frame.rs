//! Protocol error replies.

use std::fmt;

use rustix::io::Errno;

/// Name and optional text of a D-Bus error reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorFrame {
	/// Error name, e.g. `org.freedesktop.DBus.Error.UnknownMethod`.
	pub name: String,
	/// Human-readable text, when the peer sent one.
	pub message: Option<String>,
}

impl ErrorFrame {
	/// Creates a frame with a message text.
	pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			message: Some(message.into()),
		}
	}

	/// Creates a frame carrying only a name.
	pub fn bare(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			message: None,
		}
	}
}

impl fmt::Display for ErrorFrame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.message {
			Some(message) => write!(f, "{}: {message}", self.name),
			None => f.write_str(&self.name),
		}
	}
}

/// Maps a well-known error name to the error number a transport returns alongside it.
///
/// Follows sd-bus's standard table; unknown names map to `EIO`.
pub fn errno_for_error_name(name: &str) -> Errno {
	let Some(short) = name.strip_prefix("org.freedesktop.DBus.Error.") else {
		return Errno::from_raw_os_error(libc::EIO);
	};
	let code = match short {
		"Failed" | "AccessDenied" | "AuthFailed" | "InteractiveAuthorizationRequired" => libc::EACCES,
		"NoMemory" => libc::ENOMEM,
		"ServiceUnknown" => libc::EHOSTUNREACH,
		"NameHasNoOwner" => libc::ENXIO,
		"NoReply" | "Timeout" => libc::ETIMEDOUT,
		"IOError" => libc::EIO,
		"BadAddress" => libc::EADDRNOTAVAIL,
		"NotSupported" => libc::EOPNOTSUPP,
		"LimitsExceeded" => libc::ENOBUFS,
		"NoServer" => libc::EHOSTDOWN,
		"NoNetwork" => libc::ENONET,
		"AddressInUse" => libc::EADDRINUSE,
		"Disconnected" => libc::ECONNRESET,
		"InvalidArgs" | "InvalidSignature" | "MatchRuleInvalid" => libc::EINVAL,
		"FileNotFound" | "MatchRuleNotFound" => libc::ENOENT,
		"FileExists" => libc::EEXIST,
		"UnknownMethod" | "UnknownObject" | "UnknownInterface" | "UnknownProperty" => libc::EBADR,
		"PropertyReadOnly" => libc::EROFS,
		"UnixProcessIdUnknown" => libc::ESRCH,
		"InconsistentMessage" => libc::EBADMSG,
		_ => libc::EIO,
	};
	Errno::from_raw_os_error(code)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn well_known_names_map_like_sd_bus() {
		assert_eq!(
			errno_for_error_name("org.freedesktop.DBus.Error.UnknownMethod").raw_os_error(),
			libc::EBADR
		);
		assert_eq!(
			errno_for_error_name("org.freedesktop.DBus.Error.ServiceUnknown").raw_os_error(),
			libc::EHOSTUNREACH
		);
		assert_eq!(errno_for_error_name("com.example.Error.Busy").raw_os_error(), libc::EIO);
	}

	#[test]
	fn display_includes_text_when_present() {
		let frame = ErrorFrame::new("org.example.Error", "went wrong");
		assert_eq!(frame.to_string(), "org.example.Error: went wrong");
		assert_eq!(ErrorFrame::bare("org.example.Error").to_string(), "org.example.Error");
	}
}
