//! Validation of D-Bus names and object paths.
//!
//! Native transports validate these themselves; the loopback backend uses this module so it
//! rejects exactly what a real bus would.

/// Maximum length of bus names, interfaces and members.
pub const MAX_NAME_LEN: usize = 255;

/// Reason a name or path was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
	/// The name is empty.
	#[error("name is empty")]
	Empty,
	/// The name exceeds [`MAX_NAME_LEN`].
	#[error("name is longer than {MAX_NAME_LEN} bytes")]
	TooLong,
	/// A dotted name has fewer than two elements.
	#[error("name must have at least two elements")]
	TooFewElements,
	/// An element between separators is empty.
	#[error("name contains an empty element")]
	EmptyElement,
	/// An element starts with a digit where that is not allowed.
	#[error("element starts with a digit")]
	LeadingDigit,
	/// A character outside the allowed set.
	#[error("invalid character {0:?}")]
	InvalidChar(char),
	/// An object path does not start with `/`.
	#[error("object path must start with '/'")]
	NotAbsolute,
	/// An object path ends with `/`.
	#[error("object path must not end with '/'")]
	TrailingSlash,
}

fn check_element(element: &str, allow_dash: bool, allow_leading_digit: bool) -> Result<(), NameError> {
	let mut chars = element.chars();
	let first = chars.next().ok_or(NameError::EmptyElement)?;
	if first.is_ascii_digit() && !allow_leading_digit {
		return Err(NameError::LeadingDigit);
	}
	for c in std::iter::once(first).chain(chars) {
		let ok = c.is_ascii_alphanumeric() || c == '_' || (allow_dash && c == '-');
		if !ok {
			return Err(NameError::InvalidChar(c));
		}
	}
	Ok(())
}

fn check_dotted(name: &str, allow_dash: bool, allow_leading_digit: bool) -> Result<(), NameError> {
	if name.is_empty() {
		return Err(NameError::Empty);
	}
	if name.len() > MAX_NAME_LEN {
		return Err(NameError::TooLong);
	}
	let mut count = 0;
	for element in name.split('.') {
		check_element(element, allow_dash, allow_leading_digit)?;
		count += 1;
	}
	if count < 2 {
		return Err(NameError::TooFewElements);
	}
	Ok(())
}

/// Validates a bus name, either unique (`:1.42`) or well-known (`org.example.App`).
pub fn validate_bus_name(name: &str) -> Result<(), NameError> {
	match name.strip_prefix(':') {
		Some(unique) => {
			if name.len() > MAX_NAME_LEN {
				return Err(NameError::TooLong);
			}
			check_dotted(unique, true, true)
		}
		None => check_dotted(name, true, false),
	}
}

/// Validates an interface name.
pub fn validate_interface(name: &str) -> Result<(), NameError> {
	check_dotted(name, false, false)
}

/// Validates a member (method or signal) name.
pub fn validate_member(name: &str) -> Result<(), NameError> {
	if name.is_empty() {
		return Err(NameError::Empty);
	}
	if name.len() > MAX_NAME_LEN {
		return Err(NameError::TooLong);
	}
	check_element(name, false, false)
}

/// Validates an object path.
pub fn validate_object_path(path: &str) -> Result<(), NameError> {
	if path.is_empty() {
		return Err(NameError::Empty);
	}
	let Some(rest) = path.strip_prefix('/') else {
		return Err(NameError::NotAbsolute);
	};
	if rest.is_empty() {
		return Ok(());
	}
	if rest.ends_with('/') {
		return Err(NameError::TrailingSlash);
	}
	rest.split('/')
		.try_for_each(|element| check_element(element, false, true))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bus_names() {
		assert_eq!(validate_bus_name("org.freedesktop.DBus"), Ok(()));
		assert_eq!(validate_bus_name("org.example.my-app"), Ok(()));
		assert_eq!(validate_bus_name(":1.42"), Ok(()));
		assert_eq!(validate_bus_name(""), Err(NameError::Empty));
		assert_eq!(validate_bus_name("org"), Err(NameError::TooFewElements));
		assert_eq!(validate_bus_name("org..example"), Err(NameError::EmptyElement));
		assert_eq!(validate_bus_name("org.1example"), Err(NameError::LeadingDigit));
		assert_eq!(validate_bus_name("org.exa mple"), Err(NameError::InvalidChar(' ')));
	}

	#[test]
	fn interfaces_reject_dashes() {
		assert_eq!(validate_interface("org.freedesktop.Notifications"), Ok(()));
		assert_eq!(validate_interface("org.my-app.Api"), Err(NameError::InvalidChar('-')));
	}

	#[test]
	fn members() {
		assert_eq!(validate_member("GetServerInformation"), Ok(()));
		assert_eq!(validate_member("Get.Info"), Err(NameError::InvalidChar('.')));
		assert_eq!(validate_member("9Lives"), Err(NameError::LeadingDigit));
		assert_eq!(validate_member(&"a".repeat(256)), Err(NameError::TooLong));
	}

	#[test]
	fn object_paths() {
		assert_eq!(validate_object_path("/"), Ok(()));
		assert_eq!(validate_object_path("/org/freedesktop/Notifications"), Ok(()));
		assert_eq!(validate_object_path("/org/_1"), Ok(()));
		assert_eq!(validate_object_path("org/example"), Err(NameError::NotAbsolute));
		assert_eq!(validate_object_path("/org/"), Err(NameError::TrailingSlash));
		assert_eq!(validate_object_path("/org//x"), Err(NameError::EmptyElement));
		assert_eq!(validate_object_path("/org/a-b"), Err(NameError::InvalidChar('-')));
	}
}
