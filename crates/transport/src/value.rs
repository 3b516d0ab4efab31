//! Basic-type message fields.

use std::fmt;

/// A D-Bus basic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicType {
	/// `y`
	Byte,
	/// `b`
	Bool,
	/// `n`
	Int16,
	/// `q`
	Uint16,
	/// `i`
	Int32,
	/// `u`
	Uint32,
	/// `x`
	Int64,
	/// `t`
	Uint64,
	/// `d`
	Double,
	/// `s`
	Str,
	/// `o`
	ObjectPath,
	/// `g`
	Signature,
}

impl BasicType {
	/// Signature code of this type.
	pub const fn code(self) -> u8 {
		match self {
			Self::Byte => b'y',
			Self::Bool => b'b',
			Self::Int16 => b'n',
			Self::Uint16 => b'q',
			Self::Int32 => b'i',
			Self::Uint32 => b'u',
			Self::Int64 => b'x',
			Self::Uint64 => b't',
			Self::Double => b'd',
			Self::Str => b's',
			Self::ObjectPath => b'o',
			Self::Signature => b'g',
		}
	}

	/// Parses a signature code.
	pub const fn from_code(code: u8) -> Option<Self> {
		Some(match code {
			b'y' => Self::Byte,
			b'b' => Self::Bool,
			b'n' => Self::Int16,
			b'q' => Self::Uint16,
			b'i' => Self::Int32,
			b'u' => Self::Uint32,
			b'x' => Self::Int64,
			b't' => Self::Uint64,
			b'd' => Self::Double,
			b's' => Self::Str,
			b'o' => Self::ObjectPath,
			b'g' => Self::Signature,
			_ => return None,
		})
	}

	/// Name used in message dumps.
	pub const fn dump_name(self) -> &'static str {
		match self {
			Self::Byte => "BYTE",
			Self::Bool => "BOOLEAN",
			Self::Int16 => "INT16",
			Self::Uint16 => "UINT16",
			Self::Int32 => "INT32",
			Self::Uint32 => "UINT32",
			Self::Int64 => "INT64",
			Self::Uint64 => "UINT64",
			Self::Double => "DOUBLE",
			Self::Str => "STRING",
			Self::ObjectPath => "OBJECT_PATH",
			Self::Signature => "SIGNATURE",
		}
	}
}

impl fmt::Display for BasicType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.code() as char)
	}
}

/// A basic-type field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	/// `y`
	Byte(u8),
	/// `b`
	Bool(bool),
	/// `n`
	Int16(i16),
	/// `q`
	Uint16(u16),
	/// `i`
	Int32(i32),
	/// `u`
	Uint32(u32),
	/// `x`
	Int64(i64),
	/// `t`
	Uint64(u64),
	/// `d`
	Double(f64),
	/// `s`
	Str(String),
	/// `o`
	ObjectPath(String),
	/// `g`
	Signature(String),
}

impl Value {
	/// Returns the type of this value.
	pub const fn basic_type(&self) -> BasicType {
		match self {
			Self::Byte(_) => BasicType::Byte,
			Self::Bool(_) => BasicType::Bool,
			Self::Int16(_) => BasicType::Int16,
			Self::Uint16(_) => BasicType::Uint16,
			Self::Int32(_) => BasicType::Int32,
			Self::Uint32(_) => BasicType::Uint32,
			Self::Int64(_) => BasicType::Int64,
			Self::Uint64(_) => BasicType::Uint64,
			Self::Double(_) => BasicType::Double,
			Self::Str(_) => BasicType::Str,
			Self::ObjectPath(_) => BasicType::ObjectPath,
			Self::Signature(_) => BasicType::Signature,
		}
	}

	/// Borrows the text of a string-like value.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) | Self::ObjectPath(s) | Self::Signature(s) => Some(s),
			_ => None,
		}
	}

	/// Returns the value of a `u` field.
	pub const fn as_u32(&self) -> Option<u32> {
		match self {
			Self::Uint32(v) => Some(*v),
			_ => None,
		}
	}
}

/// Formats the value the way message dumps print it.
impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = self.basic_type().dump_name();
		match self {
			Self::Byte(v) => write!(f, "{name} {v}"),
			Self::Bool(v) => write!(f, "{name} {v}"),
			Self::Int16(v) => write!(f, "{name} {v}"),
			Self::Uint16(v) => write!(f, "{name} {v}"),
			Self::Int32(v) => write!(f, "{name} {v}"),
			Self::Uint32(v) => write!(f, "{name} {v}"),
			Self::Int64(v) => write!(f, "{name} {v}"),
			Self::Uint64(v) => write!(f, "{name} {v}"),
			Self::Double(v) => write!(f, "{name} {v}"),
			Self::Str(v) | Self::ObjectPath(v) | Self::Signature(v) => write!(f, "{name} \"{v}\""),
		}
	}
}

macro_rules! impl_from_value {
	($($ty:ty => $variant:ident),* $(,)?) => {
		$(
			impl From<$ty> for Value {
				fn from(v: $ty) -> Self {
					Self::$variant(v)
				}
			}
		)*
	};
}

impl_from_value! {
	u8 => Byte,
	bool => Bool,
	i16 => Int16,
	u16 => Uint16,
	i32 => Int32,
	u32 => Uint32,
	i64 => Int64,
	u64 => Uint64,
	f64 => Double,
	String => Str,
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Self::Str(v.to_owned())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn codes_round_trip_through_from_code() {
		for code in b"ybnqiuxtdsog" {
			let ty = BasicType::from_code(*code).expect("basic type code");
			assert_eq!(ty.code(), *code);
		}
		assert_eq!(BasicType::from_code(b'a'), None);
		assert_eq!(BasicType::from_code(b'v'), None);
	}

	#[test]
	fn dump_format() {
		assert_eq!(Value::from("hello").to_string(), "STRING \"hello\"");
		assert_eq!(Value::from(7u32).to_string(), "UINT32 7");
		assert_eq!(Value::Bool(true).to_string(), "BOOLEAN true");
		assert_eq!(Value::ObjectPath("/a".into()).to_string(), "OBJECT_PATH \"/a\"");
	}

	#[test]
	fn typed_accessors() {
		assert_eq!(Value::from(7u32).as_u32(), Some(7));
		assert_eq!(Value::Int32(7).as_u32(), None);
		assert_eq!(Value::Signature("su".into()).as_str(), Some("su"));
		assert_eq!(Value::Uint64(1).as_str(), None);
	}
}
