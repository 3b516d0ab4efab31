use std::fmt::Write as _;

use rustix::io::Errno;

use crate::{BasicType, ErrorFrame, MessageType, RawMessage, Value};

/// A message owned by the loopback backend.
///
/// Follows sd-bus's sealing rules: fields can be appended only before the message is sent,
/// and the body can be read, dumped or rewound only after.
#[derive(Debug, Clone)]
pub struct LoopbackMessage {
	kind: MessageType,
	serial: u32,
	reply_serial: Option<u32>,
	destination: Option<String>,
	path: Option<String>,
	interface: Option<String>,
	member: Option<String>,
	error: Option<ErrorFrame>,
	body: Vec<Value>,
	cursor: usize,
	sealed: bool,
}

impl LoopbackMessage {
	pub(super) fn method_call(destination: &str, path: &str, interface: &str, member: &str) -> Self {
		Self {
			kind: MessageType::MethodCall,
			serial: 0,
			reply_serial: None,
			destination: Some(destination.to_owned()),
			path: Some(path.to_owned()),
			interface: Some(interface.to_owned()),
			member: Some(member.to_owned()),
			error: None,
			body: Vec::new(),
			cursor: 0,
			sealed: false,
		}
	}

	pub(super) fn method_return(call: &Self, destination: &str, body: Vec<Value>) -> Self {
		Self {
			kind: MessageType::MethodReturn,
			serial: 0,
			reply_serial: Some(call.serial),
			destination: Some(destination.to_owned()),
			path: None,
			interface: None,
			member: None,
			error: None,
			body,
			cursor: 0,
			sealed: false,
		}
	}

	pub(super) fn method_error(call: &Self, destination: &str, frame: ErrorFrame) -> Self {
		let body = frame.message.iter().cloned().map(Value::Str).collect();
		Self {
			kind: MessageType::MethodError,
			serial: 0,
			reply_serial: Some(call.serial),
			destination: Some(destination.to_owned()),
			path: None,
			interface: None,
			member: None,
			error: Some(frame),
			body,
			cursor: 0,
			sealed: false,
		}
	}

	pub(super) fn seal(&mut self, serial: u32) {
		if !self.sealed {
			self.serial = serial;
			self.sealed = true;
		}
	}

	/// Whether the message has been sent (or received) and is now read-only.
	pub fn is_sealed(&self) -> bool {
		self.sealed
	}

	/// Serial ("cookie") assigned when the message was sealed.
	pub fn serial(&self) -> u32 {
		self.serial
	}

	/// Serial of the call this message answers.
	pub fn reply_serial(&self) -> Option<u32> {
		self.reply_serial
	}

	/// All body fields, independent of the read cursor.
	pub fn body(&self) -> &[Value] {
		&self.body
	}

	fn render(&self) -> String {
		let mut out = String::new();
		let _ = write!(
			out,
			"‣ Type={}  Endian=l  Flags=0  Version=1  Cookie={}",
			self.kind.as_str(),
			self.serial
		);
		if let Some(reply_serial) = self.reply_serial {
			let _ = write!(out, "  ReplyCookie={reply_serial}");
		}
		out.push('\n');

		let headers: Vec<String> = [
			("Destination", &self.destination),
			("Path", &self.path),
			("Interface", &self.interface),
			("Member", &self.member),
		]
		.into_iter()
		.filter_map(|(label, value)| value.as_ref().map(|v| format!("{label}={v}")))
		.collect();
		if !headers.is_empty() {
			let _ = writeln!(out, "  {}", headers.join("  "));
		}
		if let Some(frame) = &self.error {
			let _ = write!(out, "  ErrorName={}", frame.name);
			if let Some(message) = &frame.message {
				let _ = write!(out, "  ErrorMessage=\"{message}\"");
			}
			out.push('\n');
		}

		let _ = writeln!(out, "  MESSAGE \"{}\" {{", self.signature());
		for value in &self.body {
			let _ = writeln!(out, "          {value};");
		}
		out.push_str("  };\n");
		out
	}
}

impl RawMessage for LoopbackMessage {
	fn message_type(&self) -> Option<MessageType> {
		Some(self.kind)
	}

	fn append(&mut self, value: &Value) -> Result<(), Errno> {
		if self.sealed {
			return Err(Errno::from_raw_os_error(libc::EPERM));
		}
		if value.as_str().is_some_and(|s| s.contains('\0')) {
			return Err(Errno::from_raw_os_error(libc::EINVAL));
		}
		self.body.push(value.clone());
		Ok(())
	}

	fn read(&mut self, ty: BasicType) -> Result<Option<Value>, Errno> {
		if !self.sealed {
			return Err(Errno::from_raw_os_error(libc::EPERM));
		}
		let Some(value) = self.body.get(self.cursor) else {
			return Ok(None);
		};
		if value.basic_type() != ty {
			return Err(Errno::from_raw_os_error(libc::ENXIO));
		}
		self.cursor += 1;
		Ok(Some(value.clone()))
	}

	fn dump(&mut self) -> Result<String, Errno> {
		if !self.sealed {
			return Err(Errno::from_raw_os_error(libc::EPERM));
		}
		let text = self.render();
		self.cursor = self.body.len();
		Ok(text)
	}

	fn rewind(&mut self, _complete: bool) -> Result<(), Errno> {
		if !self.sealed {
			return Err(Errno::from_raw_os_error(libc::EPERM));
		}
		self.cursor = 0;
		Ok(())
	}

	fn error(&self) -> Option<ErrorFrame> {
		match self.kind {
			MessageType::MethodError => self.error.clone(),
			_ => None,
		}
	}

	fn destination(&self) -> Option<&str> {
		self.destination.as_deref()
	}

	fn path(&self) -> Option<&str> {
		self.path.as_deref()
	}

	fn interface(&self) -> Option<&str> {
		self.interface.as_deref()
	}

	fn member(&self) -> Option<&str> {
		self.member.as_deref()
	}

	fn signature(&self) -> String {
		self.body
			.iter()
			.map(|v| v.basic_type().code() as char)
			.collect()
	}
}
