//! `sd-bus` backend.
//!
//! [`SdBus`] and [`SdBusMessage`] each hold one reference to the native object and drop it
//! exactly once. Async reply callbacks are registered through a floating slot whose destroy
//! callback frees the boxed Rust closure, so the closure is released whether or not the reply
//! ever arrives.

#![allow(non_camel_case_types)]

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use rustix::io::Errno;
use tracing::{debug, error, warn};

use crate::{BasicType, BusKind, CallFailure, ErrorFrame, MessageType, RawBus, RawMessage, ReplyCallback, Value};

#[repr(C)]
struct sd_bus {
	_private: [u8; 0],
}

#[repr(C)]
struct sd_bus_message {
	_private: [u8; 0],
}

#[repr(C)]
struct sd_bus_slot {
	_private: [u8; 0],
}

#[repr(C)]
struct sd_bus_error {
	name: *const c_char,
	message: *const c_char,
	_need_free: c_int,
}

type sd_bus_message_handler_t =
	Option<unsafe extern "C" fn(m: *mut sd_bus_message, userdata: *mut c_void, ret_error: *mut sd_bus_error) -> c_int>;
type sd_bus_destroy_t = Option<unsafe extern "C" fn(userdata: *mut c_void)>;

const SD_BUS_MESSAGE_DUMP_WITH_HEADER: u64 = 1 << 0;

#[link(name = "systemd")]
unsafe extern "C" {
	fn sd_bus_default(ret: *mut *mut sd_bus) -> c_int;
	fn sd_bus_default_user(ret: *mut *mut sd_bus) -> c_int;
	fn sd_bus_default_system(ret: *mut *mut sd_bus) -> c_int;
	fn sd_bus_unref(bus: *mut sd_bus) -> *mut sd_bus;
	fn sd_bus_process(bus: *mut sd_bus, r: *mut *mut sd_bus_message) -> c_int;

	fn sd_bus_message_new_method_call(
		bus: *mut sd_bus,
		m: *mut *mut sd_bus_message,
		destination: *const c_char,
		path: *const c_char,
		interface: *const c_char,
		member: *const c_char,
	) -> c_int;
	fn sd_bus_message_ref(m: *mut sd_bus_message) -> *mut sd_bus_message;
	fn sd_bus_message_unref(m: *mut sd_bus_message) -> *mut sd_bus_message;
	fn sd_bus_message_get_type(m: *mut sd_bus_message, ty: *mut u8) -> c_int;
	fn sd_bus_message_append_basic(m: *mut sd_bus_message, ty: c_char, p: *const c_void) -> c_int;
	fn sd_bus_message_read_basic(m: *mut sd_bus_message, ty: c_char, p: *mut c_void) -> c_int;
	fn sd_bus_message_dump(m: *mut sd_bus_message, f: *mut libc::FILE, flags: u64) -> c_int;
	fn sd_bus_message_rewind(m: *mut sd_bus_message, complete: c_int) -> c_int;
	fn sd_bus_message_is_method_error(m: *mut sd_bus_message, name: *const c_char) -> c_int;
	fn sd_bus_message_get_error(m: *mut sd_bus_message) -> *const sd_bus_error;
	fn sd_bus_message_get_destination(m: *mut sd_bus_message) -> *const c_char;
	fn sd_bus_message_get_path(m: *mut sd_bus_message) -> *const c_char;
	fn sd_bus_message_get_interface(m: *mut sd_bus_message) -> *const c_char;
	fn sd_bus_message_get_member(m: *mut sd_bus_message) -> *const c_char;
	fn sd_bus_message_get_signature(m: *mut sd_bus_message, complete: c_int) -> *const c_char;

	fn sd_bus_call(
		bus: *mut sd_bus,
		m: *mut sd_bus_message,
		usec: u64,
		ret_error: *mut sd_bus_error,
		reply: *mut *mut sd_bus_message,
	) -> c_int;
	fn sd_bus_call_async(
		bus: *mut sd_bus,
		slot: *mut *mut sd_bus_slot,
		m: *mut sd_bus_message,
		callback: sd_bus_message_handler_t,
		userdata: *mut c_void,
		usec: u64,
	) -> c_int;
	fn sd_bus_slot_set_destroy_callback(slot: *mut sd_bus_slot, callback: sd_bus_destroy_t) -> c_int;
	fn sd_bus_slot_set_floating(slot: *mut sd_bus_slot, b: c_int) -> c_int;
	fn sd_bus_slot_unref(slot: *mut sd_bus_slot) -> *mut sd_bus_slot;

	fn sd_bus_error_free(e: *mut sd_bus_error);
}

fn check(rc: c_int) -> Result<c_int, Errno> {
	if rc < 0 {
		Err(Errno::from_raw_os_error(-rc))
	} else {
		Ok(rc)
	}
}

fn einval() -> Errno {
	Errno::from_raw_os_error(libc::EINVAL)
}

/// Borrows a C string owned by sd-bus for as long as `_owner` lives.
///
/// # Safety
///
/// `p` must be null or point to a NUL-terminated string that outlives `_owner`.
unsafe fn borrowed_str<'a, T: ?Sized>(p: *const c_char, _owner: &'a T) -> Option<&'a str> {
	if p.is_null() {
		return None;
	}
	unsafe { CStr::from_ptr(p) }.to_str().ok()
}

/// Owns an `sd_bus_error` and frees it on drop.
struct BusErrorGuard(sd_bus_error);

impl BusErrorGuard {
	const fn new() -> Self {
		Self(sd_bus_error {
			name: ptr::null(),
			message: ptr::null(),
			_need_free: 0,
		})
	}

	fn frame(&self) -> Option<ErrorFrame> {
		// SAFETY: both pointers are null or NUL-terminated strings owned by the error.
		unsafe { frame_from_raw(&self.0) }
	}
}

impl Drop for BusErrorGuard {
	fn drop(&mut self) {
		// SAFETY: the error was initialized to SD_BUS_ERROR_NULL and only filled by sd-bus.
		unsafe { sd_bus_error_free(&mut self.0) };
	}
}

/// # Safety
///
/// `error.name` and `error.message` must be null or valid NUL-terminated strings.
unsafe fn frame_from_raw(error: &sd_bus_error) -> Option<ErrorFrame> {
	if error.name.is_null() {
		return None;
	}
	let name = unsafe { CStr::from_ptr(error.name) }.to_string_lossy().into_owned();
	let message = (!error.message.is_null())
		.then(|| unsafe { CStr::from_ptr(error.message) }.to_string_lossy().into_owned());
	Some(ErrorFrame { name, message })
}

/// An owned reference to an `sd_bus_message`.
#[derive(Debug)]
pub struct SdBusMessage {
	raw: ptr::NonNull<sd_bus_message>,
}

// SAFETY: the message is only accessed through `&mut self` or `&self` on one thread at a
// time; sd-bus keeps no thread affinity for message objects.
unsafe impl Send for SdBusMessage {}

impl SdBusMessage {
	/// Takes ownership of a reference returned by sd-bus.
	fn from_owned(raw: *mut sd_bus_message) -> Option<Self> {
		ptr::NonNull::new(raw).map(|raw| Self { raw })
	}

	/// Acquires a new reference to a message borrowed from sd-bus.
	///
	/// # Safety
	///
	/// `raw` must be a valid message pointer for the duration of the call.
	unsafe fn from_borrowed(raw: *mut sd_bus_message) -> Option<Self> {
		let raw = unsafe { sd_bus_message_ref(raw) };
		Self::from_owned(raw)
	}

	fn as_ptr(&self) -> *mut sd_bus_message {
		self.raw.as_ptr()
	}
}

impl Drop for SdBusMessage {
	fn drop(&mut self) {
		// SAFETY: we own exactly one reference.
		unsafe { sd_bus_message_unref(self.as_ptr()) };
	}
}

impl RawMessage for SdBusMessage {
	fn message_type(&self) -> Option<MessageType> {
		let mut code = 0u8;
		// SAFETY: valid message, out-pointer to a local.
		let rc = unsafe { sd_bus_message_get_type(self.as_ptr(), &mut code) };
		if rc < 0 {
			warn!(rc, "sd_bus.message_type.failed");
			return None;
		}
		let kind = MessageType::from_code(code);
		if kind.is_none() {
			warn!(code, "sd_bus.message_type.unknown");
		}
		kind
	}

	fn append(&mut self, value: &Value) -> Result<(), Errno> {
		let ty = value.basic_type().code() as c_char;
		let m = self.as_ptr();
		// SAFETY: each arm passes a pointer to a value of the C type sd-bus expects for `ty`,
		// living until the call returns.
		let rc = unsafe {
			match value {
				Value::Byte(v) => sd_bus_message_append_basic(m, ty, ptr::from_ref(v).cast()),
				Value::Bool(v) => {
					let v = c_int::from(*v);
					sd_bus_message_append_basic(m, ty, ptr::from_ref(&v).cast())
				}
				Value::Int16(v) => sd_bus_message_append_basic(m, ty, ptr::from_ref(v).cast()),
				Value::Uint16(v) => sd_bus_message_append_basic(m, ty, ptr::from_ref(v).cast()),
				Value::Int32(v) => sd_bus_message_append_basic(m, ty, ptr::from_ref(v).cast()),
				Value::Uint32(v) => sd_bus_message_append_basic(m, ty, ptr::from_ref(v).cast()),
				Value::Int64(v) => sd_bus_message_append_basic(m, ty, ptr::from_ref(v).cast()),
				Value::Uint64(v) => sd_bus_message_append_basic(m, ty, ptr::from_ref(v).cast()),
				Value::Double(v) => sd_bus_message_append_basic(m, ty, ptr::from_ref(v).cast()),
				Value::Str(s) | Value::ObjectPath(s) | Value::Signature(s) => {
					let s = CString::new(s.as_str()).map_err(|_| einval())?;
					sd_bus_message_append_basic(m, ty, s.as_ptr().cast())
				}
			}
		};
		check(rc).map(drop)
	}

	fn read(&mut self, ty: BasicType) -> Result<Option<Value>, Errno> {
		let m = self.as_ptr();
		let code = ty.code() as c_char;

		macro_rules! read_scalar {
			($init:expr, $wrap:expr) => {{
				let mut out = $init;
				// SAFETY: `out` has the C type sd-bus writes for `code`.
				let rc = unsafe { sd_bus_message_read_basic(m, code, ptr::from_mut(&mut out).cast()) };
				if check(rc)? == 0 { None } else { Some($wrap(out)) }
			}};
		}

		let value = match ty {
			BasicType::Byte => read_scalar!(0u8, Value::Byte),
			BasicType::Bool => read_scalar!(0 as c_int, |v: c_int| Value::Bool(v != 0)),
			BasicType::Int16 => read_scalar!(0i16, Value::Int16),
			BasicType::Uint16 => read_scalar!(0u16, Value::Uint16),
			BasicType::Int32 => read_scalar!(0i32, Value::Int32),
			BasicType::Uint32 => read_scalar!(0u32, Value::Uint32),
			BasicType::Int64 => read_scalar!(0i64, Value::Int64),
			BasicType::Uint64 => read_scalar!(0u64, Value::Uint64),
			BasicType::Double => read_scalar!(0f64, Value::Double),
			BasicType::Str | BasicType::ObjectPath | BasicType::Signature => {
				let mut out: *const c_char = ptr::null();
				// SAFETY: string types are returned as a pointer into the message.
				let rc = unsafe { sd_bus_message_read_basic(m, code, ptr::from_mut(&mut out).cast()) };
				if check(rc)? == 0 || out.is_null() {
					None
				} else {
					// SAFETY: sd-bus returned a NUL-terminated string owned by the message.
					let text = unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned();
					Some(match ty {
						BasicType::ObjectPath => Value::ObjectPath(text),
						BasicType::Signature => Value::Signature(text),
						_ => Value::Str(text),
					})
				}
			}
		};
		Ok(value)
	}

	fn dump(&mut self) -> Result<String, Errno> {
		let mut buf: *mut c_char = ptr::null_mut();
		let mut len: libc::size_t = 0;
		// SAFETY: out-pointers to locals; the stream is closed below before `buf` is read.
		let stream = unsafe { libc::open_memstream(&mut buf, &mut len) };
		if stream.is_null() {
			return Err(Errno::from_raw_os_error(
				std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::ENOMEM),
			));
		}
		// SAFETY: valid message and stream.
		let rc = unsafe { sd_bus_message_dump(self.as_ptr(), stream, SD_BUS_MESSAGE_DUMP_WITH_HEADER) };
		// SAFETY: closing flushes into `buf`/`len`; the stream is not used afterwards.
		unsafe { libc::fclose(stream) };

		let text = if buf.is_null() {
			String::new()
		} else {
			// SAFETY: open_memstream guarantees `len` readable bytes at `buf`; we free it once.
			let bytes = unsafe { std::slice::from_raw_parts(buf.cast::<u8>(), len) };
			let text = String::from_utf8_lossy(bytes).into_owned();
			unsafe { libc::free(buf.cast()) };
			text
		};
		check(rc)?;
		Ok(text)
	}

	fn rewind(&mut self, complete: bool) -> Result<(), Errno> {
		// SAFETY: valid message.
		let rc = unsafe { sd_bus_message_rewind(self.as_ptr(), c_int::from(complete)) };
		check(rc).map(drop)
	}

	fn error(&self) -> Option<ErrorFrame> {
		// SAFETY: valid message; a null name matches any error.
		if unsafe { sd_bus_message_is_method_error(self.as_ptr(), ptr::null()) } <= 0 {
			return None;
		}
		// SAFETY: the returned error is owned by the message and valid while it lives.
		let error = unsafe { sd_bus_message_get_error(self.as_ptr()) };
		if error.is_null() {
			return None;
		}
		unsafe { frame_from_raw(&*error) }
	}

	fn destination(&self) -> Option<&str> {
		// SAFETY: header strings live as long as the message.
		unsafe { borrowed_str(sd_bus_message_get_destination(self.as_ptr()), self) }
	}

	fn path(&self) -> Option<&str> {
		// SAFETY: as above.
		unsafe { borrowed_str(sd_bus_message_get_path(self.as_ptr()), self) }
	}

	fn interface(&self) -> Option<&str> {
		// SAFETY: as above.
		unsafe { borrowed_str(sd_bus_message_get_interface(self.as_ptr()), self) }
	}

	fn member(&self) -> Option<&str> {
		// SAFETY: as above.
		unsafe { borrowed_str(sd_bus_message_get_member(self.as_ptr()), self) }
	}

	fn signature(&self) -> String {
		// SAFETY: as above.
		unsafe { borrowed_str(sd_bus_message_get_signature(self.as_ptr(), 1), self) }
			.unwrap_or_default()
			.to_owned()
	}
}

/// An owned reference to an `sd_bus` connection.
#[derive(Debug)]
pub struct SdBus {
	raw: ptr::NonNull<sd_bus>,
}

// SAFETY: sd-bus connections may move between threads as long as they are not used
// concurrently; `SdBus` is deliberately not `Sync`.
unsafe impl Send for SdBus {}

type CallbackState = Option<ReplyCallback<SdBusMessage>>;

unsafe extern "C" fn reply_trampoline(
	m: *mut sd_bus_message,
	userdata: *mut c_void,
	_ret_error: *mut sd_bus_error,
) -> c_int {
	// SAFETY: userdata is the `CallbackState` box installed by `call_async`; it is freed only
	// by `destroy_callback_state`, which sd-bus runs after this callback returns.
	let state = unsafe { &mut *userdata.cast::<CallbackState>() };
	let Some(callback) = state.take() else {
		return -libc::ESTALE;
	};
	// SAFETY: sd-bus passes a valid message for the duration of the callback.
	let Some(reply) = (unsafe { SdBusMessage::from_borrowed(m) }) else {
		return -libc::EINVAL;
	};
	match catch_unwind(AssertUnwindSafe(move || callback(reply))) {
		Ok(status) => status,
		Err(_) => {
			error!("sd_bus.reply_callback.panicked");
			-libc::EIO
		}
	}
}

unsafe extern "C" fn destroy_callback_state(userdata: *mut c_void) {
	// SAFETY: installed by `call_async` via `Box::into_raw`; sd-bus calls this exactly once.
	drop(unsafe { Box::from_raw(userdata.cast::<CallbackState>()) });
}

impl SdBus {
	fn as_ptr(&self) -> *mut sd_bus {
		self.raw.as_ptr()
	}
}

impl Drop for SdBus {
	fn drop(&mut self) {
		// SAFETY: we own exactly one reference.
		unsafe { sd_bus_unref(self.as_ptr()) };
	}
}

impl RawBus for SdBus {
	type Message = SdBusMessage;

	fn open(kind: BusKind) -> Result<Self, Errno> {
		let mut raw = ptr::null_mut();
		// SAFETY: out-pointer to a local.
		let rc = unsafe {
			match kind {
				BusKind::Default => sd_bus_default(&mut raw),
				BusKind::Session => sd_bus_default_user(&mut raw),
				BusKind::System => sd_bus_default_system(&mut raw),
			}
		};
		check(rc)?;
		let raw = ptr::NonNull::new(raw).ok_or_else(einval)?;
		debug!(bus = %kind, "sd_bus.open");
		Ok(Self { raw })
	}

	fn new_method_call(
		&self,
		destination: &str,
		path: &str,
		interface: &str,
		member: &str,
	) -> Result<SdBusMessage, Errno> {
		let destination = CString::new(destination).map_err(|_| einval())?;
		let path = CString::new(path).map_err(|_| einval())?;
		let interface = CString::new(interface).map_err(|_| einval())?;
		let member = CString::new(member).map_err(|_| einval())?;
		let mut raw = ptr::null_mut();
		// SAFETY: valid bus, NUL-terminated names, out-pointer to a local.
		let rc = unsafe {
			sd_bus_message_new_method_call(
				self.as_ptr(),
				&mut raw,
				destination.as_ptr(),
				path.as_ptr(),
				interface.as_ptr(),
				member.as_ptr(),
			)
		};
		check(rc)?;
		SdBusMessage::from_owned(raw).ok_or_else(einval)
	}

	fn call(&self, message: &mut SdBusMessage, timeout_usec: u64) -> Result<SdBusMessage, CallFailure> {
		let mut error = BusErrorGuard::new();
		let mut reply = ptr::null_mut();
		// SAFETY: valid bus and message, out-pointers to locals.
		let rc = unsafe { sd_bus_call(self.as_ptr(), message.as_ptr(), timeout_usec, &mut error.0, &mut reply) };
		let reply = SdBusMessage::from_owned(reply);
		if rc < 0 {
			return Err(CallFailure {
				errno: Errno::from_raw_os_error(-rc),
				frame: error.frame(),
			});
		}
		reply.ok_or_else(|| CallFailure::bare(einval()))
	}

	fn call_async(
		&self,
		message: &mut SdBusMessage,
		callback: ReplyCallback<SdBusMessage>,
		timeout_usec: u64,
	) -> Result<(), Errno> {
		let state: *mut CallbackState = Box::into_raw(Box::new(Some(callback)));
		let mut slot = ptr::null_mut();
		// SAFETY: valid bus and message; `state` stays alive until the slot's destroy callback.
		let rc = unsafe {
			sd_bus_call_async(
				self.as_ptr(),
				&mut slot,
				message.as_ptr(),
				Some(reply_trampoline),
				state.cast(),
				timeout_usec,
			)
		};
		if rc < 0 {
			// SAFETY: registration failed, so sd-bus holds no pointer to `state`.
			drop(unsafe { Box::from_raw(state) });
			return Err(Errno::from_raw_os_error(-rc));
		}

		// SAFETY: `slot` is the reference returned above. From here on the destroy callback owns
		// `state`; dropping our slot reference after making it floating leaves the bus as owner.
		unsafe {
			sd_bus_slot_set_destroy_callback(slot, Some(destroy_callback_state));
			let floating = sd_bus_slot_set_floating(slot, 1);
			sd_bus_slot_unref(slot);
			check(floating)?;
		}
		Ok(())
	}

	fn process(&self) -> Result<bool, Errno> {
		// SAFETY: valid bus; we do not ask for the unhandled message.
		let rc = unsafe { sd_bus_process(self.as_ptr(), ptr::null_mut()) };
		check(rc).map(|rc| rc > 0)
	}
}
