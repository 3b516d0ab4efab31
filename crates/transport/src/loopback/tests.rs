use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;

use super::*;
use crate::BasicType;

fn echo_daemon() -> Arc<LoopbackDaemon> {
	let daemon = LoopbackDaemon::new();
	daemon.serve("org.example.Echo", |call| Ok(call.args.to_vec()));
	daemon
}

fn echo_call(bus: &LoopbackBus) -> LoopbackMessage {
	bus.new_method_call("org.example.Echo", "/org/example/Echo", "org.example.Echo", "Say")
		.expect("valid names")
}

#[test]
fn blocking_call_returns_sealed_reply() {
	let daemon = echo_daemon();
	let bus = daemon.connect().unwrap();
	let mut call = echo_call(&bus);
	call.append(&Value::from("hello")).unwrap();

	let mut reply = bus.call(&mut call, 0).unwrap();
	assert!(call.is_sealed());
	assert_eq!(reply.message_type(), Some(MessageType::MethodReturn));
	assert_eq!(call.message_type(), Some(MessageType::MethodCall));
	assert_eq!(reply.destination(), Some(bus.unique_name()));
	assert_eq!(reply.read(BasicType::Str).unwrap(), Some(Value::from("hello")));
	assert_eq!(reply.read(BasicType::Str).unwrap(), None);
}

#[test]
fn sealed_messages_reject_appends_and_unsealed_reject_reads() {
	let daemon = echo_daemon();
	let bus = daemon.connect().unwrap();
	let mut call = echo_call(&bus);
	assert_eq!(call.read(BasicType::Str), Err(Errno::from_raw_os_error(libc::EPERM)));
	assert_eq!(call.dump(), Err(Errno::from_raw_os_error(libc::EPERM)));

	bus.call(&mut call, 0).unwrap();
	assert_eq!(call.append(&Value::from("late")), Err(Errno::from_raw_os_error(libc::EPERM)));
}

#[test]
fn read_type_mismatch_is_enxio() {
	let daemon = echo_daemon();
	let bus = daemon.connect().unwrap();
	let mut call = echo_call(&bus);
	call.append(&Value::Uint32(5)).unwrap();
	let mut reply = bus.call(&mut call, 0).unwrap();
	assert_eq!(reply.read(BasicType::Str), Err(Errno::from_raw_os_error(libc::ENXIO)));
	assert_eq!(reply.read(BasicType::Uint32).unwrap(), Some(Value::Uint32(5)));
}

#[test]
fn malformed_names_are_einval() {
	let bus = LoopbackDaemon::new().connect().unwrap();
	let einval = Errno::from_raw_os_error(libc::EINVAL);
	assert_eq!(
		bus.new_method_call("", "/a", "org.example.I", "M").unwrap_err(),
		einval
	);
	assert_eq!(
		bus.new_method_call("org.example.D", "a", "org.example.I", "M").unwrap_err(),
		einval
	);
	assert_eq!(
		bus.new_method_call("org.example.D", "/a", "nodots", "M").unwrap_err(),
		einval
	);
	assert_eq!(
		bus.new_method_call("org.example.D", "/a", "org.example.I", "Bad.Member").unwrap_err(),
		einval
	);
}

#[test]
fn unknown_destination_is_service_unknown() {
	let bus = LoopbackDaemon::new().connect().unwrap();
	let mut call = bus
		.new_method_call("org.example.Nobody", "/", "org.example.I", "M")
		.unwrap();
	let failure = bus.call(&mut call, 0).unwrap_err();
	assert_eq!(failure.errno.raw_os_error(), libc::EHOSTUNREACH);
	let frame = failure.frame.expect("error reply");
	assert_eq!(frame.name, SERVICE_UNKNOWN);
	assert_eq!(
		frame.message.as_deref(),
		Some("The name org.example.Nobody was not provided by any .service files")
	);
}

#[test]
fn service_error_reply_carries_errno_and_frame() {
	let daemon = LoopbackDaemon::new();
	daemon.serve("org.example.Strict", |_| {
		Err(ErrorFrame::new(
			"org.freedesktop.DBus.Error.UnknownMethod",
			"No such method",
		))
	});
	let bus = daemon.connect().unwrap();
	let mut call = bus
		.new_method_call("org.example.Strict", "/", "org.example.I", "Missing")
		.unwrap();
	let failure = bus.call(&mut call, 0).unwrap_err();
	assert_eq!(failure.errno.raw_os_error(), libc::EBADR);
	assert_eq!(
		failure.frame,
		Some(ErrorFrame::new(
			"org.freedesktop.DBus.Error.UnknownMethod",
			"No such method"
		))
	);
}

#[test]
fn injected_failure_has_no_frame_and_is_one_shot() {
	let daemon = echo_daemon();
	let bus = daemon.connect().unwrap();
	daemon.fail_next_call(Errno::from_raw_os_error(libc::ECONNRESET));

	let mut first = echo_call(&bus);
	assert_eq!(
		bus.call(&mut first, 0).unwrap_err(),
		CallFailure::bare(Errno::from_raw_os_error(libc::ECONNRESET))
	);
	let mut second = echo_call(&bus);
	assert!(bus.call(&mut second, 0).is_ok());
}

#[test]
fn async_replies_wait_for_process() {
	let daemon = echo_daemon();
	let bus = daemon.connect().unwrap();
	let delivered = Arc::new(AtomicUsize::new(0));

	let mut call = echo_call(&bus);
	call.append(&Value::from("ping")).unwrap();
	let seen = Arc::clone(&delivered);
	bus.call_async(
		&mut call,
		Box::new(move |mut reply: LoopbackMessage| {
			assert_eq!(reply.read(BasicType::Str).unwrap(), Some(Value::from("ping")));
			seen.fetch_add(1, Ordering::SeqCst);
			0
		}),
		0,
	)
	.unwrap();

	assert_eq!(bus.pending(), 1);
	assert_eq!(delivered.load(Ordering::SeqCst), 0);
	assert_eq!(bus.process(), Ok(true));
	assert_eq!(delivered.load(Ordering::SeqCst), 1);
	assert_eq!(bus.process(), Ok(false));
	assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[test]
fn silent_names_reply_only_after_timeout() {
	let daemon = LoopbackDaemon::new();
	daemon.silent("org.example.Sleepy");
	let bus = daemon.connect().unwrap();
	let mut call = bus
		.new_method_call("org.example.Sleepy", "/", "org.example.I", "M")
		.unwrap();
	let never: ReplyCallback<LoopbackMessage> = Box::new(|_| unreachable!("silent peer replied"));
	bus.call_async(&mut call, never, 0).unwrap();
	assert_eq!(bus.unanswered(), 1);
	assert_eq!(bus.process(), Ok(false));

	let mut blocking = bus
		.new_method_call("org.example.Sleepy", "/", "org.example.I", "M")
		.unwrap();
	let failure = bus.call(&mut blocking, 0).unwrap_err();
	assert_eq!(failure.frame.map(|f| f.name).as_deref(), Some(NO_REPLY));
}

#[test]
fn expired_silent_call_is_settled_with_no_reply() {
	let daemon = LoopbackDaemon::new();
	daemon.silent("org.example.Sleepy");
	let bus = daemon.connect().unwrap();
	let mut call = bus
		.new_method_call("org.example.Sleepy", "/", "org.example.I", "M")
		.unwrap();
	let (tx, rx) = std::sync::mpsc::channel();
	bus.call_async(
		&mut call,
		Box::new(move |reply: LoopbackMessage| {
			tx.send(reply).unwrap();
			0
		}),
		1,
	)
	.unwrap();
	std::thread::sleep(std::time::Duration::from_millis(2));

	assert_eq!(bus.process(), Ok(true));
	assert_eq!(bus.unanswered(), 0);
	let reply = rx.try_recv().expect("timeout delivered");
	assert_eq!(reply.message_type(), Some(MessageType::MethodError));
	assert_eq!(reply.reply_serial(), Some(call.serial()));
	assert_eq!(
		reply.error(),
		Some(ErrorFrame::new(NO_REPLY, "Method call timed out"))
	);
	assert_eq!(bus.process(), Ok(false));
}

#[test]
fn negative_callback_status_does_not_stop_dispatch() {
	let daemon = echo_daemon();
	let bus = daemon.connect().unwrap();
	let delivered = Arc::new(AtomicUsize::new(0));
	for status in [-libc::ECANCELED, i32::MIN, 0] {
		let mut call = echo_call(&bus);
		let seen = Arc::clone(&delivered);
		bus.call_async(
			&mut call,
			Box::new(move |_: LoopbackMessage| {
				seen.fetch_add(1, Ordering::SeqCst);
				status
			}),
			0,
		)
		.unwrap();
	}

	assert_eq!(bus.process(), Ok(true));
	assert_eq!(bus.process(), Ok(true));
	assert_eq!(bus.process(), Ok(true));
	assert_eq!(bus.process(), Ok(false));
	assert_eq!(delivered.load(Ordering::SeqCst), 3);
}

#[test]
fn async_registration_failure_drops_callback() {
	let daemon = echo_daemon();
	let bus = daemon.connect().unwrap();
	daemon.fail_next_call(Errno::from_raw_os_error(libc::ENOBUFS));
	let mut call = echo_call(&bus);
	let never: ReplyCallback<LoopbackMessage> = Box::new(|_| unreachable!("rejected call replied"));
	let result = bus.call_async(&mut call, never, 0);
	assert_eq!(result, Err(Errno::from_raw_os_error(libc::ENOBUFS)));
	assert_eq!(bus.pending(), 0);
}

#[test]
fn offline_daemon_refuses_connections() {
	let daemon = LoopbackDaemon::new();
	daemon.set_online(false);
	assert_eq!(
		daemon.connect().unwrap_err(),
		Errno::from_raw_os_error(libc::ECONNREFUSED)
	);
	daemon.set_online(true);
	assert!(daemon.connect().is_ok());
}

#[test]
fn dump_layout_and_cursor() {
	let daemon = echo_daemon();
	let bus = daemon.connect().unwrap();
	let mut call = echo_call(&bus);
	call.append(&Value::from("hello")).unwrap();
	call.append(&Value::Uint32(3)).unwrap();
	let mut reply = bus.call(&mut call, 0).unwrap();

	let expected = format!(
		"‣ Type=method_return  Endian=l  Flags=0  Version=1  Cookie={}  ReplyCookie={}\n  Destination={}\n  MESSAGE \"su\" {{\n          STRING \"hello\";\n          UINT32 3;\n  }};\n",
		reply.serial(),
		call.serial(),
		bus.unique_name(),
	);
	assert_eq!(reply.dump().unwrap(), expected);
	assert_eq!(reply.read(BasicType::Str).unwrap(), None);
	reply.rewind(true).unwrap();
	assert_eq!(reply.read(BasicType::Str).unwrap(), Some(Value::from("hello")));
}

#[test]
fn error_dump_includes_error_name() {
	let bus = LoopbackDaemon::new().connect().unwrap();
	let mut call = bus
		.new_method_call("org.example.Nobody", "/", "org.example.I", "M")
		.unwrap();
	bus.call_async(
		&mut call,
		Box::new(|mut reply: LoopbackMessage| {
			let text = reply.dump().unwrap();
			assert!(text.contains("Type=method_error"));
			assert!(text.contains("ErrorName=org.freedesktop.DBus.Error.ServiceUnknown"));
			0
		}),
		0,
	)
	.unwrap();
	assert_eq!(bus.process(), Ok(true));
}
