use proptest::prelude::*;

use super::*;

#[test]
fn standard_registry_maps_every_well_known_name() {
	let registry = ErrorRegistry::standard();
	assert_eq!(registry.len(), ErrorKind::WELL_KNOWN.len());
	for &kind in ErrorKind::WELL_KNOWN {
		let name = kind.well_known_name().unwrap();
		assert_eq!(registry.lookup(name), kind, "{name}");
	}
}

#[test]
fn unregistered_and_empty_names_are_generic() {
	let registry = ErrorRegistry::standard();
	assert_eq!(registry.lookup(""), ErrorKind::Generic);
	assert_eq!(registry.lookup("org.freedesktop.DBus.Error.unknownmethod"), ErrorKind::Generic);
	assert_eq!(ErrorRegistry::default().lookup("org.freedesktop.DBus.Error.Failed"), ErrorKind::Generic);
}

#[test]
fn custom_names_and_overrides() {
	let registry = ErrorRegistry::builder()
		.with_standard()
		.register("com.example.Error.Busy", ErrorKind::LimitsExceeded)
		.register("org.freedesktop.DBus.Error.Failed", ErrorKind::Timeout)
		.register("", ErrorKind::Failed)
		.build();
	assert_eq!(registry.lookup("com.example.Error.Busy"), ErrorKind::LimitsExceeded);
	assert_eq!(registry.lookup("org.freedesktop.DBus.Error.Failed"), ErrorKind::Timeout);
	assert_eq!(registry.lookup(""), ErrorKind::Generic);
	assert_eq!(registry.len(), ErrorKind::WELL_KNOWN.len() + 1);

	let mut busy: Vec<_> = registry
		.iter()
		.filter(|&(_, kind)| kind == ErrorKind::LimitsExceeded)
		.map(|(name, _)| name)
		.collect();
	busy.sort_unstable();
	assert_eq!(busy, ["com.example.Error.Busy", "org.freedesktop.DBus.Error.LimitsExceeded"]);
	assert_eq!(registry.iter().count(), registry.len());
	assert!(registry.iter().all(|(name, kind)| registry.lookup(name) == kind));
}

#[test]
fn error_for_keeps_name_and_text_verbatim() {
	let registry = ErrorRegistry::standard();
	let err = registry.error_for(ErrorFrame::new("org.freedesktop.DBus.Error.AccessDenied", "Rejected send"));
	assert_eq!(err.kind(), ErrorKind::AccessDenied);
	assert_eq!(err.name(), "org.freedesktop.DBus.Error.AccessDenied");
	assert_eq!(err.message(), Some("Rejected send"));

	let bare = registry.error_for(ErrorFrame::bare("com.example.Unmapped"));
	assert_eq!(bare.kind(), ErrorKind::Generic);
	assert_eq!(bare.message(), None);
}

proptest! {
	#[test]
	fn lookup_is_total(name in ".*") {
		let registry = ErrorRegistry::standard();
		let kind = registry.lookup(&name);
		let registered = ErrorKind::WELL_KNOWN
			.iter()
			.find(|k| k.well_known_name() == Some(name.as_str()));
		match registered {
			Some(&expected) => prop_assert_eq!(kind, expected),
			None => prop_assert_eq!(kind, ErrorKind::Generic),
		}
	}

	#[test]
	fn registered_names_resolve_to_their_kind(
		suffix in "[A-Za-z][A-Za-z0-9]{0,16}",
		index in 0..ErrorKind::WELL_KNOWN.len(),
	) {
		let name = format!("com.example.Error.{suffix}");
		let kind = ErrorKind::WELL_KNOWN[index];
		let registry = ErrorRegistry::builder().register(name.clone(), kind).build();
		prop_assert_eq!(registry.lookup(&name), kind);
		prop_assert_eq!(registry.lookup(&format!("{name}.Other")), ErrorKind::Generic);
	}
}
