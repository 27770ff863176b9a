use mosaic_sdk::package::identity::RESERVED_NAMES;
use mosaic_sdk::{format_path, DeclarationError, Package};
use proptest::prelude::*;

#[test]
fn composition_examples() {
    assert_eq!(format_path(["/api/", "", "/widgets/"]), "/api/widgets");
    assert_eq!(format_path(["", "", ""]), "");
    assert_eq!(format_path(["/api", "/catalog", "/items/{id}"]), "/api/catalog/items/{id}");
}

#[test]
fn rejected_version_examples() {
    for version in ["1.0", "v1.0.0", "1.0.0-"] {
        let err = Package::builder("pkg").version(version).build().unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidVersion { .. }), "{version}");
    }
}

proptest! {
    #[test]
    fn grammar_names_build(name in "[a-zA-Z0-9_]{1,24}") {
        prop_assume!(!RESERVED_NAMES.contains(&name.as_str()));
        let package = Package::builder(name.clone()).build();
        prop_assert!(package.is_ok());
        let package = package.unwrap();
        prop_assert_eq!(package.name(), name.as_str());
    }

    #[test]
    fn names_outside_the_grammar_fail(
        head in "[a-z0-9_]{0,8}",
        bad in "[-. /!@#é]",
        tail in "[a-z0-9_]{0,8}",
    ) {
        let name = format!("{head}{bad}{tail}");
        let result = Package::builder(name).build();
        prop_assert!(matches!(result, Err(DeclarationError::InvalidName(_))));
    }

    #[test]
    fn semantic_versions_are_accepted(
        major in 0u32..1000,
        minor in 0u32..1000,
        patch in 0u32..1000,
        pre in proptest::option::of("[a-z0-9]{1,8}(\\.[a-z0-9]{1,4})?"),
        build in proptest::option::of("[a-z0-9]{1,8}"),
    ) {
        let mut version = format!("{major}.{minor}.{patch}");
        if let Some(pre) = pre {
            version.push('-');
            version.push_str(&pre);
        }
        if let Some(build) = build {
            version.push('+');
            version.push_str(&build);
        }
        let package = Package::builder("pkg").version(version.clone()).build();
        prop_assert!(package.is_ok(), "{}", version);
    }

    #[test]
    fn composition_is_idempotent(parts in proptest::collection::vec("[a-z/{}]{0,12}", 0..5)) {
        let once = format_path(&parts);
        let twice = format_path([once.as_str()]);
        prop_assert_eq!(&once, &twice);
        prop_assert!(!once.contains("//"));
        prop_assert!(!once.ends_with('/'));
        prop_assert!(once.is_empty() || once.starts_with('/'));
    }

    #[test]
    fn empty_fragments_do_not_change_the_path(
        base in "(/[a-z]{1,6}){0,3}",
        empties in 0usize..4,
    ) {
        let mut parts = vec![base.clone()];
        parts.extend(std::iter::repeat(String::new()).take(empties));
        parts.push("/".to_string());
        prop_assert_eq!(format_path(&parts), format_path([base.as_str()]));
    }
}
