use artboard_export::naming::{is_illegal, sanitize, NameRegistry, NameResolver, ILLEGAL_CHARS};
use artboard_export::CollisionPolicy;
use proptest::prelude::*;
use std::collections::HashSet;

fn arb_name() -> impl Strategy<Value = String> {
    let illegal: Vec<char> = ILLEGAL_CHARS.to_vec();
    prop::collection::vec(
        prop_oneof![any::<char>(), prop::sample::select(illegal)],
        0..40,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn resolved_names_contain_no_illegal_characters(
        document in arb_name(),
        layer in arb_name(),
        prefix in prop::option::of(arb_name()),
        substitute in prop::sample::select(vec!['-', '_', '~']),
    ) {
        let resolver = NameResolver::new(substitute, " - ");
        let name = resolver.resolve(&document, &layer, prefix.as_deref());
        prop_assert!(!name.chars().any(is_illegal));
    }

    #[test]
    fn sanitize_preserves_length_and_legal_characters(name in arb_name()) {
        let cleaned = sanitize(&name, '_');
        prop_assert_eq!(cleaned.chars().count(), name.chars().count());
        for (before, after) in name.chars().zip(cleaned.chars()) {
            if is_illegal(before) {
                prop_assert_eq!(after, '_');
            } else {
                prop_assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn suffix_registry_never_repeats(names in prop::collection::vec("[ab]{1,2}", 0..20)) {
        let mut registry = NameRegistry::new(CollisionPolicy::Suffix);
        let mut seen = HashSet::new();
        for name in names {
            let claimed = registry.claim(name);
            prop_assert!(seen.insert(claimed));
        }
    }
}
