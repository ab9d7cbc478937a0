//! Property-based tests using proptest
//!
//! These tests verify the tag codec, declared-tag parsing, tag-set merging
//! and ARN templates using randomized inputs.

use proptest::prelude::*;
use serde_json::Value;
use tagsweep::resource::arn::{self, ArnVars};
use tagsweep::resource::tagging::merge_tag_set;
use tagsweep::resource::tags::{self, KeyForm};
use tagsweep::resource::{parse_declared_tags, TagAction, TagSet, TagWireShape, Tags};

/// Generate an arbitrary tag map
fn arb_tags() -> impl Strategy<Value = Tags> {
    prop::collection::btree_map("[A-Za-z][A-Za-z0-9_.:/=+@-]{0,20}", ".{0,30}", 0..20)
}

/// Generate one of the wire shapes
fn arb_shape() -> impl Strategy<Value = TagWireShape> {
    prop_oneof![
        Just(TagWireShape::KvListUpper),
        Just(TagWireShape::KvListLower),
        Just(TagWireShape::KvListTagkey),
        Just(TagWireShape::Dict),
    ]
}

/// Generate declared tags that survive the `k:v,k:v` syntax
fn arb_declared() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-zA-Z][a-zA-Z0-9_-]{0,10}", "[a-zA-Z0-9_./-]{0,10}"), 0..10)
}

proptest! {
    /// Encoding then decoding restores the canonical map in every shape
    #[test]
    fn codec_round_trips(tags in arb_tags(), shape in arb_shape()) {
        let encoded = tags::encode(&tags, shape);
        let decoded = tags::decode(&encoded, shape).unwrap();
        prop_assert_eq!(decoded, tags);
    }

    /// List shapes emit one entry per tag
    #[test]
    fn list_shapes_emit_one_entry_per_tag(tags in arb_tags()) {
        for shape in [TagWireShape::KvListUpper, TagWireShape::KvListLower, TagWireShape::KvListTagkey] {
            let encoded = tags::encode(&tags, shape);
            prop_assert_eq!(encoded.as_array().map(|a| a.len()), Some(tags.len()));
        }
    }

    /// Re-encoding a decoded payload is stable
    #[test]
    fn codec_is_stable(tags in arb_tags(), shape in arb_shape()) {
        let once = tags::encode(&tags, shape);
        let twice = tags::encode(&tags::decode(&once, shape).unwrap(), shape);
        prop_assert_eq!(once, twice);
    }

    /// Key-only payloads restore the key set in both forms
    #[test]
    fn keys_round_trip(tags in arb_tags()) {
        for form in [KeyForm::Strings, KeyForm::KeyObjects] {
            let encoded = tags::encode_keys(tags.keys(), form);
            let decoded = tags::decode_keys(&encoded).unwrap();
            prop_assert!(decoded.iter().eq(tags.keys()));
        }
    }

    /// Parsing never panics and never yields empty keys
    #[test]
    fn parse_declared_is_total(input in ".{0,200}") {
        let parsed = parse_declared_tags(&input);
        for (key, value) in parsed.iter() {
            prop_assert!(!key.is_empty());
            prop_assert_eq!(key, key.trim());
            prop_assert_eq!(value, value.trim());
        }
    }

    /// Well-formed declarations parse back to the last value of each key
    #[test]
    fn parse_declared_restores_pairs(pairs in arb_declared()) {
        let input = pairs
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        let parsed = parse_declared_tags(&input);
        let expected: TagSet = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        prop_assert_eq!(parsed, expected);
    }

    /// Applying declared tags makes them present with the declared values
    #[test]
    fn apply_sets_declared_values(current in arb_tags(), pairs in arb_declared()) {
        let declared: TagSet = pairs.into_iter().collect();
        let merged = merge_tag_set(current.clone(), TagAction::Apply, &declared);
        for (key, value) in declared.iter() {
            prop_assert_eq!(merged.get(key).map(String::as_str), Some(value));
        }
        for (key, value) in &current {
            if declared.get(key).is_none() {
                prop_assert_eq!(merged.get(key), Some(value));
            }
        }
    }

    /// Removing declared keys leaves exactly the undeclared ones
    #[test]
    fn remove_drops_declared_keys(current in arb_tags(), pairs in arb_declared()) {
        let declared: TagSet = pairs.into_iter().collect();
        let merged = merge_tag_set(current.clone(), TagAction::Remove, &declared);
        for key in declared.keys() {
            prop_assert!(!merged.contains_key(key));
        }
        prop_assert!(merged.keys().all(|k| current.contains_key(k)));
        prop_assert_eq!(
            merged.len(),
            current.keys().filter(|k| declared.get(k).is_none()).count()
        );
    }

    /// Templates without braces in variables leave no placeholder behind
    #[test]
    fn arn_build_substitutes_everything(
        region in "[a-z]{2}-[a-z]{4,9}-[1-3]",
        account in "[0-9]{12}",
        id in "[a-zA-Z0-9/_.-]{1,40}",
    ) {
        let vars = ArnVars::new(&region, &account, &id);
        let arn = arn::build("arn:aws:svc:{region}:{account_id}:thing/{resource_id}", &vars).unwrap();
        prop_assert!(arn.starts_with("arn:aws:svc:"));
        prop_assert!(!arn.contains('{'), "unsubstituted placeholder in {}", arn);
        prop_assert!(arn.ends_with(&id));
    }
}

/// Null payloads decode to no tags in every shape
#[test]
fn null_payload_is_empty() {
    for shape in TagWireShape::ALL {
        assert!(tags::decode(&Value::Null, shape).unwrap().is_empty());
    }
}
