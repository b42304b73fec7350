//! Cache key derivation.
//!
//! A cache key is a pure function of the logical query name and its parameter
//! set. Parameters are kept in a `BTreeMap` so iteration order is the ordinal
//! key order, which makes the derived key independent of insertion order.

use std::collections::BTreeMap;

use serde_json::Value;

/// Derive the cache key for `(query_name, params)`.
///
/// Entries are rendered as `key:jsonValue`, joined with `|`, and prefixed by
/// the query name. With no parameters the key is the query name alone.
pub fn derive_key(query_name: &str, params: &BTreeMap<String, Value>) -> String {
    if params.is_empty() {
        return query_name.to_string();
    }

    let mut key = String::from(query_name);
    for (name, value) in params {
        key.push('|');
        key.push_str(name);
        key.push(':');
        key.push_str(&value.to_string());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_params_yields_bare_query_name() {
        assert_eq!(derive_key("materials", &BTreeMap::new()), "materials");
    }

    #[test]
    fn params_are_sorted_by_key() {
        let mut params = BTreeMap::new();
        params.insert("zeta".to_string(), json!(1));
        params.insert("alpha".to_string(), json!("x"));

        assert_eq!(
            derive_key("history", &params),
            "history|alpha:\"x\"|zeta:1"
        );
    }

    #[test]
    fn key_is_independent_of_insertion_order() {
        let mut forward = BTreeMap::new();
        forward.insert("a".to_string(), json!(1));
        forward.insert("b".to_string(), json!(2));

        let mut reverse = BTreeMap::new();
        reverse.insert("b".to_string(), json!(2));
        reverse.insert("a".to_string(), json!(1));

        assert_eq!(derive_key("q", &forward), derive_key("q", &reverse));
    }

    #[test]
    fn values_keep_json_rendering() {
        let mut params = BTreeMap::new();
        params.insert("material_code".to_string(), json!(123));
        assert_eq!(
            derive_key("six-month-average", &params),
            "six-month-average|material_code:123"
        );

        let mut string_params = BTreeMap::new();
        string_params.insert("material_code".to_string(), json!("123"));
        assert_ne!(
            derive_key("six-month-average", &params),
            derive_key("six-month-average", &string_params)
        );
    }
}
