//! Query-string helpers shared by the read filters.

use serde::{Deserialize, Deserializer};

/// Deserialize an optional value from its string form, treating `""` as absent.
///
/// Listing endpoints receive every filter as a string (`?category=&limit=20`),
/// so typed fields parse through `FromStr` rather than serde's native formats.
pub fn empty_string_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let raw: Option<String> = Option::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Params {
        #[serde(default, deserialize_with = "empty_string_as_none")]
        limit: Option<usize>,
    }

    #[test]
    fn empty_and_missing_values_are_none() {
        let p: Params = serde_json::from_str(r#"{"limit":""}"#).unwrap();
        assert_eq!(p.limit, None);
        let p: Params = serde_json::from_str("{}").unwrap();
        assert_eq!(p.limit, None);
        let p: Params = serde_json::from_str(r#"{"limit":" 20 "}"#).unwrap();
        assert_eq!(p.limit, Some(20));
    }

    #[test]
    fn unparsable_values_are_errors() {
        assert!(serde_json::from_str::<Params>(r#"{"limit":"many"}"#).is_err());
    }
}
