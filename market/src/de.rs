//! Deserialization helpers for venues that encode numbers as strings.

use serde::{Deserialize, Deserializer};

/// Deserialize a string-encoded floating point field.
pub fn de_str_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<f64>().map_err(serde::de::Error::custom)
}

/// Deserialize an optional string-encoded floating point field.
pub fn de_opt_str_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| s.parse::<f64>().map_err(serde::de::Error::custom))
        .transpose()
}

/// Deserialize `[["price","size"], …]` ladders into `(price, size)` levels.
pub fn de_levels<'de, D>(deserializer: D) -> Result<Vec<(f64, f64)>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<[String; 2]> = Vec::deserialize(deserializer)?;
    raw.into_iter()
        .map(|[price, size]| {
            let price = price.parse::<f64>().map_err(serde::de::Error::custom)?;
            let size = size.parse::<f64>().map_err(serde::de::Error::custom)?;
            Ok((price, size))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "de_str_f64")]
        value: f64,
        #[serde(default, deserialize_with = "de_opt_str_f64")]
        maybe: Option<f64>,
        #[serde(deserialize_with = "de_levels")]
        levels: Vec<(f64, f64)>,
    }

    #[test]
    fn parses_string_encoded_numbers() {
        let probe: Probe = serde_json::from_str(
            r#"{"value":"42.5","maybe":"0.25","levels":[["50000.1","2.0"],["49999.9","0.5"]]}"#,
        )
        .unwrap();

        assert_eq!(probe.value, 42.5);
        assert_eq!(probe.maybe, Some(0.25));
        assert_eq!(probe.levels, vec![(50_000.1, 2.0), (49_999.9, 0.5)]);
    }

    #[test]
    fn missing_optional_field_is_none() {
        let probe: Probe =
            serde_json::from_str(r#"{"value":"1","levels":[]}"#).unwrap();
        assert_eq!(probe.maybe, None);
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let err = serde_json::from_str::<Probe>(r#"{"value":"abc","levels":[]}"#);
        assert!(err.is_err());
    }
}
