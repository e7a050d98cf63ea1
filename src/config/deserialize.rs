// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles non-empty path pattern lists and positive counts.

use nonempty::NonEmpty;
use serde::Deserialize;

pub fn deserialize_path_patterns<'de, D>(deserializer: D) -> Result<NonEmpty<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<String> = Vec::deserialize(deserializer)?;
    if let Some(bad) = values.iter().find(|p| p.trim().is_empty()) {
        return Err(serde::de::Error::custom(format!(
            "invalid path pattern: {bad:?}"
        )));
    }
    NonEmpty::from_vec(values)
        .ok_or_else(|| serde::de::Error::custom("at least one path pattern is required"))
}

pub fn deserialize_positive<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = u32::deserialize(deserializer)?;
    if value == 0 {
        return Err(serde::de::Error::custom("value must be at least 1"));
    }
    Ok(value)
}
