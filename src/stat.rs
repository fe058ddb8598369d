use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single measurement posted to a stream.
///
/// Every field is optional on the wire; `null` sequences decode as empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stat {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub value: Vec<f64>,
    #[serde(default)]
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub extra: Vec<serde_json::Value>,
}

fn null_as_empty<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(de)?.unwrap_or_default())
}

/// Decode exactly one `Stat` from a request body.
///
/// Trailing whitespace is accepted, anything else after the first JSON value
/// is an error.
pub fn decode_stat(body: &[u8]) -> Result<Stat, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_slice(body);
    let stat = Stat::deserialize(&mut de)?;
    de.end()?;
    Ok(stat)
}
