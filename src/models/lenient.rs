#[cfg(test)]
#[path = "lenient_test.rs"]
mod tests;

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

/// Deserializes a JSON array, dropping the entries that do not decode as
/// `T`. A missing or null array yields an empty list.
pub fn skip_invalid<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    let total = values.len();

    let items: Vec<T> = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<T>(value.clone()) {
            Ok(item) => Some(item),
            Err(err) => {
                log::warn!(
                    "Dropping malformed {} entry: {} - {}",
                    short_type_name::<T>(),
                    err,
                    value
                );
                None
            }
        })
        .collect();

    if items.len() < total {
        log::debug!("Kept {} of {} entries", items.len(), total);
    }
    Ok(items)
}

fn short_type_name<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}
