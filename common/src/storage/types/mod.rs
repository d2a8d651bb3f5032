use std::fmt;

use serde::{
    de::{self, MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use surrealdb::sql::Thing;

pub mod index_manifest;
pub mod legal_document;
pub mod text_chunk;

/// A struct that lives in its own SurrealDB table, keyed by `id`.
pub trait StoredObject: Serialize + for<'de> Deserialize<'de> {
    fn table_name() -> &'static str;
    fn get_id(&self) -> &str;
}

/// Record ids come back from SurrealDB as `Thing`s but are written as plain
/// keys; both shapes deserialize to the key.
pub fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct RecordKey;

    impl<'de> Visitor<'de> for RecordKey {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a record key or a record id")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
            Ok(value.to_owned())
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
            Ok(value)
        }

        fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<String, A::Error> {
            let thing = Thing::deserialize(de::value::MapAccessDeserializer::new(map))?;
            Ok(thing.id.to_raw())
        }
    }

    deserializer.deserialize_any(RecordKey)
}

/// `chrono` timestamps stored as native SurrealDB datetimes, for
/// `#[serde(with = ...)]`.
pub mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use surrealdb::sql::Datetime;

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        Datetime::from(*date).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        Datetime::deserialize(deserializer).map(DateTime::<Utc>::from)
    }
}

/// Declares a stored record: `id`, `created_at` and `updated_at`, followed
/// by the listed fields.
#[macro_export]
macro_rules! stored_object {
    ($(#[$meta:meta])* $name:ident, $table:expr, {$($(#[$attr:meta])* $field:ident: $ty:ty),* $(,)?}) => {
        $(#[$meta])*
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
        pub struct $name {
            #[serde(deserialize_with = "crate::storage::types::deserialize_flexible_id")]
            pub id: String,
            #[serde(with = "crate::storage::types::surreal_datetime", default)]
            pub created_at: chrono::DateTime<chrono::Utc>,
            #[serde(with = "crate::storage::types::surreal_datetime", default)]
            pub updated_at: chrono::DateTime<chrono::Utc>,
            $( $(#[$attr])* pub $field: $ty),*
        }

        impl $crate::storage::types::StoredObject for $name {
            fn table_name() -> &'static str {
                $table
            }

            fn get_id(&self) -> &str {
                &self.id
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use serde::de::value::{Error as ValueError, StrDeserializer};

    use super::*;

    #[test]
    fn plain_keys_pass_through() {
        let key = deserialize_flexible_id(StrDeserializer::<ValueError>::new("art-50"))
            .expect("plain key");
        assert_eq!(key, "art-50");
    }
}
