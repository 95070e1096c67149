use std::iter::repeat;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(&it))
}

/// Random lowercase alphanumeric string, used for account tokens and upload names.
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

/// Fixed width RFC 3339 representation. Stored timestamps compare correctly as strings.
pub fn timestamp_string(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_string() -> String {
    timestamp_string(&Utc::now())
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|it| it.with_timezone(&Utc))
}

/// Stored values meaning an unset flag, in every representation clients have
/// written: booleans, integers, digit strings or a missing field.
pub fn unset_flag_values() -> Vec<bson::Bson> {
    vec![
        bson::Bson::Boolean(false),
        bson::Bson::Int32(0),
        bson::Bson::Int64(0),
        bson::Bson::String("0".to_string()),
        bson::Bson::Null,
    ]
}

pub fn set_flag_values() -> Vec<bson::Bson> {
    vec![
        bson::Bson::Boolean(true),
        bson::Bson::Int32(1),
        bson::Bson::Int64(1),
        bson::Bson::String("1".to_string()),
    ]
}

/// Serde helpers for values whose stored representation differs from the
/// Rust one.
pub mod serde_helpers {
    /// `DateTime<Utc>` as a fixed width RFC 3339 string.
    pub mod timestamp {
        use chrono::{DateTime, Utc};
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&crate::util::timestamp_string(value))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
            let raw = String::deserialize(d)?;
            crate::util::parse_timestamp(&raw)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{}'", raw)))
        }
    }

    pub mod timestamp_opt {
        use chrono::{DateTime, Utc};
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(it) => s.serialize_str(&crate::util::timestamp_string(it)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                None => Ok(None),
                Some(raw) if raw.is_empty() => Ok(None),
                Some(raw) => crate::util::parse_timestamp(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{}'", raw))),
            }
        }
    }

    /// Booleans stored as `"0"`/`"1"`. Reading also accepts real booleans and
    /// integers written by older clients.
    pub mod flag {
        use serde::de::{self, Visitor};
        use serde::{Deserializer, Serializer};
        use std::fmt;

        pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(if *value { "1" } else { "0" })
        }

        struct FlagVisitor;

        impl<'de> Visitor<'de> for FlagVisitor {
            type Value = bool;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("\"0\", \"1\", a boolean or an integer")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
                Ok(v)
            }

            fn visit_i32<E: de::Error>(self, v: i32) -> Result<bool, E> {
                Ok(v != 0)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
                Ok(v != 0)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
                Ok(v != 0)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
                match v.trim() {
                    "1" | "true" => Ok(true),
                    "0" | "false" | "" => Ok(false),
                    other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
                }
            }

            fn visit_none<E: de::Error>(self) -> Result<bool, E> {
                Ok(false)
            }

            fn visit_unit<E: de::Error>(self) -> Result<bool, E> {
                Ok(false)
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
            d.deserialize_any(FlagVisitor)
        }
    }

    /// Booleans written as real booleans, read with the leniency of [`flag`].
    pub mod lenient_bool {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_bool(*value)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
            super::flag::deserialize(d)
        }
    }

    /// Decimal values kept as text. Numbers sent by clients are converted.
    pub mod text {
        use serde::{Deserialize, Deserializer};

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Integer(i64),
            Float(f64),
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
            Ok(match Raw::deserialize(d)? {
                Raw::Text(it) => it,
                Raw::Integer(it) => it.to_string(),
                Raw::Float(it) => it.to_string(),
            })
        }

        pub mod opt {
            use serde::{Deserialize, Deserializer};

            #[derive(Deserialize)]
            struct Text(#[serde(deserialize_with = "super::deserialize")] String);

            pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
                Ok(Option::<Text>::deserialize(d)?.map(|it| it.0))
            }
        }
    }

    /// Optional flag, used by partial updates. `None` is skipped by callers
    /// through `skip_serializing_if`.
    pub mod flag_opt {
        use serde::{Deserialize, Deserializer, Serializer};

        #[derive(Deserialize)]
        struct Flag(#[serde(with = "super::flag")] bool);

        pub fn serialize<S: Serializer>(value: &Option<bool>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(it) => super::flag::serialize(it, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
            Ok(Option::<Flag>::deserialize(d)?.map(|it| it.0))
        }
    }

    /// String lists stored as a JSON encoded string (`"[\"a\",\"b\"]"`).
    /// Plain arrays are accepted on input.
    pub mod json_list {
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Encoded(String),
        }

        pub fn serialize<S: Serializer>(value: &[String], s: S) -> Result<S::Ok, S::Error> {
            let encoded = serde_json::to_string(value).map_err(serde::ser::Error::custom)?;
            s.serialize_str(&encoded)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
            match Option::<Raw>::deserialize(d)? {
                None => Ok(vec![]),
                Some(Raw::List(list)) => Ok(list),
                Some(Raw::Encoded(raw)) if raw.trim().is_empty() => Ok(vec![]),
                Some(Raw::Encoded(raw)) => serde_json::from_str(&raw).map_err(D::Error::custom),
            }
        }
    }

    pub mod json_list_opt {
        use serde::{Deserialize, Deserializer, Serializer};

        #[derive(Deserialize)]
        struct List(#[serde(with = "super::json_list")] Vec<String>);

        pub fn serialize<S: Serializer>(value: &Option<Vec<String>>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(it) => super::json_list::serialize(it, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
            Ok(Option::<List>::deserialize(d)?.map(|it| it.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::serde_helpers;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Flags {
        #[serde(with = "serde_helpers::flag")]
        paid: bool,
        #[serde(with = "serde_helpers::json_list")]
        files: Vec<String>,
    }

    #[test]
    fn flags_are_written_as_digit_strings() {
        let value = serde_json::to_value(Flags {
            paid: true,
            files: vec!["a.pdf".to_string()],
        })
        .unwrap();

        assert_eq!(value["paid"], "1");
        assert_eq!(value["files"], "[\"a.pdf\"]");
    }

    #[test]
    fn flags_accept_legacy_representations() {
        let parsed: Flags = serde_json::from_str(r#"{"paid": true, "files": ""}"#).unwrap();
        assert!(parsed.paid);
        assert!(parsed.files.is_empty());

        let parsed: Flags = serde_json::from_str(r#"{"paid": 0, "files": "[]"}"#).unwrap();
        assert!(!parsed.paid);

        let parsed: Flags = serde_json::from_str(r#"{"paid": "0", "files": "[\"x\"]"}"#).unwrap();
        assert!(!parsed.paid);
        assert_eq!(parsed.files, vec!["x".to_string()]);

        let parsed: Flags = serde_json::from_str(r#"{"paid": "1", "files": ["a", "b"]}"#).unwrap();
        assert_eq!(parsed.files.len(), 2);
    }

    #[test]
    fn lenient_bools_stay_booleans() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Seen {
            #[serde(default, with = "serde_helpers::lenient_bool")]
            seen: bool,
        }

        let parsed: Seen = serde_json::from_str(r#"{"seen": 1}"#).unwrap();
        assert!(parsed.seen);
        let parsed: Seen = serde_json::from_str(r#"{"seen": 0}"#).unwrap();
        assert!(!parsed.seen);
        let parsed: Seen = serde_json::from_str("{}").unwrap();
        assert!(!parsed.seen);

        let value = serde_json::to_value(Seen { seen: true }).unwrap();
        assert_eq!(value["seen"], true);
    }

    #[test]
    fn numeric_text_accepts_numbers() {
        #[derive(Deserialize)]
        struct Price {
            #[serde(deserialize_with = "serde_helpers::text::deserialize")]
            price: String,
            #[serde(default, deserialize_with = "serde_helpers::text::opt::deserialize")]
            min: Option<String>,
        }

        let parsed: Price = serde_json::from_str(r#"{"price": 20}"#).unwrap();
        assert_eq!(parsed.price, "20");
        assert_eq!(parsed.min, None);

        let parsed: Price = serde_json::from_str(r#"{"price": "12.5", "min": 3.5}"#).unwrap();
        assert_eq!(parsed.price, "12.5");
        assert_eq!(parsed.min.as_deref(), Some("3.5"));
    }

    #[test]
    fn timestamps_sort_as_strings() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(500);

        let a_str = super::timestamp_string(&a);
        let b_str = super::timestamp_string(&b);

        assert_eq!(a_str, "2024-01-01T10:00:00.000Z");
        assert!(a_str < b_str);
        assert_eq!(super::parse_timestamp(&b_str), Some(b));
    }

    #[test]
    fn random_tokens_have_requested_length() {
        let token = super::random_token(26);
        assert_eq!(token.len(), 26);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
