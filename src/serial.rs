//! Serde integration support.

use std::fmt;

use serde::de::{Error, Unexpected, Visitor};
use serde::*;

/// A field of a partial update record.
///
/// Gateway payloads distinguish between a field that is absent (keep the
/// cached value) and a field that is present, possibly holding `null`
/// (overwrite the cached value). An `Option` cannot express that difference,
/// so update records wrap every field in `Optional` instead.
///
/// Deserialization never produces `Absent` on its own; pair the field with
/// `#[serde(default)]` so a missing key falls back to it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Optional<T> {
    /// The field was not part of the payload.
    #[default]
    Absent,
    /// The field was part of the payload.
    Present(T),
}

impl<T> Optional<T> {
    /// Whether the field was part of the payload.
    pub fn is_present(&self) -> bool {
        matches!(self, Optional::Present(_))
    }

    /// Borrow the carried value, if any.
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Optional::Present(value) => Some(value),
            Optional::Absent => None,
        }
    }

    /// Convert into a plain `Option`, discarding the presence distinction.
    pub fn into_option(self) -> Option<T> {
        match self {
            Optional::Present(value) => Some(value),
            Optional::Absent => None,
        }
    }
}

impl<'d, T: Deserialize<'d>> Deserialize<'d> for Optional<T> {
    fn deserialize<D: Deserializer<'d>>(d: D) -> Result<Self, D::Error> {
        T::deserialize(d).map(Optional::Present)
    }
}

impl<T: Serialize> Serialize for Optional<T> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Optional::Present(value) => value.serialize(s),
            Optional::Absent => s.serialize_none(),
        }
    }
}

fn i64_to_u64<'d, V: Visitor<'d>, E: Error>(v: V, n: i64) -> Result<V::Value, E> {
    if n >= 0 {
        v.visit_u64(n as u64)
    } else {
        Err(E::invalid_value(Unexpected::Signed(n), &v))
    }
}

/// Deserialize a maybe-string ID into a u64.
pub fn deserialize_id<'d, D: Deserializer<'d>>(d: D) -> Result<u64, D::Error> {
    struct IdVisitor;
    impl<'d> Visitor<'d> for IdVisitor {
        type Value = u64;

        fn expecting(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
            write!(fmt, "a u64 or parseable string")
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<u64, E> {
            i64_to_u64(self, v)
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<u64, E> {
            v.parse::<u64>()
                .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    d.deserialize_any(IdVisitor)
}

/// Deserialize a maybe-string discriminator into a u16.
/// Also enforces 0 <= N <= 9999.
pub fn deserialize_discrim<'d, D: Deserializer<'d>>(d: D) -> Result<u16, D::Error> {
    struct DiscrimVisitor;
    impl<'d> Visitor<'d> for DiscrimVisitor {
        type Value = u16;

        fn expecting(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
            write!(fmt, "a u16 in [0, 9999] or parseable string")
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<u16, E> {
            if (0..=9999).contains(&v) {
                Ok(v as u16)
            } else {
                Err(E::invalid_value(Unexpected::Signed(v), &self))
            }
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<u16, E> {
            if v <= 9999 {
                Ok(v as u16)
            } else {
                Err(E::invalid_value(Unexpected::Unsigned(v), &self))
            }
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<u16, E> {
            v.parse::<u16>()
                .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    d.deserialize_any(DiscrimVisitor)
}

/// Make sure a field holds a certain numeric value, or fail otherwise.
#[derive(Debug, Clone)]
pub struct Eq<const N: u64>;

impl<'de, const N: u64> Deserialize<'de> for Eq<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NumberVisitor<const N: u64>;

        impl<'d, const N: u64> Visitor<'d> for NumberVisitor<N> {
            type Value = u64;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "the number {}", N)
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                if v == N {
                    Ok(v)
                } else {
                    Err(E::invalid_value(Unexpected::Unsigned(v), &self))
                }
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                // n can't be negative so no checks required
                if v as u64 == N {
                    Ok(v as u64)
                } else {
                    Err(E::invalid_value(Unexpected::Signed(v), &self))
                }
            }
        }

        deserializer.deserialize_any(NumberVisitor::<N>)?;
        Ok(Self)
    }
}

impl<const N: u64> Serialize for Eq<N> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(N)
    }
}

#[cfg(test)]
mod tests {
    use super::Optional;

    #[derive(serde::Deserialize)]
    struct Patch {
        #[serde(default)]
        nick: Optional<Option<String>>,
    }

    #[test]
    fn optional_distinguishes_absent_from_null() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.nick, Optional::Absent);

        let cleared: Patch = serde_json::from_str(r#"{"nick":null}"#).unwrap();
        assert_eq!(cleared.nick, Optional::Present(None));

        let set: Patch = serde_json::from_str(r#"{"nick":"kit"}"#).unwrap();
        assert_eq!(set.nick, Optional::Present(Some("kit".to_owned())));
    }
}
