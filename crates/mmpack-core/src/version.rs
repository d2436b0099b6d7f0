//! Loose version strings with an "any" wildcard.
//!
//! Package and symbol versions found in the wild do not follow a single
//! scheme, so versions are compared the way loose version strings usually
//! are: split into runs of digits and runs of other characters, numeric runs
//! compared as integers and the rest lexically.
//!
//! The wildcard `any` stands for "no constraint". It compares as both lower
//! or equal and greater or equal to every version, so a missing constraint
//! never blocks a match. Because of that, `Ord::max` and friends are not
//! meaningful on versions; use [`Version::newest`] and [`Version::oldest`],
//! which never let `any` win against a concrete version.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const ANY: &str = "any";

/// A loosely ordered version, possibly the `any` wildcard.
#[derive(Debug, Clone, Default)]
pub struct Version {
    /// `None` for the wildcard.
    raw: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Component<'a> {
    Num(u64),
    Text(&'a str),
}

impl Version {
    /// The `any` wildcard.
    pub fn any() -> Self {
        Self { raw: None }
    }

    /// Build a version from a string. Empty strings and `any` give the wildcard.
    pub fn new(s: impl AsRef<str>) -> Self {
        let s = s.as_ref().trim();
        if s.is_empty() || s == ANY {
            Self::any()
        } else {
            Self {
                raw: Some(s.to_string()),
            }
        }
    }

    /// Whether this is the wildcard.
    pub fn is_any(&self) -> bool {
        self.raw.is_none()
    }

    /// The version string, `any` for the wildcard.
    pub fn as_str(&self) -> &str {
        self.raw.as_deref().unwrap_or(ANY)
    }

    /// The newer of two versions. `any` only wins when both are `any`.
    pub fn newest(self, other: Version) -> Version {
        match (self.is_any(), other.is_any()) {
            (true, _) => other,
            (_, true) => self,
            _ if other.cmp_concrete(&self) == Ordering::Greater => other,
            _ => self,
        }
    }

    /// The older of two versions. `any` only wins when both are `any`.
    pub fn oldest(self, other: Version) -> Version {
        match (self.is_any(), other.is_any()) {
            (true, _) => other,
            (_, true) => self,
            _ if other.cmp_concrete(&self) == Ordering::Less => other,
            _ => self,
        }
    }

    /// Fold a sequence with [`Version::newest`]. Empty input gives `any`.
    pub fn newest_of<I: IntoIterator<Item = Version>>(versions: I) -> Version {
        versions.into_iter().fold(Version::any(), Version::newest)
    }

    /// Fold a sequence with [`Version::oldest`]. Empty input gives `any`.
    pub fn oldest_of<I: IntoIterator<Item = Version>>(versions: I) -> Version {
        versions.into_iter().fold(Version::any(), Version::oldest)
    }

    fn components(s: &str) -> Vec<Component<'_>> {
        let mut parts = Vec::new();
        let bytes = s.as_bytes();
        let mut start = 0;
        while start < bytes.len() {
            let digit = bytes[start].is_ascii_digit();
            let mut end = start + 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() == digit {
                end += 1;
            }
            let run = &s[start..end];
            // Runs too long for u64 are compared as text
            match run.parse::<u64>() {
                Ok(n) if digit => parts.push(Component::Num(n)),
                _ => parts.push(Component::Text(run)),
            }
            start = end;
        }
        parts
    }

    fn cmp_concrete(&self, other: &Version) -> Ordering {
        let (a, b) = match (&self.raw, &other.raw) {
            (Some(a), Some(b)) => (a.as_str(), b.as_str()),
            _ => return Ordering::Equal,
        };

        let ca = Self::components(a);
        let cb = Self::components(b);
        for (x, y) in ca.iter().zip(cb.iter()) {
            let ord = match (x, y) {
                (Component::Num(x), Component::Num(y)) => x.cmp(y),
                (Component::Text(x), Component::Text(y)) => x.cmp(y),
                // Mixed component kinds, no meaningful order between them
                _ => return a.cmp(b),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        ca.len().cmp(&cb.len())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_concrete(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Version::new(s))
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Version::new(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Versions deserialize from strings and, for hand-written YAML, from bare
/// numbers. A number has already lost its spelling: unquoted `1.10` reads
/// as `1.1`. Versions in specs files should therefore be quoted.
impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // YAML turns unquoted `1.0` into a number
        let value = string_like::StringLike::deserialize(deserializer)?;
        Ok(Version::new(value.0))
    }
}

mod string_like {
    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer};
    use std::fmt;

    pub struct StringLike(pub String);

    impl<'de> Deserialize<'de> for StringLike {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct StringLikeVisitor;

            impl Visitor<'_> for StringLikeVisitor {
                type Value = StringLike;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a version string")
                }

                fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                    Ok(StringLike(v.to_string()))
                }

                fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                    Ok(StringLike(v.to_string()))
                }

                fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                    Ok(StringLike(v.to_string()))
                }

                fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                    // Debug keeps the trailing ".0" that Display drops
                    let version = format!("{v:?}");
                    tracing::warn!(
                        "version {} was written as a number, quote it to keep its exact spelling",
                        version
                    );
                    Ok(StringLike(version))
                }

                fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                    Ok(StringLike(String::new()))
                }

                fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                    Ok(StringLike(String::new()))
                }
            }

            deserializer.deserialize_any(StringLikeVisitor)
        }
    }
}
