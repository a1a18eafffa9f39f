//! Serde helpers shared by the configuration types

/// `Duration` stored as whole seconds
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "rk_core::config::serde_utils::duration_secs")]
///     connect_timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// `Duration` stored as whole milliseconds, for sub-second retry delays
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "duration_secs")]
        connect: Duration,
        #[serde(with = "duration_millis")]
        retry: Duration,
    }

    #[test]
    fn test_serialize_units() {
        let timeouts = Timeouts {
            connect: Duration::from_secs(10),
            retry: Duration::from_millis(250),
        };
        let json = serde_json::to_string(&timeouts).unwrap();
        assert_eq!(json, r#"{"connect":10,"retry":250}"#);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let timeouts: Timeouts = toml::from_str("connect = 3\nretry = 1500").unwrap();
        assert_eq!(timeouts.connect, Duration::from_secs(3));
        assert_eq!(timeouts.retry, Duration::from_millis(1500));
    }

    #[test]
    fn test_sub_second_truncated_to_zero_secs() {
        let timeouts = Timeouts {
            connect: Duration::from_millis(900),
            retry: Duration::ZERO,
        };
        let json = serde_json::to_string(&timeouts).unwrap();
        assert_eq!(json, r#"{"connect":0,"retry":0}"#);
    }
}
