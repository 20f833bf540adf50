use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// Wire format for query windows and watermarks: `2024-03-01T12:00:00.000Z`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

const PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, PARSE_FORMAT).map(|naive| naive.and_utc())
}

/// Current instant truncated to the wire precision, so a watermark written
/// now formats and re-parses to the same value.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Serde adapter for `DateTime<Utc>` fields carried in the wire format.
pub mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_uses_millis_and_z() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01T12:00:00.000Z");
    }

    #[test]
    fn test_parse_accepts_wire_format() {
        let ts = parse_timestamp("2024-03-01T12:00:00.250Z").unwrap();
        assert_eq!(ts.timestamp_millis(), Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap().timestamp_millis() + 250);
    }

    #[test]
    fn test_parse_rejects_missing_zone_marker() {
        assert!(parse_timestamp("2024-03-01T12:00:00.000").is_err());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_now_millis_survives_wire_round_trip() {
        let now = now_millis();
        assert_eq!(parse_timestamp(&format_timestamp(&now)).unwrap(), now);
    }
}
