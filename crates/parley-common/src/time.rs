use chrono::{DateTime, Utc};

/// Milliseconds since the Unix epoch, as sent on the wire.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// RFC 3339 timestamp for log-friendly payloads.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub fn to_ms(ts: &DateTime<Utc>) -> u64 {
    ts.timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn to_ms_matches_chrono() {
        let ts = DateTime::parse_from_rfc3339("2024-01-01T00:00:01Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(to_ms(&ts), 1_704_067_201_000);
    }

    #[test]
    fn rfc3339_parses_back() {
        let s = now_rfc3339();
        assert!(DateTime::parse_from_rfc3339(&s).is_ok());
    }
}
