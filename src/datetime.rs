use {
    anyhow::Context,
    jiff::{Zoned, fmt::temporal},
};

use crate::{
    TZ,
    args::Usage,
    parse::{BytesExt, FromBytes},
    timezone::TimeZone,
};

static TEMPORAL_PARSER: temporal::DateTimeParser =
    temporal::DateTimeParser::new();

/// Represents an `occur` datetime parsed from user input.
///
/// Everything comes down to a physical instant in time paired with a time
/// zone. Datetimes written with an offset or a time zone annotation carry
/// their own zone; civil datetimes and bare dates are interpreted in the
/// system time zone (overridable via the `TZ` environment variable).
///
/// This type exists primarily as a target for trait impls for tailoring
/// behavior specific to `occur`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct DateTime {
    /// The actual parsed datetime. i.e., The thing we operate on.
    zdt: Zoned,
}

impl DateTime {
    pub const ARG: Usage = Usage::arg(
        "<datetime>",
        "A datetime string, e.g., `now` or `2025-03-15T00:00Z`.",
        r#"
A datetime string.

The following formats are accepted:

RFC 9557, e.g., `2025-03-15T10:23:00-04:00[America/New_York]`

RFC 3339, e.g., `2025-03-15T10:23:00-04:00` or `2025-03-15T14:23:00Z`

A civil datetime with no offset, e.g., `2025-03-15T10:23:00`, interpreted in
your system's configured time zone (which may be overridden by the `TZ`
environment variable).

A bare date, e.g., `2025-03-15`, which refers to the first instant of that
day in your system's configured time zone.

The special string `now` refers to the current datetime to the highest
precision supported by your system. The current datetime is computed once
when occur starts, or if the `OCCUR_NOW` environment variable is set, that
time is used instead.
"#,
    );

    /// Returns the current datetime in the system time zone.
    pub fn now() -> DateTime {
        DateTime { zdt: crate::NOW.clone() }
    }

    /// Returns the underlying zoned datetime.
    pub fn get(&self) -> &Zoned {
        &self.zdt
    }

    /// Converts this datetime to the given time zone, preserving the
    /// absolute instant.
    pub fn in_tz(&self, tz: &TimeZone) -> DateTime {
        DateTime {
            zdt: self.zdt.timestamp().to_zoned(tz.get().clone()),
        }
    }
}

impl From<Zoned> for DateTime {
    fn from(zdt: Zoned) -> DateTime {
        DateTime { zdt }
    }
}

impl From<DateTime> for Zoned {
    fn from(dt: DateTime) -> Zoned {
        dt.zdt
    }
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.zdt, f)
    }
}

impl std::str::FromStr for DateTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<DateTime> {
        s.as_bytes().parse()
    }
}

impl FromBytes for DateTime {
    type Err = anyhow::Error;

    fn from_bytes(s: &[u8]) -> anyhow::Result<DateTime> {
        if s == b"now" {
            return Ok(DateTime::now());
        }
        // First try the formats that carry their own offset or time zone.
        if let Ok(zdt) = TEMPORAL_PARSER.parse_zoned(s) {
            return Ok(DateTime { zdt });
        }
        // Otherwise interpret a civil datetime (or a bare date, which
        // parses with a midnight time) in the system time zone.
        let dt = TEMPORAL_PARSER.parse_datetime(s).with_context(|| {
            format!(
                "failed to parse `{s}` as a datetime",
                s = bstr::BStr::new(s),
            )
        })?;
        let zdt = dt.to_zoned(TZ.clone()).with_context(|| {
            format!(
                "`{dt}` is not a valid datetime in the system time zone",
            )
        })?;
        Ok(DateTime { zdt })
    }
}

impl serde::Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
