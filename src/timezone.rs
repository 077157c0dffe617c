use jiff::fmt::{StdFmtWrite, temporal};

use crate::{
    args::Usage,
    parse::{BytesExt, FromBytes},
};

/// Represents a time zone parsed from user input.
///
/// This type exists primarily as a target for trait impls tailoring
/// behavior specific to `occur`, most notably the `system` special string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeZone {
    /// The actual parsed time zone. i.e., The thing we operate on.
    tz: jiff::tz::TimeZone,
}

impl TimeZone {
    pub const FLAG: Usage = Usage::flag(
        "-z/--time-zone <time-zone>",
        "The time zone that occurrences should be emitted in.",
        r#"
The time zone that occurrences should be emitted in.

A few different formats are accepted. They fall into three broad categories:

IANA time zone identifiers such as `America/New_York` or `Australia/Sydney`.

Specific offsets such as `-05:00` or `+1100`.

POSIX time zone strings such as `EST5EDT,M3.2.0,M11.1.0`.

The special string `system` is also accepted. This refers to the time zone
automatically detected from your system's configuration. On Unix systems for
example, this is usually determined by examining the symbolic link at
`/etc/localtime`. This can also be overridden via the `TZ` environment
variable.
"#,
    );

    pub fn system() -> TimeZone {
        TimeZone { tz: crate::TZ.clone() }
    }

    pub fn get(&self) -> &jiff::tz::TimeZone {
        &self.tz
    }
}

impl From<jiff::tz::TimeZone> for TimeZone {
    fn from(tz: jiff::tz::TimeZone) -> TimeZone {
        TimeZone { tz }
    }
}

impl std::fmt::Display for TimeZone {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        static PRINTER: temporal::DateTimePrinter =
            temporal::DateTimePrinter::new();

        PRINTER
            .print_time_zone(&self.tz, StdFmtWrite(f))
            .map_err(|_| std::fmt::Error)
    }
}

impl std::str::FromStr for TimeZone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<TimeZone> {
        s.as_bytes().parse()
    }
}

impl FromBytes for TimeZone {
    type Err = anyhow::Error;

    fn from_bytes(s: &[u8]) -> anyhow::Result<TimeZone> {
        static PARSER: temporal::DateTimeParser =
            temporal::DateTimeParser::new();

        if s == b"system" {
            return Ok(TimeZone::system());
        }
        Ok(PARSER.parse_time_zone(s).map(|tz| TimeZone { tz })?)
    }
}
