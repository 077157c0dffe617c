use std::io::Write;

use crate::{
    args::{self, Usage},
    datetime::DateTime,
    ical::RecurrenceRule,
    schedule::{After, Before, Between, Config as ScheduleConfig, Constraint,
        Event, Scheduler},
    timezone::TimeZone,
};

const USAGE: &'static str = r#"
Expand a recurring event into (start, end) pairs.

The event is one recurrence rule plus an optional end time: the distance
between `--start` and `--end` is the duration attached to every occurrence.
With no `--end`, occurrences are instants and both columns are equal.

Occurrences can be windowed with `--after` and `--before`. By default every
tested occurrence (kept or not) counts toward the output ceiling; see
`--no-count-misses` for the other behavior.

Output is one occurrence per line: the start and end datetimes separated by
a tab, or JSON records with `--json`.

USAGE:
    occur spans <rule>

TIP:
    use -h for short docs and --help for long docs

EXAMPLES:
    A daily one-hour meeting, three times:

        $ occur spans 'FREQ=DAILY;COUNT=3' \
            --start 2024-06-03T09:00 --end 2024-06-03T10:00
        2024-06-03T09:00:00-04:00[America/New_York]	2024-06-03T10:00:00-04:00[America/New_York]
        2024-06-04T09:00:00-04:00[America/New_York]	2024-06-04T10:00:00-04:00[America/New_York]
        2024-06-05T09:00:00-04:00[America/New_York]	2024-06-05T10:00:00-04:00[America/New_York]

    %snip-start%

    The same, as JSON lines:

        $ occur spans 'FREQ=DAILY;COUNT=1' \
            --start 2024-06-03T09:00 --end 2024-06-03T10:00 --json
        {"index":0,"start":"2024-06-03T09:00:00-04:00[America/New_York]","end":"2024-06-03T10:00:00-04:00[America/New_York]"}

    Only the occurrences inside a window:

        $ occur spans 'FREQ=DAILY;COUNT=10' --start 2024-06-01T09:00 \
            --after 2024-06-03T00:00 --before 2024-06-05T23:59
        2024-06-03T09:00:00-04:00[America/New_York]	2024-06-03T09:00:00-04:00[America/New_York]
        2024-06-04T09:00:00-04:00[America/New_York]	2024-06-04T09:00:00-04:00[America/New_York]
        2024-06-05T09:00:00-04:00[America/New_York]	2024-06-05T09:00:00-04:00[America/New_York]

    %snip-end%
REQUIRED ARGUMENTS:
%args%
OPTIONS:
%flags%
"#;

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<()> {
    let mut config = Config::default();
    args::configure(p, USAGE, &mut [&mut config])?;

    let tz = config
        .start
        .as_ref()
        .map(|dt| TimeZone::from(dt.get().time_zone().clone()))
        .unwrap_or_else(TimeZone::system);
    let anchor = config.start.as_ref().map(|dt| dt.get().clone());
    let rule_text = config.rule()?;
    let rule = RecurrenceRule::parse(rule_text, tz.get(), anchor.as_ref())?;

    let mut event = Event::new(rule);
    if let Some(ref end) = config.end {
        event.end(end.get().clone());
    }
    for date in config.dates.iter() {
        event.rdate(date.get().clone());
    }
    for date in config.exclusion_dates.iter() {
        event.exdate(date.get().clone());
    }

    let inclusive = !config.exclusive;
    let constraint: Option<Box<dyn Constraint>> =
        match (config.after.as_ref(), config.before.as_ref()) {
            (Some(after), Some(before)) => Some(Box::new(Between::new(
                after.get().clone(),
                before.get().clone(),
                inclusive,
            ))),
            (Some(after), None) => {
                Some(Box::new(After::new(after.get().clone(), inclusive)))
            }
            (None, Some(before)) => {
                Some(Box::new(Before::new(before.get().clone(), inclusive)))
            }
            (None, None) => None,
        };

    let scheduler = match config.virtual_limit {
        None => Scheduler::new(),
        Some(limit) => {
            let mut schedule_config = ScheduleConfig::new();
            schedule_config.virtual_limit(limit);
            Scheduler::with_config(schedule_config)
        }
    };
    let occurrences = scheduler.occurrences(
        &event,
        constraint.as_deref(),
        !config.no_count_misses,
    );

    let mut wtr = std::io::stdout().lock();
    for occurrence in occurrences {
        if config.json {
            let record = Record {
                index: occurrence.index,
                start: DateTime::from(occurrence.start),
                end: DateTime::from(occurrence.end),
            };
            serde_json::to_writer(&mut wtr, &record)?;
            writeln!(wtr)?;
        } else {
            writeln!(wtr, "{occurrence}")?;
        }
    }
    Ok(())
}

/// The JSON shape of one occurrence. Serialization is written out by hand
/// to keep the fields in a stable, readable order.
struct Record {
    index: usize,
    start: DateTime,
    end: DateTime,
}

impl serde::Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Record", 3)?;
        state.serialize_field("index", &self.index)?;
        state.serialize_field("start", &self.start)?;
        state.serialize_field("end", &self.end)?;
        state.end()
    }
}

#[derive(Debug, Default)]
struct Config {
    rule: Option<String>,
    start: Option<DateTime>,
    end: Option<DateTime>,
    dates: Vec<DateTime>,
    exclusion_dates: Vec<DateTime>,
    after: Option<DateTime>,
    before: Option<DateTime>,
    exclusive: bool,
    no_count_misses: bool,
    virtual_limit: Option<usize>,
    json: bool,
}

impl Config {
    fn rule(&self) -> anyhow::Result<&str> {
        use anyhow::Context;

        self.rule.as_deref().context("missing required <rule>")
    }
}

impl args::Configurable for Config {
    fn configure(
        &mut self,
        p: &mut lexopt::Parser,
        arg: &mut lexopt::Arg,
    ) -> anyhow::Result<bool> {
        use lexopt::Arg::*;

        match *arg {
            Value(ref v) => {
                use crate::parse::OsStrExt;

                if self.rule.is_some() {
                    return Ok(false);
                }
                self.rule = Some(v.to_str()?.to_string());
            }
            Short('s') | Long("start") => {
                self.start = Some(args::parse(p, "-s/--start")?);
            }
            Short('e') | Long("end") => {
                self.end = Some(args::parse(p, "-e/--end")?);
            }
            Long("rdate") => {
                self.dates.push(args::parse(p, "--rdate")?);
            }
            Long("exdate") => {
                self.exclusion_dates.push(args::parse(p, "--exdate")?);
            }
            Long("after") => {
                self.after = Some(args::parse(p, "--after")?);
            }
            Long("before") => {
                self.before = Some(args::parse(p, "--before")?);
            }
            Long("exclusive") => {
                self.exclusive = true;
            }
            Long("no-count-misses") => {
                self.no_count_misses = true;
            }
            Long("virtual-limit") => {
                self.virtual_limit = Some(args::parse(p, "--virtual-limit")?);
            }
            Long("json") => {
                self.json = true;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        const RULE: Usage = Usage::arg(
            "<rule>",
            "An RFC 5545 RRULE property value, e.g., `FREQ=DAILY;COUNT=3`.",
            r#"
An RFC 5545 RRULE property value, e.g., `FREQ=DAILY;COUNT=3`.

An optional leading `RRULE:` tag is accepted and ignored. The rule may
carry its own starting point as a `DTSTART` part in the compact `YYYYMMDD`
or `YYYYMMDDTHHMMSS[Z]` forms; a `--start` flag takes precedence over it.
"#,
        );
        const START: Usage = Usage::flag(
            "-s/--start <datetime>",
            "The start of the first occurrence.",
            r#"
The start of the first occurrence.

This anchors the rule: it supplies the first instant of the sequence and
the wall-clock defaults for rule parts that are absent. Required unless
the rule text carries a DTSTART part.
"#,
        );
        const END: Usage = Usage::flag(
            "-e/--end <datetime>",
            "The end of the first occurrence.",
            r#"
The end of the first occurrence.

The distance between `--start` and `--end` becomes the duration of every
occurrence. The duration is absolute: an occurrence spanning a daylight
saving time transition keeps its real length rather than its wall-clock
length. Without this flag occurrences have zero duration.
"#,
        );
        const RDATE: Usage = Usage::flag(
            "--rdate <datetime>",
            "Adds one explicit occurrence.",
            r#"
Adds one explicit occurrence.

Explicit occurrences are merged with the rule's sequence in chronological
order, with duplicates collapsed, and get the same duration. This flag may
be given any number of times.
"#,
        );
        const EXDATE: Usage = Usage::flag(
            "--exdate <datetime>",
            "Subtracts one occurrence.",
            r#"
Subtracts one occurrence.

Any occurrence starting at the named instant is dropped, even when the two
datetimes are written in different time zones. This flag may be given any
number of times.
"#,
        );
        const AFTER: Usage = Usage::flag(
            "--after <datetime>",
            "Keeps only occurrences starting at or after this datetime.",
            r#"
Keeps only occurrences starting at or after this datetime.

The bound itself is included unless `--exclusive` is given. Occurrences
before the bound are skipped, not ended: later ones still appear.
"#,
        );
        const BEFORE: Usage = Usage::flag(
            "--before <datetime>",
            "Keeps only occurrences starting at or before this datetime.",
            r#"
Keeps only occurrences starting at or before this datetime.

The bound itself is included unless `--exclusive` is given. The first
occurrence past the bound ends the expansion (when `--after` is not also
given), since nothing later can come back inside it.
"#,
        );
        const EXCLUSIVE: Usage = Usage::flag(
            "--exclusive",
            "Makes the --after/--before bounds exclusive.",
            r#"
Makes the --after/--before bounds exclusive.

By default an occurrence starting exactly at a bound is kept.
"#,
        );
        const NO_COUNT_MISSES: Usage = Usage::flag(
            "--no-count-misses",
            "Occurrences dropped by the window do not use up any limit.",
            r#"
Occurrences dropped by the window do not use up any limit.

By default, every tested occurrence counts toward the output ceiling and
the rule's COUNT is consumed by generation as usual. With this flag, only
kept occurrences count: the rule's COUNT (when it has one) limits real
acceptances and replaces the output ceiling.
"#,
        );
        const VIRTUAL_LIMIT: Usage = Usage::flag(
            "--virtual-limit <number>",
            "The output ceiling for rules with no COUNT or UNTIL.",
            r#"
The output ceiling for rules with no COUNT or UNTIL.

An unbounded rule stops producing occurrences after this many. Defaults to
732, two years of a daily rule.
"#,
        );
        const JSON: Usage = Usage::flag(
            "--json",
            "Emit occurrences as JSON records, one per line.",
            r#"
Emit occurrences as JSON records, one per line.

Each record has `index`, `start` and `end` fields. Datetimes are RFC 9557
strings.
"#,
        );

        &[
            RULE,
            START,
            END,
            RDATE,
            EXDATE,
            AFTER,
            BEFORE,
            EXCLUSIVE,
            NO_COUNT_MISSES,
            VIRTUAL_LIMIT,
            JSON,
        ]
    }
}
