use std::io::Write;

use crate::{
    args::{self, Usage},
    datetime::DateTime,
    ical::RecurrenceRule,
    set::RecurrenceSet,
    timezone::TimeZone,
};

const USAGE: &'static str = r#"
Merge recurrence rules and explicit dates into one recurrence set.

Each positional argument is an RFC 5545 RRULE property value, e.g.,
`FREQ=WEEKLY;BYDAY=TU,TH`. The datetimes generated by every rule, together
with any explicit dates given via `--rdate`, are merged into a single
chronologically ascending sequence with duplicates collapsed. Datetimes
generated by `--exrule` rules or named by `--exdate` are subtracted.

Rules take their starting point from the `--start` flag, or from a
`DTSTART` part embedded in the rule text. One of the two must be present.

The merged sequence may be unbounded when any rule has no COUNT or UNTIL;
use `--limit` (or a program like `head`) to cap the output.

USAGE:
    occur set [<rule> ...]

TIP:
    use -h for short docs and --help for long docs

EXAMPLES:
    Two rules merged, with one occurrence excluded:

        $ occur set 'FREQ=DAILY;COUNT=3' 'FREQ=WEEKLY;COUNT=2' \
            --start 2024-06-03T09:00 --exdate 2024-06-04T09:00
        2024-06-03T09:00:00-04:00[America/New_York]
        2024-06-05T09:00:00-04:00[America/New_York]
        2024-06-10T09:00:00-04:00[America/New_York]

    %snip-start%

    Explicit dates only, sorted and deduplicated:

        $ occur set --rdate 2024-06-05T12:00 --rdate 2024-06-01T12:00
        2024-06-01T12:00:00-04:00[America/New_York]
        2024-06-05T12:00:00-04:00[America/New_York]

    A rule carrying its own starting point, emitted in UTC:

        $ occur set 'FREQ=MONTHLY;COUNT=2;DTSTART=20240314T040000Z' -z UTC
        2024-03-14T04:00:00+00:00[UTC]
        2024-04-14T04:00:00+00:00[UTC]

    %snip-end%
ARGUMENTS:
%args%
OPTIONS:
%flags%
"#;

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<()> {
    let mut config = Config::default();
    args::configure(p, USAGE, &mut [&mut config])?;

    let tz = config.tz.clone().unwrap_or_else(TimeZone::system);
    let anchor =
        config.start.as_ref().map(|dt| dt.in_tz(&tz).get().clone());
    let mut set = RecurrenceSet::new(tz.get().clone());
    for text in config.rules.iter() {
        set.rrule(RecurrenceRule::parse(text, tz.get(), anchor.as_ref())?);
    }
    for text in config.exclusion_rules.iter() {
        set.exrule(RecurrenceRule::parse(text, tz.get(), anchor.as_ref())?);
    }
    for date in config.dates.iter() {
        set.rdate(date.get().clone());
    }
    for date in config.exclusion_dates.iter() {
        set.exdate(date.get().clone());
    }
    if let Some(limit) = config.limit {
        set.limit(limit);
    }
    set.ignore_count(config.ignore_count);

    let mut wtr = std::io::stdout().lock();
    for dt in set.iter().map(DateTime::from) {
        writeln!(wtr, "{dt}")?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Config {
    rules: Vec<String>,
    start: Option<DateTime>,
    tz: Option<TimeZone>,
    dates: Vec<DateTime>,
    exclusion_rules: Vec<String>,
    exclusion_dates: Vec<DateTime>,
    limit: Option<usize>,
    ignore_count: bool,
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

                self.rules.push(v.to_str()?.to_string());
            }
            Short('s') | Long("start") => {
                self.start = Some(args::parse(p, "-s/--start")?);
            }
            Short('z') | Long("time-zone") => {
                self.tz = Some(args::parse(p, "-z/--time-zone")?);
            }
            Long("rdate") => {
                self.dates.push(args::parse(p, "--rdate")?);
            }
            Long("exrule") => {
                let rule: String = args::parse(p, "--exrule")?;
                self.exclusion_rules.push(rule);
            }
            Long("exdate") => {
                self.exclusion_dates.push(args::parse(p, "--exdate")?);
            }
            Long("limit") => {
                self.limit = Some(args::parse(p, "--limit")?);
            }
            Long("ignore-count") => {
                self.ignore_count = true;
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

Any number of rules may be given. Their sequences are merged.
"#,
        );
        const START: Usage = Usage::flag(
            "-s/--start <datetime>",
            "The starting point for rules without their own DTSTART.",
            r#"
The starting point for rules without their own DTSTART.

This anchors every rule given: it supplies the first instant of each
sequence and the wall-clock defaults for rule parts that are absent.
"#,
        );
        const RDATE: Usage = Usage::flag(
            "--rdate <datetime>",
            "Adds one explicit datetime to the set.",
            r#"
Adds one explicit datetime to the set.

Explicit datetimes are merged with the rule sequences in chronological
order, with duplicates collapsed. This flag may be given any number of
times.
"#,
        );
        const EXRULE: Usage = Usage::flag(
            "--exrule <rule>",
            "Subtracts every datetime generated by this rule.",
            r#"
Subtracts every datetime generated by this rule.

The rule is parsed exactly like a positional <rule>. Any datetime in the
merged sequence naming the same instant as a datetime generated by this
rule is dropped. This flag may be given any number of times.
"#,
        );
        const EXDATE: Usage = Usage::flag(
            "--exdate <datetime>",
            "Subtracts one explicit datetime from the set.",
            r#"
Subtracts one explicit datetime from the set.

Any datetime in the merged sequence naming the same instant is dropped,
even when the two are written in different time zones. This flag may be
given any number of times.
"#,
        );
        const LIMIT: Usage = Usage::flag(
            "--limit <number>",
            "Caps the total number of datetimes emitted.",
            r#"
Caps the total number of datetimes emitted.

This is a fail-safe for unbounded sets, and composes with every rule's own
COUNT and UNTIL; whichever limit is reached first wins.
"#,
        );
        const IGNORE_COUNT: Usage = Usage::flag(
            "--ignore-count",
            "Disables the COUNT rule of every (inclusion) rule.",
            r#"
Disables the COUNT rule of every (inclusion) rule.

The COUNT of an `--exrule` still bounds what it excludes. This is mostly
useful together with `--limit` for peeking past a rule's own cap.
"#,
        );

        &[
            RULE,
            START,
            TimeZone::FLAG,
            RDATE,
            EXRULE,
            EXDATE,
            LIMIT,
            IGNORE_COUNT,
        ]
    }
}
