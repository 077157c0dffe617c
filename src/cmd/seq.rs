use std::io::Write;

use crate::{
    args::{
        self, Usage,
        flags::{self, ByWeekdays, CommaSequence, NumberRange},
    },
    datetime::DateTime,
    ical::{Frequency, RecurrenceRule},
};

const USAGE: &'static str = r#"
Expand a single recurrence rule into a sequence of datetimes.

Datetimes are generated in chronological order at a given frequency from the
given starting point. If a starting point is not given, then the current
time is used.

Unless the `-c/--count` or `-u/--until` flags are used, this command will
generate datetimes until Occur's maximum is reached. In lieu of those,
users may also choose to use programs like `head` to limit the output.

USAGE:
    occur seq <frequency> [<datetime>]

TIP:
    use -h for short docs and --help for long docs

EXAMPLES:
    The last work-day of each month, four times:

        $ occur seq monthly -c4 -w mon..fri --set-position -1 2024-06-01T09:00
        2024-06-28T09:00:00-04:00[America/New_York]
        2024-07-31T09:00:00-04:00[America/New_York]
        2024-08-30T09:00:00-04:00[America/New_York]
        2024-09-30T09:00:00-04:00[America/New_York]

    %snip-start%

    Every second Tuesday and Thursday at 09:00, starting from a Tuesday:

        $ occur seq weekly -i2 -w tue,thu -c4 2024-01-02T09:00
        2024-01-02T09:00:00-05:00[America/New_York]
        2024-01-04T09:00:00-05:00[America/New_York]
        2024-01-16T09:00:00-05:00[America/New_York]
        2024-01-18T09:00:00-05:00[America/New_York]

    Every Friday the 13th, forever (limited here by `head`):

        $ occur seq monthly -w fri -d 13 2024-01-01 | head -n3
        2024-09-13T00:00:00-04:00[America/New_York]
        2024-12-13T00:00:00-05:00[America/New_York]
        2025-06-13T00:00:00-04:00[America/New_York]

    The Monday of the 20th week of each year:

        $ occur seq yearly --week 20 -w mon -c3 2024-01-01T08:00
        2024-05-13T08:00:00-04:00[America/New_York]
        2025-05-12T08:00:00-04:00[America/New_York]
        2026-05-11T08:00:00-04:00[America/New_York]

    %snip-end%
REQUIRED ARGUMENTS:
%args%
OPTIONS:
%flags%
"#;

pub fn run(p: &mut lexopt::Parser) -> anyhow::Result<()> {
    let mut config = Config::default();
    args::configure(p, USAGE, &mut [&mut config])?;

    let mut wtr = std::io::stdout().lock();
    let rrule = config.recurrence_rule()?;
    for dt in rrule.iter().map(DateTime::from) {
        writeln!(wtr, "{dt}")?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Config {
    freq: Option<Frequency>,
    start: Option<DateTime>,
    count: Option<i64>,
    until: Option<DateTime>,
    interval: Option<i32>,
    by_month: Vec<CommaSequence<NumberRange<flags::Month>>>,
    by_week: Vec<CommaSequence<NumberRange<i8>>>,
    by_year_day: Vec<CommaSequence<NumberRange<i16>>>,
    by_month_day: Vec<CommaSequence<NumberRange<i8>>>,
    by_week_day: Vec<CommaSequence<ByWeekdays>>,
    by_hour: Vec<CommaSequence<NumberRange<i8>>>,
    by_minute: Vec<CommaSequence<NumberRange<i8>>>,
    by_second: Vec<CommaSequence<NumberRange<i8>>>,
    by_set_pos: Vec<CommaSequence<NumberRange<i32>>>,
    week_start: flags::Weekday,
}

impl Config {
    fn recurrence_rule(&self) -> anyhow::Result<RecurrenceRule> {
        let start = self
            .start
            .clone()
            .unwrap_or_else(DateTime::now)
            .get()
            .clone();
        let mut b = RecurrenceRule::builder(self.freq()?, start);
        b.interval(self.interval.unwrap_or(1))
            .week_start(self.week_start.get());
        for range in self.by_month.iter().flatten().map(|v| v.range()) {
            b.by_month(range.start().get()..=range.end().get());
        }
        for range in self.by_week.iter().flatten().map(|v| v.range()) {
            b.by_week(range);
        }
        for range in self.by_year_day.iter().flatten().map(|v| v.range()) {
            b.by_year_day(range);
        }
        for range in self.by_month_day.iter().flatten().map(|v| v.range()) {
            b.by_month_day(range);
        }
        for &byweekdays in self.by_week_day.iter().flatten() {
            b.by_week_day(byweekdays.entries());
        }
        for range in self.by_hour.iter().flatten().map(|v| v.range()) {
            b.by_hour(range);
        }
        for range in self.by_minute.iter().flatten().map(|v| v.range()) {
            b.by_minute(range);
        }
        for range in self.by_second.iter().flatten().map(|v| v.range()) {
            b.by_second(range);
        }
        for range in self.by_set_pos.iter().flatten().map(|v| v.range()) {
            b.by_set_position(range);
        }
        if let Some(count) = self.count {
            b.count(count);
        }
        if let Some(ref until) = self.until {
            b.until(until.get().clone());
        }
        b.build()
    }

    fn freq(&self) -> anyhow::Result<Frequency> {
        use anyhow::Context;

        self.freq.context("missing required <frequency>")
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

                if self.freq.is_none() {
                    self.freq = Some(v.to_str()?.parse()?);
                    return Ok(true);
                }
                if self.start.is_none() {
                    self.start = Some(v.to_str()?.parse()?);
                    return Ok(true);
                }
                return Ok(false);
            }
            Short('u') | Long("until") => {
                self.until = Some(args::parse(p, "-u/--until")?);
            }
            Short('c') | Long("count") => {
                self.count = Some(args::parse(p, "-c/--count")?);
            }
            Short('i') | Long("interval") => {
                self.interval = Some(args::parse(p, "-i/--interval")?);
            }
            Short('m') | Long("month") => {
                self.by_month.push(args::parse(p, "-m/--month")?);
            }
            Long("week") => {
                self.by_week.push(args::parse(p, "--week")?);
            }
            Long("doy") => {
                self.by_year_day.push(args::parse(p, "--doy")?);
            }
            Short('d') | Long("day") => {
                self.by_month_day.push(args::parse(p, "-d/--day")?);
            }
            Short('w') | Long("week-day") => {
                self.by_week_day.push(args::parse(p, "-w/--week-day")?);
            }
            Short('H') | Long("hour") => {
                self.by_hour.push(args::parse(p, "-H/--hour")?);
            }
            Short('M') | Long("minute") => {
                self.by_minute.push(args::parse(p, "-M/--minute")?);
            }
            Short('S') | Long("second") => {
                self.by_second.push(args::parse(p, "-S/--second")?);
            }
            Long("set-position") => {
                self.by_set_pos.push(args::parse(p, "--set-position")?);
            }
            Long("week-start") => {
                self.week_start = args::parse_bytes(p, "--week-start")?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn usage(&self) -> &[Usage] {
        const COUNT: Usage = Usage::flag(
            "-c/--count <number>",
            "Limits the total number of datetimes generated.",
            r#"
Limits the total number of datetimes generated.

This corresponds to the COUNT rule of RFC 5545: only datetimes at or after
the starting point use up the count. It composes with `-u/--until`;
whichever limit is reached first ends the sequence.
"#,
        );
        const UNTIL: Usage = Usage::flag(
            "-u/--until <datetime>",
            "Generates datetimes up to and including this one.",
            r#"
Generates datetimes up to and including this one.

A datetime exactly equal to this bound is included in the sequence; the
first datetime strictly greater ends it. It composes with `-c/--count`;
whichever limit is reached first ends the sequence.
"#,
        );
        const INTERVAL: Usage = Usage::flag(
            "-i/--interval <number>",
            "Sets the interval at which the sequence repeats.",
            r#"
Sets the interval at which the sequence repeats.

For example, `-i2` with weekly frequency means every other week. The
interval must be at least 1, which is also the default.
"#,
        );
        const BY_MONTH: Usage = Usage::flag(
            "-m/--month <month-list>",
            "Provide one or more months of the year.",
            r#"
Provide one or more months of the year.

Legal values are the integers 1 through 12, or English month names.

Contiguous ranges of months may be specified. For example, `5..7`
corresponds to the months May, June and July.

Multiple months or ranges can be specified with repeated use of this flag,
or by separating values with a comma. For example, `2,5..7,12` corresponds
to the months February, May, June, July and December.

When generating a sequence at yearly frequency, this expands the set of
datetimes generated at each interval. Otherwise, this limits the set of
datetimes generated at each interval.
"#,
        );
        const BY_WEEK: Usage = Usage::flag(
            "--week <week-number-list>",
            "Provide one or more weeks of the year.",
            r#"
Provide one or more weeks of the year.

Legal values are the integers 1 through 53 or -53 through -1. Negative
weeks count backwards from the end. A 53rd week only exists in "long"
years.

Week numbering follows RFC 5545: weeks start on the day given by
`--week-start` (Monday by default), and week 1 of a year is the first week
with at least four days in that year.

This flag is only allowed at yearly frequency.

Contiguous ranges and comma separated values are accepted, as with
`-m/--month`.
"#,
        );
        const BY_YEAR_DAY: Usage = Usage::flag(
            "--doy <day-of-year-list>",
            "Provide one or more days of the year.",
            r#"
Provide one or more days of the year.

Legal values are the integers 1 through 366 or -366 through -1. Negative
days count backwards from the last day of the year.

Contiguous ranges and comma separated values are accepted, as with
`-m/--month`.
"#,
        );
        const BY_MONTH_DAY: Usage = Usage::flag(
            "-d/--day <day-of-month-list>",
            "Provide one or more days of the month.",
            r#"
Provide one or more days of the month.

Legal values are the integers 1 through 31 or -31 through -1. Negative
days count backwards from the last day of the month, so `-1` is always the
last day.

When both positive and negative days are given, a day matching either is
included. For example, `1,-1` selects both the first and the last day of
the month.

Contiguous ranges and comma separated values are accepted, as with
`-m/--month`.
"#,
        );
        const BY_WEEK_DAY: Usage = Usage::flag(
            "-w/--week-day <weekday-list>",
            "Provide one or more days of the week.",
            r#"
Provide one or more days of the week.

Weekdays are spelled with English names, e.g., `mon` or `friday`.

A weekday may carry a numbered prefix, e.g., `1-fri` is the first Friday
and `-1-fri` the last Friday of the month (at monthly frequency) or of the
year (at yearly frequency). Numbered weekdays are only allowed at those
two frequencies.

Contiguous ranges of plain weekdays may be specified, e.g., `mon..fri`.
Multiple entries or ranges can be given with repeated use of this flag, or
by separating values with a comma.
"#,
        );
        const BY_HOUR: Usage = Usage::flag(
            "-H/--hour <hour-list>",
            "Provide one or more hours of the day.",
            r#"
Provide one or more hours of the day.

Legal values are the integers 0 through 23.

Contiguous ranges and comma separated values are accepted, as with
`-m/--month`.
"#,
        );
        const BY_MINUTE: Usage = Usage::flag(
            "-M/--minute <minute-list>",
            "Provide one or more minutes of the hour.",
            r#"
Provide one or more minutes of the hour.

Legal values are the integers 0 through 59.

Contiguous ranges and comma separated values are accepted, as with
`-m/--month`.
"#,
        );
        const BY_SECOND: Usage = Usage::flag(
            "-S/--second <second-list>",
            "Provide one or more seconds of the minute.",
            r#"
Provide one or more seconds of the minute.

Legal values are the integers 0 through 59.

Contiguous ranges and comma separated values are accepted, as with
`-m/--month`.
"#,
        );
        const BY_SET_POS: Usage = Usage::flag(
            "--set-position <position-list>",
            "Select datetimes by position within each interval.",
            r#"
Select datetimes by position within each interval.

Legal values are the integers 1 through 366 or -366 through -1. After the
other rules have produced the candidate datetimes of one interval, `1`
selects the first candidate, `2` the second, `-1` the last and so on.
Positions past either end of the candidate list select nothing.

Requires at least one other rule-limiting or rule-expanding flag.

Comma separated values are accepted.
"#,
        );

        &[
            Frequency::USAGE,
            DateTime::ARG,
            COUNT,
            UNTIL,
            INTERVAL,
            BY_MONTH,
            BY_WEEK,
            BY_YEAR_DAY,
            BY_MONTH_DAY,
            BY_WEEK_DAY,
            BY_HOUR,
            BY_MINUTE,
            BY_SECOND,
            BY_SET_POS,
            flags::Weekday::USAGE_WEEK_START,
        ]
    }
}
