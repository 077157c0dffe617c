use {
    anyhow::Context,
    bstr::ByteSlice,
    jiff::civil,
};

use crate::{args::Usage, ical::ByWeekday, parse::FromBytes};

/// Provides parsing for the English name of a month.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Month(i8);

impl Month {
    /// Return the parsed month as an integer in the range `1..=12`.
    pub fn get(&self) -> i8 {
        self.0
    }
}

impl std::str::FromStr for Month {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Month> {
        if s.chars().all(|c| c.is_ascii_digit()) {
            let month = s.parse::<i8>().with_context(|| {
                format!("failed to parse `{s}` as an integer month")
            })?;
            anyhow::ensure!(
                1 <= month && month <= 12,
                "parsed `{month}` as an integer month, but it's not \
                 in the required range of `1..=12`",
            );
            return Ok(Month(month));
        }
        let month = match &*s.to_lowercase() {
            "january" | "jan" => 1,
            "february" | "feb" => 2,
            "march" | "mar" => 3,
            "april" | "apr" => 4,
            "may" => 5,
            "june" | "jun" => 6,
            "july" | "jul" => 7,
            "august" | "aug" => 8,
            "september" | "sept" | "sep" => 9,
            "october" | "oct" => 10,
            "november" | "nov" => 11,
            "december" | "dec" => 12,
            unk => anyhow::bail!("unrecognized month name/number: `{unk}`"),
        };
        Ok(Month(month))
    }
}

/// Provides parsing for Jiff's civil `Weekday` type.
#[derive(Clone, Debug)]
pub struct Weekday {
    weekday: civil::Weekday,
}

impl Weekday {
    pub const USAGE_WEEK_START: Usage = Usage::flag(
        "--week-start <weekday>",
        "The weekday on which weeks start (defaults to Monday).",
        r#"
The weekday on which weeks start (defaults to Monday).

This is what anchors week numbers (the `--week` flag) and the week windows
of weekly frequency rules.

Any day of the week may be given. They can be specified in the following way
(without regard for case):

Sunday, Sun, SU

Monday, Mon, MO

Tuesday, Tues, Tue, TU

Wednesday, Wed, WE

Thursday, Thurs, Thu, TH

Friday, Fri, FR

Saturday, Sat, SA
"#,
    );

    /// Return the parsed weekday.
    pub fn get(&self) -> civil::Weekday {
        self.weekday
    }
}

impl Default for Weekday {
    fn default() -> Weekday {
        Weekday { weekday: civil::Weekday::Monday }
    }
}

impl From<civil::Weekday> for Weekday {
    fn from(weekday: civil::Weekday) -> Weekday {
        Weekday { weekday }
    }
}

impl std::str::FromStr for Weekday {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Weekday> {
        Weekday::from_bytes(s.as_bytes())
    }
}

impl FromBytes for Weekday {
    type Err = anyhow::Error;

    fn from_bytes(s: &[u8]) -> anyhow::Result<Weekday> {
        use jiff::civil::Weekday::*;

        let weekday = match &*s.to_ascii_lowercase() {
            b"sunday" | b"sun" | b"su" => Sunday,
            b"monday" | b"mon" | b"mo" => Monday,
            b"tuesday" | b"tues" | b"tue" | b"tu" => Tuesday,
            b"wednesday" | b"wed" | b"we" => Wednesday,
            b"thursday" | b"thurs" | b"thu" | b"th" => Thursday,
            b"friday" | b"fri" | b"fr" => Friday,
            b"saturday" | b"sat" | b"sa" => Saturday,
            unk => anyhow::bail!(
                "unrecognized weekday: `{unk}`",
                unk = unk.as_bstr()
            ),
        };
        Ok(Weekday { weekday })
    }
}

impl std::fmt::Display for Weekday {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use jiff::civil::Weekday::*;

        let label = match self.get() {
            Sunday => "Sunday",
            Monday => "Monday",
            Tuesday => "Tuesday",
            Wednesday => "Wednesday",
            Thursday => "Thursday",
            Friday => "Friday",
            Saturday => "Saturday",
        };
        write!(f, "{label}")
    }
}

/// A scrappy comma delimited sequence of values.
///
/// This type doesn't have any requirements on `T` other than that it can be
/// parsed and printed. It also requires that `,` cannot appear within the
/// parse format of `T` (since this will try to split the sequence on `,`).
/// That is, there's no support for quoting or escaping the commas.
///
/// This does not impose any requirements on the order of the sequence. It
/// does require that the sequence is not empty though.
#[derive(Clone, Debug)]
pub struct CommaSequence<T>(Vec<T>);

impl<'a, T> IntoIterator for &'a CommaSequence<T> {
    type IntoIter = std::slice::Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> std::slice::Iter<'a, T> {
        self.0.iter()
    }
}

impl<T, E> std::str::FromStr for CommaSequence<T>
where
    T: std::str::FromStr<Err = E>,
    E: std::fmt::Display,
{
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<CommaSequence<T>> {
        let mut seq = vec![];
        for item in s.split(",") {
            seq.push(item.parse::<T>().map_err(|err| {
                anyhow::Error::msg(format!(
                    "failed to parse `{item}` \
                     within sequence `{s}`: {err}",
                ))
            })?);
        }
        anyhow::ensure!(!seq.is_empty(), "empty sequences are not allowed",);
        Ok(CommaSequence(seq))
    }
}

/// An inclusive range of integers.
///
/// This type doesn't have any requirements on `T` other than that it can be
/// parsed and printed, and it is assumed to be a signed integer. e.g.,
/// `i8`, `i16`, `i32` or `i64`. It also requires that `..` cannot appear
/// within the parse format of `T` (since this will try to split a range
/// based on `..`).
///
/// Note that this supports parsing just a single integer, e.g., `-5`. It
/// will be represented as if it were `-5..-5`.
///
/// If `start > end`, then the parser will return an error.
///
/// The format is `start[..end]`, where `start` and `end` are signed
/// integers.
#[derive(Clone, Debug)]
pub struct NumberRange<T> {
    start: T,
    end: T,
}

impl<T: Copy> NumberRange<T> {
    /// Return this number range as a standard library inclusive range.
    pub fn range(&self) -> std::ops::RangeInclusive<T> {
        self.start..=self.end
    }
}

impl<T, E> std::str::FromStr for NumberRange<T>
where
    T: std::str::FromStr<Err = E> + Copy + PartialOrd,
    E: std::fmt::Display,
{
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<NumberRange<T>> {
        let parse_one = |part: &str| -> anyhow::Result<T> {
            part.parse::<T>().map_err(|err| {
                anyhow::Error::msg(format!(
                    "failed to parse `{part}` as a single signed integer \
                     within `{s}`: {err}",
                ))
            })
        };
        let Some((start, end)) = s.split_once("..") else {
            let start = parse_one(s)?;
            let end = start;
            return Ok(NumberRange { start, end });
        };
        let start = parse_one(start)?;
        let end = parse_one(end)?;
        anyhow::ensure!(
            start <= end,
            "parsed ranges must have start <= end, but \
             `{s}` has start > end",
        );
        Ok(NumberRange { start, end })
    }
}

/// A range special purposed to "by weekday" in RFC 5545.
///
/// Specifically, a range of weekdays is allowed, but a range of *numbered*
/// weekdays is not. For numbered weekdays, only a singleton is allowed.
///
/// Also, this doesn't have any restrictions on the ranges parsed since any
/// day of the week might be the "start."
///
/// The format is `start[..end]`, where `start` and `end` are weekdays. Or
/// `numbered-weekday` where `numbered-weekday` is a single `ByWeekday`.
#[derive(Copy, Clone, Debug)]
pub enum ByWeekdays {
    /// A range implies that the start/end points *must* not be numbered.
    Range { start: civil::Weekday, end: civil::Weekday },
    /// A singleton weekday, which may be numbered.
    Singleton(ByWeekday),
}

impl ByWeekdays {
    /// Expands this range or singleton into individual BYDAY entries.
    pub fn entries(self) -> Vec<ByWeekday> {
        match self {
            ByWeekdays::Singleton(singleton) => vec![singleton],
            ByWeekdays::Range { start, end } => {
                // `Weekday::until` guarantees `0..=6`, and add one because
                // this is an inclusive range.
                let count = 1 + usize::try_from(start.until(end)).unwrap();
                start
                    .cycle_forward()
                    .take(count)
                    .map(ByWeekday::Any)
                    .collect()
            }
        }
    }
}

impl std::str::FromStr for ByWeekdays {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<ByWeekdays> {
        let Some((start, end)) = s.split_once("..") else {
            let singleton = s.parse::<ByWeekday>().with_context(|| {
                format!(
                    "failed to parse `{s}` as a \
                     single weekday or numbered weekday"
                )
            })?;
            return Ok(ByWeekdays::Singleton(singleton));
        };

        let start = start.parse::<ByWeekday>().with_context(|| {
            format!(
                "failed to parse `{start}` \
                 as a single weekday within the range `{s}`"
            )
        })?;
        let end = end.parse::<ByWeekday>().with_context(|| {
            format!(
                "failed to parse `{end}` \
                 as a single weekday within the range `{s}`"
            )
        })?;

        let start = match start {
            ByWeekday::Any(weekday) => weekday,
            ByWeekday::Numbered { .. } => {
                anyhow::bail!(
                    "numbered weekday `{start}` is not allowed in a range",
                )
            }
        };
        let end = match end {
            ByWeekday::Any(weekday) => weekday,
            ByWeekday::Numbered { .. } => {
                anyhow::bail!(
                    "numbered weekday `{end}` is not allowed in a range",
                )
            }
        };

        Ok(ByWeekdays::Range { start, end })
    }
}
