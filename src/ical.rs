use std::{collections::VecDeque, sync::Arc};

use {
    anyhow::Context,
    jiff::{
        ToSpan, Zoned,
        civil::{Date, DateTime, Time, Weekday},
        tz::{AmbiguousOffset, TimeZone},
    },
};

use crate::yearmap::YearMap;

// The expansion strategy here is the "year table" one: every outer iteration
// builds the calendar tables for the cursor's year, selects a window of
// day-of-year offsets for the current period, filters that window through
// the BY* rules and then pairs each surviving day with a set of times. That
// trades a bit of table building for filters that are all trivial lookups,
// and it keeps every BY* rule uniform no matter the frequency.
//
// The candidate datetimes for one period are buffered and drained one at a
// time, so a `RecurrenceIter` never holds more than one period's worth of
// output. For YEARLY rules with big BYSECOND sets that buffer can get large,
// but such rules are vanishingly rare in practice.

/// The RFC 5545 recurrence rule implementation.
#[derive(Clone, Debug)]
pub struct RecurrenceRule {
    inner: Arc<RecurrenceRuleInner>,
}

#[derive(Debug)]
struct RecurrenceRuleInner {
    freq: Frequency,
    zoned_start: Zoned,
    civil_start: DateTime,
    zoned_until: Option<Zoned>,
    count: Option<i64>,
    interval: i32,
    by_month: Box<[i8]>,
    // can be negative
    by_week: Box<[i8]>,
    // can be negative
    by_year_day: Box<[i16]>,
    by_month_day: Box<[i8]>,
    // the negative partition of BYMONTHDAY
    by_month_day_neg: Box<[i8]>,
    // weekday numbers, 0..=6 with 0=Monday
    by_week_day: Box<[i8]>,
    // the ordinalled partition of BYDAY: (ordinal, weekday number)
    by_week_day_rel: Box<[(i8, i8)]>,
    by_hour: Box<[i8]>,
    by_minute: Box<[i8]>,
    by_second: Box<[i8]>,
    // can be negative
    by_set_pos: Box<[i32]>,
    week_start: Weekday,
    // Which of the frequency defaults were injected at build time. Injected
    // values behave like any other, but they are not echoed by `Display`.
    injected_by_month: bool,
    injected_by_month_day: bool,
    injected_by_week_day: bool,
}

impl RecurrenceRule {
    /// Returns a builder for constructing a `RecurrenceRule`.
    ///
    /// The frequency and the starting point are the only two things required
    /// to create a rule.
    pub fn builder(freq: Frequency, start: Zoned) -> RecurrenceRuleBuilder {
        RecurrenceRuleBuilder::new(freq, start)
    }

    /// Parses an RFC 5545 `RECUR` property value, e.g.,
    /// `FREQ=WEEKLY;INTERVAL=2;BYDAY=TU,TH`.
    ///
    /// An optional leading `RRULE:` tag is accepted and ignored. The rule
    /// text may carry its own starting point as a `DTSTART` part (in the
    /// compact `YYYYMMDD` or `YYYYMMDDTHHMMSS[Z]` forms). When `anchor` is
    /// given it always wins; when neither is present, this fails with a
    /// [`MissingStart`] error (recoverable via `anyhow`'s downcasting).
    ///
    /// Civil datetimes in the text (`DTSTART`, `UNTIL` without a trailing
    /// `Z`) are interpreted in `tz`.
    pub fn parse(
        text: &str,
        tz: &TimeZone,
        anchor: Option<&Zoned>,
    ) -> anyhow::Result<RecurrenceRule> {
        let text = text.trim();
        let text = text.strip_prefix("RRULE:").unwrap_or(text);

        fn values<T: std::str::FromStr>(
            name: &str,
            value: &str,
        ) -> anyhow::Result<Vec<T>>
        where
            <T as std::str::FromStr>::Err: std::fmt::Display,
        {
            let mut parsed = vec![];
            for v in value.split(',') {
                parsed.push(v.parse::<T>().map_err(|err| {
                    anyhow::anyhow!(
                        "failed to parse `{v}` in {name} part: {err}"
                    )
                })?);
            }
            Ok(parsed)
        }

        let mut freq: Option<Frequency> = None;
        let mut dtstart: Option<Zoned> = None;
        let mut interval: Option<i32> = None;
        let mut count: Option<i64> = None;
        let mut until: Option<Zoned> = None;
        let mut week_start: Option<Weekday> = None;
        let mut by_month: Vec<i8> = vec![];
        let mut by_week: Vec<i8> = vec![];
        let mut by_year_day: Vec<i16> = vec![];
        let mut by_month_day: Vec<i8> = vec![];
        let mut by_week_day: Vec<ByWeekday> = vec![];
        let mut by_hour: Vec<i8> = vec![];
        let mut by_minute: Vec<i8> = vec![];
        let mut by_second: Vec<i8> = vec![];
        let mut by_set_pos: Vec<i32> = vec![];

        for part in text.split(';') {
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').with_context(|| {
                format!("recurrence rule part `{part}` is missing its value")
            })?;
            match &*key.to_ascii_uppercase() {
                "FREQ" => freq = Some(value.parse()?),
                "DTSTART" => {
                    dtstart = Some(parse_compact_datetime(value, tz)?);
                }
                "INTERVAL" => {
                    interval = Some(value.parse().with_context(|| {
                        format!("failed to parse INTERVAL value `{value}`")
                    })?);
                }
                "COUNT" => {
                    count = Some(value.parse().with_context(|| {
                        format!("failed to parse COUNT value `{value}`")
                    })?);
                }
                "UNTIL" => until = Some(parse_compact_datetime(value, tz)?),
                "WKST" => week_start = Some(parse_weekday_code(value)?),
                "BYMONTH" => by_month = values("BYMONTH", value)?,
                "BYWEEKNO" => by_week = values("BYWEEKNO", value)?,
                "BYYEARDAY" => by_year_day = values("BYYEARDAY", value)?,
                "BYMONTHDAY" => by_month_day = values("BYMONTHDAY", value)?,
                "BYDAY" => {
                    for v in value.split(',') {
                        by_week_day.push(parse_byday_code(v)?);
                    }
                }
                "BYHOUR" => by_hour = values("BYHOUR", value)?,
                "BYMINUTE" => by_minute = values("BYMINUTE", value)?,
                "BYSECOND" => by_second = values("BYSECOND", value)?,
                "BYSETPOS" => by_set_pos = values("BYSETPOS", value)?,
                unk => {
                    anyhow::bail!("unrecognized recurrence rule part `{unk}`")
                }
            }
        }

        let freq = freq.context("recurrence rule has no FREQ part")?;
        let start = match anchor.cloned().or(dtstart) {
            Some(start) => start,
            None => return Err(anyhow::Error::new(MissingStart(()))),
        };
        let mut builder = RecurrenceRule::builder(freq, start);
        if let Some(interval) = interval {
            builder.interval(interval);
        }
        if let Some(count) = count {
            builder.count(count);
        }
        if let Some(until) = until {
            builder.until(until);
        }
        if let Some(week_start) = week_start {
            builder.week_start(week_start);
        }
        builder
            .by_month(by_month)
            .by_week(by_week)
            .by_year_day(by_year_day)
            .by_month_day(by_month_day)
            .by_week_day(by_week_day)
            .by_hour(by_hour)
            .by_minute(by_minute)
            .by_second(by_second)
            .by_set_position(by_set_pos);
        builder.build()
    }

    /// Returns an iterator over all datetimes in this recurrence rule.
    ///
    /// Note that the iterator may be "infinite," in the sense that it
    /// returns datetimes all the way up to Jiff's supported maximum
    /// datetime. Callers should therefore specify an `until` rule, a
    /// `count` rule, or call `take(N)` to limit the number of datetimes.
    pub fn iter(&self) -> RecurrenceIter<'_> {
        RecurrenceIter {
            rule: self,
            cur: Some(self.inner.civil_start),
            remaining: self.inner.count,
            buf: VecDeque::new(),
        }
    }

    /// The starting point of this rule.
    pub fn start(&self) -> &Zoned {
        &self.inner.zoned_start
    }

    /// The COUNT rule, if one was given.
    pub fn count(&self) -> Option<i64> {
        self.inner.count
    }

    /// Returns the time zone that datetimes emitted by this rule should be
    /// in.
    fn time_zone(&self) -> &TimeZone {
        self.inner.zoned_start.time_zone()
    }
}

impl<'r> IntoIterator for &'r RecurrenceRule {
    type IntoIter = RecurrenceIter<'r>;
    type Item = Zoned;

    fn into_iter(self) -> RecurrenceIter<'r> {
        self.iter()
    }
}

impl std::fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        fn list<T: std::fmt::Display>(
            f: &mut std::fmt::Formatter,
            name: &str,
            values: &[T],
        ) -> std::fmt::Result {
            if values.is_empty() {
                return Ok(());
            }
            write!(f, ";{name}=")?;
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{v}")?;
            }
            Ok(())
        }

        let r = &*self.inner;
        write!(f, "FREQ={}", r.freq)?;
        if r.interval != 1 {
            write!(f, ";INTERVAL={}", r.interval)?;
        }
        if let Some(count) = r.count {
            write!(f, ";COUNT={count}")?;
        }
        if let Some(ref until) = r.zoned_until {
            let utc = until.timestamp().to_zoned(TimeZone::UTC).datetime();
            write!(
                f,
                ";UNTIL={:04}{:02}{:02}T{:02}{:02}{:02}Z",
                utc.year(),
                utc.month(),
                utc.day(),
                utc.hour(),
                utc.minute(),
                utc.second(),
            )?;
        }
        if r.week_start != Weekday::Monday {
            write!(f, ";WKST={}", weekday_code(r.week_start))?;
        }
        if !r.injected_by_month {
            list(f, "BYMONTH", &r.by_month)?;
        }
        list(f, "BYWEEKNO", &r.by_week)?;
        list(f, "BYYEARDAY", &r.by_year_day)?;
        if !r.injected_by_month_day
            && !(r.by_month_day.is_empty() && r.by_month_day_neg.is_empty())
        {
            write!(f, ";BYMONTHDAY=")?;
            let both =
                r.by_month_day.iter().chain(r.by_month_day_neg.iter());
            for (i, v) in both.enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{v}")?;
            }
        }
        if !r.injected_by_week_day
            && !(r.by_week_day.is_empty() && r.by_week_day_rel.is_empty())
        {
            write!(f, ";BYDAY=")?;
            let mut first = true;
            for &wd in r.by_week_day.iter() {
                if !first {
                    write!(f, ",")?;
                }
                first = false;
                write!(f, "{}", weekday_number_code(wd))?;
            }
            for &(nth, wd) in r.by_week_day_rel.iter() {
                if !first {
                    write!(f, ",")?;
                }
                first = false;
                write!(f, "{nth}{}", weekday_number_code(wd))?;
            }
        }
        list(f, "BYHOUR", &r.by_hour)?;
        list(f, "BYMINUTE", &r.by_minute)?;
        list(f, "BYSECOND", &r.by_second)?;
        list(f, "BYSETPOS", &r.by_set_pos)?;
        Ok(())
    }
}

/// An iterator over the datetimes generated by one recurrence rule.
///
/// The iterator holds a single civil cursor that anchors the current
/// period. Each step of the outer loop expands that period into a buffer of
/// zoned datetimes (already screened against the start, UNTIL and COUNT
/// rules) and then advances the cursor by the rule's interval. Items are
/// popped from the buffer until it runs dry.
#[derive(Clone, Debug)]
pub struct RecurrenceIter<'r> {
    rule: &'r RecurrenceRule,
    /// The anchor of the current period. `None` when iteration has ceased.
    cur: Option<DateTime>,
    /// How many more datetimes COUNT permits. `None` when the rule has no
    /// COUNT or when the caller asked for it to be ignored.
    remaining: Option<i64>,
    /// Screened output for the current period, oldest first.
    buf: VecDeque<Zoned>,
}

impl<'r> RecurrenceIter<'r> {
    /// Disables the rule's COUNT rule for this iteration.
    ///
    /// This is used by wrappers that need to count *accepted* occurrences
    /// themselves, e.g., when occurrences failing an external constraint
    /// should not use up the rule's COUNT budget.
    pub fn ignore_count(mut self) -> RecurrenceIter<'r> {
        self.remaining = None;
        self
    }

    /// Expands the period anchored at the current cursor into `self.buf`,
    /// then advances the cursor. The cursor becomes `None` when iteration
    /// is finished.
    fn fill_period(&mut self) {
        let Some(cur) = self.cur else { return };
        let r = &*self.rule.inner;
        let map = YearMap::new(cur.year());

        let times = time_set(r, cur);
        let candidates = if times.is_empty() {
            vec![]
        } else {
            let days = day_set(r, &map, cur);
            civil_candidates(r, &map, &days, &times)
        };

        let mut terminated = false;
        'screen: for dt in candidates {
            for zdt in to_zoned(self.rule.time_zone(), dt) {
                if zdt < r.zoned_start {
                    continue;
                }
                if let Some(ref until) = r.zoned_until {
                    if &zdt > until {
                        terminated = true;
                        break 'screen;
                    }
                }
                self.buf.push_back(zdt);
                if let Some(ref mut remaining) = self.remaining {
                    *remaining -= 1;
                    if *remaining == 0 {
                        terminated = true;
                        break 'screen;
                    }
                }
            }
        }
        self.cur = if terminated { None } else { advance(r, cur) };
    }
}

impl<'r> Iterator for RecurrenceIter<'r> {
    type Item = Zoned;

    fn next(&mut self) -> Option<Zoned> {
        loop {
            if let Some(zdt) = self.buf.pop_front() {
                return Some(zdt);
            }
            self.cur?;
            self.fill_period();
        }
    }
}

impl<'r> std::iter::FusedIterator for RecurrenceIter<'r> {}

/// Computes the window of day-of-year offsets for the period anchored at
/// `cur`, filtered through every day-level BY* rule. The surviving offsets
/// are returned in ascending order.
fn day_set(
    r: &RecurrenceRuleInner,
    map: &YearMap,
    cur: DateTime,
) -> Vec<usize> {
    let doy = usize::from(cur.date().day_of_year().unsigned_abs()) - 1;
    let (win_start, win_end) = match r.freq {
        Frequency::Yearly => (0, map.len()),
        Frequency::Monthly => {
            let range = map.month_range(cur.month());
            (range.start, range.end)
        }
        Frequency::Weekly => {
            // The window begins at the nearest week-start-aligned day at or
            // before the cursor. In the first period that start may fall
            // before the rule's starting point (or even in the prior year,
            // in which case it is clamped to January 1st); such days are
            // screened out against the starting point later.
            let wkst = i32::from(r.week_start.to_monday_zero_offset());
            let wd = i32::from(cur.date().weekday().to_monday_zero_offset());
            let back = (wd - wkst).rem_euclid(7) as usize;
            let start = doy.saturating_sub(back);
            (start, (start + 7).min(map.table_len()))
        }
        Frequency::Daily
        | Frequency::Hourly
        | Frequency::Minutely
        | Frequency::Secondly => (doy, doy + 1),
    };

    let week_mask =
        if matches!(r.freq, Frequency::Yearly) && !r.by_week.is_empty() {
            Some(week_number_mask(r, map))
        } else {
            None
        };
    let rel_mask = if r.by_week_day_rel.is_empty() {
        None
    } else {
        Some(relative_weekday_mask(r, map, cur))
    };

    let mut days = Vec::new();
    for d in win_start..win_end {
        if !r.by_month.is_empty() && !r.by_month.contains(&map.month(d)) {
            continue;
        }
        if let Some(ref mask) = week_mask {
            if !mask[d] {
                continue;
            }
        }
        if !r.by_year_day.is_empty() {
            let len = map.len() as i16;
            let next_len = map.next_len() as i16;
            let di = d as i16;
            let keep = if d < map.len() {
                r.by_year_day.contains(&(di + 1))
                    || r.by_year_day.contains(&(di - len))
            } else {
                // The tail of the window is in the next year, so test
                // against next year's day numbers.
                r.by_year_day.contains(&(di + 1 - len))
                    || r.by_year_day.contains(&(di - len - next_len))
            };
            if !keep {
                continue;
            }
        }
        if !r.by_month_day.is_empty() || !r.by_month_day_neg.is_empty() {
            // A day passes when either the positive or the negative rule
            // matches it, so that e.g. BYMONTHDAY=1,-1 selects both ends
            // of the month.
            let keep = r.by_month_day.contains(&map.month_day(d))
                || r.by_month_day_neg.contains(&map.month_day_neg(d));
            if !keep {
                continue;
            }
        }
        if !r.by_week_day.is_empty()
            && !r.by_week_day.contains(&map.weekday(d))
        {
            continue;
        }
        if let Some(ref mask) = rel_mask {
            if !mask[d] {
                continue;
            }
        }
        days.push(d);
    }
    days
}

/// Computes the set of times-of-day to pair with each surviving day, in
/// ascending order.
///
/// For daily and slower frequencies this is the full cross product of the
/// BYHOUR/BYMINUTE/BYSECOND rules, each defaulting to the corresponding
/// field of the starting point. For faster frequencies the fields at and
/// above the frequency's unit come from the cursor instead, and when the
/// cursor's value is rejected by the corresponding BY* rule the period is
/// empty.
fn time_set(r: &RecurrenceRuleInner, cur: DateTime) -> Vec<Time> {
    let start = r.civil_start.time();
    let subsec = start.subsec_nanosecond();
    let default_hour = [start.hour()];
    let default_minute = [start.minute()];
    let default_second = [start.second()];
    let pick = |set: &[i8], default: &[i8; 1]| -> Vec<i8> {
        if set.is_empty() { default.to_vec() } else { set.to_vec() }
    };

    let (hours, minutes, seconds) = match r.freq {
        Frequency::Yearly
        | Frequency::Monthly
        | Frequency::Weekly
        | Frequency::Daily => (
            pick(&r.by_hour, &default_hour),
            pick(&r.by_minute, &default_minute),
            pick(&r.by_second, &default_second),
        ),
        Frequency::Hourly => {
            if !r.by_hour.is_empty() && !r.by_hour.contains(&cur.hour()) {
                return vec![];
            }
            (
                vec![cur.hour()],
                pick(&r.by_minute, &default_minute),
                pick(&r.by_second, &default_second),
            )
        }
        Frequency::Minutely => {
            if (!r.by_hour.is_empty() && !r.by_hour.contains(&cur.hour()))
                || (!r.by_minute.is_empty()
                    && !r.by_minute.contains(&cur.minute()))
            {
                return vec![];
            }
            (
                vec![cur.hour()],
                vec![cur.minute()],
                pick(&r.by_second, &default_second),
            )
        }
        Frequency::Secondly => {
            if (!r.by_hour.is_empty() && !r.by_hour.contains(&cur.hour()))
                || (!r.by_minute.is_empty()
                    && !r.by_minute.contains(&cur.minute()))
                || (!r.by_second.is_empty()
                    && !r.by_second.contains(&cur.second()))
            {
                return vec![];
            }
            (vec![cur.hour()], vec![cur.minute()], vec![cur.second()])
        }
    };

    let mut times =
        Vec::with_capacity(hours.len() * minutes.len() * seconds.len());
    for &hour in hours.iter() {
        for &minute in minutes.iter() {
            for &second in seconds.iter() {
                times.push(jiff::civil::time(hour, minute, second, subsec));
            }
        }
    }
    times
}

/// Computes the week number mask for BYWEEKNO: a boolean per table offset
/// saying whether that day belongs to one of the requested weeks.
///
/// Week numbering follows RFC 5545: weeks start on the rule's week start,
/// and week one of a year is the first week with at least four days in that
/// year. Days in the leading and trailing partial weeks of the year belong
/// to the neighboring year's numbering, which is why the prior year's last
/// week and the next year's first week have to be probed as well.
fn week_number_mask(r: &RecurrenceRuleInner, map: &YearMap) -> Vec<bool> {
    let mut mask = vec![false; map.table_len()];
    let year_len = map.len() as i32;
    let wkst = i32::from(r.week_start.to_monday_zero_offset());
    let jan1_weekday = i32::from(map.first_weekday());

    let first_wkst = (7 - jan1_weekday + wkst).rem_euclid(7);
    let (no1_wkst, week_year_len) = if first_wkst >= 4 {
        // Week one began in the prior year: this year's numbered weeks
        // include the leading partial week.
        (0, year_len + (jan1_weekday - wkst).rem_euclid(7))
    } else {
        (first_wkst, year_len - first_wkst)
    };
    let num_weeks = week_year_len / 7 + (week_year_len % 7) / 4;

    let week_offset = |week: i32| -> i32 {
        if week > 1 {
            let mut i = no1_wkst + (week - 1) * 7;
            if no1_wkst != first_wkst {
                i -= 7 - first_wkst;
            }
            i
        } else {
            no1_wkst
        }
    };

    for &week in r.by_week.iter() {
        let mut week = i32::from(week);
        if week < 0 {
            week += num_weeks + 1;
        }
        if week < 1 || week > num_weeks {
            continue;
        }
        fill_week(&mut mask, map, week_offset(week), wkst);
    }

    if r.by_week.contains(&1) {
        // Week one of the *next* year may claim days in this year's tail.
        let i = week_offset(num_weeks + 1);
        if i < year_len {
            fill_week(&mut mask, map, i, wkst);
        }
    }

    if no1_wkst > 0 {
        // The leading `no1_wkst` days belong to the prior year's last
        // week.
        let last_week_requested = if r.by_week.contains(&-1) {
            true
        } else if let Ok(prev_jan1) = Date::new(map.year() - 1, 1, 1) {
            let prev_jan1_weekday =
                i32::from(prev_jan1.weekday().to_monday_zero_offset());
            let prev_len: i32 =
                if prev_jan1.in_leap_year() { 366 } else { 365 };
            let prev_first_wkst =
                (7 - prev_jan1_weekday + wkst).rem_euclid(7);
            let prev_num_weeks = if prev_first_wkst >= 4 {
                52 + ((prev_len
                    + (prev_jan1_weekday - wkst).rem_euclid(7))
                    % 7)
                    / 4
            } else {
                52 + ((year_len - no1_wkst) % 7) / 4
            };
            i8::try_from(prev_num_weeks)
                .map(|n| r.by_week.contains(&n))
                .unwrap_or(false)
        } else {
            false
        };
        if last_week_requested {
            for i in 0..no1_wkst as usize {
                mask[i] = true;
            }
        }
    }

    mask
}

/// Marks up to seven days of the week starting at table offset `start`,
/// stopping early when the next day would begin a new week. The early stop
/// is what makes the partial weeks at the year boundary come out right.
fn fill_week(mask: &mut [bool], map: &YearMap, start: i32, wkst: i32) {
    let Ok(mut i) = usize::try_from(start) else { return };
    for _ in 0..7 {
        if i >= mask.len() {
            break;
        }
        mask[i] = true;
        i += 1;
        if i >= map.table_len() || i32::from(map.weekday(i)) == wkst {
            break;
        }
    }
}

/// Computes the mask for the ordinalled BYDAY entries ("the second
/// Tuesday", "the last Friday"): a boolean per table offset.
///
/// Each ordinal is resolved within one or more ranges of days: the current
/// month at monthly frequency; at yearly frequency each month of BYMONTH,
/// or the whole year when BYMONTH is absent.
fn relative_weekday_mask(
    r: &RecurrenceRuleInner,
    map: &YearMap,
    cur: DateTime,
) -> Vec<bool> {
    let mut mask = vec![false; map.table_len()];
    let mut ranges = Vec::new();
    match r.freq {
        Frequency::Monthly => ranges.push(map.month_range(cur.month())),
        Frequency::Yearly if !r.by_month.is_empty() => {
            ranges.extend(r.by_month.iter().map(|&m| map.month_range(m)));
        }
        Frequency::Yearly => ranges.push(0..map.len()),
        // Ordinalled weekdays are rejected at build time for every other
        // frequency.
        _ => unreachable!(),
    }
    for range in ranges {
        let first = range.start as i64;
        let last = range.end as i64 - 1;
        for &(nth, weekday) in r.by_week_day_rel.iter() {
            let weekday = i64::from(weekday);
            let mut i = if nth > 0 {
                first + (i64::from(nth) - 1) * 7
            } else {
                last + (i64::from(nth) + 1) * 7
            };
            if i < first || i > last {
                continue;
            }
            let wd = i64::from(map.weekday(i as usize));
            if nth > 0 {
                i += (7 - wd + weekday).rem_euclid(7);
            } else {
                i -= (wd - weekday).rem_euclid(7);
            }
            if first <= i && i <= last {
                mask[i as usize] = true;
            }
        }
    }
    mask
}

/// Pairs surviving days with the time set to build this period's civil
/// candidates, in ascending order. When BYSETPOS is present, the selection
/// indexes into the flat (day, time) product.
fn civil_candidates(
    r: &RecurrenceRuleInner,
    map: &YearMap,
    days: &[usize],
    times: &[Time],
) -> Vec<DateTime> {
    let mut candidates = Vec::new();
    if r.by_set_pos.is_empty() {
        for &d in days {
            let Some(date) = map.date(d) else { continue };
            for &time in times {
                candidates.push(date.to_datetime(time));
            }
        }
        return candidates;
    }

    let product_len = days.len() * times.len();
    let mut picked = Vec::with_capacity(r.by_set_pos.len());
    for &pos in r.by_set_pos.iter() {
        let index = if pos > 0 {
            i64::from(pos) - 1
        } else {
            product_len as i64 + i64::from(pos)
        };
        if 0 <= index && index < product_len as i64 {
            picked.push(index as usize);
        }
    }
    // The product is ordered, so selecting in index order keeps the
    // candidates ascending. Duplicate positions collapse.
    picked.sort_unstable();
    picked.dedup();
    for index in picked {
        let Some(date) = map.date(days[index / times.len()]) else {
            continue;
        };
        candidates.push(date.to_datetime(times[index % times.len()]));
    }
    candidates
}

/// Converts a civil candidate into zero, one or two zoned datetimes.
///
/// RFC 5545 explicitly says that a time that does not exist in the rule's
/// time zone is skipped. A repeated time is emitted at both instants,
/// earlier offset first; emitting "too much" beats silently guessing which
/// of the two the rule meant.
fn to_zoned(tz: &TimeZone, dt: DateTime) -> Vec<Zoned> {
    match tz.to_ambiguous_zoned(dt).offset() {
        AmbiguousOffset::Unambiguous { offset } => offset
            .to_timestamp(dt)
            .ok()
            .map(|ts| ts.to_zoned(tz.clone()))
            .into_iter()
            .collect(),
        AmbiguousOffset::Gap { .. } => vec![],
        AmbiguousOffset::Fold { before, after } => {
            let mut zdts = Vec::with_capacity(2);
            if let Ok(ts) = before.to_timestamp(dt) {
                zdts.push(ts.to_zoned(tz.clone()));
            }
            if let Ok(ts) = after.to_timestamp(dt) {
                zdts.push(ts.to_zoned(tz.clone()));
            }
            zdts
        }
    }
}

/// Advances the cursor by one interval of the rule's frequency. Returns
/// `None` when the next period would be outside Jiff's supported range,
/// which ends iteration.
fn advance(r: &RecurrenceRuleInner, cur: DateTime) -> Option<DateTime> {
    let interval = i64::from(r.interval);
    match r.freq {
        Frequency::Yearly => {
            let year = i16::try_from(i64::from(cur.year()) + interval).ok()?;
            let date = Date::new(year, cur.month(), 1).ok()?;
            Some(date.to_datetime(cur.time()))
        }
        Frequency::Monthly => {
            let month0 = i64::from(cur.month()) - 1 + interval;
            let year =
                i16::try_from(i64::from(cur.year()) + month0 / 12).ok()?;
            // month0 is non-negative, so this is in 1..=12.
            let month = (month0 % 12 + 1) as i8;
            let date = Date::new(year, month, 1).ok()?;
            Some(date.to_datetime(cur.time()))
        }
        Frequency::Weekly => {
            let wkst = i64::from(r.week_start.to_monday_zero_offset());
            let wd = i64::from(cur.date().weekday().to_monday_zero_offset());
            let delta = interval * 7 - (wd - wkst).rem_euclid(7);
            cur.checked_add(delta.days()).ok()
        }
        Frequency::Daily => cur.checked_add(interval.days()).ok(),
        Frequency::Hourly => cur.checked_add(interval.hours()).ok(),
        Frequency::Minutely => cur.checked_add(interval.minutes()).ok(),
        Frequency::Secondly => cur.checked_add(interval.seconds()).ok(),
    }
}

/// The error returned when a recurrence rule has no starting point.
///
/// Every expansion is anchored on a starting datetime: it supplies the
/// wall-clock defaults and the time zone. Rule text without a `DTSTART`
/// part can only be expanded when the caller provides an anchor. Callers
/// that need to distinguish this failure from a malformed rule can recover
/// it with `anyhow::Error::downcast_ref`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MissingStart(());

impl std::fmt::Display for MissingStart {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "recurrence rule has no starting point \
             (expected a DTSTART part or an explicit anchor)",
        )
    }
}

impl std::error::Error for MissingStart {}

/// A builder for constructing a valid recurrence rule.
#[derive(Clone, Debug)]
pub struct RecurrenceRuleBuilder {
    freq: Frequency,
    start: Zoned,
    until: Option<Zoned>,
    count: Option<i64>,
    interval: i32,
    by_month: Vec<i8>,
    by_week: Vec<i8>,
    by_year_day: Vec<i16>,
    by_month_day: Vec<i8>,
    by_week_day: Vec<ByWeekday>,
    by_hour: Vec<i8>,
    by_minute: Vec<i8>,
    by_second: Vec<i8>,
    by_set_pos: Vec<i32>,
    week_start: Weekday,
}

impl RecurrenceRuleBuilder {
    fn new(freq: Frequency, start: Zoned) -> RecurrenceRuleBuilder {
        RecurrenceRuleBuilder {
            freq,
            start,
            until: None,
            count: None,
            interval: 1,
            by_month: vec![],
            by_week: vec![],
            by_year_day: vec![],
            by_month_day: vec![],
            by_week_day: vec![],
            by_hour: vec![],
            by_minute: vec![],
            by_second: vec![],
            by_set_pos: vec![],
            week_start: Weekday::Monday,
        }
    }

    pub fn build(&self) -> anyhow::Result<RecurrenceRule> {
        fn sort_and_dedup<T: Clone + Ord>(slice: &[T]) -> Box<[T]> {
            let mut vec = slice.to_vec();
            vec.sort();
            vec.dedup();
            vec.into_boxed_slice()
        }

        anyhow::ensure!(
            self.interval >= 1,
            "interval value of `{}` is invalid \
             (interval must be greater than or equal to 1)",
            self.interval,
        );
        if let Some(count) = self.count {
            anyhow::ensure!(
                count >= 1,
                "count value of `{count}` is invalid \
                 (count must be greater than or equal to 1)",
            );
        }
        if let Some(ref until) = self.until {
            anyhow::ensure!(
                &self.start <= until,
                "until datetime `{until}` is invalid \
                 (it precedes the starting point `{start}`)",
                start = self.start,
            );
        }
        for &v in self.by_month.iter() {
            anyhow::ensure!(
                1 <= v && v <= 12,
                "invalid 'by month' value `{v}` \
                 (values must be in range 1..=12)",
            );
        }
        for &v in self.by_week.iter() {
            anyhow::ensure!(
                (-53 <= v && v <= -1) || (1 <= v && v <= 53),
                "invalid 'by week' value `{v}` \
                 (values must be in range 1..=53 or -53..=-1)",
            );
        }
        for &v in self.by_year_day.iter() {
            anyhow::ensure!(
                (-366 <= v && v <= -1) || (1 <= v && v <= 366),
                "invalid 'by day of the year' value `{v}` \
                 (values must be in range 1..=366 or -366..=-1)",
            );
        }
        for &v in self.by_month_day.iter() {
            anyhow::ensure!(
                (-31 <= v && v <= -1) || (1 <= v && v <= 31),
                "invalid 'by day of the month' value `{v}` \
                 (values must be in range 1..=31 or -31..=-1)",
            );
        }
        for &v in self.by_week_day.iter() {
            let nth = match v {
                ByWeekday::Any(_) => continue,
                ByWeekday::Numbered { nth, .. } => nth,
            };
            // Numbered weekdays are only allowed for YEARLY or MONTHLY
            // frequencies, since the ordinal is anchored to a month or a
            // year.
            anyhow::ensure!(
                matches!(self.freq, Frequency::Yearly | Frequency::Monthly),
                "numbered weekday `{v}` is only allowed at \
                 yearly or monthly frequencies",
            );
            // RFC 5545 forbids an ordinal of zero.
            anyhow::ensure!(
                nth != 0,
                "invalid numbered 'by week day' value `{v}` \
                 (the ordinal must not be zero)",
            );
            // The bounds on `nth` depend on what the ordinal is anchored
            // to. It's yearly when the frequency is yearly and BYMONTH
            // isn't set. Otherwise, it's monthly.
            if matches!(self.freq, Frequency::Yearly)
                && self.by_month.is_empty()
            {
                anyhow::ensure!(
                    (-53 <= nth && nth <= -1) || (1 <= nth && nth <= 53),
                    "invalid numbered 'by week day' value `{v}` \
                     (values must be in range 1..=53 or -53..=-1)",
                );
            } else {
                anyhow::ensure!(
                    (-5 <= nth && nth <= -1) || (1 <= nth && nth <= 5),
                    "invalid numbered 'by week day' value `{v}` \
                     (values must be in range 1..=5 or -5..=-1)",
                );
            }
        }
        for &v in self.by_hour.iter() {
            anyhow::ensure!(
                0 <= v && v <= 23,
                "invalid 'by hour' value `{v}` \
                 (values must be in range 0..=23)",
            );
        }
        for &v in self.by_minute.iter() {
            anyhow::ensure!(
                0 <= v && v <= 59,
                "invalid 'by minute' value `{v}` \
                 (values must be in range 0..=59)",
            );
        }
        for &v in self.by_second.iter() {
            // RFC 5545 technically allows a value of `60` here, presumably
            // for leap seconds. Jiff doesn't support leap seconds outside
            // of parsing, so reject it. This is also what `python-dateutil`
            // does.
            anyhow::ensure!(
                0 <= v && v <= 59,
                "invalid 'by second' value `{v}` \
                 (values must be in range 0..=59)",
            );
        }
        for &v in self.by_set_pos.iter() {
            anyhow::ensure!(
                (-366 <= v && v <= -1) || (1 <= v && v <= 366),
                "invalid 'by set position' value `{v}` \
                 (values must be in range 1..=366 or -366..=-1)",
            );
        }

        // Some additional frequency-specific errors.
        if !self.by_week.is_empty() {
            anyhow::ensure!(
                matches!(self.freq, Frequency::Yearly),
                "'by week' cannot be used with any frequency except yearly",
            );
        }
        if !self.by_year_day.is_empty() {
            anyhow::ensure!(
                !matches!(
                    self.freq,
                    Frequency::Monthly | Frequency::Weekly | Frequency::Daily
                ),
                "'by day of the year' cannot be used \
                 with monthly, weekly or daily frequency",
            );
        }
        if !self.by_month_day.is_empty() {
            anyhow::ensure!(
                !matches!(self.freq, Frequency::Weekly),
                "'by day of the month' cannot be used with weekly frequency",
            );
        }

        // A BYSETPOS specific error is that, if it's given, then there MUST
        // be another BY* rule.
        if !self.by_set_pos.is_empty() {
            anyhow::ensure!(
                !self.by_month.is_empty()
                    || !self.by_week.is_empty()
                    || !self.by_year_day.is_empty()
                    || !self.by_month_day.is_empty()
                    || !self.by_week_day.is_empty()
                    || !self.by_hour.is_empty()
                    || !self.by_minute.is_empty()
                    || !self.by_second.is_empty(),
                "when 'by set position' is used, at least one other \
                 'by' rule must be specified, but all are empty",
            );
        }

        // Partition BYMONTHDAY into its positive and negative halves, and
        // BYDAY into its plain and ordinalled halves.
        let mut by_month_day: Vec<i8> = vec![];
        let mut by_month_day_neg: Vec<i8> = vec![];
        for &v in self.by_month_day.iter() {
            if v > 0 {
                by_month_day.push(v);
            } else {
                by_month_day_neg.push(v);
            }
        }
        let mut by_week_day: Vec<i8> = vec![];
        let mut by_week_day_rel: Vec<(i8, i8)> = vec![];
        for &v in self.by_week_day.iter() {
            match v {
                ByWeekday::Any(weekday) => {
                    by_week_day.push(weekday.to_monday_zero_offset());
                }
                ByWeekday::Numbered { nth, weekday } => by_week_day_rel
                    .push((nth, weekday.to_monday_zero_offset())),
            }
        }

        let mut by_month = sort_and_dedup(&self.by_month);
        let mut by_month_day = sort_and_dedup(&by_month_day);
        let mut by_week_day = sort_and_dedup(&by_week_day);

        // When no day-level rule picks dates, the starting point does:
        // inject the frequency's default so the rest of the machinery never
        // has to special case "no day rules at all."
        let mut injected_by_month = false;
        let mut injected_by_month_day = false;
        let mut injected_by_week_day = false;
        if self.by_week.is_empty()
            && self.by_year_day.is_empty()
            && self.by_month_day.is_empty()
            && self.by_week_day.is_empty()
        {
            let start = self.start.datetime();
            match self.freq {
                Frequency::Yearly => {
                    if by_month.is_empty() {
                        by_month = Box::new([start.month()]);
                        injected_by_month = true;
                    }
                    by_month_day = Box::new([start.day()]);
                    injected_by_month_day = true;
                }
                Frequency::Monthly => {
                    by_month_day = Box::new([start.day()]);
                    injected_by_month_day = true;
                }
                Frequency::Weekly => {
                    by_week_day = Box::new([start
                        .date()
                        .weekday()
                        .to_monday_zero_offset()]);
                    injected_by_week_day = true;
                }
                _ => {}
            }
        }

        let inner = Arc::new(RecurrenceRuleInner {
            freq: self.freq,
            zoned_start: self.start.clone(),
            civil_start: self.start.datetime(),
            zoned_until: self.until.clone(),
            count: self.count,
            interval: self.interval,
            by_month,
            by_week: sort_and_dedup(&self.by_week),
            by_year_day: sort_and_dedup(&self.by_year_day),
            by_month_day,
            by_month_day_neg: sort_and_dedup(&by_month_day_neg),
            by_week_day,
            by_week_day_rel: sort_and_dedup(&by_week_day_rel),
            by_hour: sort_and_dedup(&self.by_hour),
            by_minute: sort_and_dedup(&self.by_minute),
            by_second: sort_and_dedup(&self.by_second),
            by_set_pos: sort_and_dedup(&self.by_set_pos),
            week_start: self.week_start,
            injected_by_month,
            injected_by_month_day,
            injected_by_week_day,
        });
        Ok(RecurrenceRule { inner })
    }

    pub fn until(&mut self, until: Zoned) -> &mut RecurrenceRuleBuilder {
        self.until = Some(until);
        self
    }

    pub fn count(&mut self, count: i64) -> &mut RecurrenceRuleBuilder {
        self.count = Some(count);
        self
    }

    pub fn interval(&mut self, increment: i32) -> &mut RecurrenceRuleBuilder {
        self.interval = increment;
        self
    }

    pub fn by_month<I: IntoIterator<Item = i8>>(
        &mut self,
        months: I,
    ) -> &mut RecurrenceRuleBuilder {
        self.by_month.extend(months);
        self
    }

    pub fn by_week<I: IntoIterator<Item = i8>>(
        &mut self,
        weeks: I,
    ) -> &mut RecurrenceRuleBuilder {
        self.by_week.extend(weeks);
        self
    }

    pub fn by_year_day<I: IntoIterator<Item = i16>>(
        &mut self,
        days: I,
    ) -> &mut RecurrenceRuleBuilder {
        self.by_year_day.extend(days);
        self
    }

    pub fn by_month_day<I: IntoIterator<Item = i8>>(
        &mut self,
        days: I,
    ) -> &mut RecurrenceRuleBuilder {
        self.by_month_day.extend(days);
        self
    }

    pub fn by_week_day<I>(
        &mut self,
        weekdays: I,
    ) -> &mut RecurrenceRuleBuilder
    where
        I: IntoIterator,
        I::Item: Into<ByWeekday>,
    {
        self.by_week_day.extend(weekdays.into_iter().map(Into::into));
        self
    }

    pub fn by_hour<I: IntoIterator<Item = i8>>(
        &mut self,
        hours: I,
    ) -> &mut RecurrenceRuleBuilder {
        self.by_hour.extend(hours);
        self
    }

    pub fn by_minute<I: IntoIterator<Item = i8>>(
        &mut self,
        minutes: I,
    ) -> &mut RecurrenceRuleBuilder {
        self.by_minute.extend(minutes);
        self
    }

    pub fn by_second<I: IntoIterator<Item = i8>>(
        &mut self,
        seconds: I,
    ) -> &mut RecurrenceRuleBuilder {
        self.by_second.extend(seconds);
        self
    }

    pub fn by_set_position<I: IntoIterator<Item = i32>>(
        &mut self,
        positions: I,
    ) -> &mut RecurrenceRuleBuilder {
        self.by_set_pos.extend(positions);
        self
    }

    pub fn week_start(
        &mut self,
        weekday: Weekday,
    ) -> &mut RecurrenceRuleBuilder {
        self.week_start = weekday;
        self
    }
}

/// A single BYDAY entry.
///
/// Each entry is either "any" weekday (e.g., every Saturday), or a numbered
/// weekday. For example, when the frequency for a recurrence rule is
/// monthly, then `Numbered { nth: -1, weekday: Weekday::Friday }`
/// corresponds to the last Friday of the month.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ByWeekday {
    Any(Weekday),
    Numbered { nth: i8, weekday: Weekday },
}

impl From<Weekday> for ByWeekday {
    fn from(weekday: Weekday) -> ByWeekday {
        ByWeekday::Any(weekday)
    }
}

impl From<(i8, Weekday)> for ByWeekday {
    fn from((nth, weekday): (i8, Weekday)) -> ByWeekday {
        ByWeekday::Numbered { nth, weekday }
    }
}

impl std::str::FromStr for ByWeekday {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<ByWeekday> {
        let Some((nth, weekday)) = s.rsplit_once("-") else {
            return Ok(ByWeekday::Any(parse_weekday_name(s)?));
        };
        let nth = nth.parse().with_context(|| {
            format!("failed to parse `{nth}` as integer weekday number")
        })?;
        let weekday = parse_weekday_name(weekday)?;
        Ok(ByWeekday::Numbered { nth, weekday })
    }
}

impl std::fmt::Display for ByWeekday {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        fn fmt_weekday(
            wd: Weekday,
            f: &mut std::fmt::Formatter,
        ) -> std::fmt::Result {
            match wd {
                Weekday::Sunday => write!(f, "Sun"),
                Weekday::Monday => write!(f, "Mon"),
                Weekday::Tuesday => write!(f, "Tue"),
                Weekday::Wednesday => write!(f, "Wed"),
                Weekday::Thursday => write!(f, "Thu"),
                Weekday::Friday => write!(f, "Fri"),
                Weekday::Saturday => write!(f, "Sat"),
            }
        }

        match *self {
            ByWeekday::Any(weekday) => fmt_weekday(weekday, f),
            ByWeekday::Numbered { nth, weekday } => {
                write!(f, "{nth}-")?;
                fmt_weekday(weekday, f)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    Minutely,
    Secondly,
}

impl Frequency {
    pub const USAGE: crate::args::Usage = crate::args::Usage::arg(
        "<frequency>",
        "The frequency at which a rule repeats.",
        r#"
The frequency at which a rule repeats.

Valid values are:

yearly, year, yr, y

monthly, month, mo

weekly, week, wk, w

daily, day, d

hourly, hour, hr, h

minutely, minute, min, m

secondly, second, sec, s

The uppercase RFC 5545 names (e.g. YEARLY) are also accepted.
"#,
    );
}

impl std::str::FromStr for Frequency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Frequency> {
        let freq = match &*s.to_lowercase() {
            "yearly" | "year" | "yr" | "y" => Frequency::Yearly,
            "monthly" | "month" | "mo" => Frequency::Monthly,
            "weekly" | "week" | "wk" | "w" => Frequency::Weekly,
            "daily" | "day" | "d" => Frequency::Daily,
            "hourly" | "hour" | "hr" | "h" => Frequency::Hourly,
            "minutely" | "minute" | "min" | "m" => Frequency::Minutely,
            "secondly" | "second" | "sec" | "s" => Frequency::Secondly,
            unk => anyhow::bail!("unrecognized frequency: `{unk}`"),
        };
        Ok(freq)
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match *self {
            Frequency::Yearly => "YEARLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Daily => "DAILY",
            Frequency::Hourly => "HOURLY",
            Frequency::Minutely => "MINUTELY",
            Frequency::Secondly => "SECONDLY",
        };
        write!(f, "{name}")
    }
}

/// Parses a human weekday name, e.g., `friday`, `fri` or `fr`.
fn parse_weekday_name(s: &str) -> anyhow::Result<Weekday> {
    let weekday = match &*s.to_lowercase() {
        "sunday" | "sun" | "su" => Weekday::Sunday,
        "monday" | "mon" | "mo" => Weekday::Monday,
        "tuesday" | "tues" | "tue" | "tu" => Weekday::Tuesday,
        "wednesday" | "wed" | "we" => Weekday::Wednesday,
        "thursday" | "thurs" | "thu" | "th" => Weekday::Thursday,
        "friday" | "fri" | "fr" => Weekday::Friday,
        "saturday" | "sat" | "sa" => Weekday::Saturday,
        unk => anyhow::bail!("unrecognized weekday: `{unk}`"),
    };
    Ok(weekday)
}

/// Parses an RFC 5545 two-letter weekday code, e.g., `MO`.
fn parse_weekday_code(s: &str) -> anyhow::Result<Weekday> {
    let weekday = match &*s.to_ascii_uppercase() {
        "MO" => Weekday::Monday,
        "TU" => Weekday::Tuesday,
        "WE" => Weekday::Wednesday,
        "TH" => Weekday::Thursday,
        "FR" => Weekday::Friday,
        "SA" => Weekday::Saturday,
        "SU" => Weekday::Sunday,
        unk => anyhow::bail!("unrecognized weekday code: `{unk}`"),
    };
    Ok(weekday)
}

/// Parses an RFC 5545 BYDAY entry: a weekday code with an optional signed
/// ordinal prefix, e.g., `TU` or `-1FR`.
fn parse_byday_code(s: &str) -> anyhow::Result<ByWeekday> {
    let split = s.len().checked_sub(2).with_context(|| {
        format!("BYDAY entry `{s}` is too short to contain a weekday code")
    })?;
    anyhow::ensure!(
        s.is_char_boundary(split),
        "BYDAY entry `{s}` does not end with a weekday code",
    );
    let (nth, code) = s.split_at(split);
    let weekday = parse_weekday_code(code)?;
    if nth.is_empty() {
        return Ok(ByWeekday::Any(weekday));
    }
    let nth = nth.parse().with_context(|| {
        format!("failed to parse ordinal `{nth}` in BYDAY entry `{s}`")
    })?;
    Ok(ByWeekday::Numbered { nth, weekday })
}

/// The RFC 5545 code for a weekday.
fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Monday => "MO",
        Weekday::Tuesday => "TU",
        Weekday::Wednesday => "WE",
        Weekday::Thursday => "TH",
        Weekday::Friday => "FR",
        Weekday::Saturday => "SA",
        Weekday::Sunday => "SU",
    }
}

/// The RFC 5545 code for a weekday number (`0..=6`, `0` is Monday).
fn weekday_number_code(weekday: i8) -> &'static str {
    match weekday {
        0 => "MO",
        1 => "TU",
        2 => "WE",
        3 => "TH",
        4 => "FR",
        5 => "SA",
        6 => "SU",
        _ => unreachable!("weekday numbers are validated to be in 0..=6"),
    }
}

/// Parses the compact datetime forms permitted in rule text: `YYYYMMDD`,
/// `YYYYMMDDTHHMMSS` and `YYYYMMDDTHHMMSSZ`. Civil forms are interpreted in
/// `tz`; the `Z` form in UTC.
fn parse_compact_datetime(
    value: &str,
    tz: &TimeZone,
) -> anyhow::Result<Zoned> {
    fn digits<T: std::str::FromStr>(s: &str) -> anyhow::Result<T>
    where
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        anyhow::ensure!(
            s.bytes().all(|b| b.is_ascii_digit()),
            "`{s}` is not a sequence of digits",
        );
        s.parse::<T>().map_err(|err| anyhow::anyhow!("{err}"))
    }

    let (value, utc) = match value.strip_suffix(['Z', 'z']) {
        Some(value) => (value, true),
        None => (value, false),
    };
    let err = || {
        format!(
            "failed to parse `{value}` as a compact datetime \
             (expected YYYYMMDD or YYYYMMDDTHHMMSS, with an optional \
             trailing Z for UTC)",
        )
    };
    anyhow::ensure!(value.is_ascii(), err());
    let dt = match (value.len(), value.as_bytes().get(8).copied()) {
        (8, None) => {
            let year = digits::<i16>(&value[0..4]).with_context(err)?;
            let month = digits::<i8>(&value[4..6]).with_context(err)?;
            let day = digits::<i8>(&value[6..8]).with_context(err)?;
            Date::new(year, month, day)
                .with_context(err)?
                .to_datetime(Time::midnight())
        }
        (15, Some(b'T')) => {
            let year = digits::<i16>(&value[0..4]).with_context(err)?;
            let month = digits::<i8>(&value[4..6]).with_context(err)?;
            let day = digits::<i8>(&value[6..8]).with_context(err)?;
            let hour = digits::<i8>(&value[9..11]).with_context(err)?;
            let minute = digits::<i8>(&value[11..13]).with_context(err)?;
            let second = digits::<i8>(&value[13..15]).with_context(err)?;
            let date = Date::new(year, month, day).with_context(err)?;
            let time =
                Time::new(hour, minute, second, 0).with_context(err)?;
            date.to_datetime(time)
        }
        _ => anyhow::bail!(err()),
    };
    let tz = if utc { TimeZone::UTC } else { tz.clone() };
    dt.to_zoned(tz).with_context(err)
}
