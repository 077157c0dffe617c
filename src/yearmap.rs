use std::ops::Range;

use jiff::{ToSpan, civil::Date};

/// Calendar tables for a single Gregorian year.
///
/// The recurrence expander works in terms of zero-indexed day-of-year
/// offsets. This type materializes, for one year, the per-day tables that
/// the expander's filters probe: the month number, the day-of-month (both
/// counted from the front and from the back of the month) and the weekday
/// number. It also records where each month begins.
///
/// Weekdays are numbered `0..=6` with `0` corresponding to Monday, matching
/// the WKST ordering in RFC 5545 where the default week start is `MO`.
///
/// All tables run seven days past the end of the year, so that windows which
/// straddle the year boundary (a week that begins in late December, or the
/// first week of the next year when week numbers are requested) can be
/// probed without wrapping. In the tail, the month/day tables describe the
/// first week of the next January.
#[derive(Clone, Debug)]
pub struct YearMap {
    year: i16,
    len: usize,
    next_len: usize,
    first_weekday: i8,
    months: Box<[i8]>,
    month_days: Box<[i8]>,
    month_days_neg: Box<[i8]>,
    weekdays: Box<[i8]>,
    month_starts: [usize; 13],
}

impl YearMap {
    /// Build the tables for the given year.
    ///
    /// `year` must be within Jiff's supported range of civil years. Callers
    /// in this crate derive it from an existing `jiff::civil::DateTime`, so
    /// this is always true.
    pub fn new(year: i16) -> YearMap {
        let jan1 = jiff::civil::date(year, 1, 1);
        let len = if jan1.in_leap_year() { 366 } else { 365 };
        // Computed arithmetically since `year + 1` may be out of Jiff's
        // range even when `year` is not.
        let next_len = if is_leap(i32::from(year) + 1) { 366 } else { 365 };
        let first_weekday = jan1.weekday().to_monday_zero_offset();

        let total = len + 7;
        let mut months = Vec::with_capacity(total);
        let mut month_days = Vec::with_capacity(total);
        let mut month_days_neg = Vec::with_capacity(total);
        let mut month_starts = [0; 13];
        for month in 1i8..=12 {
            month_starts[usize::from(month.unsigned_abs()) - 1] = months.len();
            let days = jiff::civil::date(year, month, 1).days_in_month();
            for day in 1..=days {
                months.push(month);
                month_days.push(day);
                month_days_neg.push(day - days - 1);
            }
        }
        month_starts[12] = months.len();
        // The tail is the first week of the next January.
        for day in 1..=7 {
            months.push(1);
            month_days.push(day);
            month_days_neg.push(day - 32);
        }

        let mut weekdays = Vec::with_capacity(total);
        let mut wd = first_weekday;
        for _ in 0..total {
            weekdays.push(wd);
            wd = (wd + 1) % 7;
        }

        YearMap {
            year,
            len,
            next_len,
            first_weekday,
            months: months.into(),
            month_days: month_days.into(),
            month_days_neg: month_days_neg.into(),
            weekdays: weekdays.into(),
            month_starts,
        }
    }

    /// The year these tables describe.
    pub fn year(&self) -> i16 {
        self.year
    }

    /// The number of days in this year. Either `365` or `366`.
    pub fn len(&self) -> usize {
        self.len
    }

    /// The number of days in the following year.
    pub fn next_len(&self) -> usize {
        self.next_len
    }

    /// The weekday number of January 1st.
    pub fn first_weekday(&self) -> i8 {
        self.first_weekday
    }

    /// The month (`1..=12`) containing the given day-of-year offset.
    pub fn month(&self, doy: usize) -> i8 {
        self.months[doy]
    }

    /// The day-of-month (`1..=31`) of the given day-of-year offset.
    pub fn month_day(&self, doy: usize) -> i8 {
        self.month_days[doy]
    }

    /// The day-of-month counted from the end of the month (`-1..=-31`).
    pub fn month_day_neg(&self, doy: usize) -> i8 {
        self.month_days_neg[doy]
    }

    /// The weekday number (`0..=6`, `0` is Monday) of the given offset.
    pub fn weekday(&self, doy: usize) -> i8 {
        self.weekdays[doy]
    }

    /// The half-open range of day-of-year offsets covered by a month.
    pub fn month_range(&self, month: i8) -> Range<usize> {
        let m = usize::from(month.unsigned_abs());
        self.month_starts[m - 1]..self.month_starts[m]
    }

    /// The number of entries in each table, including the tail.
    pub fn table_len(&self) -> usize {
        self.len + 7
    }

    /// Converts a day-of-year offset back to a calendar date.
    ///
    /// Offsets in the tail roll over into the next year. Returns `None`
    /// when the result would be outside Jiff's supported range.
    pub fn date(&self, doy: usize) -> Option<Date> {
        let days = i32::try_from(doy).ok()?;
        jiff::civil::date(self.year, 1, 1).checked_add(days.days()).ok()
    }
}

fn is_leap(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}
