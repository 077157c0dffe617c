use jiff::{Zoned, tz::TimeZone};

use crate::ical::{RecurrenceIter, RecurrenceRule};

/// A recurrence set, in the RFC 5545 sense: any number of recurrence rules
/// (RRULE) and explicit datetimes (RDATE) merged into one chronologically
/// ascending stream, minus any exclusion rules (EXRULE) and exclusion
/// datetimes (EXDATE).
///
/// Everything the set emits is converted to its target time zone, with the
/// absolute instant preserved. All comparisons inside the merge are by
/// absolute timestamp, never by wall-clock fields, so sources in different
/// time zones interleave correctly and an exclusion in one zone cancels an
/// occurrence in another when they name the same instant.
#[derive(Clone, Debug)]
pub struct RecurrenceSet {
    tz: TimeZone,
    rules: Vec<RecurrenceRule>,
    dates: Vec<Zoned>,
    exclusion_rules: Vec<RecurrenceRule>,
    exclusion_dates: Vec<Zoned>,
    limit: Option<usize>,
    ignore_count: bool,
}

impl RecurrenceSet {
    /// Creates an empty recurrence set emitting datetimes in the given
    /// time zone.
    ///
    /// An empty set yields an empty stream.
    pub fn new(tz: TimeZone) -> RecurrenceSet {
        RecurrenceSet {
            tz,
            rules: vec![],
            dates: vec![],
            exclusion_rules: vec![],
            exclusion_dates: vec![],
            limit: None,
            ignore_count: false,
        }
    }

    /// Adds a recurrence rule to the set.
    pub fn rrule(&mut self, rule: RecurrenceRule) -> &mut RecurrenceSet {
        self.rules.push(rule);
        self
    }

    /// Adds an explicit occurrence to the set.
    pub fn rdate(&mut self, date: Zoned) -> &mut RecurrenceSet {
        self.dates.push(date);
        self
    }

    /// Adds an exclusion rule. Every datetime it generates is subtracted
    /// from the set.
    pub fn exrule(&mut self, rule: RecurrenceRule) -> &mut RecurrenceSet {
        self.exclusion_rules.push(rule);
        self
    }

    /// Subtracts an explicit datetime from the set.
    pub fn exdate(&mut self, date: Zoned) -> &mut RecurrenceSet {
        self.exclusion_dates.push(date);
        self
    }

    /// Caps the total number of datetimes the set will emit.
    pub fn limit(&mut self, limit: usize) -> &mut RecurrenceSet {
        self.limit = Some(limit);
        self
    }

    /// Disables the COUNT rule of every recurrence rule in the set. (The
    /// COUNT of an exclusion rule still bounds what it excludes.)
    pub fn ignore_count(&mut self, yes: bool) -> &mut RecurrenceSet {
        self.ignore_count = yes;
        self
    }

    /// Returns an iterator over the merged stream.
    pub fn iter(&self) -> RecurrenceSetIter<'_> {
        let mut includes = Vec::with_capacity(self.rules.len() + 1);
        for rule in self.rules.iter() {
            let mut iter = rule.iter();
            if self.ignore_count {
                iter = iter.ignore_count();
            }
            includes.push(Stream::rule(iter, &self.tz));
        }
        if !self.dates.is_empty() {
            includes.push(Stream::dates(&self.dates, &self.tz));
        }
        let mut excludes =
            Vec::with_capacity(self.exclusion_rules.len() + 1);
        for rule in self.exclusion_rules.iter() {
            excludes.push(Stream::rule(rule.iter(), &self.tz));
        }
        if !self.exclusion_dates.is_empty() {
            excludes.push(Stream::dates(&self.exclusion_dates, &self.tz));
        }
        RecurrenceSetIter { includes, excludes, remaining: self.limit }
    }
}

impl<'s> IntoIterator for &'s RecurrenceSet {
    type IntoIter = RecurrenceSetIter<'s>;
    type Item = Zoned;

    fn into_iter(self) -> RecurrenceSetIter<'s> {
        self.iter()
    }
}

/// An iterator over the merged, deduplicated stream of a recurrence set.
///
/// Each step takes the earliest head across the inclusion streams, drops it
/// if any exclusion stream also names that instant, and consumes the ties
/// across every inclusion stream so that an instant generated by several
/// sources is emitted exactly once.
#[derive(Debug)]
pub struct RecurrenceSetIter<'s> {
    includes: Vec<Stream<'s>>,
    excludes: Vec<Stream<'s>>,
    remaining: Option<usize>,
}

impl<'s> Iterator for RecurrenceSetIter<'s> {
    type Item = Zoned;

    fn next(&mut self) -> Option<Zoned> {
        loop {
            if self.remaining == Some(0) {
                return None;
            }
            self.includes.retain(|stream| stream.head.is_some());
            let mut min: Option<&Zoned> = None;
            for stream in self.includes.iter() {
                let Some(ref head) = stream.head else { continue };
                if min.is_none_or(|m| head.timestamp() < m.timestamp()) {
                    min = Some(head);
                }
            }
            let next = min?.clone();

            let mut excluded = false;
            for stream in self.excludes.iter_mut() {
                while let Some(ref head) = stream.head {
                    if head.timestamp() < next.timestamp() {
                        stream.advance();
                    } else {
                        break;
                    }
                }
                if let Some(ref head) = stream.head {
                    if head.timestamp() == next.timestamp() {
                        excluded = true;
                    }
                }
            }
            self.excludes.retain(|stream| stream.head.is_some());

            // Consume this instant from every inclusion stream that has
            // it, including the one it came from. This is what collapses
            // duplicates across sources.
            for stream in self.includes.iter_mut() {
                while let Some(ref head) = stream.head {
                    if head.timestamp() == next.timestamp() {
                        stream.advance();
                    } else {
                        break;
                    }
                }
            }

            if !excluded {
                if let Some(ref mut remaining) = self.remaining {
                    *remaining -= 1;
                }
                return Some(next);
            }
        }
    }
}

impl<'s> std::iter::FusedIterator for RecurrenceSetIter<'s> {}

/// One source of the merge, with its head pulled out so it can be compared
/// without consuming it. A stream whose head is `None` is exhausted.
#[derive(Debug)]
struct Stream<'s> {
    head: Option<Zoned>,
    source: Source<'s>,
    tz: TimeZone,
}

#[derive(Debug)]
enum Source<'s> {
    Rule(RecurrenceIter<'s>),
    Dates(std::vec::IntoIter<Zoned>),
}

impl<'s> Stream<'s> {
    fn rule(iter: RecurrenceIter<'s>, tz: &TimeZone) -> Stream<'s> {
        let mut stream = Stream {
            head: None,
            source: Source::Rule(iter),
            tz: tz.clone(),
        };
        stream.advance();
        stream
    }

    /// Builds a finite stream from explicit datetimes: stable-sorted by
    /// absolute timestamp and converted to the target zone.
    fn dates(dates: &[Zoned], tz: &TimeZone) -> Stream<'s> {
        let mut sorted = dates.to_vec();
        sorted.sort_by_key(|zdt| zdt.timestamp());
        let mut stream = Stream {
            head: None,
            source: Source::Dates(sorted.into_iter()),
            tz: tz.clone(),
        };
        stream.advance();
        stream
    }

    fn advance(&mut self) {
        let next = match self.source {
            Source::Rule(ref mut iter) => iter.next(),
            Source::Dates(ref mut iter) => iter.next(),
        };
        self.head =
            next.map(|zdt| zdt.timestamp().to_zoned(self.tz.clone()));
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::Weekday;

    use {super::*, crate::ical::Frequency};

    fn zoned(s: &str) -> Zoned {
        s.parse().unwrap()
    }

    fn snapshot<T>(it: impl IntoIterator<Item = T>) -> String
    where
        T: ToString,
    {
        it.into_iter()
            .map(|item| item.to_string())
            .collect::<Vec<String>>()
            .join("\n")
    }

    /// The fundamental EXDATE law: the merged stream is the sorted union
    /// of the inclusions with every instant named by an exclusion removed.
    #[test]
    fn explicit_dates_minus_exclusion() {
        let mut set = RecurrenceSet::new(TimeZone::UTC);
        set.rdate(zoned("2024-06-03T10:00:00[UTC]"))
            .rdate(zoned("2024-06-01T10:00:00[UTC]"))
            .rdate(zoned("2024-06-02T10:00:00[UTC]"))
            .exdate(zoned("2024-06-02T10:00:00[UTC]"));
        insta::assert_snapshot!(
            snapshot(&set),
            @r"
        2024-06-01T10:00:00+00:00[UTC]
        2024-06-03T10:00:00+00:00[UTC]
        ",
        );
    }

    #[test]
    fn rule_minus_exclusion_rule() {
        let start = zoned("2024-06-01T09:00:00[UTC]");
        let rule = RecurrenceRule::builder(Frequency::Daily, start.clone())
            .count(5)
            .build()
            .unwrap();
        // Excludes June 1, 3 and 5.
        let skip = RecurrenceRule::builder(Frequency::Daily, start)
            .interval(2)
            .count(3)
            .build()
            .unwrap();
        let mut set = RecurrenceSet::new(TimeZone::UTC);
        set.rrule(rule).exrule(skip);
        insta::assert_snapshot!(
            snapshot(&set),
            @r"
        2024-06-02T09:00:00+00:00[UTC]
        2024-06-04T09:00:00+00:00[UTC]
        ",
        );
    }

    /// Two rules generating overlapping instants emit each instant once.
    #[test]
    fn duplicates_across_rules_collapse() {
        let start = zoned("2024-06-03T12:00:00[UTC]");
        let daily = RecurrenceRule::builder(Frequency::Daily, start.clone())
            .count(7)
            .build()
            .unwrap();
        let mondays = RecurrenceRule::builder(Frequency::Weekly, start)
            .by_week_day([Weekday::Monday])
            .count(2)
            .build()
            .unwrap();
        let mut set = RecurrenceSet::new(TimeZone::UTC);
        set.rrule(daily).rrule(mondays);
        insta::assert_snapshot!(
            snapshot(&set),
            @r"
        2024-06-03T12:00:00+00:00[UTC]
        2024-06-04T12:00:00+00:00[UTC]
        2024-06-05T12:00:00+00:00[UTC]
        2024-06-06T12:00:00+00:00[UTC]
        2024-06-07T12:00:00+00:00[UTC]
        2024-06-08T12:00:00+00:00[UTC]
        2024-06-09T12:00:00+00:00[UTC]
        2024-06-10T12:00:00+00:00[UTC]
        ",
        );
    }

    /// Sources in different time zones interleave by absolute instant and
    /// everything comes out in the set's target zone.
    #[test]
    fn cross_zone_merge_is_instant_ordered() {
        let start = zoned("2024-01-02T09:00:00[America/New_York]");
        let rule = RecurrenceRule::builder(Frequency::Daily, start)
            .count(2)
            .build()
            .unwrap();
        let mut set = RecurrenceSet::new(TimeZone::UTC);
        // 13:30 UTC is 08:30 in New York: it sorts before the rule's 09:00
        // even though its wall clock reads later.
        set.rrule(rule).rdate(zoned("2024-01-02T13:30:00[UTC]"));
        insta::assert_snapshot!(
            snapshot(&set),
            @r"
        2024-01-02T13:30:00+00:00[UTC]
        2024-01-02T14:00:00+00:00[UTC]
        2024-01-03T14:00:00+00:00[UTC]
        ",
        );
    }

    /// An exclusion cancels an occurrence when they name the same instant,
    /// regardless of the zones their wall clocks are written in.
    #[test]
    fn exclusion_matches_by_instant_not_wall_clock() {
        let mut set = RecurrenceSet::new(TimeZone::UTC);
        set.rdate(zoned("2024-01-02T14:00:00[UTC]"))
            .rdate(zoned("2024-01-03T14:00:00[UTC]"))
            .exdate(zoned("2024-01-02T09:00:00[America/New_York]"));
        insta::assert_snapshot!(
            snapshot(&set),
            @"2024-01-03T14:00:00+00:00[UTC]",
        );
    }

    #[test]
    fn limit_caps_output() {
        let start = zoned("2024-06-01T09:00:00[UTC]");
        let rule = RecurrenceRule::builder(Frequency::Daily, start)
            .build()
            .unwrap();
        let mut set = RecurrenceSet::new(TimeZone::UTC);
        set.rrule(rule).limit(3);
        insta::assert_snapshot!(
            snapshot(&set),
            @r"
        2024-06-01T09:00:00+00:00[UTC]
        2024-06-02T09:00:00+00:00[UTC]
        2024-06-03T09:00:00+00:00[UTC]
        ",
        );
    }

    #[test]
    fn ignore_count_lifts_rule_counts() {
        let start = zoned("2024-06-01T09:00:00[UTC]");
        let rule = RecurrenceRule::builder(Frequency::Daily, start)
            .count(2)
            .build()
            .unwrap();
        let mut set = RecurrenceSet::new(TimeZone::UTC);
        set.rrule(rule).ignore_count(true).limit(4);
        insta::assert_snapshot!(
            snapshot(&set),
            @r"
        2024-06-01T09:00:00+00:00[UTC]
        2024-06-02T09:00:00+00:00[UTC]
        2024-06-03T09:00:00+00:00[UTC]
        2024-06-04T09:00:00+00:00[UTC]
        ",
        );
    }

    #[test]
    fn empty_set_yields_nothing() {
        let set = RecurrenceSet::new(TimeZone::UTC);
        assert_eq!(set.iter().next(), None);
    }
}
