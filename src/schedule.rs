use jiff::{SignedDuration, Zoned};

use crate::{ical::RecurrenceRule, set::RecurrenceSet};

/// A recurring event: one recurrence rule, an optional end time and any
/// explicit inclusion/exclusion datetimes.
///
/// The distance between the rule's starting point and `end` is the event's
/// duration; every occurrence lasts exactly that long. With no end time the
/// duration is zero and occurrences are instants.
#[derive(Clone, Debug)]
pub struct Event {
    rule: RecurrenceRule,
    end: Option<Zoned>,
    rdates: Vec<Zoned>,
    exdates: Vec<Zoned>,
}

impl Event {
    pub fn new(rule: RecurrenceRule) -> Event {
        Event { rule, end: None, rdates: vec![], exdates: vec![] }
    }

    /// Sets the end time of the first occurrence, which fixes the duration
    /// of every occurrence.
    pub fn end(&mut self, end: Zoned) -> &mut Event {
        self.end = Some(end);
        self
    }

    /// Adds an explicit occurrence.
    pub fn rdate(&mut self, date: Zoned) -> &mut Event {
        self.rdates.push(date);
        self
    }

    /// Subtracts an explicit occurrence.
    pub fn exdate(&mut self, date: Zoned) -> &mut Event {
        self.exdates.push(date);
        self
    }

    /// The duration of each occurrence.
    ///
    /// This is the absolute difference between the rule's starting point
    /// and the event's end time, so occurrences keep the same real length
    /// across daylight saving time transitions.
    pub fn duration(&self) -> SignedDuration {
        self.end
            .as_ref()
            .map_or(SignedDuration::ZERO, |end| {
                self.rule.start().duration_until(end)
            })
    }
}

/// A predicate applied to each occurrence's start before it is emitted.
pub trait Constraint {
    /// Returns true when the occurrence should be kept.
    fn matches(&self, date: &Zoned) -> bool;

    /// Whether a failed test means no later occurrence can pass either.
    /// When true, the first failure ends materialization entirely.
    fn is_terminal(&self) -> bool {
        false
    }
}

/// Keeps occurrences at or after a cutoff.
///
/// Not terminal: early occurrences fail but later ones may pass.
#[derive(Clone, Debug)]
pub struct After {
    cutoff: Zoned,
    inclusive: bool,
}

impl After {
    pub fn new(cutoff: Zoned, inclusive: bool) -> After {
        After { cutoff, inclusive }
    }
}

impl Constraint for After {
    fn matches(&self, date: &Zoned) -> bool {
        date > &self.cutoff || (self.inclusive && date == &self.cutoff)
    }
}

/// Keeps occurrences at or before a cutoff.
///
/// Terminal: occurrences arrive in ascending order, so once one falls past
/// the cutoff, every later one does too.
#[derive(Clone, Debug)]
pub struct Before {
    cutoff: Zoned,
    inclusive: bool,
}

impl Before {
    pub fn new(cutoff: Zoned, inclusive: bool) -> Before {
        Before { cutoff, inclusive }
    }
}

impl Constraint for Before {
    fn matches(&self, date: &Zoned) -> bool {
        date < &self.cutoff || (self.inclusive && date == &self.cutoff)
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

/// Keeps occurrences inside a window.
///
/// Not terminal, since occurrences before the window fail while later ones
/// may pass. A failure past the window's end cannot recover, but this
/// constraint has no way to say which side failed; callers wanting a hard
/// stop at the window's end can rely on the materialization ceilings.
#[derive(Clone, Debug)]
pub struct Between {
    after: Zoned,
    before: Zoned,
    inclusive: bool,
}

impl Between {
    pub fn new(after: Zoned, before: Zoned, inclusive: bool) -> Between {
        Between { after, before, inclusive }
    }
}

impl Constraint for Between {
    fn matches(&self, date: &Zoned) -> bool {
        if self.inclusive {
            date >= &self.after && date <= &self.before
        } else {
            date > &self.after && date < &self.before
        }
    }
}

/// A single concrete occurrence of a recurring event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Occurrence {
    /// The position of this occurrence in its materialized schedule,
    /// starting at zero.
    pub index: usize,
    pub start: Zoned,
    pub end: Zoned,
}

impl std::fmt::Display for Occurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}\t{}", self.start, self.end)
    }
}

/// Configuration for materializing schedules.
///
/// The one knob is the virtual limit: a hard ceiling on how many
/// occurrences a materialization may produce, so that a rule with no COUNT
/// or UNTIL still terminates. The default of 732 covers two years of a
/// daily rule, leap day included.
#[derive(Clone, Debug)]
pub struct Config {
    virtual_limit: usize,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn virtual_limit(&mut self, limit: usize) -> &mut Config {
        self.virtual_limit = limit;
        self
    }
}

impl Default for Config {
    fn default() -> Config {
        Config { virtual_limit: 732 }
    }
}

/// Materializes recurring events into lists of concrete occurrences.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    config: Config,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler::default()
    }

    pub fn with_config(config: Config) -> Scheduler {
        Scheduler { config }
    }

    /// Expands the event into its concrete occurrences, in ascending
    /// order, each paired with its end time.
    ///
    /// When a constraint is given, each candidate start is tested before
    /// being emitted. A failed terminal constraint ends materialization. By
    /// default (`count_constraint_failures` true) every tested candidate
    /// counts toward the virtual limit, and the rule's COUNT is consumed by
    /// generation as usual. With `count_constraint_failures` false, only
    /// *kept* occurrences count: the rule's COUNT (when it has one)
    /// replaces the virtual limit and constraint misses consume nothing.
    pub fn occurrences(
        &self,
        event: &Event,
        constraint: Option<&dyn Constraint>,
        count_constraint_failures: bool,
    ) -> Vec<Occurrence> {
        let rule = &event.rule;
        let duration = event.duration();

        let mut set =
            RecurrenceSet::new(rule.start().time_zone().clone());
        set.rrule(rule.clone());
        for date in event.rdates.iter() {
            set.rdate(date.clone());
        }
        for date in event.exdates.iter() {
            set.exdate(date.clone());
        }

        let rule_count_caps = !count_constraint_failures
            && rule.count().is_some();
        if !count_constraint_failures {
            set.ignore_count(true);
        }
        let cap = if rule_count_caps {
            usize::try_from(rule.count().unwrap_or(0)).unwrap_or(usize::MAX)
        } else {
            self.config.virtual_limit
        };
        if cap == 0 {
            return vec![];
        }

        let mut occurrences = vec![];
        let mut total = 0;
        for start in set.iter() {
            if let Some(constraint) = constraint {
                if !constraint.matches(&start) {
                    if constraint.is_terminal() {
                        break;
                    }
                    if count_constraint_failures {
                        total += 1;
                        if total >= cap {
                            break;
                        }
                    }
                    continue;
                }
            }
            let Ok(end) = start.checked_add(duration) else { break };
            occurrences.push(Occurrence {
                index: occurrences.len(),
                start,
                end,
            });
            total += 1;
            if total >= cap {
                break;
            }
        }
        occurrences
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::ical::Frequency};

    fn zoned(s: &str) -> Zoned {
        s.parse().unwrap()
    }

    fn daily(start: &str, count: Option<i64>) -> RecurrenceRule {
        let mut builder =
            RecurrenceRule::builder(Frequency::Daily, zoned(start));
        if let Some(count) = count {
            builder.count(count);
        }
        builder.build().unwrap()
    }

    fn snapshot(occurrences: &[Occurrence]) -> String {
        occurrences
            .iter()
            .map(|occurrence| occurrence.to_string())
            .collect::<Vec<String>>()
            .join("\n")
    }

    #[test]
    fn pairs_each_start_with_its_end() {
        let rule = daily("2024-06-01T09:00:00[UTC]", Some(3));
        let mut event = Event::new(rule);
        event.end(zoned("2024-06-01T10:30:00[UTC]"));
        let got = Scheduler::new().occurrences(&event, None, true);
        insta::assert_snapshot!(
            snapshot(&got),
            @r"
        2024-06-01T09:00:00+00:00[UTC]	2024-06-01T10:30:00+00:00[UTC]
        2024-06-02T09:00:00+00:00[UTC]	2024-06-02T10:30:00+00:00[UTC]
        2024-06-03T09:00:00+00:00[UTC]	2024-06-03T10:30:00+00:00[UTC]
        ",
        );
        assert_eq!(
            got.iter().map(|o| o.index).collect::<Vec<usize>>(),
            vec![0, 1, 2],
        );
    }

    /// The duration is an absolute one: an occurrence spanning a daylight
    /// saving time transition keeps its real length, not its wall-clock
    /// one.
    #[test]
    fn duration_is_absolute_across_transitions() {
        let rule =
            daily("2024-11-02T23:00:00[America/New_York]", Some(2));
        let mut event = Event::new(rule);
        // Three real hours after 23:00 EDT. The clocks fall back at 02:00,
        // so the first occurrence ends at 01:00 EST, not 02:00 EDT.
        event.end(zoned("2024-11-03T01:00:00-05:00[America/New_York]"));
        let got = Scheduler::new().occurrences(&event, None, true);
        insta::assert_snapshot!(
            snapshot(&got),
            @r"
        2024-11-02T23:00:00-04:00[America/New_York]	2024-11-03T01:00:00-05:00[America/New_York]
        2024-11-03T23:00:00-05:00[America/New_York]	2024-11-04T02:00:00-05:00[America/New_York]
        ",
        );
    }

    #[test]
    fn no_end_time_means_zero_duration() {
        let rule = daily("2024-06-01T09:00:00[UTC]", Some(1));
        let event = Event::new(rule);
        let got = Scheduler::new().occurrences(&event, None, true);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].start, got[0].end);
    }

    #[test]
    fn virtual_limit_tames_unbounded_rules() {
        let rule = daily("2024-06-01T09:00:00[UTC]", None);
        let event = Event::new(rule);
        let mut config = Config::new();
        config.virtual_limit(4);
        let got =
            Scheduler::with_config(config).occurrences(&event, None, true);
        assert_eq!(got.len(), 4);
        assert_eq!(got[3].start, zoned("2024-06-04T09:00:00[UTC]"));
    }

    #[test]
    fn exdates_are_subtracted() {
        let rule = daily("2024-06-01T09:00:00[UTC]", Some(3));
        let mut event = Event::new(rule);
        event.exdate(zoned("2024-06-02T09:00:00[UTC]"));
        let got = Scheduler::new().occurrences(&event, None, true);
        insta::assert_snapshot!(
            snapshot(&got),
            @r"
        2024-06-01T09:00:00+00:00[UTC]	2024-06-01T09:00:00+00:00[UTC]
        2024-06-03T09:00:00+00:00[UTC]	2024-06-03T09:00:00+00:00[UTC]
        ",
        );
    }

    /// A terminal constraint ends materialization at its first failure,
    /// which is what keeps an unbounded rule from scanning to the virtual
    /// limit.
    #[test]
    fn before_constraint_stops_at_cutoff() {
        let rule = daily("2024-06-01T09:00:00[UTC]", None);
        let event = Event::new(rule);
        let before =
            Before::new(zoned("2024-06-03T09:00:00[UTC]"), true);
        let got =
            Scheduler::new().occurrences(&event, Some(&before), true);
        insta::assert_snapshot!(
            snapshot(&got),
            @r"
        2024-06-01T09:00:00+00:00[UTC]	2024-06-01T09:00:00+00:00[UTC]
        2024-06-02T09:00:00+00:00[UTC]	2024-06-02T09:00:00+00:00[UTC]
        2024-06-03T09:00:00+00:00[UTC]	2024-06-03T09:00:00+00:00[UTC]
        ",
        );
    }

    /// With failures counted (the default), occurrences dropped by the
    /// constraint still consume the rule's COUNT.
    #[test]
    fn counted_failures_consume_the_rules_count() {
        let rule = daily("2024-06-01T09:00:00[UTC]", Some(5));
        let event = Event::new(rule);
        let after = After::new(zoned("2024-06-03T09:00:00[UTC]"), false);
        let got = Scheduler::new().occurrences(&event, Some(&after), true);
        insta::assert_snapshot!(
            snapshot(&got),
            @r"
        2024-06-04T09:00:00+00:00[UTC]	2024-06-04T09:00:00+00:00[UTC]
        2024-06-05T09:00:00+00:00[UTC]	2024-06-05T09:00:00+00:00[UTC]
        ",
        );
    }

    /// With failures not counted, COUNT limits real acceptances: the rule
    /// still delivers its full complement of kept occurrences.
    #[test]
    fn uncounted_failures_preserve_the_rules_count() {
        let rule = daily("2024-06-01T09:00:00[UTC]", Some(3));
        let event = Event::new(rule);
        let after = After::new(zoned("2024-06-03T09:00:00[UTC]"), false);
        let got =
            Scheduler::new().occurrences(&event, Some(&after), false);
        insta::assert_snapshot!(
            snapshot(&got),
            @r"
        2024-06-04T09:00:00+00:00[UTC]	2024-06-04T09:00:00+00:00[UTC]
        2024-06-05T09:00:00+00:00[UTC]	2024-06-05T09:00:00+00:00[UTC]
        2024-06-06T09:00:00+00:00[UTC]	2024-06-06T09:00:00+00:00[UTC]
        ",
        );
    }

    #[test]
    fn between_keeps_only_the_window() {
        let rule = daily("2024-06-01T09:00:00[UTC]", Some(10));
        let event = Event::new(rule);
        let between = Between::new(
            zoned("2024-06-03T00:00:00[UTC]"),
            zoned("2024-06-06T00:00:00[UTC]"),
            false,
        );
        let got =
            Scheduler::new().occurrences(&event, Some(&between), true);
        insta::assert_snapshot!(
            snapshot(&got),
            @r"
        2024-06-03T09:00:00+00:00[UTC]	2024-06-03T09:00:00+00:00[UTC]
        2024-06-04T09:00:00+00:00[UTC]	2024-06-04T09:00:00+00:00[UTC]
        2024-06-05T09:00:00+00:00[UTC]	2024-06-05T09:00:00+00:00[UTC]
        ",
        );
    }
}
