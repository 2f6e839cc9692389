use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::iter::Peekable;

use serde::{Deserialize, Serialize};

use crate::recur::{OccurrenceQuery, Occurrences, RecurrenceRule};
use crate::serde_util::{aware_list, one_or_many};
use crate::time::Timestamp;

/// Composite occurrence source built from rules and fixed instants.
///
/// Inclusion rules and dates are merged into one ascending deduplicated
/// stream, then every instant produced by an exclusion rule or date is
/// removed from it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleSet {
    #[serde(with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub rrules: Vec<RecurrenceRule>,
    #[serde(with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub exrules: Vec<RecurrenceRule>,
    #[serde(with = "aware_list", skip_serializing_if = "Vec::is_empty")]
    pub rdates: Vec<Timestamp>,
    #[serde(with = "aware_list", skip_serializing_if = "Vec::is_empty")]
    pub exdates: Vec<Timestamp>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: RecurrenceRule) -> &mut Self {
        self.rrules.push(rule);
        self
    }

    pub fn add_exrule(&mut self, rule: RecurrenceRule) -> &mut Self {
        self.exrules.push(rule);
        self
    }

    pub fn add_date(&mut self, instant: Timestamp) -> &mut Self {
        self.rdates.push(instant);
        self
    }

    pub fn add_exdate(&mut self, instant: Timestamp) -> &mut Self {
        self.exdates.push(instant);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rrules.is_empty() && self.rdates.is_empty()
    }
}

/// K-way merge of ascending streams.
struct MergedOccurrences<'a> {
    heap: BinaryHeap<Reverse<(Timestamp, usize)>>,
    sources: Vec<Occurrences<'a>>,
}

impl<'a> MergedOccurrences<'a> {
    fn new(mut sources: Vec<Occurrences<'a>>) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (index, source) in sources.iter_mut().enumerate() {
            if let Some(instant) = source.next() {
                heap.push(Reverse((instant, index)));
            }
        }
        MergedOccurrences { heap, sources }
    }
}

impl Iterator for MergedOccurrences<'_> {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Timestamp> {
        let Reverse((instant, index)) = self.heap.pop()?;
        if let Some(following) = self.sources[index].next() {
            self.heap.push(Reverse((following, index)));
        }
        Some(instant)
    }
}

/// Inclusion stream with the exclusion stream advanced in lockstep, so
/// neither side is ever iterated past the current candidate.
struct SetIter<'a> {
    inclusions: MergedOccurrences<'a>,
    exclusions: Peekable<MergedOccurrences<'a>>,
    last: Option<Timestamp>,
}

impl Iterator for SetIter<'_> {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Timestamp> {
        'candidates: while let Some(instant) = self.inclusions.next() {
            if self.last == Some(instant) {
                continue;
            }
            while let Some(&excluded) = self.exclusions.peek() {
                if excluded < instant {
                    self.exclusions.next();
                } else if excluded == instant {
                    // Remember excluded instants too, so their
                    // duplicates are dropped without another probe.
                    self.last = Some(instant);
                    continue 'candidates;
                } else {
                    break;
                }
            }
            self.last = Some(instant);
            return Some(instant);
        }
        None
    }
}

impl OccurrenceQuery for RuleSet {
    fn occurrences(&self) -> Occurrences<'_> {
        let mut inclusions: Vec<Occurrences<'_>> = Vec::with_capacity(self.rrules.len() + 1);
        if !self.rdates.is_empty() {
            let mut dates = self.rdates.clone();
            dates.sort_unstable();
            inclusions.push(Box::new(dates.into_iter()));
        }
        for rule in &self.rrules {
            inclusions.push(rule.occurrences());
        }
        let mut exclusions: Vec<Occurrences<'_>> = Vec::with_capacity(self.exrules.len() + 1);
        if !self.exdates.is_empty() {
            let mut dates = self.exdates.clone();
            dates.sort_unstable();
            exclusions.push(Box::new(dates.into_iter()));
        }
        for rule in &self.exrules {
            exclusions.push(rule.occurrences());
        }
        Box::new(SetIter {
            inclusions: MergedOccurrences::new(inclusions),
            exclusions: MergedOccurrences::new(exclusions).peekable(),
            last: None,
        })
    }

    fn is_bounded(&self) -> bool {
        self.rrules.iter().all(RecurrenceRule::is_bounded)
    }
}
