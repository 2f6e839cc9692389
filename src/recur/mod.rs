pub mod iter;
pub mod rule;
pub mod set;


pub use rule::*;
pub use set::*;

use crate::time::Timestamp;

/// Lazily produced ascending occurrence stream
pub type Occurrences<'a> = Box<dyn Iterator<Item = Timestamp> + 'a>;

/// Query surface shared by every occurrence source.
///
/// Implementors guarantee that [`occurrences`](Self::occurrences) yields
/// strictly ascending, deduplicated instants and can be restarted any
/// number of times without interference between iterations.
pub trait OccurrenceQuery {
    /// A fresh occurrence stream from the beginning of the sequence.
    fn occurrences(&self) -> Occurrences<'_>;

    /// Whether the stream is guaranteed to be finite.
    fn is_bounded(&self) -> bool;

    /// The nth occurrence, 0-based.
    fn nth_occurrence(&self, n: usize) -> Option<Timestamp> {
        self.occurrences().nth(n)
    }

    /// The occurrences whose indices fall in `range`.
    fn occurrence_range(&self, range: std::ops::Range<usize>) -> Vec<Timestamp> {
        if range.is_empty() {
            return Vec::new();
        }
        self.occurrences()
            .skip(range.start)
            .take(range.len())
            .collect()
    }

    /// Whether `instant` is produced by this source. Iterates no further
    /// than the first occurrence at or past `instant`.
    fn contains(&self, instant: Timestamp) -> bool {
        for occurrence in self.occurrences() {
            if occurrence >= instant {
                return occurrence == instant;
            }
        }
        false
    }

    /// The latest occurrence before `instant`; at it, when `inclusive`.
    fn last_before(&self, instant: Timestamp, inclusive: bool) -> Option<Timestamp> {
        let mut last = None;
        for occurrence in self.occurrences() {
            let beyond = if inclusive {
                occurrence > instant
            } else {
                occurrence >= instant
            };
            if beyond {
                break;
            }
            last = Some(occurrence);
        }
        last
    }

    /// The earliest occurrence after `instant`; at it, when `inclusive`.
    fn first_after(&self, instant: Timestamp, inclusive: bool) -> Option<Timestamp> {
        self.occurrences()
            .find(|occ| if inclusive { *occ >= instant } else { *occ > instant })
    }

    /// Ascending occurrences from `instant` on, optionally capped at
    /// `limit` results.
    fn occurrences_from(
        &self,
        instant: Timestamp,
        inclusive: bool,
        limit: Option<usize>,
    ) -> Occurrences<'_> {
        let tail = self.occurrences().skip_while(move |occ| {
            if inclusive { *occ < instant } else { *occ <= instant }
        });
        match limit {
            Some(limit) => Box::new(tail.take(limit)),
            None => Box::new(tail),
        }
    }

    /// All occurrences between the bounds, which are themselves excluded
    /// unless `inclusive`.
    fn occurrences_between(
        &self,
        start: Timestamp,
        end: Timestamp,
        inclusive: bool,
    ) -> Vec<Timestamp> {
        let mut hits = Vec::new();
        for occurrence in self.occurrences() {
            let past = if inclusive {
                occurrence > end
            } else {
                occurrence >= end
            };
            if past {
                break;
            }
            let early = if inclusive {
                occurrence < start
            } else {
                occurrence <= start
            };
            if !early {
                hits.push(occurrence);
            }
        }
        hits
    }

    /// Exhausts the stream to count it. Never returns for an unbounded
    /// source; check [`is_bounded`](Self::is_bounded) first.
    fn count_occurrences(&self) -> usize {
        self.occurrences().count()
    }
}
