use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::time::duration::CalendarDelta;
use crate::time::moment::Moment;

/// End of a [`Period`]: an absolute point, or an offset from the start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeriodEnd {
    At(Moment),
    After(CalendarDelta),
}

/// Span between two calendar points.
///
/// When both ends are instants they are compared exactly and the span
/// must be non-empty; any date-only side relaxes the check to date
/// granularity, where start and end may coincide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PeriodSpec")]
pub struct Period {
    start: Moment,
    end: PeriodEnd,
    #[serde(skip)]
    resolved_end: Moment,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PeriodSpec {
    start: Moment,
    end: PeriodEnd,
}

impl TryFrom<PeriodSpec> for Period {
    type Error = ModelError;

    fn try_from(spec: PeriodSpec) -> Result<Self> {
        Period::new(spec.start, spec.end)
    }
}

impl Period {
    pub fn new(start: Moment, end: PeriodEnd) -> Result<Self> {
        let resolved_end = match end {
            PeriodEnd::At(moment) => moment,
            PeriodEnd::After(delta) => match start {
                Moment::Date(date) => Moment::Date(delta.shift_date(date)?),
                Moment::Instant(ts) => Moment::Instant(delta.shift(ts)?),
            },
        };
        let ordered = match (start, resolved_end) {
            (Moment::Instant(s), Moment::Instant(e)) => s < e,
            (s, e) => s.date() <= e.date(),
        };
        if !ordered {
            return Err(ModelError::PeriodOrder {
                start: start.to_string(),
                end: resolved_end.to_string(),
            });
        }
        Ok(Period {
            start,
            end,
            resolved_end,
        })
    }

    pub fn start(&self) -> Moment {
        self.start
    }

    pub fn end(&self) -> PeriodEnd {
        self.end
    }

    /// End as an absolute point, with a relative end resolved against
    /// the start.
    pub fn real_end(&self) -> Moment {
        self.resolved_end
    }

    /// Whether the moment falls inside the span, ends included. A date
    /// on either side of the comparison drops it to date granularity.
    pub fn contains(&self, moment: &Moment) -> bool {
        !self.start.is_after(moment) && !self.resolved_end.is_before(moment)
    }
}
