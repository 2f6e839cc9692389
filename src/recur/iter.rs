use std::collections::VecDeque;

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use crate::recur::rule::{Frequency, Prepared};
use crate::time::Timestamp;
use crate::time::moment::{at_offset, days_in_month, year_length};

/// Iteration stops once the stepping year passes this bound.
const MAX_YEAR: i64 = 9999;

pub(crate) fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Steps `value` by `interval` modulo `base` until it lands on a
/// permitted value, returning the wrap count and the landing value.
///
/// `None` means no permitted value is reachable; callers pre-filter the
/// permitted set so this only happens on defensive paths.
pub(crate) fn mod_distance(
    value: i64,
    permitted: &[u32],
    base: i64,
    interval: i64,
) -> Option<(i64, i64)> {
    let mut value = value;
    let mut carried = 0;
    for _ in 0..base {
        let advanced = value + interval;
        carried += advanced.div_euclid(base);
        value = advanced.rem_euclid(base);
        if permitted.contains(&(value as u32)) {
            return Some((carried, value));
        }
    }
    None
}

/// Gregorian Easter Sunday, Butcher's algorithm.
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Per-year day masks the filters index into.
///
/// Each day-indexed mask is at least seven days longer than the year so
/// week windows that cross into January of the following year stay
/// indexable.
#[derive(Debug, Default)]
struct IterInfo {
    last_year: Option<i32>,
    last_month: Option<u32>,
    year_len: usize,
    next_year_len: usize,
    year_start: NaiveDate,
    month_range: Vec<usize>,
    month_mask: Vec<u32>,
    month_day_mask: Vec<u32>,
    neg_month_day_mask: Vec<i32>,
    weekday_mask: Vec<u32>,
    week_no_mask: Option<Vec<u8>>,
    nth_weekday_mask: Option<Vec<u8>>,
    easter_mask: Option<Vec<u8>>,
}

impl IterInfo {
    /// Refreshes the masks for a new position, false when the year is
    /// not representable.
    fn rebuild(&mut self, rule: &Prepared, year: i32, month: u32) -> bool {
        if self.last_year != Some(year) && !self.rebuild_year(rule, year) {
            return false;
        }
        if !rule.bynweekday.is_empty()
            && (self.last_month != Some(month) || self.last_year != Some(year))
        {
            self.rebuild_nth_weekday(rule, month);
        }
        self.last_year = Some(year);
        self.last_month = Some(month);
        true
    }

    fn rebuild_year(&mut self, rule: &Prepared, year: i32) -> bool {
        let Some(year_start) = NaiveDate::from_ymd_opt(year, 1, 1) else {
            return false;
        };
        self.year_start = year_start;
        self.year_len = year_length(year) as usize;
        self.next_year_len = year_length(year + 1) as usize;
        let jan1_weekday = year_start.weekday().num_days_from_monday() as usize;

        self.month_mask.clear();
        self.month_day_mask.clear();
        self.neg_month_day_mask.clear();
        self.month_range.clear();
        self.month_range.push(0);
        for month in 1..=12u32 {
            let len = days_in_month(year, month);
            for day in 1..=len {
                self.month_mask.push(month);
                self.month_day_mask.push(day);
                self.neg_month_day_mask.push(day as i32 - len as i32 - 1);
            }
            self.month_range.push(self.month_mask.len());
        }
        // Next January is always 31 days long.
        for day in 1..=7u32 {
            self.month_mask.push(1);
            self.month_day_mask.push(day);
            self.neg_month_day_mask.push(day as i32 - 32);
        }
        self.weekday_mask = (0..self.year_len + 14)
            .map(|i| ((jan1_weekday + i) % 7) as u32)
            .collect();

        self.week_no_mask = if rule.byweekno.is_empty() {
            None
        } else {
            Some(self.build_week_no_mask(rule, year, jan1_weekday))
        };

        self.easter_mask = if rule.byeaster.is_empty() {
            None
        } else {
            let mut mask = vec![0u8; self.year_len + 7];
            if let Some(easter) = easter_sunday(year) {
                let easter_index = (easter - year_start).num_days();
                for &offset in &rule.byeaster {
                    let index = easter_index + i64::from(offset);
                    if index >= 0 && (index as usize) < mask.len() {
                        mask[index as usize] = 1;
                    }
                }
            }
            Some(mask)
        };
        true
    }

    /// Marks every day belonging to a requested week number.
    fn build_week_no_mask(&self, rule: &Prepared, year: i32, jan1_weekday: usize) -> Vec<u8> {
        let mut mask = vec![0u8; self.year_len + 7];
        let wkst = rule.wkst as usize;
        let first_wkst_index = (7 + wkst - jan1_weekday) % 7;
        let (week1_start, week_year_len) = if first_wkst_index >= 4 {
            // Week one claims days from the old year.
            (0, self.year_len + (jan1_weekday + 7 - wkst) % 7)
        } else {
            // Days before the first week start belong to the old year.
            (first_wkst_index, self.year_len - first_wkst_index)
        };
        let num_weeks = week_year_len / 7 + week_year_len % 7 / 4;

        for &declared in &rule.byweekno {
            let mut n = i64::from(declared);
            if n < 0 {
                n += num_weeks as i64 + 1;
            }
            if n <= 0 || n > num_weeks as i64 {
                continue;
            }
            let mut i = if n > 1 {
                let mut i = week1_start as i64 + (n - 1) * 7;
                if week1_start != first_wkst_index {
                    i -= 7 - first_wkst_index as i64;
                }
                i
            } else {
                week1_start as i64
            };
            for _ in 0..7 {
                if i < 0 || i as usize >= mask.len() {
                    break;
                }
                mask[i as usize] = 1;
                i += 1;
                if self.weekday_mask[i as usize] == rule.wkst {
                    break;
                }
            }
        }

        if rule.byweekno.contains(&1) {
            // Week one of the next year may begin inside this year.
            let mut i = week1_start as i64 + num_weeks as i64 * 7;
            if week1_start != first_wkst_index {
                i -= 7 - first_wkst_index as i64;
            }
            if i >= 0 && (i as usize) < self.year_len {
                for _ in 0..7 {
                    mask[i as usize] = 1;
                    i += 1;
                    if self.weekday_mask[i as usize] == rule.wkst {
                        break;
                    }
                }
            }
        }

        if week1_start != 0 {
            // Days before week one carry the last week number of the
            // previous year.
            let last_week_number = if rule.byweekno.contains(&-1) {
                -1
            } else {
                let prev_jan1_weekday = NaiveDate::from_ymd_opt(year - 1, 1, 1)
                    .map(|d| i64::from(d.weekday().num_days_from_monday()))
                    .unwrap_or(0);
                let prev_year_len = i64::from(year_length(year - 1));
                let prev_week1_start = (7 - prev_jan1_weekday + wkst as i64) % 7;
                if prev_week1_start >= 4 {
                    52 + (prev_year_len + (prev_jan1_weekday - wkst as i64).rem_euclid(7)) % 7 / 4
                } else {
                    52 + (self.year_len as i64 - week1_start as i64) % 7 / 4
                }
            };
            if rule.byweekno.contains(&(last_week_number as i32)) {
                for slot in mask.iter_mut().take(week1_start) {
                    *slot = 1;
                }
            }
        }
        mask
    }

    /// Marks the days selected by ordinal weekdays, per month or per
    /// year depending on the rule frequency.
    fn rebuild_nth_weekday(&mut self, rule: &Prepared, month: u32) {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        match rule.freq {
            Frequency::Yearly => {
                if rule.bymonth.is_empty() {
                    ranges.push((0, self.year_len));
                } else {
                    for &m in &rule.bymonth {
                        ranges.push((self.month_range[m as usize - 1], self.month_range[m as usize]));
                    }
                }
            }
            Frequency::Monthly => {
                ranges.push((
                    self.month_range[month as usize - 1],
                    self.month_range[month as usize],
                ));
            }
            _ => {}
        }
        if ranges.is_empty() {
            self.nth_weekday_mask = None;
            return;
        }
        let mut mask = vec![0u8; self.year_len];
        for (first, last) in ranges {
            let first = first as i64;
            let last = last as i64 - 1;
            for &(weekday, n) in &rule.bynweekday {
                let mut i = if n < 0 {
                    last + (i64::from(n) + 1) * 7
                } else {
                    first + (i64::from(n) - 1) * 7
                };
                if i < 0 || i as usize >= self.weekday_mask.len() {
                    continue;
                }
                if n < 0 {
                    i -= i64::from((self.weekday_mask[i as usize] + 7 - weekday) % 7);
                } else {
                    i += i64::from((7 - self.weekday_mask[i as usize] + weekday) % 7);
                }
                if first <= i && i <= last {
                    mask[i as usize] = 1;
                }
            }
        }
        self.nth_weekday_mask = Some(mask);
    }
}

/// Occurrence generator for one prepared rule.
///
/// Walks interval steps of the rule frequency, materializing each step
/// as a batch of surviving day and time combinations. Candidates before
/// the start instant are skipped, the `until` bound and occurrence count
/// finish the stream, and stepping stops at year 9999.
pub(crate) struct RuleIter<'r> {
    rule: &'r Prepared,
    info: IterInfo,
    offset: FixedOffset,
    year: i32,
    month: u32,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
    weekday: u32,
    timeset: Vec<NaiveTime>,
    remaining: Option<u32>,
    pending: VecDeque<Timestamp>,
    finished: bool,
}

impl<'r> RuleIter<'r> {
    pub(crate) fn new(rule: &'r Prepared) -> Self {
        let wall = rule.dtstart.naive_local();
        let mut iter = RuleIter {
            rule,
            info: IterInfo::default(),
            offset: *rule.dtstart.offset(),
            year: wall.year(),
            month: wall.month(),
            day: i64::from(wall.day()),
            hour: i64::from(wall.hour()),
            minute: i64::from(wall.minute()),
            second: i64::from(wall.second()),
            weekday: wall.weekday().num_days_from_monday(),
            timeset: Vec::new(),
            remaining: rule.count,
            pending: VecDeque::new(),
            finished: false,
        };
        if i64::from(iter.year) > MAX_YEAR || !iter.info.rebuild(rule, iter.year, iter.month) {
            iter.finished = true;
            return iter;
        }
        if rule.freq < Frequency::Hourly {
            iter.timeset = rule.timeset.clone();
        } else {
            // A start instant whose time fields miss the filters leaves
            // the first day without candidates.
            let skip = (!rule.byhour.is_empty() && !rule.byhour.contains(&(iter.hour as u32)))
                || (rule.freq >= Frequency::Minutely
                    && !rule.byminute.is_empty()
                    && !rule.byminute.contains(&(iter.minute as u32)))
                || (rule.freq >= Frequency::Secondly
                    && !rule.bysecond.is_empty()
                    && !rule.bysecond.contains(&(iter.second as u32)));
            iter.timeset = if skip { Vec::new() } else { iter.build_timeset() };
        }
        iter
    }

    fn build_timeset(&self) -> Vec<NaiveTime> {
        let rule = self.rule;
        let mut times = Vec::new();
        match rule.freq {
            Frequency::Hourly => {
                for &minute in &rule.byminute {
                    for &second in &rule.bysecond {
                        if let Some(time) = NaiveTime::from_hms_opt(self.hour as u32, minute, second)
                        {
                            times.push(time);
                        }
                    }
                }
            }
            Frequency::Minutely => {
                for &second in &rule.bysecond {
                    if let Some(time) =
                        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, second)
                    {
                        times.push(time);
                    }
                }
            }
            Frequency::Secondly => {
                if let Some(time) = NaiveTime::from_hms_opt(
                    self.hour as u32,
                    self.minute as u32,
                    self.second as u32,
                ) {
                    times.push(time);
                }
            }
            _ => {}
        }
        times.sort_unstable();
        times
    }

    fn day_index(&self) -> Option<usize> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day as u32)?;
        usize::try_from((date - self.info.year_start).num_days()).ok()
    }

    fn date_of(&self, index: usize) -> Option<NaiveDate> {
        self.info
            .year_start
            .checked_add_signed(TimeDelta::days(index as i64))
    }

    /// The candidate days of the current step, filters applied. The
    /// flag reports whether any day was filtered away.
    fn step_days(&self) -> Option<(Vec<usize>, bool)> {
        let rule = self.rule;
        let candidates: Vec<usize> = match rule.freq {
            Frequency::Yearly => (0..self.info.year_len).collect(),
            Frequency::Monthly => {
                let month = self.month as usize;
                (self.info.month_range[month - 1]..self.info.month_range[month]).collect()
            }
            Frequency::Weekly => {
                let mut i = self.day_index()?;
                let mut days = Vec::with_capacity(7);
                for _ in 0..7 {
                    days.push(i);
                    i += 1;
                    if self.info.weekday_mask[i] == rule.wkst {
                        break;
                    }
                }
                days
            }
            _ => vec![self.day_index()?],
        };
        let mut days = Vec::with_capacity(candidates.len());
        let mut filtered = false;
        for index in candidates {
            if self.day_excluded(index) {
                filtered = true;
            } else {
                days.push(index);
            }
        }
        Some((days, filtered))
    }

    fn day_excluded(&self, i: usize) -> bool {
        let rule = self.rule;
        let info = &self.info;
        if !rule.bymonth.is_empty() && !rule.bymonth.contains(&info.month_mask[i]) {
            return true;
        }
        if !rule.byweekno.is_empty() && info.week_no_mask.as_ref().is_some_and(|m| m[i] == 0) {
            return true;
        }
        if !rule.byweekday.is_empty() && !rule.byweekday.contains(&info.weekday_mask[i]) {
            return true;
        }
        if info
            .nth_weekday_mask
            .as_ref()
            .is_some_and(|m| m.get(i).copied().unwrap_or(0) == 0)
        {
            return true;
        }
        if !rule.byeaster.is_empty() && info.easter_mask.as_ref().is_some_and(|m| m[i] == 0) {
            return true;
        }
        if (!rule.bymonthday.is_empty() || !rule.bynmonthday.is_empty())
            && !rule.bymonthday.contains(&info.month_day_mask[i])
            && !rule.bynmonthday.contains(&info.neg_month_day_mask[i])
        {
            return true;
        }
        if !rule.byyearday.is_empty() {
            let index = i as i32;
            let year_len = info.year_len as i32;
            let missed = if index < year_len {
                !rule.byyearday.contains(&(index + 1))
                    && !rule.byyearday.contains(&(index - year_len))
            } else {
                // Cross-year days are judged against the next year.
                !rule.byyearday.contains(&(index + 1 - year_len))
                    && !rule
                        .byyearday
                        .contains(&(index - year_len - info.next_year_len as i32))
            };
            if missed {
                return true;
            }
        }
        false
    }

    fn emit(&mut self, days: &[usize]) {
        let rule = self.rule;
        if !rule.bysetpos.is_empty() && !self.timeset.is_empty() {
            // Positions index into the day-by-time batch of this step.
            let mut selected: Vec<Timestamp> = Vec::new();
            let time_count = self.timeset.len() as i64;
            for &pos in &rule.bysetpos {
                let ordinal = if pos < 0 {
                    i64::from(pos)
                } else {
                    i64::from(pos) - 1
                };
                let day_pos = ordinal.div_euclid(time_count);
                let time_pos = ordinal.rem_euclid(time_count);
                let index = if day_pos < 0 {
                    days.len() as i64 + day_pos
                } else {
                    day_pos
                };
                if index < 0 || index >= days.len() as i64 {
                    continue;
                }
                let Some(date) = self.date_of(days[index as usize]) else {
                    continue;
                };
                let instant = at_offset(
                    NaiveDateTime::new(date, self.timeset[time_pos as usize]),
                    self.offset,
                );
                if !selected.contains(&instant) {
                    selected.push(instant);
                }
            }
            selected.sort_unstable();
            for instant in selected {
                if !self.push_candidate(instant) {
                    return;
                }
            }
        } else {
            for &day in days {
                let Some(date) = self.date_of(day) else {
                    self.finished = true;
                    return;
                };
                for i in 0..self.timeset.len() {
                    let instant = at_offset(NaiveDateTime::new(date, self.timeset[i]), self.offset);
                    if !self.push_candidate(instant) {
                        return;
                    }
                }
            }
        }
    }

    /// Applies the stream bounds to one candidate; false stops the step.
    fn push_candidate(&mut self, instant: Timestamp) -> bool {
        if let Some(until) = self.rule.until {
            if instant > until {
                self.finished = true;
                return false;
            }
        }
        if instant >= self.rule.dtstart {
            if let Some(remaining) = &mut self.remaining {
                if *remaining == 0 {
                    self.finished = true;
                    return false;
                }
                *remaining -= 1;
            }
            self.pending.push_back(instant);
        }
        true
    }

    /// Moves the position one interval step forward.
    ///
    /// `filtered` signals that the step lost days to the filters, which
    /// lets sub-daily frequencies jump to the end of a dead day instead
    /// of crawling through it.
    fn advance(&mut self, filtered: bool) {
        let rule = self.rule;
        let interval = rule.interval;
        let mut fix_day = false;
        match rule.freq {
            Frequency::Yearly => {
                let year = i64::from(self.year) + interval;
                if year > MAX_YEAR {
                    self.finished = true;
                    return;
                }
                self.year = year as i32;
                if !self.info.rebuild(rule, self.year, self.month) {
                    self.finished = true;
                    return;
                }
            }
            Frequency::Monthly => {
                let mut month = i64::from(self.month) + interval;
                if month > 12 {
                    let mut year_carry = month.div_euclid(12);
                    month = month.rem_euclid(12);
                    if month == 0 {
                        month = 12;
                        year_carry -= 1;
                    }
                    let year = i64::from(self.year) + year_carry;
                    if year > MAX_YEAR {
                        self.finished = true;
                        return;
                    }
                    self.year = year as i32;
                }
                self.month = month as u32;
                if !self.info.rebuild(rule, self.year, self.month) {
                    self.finished = true;
                    return;
                }
            }
            Frequency::Weekly => {
                if rule.wkst > self.weekday {
                    self.day += -i64::from(self.weekday + 1 + (6 - rule.wkst)) + interval * 7;
                } else {
                    self.day += -i64::from(self.weekday - rule.wkst) + interval * 7;
                }
                self.weekday = rule.wkst;
                fix_day = true;
            }
            Frequency::Daily => {
                self.day += interval;
                fix_day = true;
            }
            Frequency::Hourly => {
                if filtered {
                    self.hour += ((23 - self.hour) / interval) * interval;
                }
                let (day_carry, hour) = if rule.byhour.is_empty() {
                    (
                        (self.hour + interval).div_euclid(24),
                        (self.hour + interval).rem_euclid(24),
                    )
                } else {
                    match mod_distance(self.hour, &rule.byhour, 24, interval) {
                        Some(step) => step,
                        None => {
                            self.finished = true;
                            return;
                        }
                    }
                };
                self.hour = hour;
                if day_carry > 0 {
                    self.day += day_carry;
                    fix_day = true;
                }
                self.timeset = self.build_timeset();
            }
            Frequency::Minutely => {
                if filtered {
                    self.minute += ((1439 - (self.hour * 60 + self.minute)) / interval) * interval;
                }
                let repetitions = 1440 / gcd(interval, 1440);
                let mut valid = false;
                for _ in 0..repetitions {
                    let (hour_carry, minute) = if rule.byminute.is_empty() {
                        (
                            (self.minute + interval).div_euclid(60),
                            (self.minute + interval).rem_euclid(60),
                        )
                    } else {
                        match mod_distance(self.minute, &rule.byminute, 60, interval) {
                            Some(step) => step,
                            None => break,
                        }
                    };
                    self.minute = minute;
                    let total_hours = self.hour + hour_carry;
                    self.hour = total_hours.rem_euclid(24);
                    let day_carry = total_hours.div_euclid(24);
                    if day_carry > 0 {
                        self.day += day_carry;
                        fix_day = true;
                    }
                    if rule.byhour.is_empty() || rule.byhour.contains(&(self.hour as u32)) {
                        valid = true;
                        break;
                    }
                }
                if !valid {
                    self.finished = true;
                    return;
                }
                self.timeset = self.build_timeset();
            }
            Frequency::Secondly => {
                if filtered {
                    self.second += ((86399 - (self.hour * 3600 + self.minute * 60 + self.second))
                        / interval)
                        * interval;
                }
                let repetitions = 86400 / gcd(interval, 86400);
                let mut valid = false;
                for _ in 0..repetitions {
                    let (minute_carry, second) = if rule.bysecond.is_empty() {
                        (
                            (self.second + interval).div_euclid(60),
                            (self.second + interval).rem_euclid(60),
                        )
                    } else {
                        match mod_distance(self.second, &rule.bysecond, 60, interval) {
                            Some(step) => step,
                            None => break,
                        }
                    };
                    self.second = second;
                    let total_minutes = self.minute + minute_carry;
                    self.minute = total_minutes.rem_euclid(60);
                    let hour_carry = total_minutes.div_euclid(60);
                    if hour_carry != 0 {
                        let total_hours = self.hour + hour_carry;
                        self.hour = total_hours.rem_euclid(24);
                        let day_carry = total_hours.div_euclid(24);
                        if day_carry > 0 {
                            self.day += day_carry;
                            fix_day = true;
                        }
                    }
                    if (rule.byhour.is_empty() || rule.byhour.contains(&(self.hour as u32)))
                        && (rule.byminute.is_empty()
                            || rule.byminute.contains(&(self.minute as u32)))
                        && (rule.bysecond.is_empty()
                            || rule.bysecond.contains(&(self.second as u32)))
                    {
                        valid = true;
                        break;
                    }
                }
                if !valid {
                    self.finished = true;
                    return;
                }
                self.timeset = self.build_timeset();
            }
        }
        if fix_day && self.day > 28 {
            let mut month_len = i64::from(days_in_month(self.year, self.month));
            if self.day > month_len {
                while self.day > month_len {
                    self.day -= month_len;
                    self.month += 1;
                    if self.month == 13 {
                        self.month = 1;
                        if i64::from(self.year) + 1 > MAX_YEAR {
                            self.finished = true;
                            return;
                        }
                        self.year += 1;
                    }
                    month_len = i64::from(days_in_month(self.year, self.month));
                }
                if !self.info.rebuild(rule, self.year, self.month) {
                    self.finished = true;
                }
            }
        }
    }
}

impl Iterator for RuleIter<'_> {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Timestamp> {
        loop {
            if let Some(instant) = self.pending.pop_front() {
                return Some(instant);
            }
            if self.finished {
                return None;
            }
            let Some((days, filtered)) = self.step_days() else {
                self.finished = true;
                continue;
            };
            self.emit(&days);
            if !self.finished {
                self.advance(filtered);
            }
        }
    }
}
