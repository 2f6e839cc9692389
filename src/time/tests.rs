#[cfg(test)]
mod tests {
    use crate::error::ModelError;
    use crate::time::duration::*;
    use crate::time::moment::*;
    use crate::time::period::*;
    use crate::time::weekday::*;
    use chrono::{NaiveDate, TimeDelta};

    fn delta(spec: CalendarDeltaSpec) -> CalendarDelta {
        CalendarDelta::try_from(spec).unwrap()
    }

    fn ts(raw: &str) -> Timestamp {
        chrono::DateTime::parse_from_rfc3339(raw).unwrap()
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_full_duration_text() {
        let d = CalendarDelta::parse("P1Y2M3DT4H5M6S").unwrap();
        assert_eq!(d.years(), 1);
        assert_eq!(d.months(), 2);
        assert_eq!(d.days(), 3);
        assert_eq!(d.hours(), 4);
        assert_eq!(d.minutes(), 5);
        assert_eq!(d.seconds(), 6);
        assert_eq!(d.to_text().unwrap(), "P1Y2M3DT4H5M6S");
    }

    #[test]
    fn test_parse_week_form_folds_into_days() {
        let d = CalendarDelta::parse("P2W").unwrap();
        assert_eq!(d.days(), 14);
        assert_eq!(d.to_text().unwrap(), "P14D");
    }

    #[test]
    fn test_parse_negative_components() {
        let d = CalendarDelta::parse("P-1MT-30M").unwrap();
        assert_eq!(d.months(), -1);
        assert_eq!(d.minutes(), -30);
        assert_eq!(d.to_text().unwrap(), "P-1MT-30M");
    }

    #[test]
    fn test_zero_duration_renders_pt0s() {
        assert_eq!(CalendarDelta::default().to_text().unwrap(), "PT0S");
        assert_eq!(CalendarDelta::parse("PT0S").unwrap(), CalendarDelta::default());
        // The grammar admits a bare P as an empty duration.
        assert_eq!(CalendarDelta::parse("P").unwrap(), CalendarDelta::default());
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        for bad in ["", "1D", "P1H", "PT1D", "P-2W", "P1Y2W", "p1d", "P1Y "] {
            assert!(
                matches!(CalendarDelta::parse(bad), Err(ModelError::DurationParse(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_round_trip_through_text() {
        for text in ["P1Y", "P-3D", "PT90S", "P1YT1S", "P10M2DT5H"] {
            let d = CalendarDelta::parse(text).unwrap();
            assert_eq!(CalendarDelta::parse(&d.to_text().unwrap()).unwrap(), d);
        }
    }

    #[test]
    fn test_construction_normalizes_carry() {
        let d = delta(CalendarDeltaSpec {
            seconds: 3725,
            ..Default::default()
        });
        assert_eq!((d.hours(), d.minutes(), d.seconds()), (1, 2, 5));

        let d = delta(CalendarDeltaSpec {
            seconds: -90,
            ..Default::default()
        });
        assert_eq!((d.minutes(), d.seconds()), (-1, -30));

        let d = delta(CalendarDeltaSpec {
            months: 25,
            ..Default::default()
        });
        assert_eq!((d.years(), d.months()), (2, 1));

        // Days never carry into months.
        let d = delta(CalendarDeltaSpec {
            days: 400,
            ..Default::default()
        });
        assert_eq!((d.years(), d.months(), d.days()), (0, 0, 400));
    }

    #[test]
    fn test_construction_rejects_out_of_range_overrides() {
        let spec = CalendarDeltaSpec {
            month: Some(13),
            ..Default::default()
        };
        assert!(matches!(
            CalendarDelta::try_from(spec),
            Err(ModelError::OutOfRange { field: "month", .. })
        ));
        let spec = CalendarDeltaSpec {
            hour: Some(24),
            ..Default::default()
        };
        assert!(CalendarDelta::try_from(spec).is_err());
    }

    #[test]
    fn test_shift_clamps_to_month_end() {
        let d = delta(CalendarDeltaSpec {
            months: 1,
            ..Default::default()
        });
        let shifted = d.shift(ts("2024-01-31T12:00:00+00:00")).unwrap();
        assert_eq!(shifted, ts("2024-02-29T12:00:00+00:00"));
        let shifted = d.shift(ts("2023-01-31T12:00:00+00:00")).unwrap();
        assert_eq!(shifted, ts("2023-02-28T12:00:00+00:00"));
    }

    #[test]
    fn test_shift_applies_absolute_overrides() {
        let d = delta(CalendarDeltaSpec {
            year: Some(2025),
            month: Some(2),
            day: Some(31),
            hour: Some(8),
            ..Default::default()
        });
        let shifted = d.shift(ts("2024-06-15T17:30:00+02:00")).unwrap();
        assert_eq!(shifted, ts("2025-02-28T08:30:00+02:00"));
    }

    #[test]
    fn test_shift_keeps_the_utc_offset() {
        let d = delta(CalendarDeltaSpec {
            days: 1,
            ..Default::default()
        });
        let shifted = d.shift(ts("2024-03-30T12:00:00+05:30")).unwrap();
        assert_eq!(shifted, ts("2024-03-31T12:00:00+05:30"));
    }

    #[test]
    fn test_shift_jumps_to_weekday() {
        // 1997-09-02 is a Tuesday.
        let anchor = ts("1997-09-02T09:00:00+00:00");
        let jump = |wd: WeekdayOffset| {
            delta(CalendarDeltaSpec {
                weekday: Some(wd),
                ..Default::default()
            })
            .shift(anchor)
            .unwrap()
        };
        assert_eq!(
            jump(WeekdayOffset::nth(Weekday::Monday, 1)),
            ts("1997-09-08T09:00:00+00:00")
        );
        // Already on the target day: a forward jump stays put.
        assert_eq!(
            jump(WeekdayOffset::nth(Weekday::Tuesday, 1)),
            ts("1997-09-02T09:00:00+00:00")
        );
        assert_eq!(
            jump(WeekdayOffset::nth(Weekday::Monday, 2)),
            ts("1997-09-15T09:00:00+00:00")
        );
        assert_eq!(
            jump(WeekdayOffset::nth(Weekday::Monday, -1)),
            ts("1997-09-01T09:00:00+00:00")
        );
        // A zero ordinal jumps like the first occurrence.
        assert_eq!(
            jump(WeekdayOffset::every(Weekday::Friday)),
            ts("1997-09-05T09:00:00+00:00")
        );
    }

    #[test]
    fn test_yearday_counts_days_of_the_actual_year() {
        let d = delta(CalendarDeltaSpec {
            yearday: Some(60),
            ..Default::default()
        });
        assert_eq!(d.month(), Some(3));
        assert_eq!(d.day(), Some(1));
        assert_eq!(d.leapdays(), -1);
        // 60th day: Feb 29 in a leap year, Mar 1 otherwise.
        let leap = d.shift(ts("2024-01-01T00:00:00+00:00")).unwrap();
        assert_eq!(leap, ts("2024-02-29T00:00:00+00:00"));
        let plain = d.shift(ts("2023-01-01T00:00:00+00:00")).unwrap();
        assert_eq!(plain, ts("2023-03-01T00:00:00+00:00"));
    }

    #[test]
    fn test_nlyearday_skips_the_leap_adjustment() {
        let d = delta(CalendarDeltaSpec {
            nlyearday: Some(60),
            ..Default::default()
        });
        assert_eq!(d.leapdays(), 0);
        let leap = d.shift(ts("2024-01-01T00:00:00+00:00")).unwrap();
        assert_eq!(leap, ts("2024-03-01T00:00:00+00:00"));
    }

    #[test]
    fn test_yearday_out_of_range_is_rejected() {
        for bad in [0, 367, -1] {
            let spec = CalendarDeltaSpec {
                yearday: Some(bad),
                ..Default::default()
            };
            assert!(CalendarDelta::try_from(spec).is_err(), "yearday {bad}");
        }
    }

    #[test]
    fn test_elapsed_conversion() {
        let d = CalendarDelta::parse("P3DT4H").unwrap();
        assert_eq!(
            d.to_elapsed().unwrap(),
            TimeDelta::days(3) + TimeDelta::hours(4)
        );
        let months = CalendarDelta::parse("P1M").unwrap();
        assert!(matches!(
            months.to_elapsed(),
            Err(ModelError::InexactDelta { field: "months" })
        ));
        let with_weekday = delta(CalendarDeltaSpec {
            weekday: Some(WeekdayOffset::every(Weekday::Monday)),
            ..Default::default()
        });
        assert!(with_weekday.to_elapsed().is_err());
    }

    #[test]
    fn test_text_conversion_fails_for_calendar_only_fields() {
        let d = delta(CalendarDeltaSpec {
            leapdays: -1,
            ..Default::default()
        });
        assert!(matches!(
            d.to_text(),
            Err(ModelError::UnrenderableDelta { field: "leapdays" })
        ));
        let d = delta(CalendarDeltaSpec {
            day: Some(1),
            ..Default::default()
        });
        assert!(matches!(
            d.to_text(),
            Err(ModelError::UnrenderableDelta { field: "day" })
        ));
    }

    #[test]
    fn test_shift_date_truncates_partial_days() {
        let plus_25h = CalendarDelta::parse("PT25H").unwrap();
        assert_eq!(
            plus_25h.shift_date(date("2024-05-01")).unwrap(),
            date("2024-05-02")
        );
        let minus_1h = CalendarDelta::parse("PT-1H").unwrap();
        assert_eq!(
            minus_1h.shift_date(date("2024-05-01")).unwrap(),
            date("2024-04-30")
        );
    }

    #[test]
    fn test_shift_date_rejects_time_overrides() {
        let d = delta(CalendarDeltaSpec {
            hour: Some(9),
            ..Default::default()
        });
        assert!(matches!(
            d.shift_date(date("2024-05-01")),
            Err(ModelError::DateOnlyDelta { field: "hour" })
        ));
    }

    #[test]
    fn test_delta_serializes_text_when_renderable() {
        let d = CalendarDelta::parse("P1Y2M").unwrap();
        assert_eq!(serde_json::to_value(d).unwrap(), serde_json::json!("P1Y2M"));
        let structured = delta(CalendarDeltaSpec {
            yearday: Some(60),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_value(structured).unwrap(),
            serde_json::json!({"leapdays": -1, "month": 3, "day": 1})
        );
    }

    #[test]
    fn test_delta_deserializes_both_forms() {
        let from_text: CalendarDelta = serde_json::from_value(serde_json::json!("P1D")).unwrap();
        assert_eq!(from_text.days(), 1);
        let from_fields: CalendarDelta =
            serde_json::from_value(serde_json::json!({"weeks": 1, "hours": 2})).unwrap();
        assert_eq!(from_fields.days(), 7);
        assert_eq!(from_fields.hours(), 2);
        assert!(
            serde_json::from_value::<CalendarDelta>(serde_json::json!({"fortnights": 1})).is_err()
        );
    }

    #[test]
    fn test_weekday_codes_and_numbers() {
        assert_eq!(Weekday::from_code("mo").unwrap(), Weekday::Monday);
        assert_eq!(Weekday::from_code("SU").unwrap(), Weekday::Sunday);
        assert!(Weekday::from_code("XX").is_err());
        assert_eq!(Weekday::from_number(3).unwrap(), Weekday::Thursday);
        assert!(Weekday::from_number(7).is_err());
        assert!(Weekday::from_number(-1).is_err());
        assert_eq!(Weekday::from(chrono::Weekday::Wed), Weekday::Wednesday);
        assert_eq!(chrono::Weekday::from(Weekday::Sunday), chrono::Weekday::Sun);
    }

    #[test]
    fn test_weekday_offset_wire_forms() {
        let bare: WeekdayOffset = serde_json::from_value(serde_json::json!("MO")).unwrap();
        assert_eq!(bare, WeekdayOffset::every(Weekday::Monday));
        let numbered: WeekdayOffset = serde_json::from_value(serde_json::json!(4)).unwrap();
        assert_eq!(numbered, WeekdayOffset::every(Weekday::Friday));
        let mapped: WeekdayOffset = serde_json::from_value(serde_json::json!({"TU": 2})).unwrap();
        assert_eq!(mapped, WeekdayOffset::nth(Weekday::Tuesday, 2));

        assert_eq!(
            serde_json::to_value(WeekdayOffset::every(Weekday::Monday)).unwrap(),
            serde_json::json!("MO")
        );
        assert_eq!(
            serde_json::to_value(WeekdayOffset::nth(Weekday::Tuesday, -1)).unwrap(),
            serde_json::json!({"TU": -1})
        );
    }

    #[test]
    fn test_weekday_offset_rejects_bad_maps() {
        assert!(serde_json::from_value::<WeekdayOffset>(serde_json::json!({"TU": 0})).is_err());
        assert!(
            serde_json::from_value::<WeekdayOffset>(serde_json::json!({"TU": 1, "WE": 2})).is_err()
        );
        assert!(serde_json::from_value::<WeekdayOffset>(serde_json::json!({})).is_err());
        assert!(serde_json::from_value::<WeekdayOffset>(serde_json::json!({"XX": 1})).is_err());
    }

    #[test]
    fn test_moment_parses_dates_and_instants() {
        assert_eq!(
            Moment::parse("2024-05-01").unwrap(),
            Moment::Date(date("2024-05-01"))
        );
        let instant = Moment::parse("2024-05-01T10:00:00+02:00").unwrap();
        assert_eq!(instant.instant().unwrap(), ts("2024-05-01T10:00:00+02:00"));
        assert_eq!(instant.date(), date("2024-05-01"));
        assert!(Moment::parse("not a moment").is_err());
    }

    #[test]
    fn test_naive_input_resolves_to_local_wall_time() {
        let parsed = parse_timestamp("2024-05-01T10:00:00").unwrap();
        assert_eq!(
            parsed.naive_local(),
            date("2024-05-01").and_hms_opt(10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_bare_date_parses_to_local_midnight() {
        let parsed = parse_timestamp("2024-01-03").unwrap();
        assert_eq!(
            parsed.naive_local(),
            date("2024-01-03").and_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_period_orders_its_ends() {
        let start = Moment::parse("2024-01-02").unwrap();
        let end = Moment::parse("2024-01-01").unwrap();
        assert!(matches!(
            Period::new(start, PeriodEnd::At(end)),
            Err(ModelError::PeriodOrder { .. })
        ));
        // Dates may coincide; equal instants may not.
        assert!(Period::new(start, PeriodEnd::At(start)).is_ok());
        let instant = Moment::parse("2024-01-01T10:00:00+00:00").unwrap();
        assert!(Period::new(instant, PeriodEnd::At(instant)).is_err());
    }

    #[test]
    fn test_period_resolves_relative_end() {
        let start = Moment::parse("2024-01-31").unwrap();
        let period = Period::new(
            start,
            PeriodEnd::After(CalendarDelta::parse("P1M").unwrap()),
        )
        .unwrap();
        assert_eq!(period.real_end(), Moment::Date(date("2024-02-29")));
        assert!(period.contains(&Moment::parse("2024-02-29").unwrap()));
        assert!(!period.contains(&Moment::parse("2024-03-01").unwrap()));
    }

    #[test]
    fn test_period_contains_mixes_granularity() {
        let period = Period::new(
            Moment::parse("2024-01-01").unwrap(),
            PeriodEnd::At(Moment::parse("2024-01-31").unwrap()),
        )
        .unwrap();
        // An instant within the end date still counts at date granularity.
        assert!(period.contains(&Moment::parse("2024-01-31T23:00:00+00:00").unwrap()));
        assert!(!period.contains(&Moment::parse("2024-02-01T00:00:00+00:00").unwrap()));

        let timed = Period::new(
            Moment::parse("2024-01-01T12:00:00+00:00").unwrap(),
            PeriodEnd::At(Moment::parse("2024-01-02T12:00:00+00:00").unwrap()),
        )
        .unwrap();
        assert!(!timed.contains(&Moment::parse("2024-01-02T13:00:00+00:00").unwrap()));
        // A bare date compares at date granularity against both instants.
        assert!(timed.contains(&Moment::parse("2024-01-02").unwrap()));
    }

    #[test]
    fn test_period_wire_round_trip() {
        let period: Period =
            serde_json::from_value(serde_json::json!({"start": "2024-01-01", "end": "P1M"}))
                .unwrap();
        assert_eq!(period.real_end(), Moment::Date(date("2024-02-01")));
        assert_eq!(
            serde_json::to_value(period).unwrap(),
            serde_json::json!({"start": "2024-01-01", "end": "P1M"})
        );
        assert!(
            serde_json::from_value::<Period>(
                serde_json::json!({"start": "2024-01-01", "end": "P1M", "extra": 1})
            )
            .is_err()
        );
    }
}
