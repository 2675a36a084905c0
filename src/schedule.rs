use serde::Serialize;

/// Half-open time window in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start_min: u32,
    pub end_min: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleCheck {
    pub conflict: bool,
    pub reason: Option<String>,
}

impl ScheduleCheck {
    fn clear() -> Self {
        ScheduleCheck {
            conflict: false,
            reason: None,
        }
    }

    fn hit(reason: String) -> Self {
        ScheduleCheck {
            conflict: true,
            reason: Some(reason),
        }
    }
}

/// Parses `"HH:MM-HH:MM"` into minute offsets. Malformed input yields `None`;
/// callers fall back to exact-string matching rather than erroring.
pub fn parse_time_range(s: &str) -> Option<TimeRange> {
    let (start, end) = s.split_once('-')?;
    Some(TimeRange {
        start_min: parse_hhmm(start)?,
        end_min: parse_hhmm(end)?,
    })
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    Some(h * 60 + m)
}

/// Expands a days token into its day list.
///
/// `"MWF"`, `"TTS"` and `"Daily"` are the stored shorthands; comma lists are
/// split and trimmed as-is. Anything else comes back as a single opaque token
/// so freeform schedule text still participates in exact matching.
pub fn parse_days(s: &str) -> Vec<String> {
    match s {
        "MWF" => vec!["Mon".into(), "Wed".into(), "Fri".into()],
        "TTS" => vec!["Tue".into(), "Thu".into(), "Sat".into()],
        "Daily" => vec![
            "Mon".into(),
            "Tue".into(),
            "Wed".into(),
            "Thu".into(),
            "Fri".into(),
            "Sat".into(),
            "Sun".into(),
        ],
        _ if s.contains(',') => s.split(',').map(|t| t.trim().to_string()).collect(),
        _ => vec![s.to_string()],
    }
}

fn split_schedule(s: &str) -> Option<(&str, &str)> {
    let (days, time) = s.split_once(' ')?;
    if days.is_empty() || time.is_empty() {
        return None;
    }
    Some((days, time))
}

fn exact_match_only(new_schedule: &str, existing: &[String]) -> ScheduleCheck {
    if existing.iter().any(|e| e == new_schedule) {
        ScheduleCheck::hit("Exact schedule match".to_string())
    } else {
        ScheduleCheck::clear()
    }
}

/// Checks a proposed schedule against every existing schedule in scope.
///
/// Exact string equality always wins over interval logic. Entries that do not
/// conform to the `"<Days> <HH:MM>-<HH:MM>"` shape can only conflict by exact
/// match. Touching endpoints are not a conflict.
pub fn check_time_conflict(new_schedule: &str, existing_schedules: &[String]) -> ScheduleCheck {
    let Some((days_token, time_token)) = split_schedule(new_schedule) else {
        return exact_match_only(new_schedule, existing_schedules);
    };
    let Some(new_time) = parse_time_range(time_token) else {
        return exact_match_only(new_schedule, existing_schedules);
    };
    let new_days = parse_days(days_token);

    for entry in existing_schedules {
        if entry == new_schedule {
            return ScheduleCheck::hit("Exact schedule match".to_string());
        }

        let Some((entry_days, entry_time)) = split_schedule(entry) else {
            continue;
        };
        let Some(entry_range) = parse_time_range(entry_time) else {
            continue;
        };
        let entry_days = parse_days(entry_days);

        let days_overlap = new_days.iter().any(|d| entry_days.contains(d));
        if !days_overlap {
            continue;
        }

        if new_time.start_min < entry_range.end_min && new_time.end_min > entry_range.start_min {
            return ScheduleCheck::hit(format!("Time conflict with {}", entry));
        }
    }

    ScheduleCheck::clear()
}
