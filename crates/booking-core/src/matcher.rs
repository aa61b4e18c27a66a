use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::Serialize;

const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionCandidate {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
}

impl OptionCandidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            starts_at: None,
        }
    }

    pub fn with_start(mut self, starts_at: impl Into<String>) -> Self {
        self.starts_at = Some(starts_at.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Valid { id: String, name: String },
    Invalid { options: Vec<String> },
}

impl MatchOutcome {
    fn accept(candidate: &OptionCandidate) -> Self {
        Self::Valid {
            id: candidate.id.clone(),
            name: candidate.name.clone(),
        }
    }

    fn reject(candidates: &[OptionCandidate]) -> Self {
        Self::Invalid {
            options: candidates
                .iter()
                .map(|candidate| candidate.name.clone())
                .collect(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Matches a user value by exact id, then case-insensitive name, then
/// substring of the name. The first candidate in list order wins each pass.
pub fn match_option(candidates: &[OptionCandidate], user_value: Option<&str>) -> MatchOutcome {
    let Some(value) = non_blank(user_value) else {
        return MatchOutcome::reject(candidates);
    };

    find_by_id(candidates, value)
        .or_else(|| find_by_name(candidates, value))
        .or_else(|| find_by_substring(candidates, value))
        .map(MatchOutcome::accept)
        .unwrap_or_else(|| MatchOutcome::reject(candidates))
}

/// Time slots also accept a spoken clock value ("2pm", "2:30 p.m.") that
/// lands in the same hour as a slot start within `tolerance_minutes`. A
/// clock value that fits no slot is rejected outright instead of falling
/// through to substring matching, so "2" never selects "12:00 PM".
pub fn match_time(
    candidates: &[OptionCandidate],
    user_value: Option<&str>,
    tolerance_minutes: u32,
) -> MatchOutcome {
    let Some(value) = non_blank(user_value) else {
        return MatchOutcome::reject(candidates);
    };

    if let Some(candidate) =
        find_by_id(candidates, value).or_else(|| find_by_name(candidates, value))
    {
        return MatchOutcome::accept(candidate);
    }

    if let Some(requested) = find_clock_time(value) {
        return closest_slot(candidates, requested, tolerance_minutes)
            .map(MatchOutcome::accept)
            .unwrap_or_else(|| MatchOutcome::reject(candidates));
    }

    find_by_substring(candidates, value)
        .map(MatchOutcome::accept)
        .unwrap_or_else(|| MatchOutcome::reject(candidates))
}

/// Date candidates carry the ISO day as id. Relative and written dates are
/// resolved against `today` first; a resolved day that is not offered is
/// rejected.
pub fn match_date(
    candidates: &[OptionCandidate],
    user_value: Option<&str>,
    today: NaiveDate,
) -> MatchOutcome {
    let Some(value) = non_blank(user_value) else {
        return MatchOutcome::reject(candidates);
    };

    if let Some(date) = resolve_date(value, today) {
        let iso = date.format("%Y-%m-%d").to_string();
        return candidates
            .iter()
            .find(|candidate| candidate.id == iso)
            .map(MatchOutcome::accept)
            .unwrap_or_else(|| MatchOutcome::reject(candidates));
    }

    match_option(candidates, Some(value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
    pub meridiem_given: bool,
}

impl ClockTime {
    fn exact(hour: u32, minute: u32) -> Self {
        Self {
            hour,
            minute,
            meridiem_given: true,
        }
    }

    fn from_naive(time: NaiveTime) -> Self {
        Self::exact(time.hour(), time.minute())
    }

    /// "2" without am/pm is read as either 2 AM or 2 PM.
    fn same_hour(&self, slot: &ClockTime) -> bool {
        if self.hour == slot.hour {
            return true;
        }
        !self.meridiem_given && (1..=12).contains(&self.hour) && self.hour % 12 == slot.hour % 12
    }

    pub fn display(&self) -> String {
        let (hour, suffix) = match self.hour {
            0 => (12, "AM"),
            hour @ 1..=11 => (hour, "AM"),
            12 => (12, "PM"),
            hour => (hour - 12, "PM"),
        };
        format!("{hour}:{:02} {suffix}", self.minute)
    }
}

pub fn parse_clock_time(input: &str) -> Option<ClockTime> {
    let compact = input
        .to_lowercase()
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '.')
        .collect::<String>();

    match compact.as_str() {
        "noon" => return Some(ClockTime::exact(12, 0)),
        "midnight" => return Some(ClockTime::exact(0, 0)),
        _ => {}
    }

    let (digits, pm) = if let Some(rest) = compact.strip_suffix("am") {
        (rest, Some(false))
    } else if let Some(rest) = compact.strip_suffix("pm") {
        (rest, Some(true))
    } else {
        (compact.as_str(), None)
    };

    let (hour_raw, minute_raw) = match digits.split_once(':') {
        Some((hour, minute)) => (hour, Some(minute)),
        None => (digits, None),
    };
    if hour_raw.is_empty() || hour_raw.len() > 2 || !is_ascii_digits(hour_raw) {
        return None;
    }
    let hour = hour_raw.parse::<u32>().ok()?;
    let minute = match minute_raw {
        Some(raw) if raw.len() == 2 && is_ascii_digits(raw) => raw.parse::<u32>().ok()?,
        Some(_) => return None,
        None => 0,
    };
    if minute > 59 {
        return None;
    }

    let hour = match pm {
        Some(pm) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (hour, true) => hour + 12,
                (hour, false) => hour,
            }
        }
        None if hour > 23 => return None,
        None => hour,
    };

    Some(ClockTime {
        hour,
        minute,
        meridiem_given: pm.is_some(),
    })
}

/// Finds the first clock value inside free text. Bare numbers only count
/// when they are the whole message.
pub fn find_clock_time(text: &str) -> Option<ClockTime> {
    let tokens = tokenize(text);
    if let [only] = tokens.as_slice() {
        return parse_clock_time(only);
    }

    for (index, token) in tokens.iter().enumerate() {
        if let Some(next) = tokens.get(index + 1)
            && is_meridiem(next)
            && let Some(clock) = parse_clock_time(&format!("{token}{next}"))
        {
            return Some(clock);
        }

        let explicit = token.contains(':')
            || token.ends_with("am")
            || token.ends_with("pm")
            || token.ends_with("a.m")
            || token.ends_with("p.m")
            || token == "noon"
            || token == "midnight";
        if explicit && let Some(clock) = parse_clock_time(token) {
            return Some(clock);
        }
    }

    None
}

pub fn clock_from_timestamp(raw: &str) -> Option<ClockTime> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(ClockTime::from_naive(parsed.time()));
    }
    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ClockTime::from_naive(parsed.time()));
        }
    }
    parse_clock_time(raw)
}

pub fn date_from_timestamp(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.date_naive());
    }
    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

pub fn date_label(date: NaiveDate) -> String {
    date.format("%A, %B %-d").to_string()
}

pub fn resolve_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let tokens = tokenize(input);

    for (index, token) in tokens.iter().enumerate() {
        match token.as_str() {
            "today" => return Some(today),
            "tomorrow" => return today.succ_opt(),
            _ => {}
        }

        if let Some(weekday) = parse_weekday(token) {
            let ahead = (7 + weekday.num_days_from_monday()
                - today.weekday().num_days_from_monday())
                % 7;
            return today.checked_add_days(Days::new(u64::from(ahead)));
        }

        if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
            return Some(date);
        }

        if token.contains('/')
            && let Some(date) = parse_slash_date(token, today)
        {
            return Some(date);
        }

        if let Some(month) = parse_month(token) {
            let following = tokens.get(index + 1).and_then(|next| parse_day(next));
            let preceding = preceding_day(&tokens, index);
            if let Some(day) = following.or(preceding) {
                let year = tokens
                    .get(index + 2)
                    .filter(|_| following.is_some())
                    .and_then(|raw| raw.parse::<i32>().ok())
                    .filter(|year| *year >= 1000);
                if let Some(date) = build_date(year, month, day, today) {
                    return Some(date);
                }
            }
        }
    }

    None
}

// "1st may" and "the 1st of may"
fn preceding_day(tokens: &[String], month_index: usize) -> Option<u32> {
    let mut index = month_index.checked_sub(1)?;
    if tokens[index] == "of" {
        index = index.checked_sub(1)?;
    }
    parse_day(&tokens[index])
}

fn parse_slash_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts = token.split('/').collect::<Vec<_>>();
    let (month, day, year) = match parts.as_slice() {
        [month, day] => (month.parse().ok()?, day.parse().ok()?, None),
        [month, day, year] => {
            let year = year.parse::<i32>().ok()?;
            let year = if year < 100 { year + 2000 } else { year };
            (month.parse().ok()?, day.parse().ok()?, Some(year))
        }
        _ => return None,
    };
    build_date(year, month, day, today)
}

fn build_date(year: Option<i32>, month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if this_year < today {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(this_year)
            }
        }
    }
}

fn parse_day(token: &str) -> Option<u32> {
    let digits = token
        .strip_suffix("st")
        .or_else(|| token.strip_suffix("nd"))
        .or_else(|| token.strip_suffix("rd"))
        .or_else(|| token.strip_suffix("th"))
        .unwrap_or(token);
    if digits.is_empty() || digits.len() > 2 || !is_ascii_digits(digits) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|day| (1..=31).contains(day))
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    match token {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_month(token: &str) -> Option<u32> {
    let month = match token {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn closest_slot(
    candidates: &[OptionCandidate],
    requested: ClockTime,
    tolerance_minutes: u32,
) -> Option<&OptionCandidate> {
    let mut best: Option<(&OptionCandidate, u32)> = None;
    for candidate in candidates {
        let slot = candidate
            .starts_at
            .as_deref()
            .and_then(clock_from_timestamp)
            .or_else(|| clock_from_timestamp(&candidate.name));
        let Some(slot) = slot else {
            continue;
        };
        if !requested.same_hour(&slot) {
            continue;
        }
        let distance = requested.minute.abs_diff(slot.minute);
        if distance > tolerance_minutes {
            continue;
        }
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((candidate, distance));
        }
    }
    best.map(|(candidate, _)| candidate)
}

fn find_by_id<'a>(candidates: &'a [OptionCandidate], value: &str) -> Option<&'a OptionCandidate> {
    candidates.iter().find(|candidate| candidate.id == value)
}

fn find_by_name<'a>(
    candidates: &'a [OptionCandidate],
    value: &str,
) -> Option<&'a OptionCandidate> {
    let needle = value.to_lowercase();
    candidates
        .iter()
        .find(|candidate| candidate.name.trim().to_lowercase() == needle)
}

fn find_by_substring<'a>(
    candidates: &'a [OptionCandidate],
    value: &str,
) -> Option<&'a OptionCandidate> {
    let needle = value.to_lowercase();
    candidates
        .iter()
        .find(|candidate| candidate.name.to_lowercase().contains(&needle))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .map(|token| {
            token
                .trim_matches(|ch: char| !ch.is_alphanumeric() && ch != ':' && ch != '/')
                .to_string()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_meridiem(token: &str) -> bool {
    matches!(token, "am" | "pm" | "a.m" | "p.m")
}

fn is_ascii_digits(raw: &str) -> bool {
    raw.chars().all(|ch| ch.is_ascii_digit())
}
