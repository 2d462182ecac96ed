//! Registry record -> canonical OSM tag vector.
//!
//! Free text is sanitized and capped at the OSM tag value limit. Contact
//! details and cabinet hints are lifted out of the site description.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;

use crate::issue::{Issue, IssueType};
use crate::model::{DayHours, RegisterAed};
use crate::tags::{AedTagKey, Tags};

/// OSM rejects tag values longer than this many characters.
pub const MAX_TAG_VALUE_CHARS: usize = 255;

/// National emergency number written to `emergency:phone`.
const EMERGENCY_PHONE: &str = "113";

const DAY_LABELS: [&str; 7] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];

const ALWAYS_OPEN: &str = "24/7";

static NEWLINES: OnceLock<Regex> = OnceLock::new();
static WHITESPACE: OnceLock<Regex> = OnceLock::new();
static SPACE_BEFORE_PERIOD: OnceLock<Regex> = OnceLock::new();
static PERIODS: OnceLock<Regex> = OnceLock::new();
static EMAIL: OnceLock<Regex> = OnceLock::new();
static PHONE: OnceLock<Regex> = OnceLock::new();
static ROTAID: OnceLock<Regex> = OnceLock::new();
static GREEN_CABINET: OnceLock<Regex> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("static pattern compiles"))
}

/// Canonical tags plus the issues raised while building them.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub tags: Tags,
    pub issues: Vec<Issue>,
}

pub fn canonical_tags(aed: &RegisterAed) -> Synthesis {
    let mut out = Synthesis {
        tags: Tags::new(),
        issues: Vec::new(),
    };
    out.tags.set(AedTagKey::Emergency, "defibrillator");
    out.tags.set(AedTagKey::EmergencyPhone, EMERGENCY_PHONE);
    out.tags.set(AedTagKey::RegisterRef, aed.guid.as_str());

    out.text(aed, AedTagKey::Name, aed.site_name.as_deref());
    if let Some(floor) = aed.floor {
        out.tags.set(AedTagKey::Level, floor.to_string());
    }
    out.text(aed, AedTagKey::Location, aed.description.as_deref());
    out.text(aed, AedTagKey::Manufacturer, aed.manufacturer.as_deref());
    out.text(aed, AedTagKey::Model, aed.model.as_deref());

    let description = aed.description.as_deref().unwrap_or_default();
    let emails = extract_emails(description);
    if !emails.is_empty() {
        out.text(aed, AedTagKey::Email, Some(emails.join("; ").as_str()));
    }
    let phones = extract_phones(description);
    if !phones.is_empty() {
        out.text(aed, AedTagKey::Phone, Some(phones.join("; ").as_str()));
    }

    if let Some(hours) = opening_hours(aed) {
        out.tags.set(AedTagKey::OpeningHours, hours);
    }

    let cabinet = detect_cabinet(description);
    if let Some(kind) = cabinet.kind {
        out.tags.set(AedTagKey::Cabinet, kind);
    }
    if let Some(colour) = cabinet.colour {
        out.tags.set(AedTagKey::CabinetColour, colour);
    }
    if let Some(manufacturer) = cabinet.manufacturer {
        out.tags.set(AedTagKey::CabinetManufacturer, manufacturer);
    }

    out
}

impl Synthesis {
    fn text(&mut self, aed: &RegisterAed, key: AedTagKey, raw: Option<&str>) {
        let Some(value) = raw.and_then(sanitize_text) else {
            return;
        };
        let chars = value.chars().count();
        if chars > MAX_TAG_VALUE_CHARS {
            log::warn!(
                "skipping {} for AED {}: {chars} chars exceeds {MAX_TAG_VALUE_CHARS}",
                key.as_str(),
                aed.guid
            );
            self.issues.push(
                Issue::warning(
                    IssueType::TagValueTooLong,
                    format!("{} value exceeds {MAX_TAG_VALUE_CHARS} characters", key.as_str()),
                )
                .with_register_ref(aed.guid.as_str())
                .with_details(json!({ "tag": key.as_str(), "length": chars })),
            );
            return;
        }
        self.tags.set(key, value);
    }
}

// ---------------------------------------------------------------------------
// Free text
// ---------------------------------------------------------------------------

/// Newlines become sentence breaks, whitespace collapses, stray spaces
/// before periods and repeated periods go away. Empty results are `None`.
pub fn sanitize_text(raw: &str) -> Option<String> {
    let s = pattern(&NEWLINES, r"[\r\n]+").replace_all(raw, ". ");
    let s = pattern(&WHITESPACE, r"\s+").replace_all(&s, " ");
    let s = pattern(&SPACE_BEFORE_PERIOD, r"\s\.").replace_all(&s, ".");
    let s = pattern(&PERIODS, r"\.+").replace_all(&s, ".");
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

pub fn extract_emails(description: &str) -> Vec<String> {
    let mut emails = Vec::new();
    let re = pattern(&EMAIL, r"[a-zA-Z0-9._-]+@[a-zA-Z0-9._-]+\.[a-zA-Z0-9._-]+");
    for m in re.find_iter(description) {
        if let Some(email) = sanitize_text(m.as_str()) {
            push_unique(&mut emails, email);
        }
    }
    emails
}

/// Norwegian eight-digit numbers, optionally `+47`-prefixed, normalized
/// to `+47 xx xx xx xx`.
pub fn extract_phones(description: &str) -> Vec<String> {
    let mut phones = Vec::new();
    let re = pattern(
        &PHONE,
        r"(?:\+47\s?)?(\d{2}\s?\d{2}\s?\d{2}\s?\d{2}|\d{3}\s?\d{2}\s?\d{3})",
    );
    for caps in re.captures_iter(description) {
        let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
        if digits.len() != 8 {
            continue;
        }
        let formatted = format!(
            "+47 {} {} {} {}",
            &digits[0..2],
            &digits[2..4],
            &digits[4..6],
            &digits[6..8]
        );
        push_unique(&mut phones, formatted);
    }
    phones
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CabinetHints {
    pub kind: Option<&'static str>,
    pub colour: Option<&'static str>,
    pub manufacturer: Option<&'static str>,
}

pub fn detect_cabinet(description: &str) -> CabinetHints {
    let mut hints = CabinetHints::default();
    if pattern(&ROTAID, r"(?i)rotaid").is_match(description) {
        hints.kind = Some("twist");
        hints.manufacturer = Some("Rotaid");
    }
    if pattern(
        &GREEN_CABINET,
        r"(?i)\bgrønt(?:\s+rundt)?(?:\s+varme)?\s*skap\b",
    )
    .is_match(description)
    {
        hints.colour = Some("green");
    }
    hints
}

// ---------------------------------------------------------------------------
// Opening hours
// ---------------------------------------------------------------------------

/// `HHMM` integer -> `HH:MM`. `2400` is accepted as end of day.
pub fn format_hhmm(value: i64) -> Option<String> {
    if !(0..=2400).contains(&value) {
        return None;
    }
    let (hours, minutes) = (value / 100, value % 100);
    if minutes >= 60 || (hours == 24 && minutes != 0) {
        return None;
    }
    Some(format!("{hours:02}:{minutes:02}"))
}

fn day_interval(day: DayHours) -> Option<String> {
    let (open, close) = (day.open?, day.close?);
    if open == close || open == 2400 {
        return None;
    }
    Some(format!("{}-{}", format_hhmm(open)?, format_hhmm(close)?))
}

/// OSM `opening_hours` value. Consecutive days with the same interval
/// share one rule; invalid or partial days are left out.
pub fn opening_hours(aed: &RegisterAed) -> Option<String> {
    if aed.hours_limited == Some(false) {
        return Some(ALWAYS_OPEN.to_string());
    }

    let intervals: Vec<Option<String>> = aed.hours.days.iter().copied().map(day_interval).collect();
    let mut rules: Vec<(usize, usize, &str)> = Vec::new();
    let mut i = 0;
    while i < intervals.len() {
        let Some(interval) = intervals[i].as_deref() else {
            i += 1;
            continue;
        };
        let start = i;
        while i + 1 < intervals.len() && intervals[i + 1].as_deref() == Some(interval) {
            i += 1;
        }
        rules.push((start, i, interval));
        i += 1;
    }

    if rules.is_empty() {
        return None;
    }
    let round_the_clock = rules.len() == 1 && rules[0] == (0, 6, "00:00-24:00");
    if round_the_clock && aed.closed_on_holidays != Some(true) {
        return Some(ALWAYS_OPEN.to_string());
    }

    let mut parts: Vec<String> = rules
        .into_iter()
        .map(|(start, end, interval)| {
            if start == end {
                format!("{} {interval}", DAY_LABELS[start])
            } else {
                format!("{}-{} {interval}", DAY_LABELS[start], DAY_LABELS[end])
            }
        })
        .collect();
    match aed.closed_on_holidays {
        Some(true) => parts.push("PH off".into()),
        Some(false) => parts.push("PH open".into()),
        None => {}
    }
    Some(parts.join("; "))
}
