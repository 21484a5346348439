// src/coerce.rs
//! Type coercion for workflow-supplied JSON.
//!
//! Workflow parameters arrive as plain JSON, which has no way to carry an
//! `ObjectId` or a date. Before a filter, update, pipeline or document reaches
//! MongoDB we walk it and upgrade string leaves that look like one of those
//! types. A sub-document holding `$oid` or `$toDate` is an explicit escape and
//! is never touched.
use bson::{oid::ObjectId, Bson, DateTime, Document};
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

/// Marks a sub-document as an identifier literal.
pub const OBJECT_ID_MARKER: &str = "$oid";
/// Marks a sub-document as a date conversion the server will evaluate.
pub const FORCE_DATE_MARKER: &str = "$toDate";

const MARKER_KEYS: [&str; 2] = [OBJECT_ID_MARKER, FORCE_DATE_MARKER];

static OBJECT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("object id pattern"));

// Same language as YYYY-MM-DD[(T| )hh:mm:ss[.fff][Z|+hh:mm]], with the zone captured.
static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,3}))?(Z|[+\-]\d{2}:\d{2})?)?$",
    )
    .expect("iso date pattern")
});

/// Converts parsed parameter JSON into BSON without interpreting extended JSON,
/// so `{"$oid": "..."}` stays a sub-document with a `$oid` key.
pub fn json_to_bson(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => number_to_bson(&n),
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(items.into_iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(
            map.into_iter()
                .map(|(key, value)| (key, json_to_bson(value)))
                .collect(),
        ),
    }
}

fn number_to_bson(n: &Number) -> Bson {
    if let Some(i) = n.as_i64() {
        return i32::try_from(i).map(Bson::Int32).unwrap_or(Bson::Int64(i));
    }
    n.as_f64().map(Bson::Double).unwrap_or(Bson::Null)
}

/// Upgrades identifier-looking and date-looking strings anywhere in `value`.
///
/// Total: anything that cannot be upgraded comes back unchanged.
pub fn coerce(value: Bson) -> Bson {
    match value {
        Bson::Array(items) => Bson::Array(items.into_iter().map(coerce).collect()),
        Bson::Document(doc) => Bson::Document(coerce_document(doc)),
        Bson::String(s) => coerce_string(s),
        other => other,
    }
}

pub fn coerce_document(doc: Document) -> Document {
    if is_escaped(&doc) {
        return doc;
    }

    doc.into_iter()
        .map(|(key, value)| {
            if MARKER_KEYS.contains(&key.as_str()) {
                (key, value)
            } else {
                (key, coerce(value))
            }
        })
        .collect()
}

/// True when the document carries one of the reserved marker keys.
pub fn is_escaped(doc: &Document) -> bool {
    MARKER_KEYS.iter().any(|key| doc.contains_key(key))
}

fn coerce_string(raw: String) -> Bson {
    let trimmed = raw.trim();

    // Identifier check runs first; a match never falls through to the date check.
    if trimmed.len() == 24 && OBJECT_ID_RE.is_match(trimmed) {
        return match ObjectId::parse_str(trimmed) {
            Ok(oid) => Bson::ObjectId(oid),
            Err(_) => Bson::String(raw),
        };
    }

    match parse_iso_date(trimmed) {
        Some(dt) => Bson::DateTime(dt),
        None => Bson::String(raw),
    }
}

/// Parses the accepted ISO-8601 subset into a UTC timestamp.
///
/// Returns `None` when the text does not match or names an impossible calendar
/// instant (`2021-02-30`, `24:00:00`, ...). A missing zone designator means UTC.
pub fn parse_iso_date(s: &str) -> Option<DateTime> {
    let caps = ISO_DATE_RE.captures(s)?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?;

    let Some(hour) = field(4) else {
        return Some(DateTime::from_chrono(date.and_time(NaiveTime::MIN).and_utc()));
    };

    let millis = match caps.get(7) {
        Some(frac) => format!("{:0<3}", frac.as_str()).parse::<u32>().ok()?,
        None => 0,
    };
    let time = NaiveTime::from_hms_milli_opt(hour, field(5)?, field(6)?, millis)?;
    let local = NaiveDateTime::new(date, time);

    let offset = match caps.get(8) {
        Some(zone) => parse_offset(zone.as_str())?,
        None => FixedOffset::east_opt(0)?,
    };
    let instant = offset.from_local_datetime(&local).single()?;
    Some(DateTime::from_chrono(instant.with_timezone(&Utc)))
}

fn parse_offset(zone: &str) -> Option<FixedOffset> {
    if zone == "Z" {
        return FixedOffset::east_opt(0);
    }

    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let (hours, minutes) = zone[1..].split_once(':')?;
    let hours = hours.parse::<i32>().ok()?;
    let minutes = minutes.parse::<i32>().ok()?;
    if minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
