/*
 * date.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `date.*` helpers.
//!
//! Dates travel between helpers as ISO-8601 strings in UTC with millisecond
//! precision (`2025-03-01T12:00:00.000Z`); epoch milliseconds are accepted
//! as input too. Date-only and zone-less inputs are read in the resolved
//! timezone.
//!
//! Timezone arguments accept `server` (the configured server timezone),
//! `browser` (the request's `timezone` context value) or an IANA name.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;

use super::HelperEnv;
use crate::args::HelperArgs;
use crate::error::{HelperError, HelperResult};
use crate::value::{TemplateValue, looks_numeric, parse_number};

pub(crate) const NAMES: &[&str] = &[
    "date.now",
    "date.parse",
    "date.format",
    "date.fromNow",
    "date.add",
    "date.diff",
];

const DEFAULT_FORMAT: &str = "%DATETIME%";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    /// Parse a unit name. `M` is months and `m` is minutes; long names are
    /// case-insensitive.
    pub(crate) fn parse(name: &str) -> Option<Self> {
        let unit = match name {
            "ms" => Unit::Millisecond,
            "s" => Unit::Second,
            "m" => Unit::Minute,
            "h" => Unit::Hour,
            "d" => Unit::Day,
            "w" => Unit::Week,
            "M" => Unit::Month,
            "y" => Unit::Year,
            _ => match name.to_ascii_lowercase().as_str() {
                "millisecond" | "milliseconds" => Unit::Millisecond,
                "sec" | "secs" | "second" | "seconds" => Unit::Second,
                "min" | "mins" | "minute" | "minutes" => Unit::Minute,
                "hour" | "hours" => Unit::Hour,
                "day" | "days" => Unit::Day,
                "week" | "weeks" => Unit::Week,
                "month" | "months" => Unit::Month,
                "year" | "years" => Unit::Year,
                _ => return None,
            },
        };
        Some(unit)
    }

    /// Fixed length in milliseconds; months and years use 30 and 365 days.
    fn millis(self) -> f64 {
        const DAY: f64 = 86_400_000.0;
        match self {
            Unit::Millisecond => 1.0,
            Unit::Second => 1_000.0,
            Unit::Minute => 60_000.0,
            Unit::Hour => 3_600_000.0,
            Unit::Day => DAY,
            Unit::Week => 7.0 * DAY,
            Unit::Month => 30.0 * DAY,
            Unit::Year => 365.0 * DAY,
        }
    }

    /// Singular message key and English word.
    fn word(self) -> &'static str {
        match self {
            Unit::Millisecond => "millisecond",
            Unit::Second => "second",
            Unit::Minute => "minute",
            Unit::Hour => "hour",
            Unit::Day => "day",
            Unit::Week => "week",
            Unit::Month => "month",
            Unit::Year => "year",
        }
    }

    fn abbreviation(self) -> &'static str {
        match self {
            Unit::Millisecond => "ms",
            Unit::Second => "s",
            Unit::Minute => "m",
            Unit::Hour => "h",
            Unit::Day => "d",
            Unit::Week => "w",
            Unit::Month => "mo",
            Unit::Year => "y",
        }
    }
}

pub(crate) fn call(
    method: &str,
    args: &HelperArgs,
    env: &HelperEnv<'_>,
) -> Option<HelperResult<TemplateValue>> {
    let result = match method {
        "now" => Ok(now(args, env)),
        "parse" => Ok(parse(args, env)),
        "format" => Ok(format(args, env)),
        "fromNow" => Ok(from_now(args, env)),
        "add" => add(args, env),
        "diff" => diff(args, env),
        _ => return None,
    };
    Some(result)
}

fn now(args: &HelperArgs, env: &HelperEnv<'_>) -> TemplateValue {
    match args.get(0) {
        TemplateValue::Null => iso(env.now).into(),
        pattern => {
            let tz = resolve_timezone(args.named("timezone").or(args.positional.get(1)), env);
            apply_format(&pattern.render(), &env.now.with_timezone(&tz)).into()
        }
    }
}

fn parse(args: &HelperArgs, env: &HelperEnv<'_>) -> TemplateValue {
    let tz = resolve_timezone(args.named("timezone").or(args.positional.get(1)), env);
    match instant(args.primary(), tz) {
        Some(dt) => iso(dt).into(),
        None => invalid_date(args),
    }
}

fn format(args: &HelperArgs, env: &HelperEnv<'_>) -> TemplateValue {
    let tz = resolve_timezone(args.named("timezone").or(args.positional.get(2)), env);
    let pattern = args
        .named_str("format")
        .or_else(|| args.positional.get(1).map(TemplateValue::render))
        .unwrap_or_else(|| DEFAULT_FORMAT.to_string());
    match instant(args.primary(), tz) {
        Some(dt) => apply_format(&pattern, &dt.with_timezone(&tz)).into(),
        None => invalid_date(args),
    }
}

fn from_now(args: &HelperArgs, env: &HelperEnv<'_>) -> TemplateValue {
    let tz = resolve_timezone(args.named("timezone"), env);
    let Some(dt) = instant(args.primary(), tz) else {
        return invalid_date(args);
    };
    let units = args
        .named("units")
        .map(TemplateValue::to_number)
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map_or(1, |n| n as usize);
    let short = args.named_str("style").as_deref() == Some("short");
    relative_time(dt, env, units, short).into()
}

fn add(args: &HelperArgs, env: &HelperEnv<'_>) -> HelperResult<TemplateValue> {
    args.require(3)?;
    let unit = unit_arg(args, 2)?;
    let tz = resolve_timezone(args.named("timezone"), env);
    let Some(dt) = instant(args.primary(), tz) else {
        return Ok(invalid_date(args));
    };
    let amount = args.number_at(1);
    if !amount.is_finite() {
        tracing::warn!(helper = "date.add", "non-numeric amount");
        return Ok(iso(dt).into());
    }

    let shifted = match unit {
        Unit::Month | Unit::Year => {
            let months = amount.trunc() as i64 * if unit == Unit::Year { 12 } else { 1 };
            let magnitude = Months::new(u32::try_from(months.unsigned_abs()).unwrap_or(u32::MAX));
            if months >= 0 {
                dt.checked_add_months(magnitude)
            } else {
                dt.checked_sub_months(magnitude)
            }
        }
        fixed => {
            let millis = (amount * fixed.millis()).round() as i64;
            chrono::Duration::try_milliseconds(millis).and_then(|delta| dt.checked_add_signed(delta))
        }
    };
    match shifted {
        Some(dt) => Ok(iso(dt).into()),
        None => Err(HelperError::Failed("date out of range".to_string())),
    }
}

fn diff(args: &HelperArgs, env: &HelperEnv<'_>) -> HelperResult<TemplateValue> {
    args.require(2)?;
    let unit = match args.get(2) {
        TemplateValue::Null => Unit::Millisecond,
        _ => unit_arg(args, 2)?,
    };
    let tz = resolve_timezone(args.named("timezone"), env);
    let (Some(a), Some(b)) = (instant(args.get(0), tz), instant(args.get(1), tz)) else {
        return Ok(invalid_date(args));
    };

    let value = match unit {
        Unit::Month => month_diff(a, b) as f64,
        Unit::Year => (month_diff(a, b) / 12) as f64,
        fixed => ((a - b).num_milliseconds() as f64 / fixed.millis()).trunc(),
    };
    Ok(value.into())
}

fn unit_arg(args: &HelperArgs, index: usize) -> HelperResult<Unit> {
    let name = args.str_at(index);
    Unit::parse(&name)
        .ok_or_else(|| HelperError::InvalidArguments(format!("unknown date unit '{name}'")))
}

/// Whole calendar months from `b` to `a`, truncated toward zero.
fn month_diff(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    if a < b {
        return -month_diff(b, a);
    }
    let mut months =
        (i64::from(a.year()) - i64::from(b.year())) * 12 + i64::from(a.month()) - i64::from(b.month());
    let shifted = u32::try_from(months)
        .ok()
        .and_then(|m| b.checked_add_months(Months::new(m)));
    if shifted.is_some_and(|s| s > a) {
        months -= 1;
    }
    months
}

fn invalid_date(args: &HelperArgs) -> TemplateValue {
    tracing::warn!(helper = %args.name, value = %args.primary().render(), "invalid date");
    TemplateValue::Null
}

/// Resolve a timezone argument: `server`, `browser`, or an IANA name.
fn resolve_timezone(spec: Option<&TemplateValue>, env: &HelperEnv<'_>) -> Tz {
    let server = env.config.server_timezone();
    let Some(spec) = spec.filter(|s| !s.is_null()) else {
        return server;
    };
    match spec.render().as_str() {
        "" | "server" => server,
        "browser" => env
            .ctx
            .get("timezone")
            .and_then(TemplateValue::as_str)
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(server),
        name => name.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = name, "unknown timezone, using server timezone");
            server
        }),
    }
}

/// Interpret a value as an instant. Zone-less input is read in `tz`.
pub(crate) fn instant(value: &TemplateValue, tz: Tz) -> Option<DateTime<Utc>> {
    match value {
        TemplateValue::Number(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64),
        TemplateValue::String(s) => parse_str(s.trim(), tz),
        _ => None,
    }
}

fn parse_str(s: &str, tz: Tz) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if looks_numeric(s) {
        return DateTime::from_timestamp_millis(parse_number(s) as i64);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return in_zone(naive, tz);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| in_zone(naive, tz))
}

fn in_zone(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Expand `%TOKEN%` placeholders. Unknown tokens are left as written.
fn apply_format(pattern: &str, dt: &DateTime<Tz>) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            out.push_str(&rest[start..]);
            return out;
        };
        match format_token(&after[..end], dt) {
            Some(value) => {
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn format_token(token: &str, dt: &DateTime<Tz>) -> Option<String> {
    let value = match token {
        "Y" => dt.format("%Y").to_string(),
        "M" => dt.format("%m").to_string(),
        "D" => dt.format("%d").to_string(),
        "H" => dt.format("%H").to_string(),
        "MIN" => dt.format("%M").to_string(),
        "SEC" => dt.format("%S").to_string(),
        "MS" => format!("{:03}", dt.timestamp_subsec_millis()),
        "ISO" => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        "DATE" => dt.format("%Y-%m-%d").to_string(),
        "TIME" => dt.format("%H:%M:%S").to_string(),
        "DATETIME" => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => return None,
    };
    Some(value)
}

const RELATIVE_UNITS: &[Unit] = &[
    Unit::Year,
    Unit::Month,
    Unit::Week,
    Unit::Day,
    Unit::Hour,
    Unit::Minute,
    Unit::Second,
];

fn relative_time(dt: DateTime<Utc>, env: &HelperEnv<'_>, units: usize, short: bool) -> String {
    let delta = (dt - env.now).num_milliseconds();
    let mut remaining = delta.unsigned_abs() as f64;
    if remaining < Unit::Second.millis() {
        return message(env, "now").unwrap_or_else(|| "just now".to_string());
    }

    let mut parts = Vec::new();
    for unit in RELATIVE_UNITS {
        if parts.len() == units {
            break;
        }
        let count = (remaining / unit.millis()).floor();
        if count < 1.0 {
            continue;
        }
        remaining -= count * unit.millis();
        let count = count as u64;
        parts.push(if short {
            format!("{count}{}", unit.abbreviation())
        } else {
            let key = if count == 1 {
                unit.word().to_string()
            } else {
                format!("{}s", unit.word())
            };
            let word = message(env, &key).unwrap_or(key);
            format!("{count} {word}")
        });
    }

    let span = parts.join(" ");
    if delta < 0 {
        let ago = message(env, "ago").unwrap_or_else(|| "ago".to_string());
        format!("{span} {ago}")
    } else {
        let prefix = message(env, "in").unwrap_or_else(|| "in".to_string());
        format!("{prefix} {span}")
    }
}

/// Localized word from `i18n.time.<key>`.
fn message(env: &HelperEnv<'_>, key: &str) -> Option<String> {
    env.ctx
        .lookup(&format!("i18n.time.{key}"))
        .and_then(TemplateValue::as_str)
        .map(str::to_string)
}
