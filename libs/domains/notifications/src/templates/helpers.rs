//! Handlebars helpers available to every template.
//!
//! Output helpers (`formatCurrency`, `formatAddress`, `formatDate`,
//! `capitalize`, `currentYear`) write text. Value helpers (`gt`, `lt`, `eq`,
//! `gte`, `lte`, `fallback`) return JSON so they work as subexpressions, e.g.
//! `{{#if (gt daysOverdue 0)}}`.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, handlebars_helper,
};
use serde_json::Value;
use std::cmp::Ordering;

/// Helpers every `Handlebars` registry ships with.
const BUILTIN_HELPERS: &[&str] = &[
    "if", "unless", "each", "with", "lookup", "raw", "log", "eq", "ne", "gt", "gte", "lt", "lte",
    "and", "or", "not", "len",
];

/// Helpers added by [`register_helpers`].
pub const CUSTOM_HELPERS: &[&str] = &[
    "formatCurrency",
    "formatAddress",
    "formatDate",
    "capitalize",
    "currentYear",
    "gt",
    "lt",
    "eq",
    "gte",
    "lte",
    "fallback",
];

/// Whether a template may call `name` as a helper.
pub fn is_known_helper(name: &str) -> bool {
    BUILTIN_HELPERS.contains(&name) || CUSTOM_HELPERS.contains(&name)
}

pub fn register_helpers(registry: &mut Handlebars<'_>) {
    registry.register_helper("formatCurrency", Box::new(format_currency_helper));
    registry.register_helper("formatAddress", Box::new(format_address_helper));
    registry.register_helper("formatDate", Box::new(format_date_helper));
    registry.register_helper("capitalize", Box::new(capitalize_helper));
    registry.register_helper("currentYear", Box::new(current_year_helper));
    registry.register_helper("gt", Box::new(gt));
    registry.register_helper("lt", Box::new(lt));
    registry.register_helper("eq", Box::new(eq));
    registry.register_helper("gte", Box::new(gte));
    registry.register_helper("lte", Box::new(lte));
    registry.register_helper("fallback", Box::new(fallback));
}

handlebars_helper!(gt: |a: Json, b: Json| compare(a, b) == Some(Ordering::Greater));
handlebars_helper!(lt: |a: Json, b: Json| compare(a, b) == Some(Ordering::Less));
handlebars_helper!(gte: |a: Json, b: Json| matches!(compare(a, b), Some(Ordering::Greater | Ordering::Equal)));
handlebars_helper!(lte: |a: Json, b: Json| matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal)));
handlebars_helper!(eq: |a: Json, b: Json| compare(a, b) == Some(Ordering::Equal) || a == b);
handlebars_helper!(fallback: |value: Json, default: Json| if is_blank(value) { default.clone() } else { value.clone() });

fn param<'a>(h: &'a Helper<'_>, index: usize) -> Option<&'a Value> {
    h.param(index).map(|p| p.value())
}

fn format_currency_helper(
    h: &Helper<'_>,
    _: &Handlebars<'_>,
    _: &Context,
    _: &mut RenderContext<'_, '_>,
    out: &mut dyn Output,
) -> HelperResult {
    let currency = param(h, 1).and_then(Value::as_str);
    if let Some(formatted) = param(h, 0).and_then(|v| format_currency(v, currency)) {
        out.write(&formatted)?;
    }
    Ok(())
}

fn format_address_helper(
    h: &Helper<'_>,
    _: &Handlebars<'_>,
    _: &Context,
    _: &mut RenderContext<'_, '_>,
    out: &mut dyn Output,
) -> HelperResult {
    if let Some(value) = param(h, 0) {
        out.write(&format_address(value))?;
    }
    Ok(())
}

fn format_date_helper(
    h: &Helper<'_>,
    _: &Handlebars<'_>,
    _: &Context,
    _: &mut RenderContext<'_, '_>,
    out: &mut dyn Output,
) -> HelperResult {
    let style = param(h, 1).and_then(Value::as_str).unwrap_or("medium");
    if let Some(formatted) = param(h, 0).and_then(|v| format_date(v, style)) {
        out.write(&formatted)?;
    }
    Ok(())
}

fn capitalize_helper(
    h: &Helper<'_>,
    _: &Handlebars<'_>,
    _: &Context,
    _: &mut RenderContext<'_, '_>,
    out: &mut dyn Output,
) -> HelperResult {
    if let Some(value) = param(h, 0) {
        out.write(&capitalize(&display(value)))?;
    }
    Ok(())
}

fn current_year_helper(
    _: &Helper<'_>,
    _: &Handlebars<'_>,
    _: &Context,
    _: &mut RenderContext<'_, '_>,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&Utc::now().year().to_string())?;
    Ok(())
}

/// Numbers and numeric strings coerce to f64.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Numeric when both sides coerce, otherwise string comparison.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a, b) {
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

/// `1234.5` -> `$1,234.50`. Unknown currency codes are used as a prefix.
pub fn format_currency(value: &Value, currency: Option<&str>) -> Option<String> {
    let amount = as_number(value)?;
    let code = currency.unwrap_or("USD").to_ascii_uppercase();
    let symbol = match code.as_str() {
        "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        other => format!("{} ", other),
    };

    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = group_thousands(cents / 100);
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };

    Some(format!("{}{}{}.{:02}", sign, symbol, whole, cents % 100))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// One-line postal address from an object or a preformatted string.
pub fn format_address(value: &Value) -> String {
    let Value::Object(map) = value else {
        return display(value);
    };

    let field = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| map.get(*k))
            .map(display)
            .find(|s| !s.trim().is_empty())
    };

    let state_zip = [field(&["state"]), field(&["zip", "postalCode", "zipCode"])]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    [
        field(&["street", "line1", "address1"]),
        field(&["unit", "line2", "address2"]),
        field(&["city"]),
        Some(state_zip).filter(|s| !s.is_empty()),
        field(&["country"]),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(", ")
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.date_naive())
            .ok()
            .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.date_naive()),
        _ => None,
    }
}

/// Styles: `short` (03/05/2026), `medium` (March 5, 2026), `long`
/// (Thursday, March 5, 2026), `iso` (2026-03-05). Unparseable input is
/// written back unchanged.
pub fn format_date(value: &Value, style: &str) -> Option<String> {
    if value.is_null() {
        return None;
    }
    let Some(date) = parse_date(value) else {
        return Some(display(value));
    };

    let pattern = match style {
        "short" => "%m/%d/%Y",
        "long" => "%A, %B %-d, %Y",
        "iso" => "%Y-%m-%d",
        _ => "%B %-d, %Y",
    };
    Some(date.format(pattern).to_string())
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
