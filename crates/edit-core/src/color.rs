//! CSS-style colour strings as used by canvas objects.

use doc_model::Rgba;
use regex::Regex;
use std::sync::LazyLock;

static FUNCTIONAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)rgba?\(([^)]+)\)").expect("valid colour function regex"));

/// Parses `#rgb`, `#rrggbb`, `rgb(r, g, b)` and `rgba(r, g, b, a)`.
///
/// Channels are clamped into range; an unparseable alpha reads as opaque.
/// Anything else yields `None`, which callers treat as "no paint".
pub fn parse_color(value: &str) -> Option<Rgba> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(hex) = trimmed.strip_prefix('#') {
        return parse_hex(hex);
    }

    let captures = FUNCTIONAL_REGEX.captures(trimmed)?;
    let parts: Vec<&str> = captures.get(1)?.as_str().split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return None;
    }

    let channel = |part: &str| leading_float(part).map(|v| (v / 255.0).clamp(0.0, 1.0));
    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let a = parts.get(3).and_then(|part| leading_float(part)).map_or(1.0, |a| a.clamp(0.0, 1.0));

    Some(Rgba::new(r, g, b, a))
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|ch| [ch, ch]).collect(),
        6 => hex.to_owned(),
        _ => return None,
    };
    let numeric = u32::from_str_radix(&expanded, 16).ok()?;
    let channel = |shift: u32| f64::from((numeric >> shift) & 0xff) / 255.0;

    Some(Rgba::new(channel(16), channel(8), channel(0), 1.0))
}

/// Reads the longest numeric prefix, so `"50%"` reads as 50 and `"x"` fails.
fn leading_float(text: &str) -> Option<f64> {
    let end = text
        .char_indices()
        .take_while(|(index, ch)| {
            ch.is_ascii_digit() || *ch == '.' || ((*ch == '-' || *ch == '+') && *index == 0)
        })
        .map(|(index, ch)| index + ch.len_utf8())
        .last()?;

    (1..=end).rev().find_map(|len| text[..len].parse::<f64>().ok())
}
