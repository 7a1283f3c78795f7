//! Arbitration case-number detection.
//!
//! Case numbers look like `А65-28469/2012`: a court-system letter, a one or
//! two digit court code, the case serial, and a two to four digit year,
//! optionally followed by a `-N` suffix. The leading letter is typed in
//! either alphabet, so every detected number is expanded into both.

use lexrag_core::CaseNumber;
use regex::Regex;
use std::sync::LazyLock;

pub const CYRILLIC_A: char = 'А';
pub const LATIN_A: char = 'A';

static CASE_NUMBER_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b([АA])([0-9]{1,2})-([0-9]+)/([0-9]{2,4})(-[0-9]{1,4})?\b").ok()
});

/// Expand a two-digit year around the 50 pivot; longer years pass through.
pub fn normalize_year(year: &str) -> String {
    if year.len() != 2 {
        return year.to_string();
    }
    match year.parse::<u32>() {
        Ok(y) if y >= 50 => format!("19{year}"),
        Ok(_) => format!("20{year}"),
        Err(_) => year.to_string(),
    }
}

/// Swap only the leading letter to the other alphabet.
pub fn sibling_variant(number: &str) -> Option<String> {
    let mut chars = number.chars();
    let swapped = match chars.next()? {
        CYRILLIC_A => LATIN_A,
        LATIN_A => CYRILLIC_A,
        _ => return None,
    };
    let mut out = String::with_capacity(number.len() + 1);
    out.push(swapped);
    out.push_str(chars.as_str());
    Some(out)
}

fn from_captures(caps: &regex::Captures<'_>) -> Option<CaseNumber> {
    let raw = caps.get(0)?.as_str();
    let letter = caps.get(1)?.as_str();
    let court = caps.get(2)?.as_str();
    let serial = caps.get(3)?.as_str();
    let year = normalize_year(caps.get(4)?.as_str());
    let suffix = caps.get(5).map(|m| m.as_str()).unwrap_or("");

    let tail = format!("{court}-{serial}/{year}{suffix}");
    Some(CaseNumber {
        raw: raw.to_string(),
        normalized: format!("{letter}{tail}"),
        variants: [format!("{CYRILLIC_A}{tail}"), format!("{LATIN_A}{tail}")],
    })
}

/// The first case number in `text`, if any.
pub fn detect_case_number(text: &str) -> Option<CaseNumber> {
    let re = CASE_NUMBER_RE.as_ref()?;
    re.captures_iter(text).find_map(|caps| from_captures(&caps))
}

/// Every distinct case number in `text`, in order of first appearance.
pub fn find_case_numbers(text: &str) -> Vec<CaseNumber> {
    let Some(re) = CASE_NUMBER_RE.as_ref() else {
        return Vec::new();
    };
    let mut out: Vec<CaseNumber> = Vec::new();
    for caps in re.captures_iter(text) {
        if let Some(number) = from_captures(&caps) {
            if !out.iter().any(|n| n.variants == number.variants) {
                out.push(number);
            }
        }
    }
    out
}
