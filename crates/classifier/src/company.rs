//! Company detection: legal-form prefixes and state registration numbers.

use lexrag_core::{CompanyEntity, RegistrationKind, RegistrationNumber};
use regex::Regex;
use std::sync::LazyLock;

/// Legal-form prefixes recognized in front of a company name.
pub const LEGAL_FORMS: &[&str] = &["ООО", "ЗАО", "ОАО", "ПАО", "ИП"];

static LEGAL_FORM_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(ООО|ЗАО|ОАО|ПАО|ИП)\b\s+(?:"([^"]+)"|«([^»]+)»|“([^”]+)”|([^\s,.;:!?()"«»“”]+))"#,
    )
    .ok()
});

static REGISTRATION_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(ОГРНИП|ОГРН|ИНН)\s*[:№]?\s*)?\b([0-9]{10,15})\b").ok()
});

/// Detect a company by legal form + name and/or by registration number.
pub fn detect_company(text: &str) -> Option<CompanyEntity> {
    let named = detect_named(text);
    let registration = detect_registration(text);

    match (named, registration) {
        (None, None) => None,
        (Some((form, name)), registration) => Some(CompanyEntity {
            name: Some(name),
            legal_form: Some(form),
            registration,
        }),
        (None, Some(registration)) => Some(CompanyEntity {
            name: None,
            legal_form: None,
            registration: Some(registration),
        }),
    }
}

/// `(legal form, "FORM Name")` for the first legal-form mention.
fn detect_named(text: &str) -> Option<(String, String)> {
    let re = LEGAL_FORM_RE.as_ref()?;
    re.captures_iter(text).find_map(|caps| {
        let form = caps.get(1)?.as_str().to_uppercase();
        let name = (2..=5)
            .find_map(|i| caps.get(i))
            .map(|m| m.as_str().trim())
            .filter(|n| !n.is_empty())?;
        Some((form.clone(), format!("{form} {name}")))
    })
}

/// The first registration number that passes the length/checksum rules.
pub fn detect_registration(text: &str) -> Option<RegistrationNumber> {
    let re = REGISTRATION_RE.as_ref()?;
    re.captures_iter(text).find_map(|caps| {
        let digits = caps.get(2)?.as_str();
        let label = caps.get(1).map(|m| m.as_str().to_uppercase());
        classify_number(label.as_deref(), digits)
    })
}

fn classify_number(label: Option<&str>, digits: &str) -> Option<RegistrationNumber> {
    let kind = match (label, digits.len()) {
        (Some("ИНН"), 10 | 12) => RegistrationKind::Inn,
        (Some("ОГРН"), 13) => RegistrationKind::Ogrn,
        (Some("ОГРНИП"), 15) => RegistrationKind::Ogrnip,
        (Some(_), _) => return None,
        (None, 10) if inn_is_valid(digits) => RegistrationKind::Inn,
        (None, 12) if inn_is_valid(digits) => RegistrationKind::Inn,
        (None, 13) if ogrn_is_valid(digits) => RegistrationKind::Ogrn,
        (None, 15) if ogrn_is_valid(digits) => RegistrationKind::Ogrnip,
        (None, _) => return None,
    };
    Some(RegistrationNumber {
        kind,
        value: digits.to_string(),
    })
}

fn digit_values(s: &str) -> Option<Vec<u32>> {
    s.chars().map(|c| c.to_digit(10)).collect()
}

fn weighted_check(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    sum % 11 % 10
}

/// Control-digit validation for 10- and 12-digit taxpayer numbers.
pub fn inn_is_valid(inn: &str) -> bool {
    let Some(d) = digit_values(inn) else {
        return false;
    };
    match d.len() {
        10 => weighted_check(&d, &[2, 4, 10, 3, 5, 9, 4, 6, 8]) == d[9],
        12 => {
            weighted_check(&d, &[7, 2, 4, 10, 3, 5, 9, 4, 6, 8]) == d[10]
                && weighted_check(&d, &[3, 7, 2, 4, 10, 3, 5, 9, 4, 6, 8]) == d[11]
        }
        _ => false,
    }
}

/// Control-digit validation for 13-digit OGRN and 15-digit OGRNIP.
pub fn ogrn_is_valid(ogrn: &str) -> bool {
    let (modulus, body_len) = match ogrn.len() {
        13 => (11u64, 12),
        15 => (13u64, 14),
        _ => return false,
    };
    let Ok(body) = ogrn[..body_len].parse::<u64>() else {
        return false;
    };
    let Some(check) = ogrn[body_len..].chars().next().and_then(|c| c.to_digit(10)) else {
        return false;
    };
    (body % modulus % 10) as u32 == check
}
