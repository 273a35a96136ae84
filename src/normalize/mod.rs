//! Heuristic recovery of peer phone identifiers.
//!
//! Source systems deliver peer ids in several corrupted shapes: opaque numeric
//! aliases (`92045460951243@alias`), phone-shaped ids with garbled extra
//! digits, or national numbers missing the country code. This module owns the
//! single, ordered strategy chain that turns any of them into a best-effort
//! canonical phone. The chain is total: every input produces a result, and
//! results from the tail fallback are flagged unconfirmed so downstream flows
//! never silently trust them.

use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;
use tracing::warn;

/// Default country code prepended to bare national numbers.
pub const DEFAULT_COUNTRY_CODE: &str = "55";

/// Accepted national-number lengths (digits, without country code).
const NATIONAL_LEN_MIN: usize = 10;
const NATIONAL_LEN_MAX: usize = 11;

/// Which strategy in the ordered chain produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exact hit in the confirmed alias table.
    AliasTable,
    /// Country-code-prefixed number extracted from within the digit string.
    EmbeddedMatch,
    /// Digit string already has country-code + national length.
    CanonicalLength,
    /// Bare national number, default country code prepended.
    NationalWithDefaultCc,
    /// Last-resort tail of the digit string, unconfirmed.
    TailFallback,
}

/// Outcome of [`normalize`]; `confirmed == false` marks results that must be
/// audited manually before any outbound use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPhone {
    pub phone: String,
    pub confirmed: bool,
    pub strategy: Strategy,
}

/// Previously-confirmed alias -> phone mappings recovered by manual audit.
static ALIAS_TABLE: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("92045460951243", "5511986420753"),
        ("118634046259873", "5521997534168"),
        ("79982193404187", "5531988021473"),
    ])
});

static EMBEDDED_DEFAULT: LazyLock<Regex> = LazyLock::new(|| embedded_pattern(DEFAULT_COUNTRY_CODE));

fn embedded_pattern(country_code: &str) -> Regex {
    // Country codes are digit-only, so no escaping is needed.
    Regex::new(&format!("{country_code}[0-9]{{{NATIONAL_LEN_MIN},{NATIONAL_LEN_MAX}}}"))
        .expect("embedded phone pattern")
}

/// Normalizes a raw peer identifier with the default country code.
pub fn normalize(raw: &str) -> NormalizedPhone {
    normalize_with(raw, DEFAULT_COUNTRY_CODE)
}

/// Normalizes a raw peer identifier, first match wins:
/// 1. confirmed alias table;
/// 2. country-code-prefixed national number embedded in the digit string;
/// 3. already canonical length, accepted as-is;
/// 4. exact national length, default country code prepended;
/// 5. tail fallback (last [`NATIONAL_LEN_MAX`] digits + country code),
///    flagged unconfirmed and logged for manual review.
pub fn normalize_with(raw: &str, country_code: &str) -> NormalizedPhone {
    let digits = digit_prefix(raw);

    if let Some(phone) = ALIAS_TABLE.get(digits.as_str()) {
        return NormalizedPhone {
            phone: (*phone).to_owned(),
            confirmed: true,
            strategy: Strategy::AliasTable,
        };
    }

    if let Some(found) = find_embedded(&digits, country_code) {
        return NormalizedPhone {
            phone: found,
            confirmed: true,
            strategy: Strategy::EmbeddedMatch,
        };
    }

    let canonical_min = country_code.len() + NATIONAL_LEN_MIN;
    let canonical_max = country_code.len() + NATIONAL_LEN_MAX;
    if (canonical_min..=canonical_max).contains(&digits.len()) {
        return NormalizedPhone {
            phone: digits,
            confirmed: true,
            strategy: Strategy::CanonicalLength,
        };
    }

    if (NATIONAL_LEN_MIN..=NATIONAL_LEN_MAX).contains(&digits.len()) {
        return NormalizedPhone {
            phone: format!("{country_code}{digits}"),
            confirmed: true,
            strategy: Strategy::NationalWithDefaultCc,
        };
    }

    let tail_start = digits.len().saturating_sub(NATIONAL_LEN_MAX);
    let phone = format!("{country_code}{}", &digits[tail_start..]);
    warn!(
        raw,
        recovered = %phone,
        "identifier normalizer fell back to tail heuristic; result is unconfirmed"
    );
    NormalizedPhone {
        phone,
        confirmed: false,
        strategy: Strategy::TailFallback,
    }
}

/// Digits of the identifier part before any `@domain` suffix.
fn digit_prefix(raw: &str) -> String {
    raw.split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}

fn find_embedded(digits: &str, country_code: &str) -> Option<String> {
    let pattern: &Regex = if country_code == DEFAULT_COUNTRY_CODE {
        &EMBEDDED_DEFAULT
    } else {
        return embedded_pattern(country_code)
            .find(digits)
            .map(|m| m.as_str().to_owned());
    };
    pattern.find(digits).map(|m| m.as_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_domain_suffix_and_non_digits() {
        assert_eq!(digit_prefix("5511999999999@s.whatsapp.net"), "5511999999999");
        assert_eq!(digit_prefix("+55 (11) 99999-9999"), "5511999999999");
        assert_eq!(digit_prefix("@alias"), "");
    }

    #[test]
    fn total_even_for_empty_input() {
        let result = normalize("");
        assert_eq!(result.strategy, Strategy::TailFallback);
        assert!(!result.confirmed);
        assert_eq!(result.phone, DEFAULT_COUNTRY_CODE);
    }
}
