use sessionwarp::normalize::{Strategy, normalize};

#[test]
fn confirmed_alias_resolves_through_the_table() {
    let result = normalize("92045460951243@alias");

    assert_eq!(result.phone, "5511986420753");
    assert!(result.confirmed);
    assert_eq!(result.strategy, Strategy::AliasTable);
}

#[test]
fn already_canonical_number_is_returned_unchanged() {
    let result = normalize("5511987654321@peer");

    assert_eq!(result.phone, "5511987654321");
    assert!(result.confirmed);
}

#[test]
fn embedded_canonical_number_is_extracted_from_garbage() {
    let result = normalize("9975511987654321004");

    assert_eq!(result.phone, "5511987654321");
    assert!(result.confirmed);
    assert_eq!(result.strategy, Strategy::EmbeddedMatch);
}

#[test]
fn national_number_gets_default_country_code() {
    let result = normalize("11987654321");

    assert_eq!(result.phone, "5511987654321");
    assert!(result.confirmed);
    assert_eq!(result.strategy, Strategy::NationalWithDefaultCc);
}

#[test]
fn foreign_canonical_length_is_accepted_as_is() {
    let result = normalize("491512345678");

    assert_eq!(result.phone, "491512345678");
    assert!(result.confirmed);
    assert_eq!(result.strategy, Strategy::CanonicalLength);
}

#[test]
fn garbled_long_string_falls_back_to_tail_and_is_unconfirmed() {
    // 15 digits, no alias-table hit, no embedded country-code match.
    let result = normalize("919876043218765");

    assert_eq!(result.phone, "5576043218765");
    assert!(!result.confirmed);
    assert_eq!(result.strategy, Strategy::TailFallback);
}

#[test]
fn never_panics_on_pathological_inputs() {
    for raw in ["", "@alias", "abc", "1", "+", "55", "9".repeat(64).as_str()] {
        let result = normalize(raw);
        assert!(!result.phone.is_empty());
    }
}
