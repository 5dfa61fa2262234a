//! Sort keys for provision identifiers.
//!
//! Converts bare identifiers (e.g., "3", "3a", "41za", "IV") into ordered
//! keys so that path comparison recovers correct document order.
//!
//! # Numbering conventions
//!
//! - Plain numeric: Article 1, 2, ..., 10
//! - Letter suffix (amendment insertion): Article 3a between 3 and 4
//! - Z-prefix (pre-insertion): 3za between 3 and 3a
//! - Double letter: point (aa) after point (a) and before point (b)
//! - Roman numerals for chapters, parts, titles, annexes and subpoints

/// Ordered key for a single identifier: base number plus up to two suffix groups.
pub type ProvisionKey = [u32; 3];

/// Compute the ordered key of a provision identifier.
///
/// # Algorithm
///
/// 1. Extract leading ASCII digits → base number
/// 2. Parse remaining letters (case-insensitive) into up to 2 suffix groups:
///    - Z-prefix group: ZA=1, ZB=2, ..., ZZ=26 (sorts before plain letters)
///    - Plain letter: A=10, B=20, ..., Z=260 (gaps of 10 for future insertions)
/// 3. Pad to exactly 3 segments with 0
pub fn provision_key(s: &str) -> ProvisionKey {
    let s = s.trim();
    if s.is_empty() {
        return [0, 0, 0];
    }

    let upper = s.to_ascii_uppercase();
    let bytes = upper.as_bytes();

    // Extract leading digits.
    let digit_end = bytes
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(bytes.len());
    let base: u32 = if digit_end > 0 {
        upper[..digit_end].parse().unwrap_or(u32::MAX)
    } else {
        0
    };

    let suffix = &bytes[digit_end..];
    let mut segments: Vec<u32> = vec![base];
    let mut i = 0;

    while i < suffix.len() && segments.len() < 3 {
        if suffix[i] == b'Z' && i + 1 < suffix.len() && suffix[i + 1].is_ascii_uppercase() {
            let letter_val = (suffix[i + 1] - b'A') as u32 + 1;
            segments.push(letter_val);
            i += 2;
        } else if suffix[i].is_ascii_uppercase() {
            let letter_val = (suffix[i] - b'A') as u32 + 1;
            segments.push(letter_val * 10);
            i += 1;
        } else {
            // Stop on unexpected character.
            break;
        }
    }

    while segments.len() < 3 {
        segments.push(0);
    }

    [segments[0], segments[1], segments[2]]
}

/// Normalise an identifier into a lexicographically-sortable string.
///
/// "3" → "003.000.000", "3a" → "003.010.000", "41za" → "041.001.000".
/// Identifiers above 999 widen the first segment, so prefer
/// [`provision_key`] for comparisons.
pub fn normalize_provision(s: &str) -> String {
    let [base, first, second] = provision_key(s);
    format!("{:03}.{:03}.{:03}", base, first, second)
}

/// Value of a roman numeral (case-insensitive), or `None` if `s` is not one.
///
/// Only canonical subtractive forms are accepted ("IV", not "IIII"), so
/// single letters such as "c" or "d" still read as numerals; callers decide
/// per level whether roman reading applies.
pub fn roman_value(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut total = 0u32;
    let mut prev = 0u32;
    for c in s.chars().rev() {
        let v = match c.to_ascii_uppercase() {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            'L' => 50,
            'C' => 100,
            'D' => 500,
            'M' => 1000,
            _ => return None,
        };
        if v < prev {
            total = total.checked_sub(v)?;
        } else {
            total += v;
            prev = v;
        }
    }
    (to_roman(total).eq_ignore_ascii_case(s)).then_some(total)
}

/// Render a number as an uppercase roman numeral.
pub fn to_roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for &(value, glyph) in TABLE {
        while n >= value {
            out.push_str(glyph);
            n -= value;
        }
    }
    out
}
