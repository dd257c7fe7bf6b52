//! Comparison keys for headers and labels.
//!
//! Every "do these two labels mean the same thing" decision in the crate goes
//! through [`normalize`]: Turkish letters are folded to their Latin base,
//! remaining diacritics are stripped through NFKD decomposition, case is folded
//! and punctuation runs collapse to a single space.

use unicode_normalization::UnicodeNormalization;

fn fold_turkish(ch: char) -> char {
    match ch {
        'ı' | 'İ' => 'i',
        'ş' | 'Ş' => 's',
        'ğ' | 'Ğ' => 'g',
        'ö' | 'Ö' => 'o',
        'ü' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        other => other,
    }
}

/// Canonicalizes `text` into a comparison key.
///
/// ```
/// use cost_reconcile::normalize::normalize;
///
/// assert_eq!(normalize("  İş Yeri_Kodu! "), "is yeri kodu");
/// assert_eq!(normalize("Masraf-Yeri (Kodu)"), "masraf yeri kodu");
/// ```
pub fn normalize(text: &str) -> String {
    let folded = text.trim().chars().map(fold_turkish).collect::<String>();
    let mut key = String::with_capacity(folded.len());
    let mut pending_space = false;
    for ch in folded.nfkd().filter(char::is_ascii) {
        if ch.is_ascii_alphanumeric() {
            if pending_space && !key.is_empty() {
                key.push(' ');
            }
            pending_space = false;
            key.push(ch.to_ascii_lowercase());
        } else {
            pending_space = true;
        }
    }
    key
}

/// Trimmed, lowercased form used to compare code values (plant, cost center).
pub fn fold_code(value: &str) -> String {
    value.trim().to_lowercase()
}
