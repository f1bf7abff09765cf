//! Metric-safe label normalization.
//!
//! Free-text names (exchangers, currencies) become label values in two
//! stages:
//!
//! 1. transliteration through an injected [`Transliterator`], followed by
//!    removal of anything still outside printable ASCII;
//! 2. substitution: space and `-` become `_`; `(`, `)`, `/`, `.` are removed.
//!
//! The result is pure and idempotent. A non-empty name that normalizes to
//! nothing gets a stable hash placeholder (`x` + 16 hex digits of xxh64).
//!
//! Label cardinality follows the upstream name sets and is not bounded here.

use std::sync::Arc;

use xxhash_rust::xxh64::xxh64;

use crate::types::LabelTuple;

/// Characters that must never appear in a normalized label.
pub const UNSAFE_CHARS: [char; 6] = [' ', '-', '(', ')', '/', '.'];

/// Pure `name -> name` transliteration. Must map ASCII-only input to itself.
pub type Transliterator = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Converts free-text names into label values.
#[derive(Clone)]
pub struct LabelNormalizer {
    transliterate: Transliterator,
}

impl std::fmt::Debug for LabelNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelNormalizer").finish_non_exhaustive()
    }
}

impl Default for LabelNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(cyrillic_to_latin))
    }
}

impl LabelNormalizer {
    pub fn new(transliterate: Transliterator) -> Self {
        Self { transliterate }
    }

    /// Normalize one name.
    pub fn normalize(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }

        let latin = if name.is_ascii() { name.to_string() } else { (self.transliterate)(name) };

        let mut out = String::with_capacity(latin.len());
        for c in latin.chars() {
            match c {
                ' ' | '-' => out.push('_'),
                '(' | ')' | '/' | '.' => {}
                c if c.is_ascii_graphic() => out.push(c),
                _ => {}
            }
        }

        if out.is_empty() { placeholder(name) } else { out }
    }

    /// Normalize every name into one label tuple, in order.
    pub fn tuple(&self, names: &[&str]) -> LabelTuple {
        LabelTuple::new(names.iter().map(|n| self.normalize(n)).collect())
    }
}

/// Stable placeholder for names with no representable characters.
fn placeholder(name: &str) -> String {
    format!("x{:016x}", xxh64(name.as_bytes(), 0))
}

// ---------------------------------------------------------------------------
// Default transliteration: Russian Cyrillic, Wikipedia romanization
// ---------------------------------------------------------------------------

/// Transliterate Russian Cyrillic to Latin.
///
/// Context rules: `е` is `ye` at word start and after a vowel, `ъ` or `ь`;
/// `ий` / `ый` at word end is `y`; `ъ` and `ь` are dropped. Characters outside
/// the table pass through unchanged. Capitalization of the source letter is
/// kept on the first output letter.
pub fn cyrillic_to_latin(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let lower = lower_cyrillic(c);
        let upper = c != lower;
        let prev = i.checked_sub(1).map(|p| lower_cyrillic(chars[p]));
        let next = chars.get(i + 1).map(|&n| lower_cyrillic(n));
        let after_next_is_letter = chars.get(i + 2).is_some_and(|n| n.is_alphabetic());

        // word-final ий / ый
        if matches!(lower, 'и' | 'ы') && next == Some('й') && !after_next_is_letter {
            push_cased(&mut out, "y", upper);
            i += 2;
            continue;
        }

        let latin: &str = match lower {
            'е' => {
                let word_start = prev.is_none_or(|p| !p.is_alphabetic());
                let after_soft = prev.is_some_and(|p| is_cyrillic_vowel(p) || p == 'ъ' || p == 'ь');
                if word_start || after_soft { "ye" } else { "e" }
            }
            'а' => "a",
            'б' => "b",
            'в' => "v",
            'г' => "g",
            'д' => "d",
            'ё' => "yo",
            'ж' => "zh",
            'з' => "z",
            'и' => "i",
            'й' => "y",
            'к' => "k",
            'л' => "l",
            'м' => "m",
            'н' => "n",
            'о' => "o",
            'п' => "p",
            'р' => "r",
            'с' => "s",
            'т' => "t",
            'у' => "u",
            'ф' => "f",
            'х' => "kh",
            'ц' => "ts",
            'ч' => "ch",
            'ш' => "sh",
            'щ' => "shch",
            'ъ' | 'ь' => "",
            'ы' => "y",
            'э' => "e",
            'ю' => "yu",
            'я' => "ya",
            _ => {
                out.push(c);
                i += 1;
                continue;
            }
        };

        push_cased(&mut out, latin, upper);
        i += 1;
    }

    out
}

fn lower_cyrillic(c: char) -> char {
    if ('А'..='Я').contains(&c) || c == 'Ё' { c.to_lowercase().next().unwrap_or(c) } else { c }
}

fn is_cyrillic_vowel(c: char) -> bool {
    matches!(c, 'а' | 'е' | 'ё' | 'и' | 'о' | 'у' | 'ы' | 'э' | 'ю' | 'я')
}

fn push_cased(out: &mut String, latin: &str, upper: bool) {
    let mut chars = latin.chars();
    match chars.next() {
        Some(first) if upper => {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
        _ => out.push_str(latin),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn norm(s: &str) -> String {
        LabelNormalizer::default().normalize(s)
    }

    #[test]
    fn substitution_table() {
        assert_eq!(norm("Bitcoin (BTC)"), "Bitcoin_BTC");
        assert_eq!(norm("Visa/MasterCard RUB"), "VisaMasterCard_RUB");
        assert_eq!(norm("Perfect-Money.com"), "Perfect_Moneycom");
        assert_eq!(norm("FastEx"), "FastEx");
    }

    #[test]
    fn transliterates_cyrillic() {
        assert_eq!(norm("Сбербанк"), "Sberbank");
        assert_eq!(norm("Тинькофф"), "Tinkoff");
        assert_eq!(norm("Альфа-Банк"), "Alfa_Bank");
        assert_eq!(norm("Наличные RUB"), "Nalichnyye_RUB");
        assert_eq!(norm("Ёлка"), "Yolka");
    }

    #[test]
    fn context_rules() {
        assert_eq!(cyrillic_to_latin("Екатеринбург"), "Yekaterinburg");
        assert_eq!(cyrillic_to_latin("Юрий"), "Yury");
        assert_eq!(cyrillic_to_latin("красный банк"), "krasny bank");
        assert_eq!(cyrillic_to_latin("объект"), "obyekt");
        assert_eq!(cyrillic_to_latin("ASCII stays"), "ASCII stays");
    }

    #[test]
    fn drops_unrepresentable_characters() {
        assert_eq!(norm("Обмен №1 ✓"), "Obmen_1_");
    }

    #[test]
    fn empty_result_gets_placeholder() {
        let label = norm("()./");
        assert_eq!(label.len(), 17);
        assert!(label.starts_with('x'));
        assert_eq!(label, norm("()./"));
        assert_ne!(label, norm("✓✓"));
        assert_eq!(norm(&label), label);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(norm(""), "");
    }

    #[test]
    fn injected_transliterator_is_used() {
        let german: Transliterator = Arc::new(|s: &str| s.replace('ß', "ss"));
        let n = LabelNormalizer::new(german);
        assert_eq!(n.normalize("Straße 1"), "Strasse_1");
    }

    #[test]
    fn tuple_keeps_order() {
        let n = LabelNormalizer::default();
        let t = n.tuple(&["Fast Ex", "USD", "RUB"]);
        assert_eq!(t, LabelTuple::from(["Fast_Ex", "USD", "RUB"]));
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(name in "\\PC{0,24}") {
            let n = LabelNormalizer::default();
            let once = n.normalize(&name);
            prop_assert_eq!(n.normalize(&once), once);
        }

        #[test]
        fn normalize_emits_no_unsafe_chars(name in "[ a-zA-Zа-яА-ЯёЁ0-9()./_-]{0,24}") {
            let out = LabelNormalizer::default().normalize(&name);
            prop_assert!(!out.contains(UNSAFE_CHARS));
            prop_assert!(out.is_ascii());
        }
    }
}
