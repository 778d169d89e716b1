//! Normalized edit-distance similarity for free-text fields.

use rust_decimal::Decimal;

/// Case-insensitive similarity in `[0, 1]`.
///
/// `(L - d) / L` where `L` is the longer length in characters and `d` the
/// Levenshtein distance. Identical strings (including two empty strings)
/// score 1.
pub fn similarity(a: &str, b: &str) -> Decimal {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    if a == b {
        return Decimal::ONE;
    }

    let longest = a.len().max(b.len());
    let distance = edit_distance(&a, &b);

    Decimal::from(longest - distance) / Decimal::from(longest)
}

/// Levenshtein distance over single-character insert, delete and substitute.
///
/// Uses a `(b.len() + 1) x (a.len() + 1)` table.
pub fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut table = vec![vec![0usize; a.len() + 1]; b.len() + 1];

    for (i, row) in table.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=a.len() {
        table[0][j] = j;
    }

    for i in 1..=b.len() {
        for j in 1..=a.len() {
            table[i][j] = if b[i - 1] == a[j - 1] {
                table[i - 1][j - 1]
            } else {
                1 + table[i - 1][j - 1]
                    .min(table[i][j - 1])
                    .min(table[i - 1][j])
            };
        }
    }

    table[b.len()][a.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(similarity("Rolex SA", "Rolex SA"), Decimal::ONE);
    }

    #[test]
    fn comparison_ignores_case() {
        assert_eq!(similarity("ROLEX sa", "rolex SA"), Decimal::ONE);
    }

    #[test]
    fn empty_strings_score_one() {
        assert_eq!(similarity("", ""), Decimal::ONE);
    }

    #[test]
    fn empty_against_text_scores_zero() {
        assert_eq!(similarity("", "abc"), Decimal::ZERO);
        assert_eq!(similarity("abc", ""), Decimal::ZERO);
    }

    #[test]
    fn completely_different_strings_score_zero() {
        assert_eq!(similarity("abc", "xyz"), Decimal::ZERO);
    }

    #[test]
    fn partial_similarity_uses_longer_length() {
        // kitten -> sitting: distance 3, longest 7
        assert_eq!(
            similarity("kitten", "sitting"),
            Decimal::from(4) / Decimal::from(7)
        );
        assert_eq!(similarity("Nestle SA", "Nestlé SA"), Decimal::from(8) / Decimal::from(9));
    }

    #[test]
    fn similarity_is_symmetric() {
        assert_eq!(similarity("Rolex", "Rolex SA"), similarity("Rolex SA", "Rolex"));
    }

    #[test]
    fn edit_distance_classic_cases() {
        assert_eq!(edit_distance(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(edit_distance(&chars("flaw"), &chars("lawn")), 2);
        assert_eq!(edit_distance(&chars(""), &chars("abc")), 3);
        assert_eq!(edit_distance(&chars("abc"), &chars("abc")), 0);
    }
}
