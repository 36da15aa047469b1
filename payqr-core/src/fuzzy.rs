//! Text normalization and token-sort similarity used by bank resolution.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Comparability key: compatibility-decomposed, accents dropped, lowercased,
/// whitespace removed. `"Ngân hàng Á Châu"` becomes `"nganhangachau"`.
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| !is_combining_mark(*c) && !c.is_whitespace())
        .collect()
}

/// Word-order-insensitive similarity on a 0..=100 scale.
///
/// Tokens are sorted and rejoined before computing the normalized Indel
/// similarity `2 * lcs / (len_a + len_b)`.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let a = sorted_tokens(a);
    let b = sorted_tokens(b);
    ratio(&a, &b)
}

fn sorted_tokens(s: &str) -> Vec<char> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ").chars().collect()
}

fn ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

/// Longest common subsequence length, single-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let up = row[j + 1];
            row[j + 1] = if ca == cb {
                diag + 1
            } else {
                up.max(row[j])
            };
            diag = up;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_accents_case_and_spaces() {
        assert_eq!(normalize("Ngân hàng Á Châu"), "nganhangachau");
        assert_eq!(normalize("  MB Bank "), "mbbank");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_keeps_d_stroke() {
        // đ has no canonical decomposition; it survives as-is
        assert_eq!(normalize("Quân đội"), "quanđoi");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for s in [
            "Việt Nam Thịnh Vượng",
            "VIETCOMBANK",
            "Ngân hàng TMCP Công thương Việt Nam",
            "ﬁnance ㎁",
            "\tTab\u{00A0}Sep",
        ] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_ratio_identical_and_disjoint() {
        assert_eq!(token_sort_ratio("vietcombank", "vietcombank"), 100.0);
        assert_eq!(token_sort_ratio("abc", "xyz"), 0.0);
        assert_eq!(token_sort_ratio("", ""), 100.0);
    }

    #[test]
    fn test_ratio_ignores_word_order() {
        assert_eq!(token_sort_ratio("quan doi bank", "bank doi quan"), 100.0);
    }

    #[test]
    fn test_ratio_typo_scores_high() {
        // lcs("teckcombanh", "techcombank") = 9 → 200 * 9 / 22
        let score = token_sort_ratio("teckcombanh", "techcombank");
        assert!((score - 81.818).abs() < 0.01, "score={score}");
    }
}
