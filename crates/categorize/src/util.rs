/// Levenshtein edit distance over Unicode scalar values, using the two-row
/// O(min(m,n)) space algorithm.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Keep the shorter string in the inner loop to minimise allocation.
    let (a, b, m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for j in 1..=n {
        curr[0] = j;
        for i in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[i] = (prev[i] + 1).min(curr[i - 1] + 1).min(prev[i - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m]
}

/// `1 - distance / max_len`, in `[0, 1]`. Two empty strings are identical;
/// an empty string shares nothing with a non-empty one.
pub fn similarity(s1: &str, s2: &str) -> f64 {
    let (l1, l2) = (s1.chars().count(), s2.chars().count());
    if l1 == 0 && l2 == 0 {
        return 1.0;
    }
    if l1 == 0 || l2 == 0 {
        return 0.0;
    }
    let max_len = l1.max(l2) as f64;
    (1.0 - levenshtein_distance(s1, s2) as f64 / max_len).max(0.0)
}
