//! Fuzzy name matching between broken-symlink targets and catalog torrents
//! (§4.6), and the related name comparison `FailureHandler` uses to find
//! orphaned links for a terminally failed torrent (§4.7).

use dtm_core::Torrent;

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "wmv", "flv", "m4v", "webm"];
const PREFIX_BONUS: f64 = 0.1;
const PREFIX_LEN: usize = 30;

/// Normalize a display name for comparison: lower-case, punctuation to
/// spaces, strip a trailing video extension and bracketed/parenthesized
/// tails, collapse whitespace.
#[must_use]
pub fn normalize(name: &str) -> String {
    let lowered = name.to_lowercase();
    let despaced: String = lowered
        .chars()
        .map(|ch| if matches!(ch, '.' | '_' | '-') { ' ' } else { ch })
        .collect();

    let without_extension = VIDEO_EXTENSIONS
        .iter()
        .find_map(|ext| despaced.strip_suffix(&format!(" {ext}")).or_else(|| despaced.strip_suffix(ext)))
        .unwrap_or(&despaced);

    let without_tails = strip_bracketed_tails(without_extension);

    without_tails.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_bracketed_tails(input: &str) -> &str {
    let mut end = input.len();
    let bytes = input.as_bytes();
    loop {
        let trimmed = input[..end].trim_end();
        if let Some(open) = trimmed.rfind(['(', '[']) {
            let closer = if trimmed.as_bytes()[open] == b'(' { ')' } else { ']' };
            if trimmed[open..].ends_with(closer) {
                end = open;
                continue;
            }
        }
        break;
    }
    let _ = bytes;
    input[..end].trim_end()
}

fn lcs_length(a: &[char], b: &[char]) -> usize {
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for ch_a in a {
        for (j, ch_b) in b.iter().enumerate() {
            current[j + 1] = if ch_a == ch_b {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Similarity score in `0.0..=1.0` between two already-normalized strings:
/// a longest-common-subsequence ratio plus a shared-prefix bonus.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let chars_a: Vec<char> = a.chars().collect();
    let chars_b: Vec<char> = b.chars().collect();
    let lcs = lcs_length(&chars_a, &chars_b);
    let base = 2.0 * lcs as f64 / (chars_a.len() + chars_b.len()) as f64;

    let prefix_a: String = chars_a.iter().take(PREFIX_LEN).collect();
    let prefix_b: String = chars_b.iter().take(PREFIX_LEN).collect();
    let bonus = if !prefix_a.is_empty() && (b.starts_with(&prefix_a) || a.starts_with(&prefix_b)) {
        PREFIX_BONUS
    } else {
        0.0
    };

    (base + bonus).min(1.0)
}

/// Fraction of `target`'s whitespace-separated words present in `candidate`.
#[must_use]
pub fn word_intersection_ratio(target: &str, candidate: &str) -> f64 {
    let target_words: Vec<&str> = target.split_whitespace().collect();
    if target_words.is_empty() {
        return 0.0;
    }
    let candidate_words: std::collections::HashSet<&str> = candidate.split_whitespace().collect();
    let present = target_words.iter().filter(|word| candidate_words.contains(*word)).count();
    present as f64 / target_words.len() as f64
}

/// A single scored candidate for a symlink-extracted name.
pub struct CorrelationMatch {
    /// The torrent matched against.
    pub torrent: Torrent,
    /// Final similarity score.
    pub score: f64,
}

/// Matches extracted symlink names against the catalog (§4.6) and decides
/// whether a failed torrent's orphaned links should be cleaned up (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct Correlator {
    promote_threshold: f64,
    cleanup_threshold: f64,
}

impl Correlator {
    /// Build a correlator using the configured promotion and cleanup
    /// thresholds.
    #[must_use]
    pub fn new(promote_threshold: f64, cleanup_threshold: f64) -> Self {
        Self {
            promote_threshold,
            cleanup_threshold,
        }
    }

    /// Find the single best-matching torrent for `extracted_name`, if any
    /// candidate clears the promotion threshold.
    #[must_use]
    pub fn best_match(&self, extracted_name: &str, candidates: &[Torrent]) -> Option<CorrelationMatch> {
        let normalized_target = normalize(extracted_name);
        candidates
            .iter()
            .map(|torrent| CorrelationMatch {
                torrent: torrent.clone(),
                score: similarity(&normalized_target, &normalize(&torrent.filename)),
            })
            .filter(|candidate| candidate.score >= self.promote_threshold)
            .fold(None, |best: Option<CorrelationMatch>, candidate| match &best {
                Some(current) if current.score >= candidate.score => best,
                _ => Some(candidate),
            })
    }

    /// Whether `link_name` should be treated as an orphan of `failed_filename`
    /// for the purposes of `FailureHandler`'s destructive cleanup (§4.7):
    /// the cleanup threshold on similarity, with a word-intersection
    /// fallback.
    #[must_use]
    pub fn is_orphan_of(&self, failed_filename: &str, link_name: &str) -> bool {
        let target = normalize(failed_filename);
        let candidate = normalize(link_name);
        if similarity(&target, &candidate) >= self.cleanup_threshold {
            return true;
        }
        word_intersection_ratio(&target, &candidate) >= 0.7
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dtm_core::TorrentStatus;

    #[test]
    fn normalize_strips_punctuation_extension_and_tails() {
        let normalized = normalize("My.Show.S01E01.1080p.WEB-DL.x265-GROUP.mkv [abc123]");
        assert_eq!(normalized, "my show s01e01 1080p web dl x265 group");
    }

    #[test]
    fn identical_normalized_names_score_one() {
        let a = normalize("My.Show.S01E01.mkv");
        let b = normalize("my show s01e01");
        assert!((similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_names_score_low() {
        let a = normalize("Completely.Different.Title.mkv");
        let b = normalize("Another.Unrelated.Movie.2020.mkv");
        assert!(similarity(&a, &b) < 0.5);
    }

    #[test]
    fn best_match_requires_promote_threshold() {
        let correlator = Correlator::new(0.7, 0.6);
        let now = Utc::now();
        let torrents = vec![
            Torrent::new_observed("1", "a".repeat(40), "My Show S01E01 1080p", TorrentStatus::Downloaded, 10, now),
            Torrent::new_observed("2", "b".repeat(40), "Totally Unrelated Film", TorrentStatus::Downloaded, 10, now),
        ];
        let matched = correlator.best_match("My.Show.S01E01.1080p.mkv", &torrents);
        assert_eq!(matched.unwrap().torrent.id, "1");

        let no_match = correlator.best_match("Nothing.Like.Either.mkv", &torrents);
        assert!(no_match.is_none());
    }

    #[test]
    fn orphan_detection_falls_back_to_word_intersection() {
        let correlator = Correlator::new(0.7, 0.6);
        assert!(correlator.is_orphan_of("My Show Special Edition Version", "My Show Special Edition Remux 1080p"));
    }
}
