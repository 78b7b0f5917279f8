//! Keyword and category matching for the always-available fallback.
//!
//! No precomputed state: candidates are filtered by token overlap against
//! the prompt body or by sharing the target's category, then ranked by
//! category match and like count. Scores on this path are synthetic.

use crate::prompts::Category;
use crate::similarity::engine::SimilarPrompt;
use regex::{Regex, RegexBuilder};

/// Tokens shorter than this carry no matching signal
const MIN_TOKEN_CHARS: usize = 3;

/// Lowercased whitespace tokens of the prompt body, keeping only tokens
/// longer than [`MIN_TOKEN_CHARS`].
pub fn content_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|token| token.chars().count() > MIN_TOKEN_CHARS)
        .map(String::from)
        .collect()
}

/// Case-insensitive alternation over the (escaped) tokens.
pub fn token_pattern(tokens: &[String]) -> Option<Regex> {
    if tokens.is_empty() {
        return None;
    }

    let alternation = tokens
        .iter()
        .map(|token| regex::escape(token))
        .collect::<Vec<_>>()
        .join("|");

    match RegexBuilder::new(&alternation).case_insensitive(true).build() {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            log::warn!("couldnt build token pattern: {err}");
            None
        }
    }
}

/// Rank fallback candidates in place: prompts sharing the target category
/// first, then by like count descending within each group.
pub fn rank_candidates(candidates: &mut [SimilarPrompt], target_category: Category) {
    candidates.sort_by(|a, b| {
        let a_match = a.prompt.category == target_category;
        let b_match = b.prompt.category == target_category;
        b_match
            .cmp(&a_match)
            .then_with(|| b.likes_count.cmp(&a.likes_count))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eid::Eid;
    use crate::prompts::Prompt;
    use chrono::Utc;

    fn scored(category: Category, likes_count: usize) -> SimilarPrompt {
        SimilarPrompt {
            prompt: Prompt {
                id: Eid::new(),
                title: String::new(),
                description: String::new(),
                content: String::new(),
                category,
                tags: vec![],
                likes: vec![],
                is_public: None,
                created_at: Utc::now(),
            },
            similarity: 0.5,
            comments_count: 0,
            likes_count,
        }
    }

    #[test]
    fn test_content_tokens_filters_short_words() {
        let tokens = content_tokens("Fix the SQL query for me");
        assert_eq!(tokens, vec!["query"]);
    }

    #[test]
    fn test_content_tokens_lowercases() {
        let tokens = content_tokens("Refactor LEGACY JavaScript");
        assert_eq!(tokens, vec!["refactor", "legacy", "javascript"]);
    }

    #[test]
    fn test_content_tokens_empty_for_short_input() {
        assert!(content_tokens("a bb ccc").is_empty());
        assert!(content_tokens("").is_empty());
        assert!(content_tokens("   ").is_empty());
    }

    #[test]
    fn test_token_pattern_matches_any_token() {
        let tokens = vec!["rust".to_string(), "async".to_string()];
        let pattern = token_pattern(&tokens).unwrap();

        assert!(pattern.is_match("learning RUST the hard way"));
        assert!(pattern.is_match("an Async runtime"));
        assert!(!pattern.is_match("cooking recipes"));
    }

    #[test]
    fn test_token_pattern_escapes_metacharacters() {
        let tokens = vec!["c++?".to_string()];
        let pattern = token_pattern(&tokens).unwrap();

        assert!(pattern.is_match("about c++? maybe"));
        assert!(!pattern.is_match("about c"));
    }

    #[test]
    fn test_token_pattern_empty_tokens() {
        assert!(token_pattern(&[]).is_none());
    }

    #[test]
    fn test_rank_category_match_first() {
        let mut candidates = vec![
            scored(Category::Writing, 100),
            scored(Category::Coding, 1),
        ];

        rank_candidates(&mut candidates, Category::Coding);

        assert_eq!(candidates[0].prompt.category, Category::Coding);
        assert_eq!(candidates[1].prompt.category, Category::Writing);
    }

    #[test]
    fn test_rank_likes_break_ties() {
        let mut candidates = vec![
            scored(Category::Coding, 3),
            scored(Category::Coding, 10),
        ];

        rank_candidates(&mut candidates, Category::Coding);

        assert_eq!(candidates[0].likes_count, 10);
        assert_eq!(candidates[1].likes_count, 3);
    }

    #[test]
    fn test_rank_likes_within_non_matching_group() {
        let mut candidates = vec![
            scored(Category::Writing, 2),
            scored(Category::Learning, 8),
            scored(Category::Coding, 0),
        ];

        rank_candidates(&mut candidates, Category::Coding);

        assert_eq!(candidates[0].prompt.category, Category::Coding);
        assert_eq!(candidates[1].likes_count, 8);
        assert_eq!(candidates[2].likes_count, 2);
    }
}
