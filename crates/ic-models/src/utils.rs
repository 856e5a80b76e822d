//! Utility functions for episode files.

use regex::RegexBuilder;
use thiserror::Error;

/// Default episode filename pattern. The first capture group is the number.
pub const DEFAULT_EPISODE_PATTERN: &str = r"episode(\d+)\.(mp4|avi|mkv)";

/// Errors from episode filename parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EpisodeNameError {
    #[error("Invalid episode filename pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Episode filename '{filename}' does not match pattern '{pattern}' exactly once ({matches} matches)")]
    NoUniqueMatch {
        filename: String,
        pattern: String,
        matches: usize,
    },

    #[error("Episode number '{0}' is not a valid number")]
    InvalidNumber(String),
}

/// Extract the episode number from an episode filename.
///
/// Matching is case-insensitive and must succeed exactly once. The first
/// capture group of `pattern` holds the episode number.
///
/// # Examples
/// ```
/// use ic_models::utils::{episode_number_from_filename, DEFAULT_EPISODE_PATTERN};
/// assert_eq!(episode_number_from_filename("Episode42.MP4", DEFAULT_EPISODE_PATTERN).unwrap(), 42);
/// ```
pub fn episode_number_from_filename(filename: &str, pattern: &str) -> Result<u32, EpisodeNameError> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| EpisodeNameError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

    let matches: Vec<_> = re.captures_iter(filename).collect();
    let [captures] = matches.as_slice() else {
        return Err(EpisodeNameError::NoUniqueMatch {
            filename: filename.to_string(),
            pattern: pattern.to_string(),
            matches: matches.len(),
        });
    };

    let number = captures
        .get(1)
        .map(|m| m.as_str())
        .ok_or_else(|| EpisodeNameError::InvalidNumber(String::new()))?;

    number
        .parse()
        .map_err(|_| EpisodeNameError::InvalidNumber(number.to_string()))
}
