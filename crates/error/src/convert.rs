use crate::{ErrorCode, SluiceError};
use sqlparser::parser::ParserError;

impl From<ParserError> for SluiceError {
    fn from(err: ParserError) -> Self {
        SluiceError::new(ErrorCode::SyntaxError, err.to_string())
    }
}

impl From<std::io::Error> for SluiceError {
    fn from(err: std::io::Error) -> Self {
        SluiceError::new(ErrorCode::Internal, err.to_string())
    }
}

impl From<serde_json::Error> for SluiceError {
    fn from(err: serde_json::Error) -> Self {
        SluiceError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

impl From<serde_yaml::Error> for SluiceError {
    fn from(err: serde_yaml::Error) -> Self {
        SluiceError::new(ErrorCode::InvalidConfig, err.to_string())
    }
}

/// Returns the option closest to `target` by edit distance, if any is within 3 edits.
pub fn find_closest_match(target: &str, options: &[String]) -> Option<String> {
    let mut best_match: Option<&str> = None;
    let mut min_distance = usize::MAX;

    for option in options {
        let distance = levenshtein(target, option);
        if distance < min_distance && distance <= 3 {
            min_distance = distance;
            best_match = Some(option.as_str());
        }
    }

    best_match.map(|s| s.to_string())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
