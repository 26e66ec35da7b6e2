//! Free-text quantity parsing.
//!
//! Precedence: colloquial phrase table, then the first standalone digit run,
//! then spelled-out Spanish numbers, then spelled-out English numbers, then 1.

use std::sync::LazyLock;

use regex::Regex;
use text2num::{Language, text2digits};

use crate::text::{fold, words};

/// Phrase table, scanned in order. The first phrase present in the text wins,
/// so longer phrases sit above the words they contain.
const PHRASES: &[(&str, u32)] = &[
    ("half a dozen", 6),
    ("media docena", 6),
    ("una docena", 12),
    ("a dozen", 12),
    ("docena", 12),
    ("dozen", 12),
    ("un par", 2),
    ("a pair", 2),
    ("a couple", 2),
    ("par", 2),
    ("pair", 2),
    ("uno", 1),
    ("una", 1),
    ("un", 1),
    ("one", 1),
    ("dos", 2),
    ("two", 2),
    ("tres", 3),
    ("three", 3),
    ("cuatro", 4),
    ("four", 4),
    ("cinco", 5),
    ("five", 5),
    ("seis", 6),
    ("six", 6),
    ("siete", 7),
    ("seven", 7),
    ("ocho", 8),
    ("eight", 8),
    ("nueve", 9),
    ("nine", 9),
    ("diez", 10),
    ("ten", 10),
];

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\b").expect("digit pattern is valid"));

/// Longest run of words tried as one spelled-out number.
const MAX_NUMBER_WORDS: usize = 6;

/// Converts a quantity expression into a positive integer. Never fails.
pub fn parse_quantity(text: &str) -> u32 {
    let folded = fold(text);
    let tokens = words(&folded);

    if let Some(n) = phrase_quantity(&tokens) {
        return n;
    }

    if let Some(n) = digit_quantity(&folded) {
        return n;
    }

    // Number words keep their accents ("dieciséis")
    let lowered = text.to_lowercase();
    let spelled = words(&lowered);
    for language in [Language::spanish(), Language::english()] {
        if let Some(n) = spelled_quantity(&spelled, &language) {
            return n;
        }
    }

    1
}

fn phrase_quantity(tokens: &[String]) -> Option<u32> {
    PHRASES.iter().find_map(|(phrase, n)| {
        let needle: Vec<&str> = phrase.split(' ').collect();
        tokens
            .windows(needle.len())
            .any(|w| w.iter().zip(&needle).all(|(a, b)| a == b))
            .then_some(*n)
    })
}

fn digit_quantity(text: &str) -> Option<u32> {
    let caps = DIGITS.captures(text)?;
    caps[1].parse::<u32>().ok().filter(|n| *n >= 1)
}

/// First run of words that reads as a positive whole number in `language`,
/// preferring the longest run at the earliest position.
fn spelled_quantity(tokens: &[String], language: &Language) -> Option<u32> {
    (0..tokens.len()).find_map(|start| {
        let longest = (start + MAX_NUMBER_WORDS).min(tokens.len());
        (start + 1..=longest).rev().find_map(|end| {
            text2digits(&tokens[start..end].join(" "), language)
                .ok()
                .and_then(|digits| digits.parse::<u32>().ok())
                .filter(|n| *n >= 1)
        })
    })
}
