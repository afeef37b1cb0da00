// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Content moderation for submitted letters.
//!
//! Two stages, both pure functions of the text:
//!
//! 1. Hard block: links, spam keywords, profanity. First match wins and the
//!    letter is rejected outright.
//! 2. Soft flag: heuristics that hold an otherwise acceptable letter for
//!    human review. Every heuristic is evaluated and all that fire are
//!    reported.
//!
//! The pattern and keyword tables live in [`ModerationRules`] so they can be
//! extended from configuration without touching the submission pipeline.

use crate::config::ModerationConfig;
use regex::Regex;
use std::fmt;
use tracing::debug;

/// Why a letter was rejected outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Contains a URL or something shaped like a domain
    Links,
    /// Contains a promotional or contact-harvesting keyword
    Spam,
    /// Contains a word from the profanity list
    Inappropriate,
}

impl BlockReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Links => "links_not_allowed",
            Self::Spam => "spam",
            Self::Inappropriate => "inappropriate_content",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Links => write!(f, "Links are not allowed in letters"),
            Self::Spam => write!(f, "Content identified as spam"),
            Self::Inappropriate => write!(f, "Inappropriate content detected"),
        }
    }
}

/// Outcome of the hard-block stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationResult {
    pub is_blocked: bool,
    pub reason: Option<BlockReason>,
}

impl ModerationResult {
    fn allowed() -> Self {
        Self {
            is_blocked: false,
            reason: None,
        }
    }

    fn blocked(reason: BlockReason) -> Self {
        Self {
            is_blocked: true,
            reason: Some(reason),
        }
    }
}

/// A heuristic that holds a letter for review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagReason {
    RepeatedCharacters,
    ExcessiveCaps,
    VeryShort,
    MultipleMentions,
    BorderlineLanguage,
    ExcessivePunctuation,
}

impl FlagReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepeatedCharacters => "repeated_characters",
            Self::ExcessiveCaps => "excessive_caps",
            Self::VeryShort => "very_short",
            Self::MultipleMentions => "multiple_mentions",
            Self::BorderlineLanguage => "borderline_language",
            Self::ExcessivePunctuation => "excessive_punctuation",
        }
    }
}

impl fmt::Display for FlagReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the soft-flag stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggingResult {
    pub should_flag: bool,
    /// Reason codes joined with ", " in evaluation order
    pub flag_reason: Option<String>,
    pub reasons: Vec<FlagReason>,
}

impl FlaggingResult {
    fn from_reasons(reasons: Vec<FlagReason>) -> Self {
        let flag_reason = (!reasons.is_empty()).then(|| {
            reasons
                .iter()
                .map(FlagReason::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        });

        Self {
            should_flag: !reasons.is_empty(),
            flag_reason,
            reasons,
        }
    }
}

/// Combined verdict for one letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Blocked(BlockReason),
    Flagged(FlaggingResult),
    Clean,
}

/// Numeric thresholds for the soft-flag heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagThresholds {
    /// Identical consecutive characters
    pub repeated_run: usize,
    /// Consecutive uppercase letters
    pub caps_run: usize,
    /// Trimmed length below which a letter is "very short"
    pub min_length: usize,
    /// `@mention` tokens
    pub mentions: usize,
    /// Doubled punctuation bursts (`!!`, `??`, `?!`)
    pub punctuation_bursts: usize,
}

impl Default for FlagThresholds {
    fn default() -> Self {
        Self {
            repeated_run: 5,
            caps_run: 10,
            min_length: 10,
            mentions: 3,
            punctuation_bursts: 3,
        }
    }
}

const URL_PATTERNS: &[&str] = &[
    r"(?i)https?://\S+",
    r"(?i)www\.\S+",
    r"(?i)[a-z0-9]+\.(com|net|org|io|co|br|me|info|biz|xyz|tk|ml|ga|cf|gq)\S*",
];

const SPAM_KEYWORDS: &[&str] = &[
    "compre agora",
    "clique aqui",
    "grátis",
    "ganhe dinheiro",
    "trabalhe em casa",
    "renda extra",
    "promoção imperdível",
    "oferta limitada",
    "não perca",
    "desconto exclusivo",
    "casino",
    "apostas",
    "bet365",
    "pixbet",
    "viagra",
    "crypto",
    "bitcoin",
    "invest",
    "telegram",
    "whatsapp",
    "zap",
];

const PROFANITY_WORDS: &[&str] = &[
    "porra",
    "caralho",
    "foda-se",
    "fodase",
    "arrombado",
    "cuzão",
    "buceta",
    "piroca",
    "pau no cu",
];

const BORDERLINE_WORDS: &[&str] = &[
    "merda",
    "bosta",
    "droga",
    "idiota",
    "imbecil",
    "otário",
    "babaca",
    "cacete",
    "porcaria",
    "vagabundo",
];

/// Pattern and keyword tables used by [`ContentModerator`].
#[derive(Debug, Clone)]
pub struct ModerationRules {
    pub url_patterns: Vec<String>,
    pub spam_keywords: Vec<String>,
    pub blocked_words: Vec<String>,
    pub borderline_words: Vec<String>,
    pub thresholds: FlagThresholds,
}

impl Default for ModerationRules {
    fn default() -> Self {
        let owned = |words: &[&str]| -> Vec<String> { words.iter().map(|w| w.to_string()).collect() };
        Self {
            url_patterns: owned(URL_PATTERNS),
            spam_keywords: owned(SPAM_KEYWORDS),
            blocked_words: owned(PROFANITY_WORDS),
            borderline_words: owned(BORDERLINE_WORDS),
            thresholds: FlagThresholds::default(),
        }
    }
}

impl ModerationRules {
    /// Built-in tables plus the configured extras.
    pub fn from_config(config: &ModerationConfig) -> Self {
        let mut rules = Self::default();
        rules.spam_keywords.extend(config.extra_spam_keywords.iter().cloned());
        rules.blocked_words.extend(config.extra_blocked_words.iter().cloned());
        rules
            .borderline_words
            .extend(config.extra_borderline_words.iter().cloned());
        rules
    }
}

/// Compiled moderation rules.
#[derive(Debug, Clone)]
pub struct ContentModerator {
    url_patterns: Vec<Regex>,
    spam_keywords: Vec<String>,
    blocked_words: Vec<String>,
    borderline_words: Vec<String>,
    thresholds: FlagThresholds,
    caps_run: Regex,
    mention: Regex,
    punctuation_burst: Regex,
}

impl ContentModerator {
    /// Compile a rule set.
    pub fn new(rules: ModerationRules) -> Result<Self, regex::Error> {
        let url_patterns = rules
            .url_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        let lower = |words: Vec<String>| -> Vec<String> {
            words
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };

        Ok(Self {
            url_patterns,
            spam_keywords: lower(rules.spam_keywords),
            blocked_words: lower(rules.blocked_words),
            borderline_words: lower(rules.borderline_words),
            caps_run: Regex::new(&format!(r"\p{{Lu}}{{{},}}", rules.thresholds.caps_run.max(1)))?,
            mention: Regex::new(r"@\w+")?,
            punctuation_burst: Regex::new(r"[!?]{2,}")?,
            thresholds: rules.thresholds,
        })
    }

    /// Hard-block stage. Links, then spam, then profanity; first match wins.
    pub fn moderate_content(&self, text: &str) -> ModerationResult {
        if self.url_patterns.iter().any(|p| p.is_match(text)) {
            debug!("Letter contains a link");
            return ModerationResult::blocked(BlockReason::Links);
        }

        let lower = text.to_lowercase();

        if let Some(keyword) = self.spam_keywords.iter().find(|k| lower.contains(k.as_str())) {
            debug!(keyword = %keyword, "Letter matched spam keyword");
            return ModerationResult::blocked(BlockReason::Spam);
        }

        if self.blocked_words.iter().any(|w| lower.contains(w.as_str())) {
            debug!("Letter matched profanity list");
            return ModerationResult::blocked(BlockReason::Inappropriate);
        }

        ModerationResult::allowed()
    }

    /// Soft-flag stage. Only meaningful for text the hard-block stage let through.
    pub fn check_for_flagging(&self, text: &str) -> FlaggingResult {
        let t = &self.thresholds;
        let mut reasons = Vec::new();

        if longest_run(text) >= t.repeated_run {
            reasons.push(FlagReason::RepeatedCharacters);
        }

        if self.caps_run.is_match(text) {
            reasons.push(FlagReason::ExcessiveCaps);
        }

        if text.trim().chars().count() < t.min_length {
            reasons.push(FlagReason::VeryShort);
        }

        if self.mention.find_iter(text).count() >= t.mentions {
            reasons.push(FlagReason::MultipleMentions);
        }

        let lower = text.to_lowercase();
        if self.borderline_words.iter().any(|w| lower.contains(w.as_str())) {
            reasons.push(FlagReason::BorderlineLanguage);
        }

        if self.punctuation_burst.find_iter(text).count() >= t.punctuation_bursts {
            reasons.push(FlagReason::ExcessivePunctuation);
        }

        FlaggingResult::from_reasons(reasons)
    }

    /// Run both stages.
    pub fn classify(&self, text: &str) -> Verdict {
        let moderation = self.moderate_content(text);
        if let Some(reason) = moderation.reason {
            return Verdict::Blocked(reason);
        }

        let flagging = self.check_for_flagging(text);
        if flagging.should_flag {
            Verdict::Flagged(flagging)
        } else {
            Verdict::Clean
        }
    }
}

/// Length of the longest run of identical characters, ignoring line breaks.
fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;

    for c in text.chars() {
        if c == '\n' || c == '\r' {
            previous = None;
            current = 0;
            continue;
        }
        if previous == Some(c) {
            current += 1;
        } else {
            previous = Some(c);
            current = 1;
        }
        longest = longest.max(current);
    }

    longest
}
