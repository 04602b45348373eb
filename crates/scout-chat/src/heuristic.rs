//! Deterministic fallback extractor.
//!
//! Entities are tokens shaped like gene or protein symbols (letters,
//! digits, hyphenated parts, optionally a trailing Greek letter) that carry
//! at least two uppercase ASCII letters or mix letters with digits, minus a
//! stoplist of common acronyms compared case-insensitively. A message whose
//! only ASCII word is short and alphabetic ("egfr", "帮我看看tnf") names that
//! word unless it is a common English or command word.
//! Confirmation, rejection, refresh and list requests are matched against
//! fixed phrase sets in English and Chinese.

use async_trait::async_trait;
use regex::Regex;

use scout_core::normalize_entity;

use crate::error::ExtractionError;
use crate::extraction::{Extraction, ExtractionService};
use crate::types::HistoryEntry;

const ENTITY_PATTERN: &str = r"[A-Za-z][A-Za-z0-9]*(?:-(?:[A-Za-z0-9]+|[α-ωΑ-Ω]))*";

const STOPLIST: &[&str] = &[
    "OK", "OKAY", "YES", "NO", "DNA", "RNA", "MRNA", "AI", "API", "PDF", "LLM", "FDA", "EMA",
    "USA", "UK", "EU", "CEO", "ID", "URL", "HTTP", "HTML", "JSON", "PK", "PD", "IPO", "QA",
];

/// Checked before affirmatives: "不确认" is a rejection.
const NEGATIVE_PHRASES: &[&str] = &["取消", "算了", "不要", "不用", "不是", "不确认", "不了"];
const NEGATIVE_WORDS: &[&str] = &["no", "nope", "cancel", "stop", "abort", "nah"];

const AFFIRMATIVE_PHRASES: &[&str] = &["确认", "开始", "好的", "可以", "是的", "没问题"];
/// Too short to match inside longer text; only accepted as the whole message.
const AFFIRMATIVE_EXACT: &[&str] = &["是", "好", "行", "对", "嗯"];
const AFFIRMATIVE_WORDS: &[&str] = &["yes", "y", "ok", "okay", "confirm", "sure", "start", "go", "yep"];

const REFRESH_PHRASES: &[&str] = &["强制刷新", "刷新", "重新分析", "重新生成"];
const REFRESH_WORDS: &[&str] = &["refresh", "rerun", "regenerate"];

/// Lone lowercase words that are never read as a target.
const COMMON_WORDS: &[&str] = &[
    "hello", "hey", "hiya", "thanks", "thank", "thx", "help", "what", "why", "how", "who",
    "when", "where", "which", "status", "progress", "news", "done", "wait", "later", "bye",
    "again", "please", "test", "great", "good", "fine", "cool", "nice", "hmm", "huh", "the",
    "and", "any", "all", "more", "list", "result", "results", "report",
];

const LIST_PHRASES: &[&str] = &[
    "其他基因", "其它基因", "其他靶点", "其它靶点", "聊过", "提到过", "other entities",
    "other genes", "other targets", "mentioned", "discussed",
];

/// Pattern-matching extractor with a fixed confidence.
pub struct HeuristicExtractor {
    token: Regex,
    confidence: f32,
}

impl HeuristicExtractor {
    pub fn new(confidence: f32) -> Result<Self, ExtractionError> {
        Ok(Self {
            token: Regex::new(ENTITY_PATTERN)?,
            confidence,
        })
    }

    /// Read `text` without any model.
    pub fn analyze(&self, text: &str) -> Extraction {
        let lowered = text.trim().to_lowercase();
        let bare = lowered.trim_end_matches(|c: char| {
            c.is_ascii_punctuation() || matches!(c, '。' | '！' | '？' | '，' | '～')
        });
        let words: Vec<&str> = bare
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has_word = |set: &[&str]| words.iter().any(|w| set.contains(w));
        let has_phrase = |set: &[&str]| set.iter().any(|p| bare.contains(p));

        let is_rejection = has_phrase(NEGATIVE_PHRASES) || has_word(NEGATIVE_WORDS);
        let is_confirmation = !is_rejection
            && (AFFIRMATIVE_EXACT.contains(&bare)
                || has_phrase(AFFIRMATIVE_PHRASES)
                || has_word(AFFIRMATIVE_WORDS));

        Extraction {
            entities: self.entities(text),
            is_confirmation,
            is_rejection,
            refresh_requested: has_phrase(REFRESH_PHRASES) || has_word(REFRESH_WORDS),
            list_requested: has_phrase(LIST_PHRASES),
            confidence: self.confidence,
        }
    }

    /// Candidate entities in order of first mention, deduplicated.
    pub fn entities(&self, text: &str) -> Vec<String> {
        let lone = text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .count()
            == 1;
        let mut found: Vec<String> = Vec::new();
        for raw in self.token.find_iter(text).map(|m| m.as_str()) {
            if !looks_like_symbol(raw, lone) {
                continue;
            }
            let Some(entity) = normalize_entity(raw) else {
                continue;
            };
            if STOPLIST.contains(&entity.as_str()) || found.contains(&entity) {
                continue;
            }
            found.push(entity);
        }
        found
    }
}

fn looks_like_symbol(raw: &str, lone: bool) -> bool {
    let letters = raw.chars().filter(|c| c.is_ascii_alphabetic()).count();
    let upper = raw.chars().filter(|c| c.is_ascii_uppercase()).count();
    let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
    if upper >= 2 || (letters >= 2 && digits >= 1) {
        return true;
    }
    lone && (3..=8).contains(&letters) && letters == raw.chars().count() && !is_common_word(raw)
}

fn is_common_word(raw: &str) -> bool {
    let word = raw.to_ascii_lowercase();
    [COMMON_WORDS, AFFIRMATIVE_WORDS, NEGATIVE_WORDS, REFRESH_WORDS]
        .iter()
        .any(|set| set.contains(&word.as_str()))
}

#[async_trait]
impl ExtractionService for HeuristicExtractor {
    async fn extract(
        &self,
        text: &str,
        _history: &[HistoryEntry],
    ) -> Result<Extraction, ExtractionError> {
        Ok(self.analyze(text))
    }
}
