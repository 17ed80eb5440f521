//! Importance scorer: pure scoring of a conversational turn.
//!
//! [`score`] maps a turn's text and sender metadata to `(importance,
//! emotional_weight)` using a fixed, versioned [`WeightTable`]. There is no
//! hidden state: scoring the same turn twice yields the same pair.
//!
//! The same lexicons drive [`turn_deltas`], the small per-turn trait nudges,
//! and [`classify_topic`], which the consolidator uses to cluster turns.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::types::{NewTurn, SenderClass, TraitId, TurnScore};
use crate::config::EvolutionConfig;
use crate::error::{EvolveError, Result};

/// Weights used by [`score_with`]. Bump `version` whenever any weight changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightTable {
    pub version: u32,
    pub operator: f64,
    pub federated: f64,
    pub system: f64,
    pub question: f64,
    /// Bonus per length tier reached (8, 25, 60 words).
    pub length_step: f64,
    pub correction: f64,
    pub keyword: f64,
    pub emotional_hit: f64,
    pub emotional_cap: f64,
    /// Multiplier applied to importance for refusals and error messages.
    pub rejection_factor: f64,
    pub emotional_base: f64,
    pub exclamation: f64,
}

pub const WEIGHTS_V1: WeightTable = WeightTable {
    version: 1,
    operator: 0.6,
    federated: 0.4,
    system: 0.15,
    question: 0.1,
    length_step: 0.05,
    correction: 0.15,
    keyword: 0.2,
    emotional_hit: 0.15,
    emotional_cap: 0.6,
    rejection_factor: 0.5,
    emotional_base: 0.2,
    exclamation: 0.1,
};

const LENGTH_TIERS: [usize; 3] = [8, 25, 60];

const IMPORTANCE_KEYWORDS: &[&str] = &["important", "remember", "critical", "essential", "never forget"];

const CORRECTION_PHRASES: &[&str] = &[
    "too long", "too verbose", "be shorter", "be more concise", "stop rambling",
    "that's wrong", "thats wrong", "you're wrong", "youre wrong", "incorrect",
    "not what i meant", "not what i asked", "that's not right", "thats not right",
    "way off", "completely wrong", "you missed the point", "try again",
    "stop doing that", "don't do that", "dont do that",
    "you always", "you keep", "every time you",
    "too formal", "too casual", "too technical", "dumb it down",
    "not helpful", "useless", "that sucks",
];

const EMOTIONAL_WORDS: &[&str] = &[
    "feel", "feeling", "sad", "happy", "anxious", "worry", "worried", "love",
    "lonely", "excited", "frustrated", "hurt", "miss", "scared", "afraid", "angry",
];

/// Broad subject area of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicDomain {
    Programming,
    Philosophy,
    Science,
    Creative,
    Emotional,
    Practical,
}

impl TopicDomain {
    pub const ALL: [TopicDomain; 6] = [
        Self::Programming,
        Self::Philosophy,
        Self::Science,
        Self::Creative,
        Self::Emotional,
        Self::Practical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Programming => "programming",
            Self::Philosophy => "philosophy",
            Self::Science => "science",
            Self::Creative => "creative",
            Self::Emotional => "emotional",
            Self::Practical => "practical",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Programming => &[
                "code", "python", "rust", "javascript", "function", "bug", "error", "api",
                "database", "sql", "algorithm", "server", "compiler", "module", "programming",
            ],
            Self::Philosophy => &[
                "consciousness", "existence", "meaning", "identity", "free will", "reality",
                "perception", "ethics", "morality", "truth", "mind",
            ],
            Self::Science => &[
                "physics", "chemistry", "biology", "math", "theorem", "hypothesis",
                "experiment", "quantum", "evolution", "atom", "molecule",
            ],
            Self::Creative => &[
                "write", "story", "poem", "art", "music", "design", "creative", "imagine",
                "invent", "brainstorm", "draw", "compose",
            ],
            Self::Emotional => EMOTIONAL_WORDS,
            Self::Practical => &[
                "how to", "steps", "guide", "tutorial", "help me", "fix", "set up",
                "install", "configure", "build",
            ],
        }
    }
}

impl std::fmt::Display for TopicDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased text plus its word tokens, for whole-word and phrase matching.
struct Lexed {
    lower: String,
    tokens: HashSet<String>,
    word_count: usize,
}

impl Lexed {
    fn new(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty())
            .collect();
        Self {
            word_count: words.len(),
            tokens: words.iter().map(|w| w.to_string()).collect(),
            lower,
        }
    }

    /// Single words match whole tokens; phrases match as substrings.
    fn has(&self, term: &str) -> bool {
        if term.chars().all(|c| c.is_alphanumeric() || c == '\'') {
            self.tokens.contains(term)
        } else {
            self.lower.contains(term)
        }
    }

    fn has_any(&self, terms: &[&str]) -> bool {
        terms.iter().any(|t| self.has(t))
    }

    fn count(&self, terms: &[&str]) -> usize {
        terms.iter().filter(|t| self.has(t)).count()
    }
}

/// Score a turn with the current weight table.
pub fn score(turn: &NewTurn) -> Result<TurnScore> {
    score_with(turn, &WEIGHTS_V1)
}

/// Score a turn against an explicit weight table.
///
/// Fails only for turns with no text; callers on the ingest path use
/// [`score_or_neutral`] so a scoring failure never rejects a turn.
pub fn score_with(turn: &NewTurn, table: &WeightTable) -> Result<TurnScore> {
    if turn.content.trim().is_empty() {
        return Err(EvolveError::EmptyTurn);
    }
    let lex = Lexed::new(&turn.content);

    let mut importance = match turn.sender_class {
        SenderClass::Operator => table.operator,
        SenderClass::Federated => table.federated,
        SenderClass::System => table.system,
    };
    if turn.content.contains('?') {
        importance += table.question;
    }
    let tiers = LENGTH_TIERS.iter().filter(|&&n| lex.word_count >= n).count();
    importance += table.length_step * tiers as f64;

    let corrected = detect_correction_in(&lex).is_some();
    if corrected {
        importance += table.correction;
    }
    if lex.has_any(IMPORTANCE_KEYWORDS) {
        importance += table.keyword;
    }

    let emotional_hits = lex.count(EMOTIONAL_WORDS);
    let emotional_bonus = (table.emotional_hit * emotional_hits as f64).min(table.emotional_cap);
    importance += emotional_bonus / 3.0;

    if turn.is_rejection {
        importance *= table.rejection_factor;
    }

    let mut emotional_weight = table.emotional_base + emotional_bonus;
    if turn.content.contains('!') {
        emotional_weight += table.exclamation;
    }
    if corrected {
        emotional_weight += table.correction;
    }
    if turn.sender_class == SenderClass::System {
        emotional_weight *= 0.5;
    }

    Ok(TurnScore {
        importance: importance.clamp(0.0, 1.0),
        emotional_weight: emotional_weight.clamp(0.0, 1.0),
    })
}

/// [`score`], degrading to [`TurnScore::NEUTRAL`] on failure.
pub fn score_or_neutral(turn: &NewTurn) -> TurnScore {
    score(turn).unwrap_or_else(|e| {
        tracing::warn!(error = %e, sender = %turn.sender, "turn scoring failed, using neutral score");
        TurnScore::NEUTRAL
    })
}

/// Returns the first correction phrase found in `text`, if any.
pub fn detect_correction(text: &str) -> Option<&'static str> {
    detect_correction_in(&Lexed::new(text))
}

fn detect_correction_in(lex: &Lexed) -> Option<&'static str> {
    CORRECTION_PHRASES.iter().copied().find(|p| lex.has(p))
}

/// The topic domain with the most keyword hits, or `None` if nothing matches.
/// Ties go to the domain listed first in [`TopicDomain::ALL`].
pub fn classify_topic(text: &str) -> Option<TopicDomain> {
    let lex = Lexed::new(text);
    let mut best: Option<(TopicDomain, usize)> = None;
    for domain in TopicDomain::ALL {
        let hits = lex.count(domain.keywords());
        if hits > 0 && best.map_or(true, |(_, h)| hits > h) {
            best = Some((domain, hits));
        }
    }
    best.map(|(d, _)| d)
}

/// Whether the text contains a correction or complaint.
pub fn is_correction(text: &str) -> bool {
    detect_correction(text).is_some()
}

/// Whether the text praises the previous answer.
pub fn is_praise(text: &str) -> bool {
    Lexed::new(text).has_any(PRAISE)
}

// ── Per-turn trait nudges ────────────────────────────────────────────────────

/// A single live adjustment derived from one turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TraitNudge {
    /// Additive change, clamped by the trait store.
    Shift { trait_id: TraitId, delta: f64 },
    /// Move toward the configured baseline by at most `amount`.
    Decay { trait_id: TraitId, amount: f64 },
}

/// Explicit instructions only the operator can give. (trait, lowering phrases, raising phrases)
const EXPLICIT: &[(TraitId, &[&str], &[&str])] = &[
    (
        TraitId::Formality,
        &["less formal", "more casual", "dont be so formal", "be casual", "be relaxed"],
        &["more formal", "be professional", "be polite", "formal please"],
    ),
    (
        TraitId::TechnicalDepth,
        &["less technical", "simpler", "dumb it down", "plain english", "less jargon", "non-technical"],
        &["more technical", "go deeper", "technical detail", "be specific"],
    ),
    (
        TraitId::Verbosity,
        &["shorter", "be brief", "less words", "concise", "stop rambling", "too long"],
        &["more detail", "elaborate", "explain more", "tell me more", "expand on"],
    ),
    (
        TraitId::Humor,
        &["less funny", "stop joking", "be serious", "no jokes", "more serious"],
        &["be funny", "more humor", "joke around", "lighten up", "be playful"],
    ),
    (
        TraitId::Empathy,
        &["less emotional", "skip the feelings", "just answer"],
        &["more empathy", "be understanding", "be kind", "be gentle", "be supportive"],
    ),
    (
        TraitId::Curiosity,
        &["stop asking questions", "no questions"],
        &["ask me questions", "be curious"],
    ),
    (
        TraitId::Assertiveness,
        &["less assertive", "be humble", "tone it down", "less confident"],
        &["be confident", "be assertive", "be direct", "be bolder"],
    ),
    (
        TraitId::Creativity,
        &["less creative", "be straightforward", "no metaphors"],
        &["be creative", "use metaphors", "think outside", "imaginative"],
    ),
];

const TECHNICAL: &[&str] = &[
    "code", "algorithm", "database", "system", "technical", "function", "error", "bug",
    "api", "server", "programming", "compiler", "memory",
];
const ELABORATE: &[&str] = &["explain", "detail", "elaborate", "describe", "why", "how does"];
const HUMOR: &[&str] = &["haha", "lol", "funny", "joke", "lmao", "hilarious"];
const WONDER: &[&str] = &["wonder", "imagine", "what if", "curious", "interesting", "fascinating", "explore"];
const PRAISE: &[&str] = &[
    "great", "perfect", "exactly", "correct", "brilliant", "good job", "thank you", "amazing", "love it",
];
const CREATIVE: &[&str] = &[
    "write", "create", "story", "poem", "imagine", "design", "idea", "invent", "brainstorm", "creative",
];

/// Derive the live trait nudges for a turn.
///
/// Explicit operator instructions move a trait by three times the configured
/// speed. Passive keyword triggers move it by `speed * (0.4 + importance)`.
/// Triggerable traits with no signal decay toward the baseline. System turns
/// never nudge traits, and federated turns cannot issue explicit instructions.
pub fn turn_deltas(turn: &NewTurn, score: TurnScore, config: &EvolutionConfig) -> Vec<TraitNudge> {
    if turn.sender_class == SenderClass::System || turn.is_rejection {
        return Vec::new();
    }
    let lex = Lexed::new(&turn.content);
    let speed = config.speed;
    let triggered = speed * (0.4 + score.importance);
    let decay = speed * config.decay_ratio;

    let mut nudges: Vec<TraitNudge> = Vec::new();
    let mut explicit: HashSet<TraitId> = HashSet::new();

    if turn.sender_class == SenderClass::Operator {
        for (trait_id, down, up) in EXPLICIT {
            let delta = if lex.has_any(up) {
                speed * 3.0
            } else if lex.has_any(down) {
                -speed * 3.0
            } else {
                continue;
            };
            explicit.insert(*trait_id);
            nudges.push(TraitNudge::Shift { trait_id: *trait_id, delta });
        }
    }

    let mut passive = |trait_id: TraitId, nudge: Option<TraitNudge>| {
        if !explicit.contains(&trait_id) {
            if let Some(n) = nudge {
                nudges.push(n);
            }
        }
    };
    let shift = |trait_id, delta| Some(TraitNudge::Shift { trait_id, delta });
    let fade = |trait_id, amount| Some(TraitNudge::Decay { trait_id, amount });

    passive(
        TraitId::TechnicalDepth,
        if lex.has_any(TECHNICAL) {
            shift(TraitId::TechnicalDepth, triggered)
        } else {
            fade(TraitId::TechnicalDepth, decay)
        },
    );
    passive(
        TraitId::Verbosity,
        if lex.has_any(ELABORATE) {
            shift(TraitId::Verbosity, triggered)
        } else if lex.word_count < 4 {
            shift(TraitId::Verbosity, -speed)
        } else {
            fade(TraitId::Verbosity, decay * 0.5)
        },
    );
    passive(
        TraitId::Humor,
        if lex.has_any(HUMOR) {
            shift(TraitId::Humor, triggered)
        } else {
            fade(TraitId::Humor, decay)
        },
    );
    passive(
        TraitId::Empathy,
        if lex.has_any(EMOTIONAL_WORDS) {
            shift(TraitId::Empathy, triggered)
        } else {
            fade(TraitId::Empathy, decay * 0.5)
        },
    );
    passive(
        TraitId::Curiosity,
        if lex.has_any(WONDER) || turn.content.matches('?').count() >= 2 {
            shift(TraitId::Curiosity, triggered)
        } else {
            fade(TraitId::Curiosity, decay)
        },
    );
    passive(
        TraitId::Assertiveness,
        if lex.has_any(PRAISE) {
            shift(TraitId::Assertiveness, triggered * 0.5)
        } else if detect_correction_in(&lex).is_some() {
            shift(TraitId::Assertiveness, -speed)
        } else {
            None
        },
    );
    passive(
        TraitId::Creativity,
        if lex.has_any(CREATIVE) {
            shift(TraitId::Creativity, triggered)
        } else {
            fade(TraitId::Creativity, decay)
        },
    );

    nudges
}
