//! Affirmative-intent classification for chat replies.
//!
//! Decides whether a free-text user reply confirms the bot's offer to generate
//! the footprint report. Two lexicons drive the decision:
//!
//! 1. **Offer detection** - the last [`OFFER_WINDOW`] bot utterances are
//!    lowercased and checked against [`OFFER_PATTERNS`]. Each pattern is a set of
//!    substrings that must all appear in the same utterance.
//! 2. **Affirmation detection** - only consulted while an offer is live. The
//!    lowercased, trimmed reply matches when it equals, contains, or starts with
//!    any entry of [`AFFIRMATIONS`].
//!
//! Matching is plain substring containment. There is no tokenization, stemming,
//! accent folding, or punctuation stripping, so `"nook"` counts as `"ok"`.
//!
//! # Example
//!
//! ```
//! use pegada_chat::intent::should_generate_report;
//!
//! let bot = ["Perfeito! Podemos gerar seu relatório?"];
//! assert!(should_generate_report("sim", &bot));
//! assert!(!should_generate_report("não, obrigado", &bot));
//! ```

/// Number of trailing bot utterances consulted for offer detection.
pub const OFFER_WINDOW: usize = 3;

/// Offer-detection patterns. A pattern matches when every fragment in it is a
/// substring of the lowercased bot utterance.
pub const OFFER_PATTERNS: &[&[&str]] = &[
    &["gerar", "relatório"],
    &["quer que eu gere"],
    &["podemos gerar"],
    &["vamos gerar"],
    &["posso gerar"],
    &["criar o relatório"],
];

/// Short replies read as agreement.
pub const AFFIRMATIONS: &[&str] = &[
    "sim",
    "s",
    "yes",
    "y",
    "quero",
    "queria",
    "gostaria",
    "pode",
    "por favor",
    "pfv",
    "gera",
    "gerar",
    "cria",
    "criar",
    "ok",
    "beleza",
    "tá",
    "ta",
    "dale",
    "bora",
    "vamos",
];

/// Phrase in a bot reply after which the front-end offers an explicit
/// "generate report" action.
pub const REPORT_BUTTON_CUE: &str = "gerar seu relatório?";

/// Decide whether `user_message` confirms a report offer made in
/// `recent_bot_messages` (chronological order).
///
/// Only the last [`OFFER_WINDOW`] entries are consulted. The user message is not
/// inspected at all when no offer is live.
pub fn should_generate_report<S: AsRef<str>>(user_message: &str, recent_bot_messages: &[S]) -> bool {
    if !offer_is_live(recent_bot_messages) {
        return false;
    }
    is_affirmation(user_message)
}

/// True when any utterance in the trailing window offers to generate the report.
pub fn offer_is_live<S: AsRef<str>>(recent_bot_messages: &[S]) -> bool {
    let start = recent_bot_messages.len().saturating_sub(OFFER_WINDOW);
    recent_bot_messages[start..]
        .iter()
        .any(|msg| offers_report(msg.as_ref()))
}

/// True when the reply matches any affirmation by equality, containment, or prefix.
pub fn is_affirmation(user_message: &str) -> bool {
    let normalized = user_message.trim().to_lowercase();
    AFFIRMATIONS.iter().any(|&word| {
        normalized == word || normalized.contains(word) || normalized.starts_with(word)
    })
}

/// True when a bot reply contains the explicit report question, matched
/// case-sensitively as the chat page does.
pub fn prompts_report_button(bot_message: &str) -> bool {
    bot_message.contains(REPORT_BUTTON_CUE)
}

fn offers_report(bot_message: &str) -> bool {
    let lowered = bot_message.to_lowercase();
    OFFER_PATTERNS
        .iter()
        .any(|fragments| fragments.iter().all(|f| lowered.contains(f)))
}
