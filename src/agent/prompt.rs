//! System prompts and template builders for agents.
//!
//! Prompts define each agent's behavior. Template builders format the user
//! message with conversation context. Wording is deliberately plain; any
//! prompt can be overridden by dropping a file into the prompt directory.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::core::{FilterSnapshot, PreferenceSnapshot, RankedItem, StateSummary};

/// System prompt for the request classifier.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You route messages for a shopping assistant. Decide which behaviors the latest shopper message needs. Several may apply at once.

- needs_interview: the shopper is still figuring out what they want and a guided question would help.
- needs_search: the shopper asked to see items, or changed what they are looking for.
- needs_analytical: the shopper asked a factual or comparative question about specific items.
- analytical_questions: the concrete questions to answer, rewritten to stand alone. Empty when none.
- has_filter_update: the message adds, changes or removes a search criterion (budget, body style, year, ...).
- is_general_conversation: greetings, thanks, or chat unrelated to shopping.

The state summary tells you whether results have been shown and whether the interview has finished.

Return ONLY a JSON object:
{"needs_interview": bool, "needs_search": bool, "needs_analytical": bool, "analytical_questions": [string], "has_filter_update": bool, "is_general_conversation": bool, "reasoning": string}"#;

/// System prompt for the filter extractor.
pub const EXTRACTOR_SYSTEM_PROMPT: &str = r#"You maintain the search criteria for a shopping conversation. Read the WHOLE transcript and return the complete, current set of criteria. Later messages override earlier ones; criteria the shopper retracted must be absent.

For each filter give a certainty:
- "must_have": the shopper insisted on it (only, must, need, non-negotiable).
- "explicit": the shopper stated it plainly.
- "inferred": you deduced it from context.

Use only the fields listed in the schema. For categorical fields prefer the listed values. Numeric bounds are numbers.

Preferences are softer signals: liked features, disliked features, and short free-text notes.

Set has_new_filters to false when the latest message does not change criteria or preferences.

Return ONLY a JSON object:
{"has_new_filters": bool, "filters": {"<field>": {"value": <value>, "certainty": "must_have" | "explicit" | "inferred"}}, "preferences": {"liked": [string], "disliked": [string], "notes": [string]}}"#;

/// System prompt for the categorical value corrector.
pub const VALIDATOR_SYSTEM_PROMPT: &str = r#"You correct catalog filter values. For each entry, pick the allowed value that means the same thing as the given value. If none does, answer null. Never invent a value that is not in the allowed list.

Return ONLY a JSON object mapping each field to its corrected value or null:
{"<field>": "<allowed value>" | null}"#;

/// System prompt for the guided interviewer.
pub const INTERVIEWER_SYSTEM_PROMPT: &str = r#"You are a friendly shopping advisor running a short interview to learn what the shopper needs. Ask exactly ONE question per turn about a topic that has not been covered yet (budget, body style, usage, passengers, fuel, must-have features, ...). Keep it to one or two sentences.

Offer 2 to 4 short answer options when the question has natural choices; otherwise return an empty list.

Set done to true when you know enough to search. Never ask about a covered topic.

Return ONLY a JSON object:
{"text": string, "short_answer_options": [string], "topic": string, "done": bool}"#;

/// System prompt for the discovery narrator.
pub const NARRATOR_SYSTEM_PROMPT: &str = r#"You present search results to a shopper. In a short, natural reply:
1. Acknowledge their most recent preference.
2. Highlight the best match and why it fits.
3. Mention a few alternatives briefly.
4. Ask one or two new questions that would narrow things down, avoiding covered topics.

Do not invent facts that are not in the item data. Keep any disclosure sentence you are given.

Return ONLY a JSON object:
{"text": string, "followup_options": [string], "topics": [string]}"#;

/// System prompt for the analytical agent.
pub const ANALYST_SYSTEM_PROMPT: &str = r"You answer factual and comparative questions about items a shopper is considering. Use the tools to look things up; never guess specifications or prices.

- get_shown_item resolves references like 'the second one' against the results the shopper has seen.
- keyword_search and get_item_details read the catalog.
- web_search is a last resort for reliability, reviews or recalls.

When comparing 2 to 4 items, include a markdown table with one column per item and one row per attribute. Keep prose concise. If you cannot find the answer, say so plainly.";

/// System prompt for the answer verifier.
pub const VERIFIER_SYSTEM_PROMPT: &str = r#"You check whether an answer is supported by the evidence the answering agent looked up. Judge only support, not style.

Return ONLY a JSON object:
{"supported": bool, "confidence": number between 0 and 1}"#;

/// System prompt for the general conversation agent.
pub const GENERAL_SYSTEM_PROMPT: &str = r"You are the friendly voice of a shopping assistant. Reply briefly and warmly to greetings, thanks and small talk. When it fits, invite the shopper to tell you what they are looking for. Do not make up item details.";

/// System prompt for the response synthesizer.
pub const SYNTHESIZER_SYSTEM_PROMPT: &str = r"You merge several partial replies from specialist assistants into ONE reply to the shopper. Each part is tagged with how to use it:
- ANSWER FIRST: lead with this answer.
- PRESENT ITEMS: weave the items in naturally.
- ASK LAST: end with this question, word for word.
- MENTION BRIEFLY: one short clause at most.

Stay under the word budget. Do not add facts that are not in the parts. Do not reproduce tables; the interface shows them separately. Reply with plain text only.";

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/shop-assist/prompts";

const CLASSIFIER_FILENAME: &str = "classifier.md";
const EXTRACTOR_FILENAME: &str = "extractor.md";
const VALIDATOR_FILENAME: &str = "validator.md";
const INTERVIEWER_FILENAME: &str = "interviewer.md";
const NARRATOR_FILENAME: &str = "narrator.md";
const ANALYST_FILENAME: &str = "analyst.md";
const VERIFIER_FILENAME: &str = "verifier.md";
const GENERAL_FILENAME: &str = "general.md";
const SYNTHESIZER_FILENAME: &str = "synthesizer.md";

/// A set of system prompts for all agents.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Request classifier.
    pub classifier: String,
    /// Filter extractor (also used for terminal extraction).
    pub extractor: String,
    /// Categorical value corrector.
    pub validator: String,
    /// Guided interviewer.
    pub interviewer: String,
    /// Discovery narrator.
    pub narrator: String,
    /// Analytical agent.
    pub analyst: String,
    /// Answer verifier.
    pub verifier: String,
    /// General conversation agent.
    pub general: String,
    /// Response synthesizer.
    pub synthesizer: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from `--prompt-dir` CLI flag)
    /// 2. `SHOP_PROMPT_DIR` environment variable
    /// 3. `~/.config/shop-assist/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("SHOP_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            classifier: load_file(CLASSIFIER_FILENAME, CLASSIFIER_SYSTEM_PROMPT),
            extractor: load_file(EXTRACTOR_FILENAME, EXTRACTOR_SYSTEM_PROMPT),
            validator: load_file(VALIDATOR_FILENAME, VALIDATOR_SYSTEM_PROMPT),
            interviewer: load_file(INTERVIEWER_FILENAME, INTERVIEWER_SYSTEM_PROMPT),
            narrator: load_file(NARRATOR_FILENAME, NARRATOR_SYSTEM_PROMPT),
            analyst: load_file(ANALYST_FILENAME, ANALYST_SYSTEM_PROMPT),
            verifier: load_file(VERIFIER_FILENAME, VERIFIER_SYSTEM_PROMPT),
            general: load_file(GENERAL_FILENAME, GENERAL_SYSTEM_PROMPT),
            synthesizer: load_file(SYNTHESIZER_FILENAME, SYNTHESIZER_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            classifier: CLASSIFIER_SYSTEM_PROMPT.to_string(),
            extractor: EXTRACTOR_SYSTEM_PROMPT.to_string(),
            validator: VALIDATOR_SYSTEM_PROMPT.to_string(),
            interviewer: INTERVIEWER_SYSTEM_PROMPT.to_string(),
            narrator: NARRATOR_SYSTEM_PROMPT.to_string(),
            analyst: ANALYST_SYSTEM_PROMPT.to_string(),
            verifier: VERIFIER_SYSTEM_PROMPT.to_string(),
            general: GENERAL_SYSTEM_PROMPT.to_string(),
            synthesizer: SYNTHESIZER_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten; use this for initial scaffolding only.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (CLASSIFIER_FILENAME, CLASSIFIER_SYSTEM_PROMPT),
            (EXTRACTOR_FILENAME, EXTRACTOR_SYSTEM_PROMPT),
            (VALIDATOR_FILENAME, VALIDATOR_SYSTEM_PROMPT),
            (INTERVIEWER_FILENAME, INTERVIEWER_SYSTEM_PROMPT),
            (NARRATOR_FILENAME, NARRATOR_SYSTEM_PROMPT),
            (ANALYST_FILENAME, ANALYST_SYSTEM_PROMPT),
            (VERIFIER_FILENAME, VERIFIER_SYSTEM_PROMPT),
            (GENERAL_FILENAME, GENERAL_SYSTEM_PROMPT),
            (SYNTHESIZER_FILENAME, SYNTHESIZER_SYSTEM_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Builds the classifier input: the message and the state summary only.
#[must_use]
pub fn build_classifier_prompt(message: &str, summary: &StateSummary) -> String {
    format!(
        "<state>{}</state>\n\n<message>{}</message>",
        summary.canonical(),
        message.trim()
    )
}

/// Builds the extractor input from the full transcript and field schema.
#[must_use]
pub fn build_extractor_prompt(transcript: &str, schema_description: &str) -> String {
    format!(
        "<schema>\n{schema_description}\n</schema>\n\n\
         <transcript>\n{transcript}\n</transcript>"
    )
}

/// A categorical value that did not match its allow-list.
pub struct Correction<'a> {
    /// Field name.
    pub field: &'a str,
    /// Value the extractor produced.
    pub value: &'a str,
    /// Allowed values for the field.
    pub allowed: &'a [String],
}

/// Builds one batched correction request for all non-matching values.
#[must_use]
pub fn build_validator_prompt(corrections: &[Correction<'_>]) -> String {
    let mut prompt = String::from("<values>\n");
    for c in corrections {
        let _ = writeln!(
            prompt,
            "- field: {}; given: {:?}; allowed: [{}]",
            c.field,
            c.value,
            c.allowed.join(", ")
        );
    }
    prompt.push_str("</values>");
    prompt
}

/// Builds the interviewer input.
#[must_use]
pub fn build_interview_prompt<'a>(
    transcript: &str,
    covered: impl IntoIterator<Item = &'a String>,
    turn: u32,
    max_turns: u32,
) -> String {
    let covered: Vec<&str> = covered.into_iter().map(String::as_str).collect();
    let covered = if covered.is_empty() {
        "none".to_string()
    } else {
        covered.join(", ")
    };
    format!(
        "<covered_topics>{covered}</covered_topics>\n\
         <question_number>{turn} of at most {max_turns}</question_number>\n\n\
         <transcript>\n{transcript}\n</transcript>"
    )
}

/// Compact item line used in narrator and analyst prompts.
fn item_line(out: &mut String, position: usize, item: &RankedItem) {
    let _ = write!(out, "{position}. [{}] {}", item.id, item.headline());
    if let Some(rating) = item.rating {
        let _ = write!(out, " | rating {rating:.1}");
    }
    for (key, value) in &item.attributes {
        let _ = write!(out, " | {key}: {value}");
    }
    out.push('\n');
}

/// Inputs for the discovery narrator.
pub struct NarrationContext<'a> {
    /// Recent transcript.
    pub transcript: &'a str,
    /// Items to present, best first.
    pub items: &'a [RankedItem],
    /// Total results before truncation to `items`.
    pub total: usize,
    /// Filters actually used for retrieval.
    pub filters: &'a FilterSnapshot,
    /// Shopper preferences.
    pub preferences: &'a PreferenceSnapshot,
    /// Topics already asked about.
    pub covered: &'a [String],
    /// Locally generated disclosure the reply must keep.
    pub disclosure: Option<&'a str>,
}

/// Builds the narrator input.
#[must_use]
pub fn build_narrator_prompt(ctx: &NarrationContext<'_>) -> String {
    let mut prompt = format!(
        "<filters>{}</filters>\n<latest_preference>{}</latest_preference>\n\
         <covered_topics>{}</covered_topics>\n",
        ctx.filters.describe(),
        ctx.preferences.latest().unwrap_or("none"),
        if ctx.covered.is_empty() {
            "none".to_string()
        } else {
            ctx.covered.join(", ")
        }
    );
    if let Some(disclosure) = ctx.disclosure {
        let _ = writeln!(prompt, "<disclosure>{disclosure}</disclosure>");
    }
    let _ = writeln!(
        prompt,
        "<items shown=\"{}\" total=\"{}\">",
        ctx.items.len(),
        ctx.total
    );
    for (i, item) in ctx.items.iter().enumerate() {
        item_line(&mut prompt, i + 1, item);
    }
    let _ = write!(
        prompt,
        "</items>\n\n<transcript>\n{}\n</transcript>",
        ctx.transcript
    );
    prompt
}

/// Builds the analyst input.
#[must_use]
pub fn build_analyst_prompt(transcript: &str, questions: &[String], shown: &[RankedItem]) -> String {
    let mut prompt = String::from("<questions>\n");
    for q in questions {
        let _ = writeln!(prompt, "- {q}");
    }
    let _ = writeln!(prompt, "</questions>\n<shown_items count=\"{}\">", shown.len());
    for (i, item) in shown.iter().enumerate() {
        let _ = writeln!(prompt, "{}. [{}] {}", i + 1, item.id, item.headline());
    }
    let _ = write!(
        prompt,
        "</shown_items>\n\n<transcript>\n{transcript}\n</transcript>"
    );
    prompt
}

/// Builds the verifier input.
#[must_use]
pub fn build_verifier_prompt(questions: &[String], answer: &str, evidence: &[String]) -> String {
    let mut prompt = format!("<questions>{}</questions>\n\n<evidence>\n", questions.join(" | "));
    if evidence.is_empty() {
        prompt.push_str("(no lookups were made)\n");
    }
    for e in evidence {
        let _ = writeln!(prompt, "- {e}");
    }
    let _ = write!(prompt, "</evidence>\n\n<answer>\n{answer}\n</answer>");
    prompt
}

/// Builds the synthesizer input from role-tagged parts.
#[must_use]
pub fn build_synthesizer_prompt(message: &str, parts: &[(&str, &str)], word_budget: usize) -> String {
    let mut prompt = format!(
        "<word_budget>{word_budget}</word_budget>\n<shopper_message>{message}</shopper_message>\n\n"
    );
    for (tag, text) in parts {
        let _ = write!(prompt, "<part role=\"{tag}\">\n{text}\n</part>\n");
    }
    prompt
}
