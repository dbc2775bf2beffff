use std::sync::Arc;
use tracing::{error, warn};

use crate::clients::Tutor;
use crate::models::{AiMode, Checkpoint, TutorRequest};

pub const UNAVAILABLE_REPLY: &str = "Sorry, the AI tutor is temporarily unavailable. Please try again later.";
pub const EMPTY_REPLY: &str = "Sorry, I couldn't generate a helpful response right now.";

const BASE_INSTRUCTIONS: &str = "You are an expert programming tutor working inside a collaborative learning room.
Your goal is to help learners understand concepts by guiding them, not by handing out full solutions.
Always stay within the scope of the current checkpoint description.
Keep your responses concise, encouraging and focused on learning.";

const VERDICT_INSTRUCTIONS: &str = "After your feedback, write one final line that is exactly `VERDICT: ACCEPT` \
when the explanation is correct and complete enough to move on, or exactly `VERDICT: REJECT` otherwise.";

fn mode_instructions(mode: Option<AiMode>) -> &'static str {
    match mode {
        Some(AiMode::Socratic) => {
            "Mode: Socratic.
Ask short, leading questions that nudge the learners to think.
Do NOT write code for them and do NOT reveal the final answer.
Prefer questions over explanations."
        }
        Some(AiMode::Hint) => {
            "Mode: Hint.
Give partial guidance, patterns to look for, or small corrections.
Tiny code fragments are fine when unavoidable; never paste complete working code."
        }
        Some(AiMode::Review) => {
            "Mode: Review.
You are reviewing a plain-English explanation written by a learner.
Evaluate clarity and correctness and point out gaps or misconceptions kindly.
Do NOT rewrite the explanation for them; suggest specific improvements instead."
        }
        Some(AiMode::Summarizer) => {
            "Mode: Summarizer.
Summarize what the learners did and discussed in this checkpoint in simple language.
Highlight key takeaways and any remaining open questions.
Do NOT introduce new advanced topics."
        }
        None => {
            "Mode: Default tutor.
Give hints and explanations, but avoid full solutions unless the learner explicitly asks and seems very stuck."
        }
    }
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

/// Full prompt for one tutor call.
pub fn build_prompt(req: &TutorRequest) -> String {
    let checkpoint_context = match req.checkpoint_title.as_deref() {
        Some(title) if !title.is_empty() => format!(
            "Current checkpoint:\nTitle: {}\nType: {}\nDescription:\n{}\n",
            title,
            req.checkpoint_type.as_deref().unwrap_or("unknown"),
            req.checkpoint_description
                .as_deref()
                .filter(|d| !d.is_empty())
                .unwrap_or("No detailed description provided."),
        ),
        _ => String::new(),
    };

    let mut prompt = format!(
        "{base}\n\n{mode}\n\nHere is my current situation:\nLanguage: {lang}\nCode:\n```{lang}\n{code}\n```\n\
         Input given to the code:\n```\n{input}\n```\nOutput from the code:\n```\n{output}\n```\n{context}\n\
         My question is: {query}\n",
        base = BASE_INSTRUCTIONS,
        mode = mode_instructions(req.ai_mode),
        lang = req.language,
        code = req.code,
        input = or_placeholder(&req.input, "No input provided."),
        output = or_placeholder(&req.output, "No output yet."),
        context = checkpoint_context,
        query = req.user_query,
    );

    if req.ai_mode == Some(AiMode::Review) {
        prompt.push('\n');
        prompt.push_str(VERDICT_INSTRUCTIONS);
        prompt.push('\n');
    }
    prompt
}

/// True only when the last non-empty line is an accept verdict.
pub fn parse_verdict(reply: &str) -> bool {
    let Some(last) = reply.lines().map(str::trim).rfind(|l| !l.is_empty()) else {
        return false;
    };
    let last = last.trim_matches(|c: char| c == '*' || c == '`' || c == '.').trim();
    let Some((label, verdict)) = last.split_once(':') else {
        return false;
    };
    label.trim().eq_ignore_ascii_case("verdict") && verdict.trim().eq_ignore_ascii_case("accept")
}

/// Best-effort tutoring: every failure becomes a fallback reply.
pub struct TutorService {
    tutor: Arc<dyn Tutor>,
}

impl TutorService {
    pub fn new(tutor: Arc<dyn Tutor>) -> Self {
        Self { tutor }
    }

    pub async fn ask(&self, req: &TutorRequest) -> String {
        let prompt = build_prompt(req);
        match self.tutor.complete(&prompt).await {
            Ok(reply) if reply.trim().is_empty() => {
                warn!("Tutor returned an empty reply");
                EMPTY_REPLY.to_string()
            }
            Ok(reply) => reply,
            Err(e) => {
                error!("Tutor call failed: {}", e);
                UNAVAILABLE_REPLY.to_string()
            }
        }
    }

    /// Review a learner's explanation of an explain-to-unlock checkpoint.
    /// Returns the verdict and the tutor's feedback text.
    pub async fn review_explanation(&self, language: &str, checkpoint: &Checkpoint, explanation: &str) -> (bool, String) {
        let req = TutorRequest {
            user_query: format!("Here is my explanation, is it good enough to move on?\n{}", explanation),
            language: language.to_string(),
            code: checkpoint.starter_code.clone().unwrap_or_default(),
            input: String::new(),
            output: checkpoint.expected_output.clone().unwrap_or_default(),
            checkpoint_type: Some(checkpoint.checkpoint_type.as_str().to_string()),
            checkpoint_title: Some(checkpoint.title.clone()),
            checkpoint_description: Some(checkpoint.description.clone()),
            ai_mode: Some(AiMode::Review),
        };
        let feedback = self.ask(&req).await;
        (parse_verdict(&feedback), feedback)
    }
}
