//! Cleanup of raw model output.
//!
//! Models wrap the text we asked for in chatter: echoed prompts, reasoning
//! blocks, role markers, code fences, "Here is the chapter:" preambles and
//! "Let me know if..." sign-offs. [`ContentNormalizer::normalize`] removes all
//! of it. Every rule only deletes text, and the rules are re-applied until
//! nothing changes, so normalizing twice gives the same result as once.

use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(think|thinking|reasoning)>.*?</(think|thinking|reasoning)>")
        .expect("valid think regex")
});

static DANGLING_THINK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^.*?</(think|thinking|reasoning)>").expect("valid think-end regex")
});

static CHAT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<\|(?:assistant|user|system|im_start|im_end|end|eot_id|start_header_id|end_header_id)\|>|\[/?INST\]",
    )
    .expect("valid chat-token regex")
});

static ROLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:#{1,6}\s*)?(?:assistant|response|answer|output|model)\s*:?$")
        .expect("valid role-line regex")
});

static ROLE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\*\*)?(?:assistant|ai|model)(?:\*\*)?\s*:\s*")
        .expect("valid role-prefix regex")
});

static LEAD_PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:here(?:'s| is| are)|below (?:is|are)|the following is|i(?:'ve| have) (?:written|rewritten|revised|expanded|created|generated))\b",
    )
    .expect("valid preamble regex")
});

// A whole line announcing the output, e.g. "Here is the revised chapter."
static LEAD_ANNOUNCEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:here(?:'s| is| are)|below (?:is|are)|the following is|i(?:'ve| have) (?:written|rewritten|revised|expanded|created|generated))\s+(?:(?:the|a|an|your|my)\s+)?(?:(?:revised|rewritten|expanded|updated|improved|edited|new|final|full|complete|requested)\s+)*(?:chapter|version|text|rewrite|draft|story|response|expansion|revision|content|continuation|report|analysis)(?:\s+(?:\d+|[ivx]+))?(?:\s+(?:as requested|for you|below))?\s*[.!:]?$",
    )
    .expect("valid announcement regex")
});

static LEAD_ACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:sure|certainly|of course|absolutely|okay|ok|great|alright)\b[!.,:]*\s*")
        .expect("valid acknowledgement regex")
});

// Sign-offs addressed to the requester. Notes need the "Note:" label so a
// closing line such as "Note the way she smiled." survives.
static TRAIL_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\*{0,2}\(?(?:author'?s?\s+|editor'?s?\s+)?note\*{0,2}\s*:|please note that (?:i|this|the (?:chapter|rewrite|revision|text))\b|i hope (?:this|the (?:chapter|rewrite|revision|changes|text)) (?:helps|meets|works|fits|is)\b|hope this helps|let me know if|feel free to (?:ask|let me know|request)|if you(?:'d| would) like (?:me to|any|further)|would you like me to|word count\s*:|this (?:version|rewrite|revision|chapter|text) (?:has been|was|is now|now))",
    )
    .expect("valid trailing-meta regex")
});

// Markdown heading or a line that is entirely bold/underlined.
static HEADING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:#{1,6}\s+\S.*|\*\*[^*].*\*\*|__[^_].*__)$").expect("valid heading regex")
});

static RULE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:-{3,}|\*{3,}|_{3,})$").expect("valid rule regex"));

/// Longest heading line considered when deduplicating titles.
const MAX_HEADING_CHARS: usize = 120;

/// Longest line considered as leading meta-commentary.
const MAX_META_LINE_CHARS: usize = 200;

/// Stateless cleaner for generated text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentNormalizer;

impl ContentNormalizer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Clean `raw`, removing an echo of `prompt` when given.
    ///
    /// Idempotent: `normalize(normalize(x)) == normalize(x)`.
    #[must_use]
    pub fn normalize(&self, raw: &str, prompt: Option<&str>) -> String {
        let prompt = prompt.map(str::trim).filter(|p| !p.is_empty());
        let mut current = raw.replace("\r\n", "\n").replace('\r', "\n");
        loop {
            let next = normalize_pass(&current, prompt);
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

fn normalize_pass(text: &str, prompt: Option<&str>) -> String {
    let text = THINK_BLOCK.replace_all(text, "");
    let text = DANGLING_THINK_END.replace(&text, "");
    let text = CHAT_TOKEN.replace_all(&text, "");
    let text = strip_echoed_prompt(&text, prompt);

    let mut lines: Vec<&str> = text
        .lines()
        .filter(|line| !is_fence(line))
        .filter(|line| !ROLE_LINE.is_match(line.trim()))
        .map(|line| ROLE_PREFIX.find(line).map_or(line, |m| &line[m.end()..]))
        .map(str::trim_end)
        .collect();

    drop_leading_meta(&mut lines);
    drop_trailing_meta(&mut lines);
    let lines = dedupe_titles(lines);

    collapse_blank_runs(&lines)
}

fn strip_echoed_prompt<'a>(text: &'a str, prompt: Option<&str>) -> &'a str {
    let Some(prompt) = prompt else {
        return text;
    };
    let trimmed = text.trim_start();
    trimmed.strip_prefix(prompt).unwrap_or(text)
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn is_leading_meta(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_META_LINE_CHARS {
        return false;
    }
    if is_announcement(trimmed) {
        return true;
    }
    if let Some(ack) = LEAD_ACK.find(trimmed) {
        let rest = &trimmed[ack.end()..];
        return rest.is_empty() || trimmed.ends_with(':') || is_announcement(rest);
    }
    false
}

fn is_announcement(line: &str) -> bool {
    (LEAD_PREAMBLE.is_match(line) && line.ends_with(':')) || LEAD_ANNOUNCEMENT.is_match(line)
}

fn is_trailing_meta(line: &str) -> bool {
    let trimmed = line.trim();
    TRAIL_META.is_match(trimmed) || RULE_LINE.is_match(trimmed)
}

fn drop_leading_meta(lines: &mut Vec<&str>) {
    let mut start = 0;
    while start < lines.len() {
        let line = lines[start];
        if line.trim().is_empty() || is_leading_meta(line) {
            start += 1;
        } else {
            break;
        }
    }
    lines.drain(..start);
}

fn drop_trailing_meta(lines: &mut Vec<&str>) {
    while let Some(last) = lines.last() {
        if last.trim().is_empty() || is_trailing_meta(last) {
            lines.pop();
        } else {
            break;
        }
    }
}

fn heading_key(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.chars().count() > MAX_HEADING_CHARS || !HEADING_LINE.is_match(trimmed) {
        return None;
    }
    let key: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '#' | '*' | '_'))
        .collect::<String>()
        .trim()
        .to_lowercase();
    (!key.is_empty()).then_some(key)
}

fn dedupe_titles(lines: Vec<&str>) -> Vec<&str> {
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut previous_key: Option<String> = None;

    for line in lines {
        if line.trim().is_empty() {
            kept.push(line);
            continue;
        }
        let key = heading_key(line);
        if key.is_some() && key == previous_key {
            continue;
        }
        previous_key = key;
        kept.push(line);
    }
    kept
}

fn collapse_blank_runs(lines: &[&str]) -> String {
    let mut out = String::new();
    let mut blank_pending = false;

    for line in lines {
        if line.trim().is_empty() {
            blank_pending = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_pending {
                out.push('\n');
            }
        }
        blank_pending = false;
        out.push_str(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &str) -> String {
        ContentNormalizer::new().normalize(raw, None)
    }

    #[test]
    fn strips_think_blocks() {
        let raw = "<think>\nplan the chapter\n</think>\nThe rain fell.";
        assert_eq!(normalize(raw), "The rain fell.");
    }

    #[test]
    fn strips_dangling_think_end() {
        assert_eq!(normalize("scratch notes</think>\nThe rain fell."), "The rain fell.");
    }

    #[test]
    fn strips_code_fences_and_role_markers() {
        let raw = "### Response:\n```markdown\nAssistant: The rain fell.\nIt kept falling.\n```";
        assert_eq!(normalize(raw), "The rain fell.\nIt kept falling.");
    }

    #[test]
    fn strips_chat_tokens() {
        assert_eq!(normalize("<|assistant|>The rain fell.<|end|>"), "The rain fell.");
    }

    #[test]
    fn strips_leading_and_trailing_meta() {
        let raw = "Sure! Here is the rewritten chapter:\n\nThe rain fell.\n\nNote: I kept the tone.\nLet me know if you want changes.";
        assert_eq!(normalize(raw), "The rain fell.");
    }

    #[test]
    fn keeps_story_lines_that_look_like_acknowledgements() {
        let raw = "Of course, he refused.\nThe rain fell.";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn strips_echoed_prompt() {
        let prompt = "Write one line about rain.";
        let raw = "Write one line about rain.\nThe rain fell.";
        assert_eq!(
            ContentNormalizer::new().normalize(raw, Some(prompt)),
            "The rain fell."
        );
    }

    #[test]
    fn dedupes_repeated_titles() {
        let raw = "# Chapter 3: Rain\n\n**Chapter 3: Rain**\n\nThe rain fell.";
        assert_eq!(normalize(raw), "# Chapter 3: Rain\n\nThe rain fell.");
    }

    #[test]
    fn keeps_repeated_dialogue_lines() {
        let raw = "\"No.\"\n\n\"No.\"\n\nShe shook her head.";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn keeps_repeated_values_in_json_output() {
        let raw = "[\n  \"low\",\n  \"low\"\n]";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn keeps_closing_line_starting_with_note() {
        let raw = "The rain fell.\n\nNote the way she smiled.";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn keeps_closing_line_starting_with_i_hope() {
        let raw = "The rain fell.\n\nI hope she comes back.";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn keeps_opening_line_that_tells_a_story() {
        let raw = "Here is the story of how I died.\nIt rained.";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn strips_plain_announcement_line() {
        let raw = "Here is the revised chapter.\n\nThe rain fell.";
        assert_eq!(normalize(raw), "The rain fell.");
    }

    #[test]
    fn collapses_blank_runs_and_trailing_whitespace() {
        let raw = "One.   \r\n\r\n\r\n\r\nTwo.\t\n\n";
        assert_eq!(normalize(raw), "One.\n\nTwo.");
    }

    #[test]
    fn only_chatter_normalizes_to_empty() {
        assert_eq!(normalize("```\n```\nSure!\n"), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "",
            "plain text",
            "Sure!\nSure!\nHere is the chapter:\nText.\n",
            "<think>a</think><think>b</think>Assistant: Assistant: hi",
            "# T\n# T\n\n# T\ntext\n---\nI hope this helps!",
            "Write it.\nWrite it.\nWrite it.\nbody",
            "```\n```\n```\ninner\n```",
            "line   \n\n\n\n  \n\t\nother\r\n",
            "Output:\n**Note:** something\nreal content\nNote: end",
        ];
        let normalizer = ContentNormalizer::new();
        for sample in samples {
            for prompt in [None, Some("Write it.")] {
                let once = normalizer.normalize(sample, prompt);
                let twice = normalizer.normalize(&once, prompt);
                assert_eq!(once, twice, "not idempotent for {sample:?}");
            }
        }
    }
}
