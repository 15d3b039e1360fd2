//! Code sanitizer
//!
//! Turns raw generator output into clean source text. Generators tend to wrap
//! code in markdown fences, sometimes several, sometimes with prose around
//! them; [`sanitize`] keeps only the code.
//!
//! Rules, applied in order:
//! 1. Every byte-order mark and carriage return is removed.
//! 2. If any fence line exists (trimmed start begins with three backticks),
//!    only the body of the longest fenced block is kept. The first block wins
//!    on ties and an unterminated final fence runs to the end of the text.
//!    The info string on the opening fence (`python`, `py`, ...) is dropped
//!    together with the fence line.
//! 3. Trailing whitespace is stripped from every line.
//! 4. Leading and trailing blank lines are removed.
//! 5. A non-empty result ends with exactly one newline.
//!
//! The output never contains a fence line, so `sanitize(sanitize(x)) == sanitize(x)`.

const FENCE: &str = "```";
const BOM: char = '\u{feff}';

/// Whether `line` opens or closes a fenced block
#[inline]
fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

/// Clean raw generator output. Pure and idempotent.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let normalized: String = raw.chars().filter(|c| *c != BOM && *c != '\r').collect();

    let body: Vec<&str> = match longest_fenced_block(&normalized) {
        Some(block) => block,
        None => normalized.lines().collect(),
    };

    let trimmed: Vec<&str> = body.iter().map(|line| line.trim_end()).collect();
    let start = trimmed.iter().position(|l| !l.is_empty());
    let end = trimmed.iter().rposition(|l| !l.is_empty());

    match (start, end) {
        (Some(start), Some(end)) => {
            let mut out = trimmed[start..=end].join("\n");
            out.push('\n');
            out
        }
        _ => String::new(),
    }
}

/// Body lines of the longest fenced block, or `None` when `text` has no fences
fn longest_fenced_block(text: &str) -> Option<Vec<&str>> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        if is_fence_line(line) {
            match current.take() {
                Some(block) => blocks.push(block),
                None => current = Some(Vec::new()),
            }
        } else if let Some(block) = current.as_mut() {
            block.push(line);
        }
    }
    if let Some(block) = current {
        blocks.push(block);
    }

    let mut best: Option<(usize, Vec<&str>)> = None;
    for block in blocks {
        let size = block_size(&block);
        if best.as_ref().map_or(true, |(best_size, _)| size > *best_size) {
            best = Some((size, block));
        }
    }
    best.map(|(_, block)| block)
}

fn block_size(lines: &[&str]) -> usize {
    lines.iter().map(|l| l.len() + 1).sum()
}
