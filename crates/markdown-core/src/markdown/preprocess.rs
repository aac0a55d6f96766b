use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Stands in for a literal triple backtick inside a rewritten wrapper block.
pub const CODE_PLACEHOLDER: &str = "【CODE_BLOCK】";

/// Wrapper tags that turn into fenced blocks tagged with their own name.
pub const WRAPPER_LANGUAGES: [&str; 2] = ["think", "answer"];

const FENCE: &str = "```";
const MAX_STRIP_PASSES: usize = 16;

/// Tags that survive stripping. Anything else loses its markup and keeps its
/// inner text.
const STANDARD_TAGS: &[&str] = &[
    "a", "abbr", "answer", "article", "audio", "b", "blockquote", "br", "caption", "center",
    "code", "col", "colgroup", "dd", "del", "details", "div", "dl", "dt", "em", "figcaption",
    "figure", "font", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "iframe", "img", "ins",
    "kbd", "li", "mark", "ol", "p", "pre", "s", "section", "small", "source", "span", "strike",
    "strong", "sub", "summary", "sup", "table", "tbody", "td", "tfoot", "th", "thead", "think",
    "tr", "u", "ul", "video",
];

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?([A-Za-z][A-Za-z0-9-]*)(?:\s[^<>]*)?/?>").expect("tag pattern must compile")
});

static WRAPPER_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(think|answer)>").expect("wrapper pattern must compile"));

pub fn is_standard_tag(name: &str) -> bool {
    STANDARD_TAGS.contains(&name.to_ascii_lowercase().as_str())
}

/// Rewrites wrapper tags into fences, then strips non-standard tags.
pub fn preprocess(markdown: &str) -> String {
    let text = rewrite_wrappers(markdown);
    strip_unknown_tags(&text)
}

/// `<think>..</think>` becomes a fenced block whose language is the tag name.
/// Fences inside the wrapper are swapped for [`CODE_PLACEHOLDER`] so they do
/// not close the new block early. A wrapper that never closes runs to the end
/// of the input and leaves the fence open.
pub fn rewrite_wrappers(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() + 16);
    let mut rest = markdown;
    while let Some(caps) = WRAPPER_OPEN.captures(rest) {
        let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let name = name.as_str();
        out.push_str(&rest[..open.start()]);
        let after = &rest[open.end()..];
        let close = format!("</{name}>");
        let (inner, tail, closed) = match after.find(&close) {
            Some(ix) => (&after[..ix], &after[ix + close.len()..], true),
            None => (after, "", false),
        };
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
        out.push_str(FENCE);
        out.push_str(name);
        out.push('\n');
        out.push_str(&inner.trim_matches('\n').replace(FENCE, CODE_PLACEHOLDER));
        if closed {
            out.push('\n');
            out.push_str(FENCE);
            out.push_str("\n\n");
        }
        rest = tail.trim_start_matches('\n');
    }
    out.push_str(rest);
    out
}

/// Restores the fences hidden by [`rewrite_wrappers`].
pub fn restore_fences(code: &str) -> String {
    code.replace(CODE_PLACEHOLDER, FENCE)
}

/// Drops the markup of non-standard tags outside code until nothing changes.
pub fn strip_unknown_tags(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_STRIP_PASSES {
        let next = strip_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
    tracing::warn!("tag stripping did not settle after {} passes", MAX_STRIP_PASSES);
    current
}

fn strip_pass(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut fence: Option<&str> = None;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let marker = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };
        match (fence, marker) {
            (None, Some(m)) => {
                fence = Some(m);
                out.push_str(line);
            }
            (Some(open), Some(m)) if open == m => {
                fence = None;
                out.push_str(line);
            }
            (Some(_), _) => out.push_str(line),
            (None, None) => out.push_str(&strip_line(line)),
        }
    }
    out
}

// Inline code spans are left alone: odd segments between backticks.
fn strip_line(line: &str) -> String {
    if !line.contains('<') {
        return line.to_string();
    }
    line.split('`')
        .enumerate()
        .map(|(ix, segment)| {
            if ix % 2 == 1 {
                segment.to_string()
            } else {
                TAG.replace_all(segment, |caps: &Captures<'_>| {
                    let name = caps.get(1).map_or("", |m| m.as_str());
                    if is_standard_tag(name) {
                        caps[0].to_string()
                    } else {
                        String::new()
                    }
                })
                .into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn think_becomes_a_fence_with_hidden_backticks() {
        let out = rewrite_wrappers("<think>plan\n```js\nx\n```\n</think>\nanswer");
        assert_eq!(
            out,
            "\n```think\nplan\n【CODE_BLOCK】js\nx\n【CODE_BLOCK】\n```\n\nanswer"
        );
        assert_eq!(restore_fences("【CODE_BLOCK】js"), "```js");
    }

    #[test]
    fn unterminated_wrapper_leaves_the_fence_open() {
        assert_eq!(rewrite_wrappers("<think>still going"), "\n```think\nstill going");
    }

    #[test]
    fn nested_unknown_tags_unwrap_fully() {
        assert_eq!(
            strip_unknown_tags("a <custom><inner>text</inner></custom> <b>kept</b>"),
            "a text <b>kept</b>"
        );
    }

    #[test]
    fn code_is_not_stripped() {
        let text = "use `Vec<T>` here\n```rust\nlet v: Vec<T> = x;\n```\n";
        assert_eq!(strip_unknown_tags(text), text);
    }
}
