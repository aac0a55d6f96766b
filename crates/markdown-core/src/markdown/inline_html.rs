use std::sync::LazyLock;

use regex::Regex;

use crate::node::Marks;

use super::html::{decode_url, parse_attrs};

static OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^<([A-Za-z][A-Za-z0-9-]*)(\s[^>]*?)?\s*(/?)>$").expect("open tag pattern must compile")
});

static CLOSE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^</([A-Za-z][A-Za-z0-9-]*)\s*>$").expect("close tag pattern must compile")
});

static STYLE_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|;)\s*color\s*:\s*([^;]+)").expect("color pattern must compile")
});

/// One level of inline formatting contributed by markdown syntax or an
/// inline HTML tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Color(String),
    Link(String),
    /// A known tag that carries no mark, kept so its closing tag matches.
    Plain,
}

impl Layer {
    pub fn apply(&self, marks: &mut Marks) {
        match self {
            Layer::Bold => marks.bold = true,
            Layer::Italic => marks.italic = true,
            Layer::Underline => marks.underline = true,
            Layer::Strikethrough => marks.strikethrough = true,
            Layer::Code => marks.code = true,
            Layer::Color(color) => marks.text_color = Some(color.clone()),
            Layer::Link(url) => marks.link = Some(url.clone()),
            Layer::Plain => {}
        }
    }
}

/// What a piece of inline HTML turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineHtml {
    /// An open or close tag that was matched against the stack.
    Consumed,
    Break,
    /// Unknown or unbalanced markup, kept as text.
    Literal(String),
}

/// Open inline tags, innermost last.
#[derive(Debug, Clone, Default)]
pub struct TagStack {
    open: Vec<(String, Layer)>,
}

impl TagStack {
    pub fn apply(&self, marks: &mut Marks) {
        for (_, layer) in &self.open {
            layer.apply(marks);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn feed(&mut self, raw: &str) -> InlineHtml {
        let raw = raw.trim();
        if raw.starts_with("<!--") {
            return InlineHtml::Consumed;
        }
        if let Some(caps) = CLOSE_TAG.captures(raw) {
            let name = caps[1].to_ascii_lowercase();
            if self.open.last().is_some_and(|(open, _)| *open == name) {
                self.open.pop();
                return InlineHtml::Consumed;
            }
            tracing::trace!("unbalanced closing tag </{}> kept as text", name);
            return InlineHtml::Literal(raw.to_string());
        }
        let Some(caps) = OPEN_TAG.captures(raw) else {
            return InlineHtml::Literal(raw.to_string());
        };
        let name = caps[1].to_ascii_lowercase();
        if name == "br" {
            return InlineHtml::Break;
        }
        let attrs = parse_attrs(caps.get(2).map_or("", |m| m.as_str()));
        let self_closing = !caps[3].is_empty();
        match layer_for(&name, &attrs) {
            Some(_) if self_closing => InlineHtml::Consumed,
            Some(layer) => {
                self.open.push((name, layer));
                InlineHtml::Consumed
            }
            None => InlineHtml::Literal(raw.to_string()),
        }
    }
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

pub fn style_color(style: &str) -> Option<String> {
    STYLE_COLOR
        .captures(style)
        .map(|caps| caps[1].trim().to_string())
        .filter(|color| !color.is_empty())
}

pub fn layer_for(name: &str, attrs: &[(String, String)]) -> Option<Layer> {
    let layer = match name {
        "b" | "strong" => Layer::Bold,
        "i" | "em" => Layer::Italic,
        "u" | "ins" => Layer::Underline,
        "s" | "del" | "strike" => Layer::Strikethrough,
        "code" | "kbd" => Layer::Code,
        "span" => attr(attrs, "style")
            .and_then(style_color)
            .map_or(Layer::Plain, Layer::Color),
        "font" => attr(attrs, "color").map_or(Layer::Plain, |c| Layer::Color(c.to_string())),
        "a" => attr(attrs, "href").map_or(Layer::Plain, |href| Layer::Link(decode_url(href))),
        "sup" | "sub" | "mark" | "small" | "abbr" => Layer::Plain,
        _ => return None,
    };
    Some(layer)
}
