use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{CommandError, EditorError};
use crate::list::{ItemContext, create_list};
use crate::node::{ElementKind, ElementNode, ListKind, Marks, MediaType, Node, attr};
use crate::ops::{NodePatch, Op, Path};
use crate::path::child;
use crate::selection::Point;
use crate::table::table_cell_node;
use crate::transforms::Batch;

/// What the rules know about the cursor when a key arrives.
#[derive(Debug, Clone)]
struct MatchContext {
    block: Path,
    block_kind: ElementKind,
    leaf: Path,
    offset: usize,
    marks: Marks,
    /// The cursor's leaf is the first child of its block.
    leaf_is_first: bool,
    /// Everything in the block sits before the cursor.
    block_is_prefix: bool,
    in_quote: bool,
}

impl MatchContext {
    fn top_level(&self) -> bool {
        self.block.len() == 1
    }

    fn has_previous(&self) -> bool {
        self.block.last().is_some_and(|ix| *ix > 0)
    }

    fn paragraph_start(&self) -> bool {
        self.block_kind == ElementKind::Paragraph && self.leaf_is_first
    }
}

enum Trigger {
    Literal(&'static str),
    Pattern(Regex),
}

impl Trigger {
    fn matches(&self, key: &str) -> bool {
        match self {
            Trigger::Literal(expected) => *expected == key,
            Trigger::Pattern(re) => re.is_match(key),
        }
    }
}

type Guard = fn(&MatchContext) -> bool;
type Action = fn(&mut Batch<'_>, &MatchContext, &Captures<'_>) -> Result<bool, EditorError>;

struct Rule {
    name: &'static str,
    trigger: Trigger,
    pattern: Regex,
    guard: Guard,
    run: Action,
}

fn rule(name: &'static str, trigger: Trigger, pattern: &str, guard: Guard, run: Action) -> Rule {
    Rule {
        name,
        trigger,
        pattern: Regex::new(pattern).expect("autoformat pattern must compile"),
        guard,
        run,
    }
}

fn pattern(re: &str) -> Trigger {
    Trigger::Pattern(Regex::new(re).expect("autoformat trigger must compile"))
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use Trigger::Literal;
    vec![
        rule("heading", Literal(" "), r"^(#{1,4}) $", heading_allowed, make_heading),
        rule("task_list", Literal(" "), r"^\[([ xX]?)\] $", list_allowed, make_task_list),
        rule("ordered_list", Literal(" "), r"^(\d{1,9})\. $", list_allowed, make_ordered_list),
        rule("bulleted_list", Literal(" "), r"^[-*+] $", list_allowed, make_bulleted_list),
        rule("blockquote", Literal(" "), r"^> $", quote_allowed, make_blockquote),
        rule("frontmatter", Literal("-"), r"^---$", frontmatter_allowed, make_frontmatter),
        rule(
            "horizontal_rule",
            pattern(r"^[-*_]$"),
            r"^(?:-{3,}|\*{3,}|_{3,})$",
            rule_allowed,
            make_horizontal_rule,
        ),
        rule("code_fence", Literal("`"), r"^```$", fence_allowed, make_code_fence),
        rule(
            "code_fence_language",
            Literal(" "),
            r"^```([\w+#.-]+) $",
            fence_allowed,
            make_code_fence,
        ),
        rule("table_row", Literal(" "), r"^\|((?:[^|]+\|){2,}) $", table_allowed, make_table),
        rule("image", Literal(")"), r"(!\[([^\]]*)\]\(([^)\s]+)\))$", inline_allowed, make_image),
        rule("link", Literal(")"), r"(\[([^\]]+)\]\(([^)\s]+)\))$", inline_allowed, make_link),
        rule(
            "bold_italic",
            Literal("*"),
            r"(?:^|[^*])(\*\*\*([^*]+)\*\*\*)$",
            inline_allowed,
            make_bold_italic,
        ),
        rule("bold", Literal("*"), r"(?:^|[^*])(\*\*([^*]+)\*\*)$", inline_allowed, make_bold),
        rule("bold_underscore", Literal("_"), r"(?:^|[^_])(__([^_]+)__)$", inline_allowed, make_bold),
        rule("italic", Literal("*"), r"(?:^|[^*])(\*([^*]+)\*)$", inline_allowed, make_italic),
        rule(
            "italic_underscore",
            Literal("_"),
            r"(?:^|[^_\w])(_([^_]+)_)$",
            inline_allowed,
            make_italic,
        ),
        rule(
            "strikethrough",
            Literal("~"),
            r"(?:^|[^~])(~~([^~]+)~~)$",
            inline_allowed,
            make_strikethrough,
        ),
        rule("inline_code", Literal("`"), r"(?:^|[^`])(`([^`]+)`)$", inline_allowed, make_code),
    ]
});

/// Tries the rule table against the text before the cursor plus `key`.
pub(super) fn handle(batch: &mut Batch<'_>, key: &str) -> Result<bool, EditorError> {
    let selection = batch.selection().clone();
    if !selection.is_collapsed() || key.is_empty() {
        return Ok(false);
    }
    let Some(ctx) = context(batch, selection.focus)? else {
        return Ok(false);
    };
    let Some(before) = batch
        .doc()
        .leaf(&ctx.leaf)
        .and_then(|leaf| leaf.text.get(..ctx.offset))
        .map(str::to_string)
    else {
        return Ok(false);
    };
    let text = format!("{before}{key}");

    for rule in RULES.iter() {
        if !rule.trigger.matches(key) || !(rule.guard)(&ctx) {
            continue;
        }
        let Some(caps) = rule.pattern.captures(&text) else {
            continue;
        };
        if (rule.run)(batch, &ctx, &caps)? {
            tracing::debug!("autoformat rule {} fired", rule.name);
            return Ok(true);
        }
    }
    Ok(false)
}

static FENCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```([\w+#.-]*)$").expect("fence pattern must compile"));

/// Enter on a paragraph holding only a fence opener turns it into a code
/// block, the same way typing the opener does.
pub(super) fn fence_on_enter(batch: &mut Batch<'_>) -> Result<bool, EditorError> {
    let selection = batch.selection().clone();
    if !selection.is_collapsed() {
        return Ok(false);
    }
    let Some(ctx) = context(batch, selection.focus)? else {
        return Ok(false);
    };
    if !fence_allowed(&ctx) {
        return Ok(false);
    }
    let Some(line) = batch
        .doc()
        .leaf(&ctx.leaf)
        .and_then(|leaf| leaf.text.get(..ctx.offset))
        .map(str::to_string)
    else {
        return Ok(false);
    };
    let Some(caps) = FENCE_LINE.captures(&line) else {
        return Ok(false);
    };
    tracing::debug!("autoformat rule code_fence fired on enter");
    make_code_fence(batch, &ctx, &caps)
}

fn context(batch: &Batch<'_>, focus: Point) -> Result<Option<MatchContext>, EditorError> {
    let doc = batch.doc();
    let Some(leaf) = doc.leaf(&focus.path) else {
        return Ok(None);
    };
    let Some((&leaf_ix, parent)) = focus.path.split_last() else {
        return Ok(None);
    };
    let parent_kind = doc.element(parent)?.kind;
    if parent_kind.is_literal() || parent_kind.is_void() {
        return Ok(None);
    }
    let Some(block) = doc.text_block_of(&focus.path) else {
        return Ok(None);
    };
    let block_el = doc.element(&block)?;
    let leaf_is_first = block == parent && leaf_ix == 0;
    let prefix = leaf.text.get(..focus.offset).unwrap_or_default();
    Ok(Some(MatchContext {
        block_kind: block_el.kind,
        leaf_is_first,
        block_is_prefix: leaf_is_first && block_el.string() == prefix,
        in_quote: doc
            .ancestor_of_kind(&block, ElementKind::Blockquote)
            .is_some(),
        marks: leaf.marks.clone(),
        offset: focus.offset,
        leaf: focus.path,
        block,
    }))
}

fn heading_allowed(ctx: &MatchContext) -> bool {
    ctx.paragraph_start() && ctx.top_level()
}

fn list_allowed(ctx: &MatchContext) -> bool {
    ctx.paragraph_start() && ctx.top_level() && ctx.has_previous()
}

fn quote_allowed(ctx: &MatchContext) -> bool {
    ctx.paragraph_start() && !ctx.in_quote
}

fn frontmatter_allowed(ctx: &MatchContext) -> bool {
    ctx.paragraph_start() && ctx.block_is_prefix && ctx.block == [0]
}

fn rule_allowed(ctx: &MatchContext) -> bool {
    ctx.paragraph_start() && ctx.block_is_prefix && ctx.top_level() && ctx.has_previous()
}

fn fence_allowed(ctx: &MatchContext) -> bool {
    ctx.paragraph_start() && ctx.block_is_prefix
}

fn table_allowed(ctx: &MatchContext) -> bool {
    ctx.paragraph_start() && ctx.block_is_prefix && ctx.top_level()
}

fn inline_allowed(ctx: &MatchContext) -> bool {
    matches!(ctx.block_kind, ElementKind::Paragraph | ElementKind::Heading) && !ctx.marks.is_dirty()
}

fn strip_marker(batch: &mut Batch<'_>, ctx: &MatchContext) -> Result<(), EditorError> {
    if ctx.offset == 0 {
        return Ok(());
    }
    batch.apply_op(Op::RemoveText {
        path: ctx.leaf.clone(),
        range: 0..ctx.offset,
    })
}

pub(super) fn into_editor_error(err: CommandError) -> EditorError {
    match err {
        CommandError::Editor(err) => err,
        CommandError::Unsupported(message) => EditorError::InvalidOperation(message),
    }
}

fn make_heading(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    let level = caps.get(1).map_or(1, |m| m.as_str().len());
    strip_marker(batch, ctx)?;
    batch.set_nodes(
        &ctx.block,
        NodePatch::kind(ElementKind::Heading).set(attr::LEVEL, level),
    )?;
    Ok(true)
}

fn make_list(batch: &mut Batch<'_>, ctx: &MatchContext, kind: ListKind) -> Result<Option<ItemContext>, EditorError> {
    strip_marker(batch, ctx)?;
    create_list(batch, kind).map_err(into_editor_error)?;
    Ok(ItemContext::of(batch.doc(), &batch.selection().focus.path))
}

fn make_task_list(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    let checked = caps.get(1).is_some_and(|m| m.as_str().eq_ignore_ascii_case("x"));
    let Some(item) = make_list(batch, ctx, ListKind::Task)? else {
        return Ok(false);
    };
    batch.set_nodes(&item.item, NodePatch::default().set(attr::CHECKED, checked))?;
    Ok(true)
}

fn make_ordered_list(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    let start: u64 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);
    let Some(item) = make_list(batch, ctx, ListKind::Ordered)? else {
        return Ok(false);
    };
    if item.count == 1 && start != 1 {
        batch.set_nodes(&item.list, NodePatch::default().set(attr::START, start))?;
    }
    Ok(true)
}

fn make_bulleted_list(batch: &mut Batch<'_>, ctx: &MatchContext, _: &Captures<'_>) -> Result<bool, EditorError> {
    Ok(make_list(batch, ctx, ListKind::Unordered)?.is_some())
}

fn make_blockquote(batch: &mut Batch<'_>, ctx: &MatchContext, _: &Captures<'_>) -> Result<bool, EditorError> {
    strip_marker(batch, ctx)?;
    batch.wrap_nodes(ElementNode::new(ElementKind::Blockquote), &ctx.block, 1)?;
    Ok(true)
}

fn replace_block(batch: &mut Batch<'_>, at: &[usize], nodes: Vec<Node>, cursor: &[usize]) -> Result<(), EditorError> {
    batch.remove_nodes(at)?;
    batch.insert_nodes(at, nodes)?;
    batch.select_start_of(cursor)
}

fn make_frontmatter(batch: &mut Batch<'_>, ctx: &MatchContext, _: &Captures<'_>) -> Result<bool, EditorError> {
    let frontmatter = Node::element(ElementKind::Frontmatter, vec![Node::text("")]);
    replace_block(batch, &ctx.block, vec![frontmatter], &ctx.block)?;
    Ok(true)
}

fn make_horizontal_rule(batch: &mut Batch<'_>, ctx: &MatchContext, _: &Captures<'_>) -> Result<bool, EditorError> {
    let after = crate::path::next(&ctx.block).ok_or_else(|| EditorError::invalid("rule at the root"))?;
    replace_block(
        batch,
        &ctx.block,
        vec![Node::horizontal_rule(), Node::paragraph("")],
        &after,
    )?;
    Ok(true)
}

fn make_code_fence(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    let language = caps.get(1).map(|m| m.as_str()).filter(|l| !l.is_empty());
    replace_block(batch, &ctx.block, vec![Node::code_block(language, "")], &ctx.block)?;
    Ok(true)
}

fn make_table(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    let Some(cells) = caps.get(1) else {
        return Ok(false);
    };
    let mut texts: Vec<&str> = cells.as_str().split('|').map(str::trim).collect();
    texts.pop();
    let header: Vec<Node> = texts.into_iter().map(table_cell_node).collect();
    if header.is_empty() {
        return Ok(false);
    }
    let body: Vec<Node> = (0..header.len()).map(|_| table_cell_node("")).collect();
    let table = Node::element(
        ElementKind::Table,
        vec![
            Node::element(ElementKind::TableRow, header),
            Node::element(ElementKind::TableRow, body),
        ],
    );
    let cursor = child(&child(&ctx.block, 1), 0);
    replace_block(batch, &ctx.block, vec![table], &cursor)?;
    Ok(true)
}

// Removes the typed token (everything matched except the pending key) from
// the leaf and returns where it started.
fn cut_token(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<Option<usize>, EditorError> {
    let Some(token) = caps.get(1) else {
        return Ok(None);
    };
    let start = token.start();
    if start > ctx.offset {
        return Ok(None);
    }
    batch.apply_op(Op::RemoveText {
        path: ctx.leaf.clone(),
        range: start..ctx.offset,
    })?;
    Ok(Some(start))
}

fn insert_marked(
    batch: &mut Batch<'_>,
    ctx: &MatchContext,
    caps: &Captures<'_>,
    body: &str,
    marks: Marks,
) -> Result<bool, EditorError> {
    if body.trim().is_empty() {
        return Ok(false);
    }
    let Some(start) = cut_token(batch, ctx, caps)? else {
        return Ok(false);
    };
    let at = if start == 0 {
        ctx.leaf.clone()
    } else {
        let len = batch.doc().leaf(&ctx.leaf).map_or(0, |leaf| leaf.text.len());
        if start < len {
            batch.split_node(&ctx.leaf, start)?;
        }
        crate::path::next(&ctx.leaf).ok_or_else(|| EditorError::invalid("leaf at the root"))?
    };
    batch.insert_nodes(&at, vec![Node::marked(body, marks)])?;
    batch.collapse_to(Point::new(at, body.len()));
    Ok(true)
}

fn inline_with(
    batch: &mut Batch<'_>,
    ctx: &MatchContext,
    caps: &Captures<'_>,
    apply: impl FnOnce(&mut Marks),
) -> Result<bool, EditorError> {
    let body = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
    let mut marks = ctx.marks.clone();
    apply(&mut marks);
    insert_marked(batch, ctx, caps, &body, marks)
}

fn make_bold_italic(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    inline_with(batch, ctx, caps, |m| {
        m.bold = true;
        m.italic = true;
    })
}

fn make_bold(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    inline_with(batch, ctx, caps, |m| m.bold = true)
}

fn make_italic(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    inline_with(batch, ctx, caps, |m| m.italic = true)
}

fn make_strikethrough(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    inline_with(batch, ctx, caps, |m| m.strikethrough = true)
}

fn make_code(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    inline_with(batch, ctx, caps, |m| m.code = true)
}

fn make_link(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    let Some(url) = caps.get(3).map(|m| m.as_str().to_string()) else {
        return Ok(false);
    };
    inline_with(batch, ctx, caps, |m| m.link = Some(url))
}

fn make_image(batch: &mut Batch<'_>, ctx: &MatchContext, caps: &Captures<'_>) -> Result<bool, EditorError> {
    let Some(url) = caps.get(3).map(|m| m.as_str().to_string()) else {
        return Ok(false);
    };
    let alt = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let mut media = ElementNode::new(ElementKind::Media)
        .with_attr(attr::MEDIA_TYPE, MediaType::Image.as_str())
        .with_attr(attr::URL, url)
        .with_children(vec![Node::text("")]);
    if !alt.is_empty() {
        media.set_attr(attr::ALT, alt);
    }
    if cut_token(batch, ctx, caps)?.is_none() {
        return Ok(false);
    }
    let block_empty = batch.doc().string(&ctx.block).is_empty();
    if block_empty && ctx.block_kind == ElementKind::Paragraph {
        let after = crate::path::next(&ctx.block).ok_or_else(|| EditorError::invalid("image at the root"))?;
        replace_block(
            batch,
            &ctx.block,
            vec![Node::Element(media), Node::paragraph("")],
            &after,
        )?;
    } else {
        let after = crate::path::next(&ctx.block).ok_or_else(|| EditorError::invalid("image at the root"))?;
        batch.insert_nodes(&after, vec![Node::Element(media)])?;
    }
    Ok(true)
}
