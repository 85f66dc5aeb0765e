//! Renders the rich-text editor's JSON document to HTML and MDX.
//!
//! The document is a tree of `{type, attrs?, content?, text?, marks?}`
//! nodes. Unknown node types render their children; unknown marks are
//! dropped.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
pub struct EditorNode {
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub attrs: serde_json::Map<String, Value>,
    #[serde(default)]
    pub content: Vec<EditorNode>,
    pub text: Option<String>,
    #[serde(default)]
    pub marks: Vec<Mark>,
}

#[derive(Debug, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub mark_type: String,
    #[serde(default)]
    pub attrs: serde_json::Map<String, Value>,
}

impl EditorNode {
    fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    fn heading_level(&self) -> u8 {
        self.attrs
            .get("level")
            .and_then(Value::as_u64)
            .map_or(1, |l| l.clamp(1, 6) as u8)
    }
}

/// Parse an editor document. Anything that is not a node tree yields `None`.
pub fn parse(content: &Value) -> Option<EditorNode> {
    if content.is_null() {
        return None;
    }
    serde_json::from_value(content.clone()).ok()
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn safe_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    !(lower.starts_with("javascript:") || lower.starts_with("data:") || lower.starts_with("vbscript:"))
}

pub fn to_html(doc: &EditorNode) -> String {
    let mut out = String::new();
    render_html(doc, &mut out);
    out
}

fn render_children_html(node: &EditorNode, out: &mut String) {
    for child in &node.content {
        render_html(child, out);
    }
}

fn wrap_html(tag: &str, node: &EditorNode, out: &mut String) {
    out.push_str(&format!("<{tag}>"));
    render_children_html(node, out);
    out.push_str(&format!("</{tag}>"));
}

fn render_html(node: &EditorNode, out: &mut String) {
    match node.node_type.as_str() {
        "text" => out.push_str(&text_html(node)),
        "paragraph" => wrap_html("p", node, out),
        "heading" => wrap_html(&format!("h{}", node.heading_level()), node, out),
        "bulletList" => wrap_html("ul", node, out),
        "orderedList" => wrap_html("ol", node, out),
        "listItem" => wrap_html("li", node, out),
        "blockquote" => wrap_html("blockquote", node, out),
        "codeBlock" => {
            match node.attr_str("language").filter(|l| !l.is_empty()) {
                Some(lang) => out.push_str(&format!(
                    "<pre><code class=\"language-{}\">",
                    html_escape(lang)
                )),
                None => out.push_str("<pre><code>"),
            }
            out.push_str(&html_escape(&plain_text(node)));
            out.push_str("</code></pre>");
        }
        "image" => {
            if let Some(src) = node.attr_str("src").filter(|s| safe_url(s)) {
                out.push_str(&format!(
                    "<img src=\"{}\" alt=\"{}\"",
                    html_escape(src),
                    html_escape(node.attr_str("alt").unwrap_or_default())
                ));
                if let Some(title) = node.attr_str("title") {
                    out.push_str(&format!(" title=\"{}\"", html_escape(title)));
                }
                out.push_str(" />");
            }
        }
        "horizontalRule" => out.push_str("<hr />"),
        "hardBreak" => out.push_str("<br />"),
        _ => render_children_html(node, out),
    }
}

fn text_html(node: &EditorNode) -> String {
    let mut html = html_escape(node.text.as_deref().unwrap_or_default());
    for mark in &node.marks {
        html = match mark.mark_type.as_str() {
            "bold" => format!("<strong>{html}</strong>"),
            "italic" => format!("<em>{html}</em>"),
            "code" => format!("<code>{html}</code>"),
            "strike" => format!("<s>{html}</s>"),
            "link" => match mark.attrs.get("href").and_then(Value::as_str) {
                Some(href) if safe_url(href) => {
                    format!("<a href=\"{}\">{html}</a>", html_escape(href))
                }
                _ => html,
            },
            _ => html,
        };
    }
    html
}

pub fn to_mdx(doc: &EditorNode) -> String {
    let mut out = String::new();
    render_blocks_mdx(&doc.content, "", &mut out);
    out.trim_end().to_string()
}

fn render_blocks_mdx(nodes: &[EditorNode], prefix: &str, out: &mut String) {
    for node in nodes {
        render_block_mdx(node, prefix, out);
    }
}

fn render_block_mdx(node: &EditorNode, prefix: &str, out: &mut String) {
    match node.node_type.as_str() {
        "paragraph" => {
            out.push_str(&format!("{prefix}{}\n\n", inline_mdx(&node.content)));
        }
        "heading" => {
            let hashes = "#".repeat(node.heading_level().into());
            out.push_str(&format!("{prefix}{hashes} {}\n\n", inline_mdx(&node.content)));
        }
        "bulletList" | "orderedList" => {
            let ordered = node.node_type == "orderedList";
            for (i, item) in node.content.iter().enumerate() {
                let marker = if ordered {
                    format!("{}. ", i + 1)
                } else {
                    "- ".to_string()
                };
                let text: Vec<String> = item
                    .content
                    .iter()
                    .filter(|c| c.node_type == "paragraph")
                    .map(|c| inline_mdx(&c.content))
                    .collect();
                out.push_str(&format!("{prefix}{marker}{}\n", text.join(" ")));
                let nested = format!("{prefix}  ");
                for child in item.content.iter().filter(|c| c.node_type != "paragraph") {
                    render_block_mdx(child, &nested, out);
                }
            }
            out.push('\n');
        }
        "blockquote" => {
            let mut inner = String::new();
            render_blocks_mdx(&node.content, "", &mut inner);
            for line in inner.trim_end().lines() {
                out.push_str(format!("{prefix}> {line}").trim_end());
                out.push('\n');
            }
            out.push('\n');
        }
        "codeBlock" => {
            let lang = node.attr_str("language").unwrap_or_default();
            out.push_str(&format!(
                "{prefix}```{lang}\n{}\n{prefix}```\n\n",
                plain_text(node)
            ));
        }
        "image" => {
            if let Some(src) = node.attr_str("src") {
                out.push_str(&format!(
                    "{prefix}![{}]({src})\n\n",
                    node.attr_str("alt").unwrap_or_default()
                ));
            }
        }
        "horizontalRule" => out.push_str(&format!("{prefix}---\n\n")),
        _ => render_blocks_mdx(&node.content, prefix, out),
    }
}

fn inline_mdx(nodes: &[EditorNode]) -> String {
    nodes
        .iter()
        .map(|node| match node.node_type.as_str() {
            "text" => text_mdx(node),
            "hardBreak" => "  \n".to_string(),
            "image" => node
                .attr_str("src")
                .map(|src| format!("![{}]({src})", node.attr_str("alt").unwrap_or_default()))
                .unwrap_or_default(),
            _ => inline_mdx(&node.content),
        })
        .collect()
}

fn text_mdx(node: &EditorNode) -> String {
    let mut text = node.text.clone().unwrap_or_default();
    for mark in &node.marks {
        text = match mark.mark_type.as_str() {
            "bold" => format!("**{text}**"),
            "italic" => format!("_{text}_"),
            "code" => format!("`{text}`"),
            "strike" => format!("~~{text}~~"),
            "link" => match mark.attrs.get("href").and_then(Value::as_str) {
                Some(href) => format!("[{text}]({href})"),
                None => text,
            },
            _ => text,
        };
    }
    text
}

/// Concatenated text of a subtree, used for code blocks and excerpts.
pub fn plain_text(node: &EditorNode) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &EditorNode, out: &mut String) {
    if let Some(text) = &node.text {
        out.push_str(text);
    }
    if node.node_type == "hardBreak" {
        out.push('\n');
    }
    for child in &node.content {
        collect_text(child, out);
        if matches!(child.node_type.as_str(), "paragraph" | "heading") && !out.ends_with(' ') {
            out.push(' ');
        }
    }
}

/// First `max` characters of the document text, cut at a word boundary.
pub fn excerpt(doc: &EditorNode, max: usize) -> String {
    let text = plain_text(doc);
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max {
        return text;
    }
    let cut: String = text.chars().take(max).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > 0 => format!("{}…", &cut[..idx]),
        _ => format!("{cut}…"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> EditorNode {
        parse(&json!({
            "type": "doc",
            "content": [
                {"type": "heading", "attrs": {"level": 2}, "content": [{"type": "text", "text": "Hello"}]},
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "Plain "},
                    {"type": "text", "text": "bold", "marks": [{"type": "bold"}]},
                    {"type": "text", "text": " & "},
                    {"type": "text", "text": "site", "marks": [{"type": "link", "attrs": {"href": "https://example.com"}}]}
                ]},
                {"type": "bulletList", "content": [
                    {"type": "listItem", "content": [{"type": "paragraph", "content": [{"type": "text", "text": "one"}]}]},
                    {"type": "listItem", "content": [{"type": "paragraph", "content": [{"type": "text", "text": "two"}]}]}
                ]},
                {"type": "codeBlock", "attrs": {"language": "rust"}, "content": [{"type": "text", "text": "let x = 1 < 2;"}]},
                {"type": "horizontalRule"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_html_rendering() {
        let html = to_html(&doc());
        assert!(html.starts_with("<h2>Hello</h2>"));
        assert!(html.contains("<p>Plain <strong>bold</strong> &amp; <a href=\"https://example.com\">site</a></p>"));
        assert!(html.contains("<ul><li><p>one</p></li><li><p>two</p></li></ul>"));
        assert!(html.contains("<pre><code class=\"language-rust\">let x = 1 &lt; 2;</code></pre>"));
        assert!(html.ends_with("<hr />"));
    }

    #[test]
    fn test_mdx_rendering() {
        let mdx = to_mdx(&doc());
        assert!(mdx.starts_with("## Hello\n\n"));
        assert!(mdx.contains("Plain **bold** & [site](https://example.com)"));
        assert!(mdx.contains("- one\n- two\n"));
        assert!(mdx.contains("```rust\nlet x = 1 < 2;\n```"));
        assert!(mdx.ends_with("---"));
    }

    #[test]
    fn test_unsafe_links_are_dropped() {
        let node = parse(&json!({
            "type": "doc",
            "content": [{"type": "paragraph", "content": [
                {"type": "text", "text": "x", "marks": [{"type": "link", "attrs": {"href": "javascript:alert(1)"}}]}
            ]}]
        }))
        .unwrap();
        assert_eq!(to_html(&node), "<p>x</p>");
    }

    #[test]
    fn test_excerpt() {
        let text = excerpt(&doc(), 12);
        assert_eq!(text, "Hello Plain…");
        assert!(parse(&json!("not a doc")).is_none());
        assert!(parse(&Value::Null).is_none());
    }
}
