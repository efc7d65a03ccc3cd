//! Facet-aware rich-text renderer.
//!
//! # Responsibility
//! - Turn post text plus byte-range facets into HTML markup.
//! - Collect hashtag names for tag persistence.
//!
//! # Invariants
//! - Facets are applied left to right by `byte_start`; ties keep input order.
//! - Text is sliced by UTF-8 byte offset, never by char index.
//! - Facets that are empty, out of bounds, off a char boundary or overlapping
//!   an earlier facet are rendered as plain text. Rendering never panics.
//! - All text and attribute values are HTML-escaped.

use crate::model::event::Facet;

/// Link targets used for mention and hashtag anchors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Profile page prefix; the mentioned did is appended as a path segment.
    pub profile_base_url: String,
    /// Tag page prefix; the url-encoded tag name is appended.
    pub tag_base_path: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            profile_base_url: "https://bsky.app/profile".to_string(),
            tag_base_path: "/tag".to_string(),
        }
    }
}

impl RenderOptions {
    /// Tag page location for `tag`.
    pub fn tag_href(&self, tag: &str) -> String {
        format!(
            "{}/{}",
            self.tag_base_path.trim_end_matches('/'),
            urlencoding::encode(tag)
        )
    }

    fn profile_href(&self, did: &str) -> String {
        format!("{}/{}", self.profile_base_url.trim_end_matches('/'), did)
    }
}

/// Output of [`render`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedText {
    pub markup: String,
    /// Hashtag names in left-to-right order, duplicates kept.
    pub tags: Vec<String>,
}

/// Renders `text` with `facets` applied.
///
/// Feature priority inside one facet is link, mention, then tag. Tag names
/// are collected from every facet in sorted order, even when the facet range
/// itself cannot be applied.
pub fn render(text: &str, facets: &[Facet], options: &RenderOptions) -> RenderedText {
    let mut ordered: Vec<&Facet> = facets.iter().collect();
    // stable: equal starts keep input order
    ordered.sort_by_key(|facet| facet.byte_start);

    let mut markup = String::with_capacity(text.len() + 64);
    let mut tags = Vec::new();
    let mut cursor = 0usize;

    for facet in ordered {
        tags.extend(facet.tags().map(str::to_string));

        if facet.byte_start < cursor || !is_sliceable(text, facet) {
            continue;
        }
        let Some(anchor) = anchor_for(facet, options) else {
            continue;
        };

        push_text(&mut markup, &text[cursor..facet.byte_start]);
        markup.push_str(&anchor.open);
        push_text(&mut markup, &text[facet.byte_start..facet.byte_end]);
        markup.push_str("</a>");
        cursor = facet.byte_end;
    }

    push_text(&mut markup, &text[cursor..]);

    RenderedText { markup, tags }
}

struct Anchor {
    open: String,
}

fn anchor_for(facet: &Facet, options: &RenderOptions) -> Option<Anchor> {
    if let Some(uri) = facet.link() {
        return Some(Anchor {
            open: format!(r#"<a href="{}" target="_blank">"#, escape_html(uri)),
        });
    }
    if let Some(did) = facet.mention() {
        return Some(Anchor {
            open: format!(
                r#"<a class="mention" href="{}" target="_blank">"#,
                escape_html(&options.profile_href(did))
            ),
        });
    }
    facet.tags().next().map(|tag| Anchor {
        open: format!(
            r#"<a class="hashtag" href="{}">"#,
            escape_html(&options.tag_href(tag))
        ),
    })
}

fn is_sliceable(text: &str, facet: &Facet) -> bool {
    facet.byte_start < facet.byte_end
        && facet.byte_end <= text.len()
        && text.is_char_boundary(facet.byte_start)
        && text.is_char_boundary(facet.byte_end)
}

/// Escapes `value` and turns line breaks into `<br />`.
fn push_text(out: &mut String, value: &str) {
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("<br />");
            }
            '\n' => out.push_str("<br />"),
            other => push_escaped(out, other),
        }
    }
}

/// HTML-escapes text or attribute values.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        push_escaped(&mut out, ch);
    }
    out
}

fn push_escaped(out: &mut String, ch: char) {
    match ch {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#39;"),
        other => out.push(other),
    }
}
