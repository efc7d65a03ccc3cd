//! Final post markup composition.
//!
//! Wraps rendered text in a paragraph and appends markup for the resolved
//! embed view. External link cards without a thumbnail add nothing.

use crate::render::richtext::escape_html;
use crate::resolver::EmbedView;

/// Merges rendered text markup with the embed view into the stored post text.
pub fn compose_post_markup(text_markup: &str, embed: &EmbedView) -> String {
    let mut out = format!("<p>{text_markup}</p>");

    match embed {
        EmbedView::None => {}
        EmbedView::Images(images) => {
            for image in images {
                out.push_str(&format!(
                    r#"<div><img src="{}" alt="{}" /></div>"#,
                    escape_html(&image.thumb),
                    escape_html(&image.alt)
                ));
            }
        }
        EmbedView::Video(video) => {
            out.push_str(&format!(
                r#"<div><video src="{}" alt="{}" controls></video></div>"#,
                escape_html(&video.playlist),
                escape_html(video.alt.as_deref().unwrap_or_default())
            ));
        }
        EmbedView::External(external) => {
            if let Some(thumb) = external.thumb.as_deref() {
                out.push_str(&format!(
                    r#"<div><a href="{}" target="_blank"><img src="{}" /></a></div>"#,
                    escape_html(&external.uri),
                    escape_html(thumb)
                ));
            }
        }
    }

    out
}
