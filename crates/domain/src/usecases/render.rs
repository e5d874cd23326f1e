//! Rendering use case - turns a normalized post into a platform-neutral card

use time::format_description::well_known::Rfc3339;

use crate::model::{NormalizedPost, PostKind};

pub const COLOR_ORIGINAL: u32 = 0x2ecc71;
pub const COLOR_REPOST: u32 = 0x3498db;
pub const COLOR_QUOTE: u32 = 0xe67e22;

/// Configuration for the renderer
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Maximum characters of the card description
    pub max_description_chars: usize,
    /// Text of the link in the card field
    pub link_text: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_description_chars: 4096,
            link_text: "View Post".to_string(),
        }
    }
}

/// Single named field of a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardField {
    pub name: String,
    pub value: String,
}

/// Rich message ready to be mapped onto a platform payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCard {
    /// Plain message text shown above the card
    pub content: String,
    pub title: String,
    pub url: String,
    pub description: String,
    /// RFC 3339 with the display offset
    pub timestamp: String,
    pub color: u32,
    pub thumbnail_url: Option<String>,
    pub image_url: Option<String>,
    pub fields: Vec<CardField>,
}

/// Renderer for normalized posts
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Build the card for a post. `notice` is prepended to the content as a heading.
    pub fn card(&self, post: &NormalizedPost, notice: Option<&str>) -> PostCard {
        let content = match notice {
            Some(notice) => format!("### {}\n{}", notice, post.leading_label),
            None => post.leading_label.clone(),
        };

        PostCard {
            content,
            title: post.display_name.clone(),
            url: post.post_url.clone(),
            description: self.truncate(&post.body_text),
            timestamp: post.created_at.format(&Rfc3339).unwrap_or_default(),
            color: color_for(post.kind),
            thumbnail_url: post.avatar_url.clone(),
            image_url: post.media_url().map(str::to_string),
            fields: vec![CardField {
                name: post.link_label().to_string(),
                value: format!("[{}]({})", self.config.link_text, post.post_url),
            }],
        }
    }

    /// Render a post as plain text for terminals and logs
    pub fn plain_text(&self, post: &NormalizedPost) -> String {
        let mut lines = vec![
            post.leading_label.clone(),
            format!("{} (@{})", post.display_name, post.author_handle),
        ];
        if let Some(by) = &post.reposted_by {
            lines.push(format!("Reposted by @{}", by));
        }
        if !post.body_text.is_empty() {
            lines.push(String::new());
            lines.push(self.truncate(&post.body_text));
            lines.push(String::new());
        }
        if let Some(media) = post.media_url() {
            lines.push(format!("Media: {}", media));
        }
        lines.push(format!(
            "{}: {}",
            post.link_label(),
            post.post_url
        ));
        lines.push(post.created_at.format(&Rfc3339).unwrap_or_default());

        lines.join("\n")
    }

    /// Truncate to the description limit, counting characters rather than bytes
    fn truncate(&self, text: &str) -> String {
        let max = self.config.max_description_chars;
        if text.chars().count() <= max {
            return text.to_string();
        }

        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Accent colour per post kind
pub fn color_for(kind: PostKind) -> u32 {
    match kind {
        PostKind::Original => COLOR_ORIGINAL,
        PostKind::Repost => COLOR_REPOST,
        PostKind::Quote => COLOR_QUOTE,
    }
}
