//! Post normalization - classifies a feed item and extracts the content to relay

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::model::{
    EMBED_IMAGES_VIEW, EMBED_RECORD_VIEW, EMBED_RECORD_WITH_MEDIA_VIEW, EMBED_VIDEO_VIEW,
    EmbedView, EmbeddedRecord, Media, NormalizedPost, PostKind, ProfileView, RawPost,
    ReplyContext,
};
use crate::ports::Clock;
use crate::zone::to_us_eastern;

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\w+)").expect("hashtag pattern is valid"));

const ORIGINAL_LABEL: &str = "New Bluesky post!";
const REPOST_LABEL: &str = "Repost:";
const QUOTE_LABEL: &str = "Quote:";
const UNKNOWN_HANDLE: &str = "unknown_handle";

/// Configuration for the normalizer
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Base URL of the public web app, used for post and hashtag links
    pub web_base_url: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            web_base_url: "https://bsky.app".to_string(),
        }
    }
}

/// Errors raised for feed items that cannot be relayed
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("Missing required field {0}")]
    MissingField(&'static str),
}

/// Turns raw feed items into [`NormalizedPost`]s.
///
/// Deterministic apart from the clock, which is only consulted when the post
/// carries no usable timestamp.
#[derive(Clone)]
pub struct PostNormalizer {
    clock: Arc<dyn Clock>,
    config: NormalizerConfig,
}

/// The post whose content is shown
struct Content<'a> {
    uri: &'a str,
    author: &'a ProfileView,
    text: &'a str,
    media: Option<Media>,
}

impl PostNormalizer {
    pub fn new(clock: Arc<dyn Clock>, config: NormalizerConfig) -> Self {
        let web_base_url = config.web_base_url.trim_end_matches('/').to_string();
        Self {
            clock,
            config: NormalizerConfig { web_base_url },
        }
    }

    pub fn normalize(&self, raw: &RawPost) -> Result<NormalizedPost, NormalizationError> {
        let post = &raw.post;
        if post.uri.is_empty() {
            return Err(NormalizationError::MissingField("post.uri"));
        }

        // Precedence: repost, then quote, then original
        let (kind, content) = if raw.is_repost() {
            (PostKind::Repost, own_content(raw))
        } else if let Some(quoted) = quoted_record(raw) {
            (PostKind::Quote, quoted_content(raw, quoted)?)
        } else {
            (PostKind::Original, own_content(raw))
        };

        let handle = content.author.handle.trim();
        if handle.is_empty() {
            return Err(NormalizationError::MissingField("author.handle"));
        }

        let display_name = content
            .author
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(handle)
            .to_string();

        let reply_context = raw.reply_parent().map(|parent| {
            let parent_handle = parent
                .author
                .as_ref()
                .map(|author| author.handle.trim())
                .filter(|handle| !handle.is_empty())
                .unwrap_or(UNKNOWN_HANDLE)
                .to_string();
            let parent_url = self.post_url(&parent_handle, &parent.uri);
            ReplyContext {
                parent_handle,
                parent_url,
            }
        });

        // The reply attribution wins over the repost/quote prefix
        let leading_label = match &reply_context {
            Some(reply) => format!(
                "Replying to [{}]({}):",
                reply.parent_handle, reply.parent_url
            ),
            None => match kind {
                PostKind::Original => ORIGINAL_LABEL.to_string(),
                PostKind::Repost => REPOST_LABEL.to_string(),
                PostKind::Quote => QUOTE_LABEL.to_string(),
            },
        };

        let reposted_by = match kind {
            PostKind::Repost => raw
                .reason
                .as_ref()
                .and_then(|reason| reason.by.as_ref())
                .map(|by| by.handle.clone())
                .filter(|handle| !handle.is_empty()),
            _ => None,
        };

        Ok(NormalizedPost {
            id: post.uri.clone(),
            kind,
            display_name,
            author_handle: handle.to_string(),
            body_text: self.link_hashtags(content.text),
            post_url: self.post_url(handle, content.uri),
            created_at: self.display_time(&post.record.created_at),
            avatar_url: content
                .author
                .avatar
                .clone()
                .filter(|avatar| !avatar.is_empty()),
            media: content.media,
            reply_context,
            leading_label,
            reposted_by,
        })
    }

    /// Replace every `#tag` with a markdown link to the hashtag page
    pub fn link_hashtags(&self, text: &str) -> String {
        HASHTAG
            .replace_all(text, |caps: &Captures| {
                let tag = &caps[1];
                format!("[#{}]({}/hashtag/{})", tag, self.config.web_base_url, tag)
            })
            .into_owned()
    }

    /// Web link for a post, built from its author handle and AT-URI
    pub fn post_url(&self, handle: &str, uri: &str) -> String {
        let rkey = uri.rsplit('/').next().unwrap_or(uri);
        format!(
            "{}/profile/{}/post/{}",
            self.config.web_base_url, handle, rkey
        )
    }

    fn display_time(&self, created_at: &str) -> OffsetDateTime {
        let parsed = if created_at.trim().is_empty() {
            None
        } else {
            match OffsetDateTime::parse(created_at.trim(), &Rfc3339) {
                Ok(instant) => Some(instant),
                Err(error) => {
                    tracing::debug!(created_at = %created_at, error = %error, "Unparsable post timestamp, using current time");
                    None
                }
            }
        };

        to_us_eastern(parsed.unwrap_or_else(|| self.clock.now()))
    }
}

fn own_content(raw: &RawPost) -> Content<'_> {
    Content {
        uri: &raw.post.uri,
        author: &raw.post.author,
        text: &raw.post.record.text,
        media: raw.post.embed.as_ref().and_then(media_from_embed),
    }
}

fn quoted_content<'a>(
    raw: &'a RawPost,
    quoted: &'a EmbeddedRecord,
) -> Result<Content<'a>, NormalizationError> {
    let author = quoted
        .author
        .as_ref()
        .ok_or(NormalizationError::MissingField("quote.author"))?;
    let value = quoted
        .value
        .as_ref()
        .ok_or(NormalizationError::MissingField("quote.value"))?;
    if quoted.uri.is_empty() {
        return Err(NormalizationError::MissingField("quote.uri"));
    }

    // Prefer the quoted post's own media, then media attached by the quoter
    let media = quoted
        .embeds
        .iter()
        .find_map(media_from_embed)
        .or_else(|| raw.post.embed.as_ref().and_then(media_from_embed));

    Ok(Content {
        uri: &quoted.uri,
        author,
        text: &value.text,
        media,
    })
}

/// Find the quoted record: the record-level embed is checked first, then the
/// hydrated embed view. Unavailable quotes (deleted, blocked) and embedded
/// feeds, lists or labelers do not count.
fn quoted_record(raw: &RawPost) -> Option<&EmbeddedRecord> {
    [raw.post.record.embed.as_ref(), raw.post.embed.as_ref()]
        .into_iter()
        .flatten()
        .find_map(|embed| {
            let record = match embed.kind.as_str() {
                EMBED_RECORD_VIEW => embed.record.as_deref(),
                EMBED_RECORD_WITH_MEDIA_VIEW => embed
                    .record
                    .as_deref()
                    .and_then(|outer| outer.record.as_deref()),
                _ => None,
            }?;
            record.is_quoted_post().then_some(record)
        })
}

fn media_from_embed(embed: &EmbedView) -> Option<Media> {
    match embed.kind.as_str() {
        EMBED_IMAGES_VIEW => {
            let first = embed.images.first()?;
            first
                .fullsize
                .as_deref()
                .filter(|url| !url.is_empty())
                .or_else(|| first.thumb.as_deref().filter(|url| !url.is_empty()))
                .map(|url| Media::Image {
                    url: url.to_string(),
                })
        }
        EMBED_VIDEO_VIEW => {
            let playlist_url = embed.playlist.clone().filter(|url| !url.is_empty())?;
            Some(Media::Video {
                playlist_url,
                thumbnail_url: embed.thumbnail.clone().filter(|url| !url.is_empty()),
            })
        }
        EMBED_RECORD_WITH_MEDIA_VIEW => embed.media.as_deref().and_then(media_from_embed),
        _ => None,
    }
}
