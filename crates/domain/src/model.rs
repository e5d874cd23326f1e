//! Domain models and value objects

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// `$type` of a feed item reason marking a repost
pub const REASON_REPOST: &str = "app.bsky.feed.defs#reasonRepost";
/// `$type` of a quote embed view
pub const EMBED_RECORD_VIEW: &str = "app.bsky.embed.record#view";
/// `$type` of the quoted post inside a record embed view. Other record views
/// (feed generators, lists, starter packs, labelers) are not quotes.
pub const EMBED_VIEW_RECORD: &str = "app.bsky.embed.record#viewRecord";
/// `$type` of a quote embed view that also carries media
pub const EMBED_RECORD_WITH_MEDIA_VIEW: &str = "app.bsky.embed.recordWithMedia#view";
/// `$type` of an image embed view
pub const EMBED_IMAGES_VIEW: &str = "app.bsky.embed.images#view";
/// `$type` of a video embed view
pub const EMBED_VIDEO_VIEW: &str = "app.bsky.embed.video#view";

/// The account whose feed is relayed (handle or DID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeedIdentity(String);

impl FeedIdentity {
    /// Parse an identity, trimming whitespace and a leading `@`.
    /// Returns `None` when nothing is left.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Parse an identity typed by a person, accepting only what the feed API
    /// takes as an actor: a handle (`name.bsky.social`) or a DID. Login
    /// identifiers such as email addresses are rejected.
    pub fn parse_actor(input: &str) -> Option<Self> {
        let identity = Self::parse(input)?;
        let value = identity.as_str();

        let is_did = value.starts_with("did:") && !value.contains(char::is_whitespace);
        let is_handle = value.contains('.')
            && !value.starts_with('.')
            && !value.ends_with('.')
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

        (is_did || is_handle).then_some(identity)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FeedIdentity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| "feed identity must not be empty".to_string())
    }
}

impl From<FeedIdentity> for String {
    fn from(identity: FeedIdentity) -> Self {
        identity.0
    }
}

/// Channel a post is relayed into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(String);

impl Destination {
    /// Parse a channel reference: either a raw snowflake (`123`) or a channel
    /// mention (`<#123>`).
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let id = trimmed
            .strip_prefix("<#")
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(trimmed);

        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            Some(Self(id.to_string()))
        } else {
            None
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<#{}>", self.0)
    }
}

/// One item of an author feed, as returned by the feed provider
/// (`app.bsky.feed.defs#feedViewPost`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPost {
    #[serde(default)]
    pub post: PostView,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FeedReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
}

impl RawPost {
    /// The identifier used for deduplication (the post's AT-URI)
    pub fn id(&self) -> &str {
        &self.post.uri
    }

    pub fn is_repost(&self) -> bool {
        self.reason
            .as_ref()
            .is_some_and(|reason| reason.kind == REASON_REPOST)
    }

    pub fn reply_parent(&self) -> Option<&ReplyParent> {
        self.reply.as_ref().and_then(|reply| reply.parent.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostView {
    #[serde(default)]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(default)]
    pub author: ProfileView,
    #[serde(default)]
    pub record: PostRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedView>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileView {
    #[serde(default)]
    pub did: String,
    #[serde(default)]
    pub handle: String,
    #[serde(
        rename = "displayName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// The post record (`app.bsky.feed.post`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedView>,
}

/// Embed block. Covers both record-level embeds and hydrated `#view` embeds;
/// which fields are populated depends on `kind`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedView {
    #[serde(rename = "$type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Box<EmbeddedRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Box<EmbedView>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullsize: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
    #[serde(default)]
    pub alt: String,
}

/// A record referenced from an embed. For a quote view this is the
/// `#viewRecord` of the quoted post; inside `recordWithMedia` it wraps another
/// level of `record`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddedRecord {
    #[serde(rename = "$type", default)]
    pub kind: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<ProfileView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<PostRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<EmbedView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Box<EmbeddedRecord>>,
}

impl EmbeddedRecord {
    /// A quoted post with content. Deleted, blocked or detached quotes and
    /// embedded non-post records do not qualify.
    pub fn is_quoted_post(&self) -> bool {
        self.kind == EMBED_VIEW_RECORD
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedReason {
    #[serde(rename = "$type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<ProfileView>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ReplyParent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<ReplyParent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyParent {
    #[serde(default)]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<ProfileView>,
}

/// How the content of a normalized post was selected.
///
/// Replies are not a kind of their own: any kind can be a reply, which is
/// carried by [`NormalizedPost::reply_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    /// The account's own post
    Original,
    /// Someone else's post, reposted; content is the original
    Repost,
    /// A post quoting another; content is the quoted post
    Quote,
}

/// Media attached to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Media {
    Image {
        url: String,
    },
    Video {
        playlist_url: String,
        thumbnail_url: Option<String>,
    },
}

impl Media {
    /// Image shown as the preview: the picture itself, or the video thumbnail
    pub fn preview_url(&self) -> Option<&str> {
        match self {
            Media::Image { url } => Some(url),
            Media::Video { thumbnail_url, .. } => thumbnail_url.as_deref(),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Media::Video { .. })
    }
}

/// Parent of a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyContext {
    pub parent_handle: String,
    pub parent_url: String,
}

/// Channel-agnostic representation of a post, ready for delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedPost {
    /// Feed identifier of the relayed item (AT-URI)
    pub id: String,
    pub kind: PostKind,
    pub display_name: String,
    pub author_handle: String,
    /// Post text with hashtags rendered as markdown links
    pub body_text: String,
    pub post_url: String,
    /// Creation time in the display timezone
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub avatar_url: Option<String>,
    pub media: Option<Media>,
    pub reply_context: Option<ReplyContext>,
    /// Prefix shown above the post ("Repost:", "Quote:", reply attribution)
    pub leading_label: String,
    /// Handle of the account that reposted, for reposts
    pub reposted_by: Option<String>,
}

impl NormalizedPost {
    pub fn is_reply(&self) -> bool {
        self.reply_context.is_some()
    }

    pub fn media_url(&self) -> Option<&str> {
        self.media.as_ref().and_then(Media::preview_url)
    }

    /// Label of the link field; the link itself always targets the post page
    pub fn link_label(&self) -> &'static str {
        if self.media.as_ref().is_some_and(Media::is_video) {
            "Video Link"
        } else {
            "Post Link"
        }
    }
}

/// Persisted dedup checkpoint for one identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollCheckpoint {
    pub identity: FeedIdentity,
    pub last_emitted_post_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Who asked for a manual fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requester {
    pub id: Option<String>,
    /// Holds administrative rights in the destination
    pub elevated: bool,
}

impl Requester {
    pub fn elevated(id: Option<String>) -> Self {
        Self { id, elevated: true }
    }

    pub fn member(id: Option<String>) -> Self {
        Self {
            id,
            elevated: false,
        }
    }
}

/// Who can see a delivered post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Posted to the destination channel
    Everyone,
    /// Shown to the requester only
    #[default]
    RequesterOnly,
}

impl Visibility {
    /// Only elevated requesters may publish a manual fetch for everyone
    pub fn permitted_for(self, requester: &Requester) -> Self {
        match self {
            Visibility::Everyone if !requester.elevated => Visibility::RequesterOnly,
            other => other,
        }
    }

    pub fn is_public(self) -> bool {
        self == Visibility::Everyone
    }
}

/// Outcome of one pass through the relay pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Prerequisites missing; nothing was fetched
    Skipped { reason: String },
    /// The account has no posts
    NotFound,
    /// The latest post was already emitted
    Unchanged { post_id: String },
    /// The latest post was delivered
    Emitted {
        post_id: String,
        kind: PostKind,
        delivery_id: String,
    },
}
