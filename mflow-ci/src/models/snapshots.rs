//! Snapshot payload types produced by the content-discovery workflows
//!
//! The upstream emits counters as strings ("12345"), so every counter
//! field here is an optional string; coercion to integers happens during
//! reconciliation and degrades to defaults on malformed values.

use serde::{Deserialize, Serialize};

use crate::models::RequestContext;

/// Category response wrapper carried by the push ingestion endpoints.
///
/// Mirrors the shape the workflow delivers after its own decode step:
/// an entity-specific `data` payload plus the upstream status fields.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotResponse<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub tips: Option<String>,
    pub data: T,
}

/// One note as it appears in search results and author-note listings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteSnapshot {
    pub note_id: String,
    pub note_url: Option<String>,
    pub note_access_token: Option<String>,
    pub author_user_id: Option<String>,
    pub author_nick_name: Option<String>,
    pub author_avatar: Option<String>,
    pub author_home_page_url: Option<String>,
    pub note_display_title: Option<String>,
    pub note_cover_url_pre: Option<String>,
    pub note_cover_url_default: Option<String>,
    pub note_cover_width: Option<String>,
    pub note_cover_height: Option<String>,
    pub note_liked_count: Option<String>,
    pub note_liked: Option<bool>,
    pub note_card_type: Option<String>,
    pub note_model_type: Option<String>,
}

/// Long-form note detail from a detail-fetch workflow
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteDetailSnapshot {
    pub note_id: String,
    pub note_url: Option<String>,
    pub author_user_id: Option<String>,
    pub author_nick_name: Option<String>,
    pub author_avatar: Option<String>,
    pub author_home_page_url: Option<String>,
    pub note_display_title: Option<String>,
    pub note_desc: Option<String>,
    pub note_create_time: Option<String>,
    pub note_last_update_time: Option<String>,
    pub note_model_type: Option<String>,
    pub note_card_type: Option<String>,
    pub comment_count: Option<String>,
    pub note_liked_count: Option<String>,
    pub share_count: Option<String>,
    pub collected_count: Option<String>,
    pub video_id: Option<String>,
    pub video_h264_url: Option<String>,
    pub video_h265_url: Option<String>,
    pub note_duration: Option<String>,
    pub note_image_list: Option<Vec<String>>,
    pub note_tags: Option<Vec<String>>,
    pub note_liked: Option<bool>,
    pub collected: Option<bool>,
}

/// Detail payload nests the note under a `note` field
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NoteDetailData {
    pub note: NoteDetailSnapshot,
}

/// A user mentioned inside a comment
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MentionSnapshot {
    pub at_user_id: String,
    pub at_user_nickname: Option<String>,
    pub at_user_home_page_url: Option<String>,
}

/// One comment, possibly carrying a nested reply tree
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CommentSnapshot {
    pub comment_id: String,
    pub note_id: String,
    pub comment_user_id: String,
    pub comment_user_nickname: Option<String>,
    pub comment_user_image: Option<String>,
    pub comment_user_home_page_url: Option<String>,
    pub comment_content: Option<String>,
    pub comment_like_count: Option<String>,
    pub comment_sub_comment_count: Option<String>,
    pub comment_create_time: Option<String>,
    #[serde(default)]
    pub comment_liked: Option<bool>,
    pub comment_show_tags: Option<Vec<String>>,
    pub comment_sub_comment_cursor: Option<String>,
    #[serde(default)]
    pub comment_sub_comment_has_more: Option<bool>,
    #[serde(default)]
    pub comment_at_users: Vec<MentionSnapshot>,
    #[serde(default)]
    pub comment_sub: Vec<CommentSnapshot>,
}

/// Comments payload: top-level comments plus pagination state
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommentsData {
    pub comments: Vec<CommentSnapshot>,
    pub cursor: Option<String>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

/// Author profile as delivered by the author-notes workflow
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthorInfoSnapshot {
    pub user_id: String,
    pub nick_name: Option<String>,
    pub avatar: Option<String>,
    pub user_link_url: Option<String>,
    pub desc: Option<String>,
    pub interaction: Option<String>,
    pub ip_location: Option<String>,
    pub platform_uid: Option<String>,
    pub tags: Option<Vec<String>>,
    pub fans: Option<String>,
    pub follows: Option<String>,
    pub gender: Option<String>,
}

/// Author-notes payload: profile plus note listing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthorNotesData {
    pub notes: Vec<NoteSnapshot>,
    pub author_info: AuthorInfoSnapshot,
    pub cursor: Option<String>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

/// One topic-discussion metric sample
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TopicSnapshot {
    pub name: String,
    pub view_num: Option<i64>,
    pub discuss_num: Option<i64>,
}

/// Topics payload
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicsData {
    pub topic_list: Vec<TopicSnapshot>,
}

/// POST /openapi/search_note request body
#[derive(Debug, Clone, Deserialize)]
pub struct SearchNoteRequest {
    pub req_info: RequestContext,
    pub req_body: SnapshotResponse<Vec<NoteSnapshot>>,
}

/// POST /openapi/note_detail request body
#[derive(Debug, Clone, Deserialize)]
pub struct NoteDetailRequest {
    pub req_info: RequestContext,
    pub req_body: SnapshotResponse<NoteDetailData>,
}

/// POST /openapi/comments request body
#[derive(Debug, Clone, Deserialize)]
pub struct CommentsRequest {
    pub req_info: RequestContext,
    pub req_body: SnapshotResponse<CommentsData>,
}

/// POST /openapi/author_notes request body
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorNotesRequest {
    pub req_info: RequestContext,
    pub req_body: SnapshotResponse<AuthorNotesData>,
}

/// POST /openapi/topics request body
#[derive(Debug, Clone, Deserialize)]
pub struct TopicsRequest {
    pub req_info: RequestContext,
    pub req_body: SnapshotResponse<TopicsData>,
}
