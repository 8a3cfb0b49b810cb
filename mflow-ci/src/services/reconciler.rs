//! Reconciliation engine
//!
//! Maps decoded snapshot batches onto persisted rows: bulk existence
//! lookup per entity type, get-or-create-or-update through an in-batch
//! staging map, dependency-ordered flush, one transaction per batch.
//!
//! Per-item construction failures are recorded and skipped without
//! aborting the batch; any database failure during flush or commit drops
//! the transaction wholesale, so a batch is never partially persisted.
//!
//! Cross-batch concurrency is not coordinated here: two overlapping
//! batches race with last-writer-wins semantics at the store level.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::db::authors::{load_authors_by_ids, upsert_author, Author, AuthorPatch};
use crate::db::comments::{
    load_comments_by_ids, upsert_comment, upsert_mention, Comment, CommentMention, CommentPatch,
};
use crate::db::keyword_groups::{
    canonical_keyword_key, find_group_by_keywords, insert_group, upsert_membership, KeywordGroup,
};
use crate::db::note_details::{load_note_detail, upsert_note_detail, NoteDetail, NoteDetailPatch};
use crate::db::notes::{load_notes_by_ids, upsert_note, Note, NotePatch};
use crate::db::topics::{load_topics_for_date, upsert_topic, TopicDiscussion};
use crate::models::{
    context_str, AuthorInfoSnapshot, AuthorNotesData, CommentSnapshot, CommentsData,
    NoteDetailData, NoteDetailSnapshot, NoteSnapshot, RequestContext, TopicsData,
};

/// Result of reconciling one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// External identifiers persisted by this batch, in input order
    pub persisted: Vec<String>,
    /// Items skipped because their snapshot failed construction
    pub errors: Vec<ItemError>,
}

/// One skipped item: malformed or incomplete snapshot data
#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    pub id: String,
    pub message: String,
}

/// Reconciliation engine over the content store
pub struct Reconciler {
    db: SqlitePool,
}

impl Reconciler {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Reconcile a search-result snapshot: authors, notes, and the
    /// keyword group derived from the request context.
    pub async fn reconcile_search(
        &self,
        req: &RequestContext,
        items: &[NoteSnapshot],
    ) -> Result<BatchOutcome> {
        // Fresh transaction per batch; a failed flush drops it wholesale.
        let mut tx = self.db.begin().await?;
        let mut outcome = BatchOutcome::default();

        let (authors, notes) = stage_note_batch(&mut tx, items, &mut outcome).await?;

        let group = match context_str(req, "keywords") {
            Some(keyword) => Some(get_or_create_group(&mut tx, &[keyword.to_string()]).await?),
            None => None,
        };

        flush_note_batch(&mut tx, &authors, &notes).await?;

        if let Some(group) = &group {
            for note_id in &outcome.persisted {
                upsert_membership(&mut *tx, group.group_id, note_id).await?;
            }
        }

        tx.commit().await?;

        tracing::info!(
            stored = outcome.persisted.len(),
            skipped = outcome.errors.len(),
            "Search snapshot reconciled"
        );

        Ok(outcome)
    }

    /// Reconcile an author-notes snapshot: the full author profile plus
    /// their note listing.
    pub async fn reconcile_author_notes(
        &self,
        _req: &RequestContext,
        data: &AuthorNotesData,
    ) -> Result<BatchOutcome> {
        let mut tx = self.db.begin().await?;
        let mut outcome = BatchOutcome::default();

        let (mut authors, notes) = stage_note_batch(&mut tx, &data.notes, &mut outcome).await?;

        match author_profile_patch(&data.author_info) {
            Ok(patch) => {
                if !authors.contains_key(&patch.author_id) {
                    let loaded =
                        load_authors_by_ids(&mut *tx, std::slice::from_ref(&patch.author_id))
                            .await?;
                    authors.extend(loaded);
                }
                stage_author(&mut authors, patch);
            }
            Err(message) => {
                tracing::warn!(
                    author_id = %data.author_info.user_id,
                    message = %message,
                    "Skipping malformed author profile"
                );
                outcome.errors.push(ItemError {
                    id: data.author_info.user_id.clone(),
                    message,
                });
            }
        }

        flush_note_batch(&mut tx, &authors, &notes).await?;
        tx.commit().await?;

        tracing::info!(
            author_id = %data.author_info.user_id,
            stored = outcome.persisted.len(),
            skipped = outcome.errors.len(),
            "Author-notes snapshot reconciled"
        );

        Ok(outcome)
    }

    /// Reconcile a note-detail snapshot. The owning note (and its author)
    /// are created in the same batch when they were never seen before.
    pub async fn reconcile_note_detail(
        &self,
        _req: &RequestContext,
        data: &NoteDetailData,
    ) -> Result<BatchOutcome> {
        let mut tx = self.db.begin().await?;
        let mut outcome = BatchOutcome::default();
        let item = &data.note;

        let patch = match detail_patch(item) {
            Ok(patch) => patch,
            Err(message) => {
                tracing::warn!(note_id = %item.note_id, message = %message, "Skipping malformed note detail");
                outcome.errors.push(ItemError {
                    id: item.note_id.clone(),
                    message,
                });
                tx.commit().await?;
                return Ok(outcome);
            }
        };
        let note_id = patch.note_id.clone();

        let mut notes = load_notes_by_ids(&mut *tx, std::slice::from_ref(&note_id)).await?;
        let note_patch = note_patch_from_detail(item);
        match notes.get_mut(&note_id) {
            Some(existing) => existing.apply(&note_patch),
            None => {
                // detail for an unseen note: stage the note, which needs
                // a resolvable author
                let author_id = match non_empty(&item.author_user_id) {
                    Some(author_id) => author_id,
                    None => {
                        let message = "detail for unknown note lacks an author reference".to_string();
                        tracing::warn!(note_id = %note_id, "{}", message);
                        outcome.errors.push(ItemError { id: note_id, message });
                        tx.commit().await?;
                        return Ok(outcome);
                    }
                };
                let existing_authors =
                    load_authors_by_ids(&mut *tx, std::slice::from_ref(&author_id)).await?;
                if !existing_authors.contains_key(&author_id) {
                    let author = Author::from_patch(AuthorPatch {
                        author_id: author_id.clone(),
                        nickname: non_empty(&item.author_nick_name),
                        avatar_url: non_empty(&item.author_avatar),
                        home_page_url: non_empty(&item.author_home_page_url),
                        ..Default::default()
                    });
                    upsert_author(&mut *tx, &author).await?;
                }
                notes.insert(note_id.clone(), Note::from_patch(note_patch));
            }
        }

        for note in notes.values() {
            upsert_note(&mut *tx, note).await?;
        }

        let detail = match load_note_detail(&mut *tx, &note_id).await? {
            Some(mut existing) => {
                existing.apply(&patch);
                existing
            }
            None => NoteDetail::from_patch(patch),
        };
        upsert_note_detail(&mut *tx, &detail).await?;

        outcome.persisted.push(note_id.clone());
        tx.commit().await?;

        tracing::info!(note_id = %note_id, "Note detail reconciled");

        Ok(outcome)
    }

    /// Reconcile a comment snapshot: trees are flattened parents-first,
    /// mentions land after their comment.
    pub async fn reconcile_comments(
        &self,
        _req: &RequestContext,
        data: &CommentsData,
    ) -> Result<BatchOutcome> {
        let mut tx = self.db.begin().await?;
        let mut outcome = BatchOutcome::default();

        let flattened = flatten_comment_tree(&data.comments);

        let comment_ids: Vec<String> = {
            let mut seen = HashSet::new();
            flattened
                .iter()
                .map(|f| f.snapshot.comment_id.trim().to_string())
                .filter(|id| !id.is_empty() && seen.insert(id.clone()))
                .collect()
        };

        let mut comments = load_comments_by_ids(&mut *tx, &comment_ids).await?;
        let mut order: Vec<String> = Vec::new();
        let mut mentions: Vec<CommentMention> = Vec::new();
        let mut seen = HashSet::new();

        for flat in &flattened {
            match comment_patch(flat.snapshot, flat.parent_id.clone()) {
                Ok(patch) => {
                    let id = patch.comment_id.clone();
                    match comments.get_mut(&id) {
                        Some(existing) => existing.apply(&patch),
                        None => {
                            comments.insert(id.clone(), Comment::from_patch(patch));
                        }
                    }
                    if seen.insert(id.clone()) {
                        order.push(id.clone());
                        outcome.persisted.push(id.clone());
                    }
                    for mention in &flat.snapshot.comment_at_users {
                        if mention.at_user_id.trim().is_empty() {
                            continue;
                        }
                        mentions.push(CommentMention {
                            comment_id: id.clone(),
                            user_id: mention.at_user_id.clone(),
                            user_nickname: non_empty(&mention.at_user_nickname),
                            user_home_page_url: non_empty(&mention.at_user_home_page_url),
                        });
                    }
                }
                Err(message) => {
                    tracing::warn!(
                        comment_id = %flat.snapshot.comment_id,
                        message = %message,
                        "Skipping malformed comment"
                    );
                    outcome.errors.push(ItemError {
                        id: flat.snapshot.comment_id.clone(),
                        message,
                    });
                }
            }
        }

        // parents flush before children, mentions after all comments
        for id in &order {
            if let Some(comment) = comments.get(id) {
                upsert_comment(&mut *tx, comment).await?;
            }
        }
        for mention in &mentions {
            upsert_mention(&mut *tx, mention).await?;
        }

        tx.commit().await?;

        tracing::info!(
            stored = outcome.persisted.len(),
            skipped = outcome.errors.len(),
            "Comment snapshot reconciled"
        );

        Ok(outcome)
    }

    /// Reconcile a topic snapshot: one row per (topic, today), same-day
    /// re-ingestion overwrites the metrics.
    pub async fn reconcile_topics(
        &self,
        _req: &RequestContext,
        data: &TopicsData,
    ) -> Result<BatchOutcome> {
        let mut tx = self.db.begin().await?;
        let mut outcome = BatchOutcome::default();

        let today = Utc::now().format("%Y-%m-%d").to_string();

        let names: Vec<String> = {
            let mut seen = HashSet::new();
            data.topic_list
                .iter()
                .map(|t| t.name.trim().to_string())
                .filter(|n| !n.is_empty() && seen.insert(n.clone()))
                .collect()
        };

        let mut topics = load_topics_for_date(&mut *tx, &names, &today).await?;
        let mut order: Vec<String> = Vec::new();
        let mut seen = HashSet::new();

        for item in &data.topic_list {
            let name = item.name.trim();
            if name.is_empty() {
                outcome.errors.push(ItemError {
                    id: item.name.clone(),
                    message: "missing topic name".to_string(),
                });
                continue;
            }
            match topics.get_mut(name) {
                Some(existing) => {
                    if let Some(views) = item.view_num {
                        existing.view_count = views;
                    }
                    if let Some(discussions) = item.discuss_num {
                        existing.discuss_count = discussions;
                    }
                }
                None => {
                    topics.insert(
                        name.to_string(),
                        TopicDiscussion {
                            topic_name: name.to_string(),
                            metric_date: today.clone(),
                            view_count: item.view_num.unwrap_or(0),
                            discuss_count: item.discuss_num.unwrap_or(0),
                        },
                    );
                }
            }
            if seen.insert(name.to_string()) {
                order.push(name.to_string());
                outcome.persisted.push(name.to_string());
            }
        }

        for name in &order {
            upsert_topic(&mut *tx, &topics[name]).await?;
        }

        tx.commit().await?;

        tracing::info!(
            stored = outcome.persisted.len(),
            skipped = outcome.errors.len(),
            "Topic snapshot reconciled"
        );

        Ok(outcome)
    }
}

// ============================================================================
// Staging helpers
// ============================================================================

/// Prefetch, construct, and stage the authors and notes of a note batch.
///
/// The staging maps double as the intra-batch identity cache: an entity
/// created by an earlier item is visible to later items, so a batch never
/// double-inserts.
async fn stage_note_batch(
    tx: &mut Transaction<'_, Sqlite>,
    items: &[NoteSnapshot],
    outcome: &mut BatchOutcome,
) -> Result<(HashMap<String, Author>, HashMap<String, Note>)> {
    let note_ids: Vec<String> = {
        let mut seen = HashSet::new();
        items
            .iter()
            .map(|i| i.note_id.trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect()
    };
    let author_ids: Vec<String> = {
        let mut seen = HashSet::new();
        items
            .iter()
            .filter_map(|i| non_empty(&i.author_user_id))
            .filter(|id| seen.insert(id.clone()))
            .collect()
    };

    // one bulk existence query per entity type
    let mut authors = load_authors_by_ids(&mut **tx, &author_ids).await?;
    let mut notes = load_notes_by_ids(&mut **tx, &note_ids).await?;

    let mut seen = HashSet::new();
    for item in items {
        match note_patches(item) {
            Ok((author_patch, note_patch)) => {
                stage_author(&mut authors, author_patch);
                stage_note(&mut notes, note_patch);
                if seen.insert(item.note_id.clone()) {
                    outcome.persisted.push(item.note_id.clone());
                }
            }
            Err(message) => {
                tracing::warn!(
                    note_id = %item.note_id,
                    message = %message,
                    "Skipping malformed note item"
                );
                outcome.errors.push(ItemError {
                    id: item.note_id.clone(),
                    message,
                });
            }
        }
    }

    Ok((authors, notes))
}

/// Flush a staged note batch in dependency order: authors before notes
async fn flush_note_batch(
    tx: &mut Transaction<'_, Sqlite>,
    authors: &HashMap<String, Author>,
    notes: &HashMap<String, Note>,
) -> Result<()> {
    for author in authors.values() {
        upsert_author(&mut **tx, author).await?;
    }
    for note in notes.values() {
        upsert_note(&mut **tx, note).await?;
    }
    Ok(())
}

fn stage_author(staged: &mut HashMap<String, Author>, patch: AuthorPatch) {
    match staged.get_mut(&patch.author_id) {
        Some(existing) => existing.apply(&patch),
        None => {
            staged.insert(patch.author_id.clone(), Author::from_patch(patch));
        }
    }
}

fn stage_note(staged: &mut HashMap<String, Note>, patch: NotePatch) {
    match staged.get_mut(&patch.note_id) {
        Some(existing) => existing.apply(&patch),
        None => {
            staged.insert(patch.note_id.clone(), Note::from_patch(patch));
        }
    }
}

/// Canonicalize, look up, and create-if-absent a keyword group
async fn get_or_create_group(
    tx: &mut Transaction<'_, Sqlite>,
    keywords: &[String],
) -> Result<KeywordGroup> {
    let key = canonical_keyword_key(keywords);

    if let Some(group) = find_group_by_keywords(&mut **tx, &key).await? {
        return Ok(group);
    }

    let group_name = format!(
        "keyword-group-{}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        &Uuid::new_v4().simple().to_string()[..8]
    );
    let group_id = insert_group(&mut **tx, &group_name, &key).await?;

    tracing::info!(group = %group_name, key = %key, "Created keyword group");

    Ok(KeywordGroup {
        group_id,
        group_name,
        keywords: key,
    })
}

// ============================================================================
// Construction: snapshot -> typed patch, with coercion
// ============================================================================

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Upstream counters arrive as strings; malformed values degrade to None
/// (and from there to the field default) instead of failing the item.
fn parse_count(raw: &Option<String>) -> Option<i64> {
    raw.as_deref().and_then(|s| s.trim().parse::<i64>().ok())
}

/// Normalize an upstream timestamp; unparseable values degrade to None
fn parse_timestamp(raw: &Option<String>) -> Option<String> {
    let raw = raw.as_deref()?.trim();
    if raw.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = chrono::NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.format("%Y-%m-%d %H:%M:%S").to_string());
        }
    }

    // epoch timestamps (seconds or milliseconds) also appear upstream
    if let Ok(numeric) = raw.parse::<i64>() {
        let secs = if numeric > 10_000_000_000 {
            numeric / 1000
        } else {
            numeric
        };
        if let Some(ts) = chrono::DateTime::from_timestamp(secs, 0) {
            return Some(ts.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string());
        }
    }

    None
}

fn json_list(list: &Option<Vec<String>>) -> Option<String> {
    list.as_ref().and_then(|l| serde_json::to_string(l).ok())
}

/// Construct the author and note patches for one listing item
fn note_patches(item: &NoteSnapshot) -> std::result::Result<(AuthorPatch, NotePatch), String> {
    let note_id = item.note_id.trim().to_string();
    if note_id.is_empty() {
        return Err("missing note_id".to_string());
    }
    let author_id =
        non_empty(&item.author_user_id).ok_or_else(|| "missing author reference".to_string())?;

    let author = AuthorPatch {
        author_id: author_id.clone(),
        nickname: non_empty(&item.author_nick_name),
        avatar_url: non_empty(&item.author_avatar),
        home_page_url: non_empty(&item.author_home_page_url),
        ..Default::default()
    };

    let note = NotePatch {
        note_id,
        author_id,
        url: non_empty(&item.note_url),
        access_token: non_empty(&item.note_access_token),
        title: non_empty(&item.note_display_title),
        cover_url_preview: non_empty(&item.note_cover_url_pre),
        cover_url_default: non_empty(&item.note_cover_url_default),
        cover_width: parse_count(&item.note_cover_width),
        cover_height: parse_count(&item.note_cover_height),
        liked_count: parse_count(&item.note_liked_count),
        liked: item.note_liked,
        card_type: non_empty(&item.note_card_type),
        model_type: non_empty(&item.note_model_type),
        author_nickname: non_empty(&item.author_nick_name),
        author_avatar_url: non_empty(&item.author_avatar),
        author_home_page_url: non_empty(&item.author_home_page_url),
    };

    Ok((author, note))
}

/// Construct the full-profile author patch from an author-notes payload
fn author_profile_patch(info: &AuthorInfoSnapshot) -> std::result::Result<AuthorPatch, String> {
    let author_id = info.user_id.trim().to_string();
    if author_id.is_empty() {
        return Err("missing author user_id".to_string());
    }

    Ok(AuthorPatch {
        author_id,
        nickname: non_empty(&info.nick_name),
        avatar_url: non_empty(&info.avatar),
        home_page_url: non_empty(&info.user_link_url),
        bio: non_empty(&info.desc),
        interaction_count: parse_count(&info.interaction),
        ip_location: non_empty(&info.ip_location),
        platform_uid: non_empty(&info.platform_uid),
        tags: json_list(&info.tags),
        fan_count: parse_count(&info.fans),
        follow_count: parse_count(&info.follows),
        gender: non_empty(&info.gender),
    })
}

/// Construct the detail patch for a detail-fetch item
fn detail_patch(item: &NoteDetailSnapshot) -> std::result::Result<NoteDetailPatch, String> {
    let note_id = item.note_id.trim().to_string();
    if note_id.is_empty() {
        return Err("missing note_id".to_string());
    }

    Ok(NoteDetailPatch {
        note_id,
        url: non_empty(&item.note_url),
        author_id: non_empty(&item.author_user_id),
        publish_time: parse_timestamp(&item.note_create_time),
        last_updated_time: parse_timestamp(&item.note_last_update_time),
        model_type: non_empty(&item.note_model_type),
        card_type: non_empty(&item.note_card_type),
        title: non_empty(&item.note_display_title),
        description: non_empty(&item.note_desc),
        comment_count: parse_count(&item.comment_count),
        liked_count: parse_count(&item.note_liked_count),
        share_count: parse_count(&item.share_count),
        collected_count: parse_count(&item.collected_count),
        video_id: non_empty(&item.video_id),
        video_url_h264: non_empty(&item.video_h264_url),
        video_url_h265: non_empty(&item.video_h265_url),
        duration_secs: parse_count(&item.note_duration),
        image_list: json_list(&item.note_image_list),
        tags: json_list(&item.note_tags),
        liked: item.note_liked,
        collected: item.collected,
    })
}

/// Summary-note fields carried by a detail snapshot
fn note_patch_from_detail(item: &NoteDetailSnapshot) -> NotePatch {
    NotePatch {
        note_id: item.note_id.trim().to_string(),
        author_id: non_empty(&item.author_user_id).unwrap_or_default(),
        url: non_empty(&item.note_url),
        title: non_empty(&item.note_display_title),
        liked_count: parse_count(&item.note_liked_count),
        liked: item.note_liked,
        card_type: non_empty(&item.note_card_type),
        model_type: non_empty(&item.note_model_type),
        author_nickname: non_empty(&item.author_nick_name),
        author_avatar_url: non_empty(&item.author_avatar),
        author_home_page_url: non_empty(&item.author_home_page_url),
        ..Default::default()
    }
}

/// Construct the patch for one flattened comment
fn comment_patch(
    item: &CommentSnapshot,
    parent_id: Option<String>,
) -> std::result::Result<CommentPatch, String> {
    let comment_id = item.comment_id.trim().to_string();
    if comment_id.is_empty() {
        return Err("missing comment_id".to_string());
    }
    let note_id = item.note_id.trim().to_string();
    if note_id.is_empty() {
        return Err("missing note reference".to_string());
    }
    let user_id = item.comment_user_id.trim().to_string();
    if user_id.is_empty() {
        return Err("missing comment user".to_string());
    }

    Ok(CommentPatch {
        comment_id,
        note_id,
        parent_comment_id: parent_id.filter(|p| !p.trim().is_empty()),
        user_id,
        user_nickname: non_empty(&item.comment_user_nickname),
        user_avatar_url: non_empty(&item.comment_user_image),
        user_home_page_url: non_empty(&item.comment_user_home_page_url),
        content: non_empty(&item.comment_content),
        like_count: parse_count(&item.comment_like_count),
        sub_comment_count: parse_count(&item.comment_sub_comment_count),
        created_time: parse_timestamp(&item.comment_create_time),
        liked: item.comment_liked,
        show_tags: json_list(&item.comment_show_tags),
        sub_comment_cursor: non_empty(&item.comment_sub_comment_cursor),
        sub_comment_has_more: item.comment_sub_comment_has_more,
    })
}

// ============================================================================
// Comment tree flattening
// ============================================================================

struct FlatComment<'a> {
    snapshot: &'a CommentSnapshot,
    parent_id: Option<String>,
}

/// Flatten a comment tree depth-first, parents before their children.
/// Parentage is carried as an explicit id, not an object reference.
fn flatten_comment_tree(roots: &[CommentSnapshot]) -> Vec<FlatComment<'_>> {
    let mut out = Vec::new();
    let mut stack: Vec<(&CommentSnapshot, Option<String>)> =
        roots.iter().rev().map(|c| (c, None)).collect();

    while let Some((snapshot, parent_id)) = stack.pop() {
        for child in snapshot.comment_sub.iter().rev() {
            stack.push((child, Some(snapshot.comment_id.clone())));
        }
        out.push(FlatComment {
            snapshot,
            parent_id,
        });
    }

    out
}
