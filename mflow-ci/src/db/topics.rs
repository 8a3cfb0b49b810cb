//! Topic discussion metrics persistence
//!
//! One row per (topic name, calendar date); same-day re-ingestion
//! overwrites the metrics instead of inserting a duplicate.

use anyhow::Result;
use sqlx::{Executor, Sqlite};
use std::collections::HashMap;

use crate::db::placeholders;

/// Topic discussion row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TopicDiscussion {
    pub topic_name: String,
    pub metric_date: String,
    pub view_count: i64,
    pub discuss_count: i64,
}

/// A topic selected for harvesting
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrendingTopic {
    pub topic_name: String,
    pub view_count: i64,
}

/// Insert or overwrite the metrics for (topic, date)
pub async fn upsert_topic<'e, E>(db: E, topic: &TopicDiscussion) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO topic_discussions (
            topic_name, metric_date, view_count, discuss_count, created_at, updated_at
        ) VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(topic_name, metric_date) DO UPDATE SET
            view_count = excluded.view_count,
            discuss_count = excluded.discuss_count,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&topic.topic_name)
    .bind(&topic.metric_date)
    .bind(topic.view_count)
    .bind(topic.discuss_count)
    .execute(db)
    .await?;

    Ok(())
}

/// Bulk lookup of same-day rows for the names referenced by a batch
pub async fn load_topics_for_date<'e, E>(
    db: E,
    names: &[String],
    metric_date: &str,
) -> Result<HashMap<String, TopicDiscussion>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if names.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        r#"
        SELECT topic_name, metric_date, view_count, discuss_count
        FROM topic_discussions
        WHERE metric_date = ? AND topic_name IN ({})
        "#,
        placeholders(names.len())
    );

    let mut query = sqlx::query_as::<_, TopicDiscussion>(&sql).bind(metric_date);
    for name in names {
        query = query.bind(name);
    }

    let rows = query.fetch_all(db).await?;
    Ok(rows.into_iter().map(|t| (t.topic_name.clone(), t)).collect())
}

/// Select the harvest worklist: topics above the view threshold, ranked
/// by views, capped at `limit`.
pub async fn load_trending_topics<'e, E>(
    db: E,
    min_view_count: i64,
    limit: i64,
) -> Result<Vec<TrendingTopic>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, TrendingTopic>(
        r#"
        SELECT topic_name, MAX(view_count) AS view_count
        FROM topic_discussions
        WHERE view_count > ?
        GROUP BY topic_name
        ORDER BY view_count DESC
        LIMIT ?
        "#,
    )
    .bind(min_view_count)
    .bind(limit)
    .fetch_all(db)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_day_upsert_overwrites() {
        let pool = crate::db::test_pool().await;

        let mut topic = TopicDiscussion {
            topic_name: "topicA".to_string(),
            metric_date: "2025-06-01".to_string(),
            view_count: 50000,
            discuss_count: 10,
        };
        upsert_topic(&pool, &topic).await.unwrap();

        topic.view_count = 60000;
        upsert_topic(&pool, &topic).await.unwrap();

        let rows = load_topics_for_date(&pool, &["topicA".to_string()], "2025-06-01")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows["topicA"].view_count, 60000);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topic_discussions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn trending_selection_ranks_and_caps() {
        let pool = crate::db::test_pool().await;

        for (name, views) in [("low", 500), ("mid", 20000), ("high", 90000), ("top", 150000)] {
            let topic = TopicDiscussion {
                topic_name: name.to_string(),
                metric_date: "2025-06-01".to_string(),
                view_count: views,
                discuss_count: 0,
            };
            upsert_topic(&pool, &topic).await.unwrap();
        }

        let trending = load_trending_topics(&pool, 10000, 2).await.unwrap();
        assert_eq!(trending.len(), 2);
        assert_eq!(trending[0].topic_name, "top");
        assert_eq!(trending[1].topic_name, "high");
    }

    #[tokio::test]
    async fn negative_view_count_violates_check() {
        let pool = crate::db::test_pool().await;

        let topic = TopicDiscussion {
            topic_name: "broken".to_string(),
            metric_date: "2025-06-01".to_string(),
            view_count: -1,
            discuss_count: 0,
        };
        assert!(upsert_topic(&pool, &topic).await.is_err());
    }
}
