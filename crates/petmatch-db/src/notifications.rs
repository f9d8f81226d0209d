//! Notification repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use petmatch_core::{Error, NewNotification, Notification, NotificationRepository, Result};

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, found_record_id, lost_record_id, \
     similarity, title, message, kind, data, created_at, read_at";

/// PostgreSQL implementation of [`NotificationRepository`].
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn notification_from_row(row: &PgRow) -> Notification {
    Notification {
        id: row.get("id"),
        recipient_id: row.get("recipient_id"),
        found_record_id: row.get("found_record_id"),
        lost_record_id: row.get("lost_record_id"),
        similarity: row.get("similarity"),
        title: row.get("title"),
        message: row.get("message"),
        kind: row.get("kind"),
        data: row.get("data"),
        created_at: row.get("created_at"),
        read_at: row.get("read_at"),
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert(&self, notification: NewNotification) -> Result<Notification> {
        let sql = format!(
            "INSERT INTO notification (id, recipient_id, found_record_id, lost_record_id, \
             similarity, title, message, kind, data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::now_v7())
            .bind(&notification.recipient_id)
            .bind(notification.found_record_id)
            .bind(notification.lost_record_id)
            .bind(notification.similarity)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(petmatch_core::NOTIFICATION_KIND_PET_MATCH)
            .bind(&notification.data)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(notification_from_row(&row))
    }

    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let sql = format!(
            "SELECT {} FROM notification
             WHERE recipient_id = $1 AND ($2 = FALSE OR read_at IS NULL)
             ORDER BY created_at DESC
             LIMIT $3",
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(recipient_id)
            .bind(unread_only)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.iter().map(notification_from_row).collect())
    }

    async fn mark_read(&self, id: Uuid) -> Result<Notification> {
        let sql = format!(
            "UPDATE notification SET read_at = COALESCE(read_at, now())
             WHERE id = $1
             RETURNING {}",
            NOTIFICATION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("Notification {} not found", id)))?;
        Ok(notification_from_row(&row))
    }
}
