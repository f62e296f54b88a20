use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::feed::NotificationSource;
use crate::models::Notification;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let now = Utc::now();
    let notifications = vec![
        (
            Uuid::parse_str("6b1f0f8e-58a4-4d6e-9a59-0c3c1e0f5a11")?,
            "2021-0001",
            "Library clearance signed",
            "Your library requirement was signed by the librarian.",
            true,
            now - Duration::days(2),
        ),
        (
            Uuid::parse_str("a2c94d1b-7f0e-4b8f-8d2c-5e7a9b3c4d22")?,
            "2021-0001",
            "Outstanding balance",
            "The cashier marked your tuition requirement as incomplete.",
            false,
            now - Duration::hours(5),
        ),
        (
            Uuid::parse_str("f4e3d2c1-b0a9-4877-9665-5443c2b1a033")?,
            "2021-0002",
            "Examination permit issued",
            "Your QR examination permit is ready for download.",
            false,
            now - Duration::hours(1),
        ),
    ];

    for (id, user_id, title, message, is_read, created_at) in notifications {
        sqlx::query(
            r#"
            INSERT INTO clearance_desk.notifications
            (id, user_id, title, message, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(is_read)
        .bind(created_at)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn insert_notification(
    pool: &PgPool,
    user_id: &str,
    title: &str,
    message: &str,
) -> anyhow::Result<Notification> {
    let row = sqlx::query(
        r#"
        INSERT INTO clearance_desk.notifications
        (id, user_id, title, message, is_read, created_at)
        VALUES ($1, $2, $3, $4, FALSE, NOW())
        RETURNING id, user_id, title, message, is_read, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(title)
    .bind(message)
    .fetch_one(pool)
    .await
    .context("failed to insert notification")?;

    Ok(notification_from_row(&row))
}

pub async fn fetch_notifications(pool: &PgPool, user_id: &str) -> anyhow::Result<Vec<Notification>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, title, message, is_read, created_at
        FROM clearance_desk.notifications
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(notification_from_row).collect())
}

pub async fn mark_all_read(pool: &PgPool, user_id: &str) -> anyhow::Result<u64> {
    let result = sqlx::query(
        "UPDATE clearance_desk.notifications SET is_read = TRUE \
         WHERE user_id = $1 AND is_read = FALSE",
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn notification_from_row(row: &sqlx::postgres::PgRow) -> Notification {
    let created_at: DateTime<Utc> = row.get("created_at");
    Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        message: row.get("message"),
        is_read: row.get("is_read"),
        created_at,
    }
}

pub struct PgNotificationSource {
    pool: PgPool,
}

impl PgNotificationSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSource for PgNotificationSource {
    async fn snapshot(&self, user_id: &str) -> anyhow::Result<Vec<Notification>> {
        fetch_notifications(&self.pool, user_id).await
    }
}
