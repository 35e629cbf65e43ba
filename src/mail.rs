use std::env;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::task::JoinSet;

use crate::models::CompanionRow;

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub api_url: String,
    pub api_token: String,
    pub from: String,
}

impl MailConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("INVITE_API_URL").unwrap_or_default(),
            api_token: env::var("INVITE_API_TOKEN").unwrap_or_default(),
            from: env::var("INVITE_FROM").unwrap_or_else(|_| "stays@lodgebook.local".to_string()),
        }
    }

    pub fn enabled(&self) -> bool {
        !(self.api_url.trim().is_empty() || self.api_token.trim().is_empty())
    }
}

/// Invite every companion of a reservation that was flagged for an account
/// and has not been invited yet. Dispatches run concurrently and best-effort:
/// one failed send is logged and does not block the rest. Returns how many
/// invites went out; the `invite_sent_at` stamp is guarded so it is written
/// at most once per companion.
pub async fn send_guest_invitations(
    pool: &SqlitePool,
    config: &MailConfig,
    reservation_id: &str,
) -> usize {
    let companions = sqlx::query_as::<_, CompanionRow>(
        r#"SELECT id, reservation_id, name, relationship, age_range, email,
                  invited_to_system, invite_sent_at
           FROM companions
           WHERE reservation_id = ?
             AND invited_to_system = 1
             AND invite_sent_at IS NULL
             AND email IS NOT NULL"#,
    )
    .bind(reservation_id)
    .fetch_all(pool)
    .await
    .unwrap_or_default();

    if companions.is_empty() {
        return 0;
    }

    let mut dispatches = JoinSet::new();
    for companion in companions {
        let pool = pool.clone();
        let config = config.clone();
        dispatches.spawn(async move {
            if let Err(err) = deliver(&config, &companion).await {
                log::warn!("Invite to {} failed: {err}", companion.name);
                return false;
            }
            let stamped = sqlx::query(
                "UPDATE companions SET invite_sent_at = ? WHERE id = ? AND invite_sent_at IS NULL",
            )
            .bind(Utc::now().to_rfc3339())
            .bind(&companion.id)
            .execute(&pool)
            .await;
            match stamped {
                Ok(result) => result.rows_affected() > 0,
                Err(err) => {
                    log::warn!("Invite stamp for {} failed: {err}", companion.name);
                    false
                }
            }
        });
    }

    let mut sent = 0;
    while let Some(outcome) = dispatches.join_next().await {
        if matches!(outcome, Ok(true)) {
            sent += 1;
        }
    }
    sent
}

async fn deliver(config: &MailConfig, companion: &CompanionRow) -> Result<(), reqwest::Error> {
    let email = companion.email.as_deref().unwrap_or_default();

    if !config.enabled() {
        // No mail endpoint configured: log the invite and count it as sent.
        log::info!("Invite mail not configured; simulating invite to {email}");
        return Ok(());
    }

    let payload = serde_json::json!({
        "from": config.from,
        "to": email,
        "subject": "You're invited to the house portal",
        "text": format!(
            "Hi {},\n\nYou've been added as a companion on an upcoming stay. \
             Create your account to see arrival details and the house walkthrough.",
            companion.name
        ),
    });

    let client = reqwest::Client::new();
    client
        .post(&config.api_url)
        .bearer_auth(&config.api_token)
        .json(&payload)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}
