use std::{env, fs, future::Future, path::Path, time::Duration};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    models::{ReservationRow, Role, TaskRow, RES_CONFIRMED, RES_REJECTED, TASK_COMPLETED},
    rules,
};

pub const RESERVATION_SELECT: &str = r#"SELECT r.id, r.user_id, r.title, r.starts_on, r.ends_on,
       r.guest_count, r.status, r.notes, r.requested_at,
       u.display_name AS guest_name
  FROM reservations r
  LEFT JOIN users u ON r.user_id = u.id"#;

pub const TASK_SELECT: &str = r#"SELECT t.id, t.title, t.description, t.status, t.priority,
       t.category, t.assignee_id, t.due_date, t.recurrence_pattern, t.recurrence_interval,
       t.recurrence_end, t.parent_task_id, t.created_at, t.completed_at,
       u.display_name AS assignee_name
  FROM tasks t
  LEFT JOIN users u ON t.assignee_id = u.id"#;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

const RETRY_ATTEMPTS: u32 = 3;
const OP_TIMEOUT: Duration = Duration::from_secs(5);

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
        || matches!(err, sqlx::Error::Database(db) if db.message().contains("locked"))
}

/// Single resilience layer for store access: each attempt is bounded by a
/// timeout, and transient errors get a small fixed number of retries with
/// linear backoff. Everything else surfaces immediately.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(OP_TIMEOUT, op()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(sqlx::Error::PoolTimedOut),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < RETRY_ATTEMPTS && is_transient(&err) => {
                attempt += 1;
                log::warn!("Transient store error (attempt {attempt}): {err}");
                tokio::time::sleep(Duration::from_millis(150 * attempt as u64)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_owner(pool).await?;
    seed_property(pool).await?;
    seed_staples(pool).await?;
    seed_walkthrough(pool).await?;
    Ok(())
}

pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    user_id: Option<&str>,
    reservation_id: Option<&str>,
    task_id: Option<&str>,
) {
    let _ = sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, user_id, reservation_id, task_id)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id)
    .bind(reservation_id)
    .bind(task_id)
    .execute(pool)
    .await;
}

pub async fn fetch_reservation_event(
    pool: &SqlitePool,
    reservation_id: &str,
) -> Option<ReservationRow> {
    let query = format!("{RESERVATION_SELECT} WHERE r.id = ? LIMIT 1");
    with_retry(|| {
        sqlx::query_as::<_, ReservationRow>(&query)
            .bind(reservation_id)
            .fetch_optional(pool)
    })
    .await
    .unwrap_or(None)
}

pub async fn fetch_task(pool: &SqlitePool, task_id: &str) -> Option<TaskRow> {
    let query = format!("{TASK_SELECT} WHERE t.id = ? LIMIT 1");
    with_retry(|| {
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(task_id)
            .fetch_optional(pool)
    })
    .await
    .unwrap_or(None)
}

/// Complete a task and, when its recurrence calls for one, materialize the
/// single successor. The completion update and the successor insert are
/// independent writes; a failed spawn is logged and the completion stands.
pub async fn complete_task(
    pool: &SqlitePool,
    task_id: &str,
    actor_id: Option<&str>,
    actor_name: &str,
) -> Result<Option<(TaskRow, Option<String>)>, sqlx::Error> {
    let Some(mut task) = fetch_task(pool, task_id).await else {
        return Ok(None);
    };
    if task.status == TASK_COMPLETED {
        return Ok(Some((task, None)));
    }

    let completed_at = Utc::now().to_rfc3339();
    sqlx::query("UPDATE tasks SET status = ?, completed_at = ? WHERE id = ?")
        .bind(TASK_COMPLETED)
        .bind(&completed_at)
        .bind(task_id)
        .execute(pool)
        .await?;

    log_activity(
        pool,
        "task_completed",
        &format!("{} completed task \"{}\".", actor_name, task.title),
        actor_id,
        None,
        Some(task_id),
    )
    .await;

    let successor_id = match rules::plan_successor(&task) {
        Some(planned) => {
            let id = new_id();
            let inserted = sqlx::query(
                r#"INSERT INTO tasks (id, title, description, status, priority, category,
                       assignee_id, due_date, recurrence_pattern, recurrence_interval,
                       recurrence_end, parent_task_id, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(planned.status)
            .bind(&task.priority)
            .bind(&task.category)
            .bind(&task.assignee_id)
            .bind(planned.due_date.format("%Y-%m-%d").to_string())
            .bind(&task.recurrence_pattern)
            .bind(task.recurrence_interval)
            .bind(&task.recurrence_end)
            .bind(&planned.parent_task_id)
            .bind(Utc::now().to_rfc3339())
            .execute(pool)
            .await;

            match inserted {
                Ok(_) => {
                    log_activity(
                        pool,
                        "task_recurred",
                        &format!(
                            "Recurring task \"{}\" scheduled again for {}.",
                            task.title, planned.due_date
                        ),
                        None,
                        None,
                        Some(&id),
                    )
                    .await;
                    Some(id)
                }
                Err(err) => {
                    log::warn!("Successor insert for task {task_id} failed: {err}");
                    None
                }
            }
        }
        None => None,
    };

    task.status = TASK_COMPLETED.to_string();
    task.completed_at = Some(completed_at);
    Ok(Some((task, successor_id)))
}

/// Approve or reject a pending reservation: status update plus an approval
/// record, both logged to the activity feed.
pub async fn decide_reservation(
    pool: &SqlitePool,
    reservation_id: &str,
    approver_id: &str,
    approver_name: &str,
    approve: bool,
    note: Option<&str>,
) -> Result<Option<ReservationRow>, sqlx::Error> {
    let Some(mut reservation) = fetch_reservation_event(pool, reservation_id).await else {
        return Ok(None);
    };

    let decision = if approve { RES_CONFIRMED } else { RES_REJECTED };
    sqlx::query("UPDATE reservations SET status = ? WHERE id = ?")
        .bind(decision)
        .bind(reservation_id)
        .execute(pool)
        .await?;

    let recorded = sqlx::query(
        r#"INSERT INTO reservation_approvals (id, reservation_id, approver_id, decision, note, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(reservation_id)
    .bind(approver_id)
    .bind(decision)
    .bind(note)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await;
    if let Err(err) = recorded {
        log::warn!("Approval record for reservation {reservation_id} failed: {err}");
    }

    log_activity(
        pool,
        "reservation_decided",
        &format!(
            "{} marked \"{}\" as {}.",
            approver_name, reservation.title, decision
        ),
        Some(approver_id),
        Some(reservation_id),
        None,
    )
    .await;

    reservation.status = decision.to_string();
    Ok(Some(reservation))
}

async fn seed_owner(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>(
        "SELECT id FROM users WHERE role = ? LIMIT 1",
    )
    .bind(Role::Owner.as_str())
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Ok(());
    }

    let username = env::var("OWNER_USER").unwrap_or_else(|_| "owner".to_string());
    let password = env::var("OWNER_PASSWORD").unwrap_or_else(|_| "owner".to_string());
    let display_name =
        env::var("OWNER_DISPLAY_NAME").unwrap_or_else(|_| "Property Owner".to_string());

    if password == "owner" {
        log::warn!("OWNER_PASSWORD not set. Using default password 'owner'. Set OWNER_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, email, role, password_hash, active, created_at)
           VALUES (?, ?, ?, NULL, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(username)
    .bind(display_name)
    .bind(Role::Owner.as_str())
    .bind(password_hash)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_property(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (i64,)>("SELECT id FROM property LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let name = env::var("PROPERTY_NAME").unwrap_or_else(|_| "The Lodge".to_string());
    let address = env::var("PROPERTY_ADDRESS").unwrap_or_default();

    sqlx::query(
        r#"INSERT INTO property (id, name, address, tagline, amenities, hero_html)
           VALUES (1, ?, ?, ?, ?, ?)"#,
    )
    .bind(name)
    .bind(address)
    .bind("A shared place for family and friends.")
    .bind("Wi-Fi, full kitchen, laundry, lake access, fire pit")
    .bind(r#"<h1>Welcome to the house</h1>
<p>Request a stay, sign the guest book, and check the walkthrough before you arrive.</p>"#)
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_staples(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM default_staples LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let staples = vec![
        ("Paper towels", "Supplies", 2),
        ("Toilet paper", "Supplies", 4),
        ("Trash bags", "Supplies", 1),
        ("Dish soap", "Cleaning", 1),
        ("Laundry detergent", "Cleaning", 1),
        ("All-purpose cleaner", "Cleaning", 1),
        ("Coffee", "Pantry", 1),
        ("Olive oil", "Pantry", 1),
        ("AA batteries", "Maintenance", 4),
        ("Light bulbs", "Maintenance", 2),
    ];

    for (name, category, threshold) in staples {
        sqlx::query(
            "INSERT INTO default_staples (id, name, category, restock_threshold) VALUES (?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(name)
        .bind(category)
        .bind(threshold)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn seed_walkthrough(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT key FROM walkthrough_sections LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let sections = vec![
        ("arrival", "Arrival & check-in", 0),
        ("house-systems", "House systems", 1),
        ("departure", "Departure checklist", 2),
    ];
    for (key, title, position) in &sections {
        sqlx::query("INSERT INTO walkthrough_sections (key, title, position) VALUES (?, ?, ?)")
            .bind(key)
            .bind(title)
            .bind(position)
            .execute(pool)
            .await?;
    }

    let steps = vec![
        ("arrival", 0, "Lockbox", "The lockbox is on the left porch rail. The code is shared with your confirmation."),
        ("arrival", 1, "Main breaker", "If the house has no power, the breaker panel is in the mudroom closet."),
        ("house-systems", 0, "Thermostat", "Keep it at 62°F when leaving in winter. Do not shut the furnace off."),
        ("house-systems", 1, "Water shutoff", "The main shutoff valve is in the basement, front-left corner."),
        ("departure", 0, "Trash", "Bag all trash and put bins at the end of the driveway; pickup is Monday."),
        ("departure", 1, "Linens", "Strip used beds and start one load of towels before you leave."),
    ];
    for (section, position, title, body) in steps {
        sqlx::query(
            "INSERT INTO walkthrough_steps (id, section_key, position, title, body) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(section)
        .bind(position)
        .bind(title)
        .bind(body)
        .execute(pool)
        .await?;
    }

    Ok(())
}
