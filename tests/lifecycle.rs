//! End-to-end flows over an in-memory store: the reservation approval
//! lifecycle with companion invitations, and recurring-task completion.

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use lodgebook::db;
use lodgebook::mail::{self, MailConfig};
use lodgebook::models::{Role, RES_CONFIRMED, RES_PENDING, TASK_IN_PROGRESS, TASK_PENDING};
use lodgebook::rules;

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    db::run_migrations(&pool).await.expect("migrations");
    pool
}

fn disabled_mail() -> MailConfig {
    MailConfig {
        api_url: String::new(),
        api_token: String::new(),
        from: "stays@example.test".to_string(),
    }
}

async fn insert_user(pool: &SqlitePool, username: &str, role: Role) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, email, role, password_hash, active, created_at)
           VALUES (?, ?, ?, NULL, ?, 'x', 1, ?)"#,
    )
    .bind(&id)
    .bind(username)
    .bind(username)
    .bind(role.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert user");
    id
}

async fn insert_reservation(pool: &SqlitePool, user_id: &str, status: &str) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO reservations
           (id, user_id, title, starts_on, ends_on, guest_count, status, notes, requested_at)
           VALUES (?, ?, 'Lake weekend', '2024-07-05', '2024-07-08', 4, ?, NULL, ?)"#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(status)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert reservation");
    id
}

async fn insert_companion(
    pool: &SqlitePool,
    reservation_id: &str,
    name: &str,
    email: Option<&str>,
    invited: bool,
) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO companions
           (id, reservation_id, name, relationship, age_range, email, invited_to_system)
           VALUES (?, ?, ?, NULL, NULL, ?, ?)"#,
    )
    .bind(&id)
    .bind(reservation_id)
    .bind(name)
    .bind(email)
    .bind(i64::from(invited))
    .execute(pool)
    .await
    .expect("insert companion");
    id
}

#[allow(clippy::too_many_arguments)]
async fn insert_task(
    pool: &SqlitePool,
    title: &str,
    assignee_id: Option<&str>,
    due_date: &str,
    pattern: Option<&str>,
    interval: i64,
    recurrence_end: Option<&str>,
    parent_task_id: Option<&str>,
) -> String {
    let id = Uuid::new_v4().to_string();
    let status = if assignee_id.is_some() {
        TASK_IN_PROGRESS
    } else {
        TASK_PENDING
    };
    sqlx::query(
        r#"INSERT INTO tasks (id, title, description, status, priority, category, assignee_id,
               due_date, recurrence_pattern, recurrence_interval, recurrence_end, parent_task_id,
               created_at)
           VALUES (?, ?, NULL, ?, 'normal', NULL, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(title)
    .bind(status)
    .bind(assignee_id)
    .bind(due_date)
    .bind(pattern)
    .bind(interval)
    .bind(recurrence_end)
    .bind(parent_task_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert task");
    id
}

async fn invite_stamps(pool: &SqlitePool, reservation_id: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM companions WHERE reservation_id = ? AND invite_sent_at IS NOT NULL",
    )
    .bind(reservation_id)
    .fetch_one(pool)
    .await
    .expect("count stamps")
}

#[tokio::test]
async fn invitations_are_sent_once_per_eligible_companion() {
    let pool = test_pool().await;
    let mail_config = disabled_mail();

    let guest = insert_user(&pool, "casey", Role::Guest).await;
    let reservation = insert_reservation(&pool, &guest, RES_CONFIRMED).await;

    insert_companion(&pool, &reservation, "Avery", Some("avery@example.test"), true).await;
    insert_companion(&pool, &reservation, "Blake", Some("blake@example.test"), true).await;
    // No email: never eligible even when flagged.
    insert_companion(&pool, &reservation, "Cam", None, true).await;
    // Not flagged for an account.
    insert_companion(&pool, &reservation, "Drew", Some("drew@example.test"), false).await;

    let sent = mail::send_guest_invitations(&pool, &mail_config, &reservation).await;
    assert_eq!(sent, 2);
    assert_eq!(invite_stamps(&pool, &reservation).await, 2);

    // The second round selects nobody: every eligible companion is stamped.
    let resent = mail::send_guest_invitations(&pool, &mail_config, &reservation).await;
    assert_eq!(resent, 0);
    assert_eq!(invite_stamps(&pool, &reservation).await, 2);
}

#[tokio::test]
async fn reservation_lifecycle_auto_confirm_and_approval() {
    let pool = test_pool().await;
    let mail_config = disabled_mail();

    // A friend's request lands confirmed without any approval step.
    let friend = insert_user(&pool, "jamie", Role::Friend).await;
    let friend_status =
        rules::determine_status(Role::Friend, false, rules::can_approve(Role::Friend))
            .expect("new reservation always gets a status");
    assert_eq!(friend_status, RES_CONFIRMED);
    let friend_stay = insert_reservation(&pool, &friend, friend_status).await;
    assert_eq!(invite_stamps(&pool, &friend_stay).await, 0);

    // An identical request from a guest needs approval.
    let guest = insert_user(&pool, "casey", Role::Guest).await;
    let guest_status = rules::determine_status(Role::Guest, false, rules::can_approve(Role::Guest))
        .expect("new reservation always gets a status");
    assert_eq!(guest_status, RES_PENDING);
    let guest_stay = insert_reservation(&pool, &guest, guest_status).await;
    insert_companion(&pool, &guest_stay, "Avery", Some("avery@example.test"), true).await;

    // Admin approves: status flips and the flagged companion is invited once.
    let admin = insert_user(&pool, "morgan", Role::Admin).await;
    let decided = db::decide_reservation(&pool, &guest_stay, &admin, "Morgan", true, None)
        .await
        .expect("decision write")
        .expect("reservation exists");
    assert_eq!(decided.status, RES_CONFIRMED);

    let approvals = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM reservation_approvals WHERE reservation_id = ?",
    )
    .bind(&guest_stay)
    .fetch_one(&pool)
    .await
    .expect("count approvals");
    assert_eq!(approvals, 1);

    let sent = mail::send_guest_invitations(&pool, &mail_config, &guest_stay).await;
    assert_eq!(sent, 1);
    assert_eq!(invite_stamps(&pool, &guest_stay).await, 1);
    assert_eq!(
        mail::send_guest_invitations(&pool, &mail_config, &guest_stay).await,
        0
    );
}

#[tokio::test]
async fn rejected_reservation_stays_rejected() {
    let pool = test_pool().await;

    let guest = insert_user(&pool, "casey", Role::Guest).await;
    let stay = insert_reservation(&pool, &guest, RES_PENDING).await;
    let manager = insert_user(&pool, "rory", Role::Manager).await;

    let decided = db::decide_reservation(&pool, &stay, &manager, "Rory", false, Some("house full"))
        .await
        .expect("decision write")
        .expect("reservation exists");
    assert_eq!(decided.status, "rejected");

    let note = sqlx::query_scalar::<_, Option<String>>(
        "SELECT note FROM reservation_approvals WHERE reservation_id = ?",
    )
    .bind(&stay)
    .fetch_one(&pool)
    .await
    .expect("approval row");
    assert_eq!(note.as_deref(), Some("house full"));
}

#[tokio::test]
async fn completing_weekly_task_spawns_one_successor() {
    let pool = test_pool().await;

    let task = insert_task(&pool, "Mow the meadow", None, "2024-03-01", Some("weekly"), 1, None, None).await;

    let (completed, successor) = db::complete_task(&pool, &task, None, "Rory")
        .await
        .expect("completion write")
        .expect("task exists");
    assert_eq!(completed.status, "completed");
    let successor = successor.expect("recurring task spawns a successor");

    let next = db::fetch_task(&pool, &successor).await.expect("successor row");
    assert_eq!(next.due_date, "2024-03-08");
    assert_eq!(next.status, TASK_PENDING);
    assert_eq!(next.parent_task_id.as_deref(), Some(task.as_str()));

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks")
        .fetch_one(&pool)
        .await
        .expect("count tasks");
    assert_eq!(total, 2);

    // Completing again is a no-op: no second successor.
    let (_again, respawn) = db::complete_task(&pool, &task, None, "Rory")
        .await
        .expect("completion write")
        .expect("task exists");
    assert!(respawn.is_none());
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks")
        .fetch_one(&pool)
        .await
        .expect("count tasks");
    assert_eq!(total, 2);
}

#[tokio::test]
async fn assigned_successor_starts_in_progress_and_keeps_series_root() {
    let pool = test_pool().await;

    let staff = insert_user(&pool, "sam", Role::Staff).await;
    let root = insert_task(&pool, "Filter change", Some(&staff), "2024-03-01", Some("monthly"), 1, None, None).await;

    // Second generation already points at the root.
    let second = insert_task(
        &pool,
        "Filter change",
        Some(&staff),
        "2024-04-01",
        Some("monthly"),
        1,
        None,
        Some(&root),
    )
    .await;

    let (_, successor) = db::complete_task(&pool, &second, Some(&staff), "Sam")
        .await
        .expect("completion write")
        .expect("task exists");
    let third = db::fetch_task(&pool, &successor.expect("successor spawned"))
        .await
        .expect("successor row");

    assert_eq!(third.status, TASK_IN_PROGRESS);
    assert_eq!(third.assignee_id.as_deref(), Some(staff.as_str()));
    assert_eq!(third.due_date, "2024-05-01");
    assert_eq!(third.parent_task_id.as_deref(), Some(root.as_str()));
}

#[tokio::test]
async fn expired_or_plain_tasks_do_not_respawn() {
    let pool = test_pool().await;

    let plain = insert_task(&pool, "Fix the dock light", None, "2024-03-01", None, 1, None, None).await;
    let (_, successor) = db::complete_task(&pool, &plain, None, "Rory")
        .await
        .expect("completion write")
        .expect("task exists");
    assert!(successor.is_none());

    // End date before the next occurrence: series is over.
    let ending = insert_task(
        &pool,
        "Water the planters",
        None,
        "2024-09-25",
        Some("weekly"),
        1,
        Some("2024-09-30"),
        None,
    )
    .await;
    let (_, successor) = db::complete_task(&pool, &ending, None, "Rory")
        .await
        .expect("completion write")
        .expect("task exists");
    assert!(successor.is_none());

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks")
        .fetch_one(&pool)
        .await
        .expect("count tasks");
    assert_eq!(total, 2);
}
