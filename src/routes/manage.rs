use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::{logout_guard, manager_validator, new_id, AuthUser},
    db::{self, log_activity, RESERVATION_SELECT, TASK_SELECT},
    mail,
    models::{
        InventoryRow, RecommendationRow, ReservationRow, StapleOption, StapleRow, TaskRow,
        UserRow, RES_PENDING, TASK_COMPLETED, TASK_IN_PROGRESS, TASK_PENDING,
    },
    rules,
    state::{AppState, ServerEvent},
    templates::render,
};

const RECURRENCE_PATTERNS: [&str; 5] = ["daily", "weekly", "monthly", "quarterly", "yearly"];

#[derive(Clone, Debug)]
struct ReservationView {
    id: String,
    title: String,
    guest_name: String,
    starts_on: String,
    ends_on: String,
    nights: i64,
    guest_count: i64,
    notes: String,
    has_notes: bool,
}

#[derive(Clone, Debug)]
struct DecisionView {
    title: String,
    decision: String,
    note: String,
    has_note: bool,
    created_at: String,
}

#[derive(Clone, Debug)]
struct TaskView {
    id: String,
    title: String,
    status: String,
    priority: String,
    due_date: String,
    assignee_name: String,
    has_assignee: bool,
    recurrence: String,
    is_recurring: bool,
    is_open: bool,
}

#[derive(Clone, Debug)]
struct AssigneeOption {
    id: String,
    display_name: String,
}

#[derive(Clone, Debug)]
struct InventoryView {
    id: String,
    name: String,
    category: String,
    quantity: i64,
    restock_threshold: i64,
    low: bool,
}

#[derive(Template)]
#[template(path = "manage_approvals.html")]
struct ApprovalsTemplate {
    pending: Vec<ReservationView>,
    recent: Vec<DecisionView>,
}

#[derive(Template)]
#[template(path = "manage_tasks.html")]
struct ManageTasksTemplate {
    tasks: Vec<TaskView>,
    assignees: Vec<AssigneeOption>,
    errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "inventory.html")]
struct InventoryTemplate {
    items: Vec<InventoryView>,
    available: Vec<StapleOption>,
    errors: Vec<String>,
}

#[derive(Clone, Debug)]
struct RecommendationView {
    id: String,
    title: String,
    category: String,
    description: String,
    url: String,
    has_url: bool,
}

#[derive(Template)]
#[template(path = "manage_recommendations.html")]
struct ManageRecommendationsTemplate {
    recommendations: Vec<RecommendationView>,
    errors: Vec<String>,
}

#[derive(Deserialize)]
struct DecisionForm {
    decision: String,
    note: Option<String>,
}

#[derive(Deserialize)]
struct TaskCreateForm {
    title: String,
    description: Option<String>,
    priority: Option<String>,
    category: Option<String>,
    assignee_id: Option<String>,
    due_date: String,
    recurrence_pattern: Option<String>,
    recurrence_interval: Option<String>,
    recurrence_end: Option<String>,
}

#[derive(Deserialize)]
struct AssignForm {
    assignee_id: Option<String>,
}

#[derive(Deserialize)]
struct InventoryForm {
    name: String,
    category: String,
    quantity: Option<String>,
    restock_threshold: Option<String>,
}

#[derive(Deserialize)]
struct AdjustForm {
    delta: String,
}

#[derive(Deserialize)]
struct StapleForm {
    name: String,
    category: String,
    restock_threshold: Option<String>,
}

#[derive(Deserialize)]
struct RecommendationForm {
    title: String,
    category: String,
    description: String,
    url: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/manage")
            .wrap(HttpAuthentication::basic(manager_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/approvals").route(web::get().to(approvals)))
            .service(
                web::resource("/reservations/{id}/decision")
                    .route(web::post().to(decide_reservation)),
            )
            .service(
                web::resource("/tasks")
                    .route(web::get().to(list_tasks))
                    .route(web::post().to(create_task)),
            )
            .service(web::resource("/tasks/{id}/assign").route(web::post().to(assign_task)))
            .service(
                web::resource("/inventory")
                    .route(web::get().to(inventory))
                    .route(web::post().to(add_inventory)),
            )
            .service(
                web::resource("/inventory/staples/{id}/add")
                    .route(web::post().to(add_from_staple)),
            )
            .service(
                web::resource("/inventory/{id}/adjust").route(web::post().to(adjust_inventory)),
            )
            .service(
                web::resource("/inventory/{id}/delete").route(web::post().to(delete_inventory)),
            )
            .service(web::resource("/staples").route(web::post().to(create_staple)))
            .service(web::resource("/staples/{id}/delete").route(web::post().to(delete_staple)))
            .service(
                web::resource("/recommendations")
                    .route(web::get().to(recommendations))
                    .route(web::post().to(create_recommendation)),
            )
            .service(
                web::resource("/recommendations/{id}/delete")
                    .route(web::post().to(delete_recommendation)),
            ),
    );
}

async fn index() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, "/manage/approvals"))
        .finish()
}

fn to_view(row: ReservationRow) -> ReservationView {
    let nights = rules::parse_date(&row.starts_on)
        .zip(rules::parse_date(&row.ends_on))
        .map(|(start, end)| rules::nights(start, end))
        .unwrap_or(0);
    let notes = row.notes.unwrap_or_default();
    ReservationView {
        id: row.id,
        title: row.title,
        guest_name: row.guest_name.unwrap_or_else(|| "Unknown".to_string()),
        starts_on: row.starts_on,
        ends_on: row.ends_on,
        nights,
        guest_count: row.guest_count,
        has_notes: !notes.trim().is_empty(),
        notes,
    }
}

fn task_view(row: TaskRow) -> TaskView {
    let assignee_name = row.assignee_name.unwrap_or_default();
    let recurrence = match row.recurrence_pattern.as_deref() {
        Some(pattern) if row.recurrence_interval > 1 => {
            format!("every {} {pattern}", row.recurrence_interval)
        }
        Some(pattern) => pattern.to_string(),
        None => String::new(),
    };
    TaskView {
        id: row.id,
        title: row.title,
        is_open: row.status != TASK_COMPLETED,
        status: row.status,
        priority: row.priority,
        due_date: row.due_date,
        has_assignee: !assignee_name.trim().is_empty(),
        assignee_name,
        is_recurring: !recurrence.is_empty(),
        recurrence,
    }
}

async fn approvals(state: web::Data<AppState>) -> Result<HttpResponse> {
    let sql = format!("{RESERVATION_SELECT} WHERE r.status = ? ORDER BY r.starts_on ASC");
    let rows = sqlx::query_as::<_, ReservationRow>(&sql)
        .bind(RES_PENDING)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default();

    let recent = sqlx::query_as::<_, (String, String, Option<String>, String)>(
        r#"SELECT r.title, a.decision, a.note, a.created_at
           FROM reservation_approvals a
           JOIN reservations r ON a.reservation_id = r.id
           ORDER BY a.created_at DESC
           LIMIT 10"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let recent = recent
        .into_iter()
        .map(|(title, decision, note, created_at)| {
            let note = note.unwrap_or_default();
            DecisionView {
                title,
                decision,
                has_note: !note.trim().is_empty(),
                note,
                created_at,
            }
        })
        .collect();

    Ok(render(ApprovalsTemplate {
        pending: rows.into_iter().map(to_view).collect(),
        recent,
    }))
}

async fn decide_reservation(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<DecisionForm>,
) -> Result<HttpResponse> {
    let reservation_id = path.into_inner();
    let form = form.into_inner();
    let approve = match form.decision.as_str() {
        "approve" => true,
        "reject" => false,
        _ => return Ok(HttpResponse::BadRequest().body("Invalid decision")),
    };
    let note = form
        .note
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let decided = db::decide_reservation(
        &state.db,
        &reservation_id,
        &auth.id,
        &auth.display_name,
        approve,
        note,
    )
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    let Some(reservation) = decided else {
        return Ok(HttpResponse::NotFound().body("Reservation not found"));
    };

    // Confirmation is the moment flagged companions get their one invite.
    if approve {
        let sent = mail::send_guest_invitations(&state.db, &state.mail, &reservation_id).await;
        if sent > 0 {
            log_activity(
                &state.db,
                "invitations_sent",
                &format!("{sent} companion invitation(s) sent."),
                Some(&auth.id),
                Some(&reservation_id),
                None,
            )
            .await;
        }
    }

    let _ = state
        .events
        .send(ServerEvent::from_reservation("reservation_decided", reservation));

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/approvals"))
        .finish())
}

async fn fetch_assignees(state: &web::Data<AppState>) -> Vec<AssigneeOption> {
    let rows = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, email, role, password_hash, active, created_at
           FROM users WHERE active = 1 ORDER BY display_name"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    rows.into_iter()
        .map(|row| AssigneeOption {
            id: row.id,
            display_name: row.display_name,
        })
        .collect()
}

async fn fetch_tasks(state: &web::Data<AppState>) -> Vec<TaskView> {
    let sql = format!("{TASK_SELECT} ORDER BY t.due_date ASC");
    sqlx::query_as::<_, TaskRow>(&sql)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(task_view)
        .collect()
}

async fn list_tasks(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(render(ManageTasksTemplate {
        tasks: fetch_tasks(&state).await,
        assignees: fetch_assignees(&state).await,
        errors: Vec::new(),
    }))
}

async fn create_task(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<TaskCreateForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();

    if form.title.trim().is_empty() {
        errors.push("Task title is required.".to_string());
    }
    if rules::parse_date(&form.due_date).is_none() {
        errors.push("Due date must be a valid date.".to_string());
    }

    let pattern = form
        .recurrence_pattern
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(pattern) = pattern {
        if !RECURRENCE_PATTERNS.contains(&pattern) {
            errors.push("Choose a valid repeat pattern.".to_string());
        }
    }
    let interval = form
        .recurrence_interval
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.parse::<i64>())
        .transpose()
        .unwrap_or(None)
        .unwrap_or(1);
    if interval < 1 {
        errors.push("Repeat interval must be at least 1.".to_string());
    }
    let recurrence_end = form
        .recurrence_end
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(end) = recurrence_end {
        if rules::parse_date(end).is_none() {
            errors.push("Repeat-until must be a valid date.".to_string());
        }
    }

    if !errors.is_empty() {
        return Ok(render(ManageTasksTemplate {
            tasks: fetch_tasks(&state).await,
            assignees: fetch_assignees(&state).await,
            errors,
        }));
    }

    let assignee_id = form
        .assignee_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let status = if assignee_id.is_some() {
        TASK_IN_PROGRESS
    } else {
        TASK_PENDING
    };

    let task_id = new_id();
    sqlx::query(
        r#"INSERT INTO tasks (id, title, description, status, priority, category, assignee_id,
               due_date, recurrence_pattern, recurrence_interval, recurrence_end, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&task_id)
    .bind(form.title.trim())
    .bind(form.description.as_deref().map(str::trim))
    .bind(status)
    .bind(form.priority.as_deref().map(str::trim).filter(|v| !v.is_empty()).unwrap_or("normal"))
    .bind(form.category.as_deref().map(str::trim).filter(|v| !v.is_empty()))
    .bind(assignee_id)
    .bind(form.due_date.trim())
    .bind(pattern)
    .bind(interval)
    .bind(recurrence_end)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "task_created",
        &format!("{} created task \"{}\".", auth.display_name, form.title.trim()),
        Some(&auth.id),
        None,
        Some(&task_id),
    )
    .await;

    if let Some(row) = db::fetch_task(&state.db, &task_id).await {
        let _ = state.events.send(ServerEvent::from_task("task_created", row));
    }

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/tasks"))
        .finish())
}

async fn assign_task(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<AssignForm>,
) -> Result<HttpResponse> {
    let task_id = path.into_inner();
    let Some(task) = db::fetch_task(&state.db, &task_id).await else {
        return Ok(HttpResponse::NotFound().body("Task not found"));
    };
    if task.status == TASK_COMPLETED {
        return Ok(HttpResponse::BadRequest().body("Task already completed"));
    }

    let assignee_id = form
        .into_inner()
        .assignee_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let status = if assignee_id.is_some() {
        TASK_IN_PROGRESS
    } else {
        TASK_PENDING
    };

    sqlx::query("UPDATE tasks SET assignee_id = ?, status = ? WHERE id = ?")
        .bind(&assignee_id)
        .bind(status)
        .bind(&task_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "task_assigned",
        &format!("{} reassigned task \"{}\".", auth.display_name, task.title),
        Some(&auth.id),
        None,
        Some(&task_id),
    )
    .await;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/tasks"))
        .finish())
}

async fn fetch_inventory_page(
    state: &web::Data<AppState>,
    errors: Vec<String>,
) -> InventoryTemplate {
    let items = sqlx::query_as::<_, InventoryRow>(
        "SELECT id, name, category, quantity, restock_threshold, updated_at FROM inventory ORDER BY category, name",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let stocked: Vec<(String, String)> = items
        .iter()
        .map(|item| (item.name.clone(), item.category.clone()))
        .collect();

    let defaults = sqlx::query_as::<_, StapleRow>(
        "SELECT id, name, category, restock_threshold FROM default_staples ORDER BY category, name",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();
    let customs = sqlx::query_as::<_, StapleRow>(
        "SELECT id, name, category, restock_threshold FROM custom_staples ORDER BY category, name",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    // Staples already present in inventory stay hidden so "add" cannot
    // create duplicates.
    let available = defaults
        .into_iter()
        .map(|staple| (staple, false))
        .chain(customs.into_iter().map(|staple| (staple, true)))
        .filter(|(staple, _)| rules::staple_available(&staple.name, &staple.category, &stocked))
        .map(|(staple, custom)| StapleOption {
            id: staple.id,
            name: staple.name,
            category: staple.category,
            restock_threshold: staple.restock_threshold,
            custom,
        })
        .collect();

    let items = items
        .into_iter()
        .map(|item| InventoryView {
            low: item.quantity <= item.restock_threshold,
            id: item.id,
            name: item.name,
            category: item.category,
            quantity: item.quantity,
            restock_threshold: item.restock_threshold,
        })
        .collect();

    InventoryTemplate {
        items,
        available,
        errors,
    }
}

async fn inventory(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(render(fetch_inventory_page(&state, Vec::new()).await))
}

async fn add_inventory(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<InventoryForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    if form.name.trim().is_empty() {
        errors.push("Item name is required.".to_string());
    }
    if form.category.trim().is_empty() {
        errors.push("Category is required.".to_string());
    }
    let quantity = form
        .quantity
        .as_deref()
        .unwrap_or("0")
        .trim()
        .parse::<i64>()
        .unwrap_or(-1);
    if quantity < 0 {
        errors.push("Quantity must be zero or more.".to_string());
    }
    let threshold = form
        .restock_threshold
        .as_deref()
        .unwrap_or("1")
        .trim()
        .parse::<i64>()
        .unwrap_or(-1);
    if threshold < 0 {
        errors.push("Restock threshold must be zero or more.".to_string());
    }

    if !errors.is_empty() {
        return Ok(render(fetch_inventory_page(&state, errors).await));
    }

    sqlx::query(
        r#"INSERT INTO inventory (id, name, category, quantity, restock_threshold, updated_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(form.name.trim())
    .bind(form.category.trim())
    .bind(quantity)
    .bind(threshold)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "inventory_added",
        &format!("{} added {} to inventory.", auth.display_name, form.name.trim()),
        Some(&auth.id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/inventory"))
        .finish())
}

async fn add_from_staple(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let staple_id = path.into_inner();

    let staple = sqlx::query_as::<_, StapleRow>(
        r#"SELECT id, name, category, restock_threshold FROM custom_staples WHERE id = ?
           UNION ALL
           SELECT id, name, category, restock_threshold FROM default_staples WHERE id = ?"#,
    )
    .bind(&staple_id)
    .bind(&staple_id)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None);

    let Some(staple) = staple else {
        return Ok(HttpResponse::NotFound().body("Staple not found"));
    };

    let stocked: Vec<(String, String)> = sqlx::query_as::<_, (String, String)>(
        "SELECT name, category FROM inventory",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    if !rules::staple_available(&staple.name, &staple.category, &stocked) {
        return Ok(HttpResponse::SeeOther()
            .append_header((header::LOCATION, "/manage/inventory"))
            .finish());
    }

    sqlx::query(
        r#"INSERT INTO inventory (id, name, category, quantity, restock_threshold, updated_at)
           VALUES (?, ?, ?, 0, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&staple.name)
    .bind(&staple.category)
    .bind(staple.restock_threshold)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "inventory_added",
        &format!("{} started tracking {}.", auth.display_name, staple.name),
        Some(&auth.id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/inventory"))
        .finish())
}

async fn adjust_inventory(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<AdjustForm>,
) -> Result<HttpResponse> {
    let item_id = path.into_inner();
    let delta = form.into_inner().delta.trim().parse::<i64>().unwrap_or(0);

    let current = sqlx::query_as::<_, (i64,)>("SELECT quantity FROM inventory WHERE id = ?")
        .bind(&item_id)
        .fetch_optional(&state.db)
        .await
        .unwrap_or(None);

    let Some((quantity,)) = current else {
        return Ok(HttpResponse::NotFound().body("Item not found"));
    };

    sqlx::query("UPDATE inventory SET quantity = ?, updated_at = ? WHERE id = ?")
        .bind((quantity + delta).max(0))
        .bind(Utc::now().to_rfc3339())
        .bind(&item_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/inventory"))
        .finish())
}

async fn delete_inventory(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let item_id = path.into_inner();
    sqlx::query("DELETE FROM inventory WHERE id = ?")
        .bind(&item_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/inventory"))
        .finish())
}

async fn create_staple(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<StapleForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    if form.name.trim().is_empty() {
        errors.push("Staple name is required.".to_string());
    }
    if form.category.trim().is_empty() {
        errors.push("Category is required.".to_string());
    }

    let known: Vec<(String, String)> = sqlx::query_as::<_, (String, String)>(
        r#"SELECT name, category FROM default_staples
           UNION ALL
           SELECT name, category FROM custom_staples"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();
    if !rules::staple_available(form.name.trim(), form.category.trim(), &known) {
        errors.push("That staple already exists.".to_string());
    }

    if !errors.is_empty() {
        return Ok(render(fetch_inventory_page(&state, errors).await));
    }

    let threshold = form
        .restock_threshold
        .as_deref()
        .unwrap_or("1")
        .trim()
        .parse::<i64>()
        .unwrap_or(1)
        .max(0);

    sqlx::query(
        "INSERT INTO custom_staples (id, name, category, restock_threshold) VALUES (?, ?, ?, ?)",
    )
    .bind(new_id())
    .bind(form.name.trim())
    .bind(form.category.trim())
    .bind(threshold)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "staple_created",
        &format!("{} added the staple {}.", auth.display_name, form.name.trim()),
        Some(&auth.id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/inventory"))
        .finish())
}

async fn delete_staple(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let staple_id = path.into_inner();
    // Only custom staples can be removed; defaults are part of the seed.
    sqlx::query("DELETE FROM custom_staples WHERE id = ?")
        .bind(&staple_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/inventory"))
        .finish())
}

async fn recommendations(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(render(fetch_recommendations_page(&state, Vec::new()).await))
}

async fn fetch_recommendations_page(
    state: &web::Data<AppState>,
    errors: Vec<String>,
) -> ManageRecommendationsTemplate {
    let rows = sqlx::query_as::<_, RecommendationRow>(
        r#"SELECT id, title, category, description, url, created_by, created_at
           FROM recommendations ORDER BY category, title"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let recommendations = rows
        .into_iter()
        .map(|row| {
            let url = row.url.unwrap_or_default();
            RecommendationView {
                id: row.id,
                title: row.title,
                category: row.category,
                description: row.description,
                has_url: !url.trim().is_empty(),
                url,
            }
        })
        .collect();

    ManageRecommendationsTemplate {
        recommendations,
        errors,
    }
}

async fn create_recommendation(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<RecommendationForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    if form.title.trim().is_empty() {
        errors.push("Title is required.".to_string());
    }
    if form.category.trim().is_empty() {
        errors.push("Category is required.".to_string());
    }
    if form.description.trim().is_empty() {
        errors.push("Say a few words about the place.".to_string());
    }

    if !errors.is_empty() {
        return Ok(render(fetch_recommendations_page(&state, errors).await));
    }

    sqlx::query(
        r#"INSERT INTO recommendations (id, title, category, description, url, created_by, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(form.title.trim())
    .bind(form.category.trim())
    .bind(form.description.trim())
    .bind(form.url.as_deref().map(str::trim).filter(|v| !v.is_empty()))
    .bind(&auth.id)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/recommendations"))
        .finish())
}

async fn delete_recommendation(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let recommendation_id = path.into_inner();
    sqlx::query("DELETE FROM recommendations WHERE id = ?")
        .bind(&recommendation_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/manage/recommendations"))
        .finish())
}
