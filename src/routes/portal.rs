use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::{
    auth::{logout_guard, member_validator, new_id, AuthUser},
    db::{self, log_activity, RESERVATION_SELECT, TASK_SELECT},
    mail,
    models::{
        ActivityRow, CompanionRow, GuestBookRow, RecommendationRow, ReservationRow, TaskRow,
        WalkthroughSectionRow, WalkthroughStepRow, RES_CONFIRMED, RES_PENDING, TASK_COMPLETED,
        TASK_IN_PROGRESS,
    },
    rules,
    state::{AppState, ServerEvent},
    templates::{render, stars, StatCard},
};

#[derive(Clone, Debug)]
struct ReservationView {
    id: String,
    title: String,
    guest_name: String,
    starts_on: String,
    ends_on: String,
    nights: i64,
    guest_count: i64,
    status: String,
    notes: String,
    has_notes: bool,
    is_pending: bool,
}

#[derive(Clone, Debug)]
struct CompanionView {
    id: String,
    name: String,
    relationship: String,
    age_range: String,
    email: String,
    has_email: bool,
    flagged_for_invite: bool,
    invite_sent: bool,
    invite_sent_at: String,
}

#[derive(Clone, Debug)]
struct TaskView {
    id: String,
    title: String,
    description: String,
    has_description: bool,
    status: String,
    priority: String,
    category: String,
    assignee_name: String,
    has_assignee: bool,
    due_date: String,
    recurrence: String,
    is_recurring: bool,
    is_open: bool,
}

#[derive(Clone, Debug)]
struct ActivityView {
    message: String,
    created_at: String,
}

#[derive(Clone, Debug)]
struct EntryView {
    author_name: String,
    message: String,
    stars: String,
    created_at: String,
    published: bool,
}

#[derive(Clone, Debug, Default)]
struct ReservationFormView {
    title: String,
    starts_on: String,
    ends_on: String,
    guest_count: String,
    notes: String,
}

#[derive(Template)]
#[template(path = "portal_dashboard.html")]
struct DashboardTemplate {
    member_name: String,
    role_label: String,
    stats: Vec<StatCard>,
    upcoming: Vec<ReservationView>,
    activities: Vec<ActivityView>,
    can_manage: bool,
}

#[derive(Template)]
#[template(path = "reservations.html")]
struct ReservationsTemplate {
    reservations: Vec<ReservationView>,
    status_filter: String,
    can_manage: bool,
}

#[derive(Template)]
#[template(path = "reservation_form.html")]
struct ReservationFormTemplate {
    form: ReservationFormView,
    errors: Vec<String>,
    editing: bool,
    action: String,
}

#[derive(Template)]
#[template(path = "reservation_detail.html")]
struct ReservationDetailTemplate {
    reservation: ReservationView,
    companions: Vec<CompanionView>,
    is_mine: bool,
    can_manage: bool,
    errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "tasks.html")]
struct TasksTemplate {
    tasks: Vec<TaskView>,
    status_filter: String,
    assigned_filter: String,
}

#[derive(Template)]
#[template(path = "guest_book.html")]
struct GuestBookTemplate {
    published: Vec<EntryView>,
    mine: Vec<EntryView>,
    errors: Vec<String>,
}

#[derive(Clone, Debug)]
struct CategoryLink {
    name: String,
    selected: bool,
}

#[derive(Clone, Debug)]
struct RecommendationView {
    title: String,
    category: String,
    description: String,
    url: String,
    has_url: bool,
}

#[derive(Template)]
#[template(path = "recommendations.html")]
struct RecommendationsTemplate {
    recommendations: Vec<RecommendationView>,
    categories: Vec<CategoryLink>,
}

#[derive(Clone, Debug)]
struct StepView {
    title: String,
    body: String,
}

#[derive(Clone, Debug)]
struct SectionView {
    title: String,
    steps: Vec<StepView>,
}

#[derive(Template)]
#[template(path = "walkthrough.html")]
struct WalkthroughTemplate {
    sections: Vec<SectionView>,
}

#[derive(Deserialize)]
struct ReservationForm {
    title: String,
    starts_on: String,
    ends_on: String,
    guest_count: String,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct CompanionForm {
    name: String,
    relationship: Option<String>,
    age_range: Option<String>,
    email: Option<String>,
    invited_to_system: Option<String>,
}

#[derive(Deserialize)]
struct StatusFilter {
    status: Option<String>,
}

#[derive(Deserialize)]
struct TaskFilter {
    status: Option<String>,
    assigned: Option<String>,
}

#[derive(Deserialize)]
struct GuestBookForm {
    message: String,
    rating: String,
    is_public: Option<String>,
}

#[derive(Deserialize)]
struct CategoryFilter {
    category: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/portal")
            .wrap(HttpAuthentication::basic(member_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/reservations").route(web::get().to(list_reservations)))
            .service(
                web::resource("/reservations/new")
                    .route(web::get().to(new_reservation))
                    .route(web::post().to(create_reservation)),
            )
            .service(web::resource("/reservations/{id}").route(web::get().to(reservation_detail)))
            .service(
                web::resource("/reservations/{id}/edit").route(web::post().to(update_reservation)),
            )
            .service(
                web::resource("/reservations/{id}/cancel")
                    .route(web::post().to(cancel_reservation)),
            )
            .service(
                web::resource("/reservations/{id}/companions")
                    .route(web::post().to(add_companion)),
            )
            .service(
                web::resource("/companions/{id}/remove").route(web::post().to(remove_companion)),
            )
            .service(web::resource("/tasks").route(web::get().to(list_tasks)))
            .service(web::resource("/tasks/{id}/claim").route(web::post().to(claim_task)))
            .service(web::resource("/tasks/{id}/complete").route(web::post().to(complete_task)))
            .service(
                web::resource("/guest-book")
                    .route(web::get().to(guest_book))
                    .route(web::post().to(sign_guest_book)),
            )
            .service(web::resource("/recommendations").route(web::get().to(recommendations)))
            .service(web::resource("/walkthrough").route(web::get().to(walkthrough))),
    );
}

async fn index() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, "/portal/dashboard"))
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
        is_pending: row.status == RES_PENDING,
        status: row.status,
        has_notes: !notes.trim().is_empty(),
        notes,
    }
}

fn companion_view(row: CompanionRow) -> CompanionView {
    let email = row.email.unwrap_or_default();
    let invite_sent_at = row.invite_sent_at.unwrap_or_default();
    CompanionView {
        id: row.id,
        name: row.name,
        relationship: row.relationship.unwrap_or_default(),
        age_range: row.age_range.unwrap_or_default(),
        has_email: !email.trim().is_empty(),
        email,
        flagged_for_invite: row.invited_to_system == 1,
        invite_sent: !invite_sent_at.is_empty(),
        invite_sent_at,
    }
}

fn task_view(row: TaskRow) -> TaskView {
    let description = row.description.unwrap_or_default();
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
        has_description: !description.trim().is_empty(),
        description,
        is_open: row.status != TASK_COMPLETED,
        status: row.status,
        priority: row.priority,
        category: row.category.unwrap_or_default(),
        has_assignee: !assignee_name.trim().is_empty(),
        assignee_name,
        due_date: row.due_date,
        is_recurring: !recurrence.is_empty(),
        recurrence,
    }
}

async fn count(query: &str, state: &web::Data<AppState>, param: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(query)
        .bind(param)
        .fetch_one(&state.db)
        .await
        .unwrap_or(0)
}

async fn dashboard(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let reservations = count(
        "SELECT COUNT(*) FROM reservations WHERE user_id = ?",
        &state,
        &auth.id,
    )
    .await;
    let pending = count(
        "SELECT COUNT(*) FROM reservations WHERE user_id = ? AND status = 'pending'",
        &state,
        &auth.id,
    )
    .await;
    let my_tasks = count(
        "SELECT COUNT(*) FROM tasks WHERE assignee_id = ? AND status != 'completed'",
        &state,
        &auth.id,
    )
    .await;
    let unassigned = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tasks WHERE assignee_id IS NULL AND status != 'completed'",
    )
    .fetch_one(&state.db)
    .await
    .unwrap_or(0);

    let stats = vec![
        StatCard {
            label: "My stays".to_string(),
            value: reservations,
        },
        StatCard {
            label: "Awaiting approval".to_string(),
            value: pending,
        },
        StatCard {
            label: "My open tasks".to_string(),
            value: my_tasks,
        },
        StatCard {
            label: "Unclaimed tasks".to_string(),
            value: unassigned,
        },
    ];

    let query = format!("{RESERVATION_SELECT} WHERE r.user_id = ? ORDER BY r.starts_on DESC LIMIT 5");
    let rows = sqlx::query_as::<_, ReservationRow>(&query)
        .bind(&auth.id)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default();
    let upcoming = rows.into_iter().map(to_view).collect();

    let activity_rows = sqlx::query_as::<_, ActivityRow>(
        "SELECT message, created_at FROM activities ORDER BY created_at DESC LIMIT 10",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();
    let activities = activity_rows
        .into_iter()
        .map(|row| ActivityView {
            message: row.message,
            created_at: row.created_at,
        })
        .collect();

    Ok(render(DashboardTemplate {
        member_name: auth.display_name.clone(),
        role_label: auth.role.as_str().to_string(),
        stats,
        upcoming,
        activities,
        can_manage: rules::can_approve(auth.role),
    }))
}

async fn list_reservations(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<StatusFilter>,
) -> Result<HttpResponse> {
    let status_filter = query.status.clone().unwrap_or_default();
    let can_manage = rules::can_approve(auth.role);

    // Managers see every stay; everyone else only their own.
    let sql = if can_manage {
        format!("{RESERVATION_SELECT} ORDER BY r.starts_on DESC")
    } else {
        format!("{RESERVATION_SELECT} WHERE r.user_id = ? ORDER BY r.starts_on DESC")
    };
    let mut select = sqlx::query_as::<_, ReservationRow>(&sql);
    if !can_manage {
        select = select.bind(&auth.id);
    }
    let rows = select.fetch_all(&state.db).await.unwrap_or_default();

    let reservations = rows
        .into_iter()
        .filter(|row| rules::status_matches(&row.status, &status_filter))
        .map(to_view)
        .collect();

    Ok(render(ReservationsTemplate {
        reservations,
        status_filter,
        can_manage,
    }))
}

async fn new_reservation() -> Result<HttpResponse> {
    Ok(render(ReservationFormTemplate {
        form: ReservationFormView::default(),
        errors: Vec::new(),
        editing: false,
        action: "/portal/reservations/new".to_string(),
    }))
}

fn validate_reservation(form: &ReservationForm) -> (Vec<String>, Option<(NaiveDate, NaiveDate, i64)>) {
    let mut errors = Vec::new();
    if form.title.trim().is_empty() {
        errors.push("A short title for the stay is required.".to_string());
    }
    let starts_on = rules::parse_date(&form.starts_on);
    let ends_on = rules::parse_date(&form.ends_on);
    if starts_on.is_none() {
        errors.push("Arrival date must be a valid date.".to_string());
    }
    if ends_on.is_none() {
        errors.push("Departure date must be a valid date.".to_string());
    }
    if let (Some(start), Some(end)) = (starts_on, ends_on) {
        if rules::nights(start, end) < 1 {
            errors.push("Departure must be after arrival.".to_string());
        }
    }
    let guest_count = form.guest_count.trim().parse::<i64>().ok();
    if !matches!(guest_count, Some(count) if count >= 1) {
        errors.push("Guest count must be at least 1.".to_string());
    }

    if errors.is_empty() {
        if let (Some(start), Some(end), Some(count)) = (starts_on, ends_on, guest_count) {
            return (errors, Some((start, end, count)));
        }
    }
    (errors, None)
}

fn form_view(form: &ReservationForm) -> ReservationFormView {
    ReservationFormView {
        title: form.title.clone(),
        starts_on: form.starts_on.clone(),
        ends_on: form.ends_on.clone(),
        guest_count: form.guest_count.clone(),
        notes: form.notes.clone().unwrap_or_default(),
    }
}

async fn create_reservation(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<ReservationForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let (errors, parsed) = validate_reservation(&form);
    let Some((_, _, guest_count)) = parsed else {
        return Ok(render(ReservationFormTemplate {
            form: form_view(&form),
            errors,
            editing: false,
            action: "/portal/reservations/new".to_string(),
        }));
    };

    let status = rules::determine_status(auth.role, false, rules::can_approve(auth.role))
        .unwrap_or(RES_PENDING);

    let reservation_id = new_id();
    sqlx::query(
        r#"INSERT INTO reservations
           (id, user_id, title, starts_on, ends_on, guest_count, status, notes, requested_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&reservation_id)
    .bind(&auth.id)
    .bind(form.title.trim())
    .bind(form.starts_on.trim())
    .bind(form.ends_on.trim())
    .bind(guest_count)
    .bind(status)
    .bind(form.notes.as_deref().map(str::trim))
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "reservation_created",
        &format!("{} requested a stay ({}).", auth.display_name, status),
        Some(&auth.id),
        Some(&reservation_id),
        None,
    )
    .await;

    if let Some(row) = db::fetch_reservation_event(&state.db, &reservation_id).await {
        let _ = state
            .events
            .send(ServerEvent::from_reservation("reservation_created", row));
    }

    Ok(HttpResponse::SeeOther()
        .append_header((
            header::LOCATION,
            format!("/portal/reservations/{reservation_id}"),
        ))
        .finish())
}

async fn reservation_detail(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let reservation_id = path.into_inner();
    let Some(row) = db::fetch_reservation_event(&state.db, &reservation_id).await else {
        return Ok(HttpResponse::NotFound().body("Reservation not found"));
    };

    let is_mine = row.user_id == auth.id;
    if !is_mine && !rules::can_approve(auth.role) {
        return Ok(HttpResponse::Forbidden().body("Not allowed"));
    }

    let companions = sqlx::query_as::<_, CompanionRow>(
        r#"SELECT id, reservation_id, name, relationship, age_range, email,
                  invited_to_system, invite_sent_at
           FROM companions WHERE reservation_id = ? ORDER BY name"#,
    )
    .bind(&reservation_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    Ok(render(ReservationDetailTemplate {
        reservation: to_view(row),
        companions: companions.into_iter().map(companion_view).collect(),
        is_mine,
        can_manage: rules::can_approve(auth.role),
        errors: Vec::new(),
    }))
}

async fn update_reservation(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<ReservationForm>,
) -> Result<HttpResponse> {
    let reservation_id = path.into_inner();
    let form = form.into_inner();

    let Some(current) = db::fetch_reservation_event(&state.db, &reservation_id).await else {
        return Ok(HttpResponse::NotFound().body("Reservation not found"));
    };
    if current.user_id != auth.id && !rules::can_approve(auth.role) {
        return Ok(HttpResponse::Forbidden().body("Not allowed"));
    }

    let (errors, parsed) = validate_reservation(&form);
    let Some((_, _, guest_count)) = parsed else {
        return Ok(render(ReservationFormTemplate {
            form: form_view(&form),
            errors,
            editing: true,
            action: format!("/portal/reservations/{reservation_id}/edit"),
        }));
    };

    // Editors without approval rights must not reset an already-decided
    // stay, so the determiner's sentinel falls back to the stored status.
    let status = rules::determine_status(auth.role, true, rules::can_approve(auth.role))
        .unwrap_or(current.status.as_str());

    sqlx::query(
        r#"UPDATE reservations
           SET title = ?, starts_on = ?, ends_on = ?, guest_count = ?, status = ?, notes = ?
           WHERE id = ?"#,
    )
    .bind(form.title.trim())
    .bind(form.starts_on.trim())
    .bind(form.ends_on.trim())
    .bind(guest_count)
    .bind(status)
    .bind(form.notes.as_deref().map(str::trim))
    .bind(&reservation_id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "reservation_updated",
        &format!("{} updated the stay \"{}\".", auth.display_name, form.title.trim()),
        Some(&auth.id),
        Some(&reservation_id),
        None,
    )
    .await;

    // An approver's edit can move a pending stay straight to confirmed, which
    // is also the moment flagged companions get their invites.
    if status == RES_CONFIRMED && current.status != RES_CONFIRMED {
        let sent = mail::send_guest_invitations(&state.db, &state.mail, &reservation_id).await;
        if sent > 0 {
            log_activity(
                &state.db,
                "invitations_sent",
                &format!("{sent} companion invitation(s) sent."),
                None,
                Some(&reservation_id),
                None,
            )
            .await;
        }
    }

    if let Some(row) = db::fetch_reservation_event(&state.db, &reservation_id).await {
        let _ = state
            .events
            .send(ServerEvent::from_reservation("reservation_updated", row));
    }

    Ok(HttpResponse::SeeOther()
        .append_header((
            header::LOCATION,
            format!("/portal/reservations/{reservation_id}"),
        ))
        .finish())
}

async fn cancel_reservation(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let reservation_id = path.into_inner();
    let Some(mut row) = db::fetch_reservation_event(&state.db, &reservation_id).await else {
        return Ok(HttpResponse::NotFound().body("Reservation not found"));
    };
    if row.user_id != auth.id && !rules::can_approve(auth.role) {
        return Ok(HttpResponse::Forbidden().body("Not allowed"));
    }

    // A cancelled stay is removed outright, companions with it.
    let _ = sqlx::query("DELETE FROM companions WHERE reservation_id = ?")
        .bind(&reservation_id)
        .execute(&state.db)
        .await;
    let _ = sqlx::query("DELETE FROM reservation_approvals WHERE reservation_id = ?")
        .bind(&reservation_id)
        .execute(&state.db)
        .await;
    sqlx::query("DELETE FROM reservations WHERE id = ?")
        .bind(&reservation_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "reservation_cancelled",
        &format!("{} cancelled the stay \"{}\".", auth.display_name, row.title),
        Some(&auth.id),
        Some(&reservation_id),
        None,
    )
    .await;

    row.status = "cancelled".to_string();
    let _ = state
        .events
        .send(ServerEvent::from_reservation("reservation_cancelled", row));

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/portal/reservations"))
        .finish())
}

async fn add_companion(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<CompanionForm>,
) -> Result<HttpResponse> {
    let reservation_id = path.into_inner();
    let form = form.into_inner();

    let Some(row) = db::fetch_reservation_event(&state.db, &reservation_id).await else {
        return Ok(HttpResponse::NotFound().body("Reservation not found"));
    };
    if row.user_id != auth.id && !rules::can_approve(auth.role) {
        return Ok(HttpResponse::Forbidden().body("Not allowed"));
    }
    if form.name.trim().is_empty() {
        return Ok(HttpResponse::SeeOther()
            .append_header((
                header::LOCATION,
                format!("/portal/reservations/{reservation_id}"),
            ))
            .finish());
    }

    let email = form
        .email
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    sqlx::query(
        r#"INSERT INTO companions
           (id, reservation_id, name, relationship, age_range, email, invited_to_system)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&reservation_id)
    .bind(form.name.trim())
    .bind(form.relationship.as_deref().map(str::trim))
    .bind(form.age_range.as_deref().map(str::trim))
    .bind(email)
    .bind(i64::from(form.invited_to_system.is_some()))
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::SeeOther()
        .append_header((
            header::LOCATION,
            format!("/portal/reservations/{reservation_id}"),
        ))
        .finish())
}

async fn remove_companion(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let companion_id = path.into_inner();
    let companion = sqlx::query_as::<_, (String, String)>(
        r#"SELECT c.reservation_id, r.user_id
           FROM companions c JOIN reservations r ON c.reservation_id = r.id
           WHERE c.id = ?"#,
    )
    .bind(&companion_id)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None);

    let Some((reservation_id, owner_id)) = companion else {
        return Ok(HttpResponse::NotFound().body("Companion not found"));
    };
    if owner_id != auth.id && !rules::can_approve(auth.role) {
        return Ok(HttpResponse::Forbidden().body("Not allowed"));
    }

    sqlx::query("DELETE FROM companions WHERE id = ?")
        .bind(&companion_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::SeeOther()
        .append_header((
            header::LOCATION,
            format!("/portal/reservations/{reservation_id}"),
        ))
        .finish())
}

async fn list_tasks(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<TaskFilter>,
) -> Result<HttpResponse> {
    let status_filter = query.status.clone().unwrap_or_else(|| "open".to_string());
    let assigned_filter = query.assigned.clone().unwrap_or_default();

    let sql = format!("{TASK_SELECT} ORDER BY t.due_date ASC");
    let rows = sqlx::query_as::<_, TaskRow>(&sql)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default();

    let tasks = rows
        .into_iter()
        .filter(|row| rules::status_matches(&row.status, &status_filter))
        .filter(|row| rules::assignment_matches(row.assignee_id.as_deref(), &assigned_filter, &auth.id))
        .map(task_view)
        .collect();

    Ok(render(TasksTemplate {
        tasks,
        status_filter,
        assigned_filter,
    }))
}

async fn claim_task(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let task_id = path.into_inner();
    let Some(task) = db::fetch_task(&state.db, &task_id).await else {
        return Ok(HttpResponse::NotFound().body("Task not found"));
    };
    if task.status == TASK_COMPLETED {
        return Ok(HttpResponse::BadRequest().body("Task already completed"));
    }
    if let Some(assignee) = task.assignee_id.as_deref() {
        if assignee != auth.id {
            return Ok(HttpResponse::Forbidden().body("Task already claimed"));
        }
    }

    sqlx::query("UPDATE tasks SET assignee_id = ?, status = ? WHERE id = ?")
        .bind(&auth.id)
        .bind(TASK_IN_PROGRESS)
        .bind(&task_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "task_claimed",
        &format!("{} claimed task \"{}\".", auth.display_name, task.title),
        Some(&auth.id),
        None,
        Some(&task_id),
    )
    .await;

    if let Some(row) = db::fetch_task(&state.db, &task_id).await {
        let _ = state.events.send(ServerEvent::from_task("task_claimed", row));
    }

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/portal/tasks"))
        .finish())
}

async fn complete_task(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let task_id = path.into_inner();
    let Some(task) = db::fetch_task(&state.db, &task_id).await else {
        return Ok(HttpResponse::NotFound().body("Task not found"));
    };

    let is_mine = task.assignee_id.as_deref() == Some(auth.id.as_str());
    if !is_mine && task.assignee_id.is_some() && !rules::can_approve(auth.role) {
        return Ok(HttpResponse::Forbidden().body("Not allowed"));
    }

    let completed = db::complete_task(&state.db, &task_id, Some(&auth.id), &auth.display_name)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    if let Some((row, successor)) = completed {
        let _ = state
            .events
            .send(ServerEvent::from_task("task_completed", row));
        if let Some(successor_id) = successor {
            if let Some(next) = db::fetch_task(&state.db, &successor_id).await {
                let _ = state.events.send(ServerEvent::from_task("task_created", next));
            }
        }
    }

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/portal/tasks"))
        .finish())
}

fn entry_view(row: GuestBookRow) -> EntryView {
    EntryView {
        author_name: row.author_name,
        message: row.message,
        stars: stars(row.rating),
        created_at: row.created_at,
        published: row.is_public == 1 && row.is_approved == 1,
    }
}

async fn guest_book(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let published = sqlx::query_as::<_, GuestBookRow>(
        r#"SELECT id, author_id, author_name, message, rating, is_public, is_approved, created_at
           FROM guest_book_entries
           WHERE is_public = 1 AND is_approved = 1
           ORDER BY created_at DESC"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let mine = sqlx::query_as::<_, GuestBookRow>(
        r#"SELECT id, author_id, author_name, message, rating, is_public, is_approved, created_at
           FROM guest_book_entries
           WHERE author_id = ?
           ORDER BY created_at DESC"#,
    )
    .bind(&auth.id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    Ok(render(GuestBookTemplate {
        published: published.into_iter().map(entry_view).collect(),
        mine: mine.into_iter().map(entry_view).collect(),
        errors: Vec::new(),
    }))
}

async fn sign_guest_book(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<GuestBookForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    if form.message.trim().is_empty() {
        errors.push("Write a few words about your visit.".to_string());
    }
    let rating = form.rating.trim().parse::<i64>().ok();
    if !matches!(rating, Some(value) if (1..=5).contains(&value)) {
        errors.push("Rating must be between 1 and 5.".to_string());
    }

    if !errors.is_empty() {
        let published = sqlx::query_as::<_, GuestBookRow>(
            r#"SELECT id, author_id, author_name, message, rating, is_public, is_approved, created_at
               FROM guest_book_entries
               WHERE is_public = 1 AND is_approved = 1
               ORDER BY created_at DESC"#,
        )
        .fetch_all(&state.db)
        .await
        .unwrap_or_default();
        return Ok(render(GuestBookTemplate {
            published: published.into_iter().map(entry_view).collect(),
            mine: Vec::new(),
            errors,
        }));
    }

    sqlx::query(
        r#"INSERT INTO guest_book_entries
           (id, author_id, author_name, message, rating, is_public, is_approved, created_at)
           VALUES (?, ?, ?, ?, ?, ?, 0, ?)"#,
    )
    .bind(new_id())
    .bind(&auth.id)
    .bind(&auth.display_name)
    .bind(form.message.trim())
    .bind(rating.unwrap_or(5))
    .bind(i64::from(form.is_public.is_some()))
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "guest_book_signed",
        &format!("{} signed the guest book.", auth.display_name),
        Some(&auth.id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/portal/guest-book"))
        .finish())
}

async fn recommendations(
    state: web::Data<AppState>,
    query: web::Query<CategoryFilter>,
) -> Result<HttpResponse> {
    let category_filter = query.category.clone().unwrap_or_default();
    let rows = sqlx::query_as::<_, RecommendationRow>(
        r#"SELECT id, title, category, description, url, created_by, created_at
           FROM recommendations ORDER BY category, title"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let mut categories: Vec<String> = Vec::new();
    for row in &rows {
        if !categories.iter().any(|known| known.eq_ignore_ascii_case(&row.category)) {
            categories.push(row.category.clone());
        }
    }
    let categories = categories
        .into_iter()
        .map(|name| CategoryLink {
            selected: name.eq_ignore_ascii_case(category_filter.trim()),
            name,
        })
        .collect();

    let recommendations = rows
        .into_iter()
        .filter(|row| rules::category_matches(&row.category, &category_filter))
        .map(|row| {
            let url = row.url.unwrap_or_default();
            RecommendationView {
                title: row.title,
                category: row.category,
                description: row.description,
                has_url: !url.trim().is_empty(),
                url,
            }
        })
        .collect();

    Ok(render(RecommendationsTemplate {
        recommendations,
        categories,
    }))
}

async fn walkthrough(state: web::Data<AppState>) -> Result<HttpResponse> {
    let sections = sqlx::query_as::<_, WalkthroughSectionRow>(
        "SELECT key, title, position FROM walkthrough_sections ORDER BY position",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let steps = sqlx::query_as::<_, WalkthroughStepRow>(
        "SELECT id, section_key, position, title, body FROM walkthrough_steps ORDER BY position",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let sections = sections
        .into_iter()
        .map(|section| SectionView {
            steps: steps
                .iter()
                .filter(|step| step.section_key == section.key)
                .map(|step| StepView {
                    title: step.title.clone(),
                    body: step.body.clone(),
                })
                .collect(),
            title: section.title,
        })
        .collect();

    Ok(render(WalkthroughTemplate { sections }))
}
