use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{admin_validator, hash_password, logout_guard, new_id, AuthUser},
    db::log_activity,
    models::{PropertyRow, Role, UserRow, WalkthroughSectionRow, WalkthroughStepRow},
    rules,
    state::AppState,
    templates::render,
};

#[derive(Clone, Debug)]
struct UserView {
    id: String,
    username: String,
    display_name: String,
    email: String,
    has_email: bool,
    role: String,
    active: bool,
    created_at: String,
}

#[derive(Clone, Debug)]
struct RoleOption {
    value: &'static str,
    selected: bool,
}

#[derive(Template)]
#[template(path = "admin_users.html")]
struct AdminUsersTemplate {
    users: Vec<UserView>,
    roles: Vec<RoleOption>,
    role_filter: String,
    search: String,
    errors: Vec<String>,
    success: String,
    has_success: bool,
}

#[derive(Template)]
#[template(path = "admin_property.html")]
struct AdminPropertyTemplate {
    name: String,
    address: String,
    tagline: String,
    amenities: String,
    hero_html: String,
    saved: bool,
}

#[derive(Clone, Debug)]
struct EditStepView {
    id: String,
    position: i64,
    title: String,
    body: String,
}

#[derive(Clone, Debug)]
struct EditSectionView {
    key: String,
    title: String,
    position: i64,
    steps: Vec<EditStepView>,
}

#[derive(Template)]
#[template(path = "admin_walkthrough.html")]
struct AdminWalkthroughTemplate {
    sections: Vec<EditSectionView>,
}

#[derive(Deserialize)]
struct UserFilter {
    role: Option<String>,
    q: Option<String>,
}

#[derive(Deserialize)]
struct UserCreateForm {
    username: String,
    display_name: String,
    email: Option<String>,
    role: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserUpdatePayload {
    user_id: String,
    user_data: UserDataPatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDataPatch {
    display_name: Option<String>,
    email: Option<String>,
    role: Option<String>,
    active: Option<bool>,
    password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDeletePayload {
    user_id: String,
}

#[derive(Deserialize)]
struct PropertyForm {
    name: String,
    address: Option<String>,
    tagline: Option<String>,
    amenities: Option<String>,
    hero_html: Option<String>,
}

#[derive(Deserialize)]
struct SectionPayload {
    key: String,
    title: String,
    position: Option<i64>,
}

#[derive(Deserialize)]
struct StepPayload {
    id: Option<String>,
    section_key: String,
    position: Option<i64>,
    title: String,
    body: String,
}

#[derive(Deserialize)]
struct StepDeletePayload {
    id: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .service(
                web::resource("/users")
                    .route(web::get().to(list_users))
                    .route(web::post().to(create_user)),
            )
            .service(web::resource("/api/users/update").route(web::post().to(update_user)))
            .service(web::resource("/api/users/delete").route(web::post().to(delete_user)))
            .service(
                web::resource("/property")
                    .route(web::get().to(property_settings))
                    .route(web::post().to(save_property)),
            )
            .service(web::resource("/walkthrough").route(web::get().to(walkthrough_editor)))
            .service(
                web::resource("/walkthrough/sections").route(web::post().to(save_section)),
            )
            .service(web::resource("/walkthrough/steps").route(web::post().to(save_step)))
            .service(
                web::resource("/walkthrough/steps/delete").route(web::post().to(delete_step)),
            ),
    );
}

async fn index() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, "/admin/users"))
        .finish()
}

fn role_options(selected: &str) -> Vec<RoleOption> {
    Role::ALL
        .iter()
        .map(|role| RoleOption {
            value: role.as_str(),
            selected: role.as_str() == selected,
        })
        .collect()
}

async fn fetch_users(state: &web::Data<AppState>) -> Vec<UserRow> {
    sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, email, role, password_hash, active, created_at
           FROM users ORDER BY created_at DESC"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default()
}

fn user_views(rows: Vec<UserRow>, role_filter: &str, search: &str) -> Vec<UserView> {
    rows.into_iter()
        .filter(|row| rules::role_matches(&row.role, role_filter))
        .filter(|row| {
            rules::search_matches(
                search,
                &[
                    Some(row.display_name.as_str()),
                    Some(row.username.as_str()),
                    row.email.as_deref(),
                ],
            )
        })
        .map(|row| {
            let email = row.email.unwrap_or_default();
            UserView {
                id: row.id,
                username: row.username,
                display_name: row.display_name,
                has_email: !email.trim().is_empty(),
                email,
                role: Role::parse_or_guest(&row.role).as_str().to_string(),
                active: row.active == 1,
                created_at: row.created_at,
            }
        })
        .collect()
}

async fn list_users(
    state: web::Data<AppState>,
    query: web::Query<UserFilter>,
) -> Result<HttpResponse> {
    let role_filter = query.role.clone().unwrap_or_default();
    let search = query.q.clone().unwrap_or_default();
    let users = user_views(fetch_users(&state).await, &role_filter, &search);

    Ok(render(AdminUsersTemplate {
        users,
        roles: role_options(Role::Guest.as_str()),
        role_filter,
        search,
        errors: Vec::new(),
        success: String::new(),
        has_success: false,
    }))
}

async fn create_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<UserCreateForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    if form.username.trim().is_empty() {
        errors.push("Username is required.".to_string());
    }
    if form.display_name.trim().is_empty() {
        errors.push("Display name is required.".to_string());
    }
    if form.password.trim().len() < 6 {
        errors.push("Password must be at least 6 characters.".to_string());
    }
    let role = Role::parse(&form.role);
    if role.is_none() {
        errors.push("Choose a valid role.".to_string());
    }

    if !errors.is_empty() {
        let users = user_views(fetch_users(&state).await, "", "");
        return Ok(render(AdminUsersTemplate {
            users,
            roles: role_options(&form.role),
            role_filter: String::new(),
            search: String::new(),
            errors,
            success: String::new(),
            has_success: false,
        }));
    }

    let password_hash = hash_password(&form.password)
        .map_err(|_| actix_web::error::ErrorInternalServerError("hash failure"))?;
    let email = form
        .email
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let role = role.unwrap_or(Role::Guest);

    let result = sqlx::query(
        r#"INSERT INTO users (id, username, display_name, email, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(form.username.trim())
    .bind(form.display_name.trim())
    .bind(email)
    .bind(role.as_str())
    .bind(password_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await;

    if let Err(err) = result {
        let users = user_views(fetch_users(&state).await, "", "");
        return Ok(render(AdminUsersTemplate {
            users,
            roles: role_options(&form.role),
            role_filter: String::new(),
            search: String::new(),
            errors: vec![format!("Failed to create user: {err}")],
            success: String::new(),
            has_success: false,
        }));
    }

    log_activity(
        &state.db,
        "user_created",
        &format!(
            "{} created a {} account for {}.",
            auth.display_name,
            role.as_str(),
            form.display_name.trim()
        ),
        Some(&auth.id),
        None,
        None,
    )
    .await;

    let users = user_views(fetch_users(&state).await, "", "");
    Ok(render(AdminUsersTemplate {
        users,
        roles: role_options(Role::Guest.as_str()),
        role_filter: String::new(),
        search: String::new(),
        errors: Vec::new(),
        success: "User created successfully.".to_string(),
        has_success: true,
    }))
}

async fn update_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<UserUpdatePayload>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();

    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, email, role, password_hash, active, created_at
           FROM users WHERE id = ?"#,
    )
    .bind(&payload.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    let Some(user) = user else {
        return Ok(HttpResponse::NotFound().json(json!({ "ok": false, "error": "user not found" })));
    };

    // Unknown role strings are rejected at this boundary instead of being
    // silently demoted; the store must only ever hold the closed set.
    let role = match payload.user_data.role.as_deref() {
        Some(value) => match Role::parse(value) {
            Some(role) => role.as_str().to_string(),
            None => {
                return Ok(HttpResponse::BadRequest()
                    .json(json!({ "ok": false, "error": "unknown role" })));
            }
        },
        None => user.role,
    };

    let password_hash = match payload.user_data.password.as_deref() {
        Some(password) if !password.trim().is_empty() => hash_password(password)
            .map_err(|_| actix_web::error::ErrorInternalServerError("hash failure"))?,
        _ => user.password_hash,
    };

    let display_name = payload
        .user_data
        .display_name
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or(user.display_name);
    let email = match payload.user_data.email {
        Some(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() { None } else { Some(trimmed) }
        }
        None => user.email,
    };
    let active = payload.user_data.active.map(i64::from).unwrap_or(user.active);

    sqlx::query(
        r#"UPDATE users SET display_name = ?, email = ?, role = ?, password_hash = ?, active = ?
           WHERE id = ?"#,
    )
    .bind(&display_name)
    .bind(&email)
    .bind(&role)
    .bind(&password_hash)
    .bind(active)
    .bind(&payload.user_id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "user_updated",
        &format!("{} updated the account of {}.", auth.display_name, display_name),
        Some(&auth.id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn delete_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<UserDeletePayload>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();
    if payload.user_id == auth.id {
        return Ok(HttpResponse::BadRequest()
            .json(json!({ "ok": false, "error": "cannot delete your own account" })));
    }

    let reservations = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM reservations WHERE user_id = ?",
    )
    .bind(&payload.user_id)
    .fetch_one(&state.db)
    .await
    .unwrap_or(0);

    // Accounts with stays on record are deactivated, not removed, so the
    // reservation history keeps its owner.
    let action = if reservations > 0 {
        sqlx::query("UPDATE users SET active = 0 WHERE id = ?")
            .bind(&payload.user_id)
            .execute(&state.db)
            .await
            .map_err(actix_web::error::ErrorInternalServerError)?;
        "deactivated"
    } else {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(&payload.user_id)
            .execute(&state.db)
            .await
            .map_err(actix_web::error::ErrorInternalServerError)?;
        "deleted"
    };

    log_activity(
        &state.db,
        "user_deleted",
        &format!("{} {action} an account.", auth.display_name),
        Some(&auth.id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "ok": true, "action": action })))
}

async fn property_settings(state: web::Data<AppState>) -> Result<HttpResponse> {
    let property = sqlx::query_as::<_, PropertyRow>(
        "SELECT name, address, tagline, amenities, hero_html FROM property WHERE id = 1",
    )
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None)
    .unwrap_or(PropertyRow {
        name: String::new(),
        address: String::new(),
        tagline: String::new(),
        amenities: String::new(),
        hero_html: String::new(),
    });

    Ok(render(AdminPropertyTemplate {
        name: property.name,
        address: property.address,
        tagline: property.tagline,
        amenities: property.amenities,
        hero_html: property.hero_html,
        saved: false,
    }))
}

async fn save_property(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<PropertyForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    sqlx::query(
        r#"INSERT INTO property (id, name, address, tagline, amenities, hero_html)
           VALUES (1, ?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             address = excluded.address,
             tagline = excluded.tagline,
             amenities = excluded.amenities,
             hero_html = excluded.hero_html"#,
    )
    .bind(form.name.trim())
    .bind(form.address.as_deref().map(str::trim).unwrap_or(""))
    .bind(form.tagline.as_deref().map(str::trim).unwrap_or(""))
    .bind(form.amenities.as_deref().map(str::trim).unwrap_or(""))
    .bind(form.hero_html.as_deref().unwrap_or(""))
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "property_updated",
        &format!("{} updated the property page.", auth.display_name),
        Some(&auth.id),
        None,
        None,
    )
    .await;

    Ok(render(AdminPropertyTemplate {
        name: form.name.trim().to_string(),
        address: form.address.unwrap_or_default(),
        tagline: form.tagline.unwrap_or_default(),
        amenities: form.amenities.unwrap_or_default(),
        hero_html: form.hero_html.unwrap_or_default(),
        saved: true,
    }))
}

async fn walkthrough_editor(state: web::Data<AppState>) -> Result<HttpResponse> {
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
        .map(|section| EditSectionView {
            steps: steps
                .iter()
                .filter(|step| step.section_key == section.key)
                .map(|step| EditStepView {
                    id: step.id.clone(),
                    position: step.position,
                    title: step.title.clone(),
                    body: step.body.clone(),
                })
                .collect(),
            key: section.key,
            title: section.title,
            position: section.position,
        })
        .collect();

    Ok(render(AdminWalkthroughTemplate { sections }))
}

async fn save_section(
    state: web::Data<AppState>,
    payload: web::Json<SectionPayload>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();
    if payload.key.trim().is_empty() || payload.title.trim().is_empty() {
        return Ok(HttpResponse::BadRequest()
            .json(json!({ "ok": false, "error": "key and title are required" })));
    }

    sqlx::query(
        r#"INSERT INTO walkthrough_sections (key, title, position)
           VALUES (?, ?, ?)
           ON CONFLICT(key) DO UPDATE SET title = excluded.title, position = excluded.position"#,
    )
    .bind(payload.key.trim())
    .bind(payload.title.trim())
    .bind(payload.position.unwrap_or(0))
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn save_step(
    state: web::Data<AppState>,
    payload: web::Json<StepPayload>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();
    if payload.title.trim().is_empty() {
        return Ok(HttpResponse::BadRequest()
            .json(json!({ "ok": false, "error": "title is required" })));
    }

    let section = sqlx::query_as::<_, (String,)>(
        "SELECT key FROM walkthrough_sections WHERE key = ?",
    )
    .bind(payload.section_key.trim())
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None);
    if section.is_none() {
        return Ok(HttpResponse::BadRequest()
            .json(json!({ "ok": false, "error": "unknown section" })));
    }

    let step_id = payload.id.unwrap_or_else(new_id);
    sqlx::query(
        r#"INSERT INTO walkthrough_steps (id, section_key, position, title, body)
           VALUES (?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
             section_key = excluded.section_key,
             position = excluded.position,
             title = excluded.title,
             body = excluded.body"#,
    )
    .bind(&step_id)
    .bind(payload.section_key.trim())
    .bind(payload.position.unwrap_or(0))
    .bind(payload.title.trim())
    .bind(&payload.body)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(json!({ "ok": true, "id": step_id })))
}

async fn delete_step(
    state: web::Data<AppState>,
    payload: web::Json<StepDeletePayload>,
) -> Result<HttpResponse> {
    sqlx::query("DELETE FROM walkthrough_steps WHERE id = ?")
        .bind(&payload.id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}
