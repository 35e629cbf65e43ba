use actix_web::{http::header, web, HttpRequest, HttpResponse, Result};
use actix_web::http::header::Header;
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use askama::Template;
use serde::Deserialize;

use crate::{
    auth::{authenticate_credentials, clear_logout_cookie, logout_cookie, AUTH_REALM},
    models::{GuestBookRow, PropertyRow, Role},
    rules::has_permission,
    state::AppState,
    templates::{render, stars},
};

#[derive(Clone, Debug)]
struct EntryView {
    author_name: String,
    message: String,
    stars: String,
    created_at: String,
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    property_name: String,
    address: String,
    has_address: bool,
    tagline: String,
    hero_html: String,
    amenities: Vec<String>,
    entries: Vec<EntryView>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/login").route(web::get().to(login)))
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn logout(req: HttpRequest) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/"))
        .cookie(logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
) -> HttpResponse {
    let auth = match Authorization::<Basic>::parse(&req) {
        Ok(auth) => auth,
        Err(_) => return auth_challenge(),
    };
    let credentials = auth.into_scheme();
    let username = credentials.user_id();
    let password = credentials.password().unwrap_or_default();

    let user = match authenticate_credentials(&state, username, password).await {
        Some(user) => user,
        None => return auth_challenge(),
    };

    let requested = query.next.as_deref().unwrap_or("");
    let requested = if requested.starts_with('/') { requested } else { "" };

    let fallback = if has_permission(user.role, Role::Admin) {
        "/admin/users"
    } else if has_permission(user.role, Role::Manager) {
        "/manage/approvals"
    } else {
        "/portal/dashboard"
    };

    let redirect = if requested.starts_with("/admin") && has_permission(user.role, Role::Admin) {
        requested
    } else if requested.starts_with("/manage") && has_permission(user.role, Role::Manager) {
        requested
    } else if requested.starts_with("/portal") {
        requested
    } else {
        fallback
    };

    HttpResponse::SeeOther()
        .append_header((header::LOCATION, redirect))
        .cookie(clear_logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", AUTH_REALM)))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

async fn home(state: web::Data<AppState>) -> Result<HttpResponse> {
    let property = sqlx::query_as::<_, PropertyRow>(
        "SELECT name, address, tagline, amenities, hero_html FROM property WHERE id = 1",
    )
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None);

    let property = property.unwrap_or(PropertyRow {
        name: "Lodgebook".to_string(),
        address: String::new(),
        tagline: String::new(),
        amenities: String::new(),
        hero_html: String::new(),
    });

    let amenities: Vec<String> = property
        .amenities
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    // Only entries both published by their author and approved by an admin
    // appear on the public page.
    let rows = sqlx::query_as::<_, GuestBookRow>(
        r#"SELECT id, author_id, author_name, message, rating, is_public, is_approved, created_at
           FROM guest_book_entries
           WHERE is_public = 1 AND is_approved = 1
           ORDER BY created_at DESC
           LIMIT 12"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let entries = rows
        .into_iter()
        .map(|row| EntryView {
            author_name: row.author_name,
            message: row.message,
            stars: stars(row.rating),
            created_at: row.created_at,
        })
        .collect();

    Ok(render(HomeTemplate {
        property_name: property.name,
        has_address: !property.address.trim().is_empty(),
        address: property.address,
        tagline: property.tagline,
        hero_html: property.hero_html,
        amenities,
        entries,
    }))
}
