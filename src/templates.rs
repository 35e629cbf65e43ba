use actix_web::HttpResponse;
use askama::Template;

pub fn render<T: Template>(template: T) -> HttpResponse {
    match template.render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(body),
        Err(err) => {
            log::error!("Template render error: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Clone, Debug)]
pub struct StatCard {
    pub label: String,
    pub value: i64,
}

/// Star string for a 1–5 guest-book rating, clamped.
pub fn stars(rating: i64) -> String {
    let filled = rating.clamp(0, 5) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}
