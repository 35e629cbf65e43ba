use actix_web::{http::header, middleware::from_fn, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{
    auth::{logout_guard, manager_validator},
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/events")
            .wrap(HttpAuthentication::basic(manager_validator))
            .wrap(from_fn(logout_guard))
            .route(web::get().to(stream_events)),
    )
    .service(
        web::resource("/reservations/{id}/events").route(web::get().to(stream_reservation_events)),
    );
}

async fn stream_events(state: web::Data<AppState>) -> HttpResponse {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event))),
        Err(_) => None,
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

fn event_to_bytes(event: &ServerEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: update\ndata: {}\n\n", payload))
}

#[derive(serde::Serialize)]
struct ReservationStatusEvent {
    reservation_id: Option<String>,
    status: Option<String>,
    title: Option<String>,
    starts_on: Option<String>,
    ends_on: Option<String>,
}

/// Narrow per-reservation stream: the requester can watch their stay move
/// through the approval workflow without seeing anyone else's events.
async fn stream_reservation_events(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let reservation_id = path.into_inner();
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let event = match result {
            Ok(event) => event,
            Err(_) => return None,
        };
        if event.reservation_id.as_deref() != Some(&reservation_id) {
            return None;
        }
        let narrowed = ReservationStatusEvent {
            reservation_id: event.reservation_id,
            status: event.status,
            title: event.title,
            starts_on: event.starts_on,
            ends_on: event.ends_on,
        };
        Some(Ok::<web::Bytes, actix_web::Error>(status_event_to_bytes(&narrowed)))
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

fn status_event_to_bytes(event: &ReservationStatusEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: update\ndata: {}\n\n", payload))
}
