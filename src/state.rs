use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::mail::MailConfig;
use crate::models::{ReservationRow, TaskRow};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
    pub mail: MailConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    pub kind: String,
    pub reservation_id: Option<String>,
    pub task_id: Option<String>,
    pub status: Option<String>,
    pub title: Option<String>,
    pub guest_name: Option<String>,
    pub starts_on: Option<String>,
    pub ends_on: Option<String>,
    pub due_date: Option<String>,
}

impl ServerEvent {
    pub fn from_reservation(kind: &str, row: ReservationRow) -> Self {
        Self {
            kind: kind.to_string(),
            reservation_id: Some(row.id),
            task_id: None,
            status: Some(row.status),
            title: Some(row.title),
            guest_name: row.guest_name,
            starts_on: Some(row.starts_on),
            ends_on: Some(row.ends_on),
            due_date: None,
        }
    }

    pub fn from_task(kind: &str, row: TaskRow) -> Self {
        Self {
            kind: kind.to_string(),
            reservation_id: None,
            task_id: Some(row.id),
            status: Some(row.status),
            title: Some(row.title),
            guest_name: row.assignee_name,
            starts_on: None,
            ends_on: None,
            due_date: Some(row.due_date),
        }
    }
}
