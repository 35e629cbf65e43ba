use serde::Serialize;

pub const RES_PENDING: &str = "pending";
pub const RES_CONFIRMED: &str = "confirmed";
pub const RES_REJECTED: &str = "rejected";

pub const TASK_PENDING: &str = "pending";
pub const TASK_IN_PROGRESS: &str = "in_progress";
pub const TASK_COMPLETED: &str = "completed";

/// Closed set of household roles. The store keeps roles as TEXT; anything
/// unknown read back degrades to `Guest` at the boundary via
/// [`Role::parse_or_guest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Guest,
    Tenant,
    Friend,
    Family,
    Staff,
    Manager,
    Admin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Guest,
        Role::Tenant,
        Role::Friend,
        Role::Family,
        Role::Staff,
        Role::Manager,
        Role::Admin,
        Role::Owner,
    ];

    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_ascii_lowercase().as_str() {
            "guest" => Some(Role::Guest),
            "tenant" => Some(Role::Tenant),
            "friend" => Some(Role::Friend),
            "family" => Some(Role::Family),
            "staff" => Some(Role::Staff),
            "manager" => Some(Role::Manager),
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }

    pub fn parse_or_guest(value: &str) -> Role {
        Role::parse(value).unwrap_or_else(|| {
            log::warn!("Unknown role {value:?} in store, treating as guest");
            Role::Guest
        })
    }

    /// Privilege level. Tenants carry guest-level privileges.
    pub fn level(self) -> u8 {
        match self {
            Role::Guest | Role::Tenant => 0,
            Role::Friend => 1,
            Role::Family => 2,
            Role::Staff => 3,
            Role::Manager => 4,
            Role::Admin => 5,
            Role::Owner => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Tenant => "tenant",
            Role::Friend => "friend",
            Role::Family => "family",
            Role::Staff => "staff",
            Role::Manager => "manager",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: String,
    pub password_hash: String,
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReservationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub starts_on: String,
    pub ends_on: String,
    pub guest_count: i64,
    pub status: String,
    pub notes: Option<String>,
    pub requested_at: String,
    pub guest_name: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompanionRow {
    pub id: String,
    pub reservation_id: String,
    pub name: String,
    pub relationship: Option<String>,
    pub age_range: Option<String>,
    pub email: Option<String>,
    pub invited_to_system: i64,
    pub invite_sent_at: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub category: Option<String>,
    pub assignee_id: Option<String>,
    pub due_date: String,
    pub recurrence_pattern: Option<String>,
    pub recurrence_interval: i64,
    pub recurrence_end: Option<String>,
    pub parent_task_id: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub assignee_name: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InventoryRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub restock_threshold: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StapleRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub restock_threshold: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecommendationRow {
    pub id: String,
    pub title: String,
    pub category: String,
    pub description: String,
    pub url: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GuestBookRow {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub message: String,
    pub rating: i64,
    pub is_public: i64,
    pub is_approved: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WalkthroughSectionRow {
    pub key: String,
    pub title: String,
    pub position: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WalkthroughStepRow {
    pub id: String,
    pub section_key: String,
    pub position: i64,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PropertyRow {
    pub name: String,
    pub address: String,
    pub tagline: String,
    pub amenities: String,
    pub hero_html: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StapleOption {
    pub id: String,
    pub name: String,
    pub category: String,
    pub restock_threshold: i64,
    pub custom: bool,
}
