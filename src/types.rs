//! Shared domain types for the governance engine.
//!
//! Role, status, and vote enums are closed sets with `as_str`/`from_str_lossy`
//! pairs for SQL storage. Authorization decisions are made against `Role`
//! variants, never against raw role strings.

use serde::{Deserialize, Serialize};

/// The authenticated caller of an operation, supplied by the identity
/// collaborator. The engine never authenticates; it only authorizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub role: Role,
    pub department: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role, department: Option<&str>) -> Self {
        Self {
            id: id.into(),
            role,
            department: department.map(|d| d.to_string()),
        }
    }
}

/// Closed role set. Every access check is a pure function of
/// (role, relationship-to-record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Secretary,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Secretary => "secretary",
            Role::Employee => "employee",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            "manager" => Role::Manager,
            "secretary" => Role::Secretary,
            _ => Role::Employee,
        }
    }

    /// Minutes may only be authored by admins, managers, and secretaries.
    pub fn can_create_minutes(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager | Role::Secretary)
    }

    /// Explicit voting closure is a secretary/admin capability.
    pub fn can_close_voting(&self) -> bool {
        matches!(self, Role::Admin | Role::Secretary)
    }

    /// The separate approval transition is an admin/manager capability.
    pub fn can_approve_minutes(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    /// Department-wide visibility into private records is granted to
    /// managers and secretaries but not employees.
    pub fn has_department_visibility(&self) -> bool {
        matches!(self, Role::Manager | Role::Secretary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingType {
    Offline,
    Online,
    Hybrid,
}

impl MeetingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingType::Offline => "offline",
            MeetingType::Online => "online",
            MeetingType::Hybrid => "hybrid",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "online" => MeetingType::Online,
            "hybrid" => MeetingType::Hybrid,
            _ => MeetingType::Offline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
    Postponed,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::Ongoing => "ongoing",
            MeetingStatus::Completed => "completed",
            MeetingStatus::Cancelled => "cancelled",
            MeetingStatus::Postponed => "postponed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "ongoing" => MeetingStatus::Ongoing,
            "completed" => MeetingStatus::Completed,
            "cancelled" => MeetingStatus::Cancelled,
            "postponed" => MeetingStatus::Postponed,
            _ => MeetingStatus::Scheduled,
        }
    }

    /// Only scheduled/ongoing meetings occupy a room. Cancelled, postponed,
    /// and completed meetings never conflict.
    pub fn occupies_room(&self) -> bool {
        matches!(self, MeetingStatus::Scheduled | MeetingStatus::Ongoing)
    }

    /// Meetings cannot be edited or cancelled once ongoing or completed.
    pub fn is_editable(&self) -> bool {
        matches!(self, MeetingStatus::Scheduled | MeetingStatus::Postponed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeResponse {
    Invited,
    Accepted,
    Declined,
    Tentative,
    Attended,
}

impl AttendeeResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendeeResponse::Invited => "invited",
            AttendeeResponse::Accepted => "accepted",
            AttendeeResponse::Declined => "declined",
            AttendeeResponse::Tentative => "tentative",
            AttendeeResponse::Attended => "attended",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "accepted" => AttendeeResponse::Accepted,
            "declined" => AttendeeResponse::Declined,
            "tentative" => AttendeeResponse::Tentative,
            "attended" => AttendeeResponse::Attended,
            _ => AttendeeResponse::Invited,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinutesStatus {
    Draft,
    PendingReview,
    PendingApproval,
    Approved,
    Rejected,
}

impl MinutesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MinutesStatus::Draft => "draft",
            MinutesStatus::PendingReview => "pending_review",
            MinutesStatus::PendingApproval => "pending_approval",
            MinutesStatus::Approved => "approved",
            MinutesStatus::Rejected => "rejected",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "pending_review" => MinutesStatus::PendingReview,
            "pending_approval" => MinutesStatus::PendingApproval,
            "approved" => MinutesStatus::Approved,
            "rejected" => MinutesStatus::Rejected,
            _ => MinutesStatus::Draft,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MinutesStatus::Approved | MinutesStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Agree,
    AgreeWithComments,
    Disagree,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Agree => "agree",
            VoteType::AgreeWithComments => "agree_with_comments",
            VoteType::Disagree => "disagree",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "agree" => VoteType::Agree,
            "agree_with_comments" => VoteType::AgreeWithComments,
            _ => VoteType::Disagree,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Decision,
    ActionItem,
    Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveType {
    Complete,
    DocumentsOnly,
    MinutesOnly,
    SummaryOnly,
    Custom,
}

impl ArchiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveType::Complete => "complete",
            ArchiveType::DocumentsOnly => "documents_only",
            ArchiveType::MinutesOnly => "minutes_only",
            ArchiveType::SummaryOnly => "summary_only",
            ArchiveType::Custom => "custom",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "documents_only" => ArchiveType::DocumentsOnly,
            "minutes_only" => ArchiveType::MinutesOnly,
            "summary_only" => ArchiveType::SummaryOnly,
            "custom" => ArchiveType::Custom,
            _ => ArchiveType::Complete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStatus {
    Active,
    Archived,
    Deleted,
}

impl ArchiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveStatus::Active => "active",
            ArchiveStatus::Archived => "archived",
            ArchiveStatus::Deleted => "deleted",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "archived" => ArchiveStatus::Archived,
            "deleted" => ArchiveStatus::Deleted,
            _ => ArchiveStatus::Active,
        }
    }
}

// =============================================================================
// Nested payloads (stored as *_json columns)
// =============================================================================

/// A decision or action item recorded inside a Minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub kind: DecisionKind,
    pub responsible_user_id: Option<String>,
    pub deadline: Option<String>,
    #[serde(default = "default_decision_status")]
    pub status: String,
    #[serde(default = "default_decision_priority")]
    pub priority: String,
}

fn default_decision_status() -> String {
    "open".to_string()
}

fn default_decision_priority() -> String {
    "normal".to_string()
}

/// File metadata as returned by the external storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub name: String,
    pub original_path: String,
    pub size_bytes: i64,
    pub uploaded_by: String,
}

/// Derived vote metadata. Always recomputed from the vote ledger; never
/// stored authoritatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub required_vote_count: i64,
    pub received_vote_count: i64,
    pub agree_count: i64,
    pub agree_with_comments_count: i64,
    pub disagree_count: i64,
    /// round(agree / received * 100), 0 when no votes were received.
    pub agreement_rate: i64,
    /// round(received / required * 100), 0 when no votes are required.
    pub participation_rate: i64,
}

/// Paging parameters for listing operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}
