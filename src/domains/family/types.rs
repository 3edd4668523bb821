// src/domains/family/types.rs

use crate::errors::{DomainError, DomainResult};
use crate::types::PlanTier;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A family: the owner of every content record and export job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Family {
    pub id: Uuid,
    pub name: String,
    pub owner_user_id: Uuid,
    pub plan_tier: PlanTier,
    pub created_at: DateTime<Utc>,
}

/// Categories of family content, each queried and rendered independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Members,
    JournalEntries,
    JournalPhotos,
    JournalVideos,
    VoiceMemos,
    Stories,
    Recipes,
    Traditions,
    TimeCapsules,
    Locations,
}

impl ContentKind {
    pub const ALL: [ContentKind; 10] = [
        ContentKind::Members,
        ContentKind::JournalEntries,
        ContentKind::JournalPhotos,
        ContentKind::JournalVideos,
        ContentKind::VoiceMemos,
        ContentKind::Stories,
        ContentKind::Recipes,
        ContentKind::Traditions,
        ContentKind::TimeCapsules,
        ContentKind::Locations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Members => "members",
            ContentKind::JournalEntries => "journal_entries",
            ContentKind::JournalPhotos => "journal_photos",
            ContentKind::JournalVideos => "journal_videos",
            ContentKind::VoiceMemos => "voice_memos",
            ContentKind::Stories => "stories",
            ContentKind::Recipes => "recipes",
            ContentKind::Traditions => "traditions",
            ContentKind::TimeCapsules => "time_capsules",
            ContentKind::Locations => "locations",
        }
    }

    /// Human label used in the archive readme
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Members => "Family members",
            ContentKind::JournalEntries => "Journal entries",
            ContentKind::JournalPhotos => "Journal photos",
            ContentKind::JournalVideos => "Journal videos",
            ContentKind::VoiceMemos => "Voice memos",
            ContentKind::Stories => "Stories",
            ContentKind::Recipes => "Recipes",
            ContentKind::Traditions => "Traditions",
            ContentKind::TimeCapsules => "Time capsules",
            ContentKind::Locations => "Locations",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyMember {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub relationship: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: Uuid,
    pub author_id: Option<Uuid>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub trip_date: Option<NaiveDate>,
    pub location_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A photo or video attached to a journal entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalMedia {
    pub id: Uuid,
    pub journal_entry_id: Uuid,
    pub url: String,
    pub caption: Option<String>,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceMemo {
    pub id: Uuid,
    pub recorded_by: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub audio_url: String,
    pub duration_seconds: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Story {
    pub id: Uuid,
    pub author_id: Option<Uuid>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    pub id: Uuid,
    pub created_by: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub ingredients: Vec<String>,
    pub instructions: Option<String>,
    pub servings: Option<i64>,
    pub prep_time_minutes: Option<i64>,
    pub origin: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tradition {
    pub id: Uuid,
    pub created_by: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub frequency: Option<String>,
    pub started_year: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeCapsule {
    pub id: Uuid,
    pub created_by: Option<Uuid>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub unlock_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TimeCapsule {
    /// A capsule is sealed while its unlock date is still ahead of `now`.
    pub fn is_sealed_at(&self, now: DateTime<Utc>) -> bool {
        self.unlock_date > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyLocation {
    pub id: Uuid,
    pub added_by: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_type: Option<String>,
    pub visited_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Decoded rows of one content kind, oldest first, plus how many rows had an
/// unreadable id or timestamp and were left out.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

// --- Row types: loosely typed TEXT columns, decoded once via `into_entity` ---

fn parse_uuid(field: &str, value: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| DomainError::InvalidUuid(format!("{}: {}", field, value)))
}

/// Optional member references never fail the row: a value that is not a
/// UUID is logged and treated as absent, so it renders as unknown.
fn parse_optional_uuid(field: &str, value: Option<String>) -> Option<Uuid> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    match Uuid::parse_str(value) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("Ignoring non-UUID reference in {}: {}", field, value);
            None
        }
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(field: &str, value: &str) -> DomainResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(DomainError::Internal(format!("Bad timestamp in {}: {}", field, value)))
}

/// Lenient date parsing: unparsable values become `None` rather than failing the row.
fn parse_optional_date(value: Option<String>) -> Option<NaiveDate> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Ingredients are stored either as a JSON array of strings or as newline separated text.
pub fn parse_ingredients(value: Option<String>) -> Vec<String> {
    let Some(raw) = non_empty(value) else {
        return Vec::new();
    };
    if let Ok(list) = serde_json::from_str::<Vec<String>>(&raw) {
        return list.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    }
    raw.lines()
        .map(|line| line.trim().trim_start_matches(['-', '*']).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[derive(Debug, Clone, FromRow)]
pub struct FamilyRow {
    pub id: String,
    pub name: String,
    pub owner_user_id: String,
    pub plan_tier: String,
    pub created_at: String,
}

impl FamilyRow {
    pub fn into_entity(self) -> DomainResult<Family> {
        Ok(Family {
            id: parse_uuid("families.id", &self.id)?,
            name: self.name,
            owner_user_id: parse_uuid("families.owner_user_id", &self.owner_user_id)?,
            plan_tier: PlanTier::from_str(&self.plan_tier),
            created_at: parse_timestamp("families.created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FamilyMemberRow {
    pub id: String,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub relationship: Option<String>,
    pub birth_date: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

impl FamilyMemberRow {
    pub fn into_entity(self) -> DomainResult<FamilyMember> {
        Ok(FamilyMember {
            id: parse_uuid("family_members.id", &self.id)?,
            user_id: parse_optional_uuid("family_members.user_id", self.user_id),
            display_name: non_empty(self.display_name),
            role: non_empty(self.role),
            relationship: non_empty(self.relationship),
            birth_date: parse_optional_date(self.birth_date),
            avatar_url: non_empty(self.avatar_url),
            created_at: parse_timestamp("family_members.created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct JournalEntryRow {
    pub id: String,
    pub author_id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub trip_date: Option<String>,
    pub location_name: Option<String>,
    pub created_at: String,
}

impl JournalEntryRow {
    pub fn into_entity(self) -> DomainResult<JournalEntry> {
        Ok(JournalEntry {
            id: parse_uuid("journal_entries.id", &self.id)?,
            author_id: parse_optional_uuid("journal_entries.author_id", self.author_id),
            title: non_empty(self.title),
            content: self.content,
            trip_date: parse_optional_date(self.trip_date),
            location_name: non_empty(self.location_name),
            created_at: parse_timestamp("journal_entries.created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct JournalMediaRow {
    pub id: String,
    pub journal_entry_id: String,
    pub url: String,
    pub caption: Option<String>,
    pub sort_order: Option<i64>,
    pub created_at: String,
}

impl JournalMediaRow {
    pub fn into_entity(self) -> DomainResult<JournalMedia> {
        Ok(JournalMedia {
            id: parse_uuid("journal_media.id", &self.id)?,
            journal_entry_id: parse_uuid("journal_media.journal_entry_id", &self.journal_entry_id)?,
            url: self.url,
            caption: non_empty(self.caption),
            sort_order: self.sort_order.unwrap_or(0),
            created_at: parse_timestamp("journal_media.created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VoiceMemoRow {
    pub id: String,
    pub recorded_by: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub audio_url: String,
    pub duration_seconds: Option<i64>,
    pub created_at: String,
}

impl VoiceMemoRow {
    pub fn into_entity(self) -> DomainResult<VoiceMemo> {
        Ok(VoiceMemo {
            id: parse_uuid("voice_memos.id", &self.id)?,
            recorded_by: parse_optional_uuid("voice_memos.recorded_by", self.recorded_by),
            title: non_empty(self.title),
            description: non_empty(self.description),
            audio_url: self.audio_url,
            duration_seconds: self.duration_seconds,
            created_at: parse_timestamp("voice_memos.created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StoryRow {
    pub id: String,
    pub author_id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub subject: Option<String>,
    pub created_at: String,
}

impl StoryRow {
    pub fn into_entity(self) -> DomainResult<Story> {
        Ok(Story {
            id: parse_uuid("stories.id", &self.id)?,
            author_id: parse_optional_uuid("stories.author_id", self.author_id),
            title: non_empty(self.title),
            content: self.content,
            subject: non_empty(self.subject),
            created_at: parse_timestamp("stories.created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RecipeRow {
    pub id: String,
    pub created_by: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub ingredients: Option<String>,
    pub instructions: Option<String>,
    pub servings: Option<i64>,
    pub prep_time_minutes: Option<i64>,
    pub origin: Option<String>,
    pub created_at: String,
}

impl RecipeRow {
    pub fn into_entity(self) -> DomainResult<Recipe> {
        Ok(Recipe {
            id: parse_uuid("recipes.id", &self.id)?,
            created_by: parse_optional_uuid("recipes.created_by", self.created_by),
            title: non_empty(self.title),
            description: non_empty(self.description),
            ingredients: parse_ingredients(self.ingredients),
            instructions: non_empty(self.instructions),
            servings: self.servings,
            prep_time_minutes: self.prep_time_minutes,
            origin: non_empty(self.origin),
            created_at: parse_timestamp("recipes.created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TraditionRow {
    pub id: String,
    pub created_by: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub frequency: Option<String>,
    pub started_year: Option<i64>,
    pub created_at: String,
}

impl TraditionRow {
    pub fn into_entity(self) -> DomainResult<Tradition> {
        Ok(Tradition {
            id: parse_uuid("traditions.id", &self.id)?,
            created_by: parse_optional_uuid("traditions.created_by", self.created_by),
            title: non_empty(self.title),
            description: non_empty(self.description),
            frequency: non_empty(self.frequency),
            started_year: self.started_year,
            created_at: parse_timestamp("traditions.created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TimeCapsuleRow {
    pub id: String,
    pub created_by: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub unlock_date: String,
    pub created_at: String,
}

impl TimeCapsuleRow {
    pub fn into_entity(self) -> DomainResult<TimeCapsule> {
        Ok(TimeCapsule {
            id: parse_uuid("time_capsules.id", &self.id)?,
            created_by: parse_optional_uuid("time_capsules.created_by", self.created_by),
            title: non_empty(self.title),
            content: self.content,
            unlock_date: parse_timestamp("time_capsules.unlock_date", &self.unlock_date)?,
            created_at: parse_timestamp("time_capsules.created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FamilyLocationRow {
    pub id: String,
    pub added_by: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_type: Option<String>,
    pub visited_at: Option<String>,
    pub created_at: String,
}

impl FamilyLocationRow {
    pub fn into_entity(self) -> DomainResult<FamilyLocation> {
        Ok(FamilyLocation {
            id: parse_uuid("family_locations.id", &self.id)?,
            added_by: parse_optional_uuid("family_locations.added_by", self.added_by),
            name: non_empty(self.name),
            description: non_empty(self.description),
            address: non_empty(self.address),
            latitude: self.latitude,
            longitude: self.longitude,
            location_type: non_empty(self.location_type),
            visited_at: parse_optional_date(self.visited_at),
            created_at: parse_timestamp("family_locations.created_at", &self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_formats() {
        let a = parse_timestamp("t", "2024-03-05T10:00:00Z").unwrap();
        let b = parse_timestamp("t", "2024-03-05 10:00:00").unwrap();
        assert_eq!(a, b);
        let c = parse_timestamp("t", "2024-03-05").unwrap();
        assert_eq!(c.to_rfc3339(), "2024-03-05T00:00:00+00:00");
        assert!(parse_timestamp("t", "yesterday").is_err());
    }

    #[test]
    fn test_ingredients_json_and_lines() {
        assert_eq!(
            parse_ingredients(Some(r#"["2 eggs", " flour ", ""]"#.to_string())),
            vec!["2 eggs".to_string(), "flour".to_string()]
        );
        assert_eq!(
            parse_ingredients(Some("- 2 eggs\n* 1 cup milk\n\n".to_string())),
            vec!["2 eggs".to_string(), "1 cup milk".to_string()]
        );
        assert!(parse_ingredients(None).is_empty());
    }

    #[test]
    fn test_capsule_sealed_relative_to_now() {
        let now = Utc::now();
        let capsule = TimeCapsule {
            id: Uuid::new_v4(),
            created_by: None,
            title: None,
            content: None,
            unlock_date: now + chrono::Duration::days(30),
            created_at: now,
        };
        assert!(capsule.is_sealed_at(now));
        assert!(!capsule.is_sealed_at(now + chrono::Duration::days(31)));
    }

    #[test]
    fn test_blank_optional_uuid_is_none() {
        let row = StoryRow {
            id: Uuid::new_v4().to_string(),
            author_id: Some("   ".to_string()),
            title: Some("".to_string()),
            content: None,
            subject: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let story = row.into_entity().unwrap();
        assert_eq!(story.author_id, None);
        assert_eq!(story.title, None);
    }

    #[test]
    fn test_foreign_reference_keeps_the_row() {
        let row = VoiceMemoRow {
            id: Uuid::new_v4().to_string(),
            recorded_by: Some("legacy-user-7".to_string()),
            title: Some("Lullaby".to_string()),
            description: None,
            audio_url: "https://cdn.test/a.m4a".to_string(),
            duration_seconds: Some(42),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let memo = row.into_entity().unwrap();
        assert_eq!(memo.recorded_by, None);
        assert_eq!(memo.title.as_deref(), Some("Lullaby"));
    }
}
