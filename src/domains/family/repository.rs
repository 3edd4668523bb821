use crate::domains::family::types::{
    Decoded, Family, FamilyLocation, FamilyLocationRow, FamilyMember, FamilyMemberRow, FamilyRow,
    JournalEntry, JournalEntryRow, JournalMedia, JournalMediaRow, Recipe, RecipeRow, Story,
    StoryRow, TimeCapsule, TimeCapsuleRow, Tradition, TraditionRow, VoiceMemo, VoiceMemoRow,
};
use crate::errors::{DbError, DomainError, DomainResult};
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};
use uuid::Uuid;

/// Lookup of families by owner or id
#[async_trait]
pub trait FamilyRepository: Send + Sync {
    /// The family owned by `user_id`, if any (oldest first when several exist).
    async fn find_owned_by(&self, user_id: Uuid) -> DomainResult<Option<Family>>;

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Family>;
}

/// Read-only, family-scoped queries over every content kind.
/// Every list is ordered oldest first by parsed `created_at`; rows whose id or
/// timestamp cannot be read are counted in `Decoded::skipped`.
#[async_trait]
pub trait FamilyContentRepository: Send + Sync {
    async fn list_members(&self, family_id: Uuid) -> DomainResult<Decoded<FamilyMember>>;
    async fn list_journal_entries(&self, family_id: Uuid) -> DomainResult<Decoded<JournalEntry>>;
    /// Photos of every journal entry in the family, ordered by `sort_order`
    async fn list_journal_photos(&self, family_id: Uuid) -> DomainResult<Decoded<JournalMedia>>;
    /// Videos of every journal entry in the family, ordered by `sort_order`
    async fn list_journal_videos(&self, family_id: Uuid) -> DomainResult<Decoded<JournalMedia>>;
    async fn list_voice_memos(&self, family_id: Uuid) -> DomainResult<Decoded<VoiceMemo>>;
    async fn list_stories(&self, family_id: Uuid) -> DomainResult<Decoded<Story>>;
    async fn list_recipes(&self, family_id: Uuid) -> DomainResult<Decoded<Recipe>>;
    async fn list_traditions(&self, family_id: Uuid) -> DomainResult<Decoded<Tradition>>;
    async fn list_time_capsules(&self, family_id: Uuid) -> DomainResult<Decoded<TimeCapsule>>;
    async fn list_locations(&self, family_id: Uuid) -> DomainResult<Decoded<FamilyLocation>>;
}

/// SQLite implementation of both family repositories
#[derive(Debug, Clone)]
pub struct SqliteFamilyRepository {
    pool: SqlitePool,
}

impl SqliteFamilyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Decode rows one by one, then order them by `sort_key`.
    ///
    /// A row that fails to decode is logged and counted rather than taking the
    /// rest of its content kind down with it. Timestamps are stored in several
    /// text formats, so ordering happens after parsing; the sort is stable.
    fn decode_rows<R, T, F, K>(table: &str, rows: Vec<R>, decode: F, sort_key: impl Fn(&T) -> K) -> Decoded<T>
    where
        F: Fn(R) -> DomainResult<T>,
        K: Ord,
    {
        let mut skipped = 0;
        let mut items: Vec<T> = rows
            .into_iter()
            .filter_map(|row| match decode(row) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    log::warn!("Skipping malformed {} row: {}", table, e);
                    skipped += 1;
                    None
                }
            })
            .collect();
        items.sort_by_key(sort_key);
        Decoded { items, skipped }
    }
}

#[async_trait]
impl FamilyRepository for SqliteFamilyRepository {
    async fn find_owned_by(&self, user_id: Uuid) -> DomainResult<Option<Family>> {
        let rows = query_as::<_, FamilyRow>(
            "SELECT id, name, owner_user_id, plan_tier, created_at FROM families WHERE owner_user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let families = rows
            .into_iter()
            .map(FamilyRow::into_entity)
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(families.into_iter().min_by_key(|f| f.created_at))
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Family> {
        let row = query_as::<_, FamilyRow>(
            "SELECT id, name, owner_user_id, plan_tier, created_at FROM families WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?
        .ok_or_else(|| DomainError::EntityNotFound("Family".to_string(), id))?;

        row.into_entity()
    }
}

#[async_trait]
impl FamilyContentRepository for SqliteFamilyRepository {
    async fn list_members(&self, family_id: Uuid) -> DomainResult<Decoded<FamilyMember>> {
        let rows = query_as::<_, FamilyMemberRow>(
            "SELECT id, user_id, display_name, role, relationship, birth_date, avatar_url, created_at
             FROM family_members WHERE family_id = ?",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::decode_rows("family_members", rows, FamilyMemberRow::into_entity, |r: &FamilyMember| r.created_at))
    }

    async fn list_journal_entries(&self, family_id: Uuid) -> DomainResult<Decoded<JournalEntry>> {
        let rows = query_as::<_, JournalEntryRow>(
            "SELECT id, author_id, title, content, trip_date, location_name, created_at
             FROM journal_entries WHERE family_id = ?",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::decode_rows("journal_entries", rows, JournalEntryRow::into_entity, |r: &JournalEntry| r.created_at))
    }

    async fn list_journal_photos(&self, family_id: Uuid) -> DomainResult<Decoded<JournalMedia>> {
        let rows = query_as::<_, JournalMediaRow>(
            "SELECT p.id, p.journal_entry_id, p.url, p.caption, p.sort_order, p.created_at
             FROM journal_photos p
             JOIN journal_entries j ON j.id = p.journal_entry_id
             WHERE j.family_id = ?
             ORDER BY p.sort_order ASC",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::decode_rows("journal_photos", rows, JournalMediaRow::into_entity, |m: &JournalMedia| {
            (m.sort_order, m.created_at)
        }))
    }

    async fn list_journal_videos(&self, family_id: Uuid) -> DomainResult<Decoded<JournalMedia>> {
        let rows = query_as::<_, JournalMediaRow>(
            "SELECT v.id, v.journal_entry_id, v.url, v.caption, v.sort_order, v.created_at
             FROM journal_videos v
             JOIN journal_entries j ON j.id = v.journal_entry_id
             WHERE j.family_id = ?
             ORDER BY v.sort_order ASC",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::decode_rows("journal_videos", rows, JournalMediaRow::into_entity, |m: &JournalMedia| {
            (m.sort_order, m.created_at)
        }))
    }

    async fn list_voice_memos(&self, family_id: Uuid) -> DomainResult<Decoded<VoiceMemo>> {
        let rows = query_as::<_, VoiceMemoRow>(
            "SELECT id, recorded_by, title, description, audio_url, duration_seconds, created_at
             FROM voice_memos WHERE family_id = ?",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::decode_rows("voice_memos", rows, VoiceMemoRow::into_entity, |r: &VoiceMemo| r.created_at))
    }

    async fn list_stories(&self, family_id: Uuid) -> DomainResult<Decoded<Story>> {
        let rows = query_as::<_, StoryRow>(
            "SELECT id, author_id, title, content, subject, created_at
             FROM stories WHERE family_id = ?",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::decode_rows("stories", rows, StoryRow::into_entity, |r: &Story| r.created_at))
    }

    async fn list_recipes(&self, family_id: Uuid) -> DomainResult<Decoded<Recipe>> {
        let rows = query_as::<_, RecipeRow>(
            "SELECT id, created_by, title, description, ingredients, instructions, servings, prep_time_minutes, origin, created_at
             FROM recipes WHERE family_id = ?",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::decode_rows("recipes", rows, RecipeRow::into_entity, |r: &Recipe| r.created_at))
    }

    async fn list_traditions(&self, family_id: Uuid) -> DomainResult<Decoded<Tradition>> {
        let rows = query_as::<_, TraditionRow>(
            "SELECT id, created_by, title, description, frequency, started_year, created_at
             FROM traditions WHERE family_id = ?",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::decode_rows("traditions", rows, TraditionRow::into_entity, |r: &Tradition| r.created_at))
    }

    async fn list_time_capsules(&self, family_id: Uuid) -> DomainResult<Decoded<TimeCapsule>> {
        let rows = query_as::<_, TimeCapsuleRow>(
            "SELECT id, created_by, title, content, unlock_date, created_at
             FROM time_capsules WHERE family_id = ?",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::decode_rows("time_capsules", rows, TimeCapsuleRow::into_entity, |r: &TimeCapsule| r.created_at))
    }

    async fn list_locations(&self, family_id: Uuid) -> DomainResult<Decoded<FamilyLocation>> {
        let rows = query_as::<_, FamilyLocationRow>(
            "SELECT id, added_by, name, description, address, latitude, longitude, location_type, visited_at, created_at
             FROM family_locations WHERE family_id = ?",
        )
        .bind(family_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::decode_rows("family_locations", rows, FamilyLocationRow::into_entity, |r: &FamilyLocation| r.created_at))
    }
}
