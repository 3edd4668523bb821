use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::domains::family::types::{
    Decoded, FamilyLocation, FamilyMember, JournalEntry, JournalMedia, Recipe, Story, TimeCapsule,
    Tradition, VoiceMemo,
};
use crate::domains::family::{ContentKind, Family, FamilyContentRepository};
use crate::errors::DomainResult;

use super::types::{AggregationFailure, SkippedRows};

/// Result of looking a member reference up in the roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberName {
    Resolved(String),
    Unresolved,
}

impl MemberName {
    pub const UNKNOWN: &'static str = "Unknown";

    pub fn is_resolved(&self) -> bool {
        matches!(self, MemberName::Resolved(_))
    }
}

impl fmt::Display for MemberName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberName::Resolved(name) => f.write_str(name),
            MemberName::Unresolved => f.write_str(Self::UNKNOWN),
        }
    }
}

/// Per-run snapshot of everything a family owns. Never persisted.
#[derive(Debug, Clone)]
pub struct AggregatedFamilyContent {
    pub family: Family,
    pub members: Vec<FamilyMember>,
    pub journal_entries: Vec<JournalEntry>,
    pub voice_memos: Vec<VoiceMemo>,
    pub stories: Vec<Story>,
    pub recipes: Vec<Recipe>,
    pub traditions: Vec<Tradition>,
    pub time_capsules: Vec<TimeCapsule>,
    pub locations: Vec<FamilyLocation>,
    /// Kinds whose query failed; they are present above as empty lists.
    pub failures: Vec<AggregationFailure>,
    /// Kinds that lost individual unreadable rows.
    pub skipped_rows: Vec<SkippedRows>,
    member_names: HashMap<Uuid, String>,
    photos_by_entry: HashMap<Uuid, Vec<JournalMedia>>,
    videos_by_entry: HashMap<Uuid, Vec<JournalMedia>>,
    photo_count: usize,
    video_count: usize,
}

impl AggregatedFamilyContent {
    /// Assemble the snapshot and build the member and parent/child indexes.
    pub fn new(family: Family, members: Vec<FamilyMember>, journal_entries: Vec<JournalEntry>) -> Self {
        let member_names = index_members(&members);
        Self {
            family,
            members,
            journal_entries,
            voice_memos: Vec::new(),
            stories: Vec::new(),
            recipes: Vec::new(),
            traditions: Vec::new(),
            time_capsules: Vec::new(),
            locations: Vec::new(),
            failures: Vec::new(),
            skipped_rows: Vec::new(),
            member_names,
            photos_by_entry: HashMap::new(),
            videos_by_entry: HashMap::new(),
            photo_count: 0,
            video_count: 0,
        }
    }

    /// Attach journal photos and videos to their entries, keeping sort order.
    /// Media whose entry is not part of this snapshot is dropped.
    pub fn with_journal_media(mut self, photos: Vec<JournalMedia>, videos: Vec<JournalMedia>) -> Self {
        self.photos_by_entry = group_by_entry(&self.journal_entries, photos);
        self.videos_by_entry = group_by_entry(&self.journal_entries, videos);
        self.photo_count = self.photos_by_entry.values().map(Vec::len).sum();
        self.video_count = self.videos_by_entry.values().map(Vec::len).sum();
        self
    }

    pub fn resolve_member(&self, id: Option<Uuid>) -> MemberName {
        id.and_then(|id| self.member_names.get(&id))
            .map(|name| MemberName::Resolved(name.clone()))
            .unwrap_or(MemberName::Unresolved)
    }

    pub fn photos_for(&self, entry_id: Uuid) -> &[JournalMedia] {
        self.photos_by_entry.get(&entry_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn videos_for(&self, entry_id: Uuid) -> &[JournalMedia] {
        self.videos_by_entry.get(&entry_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, kind: ContentKind) -> usize {
        match kind {
            ContentKind::Members => self.members.len(),
            ContentKind::JournalEntries => self.journal_entries.len(),
            ContentKind::JournalPhotos => self.photo_count,
            ContentKind::JournalVideos => self.video_count,
            ContentKind::VoiceMemos => self.voice_memos.len(),
            ContentKind::Stories => self.stories.len(),
            ContentKind::Recipes => self.recipes.len(),
            ContentKind::Traditions => self.traditions.len(),
            ContentKind::TimeCapsules => self.time_capsules.len(),
            ContentKind::Locations => self.locations.len(),
        }
    }

    pub fn failed_kinds(&self) -> Vec<ContentKind> {
        self.failures.iter().map(|f| f.kind).collect()
    }

    /// True when the archive is missing anything that exists in the database.
    pub fn is_incomplete(&self) -> bool {
        !self.failures.is_empty() || !self.skipped_rows.is_empty()
    }
}

/// Members are referenced both by their own id and by their user id.
fn index_members(members: &[FamilyMember]) -> HashMap<Uuid, String> {
    let mut names = HashMap::new();
    for member in members {
        let Some(name) = member.display_name.as_ref() else {
            continue;
        };
        names.insert(member.id, name.clone());
        if let Some(user_id) = member.user_id {
            names.insert(user_id, name.clone());
        }
    }
    names
}

fn group_by_entry(entries: &[JournalEntry], media: Vec<JournalMedia>) -> HashMap<Uuid, Vec<JournalMedia>> {
    let mut grouped: HashMap<Uuid, Vec<JournalMedia>> =
        entries.iter().map(|e| (e.id, Vec::new())).collect();
    let mut orphans = 0usize;
    for item in media {
        match grouped.get_mut(&item.journal_entry_id) {
            Some(list) => list.push(item),
            None => orphans += 1,
        }
    }
    if orphans > 0 {
        debug!("Dropped {} journal media items with no matching entry", orphans);
    }
    for list in grouped.values_mut() {
        list.sort_by_key(|m| (m.sort_order, m.created_at));
    }
    grouped
}

/// Runs every per-kind query for one family concurrently and joins the results.
pub struct ContentAggregator {
    repo: Arc<dyn FamilyContentRepository>,
}

impl ContentAggregator {
    pub fn new(repo: Arc<dyn FamilyContentRepository>) -> Self {
        Self { repo }
    }

    /// Never fails: a kind whose query errors renders empty and is recorded
    /// in `failures`.
    pub async fn aggregate(&self, family: &Family) -> AggregatedFamilyContent {
        let id = family.id;
        let repo = &self.repo;

        let (members, entries, photos, videos, memos, stories, recipes, traditions, capsules, locations) = tokio::join!(
            repo.list_members(id),
            repo.list_journal_entries(id),
            repo.list_journal_photos(id),
            repo.list_journal_videos(id),
            repo.list_voice_memos(id),
            repo.list_stories(id),
            repo.list_recipes(id),
            repo.list_traditions(id),
            repo.list_time_capsules(id),
            repo.list_locations(id),
        );

        let mut report = Report::default();
        let members = report.absorb(ContentKind::Members, members);
        let entries = report.absorb(ContentKind::JournalEntries, entries);
        let photos = report.absorb(ContentKind::JournalPhotos, photos);
        let videos = report.absorb(ContentKind::JournalVideos, videos);

        let mut content = AggregatedFamilyContent::new(family.clone(), members, entries)
            .with_journal_media(photos, videos);
        content.voice_memos = report.absorb(ContentKind::VoiceMemos, memos);
        content.stories = report.absorb(ContentKind::Stories, stories);
        content.recipes = report.absorb(ContentKind::Recipes, recipes);
        content.traditions = report.absorb(ContentKind::Traditions, traditions);
        content.time_capsules = report.absorb(ContentKind::TimeCapsules, capsules);
        content.locations = report.absorb(ContentKind::Locations, locations);
        content.failures = report.failures;
        content.skipped_rows = report.skipped;

        debug!(
            "Aggregated family {}: {} members, {} journal entries, {} failed kinds, {} kinds with skipped rows",
            id,
            content.members.len(),
            content.journal_entries.len(),
            content.failures.len(),
            content.skipped_rows.len()
        );
        content
    }
}

#[derive(Default)]
struct Report {
    failures: Vec<AggregationFailure>,
    skipped: Vec<SkippedRows>,
}

impl Report {
    fn absorb<T>(&mut self, kind: ContentKind, result: DomainResult<Decoded<T>>) -> Vec<T> {
        match result {
            Ok(decoded) => {
                if decoded.skipped > 0 {
                    warn!("{} unreadable {} rows left out of the export", decoded.skipped, kind.as_str());
                    self.skipped.push(SkippedRows {
                        kind,
                        count: decoded.skipped,
                    });
                }
                decoded.items
            }
            Err(e) => {
                warn!("Query for {} failed, exporting it empty: {}", kind.as_str(), e);
                self.failures.push(AggregationFailure {
                    kind,
                    message: e.to_string(),
                });
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_migration::test_pool;
    use crate::domains::family::fixtures::*;
    use crate::domains::family::SqliteFamilyRepository;
    use crate::types::PlanTier;

    #[tokio::test]
    async fn test_aggregate_joins_children_and_resolves_members() {
        let pool = test_pool().await;
        let family = insert_family(&pool, "Okafor", PlanTier::Premium).await;
        let ada = Uuid::new_v4();
        insert_member(&pool, family.id, Some(ada), Some("Ada"), "2024-01-01T00:00:00Z").await;
        insert_member(&pool, family.id, None, None, "2024-01-02T00:00:00Z").await;

        let beach = insert_journal_entry(&pool, family.id, Some(ada), "Beach", None, "2024-01-01T00:00:00Z").await;
        let hike = insert_journal_entry(&pool, family.id, Some(Uuid::new_v4()), "Hike", None, "2024-02-01T00:00:00Z").await;
        insert_journal_media(&pool, "journal_photos", beach, "https://cdn.test/2.jpg", None, 2).await;
        insert_journal_media(&pool, "journal_photos", beach, "https://cdn.test/1.jpg", None, 1).await;
        insert_journal_media(&pool, "journal_videos", hike, "https://cdn.test/v.mp4", None, 0).await;

        let aggregator = ContentAggregator::new(Arc::new(SqliteFamilyRepository::new(pool)));
        let content = aggregator.aggregate(&family).await;

        assert!(content.failures.is_empty());
        assert_eq!(content.members.len(), 2);
        let titles: Vec<_> = content.journal_entries.iter().map(|e| e.title.clone().unwrap()).collect();
        assert_eq!(titles, vec!["Beach", "Hike"]);

        let beach_photos: Vec<_> = content.photos_for(beach).iter().map(|p| p.url.as_str()).collect();
        assert_eq!(beach_photos, vec!["https://cdn.test/1.jpg", "https://cdn.test/2.jpg"]);
        assert!(content.photos_for(hike).is_empty());
        assert_eq!(content.videos_for(hike).len(), 1);
        assert_eq!(content.count(ContentKind::JournalPhotos), 2);

        assert_eq!(content.resolve_member(Some(ada)), MemberName::Resolved("Ada".to_string()));
        let stranger = content.resolve_member(content.journal_entries[1].author_id);
        assert_eq!(stranger, MemberName::Unresolved);
        assert!(!stranger.is_resolved());
        assert_eq!(stranger.to_string(), "Unknown");
        assert_eq!(content.resolve_member(None).to_string(), "Unknown");
    }

    #[tokio::test]
    async fn test_failed_kind_renders_empty_without_aborting() {
        let pool = test_pool().await;
        let family = insert_family(&pool, "Okafor", PlanTier::Premium).await;
        insert_story(&pool, family.id, "Grandpa's boat", "It leaked.", "2024-01-01T00:00:00Z").await;
        insert_recipe(&pool, family.id, "Jollof", "rice", "2024-01-01T00:00:00Z").await;

        sqlx::query("DROP TABLE recipes").execute(&pool).await.unwrap();

        let aggregator = ContentAggregator::new(Arc::new(SqliteFamilyRepository::new(pool)));
        let content = aggregator.aggregate(&family).await;

        assert!(content.recipes.is_empty());
        assert_eq!(content.stories.len(), 1);
        assert_eq!(content.failed_kinds(), vec![ContentKind::Recipes]);
        assert!(!content.failures[0].message.is_empty());
        assert!(content.is_incomplete());
    }

    #[tokio::test]
    async fn test_unreadable_rows_are_reported_per_kind() {
        let pool = test_pool().await;
        let family = insert_family(&pool, "Okafor", PlanTier::Premium).await;
        insert_story(&pool, family.id, "Grandpa's boat", "It leaked.", "2024-01-01T00:00:00Z").await;
        insert_story(&pool, family.id, "Undated", "?", "sometime in spring").await;

        let aggregator = ContentAggregator::new(Arc::new(SqliteFamilyRepository::new(pool)));
        let content = aggregator.aggregate(&family).await;

        assert_eq!(content.stories.len(), 1);
        assert!(content.failures.is_empty());
        assert_eq!(
            content.skipped_rows,
            vec![SkippedRows {
                kind: ContentKind::Stories,
                count: 1
            }]
        );
        assert!(content.is_incomplete());
    }

    #[tokio::test]
    async fn test_empty_family() {
        let pool = test_pool().await;
        let family = insert_family(&pool, "Empty", PlanTier::Premium).await;

        let aggregator = ContentAggregator::new(Arc::new(SqliteFamilyRepository::new(pool)));
        let content = aggregator.aggregate(&family).await;

        for kind in ContentKind::ALL {
            assert_eq!(content.count(kind), 0, "{}", kind.as_str());
        }
        assert!(!content.is_incomplete());
    }
}
