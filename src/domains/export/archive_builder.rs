//! Turns an [`AggregatedFamilyContent`] snapshot into the archive's file tree.
//!
//! Layout:
//!
//! ```text
//! README.txt
//! family-tree.json
//! family-map.json
//! journals/<trip-or-created-date>_<title>.md
//! photos/photo_0001.<ext>
//! videos/video_0001.<ext>
//! voice-memos/<date>_<title>.<ext>  + .md sidecar
//! stories/<created-date>_<title>.md
//! recipes/<title>.md
//! traditions/<title>.md
//! time-capsules/<sealed|opened>_<title>.md
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use uuid::Uuid;

use crate::domains::family::types::{JournalEntry, JournalMedia, TimeCapsule, VoiceMemo};
use crate::domains::family::ContentKind;
use crate::errors::{ServiceError, ServiceResult};

use super::aggregator::AggregatedFamilyContent;
use super::asset_fetcher::AssetFetcher;
use super::naming::{date_prefix, extension_from_url, file_title, numbered_asset_name, PathAllocator};
use super::types::{ArchiveEntry, RetrievalFailure};

pub const README_PATH: &str = "README.txt";
pub const ROSTER_PATH: &str = "family-tree.json";
pub const MAP_PATH: &str = "family-map.json";

pub const SEALED_LABEL: &str = "SEALED";
pub const OPENED_LABEL: &str = "OPENED";
pub const PRE_RELEASE_NOTE: &str =
    "Note: this capsule was still sealed when the archive was made. Its contents are included for safekeeping and were not meant to be read before the unlock date.";

/// Kind of journal asset: folder, file stem and fallback extension
#[derive(Debug, Clone, Copy)]
enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    fn folder(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photos",
            MediaKind::Video => "videos",
        }
    }

    fn stem(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }

    fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Photo => "jpg",
            MediaKind::Video => "mp4",
        }
    }
}

const AUDIO_DEFAULT_EXTENSION: &str = "m4a";

/// Renders documents and embeds assets. Asset fetches run one at a time so
/// each document's lines come out in order.
pub struct ArchiveBuilder {
    fetcher: Arc<dyn AssetFetcher>,
    max_title_len: usize,
}

impl ArchiveBuilder {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, max_title_len: usize) -> Self {
        Self { fetcher, max_title_len }
    }

    /// Build the ordered entry list. `now` decides sealed vs opened capsules
    /// and is recorded as the export timestamp.
    pub async fn build(&self, content: &AggregatedFamilyContent, now: DateTime<Utc>) -> ServiceResult<Vec<ArchiveEntry>> {
        let mut run = BuildRun::new(self, content, now);

        for entry in &content.journal_entries {
            run.journal_entry(entry).await;
        }
        for memo in &content.voice_memos {
            run.voice_memo(memo).await;
        }
        run.stories();
        run.recipes();
        run.traditions();
        for capsule in &content.time_capsules {
            run.time_capsule(capsule);
        }

        run.finish()
    }
}

struct BuildRun<'a> {
    builder: &'a ArchiveBuilder,
    content: &'a AggregatedFamilyContent,
    now: DateTime<Utc>,
    entries: Vec<ArchiveEntry>,
    paths: PathAllocator,
    photo_counter: u32,
    video_counter: u32,
    unavailable_assets: usize,
}

impl<'a> BuildRun<'a> {
    fn new(builder: &'a ArchiveBuilder, content: &'a AggregatedFamilyContent, now: DateTime<Utc>) -> Self {
        let mut paths = PathAllocator::new();
        for fixed in [README_PATH, ROSTER_PATH, MAP_PATH] {
            paths.reserve(fixed);
        }
        Self {
            builder,
            content,
            now,
            entries: Vec::new(),
            paths,
            photo_counter: 0,
            video_counter: 0,
            unavailable_assets: 0,
        }
    }

    fn title(&self, title: Option<&str>) -> String {
        file_title(title, self.builder.max_title_len)
    }

    fn add_document(&mut self, dir: &str, base: &str, body: String) {
        let base = self.paths.allocate(dir, base, &["md"]);
        self.entries.push(ArchiveEntry::text(PathAllocator::join(dir, &base, "md"), body));
    }

    async fn fetch(&mut self, url: &str) -> Result<Vec<u8>, RetrievalFailure> {
        let result = self.builder.fetcher.fetch(url).await;
        if let Err(failure) = &result {
            warn!("Asset {} not downloaded, writing reference instead: {}", url, failure);
            self.unavailable_assets += 1;
        }
        result
    }

    async fn journal_entry(&mut self, entry: &JournalEntry) {
        let date = entry.trip_date.unwrap_or_else(|| entry.created_at.date_naive());
        let base = format!("{}_{}", date_prefix(date), self.title(entry.title.as_deref()));

        let content = self.content;
        let mut doc = heading(entry.title.as_deref());
        field(&mut doc, "Author", Some(content.resolve_member(entry.author_id)));
        field(&mut doc, "Trip date", entry.trip_date.map(date_prefix));
        field(&mut doc, "Location", entry.location_name.as_deref());
        field(&mut doc, "Created", Some(date_prefix(entry.created_at.date_naive())));
        body(&mut doc, entry.content.as_deref());

        let photos = content.photos_for(entry.id);
        if !photos.is_empty() {
            doc.push_str("\n## Photos\n\n");
            for photo in photos {
                let line = self.embed_media(MediaKind::Photo, photo).await;
                doc.push_str(&line);
            }
        }

        let videos = content.videos_for(entry.id);
        if !videos.is_empty() {
            doc.push_str("\n## Videos\n\n");
            for video in videos {
                let line = self.embed_media(MediaKind::Video, video).await;
                doc.push_str(&line);
            }
        }

        self.add_document("journals", &base, doc);
    }

    /// Fetch one journal asset and return the reference line for its document.
    async fn embed_media(&mut self, kind: MediaKind, media: &JournalMedia) -> String {
        let counter = match kind {
            MediaKind::Photo => {
                self.photo_counter += 1;
                self.photo_counter
            }
            MediaKind::Video => {
                self.video_counter += 1;
                self.video_counter
            }
        };
        let caption = media
            .caption
            .as_deref()
            .map(|c| format!(" - {}", c))
            .unwrap_or_default();

        match self.fetch(&media.url).await {
            Ok(bytes) => {
                let ext = asset_extension(&media.url, &bytes, kind.default_extension());
                let name = numbered_asset_name(kind.stem(), counter, &ext);
                let path = format!("{}/{}", kind.folder(), name);
                self.paths.reserve(&path);
                self.entries.push(ArchiveEntry::binary(path.clone(), bytes));
                format!("- [{}](../{}){}\n", name, path, caption)
            }
            Err(failure) => format!(
                "- {}_{:04}{} (not downloaded: {})\n  Original: {}\n",
                kind.stem(),
                counter,
                caption,
                failure,
                media.url
            ),
        }
    }

    async fn voice_memo(&mut self, memo: &VoiceMemo) {
        let base = format!(
            "{}_{}",
            date_prefix(memo.created_at.date_naive()),
            self.title(memo.title.as_deref())
        );
        let dir = "voice-memos";

        let mut doc = heading(memo.title.as_deref());
        field(&mut doc, "Recorded by", Some(self.content.resolve_member(memo.recorded_by)));
        field(&mut doc, "Recorded", Some(date_prefix(memo.created_at.date_naive())));
        field(&mut doc, "Duration", memo.duration_seconds.filter(|s| *s >= 0).map(format_duration));

        match self.fetch(&memo.audio_url).await {
            Ok(bytes) => {
                let ext = asset_extension(&memo.audio_url, &bytes, AUDIO_DEFAULT_EXTENSION);
                let base = self.paths.allocate(dir, &base, &[ext.as_str(), "md"]);
                field(&mut doc, "Audio file", Some(format!("{}.{}", base, ext)));
                body(&mut doc, memo.description.as_deref());

                self.entries.push(ArchiveEntry::binary(PathAllocator::join(dir, &base, &ext), bytes));
                self.entries.push(ArchiveEntry::text(PathAllocator::join(dir, &base, "md"), doc));
            }
            Err(failure) => {
                field(&mut doc, "Audio", Some(format!("not downloaded ({})", failure)));
                doc.push_str(&format!("Original: {}\n", memo.audio_url));
                body(&mut doc, memo.description.as_deref());
                self.add_document(dir, &base, doc);
            }
        }
    }

    fn stories(&mut self) {
        let content = self.content;
        for story in &content.stories {
            let base = format!(
                "{}_{}",
                date_prefix(story.created_at.date_naive()),
                self.title(story.title.as_deref())
            );
            let mut doc = heading(story.title.as_deref());
            field(&mut doc, "Author", Some(content.resolve_member(story.author_id)));
            field(&mut doc, "Subject", story.subject.as_deref());
            field(&mut doc, "Created", Some(date_prefix(story.created_at.date_naive())));
            body(&mut doc, story.content.as_deref());
            self.add_document("stories", &base, doc);
        }
    }

    fn recipes(&mut self) {
        let content = self.content;
        for recipe in &content.recipes {
            let base = self.title(recipe.title.as_deref());
            let mut doc = heading(recipe.title.as_deref());
            field(&mut doc, "Added by", Some(content.resolve_member(recipe.created_by)));
            field(&mut doc, "Origin", recipe.origin.as_deref());
            field(&mut doc, "Servings", recipe.servings);
            field(&mut doc, "Prep time", recipe.prep_time_minutes.map(|m| format!("{} min", m)));
            body(&mut doc, recipe.description.as_deref());

            if !recipe.ingredients.is_empty() {
                doc.push_str("\n## Ingredients\n\n");
                for ingredient in &recipe.ingredients {
                    doc.push_str(&format!("- {}\n", ingredient));
                }
            }
            if let Some(instructions) = recipe.instructions.as_deref() {
                doc.push_str("\n## Instructions\n\n");
                doc.push_str(instructions.trim_end());
                doc.push('\n');
            }
            self.add_document("recipes", &base, doc);
        }
    }

    fn traditions(&mut self) {
        let content = self.content;
        for tradition in &content.traditions {
            let base = self.title(tradition.title.as_deref());
            let mut doc = heading(tradition.title.as_deref());
            field(&mut doc, "Added by", Some(content.resolve_member(tradition.created_by)));
            field(&mut doc, "Frequency", tradition.frequency.as_deref());
            field(&mut doc, "Since", tradition.started_year);
            body(&mut doc, tradition.description.as_deref());
            self.add_document("traditions", &base, doc);
        }
    }

    /// Sealed capsules keep their full body, flagged as pre-release.
    fn time_capsule(&mut self, capsule: &TimeCapsule) {
        let sealed = capsule.is_sealed_at(self.now);
        let (label, prefix) = if sealed {
            (SEALED_LABEL, "sealed")
        } else {
            (OPENED_LABEL, "opened")
        };
        let base = format!("{}_{}", prefix, self.title(capsule.title.as_deref()));

        let mut doc = heading(capsule.title.as_deref());
        field(&mut doc, "Status", Some(label));
        field(&mut doc, "Created by", Some(self.content.resolve_member(capsule.created_by)));
        field(&mut doc, "Unlock date", Some(date_prefix(capsule.unlock_date.date_naive())));
        field(&mut doc, "Created", Some(date_prefix(capsule.created_at.date_naive())));
        if sealed {
            doc.push_str(&format!("\n> {}\n", PRE_RELEASE_NOTE));
        }
        body(&mut doc, capsule.content.as_deref());
        self.add_document("time-capsules", &base, doc);
    }

    fn finish(self) -> ServiceResult<Vec<ArchiveEntry>> {
        let roster = to_json(&Roster::from_content(self.content, self.now))?;
        let map = to_json(&LocationMap::from_content(self.content, self.now))?;
        let readme = readme(self.content, self.now, self.unavailable_assets);

        let mut entries = Vec::with_capacity(self.entries.len() + 3);
        entries.push(ArchiveEntry::text(README_PATH, readme));
        entries.push(ArchiveEntry::text(ROSTER_PATH, roster));
        entries.push(ArchiveEntry::text(MAP_PATH, map));
        entries.extend(self.entries);

        debug!(
            "Built {} archive entries for family {} ({} assets unavailable)",
            entries.len(),
            self.content.family.id,
            self.unavailable_assets
        );
        Ok(entries)
    }
}

/// URL extension, else sniffed from the bytes, else the per-kind default.
fn asset_extension(url: &str, bytes: &[u8], default: &str) -> String {
    extension_from_url(url)
        .or_else(|| infer::get(bytes).map(|kind| kind.extension().to_string()))
        .unwrap_or_else(|| default.to_string())
}

fn heading(title: Option<&str>) -> String {
    format!("# {}\n\n", title.unwrap_or("Untitled"))
}

fn field<T: Display>(doc: &mut String, label: &str, value: Option<T>) {
    if let Some(value) = value {
        doc.push_str(&format!("**{}:** {}\n", label, value));
    }
}

fn body(doc: &mut String, text: Option<&str>) {
    if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
        doc.push('\n');
        doc.push_str(text);
        doc.push('\n');
    }
}

fn format_duration(seconds: i64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn to_json<T: Serialize>(value: &T) -> ServiceResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ServiceError::PackagingFailed(format!("Failed to serialize summary document: {}", e)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Roster {
    family_id: Uuid,
    family_name: String,
    exported_at: DateTime<Utc>,
    members: Vec<RosterMember>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RosterMember {
    id: Uuid,
    user_id: Option<Uuid>,
    display_name: String,
    role: Option<String>,
    relationship: Option<String>,
    birth_date: Option<NaiveDate>,
    avatar_url: Option<String>,
    joined_at: DateTime<Utc>,
}

impl Roster {
    fn from_content(content: &AggregatedFamilyContent, now: DateTime<Utc>) -> Self {
        let members = content
            .members
            .iter()
            .map(|m| RosterMember {
                id: m.id,
                user_id: m.user_id,
                display_name: content.resolve_member(Some(m.id)).to_string(),
                role: m.role.clone(),
                relationship: m.relationship.clone(),
                birth_date: m.birth_date,
                avatar_url: m.avatar_url.clone(),
                joined_at: m.created_at,
            })
            .collect();

        Self {
            family_id: content.family.id,
            family_name: content.family.name.clone(),
            exported_at: now,
            members,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationMap {
    family_id: Uuid,
    family_name: String,
    exported_at: DateTime<Utc>,
    locations: Vec<MapLocation>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MapLocation {
    id: Uuid,
    name: Option<String>,
    description: Option<String>,
    address: Option<String>,
    coordinates: Option<Coordinates>,
    location_type: Option<String>,
    visited_at: Option<NaiveDate>,
    added_by: String,
}

#[derive(Serialize)]
struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl LocationMap {
    fn from_content(content: &AggregatedFamilyContent, now: DateTime<Utc>) -> Self {
        let locations = content
            .locations
            .iter()
            .map(|l| MapLocation {
                id: l.id,
                name: l.name.clone(),
                description: l.description.clone(),
                address: l.address.clone(),
                coordinates: match (l.latitude, l.longitude) {
                    (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
                    _ => None,
                },
                location_type: l.location_type.clone(),
                visited_at: l.visited_at,
                added_by: content.resolve_member(l.added_by).to_string(),
            })
            .collect();

        Self {
            family_id: content.family.id,
            family_name: content.family.name.clone(),
            exported_at: now,
            locations,
        }
    }
}

fn readme(content: &AggregatedFamilyContent, now: DateTime<Utc>, unavailable_assets: usize) -> String {
    let mut out = format!(
        "{} family archive\nExported {}\n\n",
        content.family.name,
        now.format("%Y-%m-%d %H:%M UTC")
    );
    out.push_str(
        "This archive is a complete, read-only copy of your family's memories. \
Everything is plain files, so it can be opened without the app.\n\n\
Folders:\n\
  journals/       one Markdown document per journal entry, with links to its photos and videos\n\
  photos/         journal photos, numbered in export order\n\
  videos/         journal videos, numbered in export order\n\
  voice-memos/    audio recordings, each with a Markdown file describing it\n\
  stories/        family stories\n\
  recipes/        family recipes\n\
  traditions/     family traditions\n\
  time-capsules/  time capsules, marked sealed or opened as of the export date\n\n\
Files:\n\
  family-tree.json  the family members, as structured data\n\
  family-map.json   the family's places, with coordinates where known\n\n",
    );

    out.push_str("Contents:\n");
    for kind in ContentKind::ALL {
        out.push_str(&format!("  {}: {}\n", kind.label(), content.count(kind)));
    }

    if unavailable_assets > 0 {
        out.push_str(&format!(
            "\n{} media file(s) could not be downloaded. Their documents list the original links instead.\n",
            unavailable_assets
        ));
    }

    let failed = content.failed_kinds();
    if !failed.is_empty() {
        let labels: Vec<_> = failed.iter().map(|k| k.label()).collect();
        out.push_str(&format!(
            "\nThis export is incomplete. These sections could not be read and are empty: {}\n",
            labels.join(", ")
        ));
    }

    if !content.skipped_rows.is_empty() {
        let counts: Vec<_> = content
            .skipped_rows
            .iter()
            .map(|s| format!("{} ({})", s.kind.label(), s.count))
            .collect();
        out.push_str(&format!(
            "\nThis export is incomplete. Some records could not be read and were left out: {}\n",
            counts.join(", ")
        ));
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domains::export::types::{AggregationFailure, ArchiveContent, SkippedRows};
    use crate::domains::family::types::{FamilyMember, Recipe};
    use crate::domains::family::Family;
    use crate::types::PlanTier;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bytes per URL; unknown URLs time out.
    #[derive(Default)]
    pub(crate) struct StubFetcher {
        pub assets: HashMap<String, Vec<u8>>,
        pub requested: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub fn with(urls: &[(&str, &[u8])]) -> Self {
            Self {
                assets: urls.iter().map(|(u, b)| (u.to_string(), b.to_vec())).collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AssetFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, RetrievalFailure> {
            self.requested.lock().unwrap().push(url.to_string());
            self.assets.get(url).cloned().ok_or(RetrievalFailure::Timeout)
        }
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn family() -> Family {
        Family {
            id: Uuid::new_v4(),
            name: "Okafor".to_string(),
            owner_user_id: Uuid::new_v4(),
            plan_tier: PlanTier::Premium,
            created_at: ts("2023-01-01T00:00:00Z"),
        }
    }

    fn entry(title: &str, trip_date: Option<&str>) -> JournalEntry {
        JournalEntry {
            id: Uuid::new_v4(),
            author_id: None,
            title: Some(title.to_string()),
            content: Some(format!("All about {}", title)),
            trip_date: trip_date.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()),
            location_name: None,
            created_at: ts("2024-01-10T09:00:00Z"),
        }
    }

    fn media(entry_id: Uuid, url: &str, sort_order: i64, caption: Option<&str>) -> JournalMedia {
        JournalMedia {
            id: Uuid::new_v4(),
            journal_entry_id: entry_id,
            url: url.to_string(),
            caption: caption.map(str::to_string),
            sort_order,
            created_at: ts("2024-01-10T09:00:00Z"),
        }
    }

    fn capsule(title: &str, unlock: &str) -> TimeCapsule {
        TimeCapsule {
            id: Uuid::new_v4(),
            created_by: None,
            title: Some(title.to_string()),
            content: Some("Dear future us, the garden finally bloomed.".to_string()),
            unlock_date: ts(unlock),
            created_at: ts("2024-01-01T00:00:00Z"),
        }
    }

    fn memo(title: &str, url: &str) -> VoiceMemo {
        VoiceMemo {
            id: Uuid::new_v4(),
            recorded_by: None,
            title: Some(title.to_string()),
            description: Some("Grandma singing".to_string()),
            audio_url: url.to_string(),
            duration_seconds: Some(95),
            created_at: ts("2024-03-01T12:00:00Z"),
        }
    }

    fn text_of<'e>(entries: &'e [ArchiveEntry], path: &str) -> &'e str {
        let entry = entries.iter().find(|e| e.path == path).unwrap_or_else(|| panic!("missing {}", path));
        match &entry.content {
            ArchiveContent::Text(text) => text,
            ArchiveContent::Binary(_) => panic!("{} is binary", path),
        }
    }

    fn paths(entries: &[ArchiveEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    async fn build(content: &AggregatedFamilyContent, fetcher: StubFetcher, now: &str) -> Vec<ArchiveEntry> {
        ArchiveBuilder::new(Arc::new(fetcher), 50).build(content, ts(now)).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_family_has_only_summary_documents() {
        let content = AggregatedFamilyContent::new(family(), Vec::new(), Vec::new());
        let entries = build(&content, StubFetcher::default(), "2024-06-01T00:00:00Z").await;

        assert_eq!(paths(&entries), vec![README_PATH, ROSTER_PATH, MAP_PATH]);
        let roster: serde_json::Value = serde_json::from_str(text_of(&entries, ROSTER_PATH)).unwrap();
        assert_eq!(roster["familyName"], "Okafor");
        assert_eq!(roster["members"].as_array().unwrap().len(), 0);
        let map: serde_json::Value = serde_json::from_str(text_of(&entries, MAP_PATH)).unwrap();
        assert_eq!(map["locations"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_journal_embeds_assets_with_export_wide_counter() {
        let first = entry("Road Trip!! (2023)", Some("2023-07-04"));
        let second = entry("Beach", None);
        let photos = vec![
            media(first.id, "https://cdn.test/a.png", 1, Some("Sunset")),
            media(first.id, "https://cdn.test/b", 2, None),
            media(second.id, "https://cdn.test/c.jpg", 1, None),
        ];
        let content = AggregatedFamilyContent::new(family(), Vec::new(), vec![first, second])
            .with_journal_media(photos, Vec::new());
        let fetcher = StubFetcher::with(&[
            ("https://cdn.test/a.png", &b"png-bytes"[..]),
            ("https://cdn.test/b", &b"\xFF\xD8\xFF\xE0jpeg"[..]),
            ("https://cdn.test/c.jpg", &b"jpg-bytes"[..]),
        ]);
        let entries = build(&content, fetcher, "2024-06-01T00:00:00Z").await;

        let all = paths(&entries);
        assert!(all.contains(&"photos/photo_0001.png"));
        assert!(all.contains(&"photos/photo_0002.jpg"));
        assert!(all.contains(&"photos/photo_0003.jpg"));

        let trip = text_of(&entries, "journals/2023-07-04_Road Trip 2023.md");
        assert!(trip.contains("- [photo_0001.png](../photos/photo_0001.png) - Sunset"));
        assert!(trip.contains("- [photo_0002.jpg](../photos/photo_0002.jpg)"));
        assert!(trip.contains("**Author:** Unknown"));
        assert!(!trip.contains("## Videos"));

        let beach = text_of(&entries, "journals/2024-01-10_Beach.md");
        assert!(beach.contains("photo_0003.jpg"));
    }

    #[tokio::test]
    async fn test_failed_asset_falls_back_to_original_url() {
        let e = entry("Camping", None);
        let photos = vec![
            media(e.id, "https://cdn.test/ok.jpg", 1, None),
            media(e.id, "https://cdn.test/slow.jpg", 2, Some("Tent")),
        ];
        let content = AggregatedFamilyContent::new(family(), Vec::new(), vec![e]).with_journal_media(photos, Vec::new());
        let fetcher = StubFetcher::with(&[("https://cdn.test/ok.jpg", &b"jpg"[..])]);
        let entries = build(&content, fetcher, "2024-06-01T00:00:00Z").await;

        let doc = text_of(&entries, "journals/2024-01-10_Camping.md");
        assert!(doc.contains("https://cdn.test/slow.jpg"));
        assert!(doc.contains("photo_0002 - Tent (not downloaded: request timed out)"));

        let binaries: Vec<_> = entries.iter().filter(|e| e.content.is_binary()).map(|e| e.path.as_str()).collect();
        assert_eq!(binaries, vec!["photos/photo_0001.jpg"]);
        assert!(text_of(&entries, README_PATH).contains("1 media file(s) could not be downloaded"));
    }

    #[tokio::test]
    async fn test_assets_are_fetched_in_document_order() {
        let e = entry("Zoo", None);
        let photos = vec![media(e.id, "https://cdn.test/2.jpg", 2, None), media(e.id, "https://cdn.test/1.jpg", 1, None)];
        let videos = vec![media(e.id, "https://cdn.test/v.mp4", 1, None)];
        let content = AggregatedFamilyContent::new(family(), Vec::new(), vec![e]).with_journal_media(photos, videos);
        let fetcher = Arc::new(StubFetcher::default());

        ArchiveBuilder::new(fetcher.clone(), 50)
            .build(&content, ts("2024-06-01T00:00:00Z"))
            .await
            .unwrap();

        let requested = fetcher.requested.lock().unwrap().clone();
        assert_eq!(requested, vec!["https://cdn.test/1.jpg", "https://cdn.test/2.jpg", "https://cdn.test/v.mp4"]);
    }

    #[tokio::test]
    async fn test_sealed_capsule_keeps_body_with_disclaimer() {
        let mut content = AggregatedFamilyContent::new(family(), Vec::new(), Vec::new());
        content.time_capsules = vec![
            capsule("For 2030", "2030-01-01T00:00:00Z"),
            capsule("Last Year", "2024-01-01T00:00:00Z"),
        ];
        let entries = build(&content, StubFetcher::default(), "2024-06-01T00:00:00Z").await;

        let sealed = text_of(&entries, "time-capsules/sealed_For 2030.md");
        assert!(sealed.contains(SEALED_LABEL));
        assert!(sealed.contains(PRE_RELEASE_NOTE));
        assert!(sealed.contains("Dear future us, the garden finally bloomed."));

        let opened = text_of(&entries, "time-capsules/opened_Last Year.md");
        assert!(opened.contains(OPENED_LABEL));
        assert!(!opened.contains(PRE_RELEASE_NOTE));
    }

    #[tokio::test]
    async fn test_voice_memo_audio_and_sidecar_share_base_name() {
        let mut content = AggregatedFamilyContent::new(family(), Vec::new(), Vec::new());
        content.voice_memos = vec![
            memo("Lullaby", "https://cdn.test/lullaby.mp3"),
            memo("Lullaby", "https://cdn.test/lullaby2.mp3"),
            memo("Gone", "https://cdn.test/gone.m4a"),
        ];
        let fetcher = StubFetcher::with(&[
            ("https://cdn.test/lullaby.mp3", &b"ID3audio"[..]),
            ("https://cdn.test/lullaby2.mp3", &b"ID3audio"[..]),
        ]);
        let entries = build(&content, fetcher, "2024-06-01T00:00:00Z").await;

        let all = paths(&entries);
        assert!(all.contains(&"voice-memos/2024-03-01_Lullaby.mp3"));
        assert!(all.contains(&"voice-memos/2024-03-01_Lullaby.md"));
        assert!(all.contains(&"voice-memos/2024-03-01_Lullaby-2.mp3"));
        assert!(all.contains(&"voice-memos/2024-03-01_Lullaby-2.md"));
        assert!(!all.iter().any(|p| p.ends_with("Gone.m4a")));

        let sidecar = text_of(&entries, "voice-memos/2024-03-01_Lullaby-2.md");
        assert!(sidecar.contains("**Audio file:** 2024-03-01_Lullaby-2.mp3"));
        assert!(sidecar.contains("**Duration:** 1:35"));

        let gone = text_of(&entries, "voice-memos/2024-03-01_Gone.md");
        assert!(gone.contains("Original: https://cdn.test/gone.m4a"));
    }

    #[tokio::test]
    async fn test_documents_resolve_members_and_render_fields() {
        let ada_user = Uuid::new_v4();
        let members = vec![FamilyMember {
            id: Uuid::new_v4(),
            user_id: Some(ada_user),
            display_name: Some("Ada".to_string()),
            role: Some("parent".to_string()),
            relationship: None,
            birth_date: None,
            avatar_url: None,
            created_at: ts("2023-01-01T00:00:00Z"),
        }];
        let mut content = AggregatedFamilyContent::new(family(), members, Vec::new());
        content.recipes = vec![
            Recipe {
                id: Uuid::new_v4(),
                created_by: Some(ada_user),
                title: Some("Jollof Rice".to_string()),
                description: None,
                ingredients: vec!["rice".to_string(), "tomatoes".to_string()],
                instructions: Some("Cook slowly.".to_string()),
                servings: Some(6),
                prep_time_minutes: None,
                origin: Some("Lagos".to_string()),
                created_at: ts("2024-01-01T00:00:00Z"),
            },
        ];
        let mut duplicate = content.recipes[0].clone();
        duplicate.id = Uuid::new_v4();
        content.recipes.push(duplicate);
        content.failures = vec![AggregationFailure {
            kind: ContentKind::Stories,
            message: "no such table".to_string(),
        }];

        let entries = build(&content, StubFetcher::default(), "2024-06-01T00:00:00Z").await;

        let recipe = text_of(&entries, "recipes/Jollof Rice.md");
        assert!(recipe.contains("**Added by:** Ada"));
        assert!(recipe.contains("**Servings:** 6"));
        assert!(!recipe.contains("Prep time"));
        assert!(recipe.contains("- tomatoes"));
        assert!(paths(&entries).contains(&"recipes/Jollof Rice-2.md"));

        let roster: serde_json::Value = serde_json::from_str(text_of(&entries, ROSTER_PATH)).unwrap();
        assert_eq!(roster["members"][0]["displayName"], "Ada");

        let readme = text_of(&entries, README_PATH);
        assert!(readme.contains("Okafor family archive"));
        assert!(readme.contains("Recipes: 2"));
        assert!(readme.contains("could not be read and are empty: Stories"));
        assert!(!readme.contains("were left out"));
    }

    #[tokio::test]
    async fn test_readme_lists_rows_left_out() {
        let mut content = AggregatedFamilyContent::new(family(), Vec::new(), Vec::new());
        content.skipped_rows = vec![SkippedRows {
            kind: ContentKind::Stories,
            count: 2,
        }];
        let entries = build(&content, StubFetcher::default(), "2024-06-01T00:00:00Z").await;

        let readme = text_of(&entries, README_PATH);
        assert!(readme.contains("Some records could not be read and were left out: Stories (2)"));
        assert!(!readme.contains("are empty"));
    }

    #[tokio::test]
    async fn test_negative_duration_is_omitted() {
        let mut content = AggregatedFamilyContent::new(family(), Vec::new(), Vec::new());
        let mut broken = memo("Static", "https://cdn.test/static.mp3");
        broken.duration_seconds = Some(-5);
        content.voice_memos = vec![broken];
        let entries = build(&content, StubFetcher::default(), "2024-06-01T00:00:00Z").await;

        let doc = text_of(&entries, "voice-memos/2024-03-01_Static.md");
        assert!(!doc.contains("Duration"));
        assert!(!doc.contains("-5"));
    }
}
