//! Seeding helpers shared by the family and export test suites.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domains::family::types::Family;
use crate::types::PlanTier;

pub async fn insert_family(pool: &SqlitePool, name: &str, tier: PlanTier) -> Family {
    let family = Family {
        id: Uuid::new_v4(),
        name: name.to_string(),
        owner_user_id: Uuid::new_v4(),
        plan_tier: tier,
        created_at: Utc::now(),
    };
    sqlx::query("INSERT INTO families (id, name, owner_user_id, plan_tier, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(family.id.to_string())
        .bind(&family.name)
        .bind(family.owner_user_id.to_string())
        .bind(tier.as_str())
        .bind(family.created_at.to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
    family
}

pub async fn insert_member(
    pool: &SqlitePool,
    family_id: Uuid,
    user_id: Option<Uuid>,
    display_name: Option<&str>,
    created_at: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO family_members (id, family_id, user_id, display_name, role, created_at) VALUES (?, ?, ?, ?, 'member', ?)")
        .bind(id.to_string())
        .bind(family_id.to_string())
        .bind(user_id.map(|u| u.to_string()))
        .bind(display_name)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn insert_journal_entry(
    pool: &SqlitePool,
    family_id: Uuid,
    author_id: Option<Uuid>,
    title: &str,
    trip_date: Option<&str>,
    created_at: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO journal_entries (id, family_id, author_id, title, content, trip_date, location_name, created_at) VALUES (?, ?, ?, ?, ?, ?, 'Lake House', ?)")
        .bind(id.to_string())
        .bind(family_id.to_string())
        .bind(author_id.map(|u| u.to_string()))
        .bind(title)
        .bind(format!("Notes about {}", title))
        .bind(trip_date)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    id
}

/// `table` is `journal_photos` or `journal_videos`.
pub async fn insert_journal_media(
    pool: &SqlitePool,
    table: &str,
    entry_id: Uuid,
    url: &str,
    caption: Option<&str>,
    sort_order: i64,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(&format!(
        "INSERT INTO {} (id, journal_entry_id, url, caption, sort_order, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        table
    ))
    .bind(id.to_string())
    .bind(entry_id.to_string())
    .bind(url)
    .bind(caption)
    .bind(sort_order)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn insert_voice_memo(
    pool: &SqlitePool,
    family_id: Uuid,
    recorded_by: Option<Uuid>,
    title: &str,
    audio_url: &str,
    created_at: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO voice_memos (id, family_id, recorded_by, title, description, audio_url, duration_seconds, created_at) VALUES (?, ?, ?, ?, 'Recorded at dinner', ?, 42, ?)")
        .bind(id.to_string())
        .bind(family_id.to_string())
        .bind(recorded_by.map(|u| u.to_string()))
        .bind(title)
        .bind(audio_url)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn insert_story(pool: &SqlitePool, family_id: Uuid, title: &str, content: &str, created_at: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO stories (id, family_id, title, content, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(family_id.to_string())
        .bind(title)
        .bind(content)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn insert_recipe(pool: &SqlitePool, family_id: Uuid, title: &str, ingredients: &str, created_at: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO recipes (id, family_id, title, ingredients, instructions, servings, created_at) VALUES (?, ?, ?, ?, 'Mix and bake.', 4, ?)")
        .bind(id.to_string())
        .bind(family_id.to_string())
        .bind(title)
        .bind(ingredients)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn insert_tradition(pool: &SqlitePool, family_id: Uuid, title: &str, created_at: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO traditions (id, family_id, title, description, frequency, started_year, created_at) VALUES (?, ?, ?, 'Every year since forever', 'yearly', 1987, ?)")
        .bind(id.to_string())
        .bind(family_id.to_string())
        .bind(title)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn insert_time_capsule(
    pool: &SqlitePool,
    family_id: Uuid,
    title: &str,
    content: &str,
    unlock_date: &str,
    created_at: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO time_capsules (id, family_id, title, content, unlock_date, created_at) VALUES (?, ?, ?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(family_id.to_string())
        .bind(title)
        .bind(content)
        .bind(unlock_date)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn insert_location(
    pool: &SqlitePool,
    family_id: Uuid,
    name: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
    created_at: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO family_locations (id, family_id, name, latitude, longitude, location_type, created_at) VALUES (?, ?, ?, ?, ?, 'home', ?)")
        .bind(id.to_string())
        .bind(family_id.to_string())
        .bind(name)
        .bind(latitude)
        .bind(longitude)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    id
}
