use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::analyze_subject;
use crate::models::{
    ActionItem, InteractionEvent, InteractionKind, RelationshipState, Subject, SubjectAnalysis,
    Transition,
};
use crate::signals::window_start;

/// Which subjects a load should return.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    All,
    Name(&'a str),
    Id(Uuid),
}

/// A row of an interaction import file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InteractionRow {
    pub full_name: String,
    pub kind: String,
    pub occurred_at: DateTime<Utc>,
    pub source_key: Option<String>,
}

pub fn read_interactions<R: Read>(reader: R) -> anyhow::Result<Vec<InteractionRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<InteractionRow>().enumerate() {
        let row = result.with_context(|| format!("invalid interaction row {}", index + 1))?;
        row.kind
            .parse::<InteractionKind>()
            .with_context(|| format!("invalid interaction row {}", index + 1))?;
        rows.push(row);
    }

    Ok(rows)
}

/// Column advanced when an interaction of `kind` is recorded.
fn last_seen_column(kind: InteractionKind) -> Option<&'static str> {
    match kind {
        InteractionKind::Contact => Some("last_contact_at"),
        InteractionKind::Meal => Some("last_meal_at"),
        InteractionKind::Mentoring => Some("last_mentoring_at"),
        InteractionKind::Meeting => None,
    }
}

/// Postgres-backed storage for tracked relationships.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn fetch_subjects(
        &self,
        scope: Scope<'_>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Subject>> {
        let mut conn = self.pool.acquire().await?;
        load_subjects(&mut conn, scope, now).await
    }

    pub async fn subject_ids(&self, name: Option<&str>) -> anyhow::Result<Vec<Uuid>> {
        let mut query = String::from("SELECT id FROM relationship_health.subjects");
        if name.is_some() {
            query.push_str(" WHERE full_name = $1");
        }
        query.push_str(" ORDER BY full_name");

        let mut rows = sqlx::query(&query);
        if let Some(value) = name {
            rows = rows.bind(value);
        }

        let ids: Vec<Uuid> = rows
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.get("id"))
            .collect();
        Ok(ids)
    }

    /// Reloads, scores and writes back one subject inside a single
    /// transaction. The subject row stays locked until commit, so two
    /// concurrent rescoring passes cannot interleave their writes.
    pub async fn rescore(
        &self,
        subject_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<SubjectAnalysis>> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query(
            "SELECT id FROM relationship_health.subjects WHERE id = $1 FOR UPDATE",
        )
        .bind(subject_id)
        .fetch_optional(&mut *tx)
        .await?;

        if locked.is_none() {
            warn!(%subject_id, "subject disappeared before rescoring");
            return Ok(None);
        }

        let subject = load_subjects(&mut tx, Scope::Id(subject_id), now)
            .await?
            .into_iter()
            .next()
            .context("locked subject could not be loaded")?;
        let analysis = analyze_subject(&subject, now);

        write_transition(&mut tx, subject_id, analysis.transition, now).await?;
        tx.commit().await?;

        if analysis.newly_neglected() {
            info!(name = %analysis.full_name, score = analysis.report.score, "relationship flagged as neglected");
        }
        debug!(
            name = %analysis.full_name,
            from = %analysis.previous_state,
            to = %analysis.transition.state,
            score = analysis.report.score,
            "rescored subject"
        );

        Ok(Some(analysis))
    }

    pub async fn seed(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let subjects = vec![
            (
                Uuid::parse_str("6f1c2a4e-8d3b-4f0a-9c7e-1b2d3e4f5a60")?,
                "Avery Lee",
                400,
                RelationshipState::Close,
                0,
            ),
            (
                Uuid::parse_str("a9e8d7c6-b5a4-4932-8170-6f5e4d3c2b1a")?,
                "Jules Moreno",
                220,
                RelationshipState::Close,
                2,
            ),
            (
                Uuid::parse_str("1d2c3b4a-5f6e-4d8c-9b0a-123456789abc")?,
                "Kiara Patel",
                45,
                RelationshipState::Warming,
                3,
            ),
        ];

        let mut tx = self.pool.begin().await?;

        for (id, name, started_days_ago, state, unresolved) in subjects {
            sqlx::query(
                r#"
                INSERT INTO relationship_health.subjects
                (id, full_name, started_at, state, unresolved_conversation_count)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (full_name) DO UPDATE
                SET started_at = EXCLUDED.started_at,
                    unresolved_conversation_count = EXCLUDED.unresolved_conversation_count
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(now - Duration::days(started_days_ago))
            .bind(state.as_str())
            .bind(unresolved)
            .execute(&mut *tx)
            .await?;
        }

        let actions = vec![
            ("Avery Lee", "Send birthday card", true, false),
            ("Avery Lee", "Help with the move", true, true),
            ("Jules Moreno", "Return the borrowed tent", false, true),
            ("Jules Moreno", "Share podcast list", true, false),
            ("Kiara Patel", "Introduce to hiring manager", false, true),
        ];

        for (position, (name, title, is_completed, is_critical)) in actions.into_iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO relationship_health.action_items
                (id, subject_id, title, is_completed, is_critical, position)
                SELECT $1, id, $3, $4, $5, $6
                FROM relationship_health.subjects WHERE full_name = $2
                AND NOT EXISTS (
                    SELECT 1 FROM relationship_health.action_items a
                    JOIN relationship_health.subjects s ON s.id = a.subject_id
                    WHERE s.full_name = $2 AND a.title = $3
                )
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(title)
            .bind(is_completed)
            .bind(is_critical)
            .bind(i32::try_from(position)?)
            .execute(&mut *tx)
            .await?;
        }

        let events = vec![
            ("seed-001", "Avery Lee", InteractionKind::Contact, 1),
            ("seed-002", "Avery Lee", InteractionKind::Meal, 12),
            ("seed-003", "Avery Lee", InteractionKind::Meeting, 5),
            ("seed-004", "Jules Moreno", InteractionKind::Contact, 70),
            ("seed-005", "Kiara Patel", InteractionKind::Mentoring, 9),
            ("seed-006", "Kiara Patel", InteractionKind::Contact, 20),
        ];

        for (source_key, name, kind, days_ago) in events {
            let subject_id: Uuid = sqlx::query(
                "SELECT id FROM relationship_health.subjects WHERE full_name = $1",
            )
            .bind(name)
            .fetch_one(&mut *tx)
            .await?
            .get("id");

            record_interaction(&mut tx, subject_id, kind, now - Duration::days(days_ago), source_key)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Imports interactions from a CSV file, creating subjects on first
    /// sight. Returns the number of new events; rows whose `source_key`
    /// was already imported are skipped.
    pub async fn import_csv(&self, csv_path: &Path) -> anyhow::Result<usize> {
        let file = std::fs::File::open(csv_path)
            .with_context(|| format!("failed to open {}", csv_path.display()))?;
        let rows = read_interactions(file)?;

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for row in rows {
            let kind: InteractionKind = row.kind.parse()?;
            let subject_id: Uuid = sqlx::query(
                r#"
                INSERT INTO relationship_health.subjects (id, full_name, started_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (full_name) DO UPDATE
                SET started_at = LEAST(relationship_health.subjects.started_at, EXCLUDED.started_at)
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&row.full_name)
            .bind(row.occurred_at)
            .fetch_one(&mut *tx)
            .await?
            .get("id");

            let source_key = row
                .source_key
                .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

            if record_interaction(&mut tx, subject_id, kind, row.occurred_at, &source_key).await? {
                inserted += 1;
            } else {
                debug!(%source_key, "interaction already imported");
            }
        }

        tx.commit().await?;
        info!(inserted, path = %csv_path.display(), "imported interactions");
        Ok(inserted)
    }
}

/// Inserts one interaction and advances the matching last-seen timestamp.
/// Returns false when `source_key` was already present.
async fn record_interaction(
    conn: &mut PgConnection,
    subject_id: Uuid,
    kind: InteractionKind,
    occurred_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO relationship_health.interaction_events
        (id, subject_id, kind, occurred_at, source_key)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(subject_id)
    .bind(kind.as_str())
    .bind(occurred_at)
    .bind(source_key)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    if let Some(column) = last_seen_column(kind) {
        let query = format!(
            "UPDATE relationship_health.subjects SET {column} = GREATEST({column}, $2) WHERE id = $1"
        );
        sqlx::query(&query)
            .bind(subject_id)
            .bind(occurred_at)
            .execute(&mut *conn)
            .await?;
    }

    Ok(true)
}

async fn write_transition(
    conn: &mut PgConnection,
    subject_id: Uuid,
    transition: Transition,
    scored_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE relationship_health.subjects
        SET state = $2, neglected = $3, scored_at = $4
        WHERE id = $1
        "#,
    )
    .bind(subject_id)
    .bind(transition.state.as_str())
    .bind(transition.neglected)
    .bind(scored_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn load_subjects(
    conn: &mut PgConnection,
    scope: Scope<'_>,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<Subject>> {
    let mut query = String::from(
        "SELECT id, full_name, started_at, last_contact_at, last_meal_at, last_mentoring_at, \
         state, neglected, unresolved_conversation_count \
         FROM relationship_health.subjects",
    );

    match scope {
        Scope::All => {}
        Scope::Name(_) => query.push_str(" WHERE full_name = $1"),
        Scope::Id(_) => query.push_str(" WHERE id = $1"),
    }
    query.push_str(" ORDER BY full_name");

    let mut rows = sqlx::query(&query);
    match scope {
        Scope::All => {}
        Scope::Name(name) => rows = rows.bind(name),
        Scope::Id(id) => rows = rows.bind(id),
    }

    let records = rows.fetch_all(&mut *conn).await?;
    let mut subjects = Vec::with_capacity(records.len());

    for row in records {
        let state: String = row.get("state");
        let unresolved: i32 = row.get("unresolved_conversation_count");
        subjects.push(Subject {
            id: row.get("id"),
            full_name: row.get("full_name"),
            started_at: row.get("started_at"),
            last_contact_at: row.get("last_contact_at"),
            last_meal_at: row.get("last_meal_at"),
            last_mentoring_at: row.get("last_mentoring_at"),
            state: state.parse()?,
            neglected: row.get("neglected"),
            unresolved_conversation_count: u32::try_from(unresolved)
                .context("negative unresolved conversation count")?,
            actions: Vec::new(),
            events: Vec::new(),
        });
    }

    if subjects.is_empty() {
        return Ok(subjects);
    }

    let ids: Vec<Uuid> = subjects.iter().map(|subject| subject.id).collect();
    let mut actions: HashMap<Uuid, Vec<ActionItem>> = HashMap::new();
    let mut events: HashMap<Uuid, Vec<InteractionEvent>> = HashMap::new();

    let action_rows = sqlx::query(
        r#"
        SELECT subject_id, title, is_completed, is_critical
        FROM relationship_health.action_items
        WHERE subject_id = ANY($1)
        ORDER BY position, title
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    for row in action_rows {
        actions
            .entry(row.get("subject_id"))
            .or_default()
            .push(ActionItem {
                title: row.get("title"),
                is_completed: row.get("is_completed"),
                is_critical: row.get("is_critical"),
            });
    }

    let event_rows = sqlx::query(
        r#"
        SELECT subject_id, kind, occurred_at
        FROM relationship_health.interaction_events
        WHERE subject_id = ANY($1) AND occurred_at >= $2 AND occurred_at <= $3
        ORDER BY occurred_at DESC
        "#,
    )
    .bind(&ids)
    .bind(window_start(now))
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;

    for row in event_rows {
        let kind: String = row.get("kind");
        events
            .entry(row.get("subject_id"))
            .or_default()
            .push(InteractionEvent {
                kind: kind.parse()?,
                occurred_at: row.get("occurred_at"),
            });
    }

    for subject in subjects.iter_mut() {
        subject.actions = actions.remove(&subject.id).unwrap_or_default();
        subject.events = events.remove(&subject.id).unwrap_or_default();
    }

    Ok(subjects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reads_interactions_with_optional_source_key() {
        let data = "\
full_name,kind,occurred_at,source_key
Avery Lee,meal,2026-02-20T18:30:00Z,dinner-0220
Kiara Patel,contact,2026-02-21T09:00:00Z,
";
        let rows = read_interactions(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].full_name, "Avery Lee");
        assert_eq!(rows[0].kind, "meal");
        assert_eq!(
            rows[0].occurred_at,
            Utc.with_ymd_and_hms(2026, 2, 20, 18, 30, 0).unwrap()
        );
        assert_eq!(rows[0].source_key.as_deref(), Some("dinner-0220"));
        assert_eq!(rows[1].source_key, None);
    }

    #[test]
    fn rejects_unknown_interaction_kind() {
        let data = "\
full_name,kind,occurred_at,source_key
Avery Lee,telegram,2026-02-20T18:30:00Z,x
";
        let err = read_interactions(data.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("unknown interaction kind: telegram"));
    }

    #[test]
    fn meetings_do_not_advance_last_seen_timestamps() {
        assert_eq!(last_seen_column(InteractionKind::Meal), Some("last_meal_at"));
        assert_eq!(last_seen_column(InteractionKind::Contact), Some("last_contact_at"));
        assert_eq!(last_seen_column(InteractionKind::Mentoring), Some("last_mentoring_at"));
        assert_eq!(last_seen_column(InteractionKind::Meeting), None);
    }
}
