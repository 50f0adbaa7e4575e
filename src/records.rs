use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::diagram::{Connection, DiagramContent, DiagramRecord, DiagramSummary, Node, new_id};

#[derive(sqlx::FromRow)]
struct DiagramRow {
    id: String,
    owner: String,
    name: String,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    name: String,
    node_count: i64,
    connection_count: i64,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    kind: String,
    position: i64,
    data: String,
}

/// Fixed-width so that text ordering in SQLite matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse()
        .with_context(|| format!("Invalid stored timestamp '{raw}'"))
}

impl DiagramRecord {
    /// Creates an empty diagram owned by `owner`.
    pub async fn create(pool: &SqlitePool, owner: &str, name: &str) -> Result<Self> {
        let id = new_id("diagram");
        let now = Utc::now();

        sqlx::query(
            r#"INSERT INTO diagrams (id, owner, name, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(owner)
        .bind(name)
        .bind(timestamp(now))
        .bind(timestamp(now))
        .execute(pool)
        .await
        .context("Failed to create diagram")?;

        Ok(Self {
            id,
            name: name.to_string(),
            owner: owner.to_string(),
            created_at: now,
            updated_at: now,
            content: DiagramContent::default(),
        })
    }

    /// Loads a diagram if it exists and belongs to `owner`.
    pub async fn get_by_id(pool: &SqlitePool, id: &str, owner: &str) -> Result<Option<Self>> {
        let row: Option<DiagramRow> = sqlx::query_as(
            "SELECT id, owner, name, created_at, updated_at
             FROM diagrams WHERE id = ? AND owner = ?",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(pool)
        .await
        .context("Failed to get diagram")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let content = load_content(pool, &row.id).await?;

        Ok(Some(Self {
            id: row.id,
            name: row.name,
            owner: row.owner,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            content,
        }))
    }

    pub async fn list_by_owner(pool: &SqlitePool, owner: &str) -> Result<Vec<DiagramSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT id, name, node_count, connection_count, updated_at FROM diagrams
             WHERE owner = ?
             ORDER BY updated_at DESC",
        )
        .bind(owner)
        .fetch_all(pool)
        .await
        .context("Failed to list diagrams")?;

        rows.into_iter()
            .map(|r| {
                Ok(DiagramSummary {
                    updated_at: parse_timestamp(&r.updated_at)?,
                    id: r.id,
                    name: r.name,
                    node_count: r.node_count,
                    connection_count: r.connection_count,
                })
            })
            .collect()
    }

    /// Replaces every stored node and connection in one transaction.
    pub async fn update_content(&self, pool: &SqlitePool, content: DiagramContent) -> Result<Self> {
        let now = Utc::now();
        let mut tx = pool.begin().await.context("Failed to start transaction")?;

        sqlx::query("DELETE FROM diagram_items WHERE diagram_id = ?")
            .bind(&self.id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear diagram items")?;

        let nodes = content
            .nodes
            .iter()
            .map(|node| serde_json::to_string(node).map(|data| ("node", data)));
        let connections = content
            .connections
            .iter()
            .map(|conn| serde_json::to_string(conn).map(|data| ("connection", data)));

        let mut positions = [0_i64; 2];
        for item in nodes.chain(connections) {
            let (kind, data) = item.context("Failed to serialize diagram item")?;
            let slot = &mut positions[usize::from(kind == "connection")];
            sqlx::query(
                "INSERT INTO diagram_items (diagram_id, kind, position, data) VALUES (?, ?, ?, ?)",
            )
            .bind(&self.id)
            .bind(kind)
            .bind(*slot)
            .bind(data)
            .execute(&mut *tx)
            .await
            .context("Failed to store diagram item")?;
            *slot += 1;
        }

        sqlx::query(
            "UPDATE diagrams SET updated_at = ?, node_count = ?, connection_count = ? WHERE id = ?",
        )
        .bind(timestamp(now))
        .bind(content.nodes.len() as i64)
        .bind(content.connections.len() as i64)
        .bind(&self.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update diagram")?;

        tx.commit().await.context("Failed to commit diagram update")?;

        Ok(Self {
            content,
            updated_at: now,
            ..self.clone()
        })
    }

    pub async fn delete(&self, pool: &SqlitePool) -> Result<()> {
        let mut tx = pool.begin().await.context("Failed to start transaction")?;
        sqlx::query("DELETE FROM diagram_items WHERE diagram_id = ?")
            .bind(&self.id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete diagram items")?;
        sqlx::query("DELETE FROM diagrams WHERE id = ?")
            .bind(&self.id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete diagram")?;
        tx.commit().await.context("Failed to commit diagram delete")?;
        Ok(())
    }
}

async fn load_content(pool: &SqlitePool, diagram_id: &str) -> Result<DiagramContent> {
    let rows: Vec<ItemRow> = sqlx::query_as(
        "SELECT kind, position, data FROM diagram_items
         WHERE diagram_id = ?
         ORDER BY kind DESC, position ASC",
    )
    .bind(diagram_id)
    .fetch_all(pool)
    .await
    .context("Failed to load diagram items")?;

    let mut content = DiagramContent::default();
    for row in rows {
        match row.kind.as_str() {
            "node" => content.nodes.push(
                serde_json::from_str::<Node>(&row.data)
                    .with_context(|| format!("Corrupt node at position {}", row.position))?,
            ),
            "connection" => content.connections.push(
                serde_json::from_str::<Connection>(&row.data)
                    .with_context(|| format!("Corrupt connection at position {}", row.position))?,
            ),
            other => tracing::warn!(diagram = %diagram_id, kind = %other, "ignoring unknown item kind"),
        }
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, DatabaseConfig};
    use crate::diagram::Endpoint;
    use crate::geometry::Side;
    use crate::ports::PortId;
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(DatabaseConfig::at(temp_dir.path().join("test.db")))
            .await
            .unwrap();
        (temp_dir, db)
    }

    fn sample_content() -> DiagramContent {
        let mut content = DiagramContent::default();
        let ceo = content.add_node();
        let cto = content.add_node();
        let cfo = content.add_node();
        content.set_node_text(&ceo, "CEO");
        let reports = content
            .connect(
                Endpoint::new(cto, PortId::center(Side::Top)),
                Endpoint::new(ceo.clone(), PortId::center(Side::Bottom)),
            )
            .unwrap();
        content.set_connection_label(&reports, Some("reports to"));
        content
            .connect(
                Endpoint::new(cfo, PortId::center(Side::Top)),
                Endpoint::new(ceo, PortId::new(Side::Bottom, 0).unwrap()),
            )
            .unwrap();
        content
    }

    #[tokio::test]
    async fn diagram_crud_round_trips_content() {
        let (_dir, db) = setup_test_db().await;
        let pool = db.pool();

        let record = DiagramRecord::create(pool, "ada", "Leadership").await.unwrap();
        assert!(record.content.nodes.is_empty());

        let content = sample_content();
        let updated = record.update_content(pool, content.clone()).await.unwrap();
        assert!(updated.updated_at >= record.updated_at);

        let loaded = DiagramRecord::get_by_id(pool, &record.id, "ada")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.content, content);
        assert_eq!(loaded.name, "Leadership");

        // other owners cannot see it
        assert!(
            DiagramRecord::get_by_id(pool, &record.id, "mallory")
                .await
                .unwrap()
                .is_none()
        );

        let list = DiagramRecord::list_by_owner(pool, "ada").await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].node_count, 3);
        assert_eq!(list[0].connection_count, 2);

        // replacement, not merge
        let trimmed = loaded.update_content(pool, DiagramContent::default()).await.unwrap();
        let reloaded = DiagramRecord::get_by_id(pool, &trimmed.id, "ada")
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.content.nodes.is_empty());

        reloaded.delete(pool).await.unwrap();
        assert!(
            DiagramRecord::get_by_id(pool, &record.id, "ada")
                .await
                .unwrap()
                .is_none()
        );
        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM diagram_items")
            .fetch_one(pool)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let (_dir, db) = setup_test_db().await;
        let pool = db.pool();

        let older = DiagramRecord::create(pool, "ada", "Older").await.unwrap();
        let newer = DiagramRecord::create(pool, "ada", "Newer").await.unwrap();
        DiagramRecord::create(pool, "grace", "Elsewhere").await.unwrap();
        older.update_content(pool, sample_content()).await.unwrap();

        let list = DiagramRecord::list_by_owner(pool, "ada").await.unwrap();
        let names: Vec<_> = list.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Older", "Newer"]);
        assert_eq!(list[1].id, newer.id);
    }

    #[tokio::test]
    async fn corrupt_timestamps_are_reported() {
        let (_dir, db) = setup_test_db().await;
        let pool = db.pool();

        let record = DiagramRecord::create(pool, "ada", "Damaged").await.unwrap();
        sqlx::query("UPDATE diagrams SET updated_at = 'yesterday' WHERE id = ?")
            .bind(&record.id)
            .execute(pool)
            .await
            .unwrap();

        let err = DiagramRecord::get_by_id(pool, &record.id, "ada")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("yesterday"), "{err}");
        assert!(DiagramRecord::list_by_owner(pool, "ada").await.is_err());
    }
}
