mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::{Relation, StoreSnapshot, TierStore};
use crate::models::*;

/// Relational store: `groups`, `tier_lists` and the `group_tier_lists` join.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }
}

impl Clone for SqliteStore {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl TierStore for SqliteStore {
    fn create_group(&self, owner_id: Uuid, input: CreateGroupInput) -> Result<Group> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO groups (id, owner_id, name, parent_group_id, position, created_at, updated_at)
             VALUES (?, ?, ?, NULL, ?, ?, ?)",
            (
                id.to_string(),
                owner_id.to_string(),
                &input.name,
                input.position as i64,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Group {
            id,
            name: input.name,
            position: input.position,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn create_entity(&self, owner_id: Uuid, input: CreateEntityInput) -> Result<RankedEntity> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO tier_lists (id, owner_id, name, attributes, position, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                owner_id.to_string(),
                &input.name,
                serde_json::to_string(&input.attributes)?,
                input.position as i64,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(RankedEntity {
            id,
            name: input.name,
            attributes: input.attributes,
            position: input.position,
            created_at: now,
            updated_at: now,
        })
    }

    fn rename_group(&self, id: Uuid, name: &str) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE groups SET name = ?, updated_at = ? WHERE id = ?",
            (name, Utc::now().to_rfc3339(), id.to_string()),
        )?;
        if rows == 0 {
            anyhow::bail!("Group {} not found", id);
        }
        Ok(())
    }

    fn update_entity(&self, entity: &RankedEntity) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE tier_lists SET name = ?, attributes = ?, updated_at = ? WHERE id = ?",
            (
                &entity.name,
                serde_json::to_string(&entity.attributes)?,
                entity.updated_at.to_rfc3339(),
                entity.id.to_string(),
            ),
        )?;
        if rows == 0 {
            anyhow::bail!("Tier list {} not found", entity.id);
        }
        Ok(())
    }

    fn update_entities(&self, batch: &[RankedEntity]) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        for entity in batch {
            let rows = tx.execute(
                "UPDATE tier_lists SET name = ?, attributes = ?, updated_at = ? WHERE id = ?",
                (
                    &entity.name,
                    serde_json::to_string(&entity.attributes)?,
                    entity.updated_at.to_rfc3339(),
                    entity.id.to_string(),
                ),
            )?;
            if rows == 0 {
                anyhow::bail!("Tier list {} not found", entity.id);
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn add_entity_to_group(
        &self,
        group_id: Uuid,
        entity_id: Uuid,
        position: usize,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO group_tier_lists (group_id, tier_list_id, position) VALUES (?, ?, ?)",
            (group_id.to_string(), entity_id.to_string(), position as i64),
        )
        .with_context(|| format!("Failed to add tier list {} to group {}", entity_id, group_id))?;
        conn.execute(
            "UPDATE tier_lists SET position = ? WHERE id = ?",
            (position as i64, entity_id.to_string()),
        )?;
        Ok(())
    }

    fn remove_entity_from_group(&self, group_id: Uuid, entity_id: Uuid) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "DELETE FROM group_tier_lists WHERE group_id = ? AND tier_list_id = ?",
            (group_id.to_string(), entity_id.to_string()),
        )?;
        Ok(())
    }

    fn update_position(&self, kind: NodeKind, id: Uuid, position: usize) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        match kind {
            NodeKind::Group => {
                conn.execute(
                    "UPDATE groups SET position = ? WHERE id = ?",
                    (position as i64, id.to_string()),
                )?;
            }
            NodeKind::Entity => {
                conn.execute(
                    "UPDATE tier_lists SET position = ? WHERE id = ?",
                    (position as i64, id.to_string()),
                )?;
                conn.execute(
                    "UPDATE group_tier_lists SET position = ? WHERE tier_list_id = ?",
                    (position as i64, id.to_string()),
                )?;
            }
        }
        Ok(())
    }

    fn delete_group(&self, id: Uuid) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM group_tier_lists WHERE group_id = ?",
            [id.to_string()],
        )?;
        tx.execute("DELETE FROM groups WHERE id = ?", [id.to_string()])?;
        tx.commit()?;
        Ok(())
    }

    fn delete_entity(&self, id: Uuid) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM group_tier_lists WHERE tier_list_id = ?",
            [id.to_string()],
        )?;
        tx.execute("DELETE FROM tier_lists WHERE id = ?", [id.to_string()])?;
        tx.commit()?;
        Ok(())
    }

    fn fetch_all(&self, owner_id: Uuid) -> Result<StoreSnapshot> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let owner = owner_id.to_string();

        let mut stmt = conn.prepare(
            "SELECT id, name, position, created_at, updated_at
             FROM groups WHERE owner_id = ? ORDER BY position, created_at",
        )?;
        let groups = stmt
            .query_map([&owner], |row| {
                Ok(Group {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    position: row.get::<_, i64>(2)?.max(0) as usize,
                    items: Vec::new(),
                    created_at: parse_datetime(row.get::<_, String>(3)?),
                    updated_at: parse_datetime(row.get::<_, String>(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, name, attributes, position, created_at, updated_at
             FROM tier_lists WHERE owner_id = ? ORDER BY position, created_at",
        )?;
        let entities = stmt
            .query_map([&owner], entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT r.group_id, r.tier_list_id, r.position
             FROM group_tier_lists r
             JOIN groups g ON g.id = r.group_id
             WHERE g.owner_id = ? ORDER BY r.group_id, r.position",
        )?;
        let relations = stmt
            .query_map([&owner], |row| {
                Ok(Relation {
                    group_id: parse_uuid(row.get::<_, String>(0)?),
                    entity_id: parse_uuid(row.get::<_, String>(1)?),
                    position: row.get::<_, i64>(2)?.max(0) as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StoreSnapshot {
            groups,
            entities,
            relations,
        })
    }
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<RankedEntity> {
    let attributes_json: String = row.get(2)?;
    let attributes: Vec<Attribute> = serde_json::from_str(&attributes_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(RankedEntity {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        attributes,
        position: row.get::<_, i64>(3)?.max(0) as usize,
        created_at: parse_datetime(row.get::<_, String>(4)?),
        updated_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
