//! Local embedded SQL store for rooms and NPC assignments (spec §4.D).
//!
//! A single `rusqlite` connection guarded by a mutex, mirroring the spec's
//! "single connection; callers must serialise writes" requirement (§5
//! Shared resources). The rusqlite dependency itself is grounded on the
//! retrieved pack's `gabemgem-rust_dt` crate, which already depends on
//! `rusqlite` with the `bundled` feature.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use presence_domain::error::{Error, Result};
use presence_domain::model::{NpcAssignment, Position, RoomRecord};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Persistence(format!("opening store at {}: {e}", path.display())))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Persistence(format!("opening in-memory store: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rooms (
                name TEXT PRIMARY KEY,
                description TEXT,
                password TEXT,
                autoDispose INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS npcs (
                agentId TEXT PRIMARY KEY,
                registryAgentId TEXT,
                officeId TEXT,
                name TEXT NOT NULL,
                avatarId TEXT,
                workstationId TEXT,
                positionX REAL NOT NULL,
                positionY REAL NOT NULL,
                role TEXT,
                computerId INTEGER,
                roomName TEXT,
                voiceAgentId TEXT,
                namespaceSlug TEXT,
                agentMetadata TEXT
            );",
        )
        .map_err(|e| Error::Persistence(format!("running schema migration: {e}")))?;

        // Additive-column migrations: tolerate "duplicate column" so legacy
        // DBs upgrade in place (spec §4.D).
        for stmt in ADDITIVE_COLUMNS {
            if let Err(e) = conn.execute(stmt, []) {
                if !e.to_string().to_lowercase().contains("duplicate column") {
                    return Err(Error::Persistence(format!("additive migration failed: {e}")));
                }
            }
        }

        Ok(())
    }

    // ── Rooms ───────────────────────────────────────────────────────

    pub fn save_room(&self, room: &RoomRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO rooms (name, description, password, autoDispose)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                password = excluded.password,
                autoDispose = excluded.autoDispose",
            params![
                room.name,
                room.description,
                room.password,
                room.auto_dispose as i64
            ],
        )
        .map_err(|e| Error::Persistence(format!("saving room {}: {e}", room.name)))?;
        Ok(())
    }

    pub fn delete_room_by_name(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM rooms WHERE name = ?1", params![name])
            .map_err(|e| Error::Persistence(format!("deleting room {name}: {e}")))?;
        Ok(())
    }

    pub fn all_rooms(&self) -> Result<Vec<RoomRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT name, description, password, autoDispose FROM rooms")
            .map_err(|e| Error::Persistence(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RoomRecord {
                    name: row.get(0)?,
                    description: row.get(1)?,
                    password: row.get(2)?,
                    auto_dispose: row.get::<_, i64>(3)? != 0,
                })
            })
            .map_err(|e| Error::Persistence(e.to_string()))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    pub fn clear_all_rooms(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM rooms", [])
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }

    // ── NPCs ────────────────────────────────────────────────────────

    pub fn save_npc(&self, npc: &NpcAssignment) -> Result<()> {
        let metadata_json = serde_json::to_string(&npc.agent_metadata)
            .map_err(|e| Error::Persistence(format!("serialising agentMetadata: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO npcs (
                agentId, registryAgentId, officeId, name, avatarId, workstationId,
                positionX, positionY, role, computerId, roomName, voiceAgentId,
                namespaceSlug, agentMetadata
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
            ON CONFLICT(agentId) DO UPDATE SET
                registryAgentId = excluded.registryAgentId,
                officeId = excluded.officeId,
                name = excluded.name,
                avatarId = excluded.avatarId,
                workstationId = excluded.workstationId,
                positionX = excluded.positionX,
                positionY = excluded.positionY,
                role = excluded.role,
                computerId = excluded.computerId,
                roomName = excluded.roomName,
                voiceAgentId = excluded.voiceAgentId,
                namespaceSlug = excluded.namespaceSlug,
                agentMetadata = excluded.agentMetadata",
            params![
                npc.agent_id,
                npc.registry_agent_id,
                npc.office_id,
                npc.name,
                npc.avatar_id,
                npc.workstation_id,
                npc.position.x,
                npc.position.y,
                npc.role,
                npc.computer_id.map(|c| c as i64),
                npc.room_id,
                npc.voice_agent_id,
                npc.namespace_slug,
                metadata_json,
            ],
        )
        .map_err(|e| Error::Persistence(format!("saving npc {}: {e}", npc.agent_id)))?;
        Ok(())
    }

    pub fn remove_npc(&self, agent_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM npcs WHERE agentId = ?1", params![agent_id])
            .map_err(|e| Error::Persistence(format!("removing npc {agent_id}: {e}")))?;
        Ok(())
    }

    pub fn all_npcs(&self) -> Result<Vec<NpcAssignment>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT agentId, registryAgentId, officeId, name, avatarId, workstationId,
                        positionX, positionY, role, computerId, roomName, voiceAgentId,
                        namespaceSlug, agentMetadata
                 FROM npcs",
            )
            .map_err(|e| Error::Persistence(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row_to_npc(row))
            .map_err(|e| Error::Persistence(e.to_string()))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    pub fn npcs_in_room(&self, room_name: &str) -> Result<Vec<NpcAssignment>> {
        Ok(self
            .all_npcs()?
            .into_iter()
            .filter(|n| n.room_id == room_name)
            .collect())
    }

    pub fn clear_all_npcs(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM npcs", [])
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }
}

const ADDITIVE_COLUMNS: &[&str] = &[
    "ALTER TABLE npcs ADD COLUMN namespaceSlug TEXT",
    "ALTER TABLE npcs ADD COLUMN agentMetadata TEXT",
];

fn row_to_npc(row: &rusqlite::Row) -> rusqlite::Result<NpcAssignment> {
    let position_x: f64 = row.get(6)?;
    let position_y: f64 = row.get(7)?;
    let computer_id: Option<i64> = row.get(9)?;
    let metadata_raw: Option<String> = row.get(13)?;
    let assigned_at: DateTime<Utc> = Utc::now();

    // agentMetadata reads back as null on parse failure (spec §4.D).
    let agent_metadata: Value = metadata_raw
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or(Value::Null);

    Ok(NpcAssignment {
        agent_id: row.get(0)?,
        registry_agent_id: row.get(1)?,
        office_id: row.get(2)?,
        name: row.get(3)?,
        avatar_id: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        workstation_id: row.get(5)?,
        position: Position {
            x: position_x,
            y: position_y,
        },
        role: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        computer_id: computer_id.map(|c| c as usize),
        voice_agent_id: row.get(10)?,
        namespace_slug: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
        room_id: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
        assigned_at,
        agent_metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_npc(agent_id: &str, room: &str) -> NpcAssignment {
        NpcAssignment {
            agent_id: agent_id.to_string(),
            registry_agent_id: Some("ra-1".to_string()),
            office_id: Some("office-1".to_string()),
            name: "Ada".to_string(),
            avatar_id: "adam".to_string(),
            workstation_id: Some("design-studio".to_string()),
            position: Position { x: 800.0, y: 200.0 },
            role: "GM".to_string(),
            computer_id: Some(2),
            voice_agent_id: Some("voice-1".to_string()),
            namespace_slug: "alpha".to_string(),
            room_id: room.to_string(),
            assigned_at: Utc::now(),
            agent_metadata: serde_json::json!({ "nickname": "Ada" }),
        }
    }

    #[test]
    fn save_and_load_room_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let room = RoomRecord {
            name: "public".to_string(),
            description: Some("Public lobby".to_string()),
            password: None,
            auto_dispose: true,
        };
        store.save_room(&room).unwrap();
        let all = store.all_rooms().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "public");
        assert!(all[0].auto_dispose);
    }

    #[test]
    fn save_room_is_idempotent_insert_or_replace() {
        let store = Store::open_in_memory().unwrap();
        let mut room = RoomRecord {
            name: "public".to_string(),
            description: Some("v1".to_string()),
            password: None,
            auto_dispose: false,
        };
        store.save_room(&room).unwrap();
        room.description = Some("v2".to_string());
        store.save_room(&room).unwrap();
        let all = store.all_rooms().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description.as_deref(), Some("v2"));
    }

    #[test]
    fn save_and_load_npc_round_trips_metadata() {
        let store = Store::open_in_memory().unwrap();
        let npc = sample_npc("a.x.office.xyz", "Public Lobby");
        store.save_npc(&npc).unwrap();
        let all = store.all_npcs().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].agent_id, npc.agent_id);
        assert_eq!(all[0].agent_metadata, npc.agent_metadata);
        assert_eq!(all[0].computer_id, Some(2));
    }

    #[test]
    fn remove_npc_deletes_row() {
        let store = Store::open_in_memory().unwrap();
        let npc = sample_npc("a.x.office.xyz", "Public Lobby");
        store.save_npc(&npc).unwrap();
        store.remove_npc(&npc.agent_id).unwrap();
        assert!(store.all_npcs().unwrap().is_empty());
    }

    #[test]
    fn npcs_in_room_filters_by_room_name() {
        let store = Store::open_in_memory().unwrap();
        store.save_npc(&sample_npc("a", "Public Lobby")).unwrap();
        store.save_npc(&sample_npc("b", "Other Room")).unwrap();
        let in_lobby = store.npcs_in_room("Public Lobby").unwrap();
        assert_eq!(in_lobby.len(), 1);
        assert_eq!(in_lobby[0].agent_id, "a");
    }

    #[test]
    fn clear_all_truncates_both_tables() {
        let store = Store::open_in_memory().unwrap();
        store.save_npc(&sample_npc("a", "room")).unwrap();
        store
            .save_room(&RoomRecord {
                name: "room".to_string(),
                description: None,
                password: None,
                auto_dispose: false,
            })
            .unwrap();
        store.clear_all_npcs().unwrap();
        store.clear_all_rooms().unwrap();
        assert!(store.all_npcs().unwrap().is_empty());
        assert!(store.all_rooms().unwrap().is_empty());
    }

    #[test]
    fn migrate_tolerates_rerun_on_existing_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.db");
        {
            let store = Store::open(&path).unwrap();
            store.save_npc(&sample_npc("a", "room")).unwrap();
        }
        // Reopening re-runs migrate() against an already-migrated DB; the
        // additive ALTER TABLEs must not fail.
        let store = Store::open(&path).unwrap();
        assert_eq!(store.all_npcs().unwrap().len(), 1);
    }
}
