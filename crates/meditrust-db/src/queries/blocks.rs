//! Ledger block query functions.
//!
//! Blocks are append-only: there is no update or delete here.

use rusqlite::{Connection, Row};

use meditrust_types::{AccessLevel, Block};

use crate::{constraint, DbError, Result};

const BLOCK_COLUMNS: &str = "idx, timestamp, patient_id, data, access_level, created_by,
     created_by_name, expiry_date, prev_hash, hash";

/// Insert a sealed block.
pub fn insert(conn: &Connection, block: &Block) -> Result<()> {
    let data = serde_json::to_string(&block.data)
        .map_err(|e| DbError::Serialization(format!("block {} payload: {e}", block.index)))?;
    conn.execute(
        "INSERT INTO blocks (idx, timestamp, patient_id, data, access_level, created_by,
             created_by_name, expiry_date, prev_hash, hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            block.index as i64,
            block.timestamp as i64,
            block.patient_id,
            data,
            block.access_level.as_str(),
            block.created_by,
            block.created_by_name,
            block.expiry_date as i64,
            block.prev_hash.as_slice(),
            block.hash.as_slice(),
        ],
    )
    .map_err(constraint("block index already exists"))?;
    Ok(())
}

/// Get one block by index.
pub fn get(conn: &Connection, index: u64) -> Result<Block> {
    conn.query_row(
        &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE idx = ?1"),
        [index as i64],
        read_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("block {index}")),
        other => DbError::Sqlite(other),
    })?
    .into_block()
}

/// Every block in chain order.
pub fn list(conn: &Connection) -> Result<Vec<Block>> {
    let mut stmt = conn.prepare(&format!("SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY idx"))?;
    let rows = stmt
        .query_map([], read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(BlockRow::into_block).collect()
}

/// Number of stored blocks.
pub fn count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
    Ok(n as u64)
}

#[derive(Debug)]
struct BlockRow {
    index: u64,
    timestamp: u64,
    patient_id: String,
    data: String,
    access_level: String,
    created_by: String,
    created_by_name: String,
    expiry_date: u64,
    prev_hash: Vec<u8>,
    hash: Vec<u8>,
}

impl BlockRow {
    fn into_block(self) -> Result<Block> {
        let index = self.index;
        let data = serde_json::from_str(&self.data)
            .map_err(|e| DbError::Serialization(format!("block {index} payload: {e}")))?;
        let access_level: AccessLevel = self
            .access_level
            .parse()
            .map_err(|e: meditrust_types::TypesError| DbError::Serialization(e.to_string()))?;
        Ok(Block {
            index,
            timestamp: self.timestamp,
            patient_id: self.patient_id,
            data,
            access_level,
            created_by: self.created_by,
            created_by_name: self.created_by_name,
            expiry_date: self.expiry_date,
            prev_hash: digest(self.prev_hash, index, "prev_hash")?,
            hash: digest(self.hash, index, "hash")?,
        })
    }
}

fn digest(bytes: Vec<u8>, index: u64, column: &str) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| DbError::Serialization(format!("block {index} {column} is not 32 bytes")))
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<BlockRow> {
    Ok(BlockRow {
        index: row.get::<_, i64>(0)? as u64,
        timestamp: row.get::<_, i64>(1)? as u64,
        patient_id: row.get(2)?,
        data: row.get(3)?,
        access_level: row.get(4)?,
        created_by: row.get(5)?,
        created_by_name: row.get(6)?,
        expiry_date: row.get::<_, i64>(7)? as u64,
        prev_hash: row.get(8)?,
        hash: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: u64, patient_id: &str, level: AccessLevel) -> Block {
        Block {
            index,
            timestamp: 1_700_000_000 + index,
            patient_id: patient_id.into(),
            data: serde_json::json!({ "diagnosis": "Hipertensi", "vitals": { "bp": "140/90" } }),
            access_level: level,
            created_by: "mt-doctor".into(),
            created_by_name: "Dr. Budi".into(),
            expiry_date: 1_900_000_000,
            prev_hash: [index as u8; 32],
            hash: [index as u8 + 1; 32],
        }
    }

    #[test]
    fn test_insert_get_and_list() {
        let conn = crate::open_memory().expect("open");
        let first = block(0, "", AccessLevel::Public);
        let second = block(1, "P001", AccessLevel::Private);
        insert(&conn, &first).expect("insert");
        insert(&conn, &second).expect("insert");

        assert_eq!(get(&conn, 1).expect("get"), second);
        assert_eq!(list(&conn).expect("list"), vec![first, second]);
        assert_eq!(count(&conn).expect("count"), 2);
        assert!(matches!(get(&conn, 7), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let conn = crate::open_memory().expect("open");
        insert(&conn, &block(0, "", AccessLevel::Public)).expect("insert");
        assert!(matches!(
            insert(&conn, &block(0, "P001", AccessLevel::Public)),
            Err(DbError::Constraint(_))
        ));
    }

    #[test]
    fn test_truncated_hash_is_serialization_error() {
        let conn = crate::open_memory().expect("open");
        insert(&conn, &block(0, "", AccessLevel::Public)).expect("insert");
        conn.execute("UPDATE blocks SET hash = X'00'", [])
            .expect("corrupt");
        assert!(matches!(get(&conn, 0), Err(DbError::Serialization(_))));
    }

    #[test]
    fn test_tampered_payload_survives_load() {
        let conn = crate::open_memory().expect("open");
        insert(&conn, &block(0, "P001", AccessLevel::Patient)).expect("insert");
        conn.execute(r#"UPDATE blocks SET data = '{"diagnosis":"Sehat"}'"#, [])
            .expect("tamper");
        let loaded = get(&conn, 0).expect("get");
        assert_eq!(loaded.data["diagnosis"], "Sehat");
    }
}
