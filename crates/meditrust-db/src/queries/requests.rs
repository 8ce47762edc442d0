//! Access request and signature query functions.

use std::collections::BTreeMap;

use rusqlite::{Connection, Row};

use meditrust_types::{AccessRequest, Role, SignatureEntry};

use crate::{DbError, Result};

const REQUEST_COLUMNS: &str = "request_id, patient_id, requester_address, data_type, status,
     created_at, expires_at, consumed_at";

/// Insert a request or update its mutable state.
///
/// Only `status` and `consumed_at` change after creation. Signatures are
/// write-once per role, so existing slots are left untouched.
pub fn upsert(conn: &Connection, request: &AccessRequest) -> Result<()> {
    conn.execute(
        "INSERT INTO access_requests (request_id, patient_id, requester_address, data_type,
             status, created_at, expires_at, consumed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(request_id) DO UPDATE SET
             status = excluded.status,
             consumed_at = excluded.consumed_at",
        rusqlite::params![
            request.request_id,
            request.patient_id,
            request.requester_address,
            request.data_type.as_str(),
            request.status.as_str(),
            request.created_at as i64,
            request.expires_at as i64,
            request.consumed_at.map(|t| t as i64),
        ],
    )?;

    for (role, entry) in &request.signatures {
        conn.execute(
            "INSERT OR IGNORE INTO request_signatures
                 (request_id, role, signer_address, signature, signed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                request.request_id,
                role.as_str(),
                entry.signer_address,
                entry.signature.as_slice(),
                entry.signed_at as i64,
            ],
        )?;
    }
    Ok(())
}

/// Get a request with its signatures.
pub fn get(conn: &Connection, request_id: &str) -> Result<AccessRequest> {
    let row = conn
        .query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM access_requests WHERE request_id = ?1"),
            [request_id],
            read_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                DbError::NotFound(format!("access request {request_id}"))
            }
            other => DbError::Sqlite(other),
        })?;
    row.into_request(conn)
}

/// Every request, oldest first.
pub fn list(conn: &Connection) -> Result<Vec<AccessRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLUMNS} FROM access_requests ORDER BY created_at, request_id"
    ))?;
    let rows = stmt
        .query_map([], read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(|row| row.into_request(conn)).collect()
}

fn signatures(conn: &Connection, request_id: &str) -> Result<BTreeMap<Role, SignatureEntry>> {
    let mut stmt = conn.prepare(
        "SELECT role, signer_address, signature, signed_at
         FROM request_signatures WHERE request_id = ?1",
    )?;
    let rows = stmt
        .query_map([request_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, i64>(3)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(role, signer_address, signature, signed_at)| {
            let role: Role = parse(&role)?;
            let signature: [u8; 64] = signature.try_into().map_err(|_| {
                DbError::Serialization(format!("signature on {request_id} is not 64 bytes"))
            })?;
            Ok((
                role,
                SignatureEntry {
                    signer_address,
                    signature,
                    signed_at,
                },
            ))
        })
        .collect()
}

fn parse<T>(s: &str) -> Result<T>
where
    T: std::str::FromStr<Err = meditrust_types::TypesError>,
{
    s.parse().map_err(|e: meditrust_types::TypesError| DbError::Serialization(e.to_string()))
}

#[derive(Debug)]
struct RequestRow {
    request_id: String,
    patient_id: String,
    requester_address: String,
    data_type: String,
    status: String,
    created_at: u64,
    expires_at: u64,
    consumed_at: Option<u64>,
}

impl RequestRow {
    fn into_request(self, conn: &Connection) -> Result<AccessRequest> {
        let signatures = signatures(conn, &self.request_id)?;
        Ok(AccessRequest {
            data_type: parse(&self.data_type)?,
            status: parse(&self.status)?,
            signatures,
            request_id: self.request_id,
            patient_id: self.patient_id,
            requester_address: self.requester_address,
            created_at: self.created_at,
            expires_at: self.expires_at,
            consumed_at: self.consumed_at,
        })
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RequestRow> {
    Ok(RequestRow {
        request_id: row.get(0)?,
        patient_id: row.get(1)?,
        requester_address: row.get(2)?,
        data_type: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get::<_, i64>(5)? as u64,
        expires_at: row.get::<_, i64>(6)? as u64,
        consumed_at: row.get::<_, Option<i64>>(7)?.map(|t| t as u64),
    })
}
