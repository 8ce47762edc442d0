//! Identity and role-change query functions.

use rusqlite::{Connection, Row};

use meditrust_types::{Identity, Profile, Role, RoleChange};

use crate::{constraint, DbError, Result};

const IDENTITY_COLUMNS: &str = "address, public_key, role, name, age, id_number, address_text,
     phone, specialization, patient_id, registered_at";

/// Insert a newly registered identity.
pub fn insert(conn: &Connection, identity: &Identity) -> Result<()> {
    conn.execute(
        "INSERT INTO identities (address, public_key, role, name, age, id_number, address_text,
             phone, specialization, patient_id, registered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            identity.address,
            identity.public_key.as_slice(),
            identity.role.as_str(),
            identity.profile.name,
            identity.profile.age,
            identity.profile.id_number,
            identity.profile.address_text,
            identity.profile.phone,
            identity.specialization,
            identity.patient_id,
            identity.registered_at as i64,
        ],
    )
    .map_err(constraint("identity already exists"))?;
    Ok(())
}

/// Change an identity's role.
pub fn update_role(conn: &Connection, address: &str, role: Role) -> Result<()> {
    let changed = conn.execute(
        "UPDATE identities SET role = ?2 WHERE address = ?1",
        rusqlite::params![address, role.as_str()],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("identity {address}")));
    }
    Ok(())
}

/// Get an identity by address.
pub fn get(conn: &Connection, address: &str) -> Result<Identity> {
    conn.query_row(
        &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE address = ?1"),
        [address],
        read_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("identity {address}")),
        other => DbError::Sqlite(other),
    })?
    .into_identity()
}

/// List all identities in registration order.
pub fn list(conn: &Connection) -> Result<Vec<Identity>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {IDENTITY_COLUMNS} FROM identities ORDER BY registered_at, address"
    ))?;
    let rows = stmt
        .query_map([], read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(IdentityRow::into_identity).collect()
}

/// Append a role-change audit entry.
pub fn insert_role_change(conn: &Connection, change: &RoleChange) -> Result<()> {
    conn.execute(
        "INSERT INTO role_changes (address, from_role, to_role, changed_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            change.address,
            change.from.as_str(),
            change.to.as_str(),
            change.changed_at as i64,
        ],
    )?;
    Ok(())
}

/// The role-change audit trail, oldest first.
pub fn list_role_changes(conn: &Connection) -> Result<Vec<RoleChange>> {
    let mut stmt = conn.prepare(
        "SELECT address, from_role, to_role, changed_at FROM role_changes ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(address, from, to, changed_at)| {
            Ok(RoleChange {
                address,
                from: parse_role(&from)?,
                to: parse_role(&to)?,
                changed_at,
            })
        })
        .collect()
}

fn parse_role(s: &str) -> Result<Role> {
    s.parse()
        .map_err(|e: meditrust_types::TypesError| DbError::Serialization(e.to_string()))
}

/// A raw identity row from the database.
#[derive(Debug)]
struct IdentityRow {
    address: String,
    public_key: Vec<u8>,
    role: String,
    profile: Profile,
    specialization: Option<String>,
    patient_id: Option<String>,
    registered_at: u64,
}

impl IdentityRow {
    fn into_identity(self) -> Result<Identity> {
        let public_key: [u8; 32] = self
            .public_key
            .try_into()
            .map_err(|_| DbError::Serialization(format!("public key of {}", self.address)))?;
        Ok(Identity {
            public_key,
            role: parse_role(&self.role)?,
            profile: self.profile,
            specialization: self.specialization,
            patient_id: self.patient_id,
            registered_at: self.registered_at,
            address: self.address,
        })
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<IdentityRow> {
    Ok(IdentityRow {
        address: row.get(0)?,
        public_key: row.get(1)?,
        role: row.get(2)?,
        profile: Profile {
            name: row.get(3)?,
            age: row.get(4)?,
            id_number: row.get(5)?,
            address_text: row.get(6)?,
            phone: row.get(7)?,
        },
        specialization: row.get(8)?,
        patient_id: row.get(9)?,
        registered_at: row.get::<_, i64>(10)? as u64,
    })
}
