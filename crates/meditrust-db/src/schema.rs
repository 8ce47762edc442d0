//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Identities
-- ============================================================

CREATE TABLE IF NOT EXISTS identities (
    address TEXT PRIMARY KEY,
    public_key BLOB NOT NULL UNIQUE,
    role TEXT NOT NULL,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    id_number TEXT NOT NULL,
    address_text TEXT NOT NULL,
    phone TEXT NOT NULL,
    specialization TEXT,
    patient_id TEXT,
    registered_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_identities_patient ON identities(patient_id);

CREATE TABLE IF NOT EXISTS role_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL REFERENCES identities(address),
    from_role TEXT NOT NULL,
    to_role TEXT NOT NULL,
    changed_at INTEGER NOT NULL
);

-- ============================================================
-- Ledger
-- ============================================================

-- Rows are written once and never updated. `data` is the JSON payload as
-- stored; the hash is recomputed from it on every audit.
CREATE TABLE IF NOT EXISTS blocks (
    idx INTEGER PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    patient_id TEXT NOT NULL,
    data TEXT NOT NULL,
    access_level TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_by_name TEXT NOT NULL,
    expiry_date INTEGER NOT NULL,
    prev_hash BLOB NOT NULL,
    hash BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blocks_patient ON blocks(patient_id);

-- ============================================================
-- Approval workflow
-- ============================================================

CREATE TABLE IF NOT EXISTS access_requests (
    request_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    requester_address TEXT NOT NULL REFERENCES identities(address),
    data_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    consumed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_requests_patient ON access_requests(patient_id);

CREATE TABLE IF NOT EXISTS request_signatures (
    request_id TEXT NOT NULL REFERENCES access_requests(request_id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    signer_address TEXT NOT NULL REFERENCES identities(address),
    signature BLOB NOT NULL,
    signed_at INTEGER NOT NULL,
    PRIMARY KEY (request_id, role)
);
"#;

/// v2: indexes on the foreign-key columns used by conversions and signature
/// lookups.
pub const SCHEMA_V2: &str = r#"
CREATE INDEX IF NOT EXISTS idx_role_changes_address ON role_changes(address);
CREATE INDEX IF NOT EXISTS idx_signatures_signer ON request_signatures(signer_address);
"#;
