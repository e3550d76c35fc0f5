use rusqlite::Row;
use serde::Serialize;

/// A user as returned to clients — never includes the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub profile_pic: String,
    pub created_at: String,
    pub updated_at: String,
}

impl PublicUser {
    /// Map a row of (id, email, full_name, profile_pic, created_at, updated_at).
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            profile_pic: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

/// Column list matching PublicUser::from_row, for reuse in queries.
pub const PUBLIC_USER_COLUMNS: &str =
    "id, email, full_name, profile_pic, created_at, updated_at";
