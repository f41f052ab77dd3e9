//! Encrypted platform account storage using SQLite.

use super::{PlatformAccount, SealedToken, TokenCipher};
use crate::platform::{AccountStatus, Platform};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, platform, external_account_id, display_name,
           access_token, access_token_nonce,
           refresh_token, refresh_token_nonce,
           token_expiry, status, error_message, created_at, updated_at
    FROM platform_accounts
"#;

/// Encrypted platform account storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE platform_accounts (
///     id TEXT PRIMARY KEY,
///     user_id TEXT NOT NULL,
///     platform TEXT NOT NULL,
///     external_account_id TEXT NOT NULL,
///     display_name TEXT NOT NULL,
///     access_token TEXT NOT NULL,        -- Encrypted
///     access_token_nonce TEXT NOT NULL,
///     refresh_token TEXT,                -- Encrypted (optional)
///     refresh_token_nonce TEXT,
///     token_expiry TEXT,                 -- RFC 3339 (optional)
///     status TEXT NOT NULL,
///     error_message TEXT,
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(user_id, platform, external_account_id)
/// );
/// ```
///
/// Writes are whole-row: two concurrent refreshes of the same account are
/// last-write-wins.
pub struct AccountStore {
    conn: Mutex<Connection>,
    cipher: TokenCipher,
}

/// Row as stored, before token decryption.
struct StoredRow {
    id: String,
    user_id: String,
    platform: String,
    external_account_id: String,
    display_name: String,
    access_token: SealedToken,
    refresh_token: Option<SealedToken>,
    token_expiry: Option<String>,
    status: String,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let refresh_token: Option<String> = row.get(7)?;
        let refresh_token_nonce: Option<String> = row.get(8)?;

        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            platform: row.get(2)?,
            external_account_id: row.get(3)?,
            display_name: row.get(4)?,
            access_token: SealedToken {
                ciphertext: row.get(5)?,
                nonce: row.get(6)?,
            },
            refresh_token: match (refresh_token, refresh_token_nonce) {
                (Some(ciphertext), Some(nonce)) => Some(SealedToken { ciphertext, nonce }),
                _ => None,
            },
            token_expiry: row.get(9)?,
            status: row.get(10)?,
            error_message: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse timestamp '{}'", value))
}

impl AccountStore {
    /// Creates or opens an account store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let cipher =
            TokenCipher::from_base64_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS platform_accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                external_account_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                access_token TEXT NOT NULL,
                access_token_nonce TEXT NOT NULL,
                refresh_token TEXT,
                refresh_token_nonce TEXT,
                token_expiry TEXT,
                status TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, platform, external_account_id)
            )
            "#,
            [],
        )
        .context("Failed to create platform_accounts table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_accounts_user ON platform_accounts(user_id)",
            [],
        )
        .context("Failed to create index")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Account store connection mutex poisoned"))
    }

    fn decode(&self, row: StoredRow) -> Result<PlatformAccount> {
        let platform = row
            .platform
            .parse::<Platform>()
            .with_context(|| format!("Stored account {} has unknown platform", row.id))?;
        let status = row
            .status
            .parse::<AccountStatus>()
            .map_err(|e: String| anyhow!(e))
            .with_context(|| format!("Stored account {} has unknown status", row.id))?;

        let access_token = self
            .cipher
            .open(&row.access_token)
            .context("Failed to decrypt access token")?;
        let refresh_token = row
            .refresh_token
            .as_ref()
            .map(|sealed| self.cipher.open(sealed))
            .transpose()
            .context("Failed to decrypt refresh token")?;

        Ok(PlatformAccount {
            id: row.id,
            user_id: row.user_id,
            platform,
            external_account_id: row.external_account_id,
            display_name: row.display_name,
            access_token,
            refresh_token,
            token_expiry: row.token_expiry.as_deref().map(parse_timestamp).transpose()?,
            status,
            error_message: row.error_message,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }

    /// Inserts the account, or overwrites the row already linked to the same
    /// (user, platform, external account id).
    ///
    /// On conflict the existing row keeps its `id` and `created_at`; every
    /// other column takes the new value. Returns the stored record.
    pub fn upsert(&self, account: &PlatformAccount) -> Result<PlatformAccount> {
        let access = self
            .cipher
            .seal(&account.access_token)
            .context("Failed to encrypt access token")?;
        let refresh = self
            .cipher
            .seal_optional(account.refresh_token.as_deref())
            .context("Failed to encrypt refresh token")?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO platform_accounts (
                id, user_id, platform, external_account_id, display_name,
                access_token, access_token_nonce,
                refresh_token, refresh_token_nonce,
                token_expiry, status, error_message, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(user_id, platform, external_account_id) DO UPDATE SET
                display_name = excluded.display_name,
                access_token = excluded.access_token,
                access_token_nonce = excluded.access_token_nonce,
                refresh_token = excluded.refresh_token,
                refresh_token_nonce = excluded.refresh_token_nonce,
                token_expiry = excluded.token_expiry,
                status = excluded.status,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
            params![
                account.id,
                account.user_id,
                account.platform.as_str(),
                account.external_account_id,
                account.display_name,
                access.ciphertext,
                access.nonce,
                refresh.as_ref().map(|s| s.ciphertext.as_str()),
                refresh.as_ref().map(|s| s.nonce.as_str()),
                account.token_expiry.map(|dt| dt.to_rfc3339()),
                account.status.as_str(),
                account.error_message,
                account.created_at.to_rfc3339(),
                account.updated_at.to_rfc3339(),
            ],
        )
        .context("Failed to upsert platform account")?;

        let row = conn
            .query_row(
                &format!(
                    "{} WHERE user_id = ?1 AND platform = ?2 AND external_account_id = ?3",
                    SELECT_COLUMNS
                ),
                params![
                    account.user_id,
                    account.platform.as_str(),
                    account.external_account_id
                ],
                StoredRow::from_row,
            )
            .context("Failed to read back upserted account")?;
        drop(conn);

        self.decode(row)
    }

    /// Overwrites the mutable columns of an existing row by id.
    ///
    /// Returns `Ok(false)` when no row has that id.
    pub fn save(&self, account: &PlatformAccount) -> Result<bool> {
        let access = self
            .cipher
            .seal(&account.access_token)
            .context("Failed to encrypt access token")?;
        let refresh = self
            .cipher
            .seal_optional(account.refresh_token.as_deref())
            .context("Failed to encrypt refresh token")?;

        let rows_affected = self
            .conn()?
            .execute(
                r#"
                UPDATE platform_accounts SET
                    display_name = ?2,
                    access_token = ?3,
                    access_token_nonce = ?4,
                    refresh_token = ?5,
                    refresh_token_nonce = ?6,
                    token_expiry = ?7,
                    status = ?8,
                    error_message = ?9,
                    updated_at = ?10
                WHERE id = ?1
                "#,
                params![
                    account.id,
                    account.display_name,
                    access.ciphertext,
                    access.nonce,
                    refresh.as_ref().map(|s| s.ciphertext.as_str()),
                    refresh.as_ref().map(|s| s.nonce.as_str()),
                    account.token_expiry.map(|dt| dt.to_rfc3339()),
                    account.status.as_str(),
                    account.error_message,
                    account.updated_at.to_rfc3339(),
                ],
            )
            .context("Failed to save platform account")?;

        Ok(rows_affected > 0)
    }

    /// Retrieves an account by id.
    pub fn get(&self, id: &str) -> Result<Option<PlatformAccount>> {
        let row = self
            .conn()?
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                StoredRow::from_row,
            )
            .optional()
            .context("Failed to query platform account")?;

        row.map(|row| self.decode(row)).transpose()
    }

    /// Retrieves an account by id, only if `user_id` owns it.
    pub fn get_owned(&self, user_id: &str, id: &str) -> Result<Option<PlatformAccount>> {
        Ok(self.get(id)?.filter(|account| account.user_id == user_id))
    }

    /// Lists every account linked by a user, oldest first.
    pub fn list_by_user(&self, user_id: &str) -> Result<Vec<PlatformAccount>> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(&format!(
                    "{} WHERE user_id = ?1 ORDER BY created_at, platform",
                    SELECT_COLUMNS
                ))
                .context("Failed to prepare query")?;

            let rows = stmt
                .query_map(params![user_id], StoredRow::from_row)
                .context("Failed to execute query")?
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read results")?;
            rows
        };

        rows.into_iter().map(|row| self.decode(row)).collect()
    }

    /// Deletes an account row. Only reached through explicit user deletion.
    ///
    /// Returns `Ok(false)` if no row had that id.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute("DELETE FROM platform_accounts WHERE id = ?1", params![id])
            .context("Failed to delete platform account")?;

        Ok(rows_affected > 0)
    }

    /// Number of stored accounts across all users.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM platform_accounts", [], |row| row.get(0))
            .context("Failed to count platform accounts")?;

        Ok(count as usize)
    }
}
