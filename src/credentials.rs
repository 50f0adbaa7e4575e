use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

/// A bearer token and the account it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Credential {
    pub async fn issue(pool: &SqlitePool, owner: &str) -> Result<Self> {
        let token = Uuid::new_v4().simple().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO credentials (token, owner, created_at, last_activity_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(owner)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(pool)
        .await
        .context("Failed to issue credential")?;

        Ok(Self {
            token,
            owner: owner.to_string(),
            created_at: now,
            last_activity_at: now,
        })
    }

    pub async fn resolve(pool: &SqlitePool, token: &str) -> Result<Option<Self>> {
        let row: Option<CredentialRow> = sqlx::query_as(
            "SELECT token, owner, created_at, last_activity_at FROM credentials WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(pool)
        .await
        .context("Failed to look up credential")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Self {
            created_at: row
                .created_at
                .parse()
                .context("Invalid credential creation time")?,
            last_activity_at: row
                .last_activity_at
                .parse()
                .context("Invalid credential activity time")?,
            token: row.token,
            owner: row.owner,
        }))
    }

    pub async fn touch(&self, pool: &SqlitePool) -> Result<()> {
        sqlx::query("UPDATE credentials SET last_activity_at = ? WHERE token = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&self.token)
            .execute(pool)
            .await
            .context("Failed to update credential activity")?;
        Ok(())
    }

    pub async fn revoke(&self, pool: &SqlitePool) -> Result<()> {
        sqlx::query("DELETE FROM credentials WHERE token = ?")
            .bind(&self.token)
            .execute(pool)
            .await
            .context("Failed to revoke credential")?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    token: String,
    owner: String,
    created_at: String,
    last_activity_at: String,
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
