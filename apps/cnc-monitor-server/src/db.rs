use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(8))
        .connect_lazy(database_url)
        .with_context(|| {
            format!(
                "Failed to create lazy database pool for {}",
                redact_database_url(database_url)
            )
        })
}

/// Replaces the userinfo of a connection URL so credentials never reach logs.
pub fn redact_database_url(database_url: &str) -> String {
    let Some((scheme, rest)) = database_url.split_once("://") else {
        return "<database url>".to_string();
    };
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://***@{}", &rest[at + 1..]),
        None => database_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_credentials_from_url() {
        assert_eq!(
            redact_database_url("postgresql://monitor:s3cr%40t@db:5432/cnc?sslmode=disable"),
            "postgresql://***@db:5432/cnc?sslmode=disable"
        );
        assert_eq!(
            redact_database_url("postgresql://localhost/cnc"),
            "postgresql://localhost/cnc"
        );
        assert_eq!(redact_database_url("not a url:secret"), "<database url>");
    }

    #[tokio::test]
    async fn pool_error_does_not_leak_password() {
        let err = connect_lazy("postgresql://monitor:hunter2@db:5432/cnc?sslmode=bogus", 1)
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(!message.contains("hunter2"), "{message}");
        assert!(message.contains("***@db:5432"), "{message}");
    }
}
