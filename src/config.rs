use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
    pub from_address: String,
    pub sysadmin_emails: Vec<String>,
    pub subject: String,
}

impl SmtpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub smtp: SmtpConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let smtp = SmtpConfig {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".into()),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(25),
            timeout_seconds: std::env::var("SMTP_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10),
            from_address: std::env::var("E500_EMAIL_ADDRESS")
                .unwrap_or_else(|_| "e500@localhost".into()),
            sysadmin_emails: parse_email_list(
                &std::env::var("SYSADMIN_EMAILS").unwrap_or_default(),
            ),
            subject: std::env::var("ERROR_EMAIL_SUBJECT").unwrap_or_else(|_| "500 Error".into()),
        };
        Ok(Self {
            database_url,
            max_connections,
            smtp,
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))
    }
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_list_skips_blanks() {
        assert_eq!(
            parse_email_list(" a@x.org, ,b@y.org,"),
            vec!["a@x.org".to_string(), "b@y.org".to_string()]
        );
        assert!(parse_email_list("").is_empty());
    }
}
