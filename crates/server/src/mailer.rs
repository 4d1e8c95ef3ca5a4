//! Outgoing email.
//!
//! Every message can be recorded in `email_log` (when `LOG_EMAILS` is on) and
//! is then handed to the configured transport: SendGrid's v3 API when a key is
//! configured, otherwise a log line. Neither the log table nor the log line
//! carries a usable login or reset token.

#[cfg(test)]
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use teambeat_api::{EmailKind, ServiceError, db, service};

use crate::config::AppConfig;
use crate::storage::{self, Db};

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Clone)]
pub enum EmailTransport {
    /// Development stub: log the message and report success.
    Log,
    SendGrid {
        api_key: String,
        client: reqwest::Client,
    },
    /// Keep sent messages, links intact, for tests to read back.
    #[cfg(test)]
    Memory(Arc<Mutex<Vec<OutgoingEmail>>>),
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub kind: EmailKind,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone)]
pub struct Mailer {
    transport: EmailTransport,
    from_email: String,
    log_emails: bool,
}

impl Mailer {
    pub fn new(transport: EmailTransport, from_email: impl Into<String>, log_emails: bool) -> Self {
        Self {
            transport,
            from_email: from_email.into(),
            log_emails,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let transport = match &config.sendgrid_api_key {
            Some(key) => EmailTransport::SendGrid {
                api_key: key.clone(),
                client: reqwest::Client::new(),
            },
            None => EmailTransport::Log,
        };
        Self::new(transport, config.from_email.clone(), config.log_emails)
    }

    pub async fn send(&self, db: &Db, email: OutgoingEmail) -> Result<(), ServiceError> {
        let redacted = service::redact_link_tokens(&email.body);

        if self.log_emails {
            let conn = db.conn();
            let logged = storage::execute(
                &conn,
                db::email_log::insert(
                    &Uuid::new_v4().to_string(),
                    email.kind.as_str(),
                    &email.to,
                    &self.from_email,
                    &email.subject,
                    &redacted,
                ),
            );
            if let Err(e) = logged {
                tracing::warn!(kind = %email.kind, to = %email.to, "email not logged: {e}");
            }
        } // conn dropped here, before any .await

        match &self.transport {
            EmailTransport::Log => {
                tracing::info!(
                    kind = %email.kind,
                    to = %email.to,
                    subject = %email.subject,
                    body = %redacted,
                    "email send stub"
                );
                Ok(())
            }
            #[cfg(test)]
            EmailTransport::Memory(outbox) => {
                outbox.lock().unwrap().push(email.clone());
                Ok(())
            }
            EmailTransport::SendGrid { api_key, client } => {
                let payload = serde_json::json!({
                    "personalizations": [{ "to": [{ "email": email.to }] }],
                    "from": { "email": self.from_email },
                    "subject": email.subject,
                    "content": [{ "type": "text/plain", "value": email.body }],
                });
                let resp = client
                    .post(SENDGRID_SEND_URL)
                    .bearer_auth(api_key)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| ServiceError::Internal(format!("email delivery failed: {e}")))?;
                if !resp.status().is_success() {
                    return Err(ServiceError::Internal(format!(
                        "email delivery rejected: {}",
                        resp.status()
                    )));
                }
                tracing::info!(kind = %email.kind, to = %email.to, "email sent");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Message builders
// ---------------------------------------------------------------------------

pub fn login_link_email(to: &str, link: &str) -> OutgoingEmail {
    OutgoingEmail {
        kind: EmailKind::LoginLink,
        to: to.to_string(),
        subject: "Your TeamBeat login link".into(),
        body: format!(
            "Use the link below to log in to TeamBeat. It expires in 24 hours and works once.\n\n{link}\n"
        ),
    }
}

pub fn password_reset_email(to: &str, link: &str) -> OutgoingEmail {
    OutgoingEmail {
        kind: EmailKind::PasswordReset,
        to: to.to_string(),
        subject: "Reset your TeamBeat password".into(),
        body: format!(
            "Someone asked to reset the password for this TeamBeat account. \
             If it was you, follow the link below within 24 hours.\n\n{link}\n\n\
             If not, you can ignore this email.\n"
        ),
    }
}

pub fn org_invitation_email(
    to: &str,
    inviter: &str,
    organization: &str,
    profile_link: &str,
) -> OutgoingEmail {
    OutgoingEmail {
        kind: EmailKind::OrgInvitation,
        to: to.to_string(),
        subject: format!("You have been invited to {organization} on TeamBeat"),
        body: format!(
            "{inviter} invited you to join {organization} on TeamBeat.\n\n\
             Accept or decline the invitation from your profile:\n{profile_link}\n"
        ),
    }
}

pub fn app_invitation_email(
    to: &str,
    inviter: &str,
    organization: &str,
    login_link: &str,
) -> OutgoingEmail {
    OutgoingEmail {
        kind: EmailKind::AppInvitation,
        to: to.to_string(),
        subject: format!("{inviter} invited you to TeamBeat"),
        body: format!(
            "{inviter} invited you to join {organization} on TeamBeat, a daily status \
             check-in for teams.\n\nLog in with the link below (valid for 24 hours), then set \
             a password from your profile:\n{login_link}\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_db;

    #[tokio::test]
    async fn logged_emails_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(&dir.path().join("test.db")).unwrap();
        let mailer = Mailer::new(EmailTransport::Log, "no-reply@team-beat.app", true);

        mailer
            .send(&db, login_link_email("ada@example.com", "http://x/login/?token=t&user=u"))
            .await
            .unwrap();

        let conn = db.conn();
        let rows = storage::query_all(
            &conn,
            db::email_log::list_for_recipient("ada@example.com", 10),
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(2)?)),
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "login_link");
        assert!(rows[0].1.contains("/login/?token=[redacted]&user=u"));
        assert!(!rows[0].1.contains("token=t&"));
    }

    #[tokio::test]
    async fn delivery_goes_ahead_when_logging_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(&dir.path().join("test.db")).unwrap();
        db.conn().execute("DROP TABLE email_log", []).unwrap();

        let outbox = Arc::new(Mutex::new(Vec::new()));
        let mailer = Mailer::new(
            EmailTransport::Memory(outbox.clone()),
            "no-reply@team-beat.app",
            true,
        );
        mailer
            .send(&db, password_reset_email("ada@example.com", "http://x/resetpassword/?token=t"))
            .await
            .unwrap();

        let sent = outbox.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("?token=t"));
    }

    #[tokio::test]
    async fn logging_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(&dir.path().join("test.db")).unwrap();
        let mailer = Mailer::new(EmailTransport::Log, "no-reply@team-beat.app", false);
        mailer
            .send(&db, password_reset_email("ada@example.com", "http://x"))
            .await
            .unwrap();

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM email_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
