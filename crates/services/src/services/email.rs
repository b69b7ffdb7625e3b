use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use thiserror::Error;

use super::{config::EmailConfig, diff::AssignmentChange};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email transport not configured")]
    NotConfigured,
    #[error("Invalid email message: {0}")]
    Message(String),
    #[error(transparent)]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone)]
pub struct AssignmentEmail {
    pub to: String,
    pub task_title: String,
    pub workspace_name: String,
    pub assigned_by: String,
    pub due_date: Option<DateTime<Utc>>,
}

impl AssignmentEmail {
    pub fn from_change(change: &AssignmentChange, workspace_name: &str, assigned_by: &str) -> Self {
        Self {
            to: change.new_assignee.clone(),
            task_title: change.task_title.clone(),
            workspace_name: workspace_name.to_string(),
            assigned_by: assigned_by.to_string(),
            due_date: change.due_date,
        }
    }
}

/// Outbound mail seam. The production impl talks SMTP; tests substitute a
/// recording double.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_assignment(&self, email: &AssignmentEmail) -> Result<(), EmailError>;

    /// Verifies transport connectivity and sends a canned message.
    /// Operational smoke-testing only, not part of the assignment flow.
    async fn test_configuration(&self, to: &str) -> Result<(), EmailError>;
}

pub struct SmtpNotifier {
    config: EmailConfig,
    frontend_url: String,
}

fn due_date_line(due_date: Option<DateTime<Utc>>) -> String {
    match due_date {
        Some(due) => format!("Due Date: {}", due.format("%Y-%m-%d")),
        None => "No due date specified".to_string(),
    }
}

pub fn render_subject(email: &AssignmentEmail) -> String {
    format!("New Task Assignment: {}", email.task_title)
}

pub fn render_bodies(email: &AssignmentEmail, frontend_url: &str) -> (String, String) {
    let due_line = due_date_line(email.due_date);
    let dashboard_url = format!("{}/dashboard", frontend_url.trim_end_matches('/'));

    let text = format!(
        "You've been assigned a new task!\n\n\
         Task: {}\n\
         Workspace: {}\n\
         Assigned by: {}\n\
         {}\n\n\
         Log in to your workspace to view details: {}\n",
        email.task_title, email.workspace_name, email.assigned_by, due_line, dashboard_url
    );

    let html = format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
           <h2>You've been assigned a new task!</h2>\
           <div style=\"background-color: #f5f5f5; padding: 20px; border-radius: 5px;\">\
             <h3>{}</h3>\
             <p><strong>Workspace:</strong> {}</p>\
             <p><strong>Assigned by:</strong> {}</p>\
             <p><strong>{}</strong></p>\
           </div>\
           <p>Log in to your workspace to view details and start working on this task.</p>\
           <a href=\"{}\">Go to Dashboard</a>\
         </div>",
        email.task_title, email.workspace_name, email.assigned_by, due_line, dashboard_url
    );

    (text, html)
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig, frontend_url: String) -> Self {
        Self {
            config,
            frontend_url,
        }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        if !self.config.is_configured() {
            return Err(EmailError::NotConfigured);
        }
        let host = self.config.smtp_host.as_deref().unwrap_or_default();
        let username = self.config.username.clone().unwrap_or_default();
        let password = self.config.password.clone().unwrap_or_default();
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(username, password))
            .build();
        Ok(transport)
    }

    fn from_mailbox(&self) -> Result<Mailbox, EmailError> {
        let address = self
            .config
            .from_address
            .as_deref()
            .or(self.config.username.as_deref())
            .ok_or(EmailError::NotConfigured)?;
        format!("Strive Workspace <{address}>")
            .parse()
            .map_err(|err: lettre::address::AddressError| EmailError::Message(err.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_assignment(&self, email: &AssignmentEmail) -> Result<(), EmailError> {
        let transport = self.transport()?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|err: lettre::address::AddressError| EmailError::Message(err.to_string()))?;
        let (text, html) = render_bodies(email, &self.frontend_url);
        let message = Message::builder()
            .from(self.from_mailbox()?)
            .to(to)
            .subject(render_subject(email))
            .multipart(MultiPart::alternative_plain_html(text, html))
            .map_err(|err| EmailError::Message(err.to_string()))?;

        transport.send(message).await?;
        Ok(())
    }

    async fn test_configuration(&self, to: &str) -> Result<(), EmailError> {
        let transport = self.transport()?;
        if !transport.test_connection().await? {
            return Err(EmailError::Message(
                "SMTP connection test failed".to_string(),
            ));
        }

        let to: Mailbox = to
            .parse()
            .map_err(|err: lettre::address::AddressError| EmailError::Message(err.to_string()))?;
        let message = Message::builder()
            .from(self.from_mailbox()?)
            .to(to)
            .subject("Strive email service test")
            .body("Email service is configured correctly!".to_string())
            .map_err(|err| EmailError::Message(err.to_string()))?;
        transport.send(message).await?;
        Ok(())
    }
}

/// One dispatch attempt per change; failures are logged and swallowed.
/// Runs on a detached task after the triggering response, so a slow or
/// broken transport never delays the caller.
pub async fn dispatch_assignment_changes(
    notifier: &dyn Notifier,
    changes: &[AssignmentChange],
    workspace_name: &str,
    assigned_by: &str,
) {
    for change in changes {
        let email = AssignmentEmail::from_change(change, workspace_name, assigned_by);
        match notifier.send_assignment(&email).await {
            Ok(()) => {
                tracing::info!(task = %change.task_title, to = %email.to, "assignment email sent");
            }
            Err(err) => {
                tracing::warn!(
                    task = %change.task_title,
                    to = %email.to,
                    error = %err,
                    "assignment email not sent"
                );
            }
        }
    }
}
