pub mod admin;
pub mod attachments;
pub mod auth;
pub mod email;
pub mod health;
pub mod notifications;
pub mod users;
pub mod workspaces;
