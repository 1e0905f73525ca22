pub mod chat;
pub mod question;
