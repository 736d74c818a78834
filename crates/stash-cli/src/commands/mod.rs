//! Command handlers.

pub mod attachments;
pub mod backup;
pub mod init;
pub mod passwords;
pub mod records;
