pub mod audit;
pub mod chat;
pub mod conversations;
pub mod init;
pub mod tools;
