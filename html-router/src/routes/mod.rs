pub mod chat;
pub mod instructions;
