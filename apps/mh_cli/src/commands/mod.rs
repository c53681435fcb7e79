// apps/mh_cli/src/commands/mod.rs

//! 子命令

pub mod info;
pub mod plan;
pub mod validate;
pub mod verify;
