pub mod check;
pub mod config;
pub mod init;
pub mod roster;
pub mod whoami;
