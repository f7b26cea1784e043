pub mod cleanup_cmd;
pub mod serve;
pub mod sessions_cmd;
