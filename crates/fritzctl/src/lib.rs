pub mod cmd_collect_all;
pub mod cmd_serve;
pub mod cmd_test;
pub mod common;
