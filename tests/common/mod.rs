#![allow(dead_code)]

pub use http_exec_test_utils::builders;
pub use http_exec_test_utils::fake_runner;
pub use http_exec_test_utils::{init_tracing, wait_until, with_timeout};
