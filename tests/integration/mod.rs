//! Integration tests for evidence-snowflake.

pub mod session_api_test;
