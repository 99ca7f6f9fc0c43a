mod config_validation;
mod distributor_tests;
mod retry_tests;
mod session_tests;
mod snapshot_tests;
