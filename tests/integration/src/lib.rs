//! Integration tests for the ResilIoT base station
//!
//! This test suite validates:
//! - Sensor envelope to stored reading over the real receive path
//! - Alert evaluation from stored data to an encrypted UDP broadcast
//! - Nonce uniqueness across process restarts sharing one counter file
//! - Rejection of tampered, replayed-to-wrong-node and malformed frames

pub mod test_utils;

#[cfg(test)]
mod end_to_end_tests;

#[cfg(test)]
mod hostile_frame_tests;
