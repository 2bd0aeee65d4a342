//! Token service tests
//!
//! Registration, single-client refresh, failure classification and the
//! deactivation policy, against in-memory mocks.
