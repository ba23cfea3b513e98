//! Integration Tests Module
//!
//! End-to-end coverage of the orchestrator against an in-memory testing
//! service: scan coordination, execution monitoring, scenario composition
//! and complete workflows through the phase controller.

// In-memory service fakes and fixtures
mod support;

// Scan push/poll coordination and single plan generation
mod scan_workflow_test;


// Plan and prompt document composition
mod composer_test;

// Full workflows through the phase controller
mod end_to_end_test;
