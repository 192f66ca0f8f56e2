//! Scenario tests for the boot pipeline

mod helpers;

mod build_group;
mod failure_handling;
mod heartbeat;
mod routing;
mod shutdown;
mod step_order;
