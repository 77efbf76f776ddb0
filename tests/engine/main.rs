//! Integration tests for Layer 1: Engine
//!
//! Tests for the match network, truth maintenance, the agenda, and match
//! completeness against brute-force evaluation.

mod agenda;
mod network;
mod truth_maintenance;
