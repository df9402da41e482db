// SPDX-License-Identifier: MIT

//! The approval workflow engine: state, routing, and the capability nodes.

pub mod audit;
pub mod gateway;
pub mod nodes;
pub mod record;
pub mod resolver;
pub mod router;
pub mod steps;
pub mod store;
