//! # facesort
//!
//! Face reassignment for a face-clustering gallery.
//!
//! A clustering engine groups detected faces into persons; facesort is where
//! an operator corrects it. Faces can be moved to another person, split off
//! into a new person, or deleted. Whatever the operation, a person left with
//! no faces is removed in the same transaction, so no reader ever sees an
//! empty person.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐   ┌───────────┐   ┌──────────────┐
//! │   CLI    │──▶│ MoveController │──▶│ ApiClient │──▶│ HTTP server  │
//! │(facesort)│   │ (reconcile)    │   │ (reqwest) │   │   (axum)     │
//! └──────────┘   └────────────────┘   └───────────┘   └──────┬───────┘
//!                                                            ▼
//!                                                     ┌────────────┐
//!                                                     │ Reassigner │
//!                                                     └─────┬──────┘
//!                                            ┌──────────────┴─────────┐
//!                                            ▼                        ▼
//!                                     ┌─────────────┐         ┌──────────────┐
//!                                     │ SqliteStore │         │InMemoryStore │
//!                                     └─────────────┘         └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! facesort init                          # create database
//! facesort import detections.json        # load clustering output
//! facesort serve                         # start HTTP server
//! facesort move <face-id> --from <person-id> --to <person-id>
//! facesort move <face-id> --from <person-id> --new --name "Alice"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Store error type |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`store`] | Person/face store trait and backends |
//! | [`naming`] | Placeholder names for new persons |
//! | [`import`] | Loading clustering output |
//! | [`reassign`] | Move/delete service |
//! | [`stats`] | Gallery statistics |
//! | [`api`] | HTTP wire types |
//! | [`server`] | HTTP server |
//! | [`client`] | HTTP client |
//! | [`controller`] | Operator-side reconciliation |
//! | [`commands`] | CLI commands against a running server |

pub mod api;
pub mod client;
pub mod commands;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod import;
pub mod migrate;
pub mod models;
pub mod naming;
pub mod reassign;
pub mod server;
pub mod stats;
pub mod store;
