//! `grove-memory` – The Memory Stores.
//!
//! Synchronous, in-memory storage for a personal-growth assistant's recall.
//! Every store takes `&mut self` for operations with side effects; the async
//! facade in `grove-runtime` owns the locking.
//!
//! # Modules
//!
//! - [`episodic`] – [`EpisodicStore`][episodic::EpisodicStore]: timestamped
//!   personal experiences with secondary indices, a filter pipeline and a
//!   strength lifecycle driven by access and age.
//! - [`semantic`] – [`SemanticStore`][semantic::SemanticStore]: de-duplicated
//!   concepts with symmetric relations, reinforcement on read, merging.
//! - [`graph`] – [`EntityGraph`][graph::EntityGraph]: named entities with
//!   alias resolution and typed, directed relations.
//! - [`retrieval`] – [`Retriever`][retrieval::Retriever]: natural-language
//!   and structured queries composed over both stores.
//! - [`shard`] – [`UserMemory`][shard::UserMemory]: one user's pair of stores.

pub mod episodic;
pub mod graph;
pub mod retrieval;
pub mod semantic;
pub mod shard;

pub use episodic::{EpisodeUpdate, EpisodicStore, MaintenanceReport, NewEpisode};
pub use graph::{EntityGraph, EntityRelations, NewEntity, NewRelation};
pub use retrieval::{EntityMemories, NaturalQueryResult, Retriever, TaskPatterns};
pub use semantic::{ConceptUpdate, NewConcept, SemanticStore};
pub use shard::UserMemory;
