#![doc = include_str!("../README.md")]

mod consolidate;
mod equality;
mod error;
mod json;
mod late;
mod partition;
mod query;
mod refs;
mod types;
mod upgrade;

pub mod v1 {
    //! Versioned public API.
    //!
    //! # Documents
    //!
    //! - [`SarifLog`] — the root: version, schema, runs
    //! - [`Run`] — results plus the tables they index into
    //! - [`SarifResult`] — a single finding
    //!
    //! Everything else in [`types`] is the tree beneath them. Each struct
    //! keeps unmodelled properties in an `extra` map.
    //!
    //! # Engines
    //!
    //! - [`upgrade`] — prerelease logs to 2.1.0, on the raw JSON tree
    //! - [`consolidate`] — trim and deduplicate a run in place
    //! - [`partition`] — filter or split a log, compacting run tables
    //! - [`query`] — table lookups and reference checks
    //!
    //! [`json`] and [`equality`] are the building blocks the engines share.

    /// The typed SARIF model.
    pub mod types {
        pub use crate::types::*;
    }

    /// Editing helpers for generic JSON trees.
    pub mod json {
        pub use crate::json::{ObjectExt, for_each_object, objects_in};
    }

    /// Structural identity of nodes, for deduplication.
    pub mod equality {
        pub use crate::equality::{Deduplicated, NodeKey, ValueKeyed};
    }

    /// Version transform from prerelease schema revisions.
    ///
    /// # Example
    ///
    /// ```
    /// use sarifkit::v1::upgrade::{upgrade, Formatting};
    ///
    /// let old = r#"{"version":"2.0.0","runs":[{"invocations":[{"workingDirectory":"/home/x"}]}]}"#;
    /// let upgraded = upgrade(old, false, Formatting::Compact).unwrap();
    /// assert!(upgraded.text.contains(r#""workingDirectory":{"uri":"/home/x"}"#));
    /// ```
    pub mod upgrade {
        pub use crate::upgrade::{
            CHECKPOINT_VERSIONS, Formatting, NO_MESSAGE_PROVIDED, PatchPlan, Upgraded, upgrade,
            upgrade_to_log, upgrade_value,
        };
        pub use crate::late::Round;
    }

    /// Consolidation and trimming of runs.
    pub mod consolidate {
        pub use crate::consolidate::{
            ConsolidationStats, Consolidator, RegionComponents, TrimPolicy, consolidate_log,
            consolidate_run,
        };
    }

    /// Filtering and partitioning with table compaction.
    pub mod partition {
        pub use crate::partition::{filter, partition, partition_owned};
    }

    /// Table lookups and reference checks.
    pub mod query {
        pub use crate::query::{
            artifact_ancestors, check_references, check_run, logical_location_ancestors,
            referenced_rule_ids, resolve_uri_base_id, results_by_rule, rule_position,
        };
    }

    pub use crate::consolidate::{ConsolidationStats, Consolidator, TrimPolicy};
    pub use crate::error::{Error, Result};
    pub use crate::types::{
        Artifact, ArtifactLocation, CURRENT_SCHEMA_URI, CURRENT_VERSION, Location,
        LogicalLocation, Message, Region, Run, SarifLog, SarifResult,
    };
    pub use crate::upgrade::{Formatting, Upgraded};
}
