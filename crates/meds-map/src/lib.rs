//! Raw code to canonical code mapping.
//!
//! # Features
//!
//! - **Lookup tables**: codelists, dictionary, SNOMED to ICD-10 and product lists,
//!   loaded once and immutable for a pass
//! - **Tiered resolution**: fixed precedence, first hit wins
//! - **Terminal strategies**: read-code fallback or the SNOMED chain, chosen once
//! - **Unmapped policy**: drop or tag with `MEDICAL//NULL//{raw}`
//! - **Coverage report**: distinct raw codes per resolving tier
//!
//! # Example
//!
//! ```ignore
//! use meds_map::{CodeMapper, LookupTables};
//! use meds_model::MappingOptions;
//!
//! let tables = LookupTables::new().with_codelists(&codelists);
//! let mapper = CodeMapper::new(tables, MappingOptions::default());
//! let (tier, mapped) = mapper.map_event(&raw_event);
//! ```

mod coverage;
mod engine;
mod strategy;
mod tables;

pub use coverage::{CodeInventory, CoverageReport, CoverageRow};
pub use engine::{CodeMapper, MappingTier, Resolution, TierCounts};
pub use strategy::{
    EXCLUDED_READ_PREFIXES, READ_CODE_SUFFIX, ReadCodeFallback, SnomedFallback, TerminalStrategy,
    terminal_strategy,
};
pub use tables::{LAB_TERMS, LookupTables, TableSizes, term_category};
