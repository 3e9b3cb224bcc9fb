//! Raw clinical source ingestion.
//!
//! This crate reads everything the pipeline consumes from disk before any
//! transformation happens.
//!
//! # Features
//!
//! - **Subject table**: the upstream cohort with case flags and split assignment
//! - **Source discovery**: observation and drug-issue extracts in file-name order
//! - **Schema detection**: per-file capability probe over the header row
//! - **Streaming reader**: raw rows as [`meds_model::RawEvent`]s, one record at a time
//! - **Lookup tables**: codelists, product codelist, medical dictionary, SNOMED to ICD-10 map
//! - **Cleaning rules**: curated unit conversions and valid ranges
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use meds_ingest::{discover_sources, load_subject_table};
//!
//! let subjects = load_subject_table(Path::new("subject_information.csv"))?;
//! let inventory = discover_sources(Path::new("observations"), None)?;
//! for source in &inventory.sources {
//!     for event in source.open()? {
//!         let event = event?;
//!         if subjects.contains(event.subject_id) {
//!             // ...
//!         }
//!     }
//! }
//! ```

mod discovery;
mod error;
mod lookups;
mod rules;
mod schema;
mod source;
mod subjects;
mod table;

// === Error Types ===
pub use error::{IngestError, Result};

// === Delimited Text ===
pub use table::{DelimitedReader, delimiter_for, get_optional, read_csv_rows, read_headers};

// === Source Discovery ===
pub use discovery::{DRUG_ISSUE_MARKER, drug_issue_files, list_files, observation_files};
pub use schema::{
    PATIENT_ID_COLUMNS, SchemaProbe, SourceKind, SourceSchema, detect_schema, probe_schema,
};
pub use source::{RawEventReader, RawSource, SourceInventory, discover_sources};

// === Subjects ===
pub use subjects::load_subject_table;

// === Lookup Tables ===
pub use lookups::{
    CodelistEntry, Codelists, DictionaryEntry, Icd10Target, expand_codes, load_codelists,
    load_medical_dictionary, load_product_codelist, load_snomed_icd10_map,
};

// === Cleaning Rules ===
pub use rules::{MEDICAL_TERM_IDENTIFIER, load_cleaning_rules};
