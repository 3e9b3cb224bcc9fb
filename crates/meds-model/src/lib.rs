pub mod cleaning;
pub mod code;
pub mod error;
pub mod event;
pub mod options;
pub mod subject;

pub use cleaning::{CleaningRule, CleaningRules};
pub use code::{
    BIRTH_CODE, CODE_SEPARATOR, Category, NULL_TERM, canonical_code, code_term, diagnosis_code,
    drug_group, episode_end_code, episode_start_code, short_code,
};
pub use error::{ModelError, Result};
pub use event::{MappedEvent, RawEvent, StreamEvent, Vocabulary, midnight};
pub use options::{MappingOptions, TerminalMode, UnmappedPolicy};
pub use subject::{Split, Subject, SubjectTable};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_serializes_with_lowercase_split() {
        let subject = Subject::case(
            42,
            1961,
            chrono::NaiveDate::from_ymd_opt(2020, 6, 15).expect("valid date"),
            Split::Val,
        );
        let json = serde_json::to_string(&subject).expect("serialize subject");
        assert!(json.contains("\"split\":\"val\""));
        let round: Subject = serde_json::from_str(&json).expect("deserialize subject");
        assert_eq!(round, subject);
    }

    #[test]
    fn mapping_options_deserialize_from_names() {
        let options: MappingOptions =
            serde_json::from_str(r#"{"unmapped":"tag","terminal":"snomed_icd10"}"#)
                .expect("deserialize options");
        assert_eq!(options.unmapped, UnmappedPolicy::Tag);
        assert_eq!(options.terminal, TerminalMode::SnomedIcd10);
    }
}
