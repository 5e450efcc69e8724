//! Identifiers for uploads and job runs.
//!
//! Format: 4-char prefix followed by a 20-char lowercase alphanumeric nanoid.
//! Ids are safe to use as file name components.

const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

const SUFFIX_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceId {
    Upload,
    Run,
}

impl ResourceId {
    pub const fn prefix(&self) -> &'static str {
        match self {
            ResourceId::Upload => "upld",
            ResourceId::Run => "jrun",
        }
    }
}

pub fn generate_id(resource: ResourceId) -> String {
    let suffix = nanoid::nanoid!(SUFFIX_LEN, &ID_ALPHABET);
    format!("{}{}", resource.prefix(), suffix)
}

/// Id of one stored upload (prefix: "upld").
pub fn generate_upload_id() -> String {
    generate_id(ResourceId::Upload)
}

/// Id correlating the spans of one pipeline run (prefix: "jrun").
pub fn generate_run_id() -> String {
    generate_id(ResourceId::Run)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        for (id, prefix) in [(generate_upload_id(), "upld"), (generate_run_id(), "jrun")] {
            assert_eq!(id.len(), 24);
            assert!(id.starts_with(prefix));
            assert!(id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(generate_upload_id(), generate_upload_id());
    }
}
