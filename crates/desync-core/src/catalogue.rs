use serde::Deserialize;

use crate::error::DesyncError;
use crate::model::{HeaderPair, Mutation};

/// One record of the mutation file format (spec §6): a JSON array of these.
/// Control bytes arrive as the literal `\r`, `\n`, `\t` JSON escapes — serde_json
/// already turns those into real bytes, so no post-processing happens here.
#[derive(Debug, Deserialize)]
struct MutationEntry {
    description: String,
    header_name: String,
    header_value: String,
    #[serde(default)]
    extra_headers: Vec<ExtraHeaderEntry>,
}

#[derive(Debug, Deserialize)]
struct ExtraHeaderEntry {
    header_name: String,
    header_value: String,
}

/// An ordered, read-only list of mutations consumed by every class the
/// engine runs. `default()` returns the built-in identity + obfuscated
/// variants; `from_json` loads an operator-supplied catalogue file.
#[derive(Debug, Clone)]
pub struct MutationCatalogue {
    mutations: Vec<Mutation>,
}

impl MutationCatalogue {
    pub fn from_mutations(mutations: Vec<Mutation>) -> Self {
        Self { mutations }
    }

    pub fn from_json(data: &str) -> Result<Self, DesyncError> {
        let entries: Vec<MutationEntry> = serde_json::from_str(data)
            .map_err(|e| DesyncError::Config(format!("invalid mutation catalogue: {e}")))?;

        let mutations = entries
            .into_iter()
            .map(|entry| {
                let extra_headers = entry
                    .extra_headers
                    .into_iter()
                    .map(|h| HeaderPair::new(h.header_name.into_bytes(), h.header_value.into_bytes()))
                    .collect();

                Mutation::new(entry.description, entry.header_name, entry.header_value)
                    .with_extra_headers(extra_headers)
            })
            .collect();

        Ok(Self { mutations })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

impl Default for MutationCatalogue {
    fn default() -> Self {
        Self::from_mutations(vec![
            Mutation::new("Standard chunked encoding", "Transfer-Encoding", "chunked"),
            Mutation::new("Space after header name", "Transfer-Encoding ", "chunked"),
        ])
    }
}

impl FromIterator<Mutation> for MutationCatalogue {
    fn from_iter<T: IntoIterator<Item = Mutation>>(iter: T) -> Self {
        Self::from_mutations(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalogue_has_two_builtins() {
        let cat = MutationCatalogue::default();
        assert_eq!(cat.len(), 2);
        assert_eq!(cat.iter().next().unwrap().header_value, b"chunked");
    }

    #[test]
    fn from_json_decodes_control_bytes_and_extra_headers() {
        let json = r#"[
            { "description": "CRLF in value",
              "header_name": "Transfer-Encoding",
              "header_value": "chunked\r\nX-Foo: bar",
              "extra_headers": [
                { "header_name": "X-Extra", "header_value": "1" }
              ]
            }
        ]"#;
        let cat = MutationCatalogue::from_json(json).unwrap();
        assert_eq!(cat.len(), 1);
        let m = cat.iter().next().unwrap();
        assert_eq!(m.header_value, b"chunked\r\nX-Foo: bar");
        assert_eq!(m.extra_headers.len(), 1);
        assert_eq!(m.extra_headers[0].name, b"X-Extra");
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        assert!(MutationCatalogue::from_json("not json").is_err());
    }
}
