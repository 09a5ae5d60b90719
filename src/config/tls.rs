use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Source of the certificate served by the metrics endpoint. We
/// differentiate them via a "type" tag in the YAML.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(tag = "type")]
pub enum TlsConfig {
    /// PEM certificate chain and private key read from disk.
    #[serde(rename = "files")]
    Files { cert_path: PathBuf, key_path: PathBuf },
    /// An ephemeral self-signed pair generated at startup.
    #[serde(rename = "self-signed")]
    SelfSigned {
        #[serde(default = "default_subject_alt_names")]
        subject_alt_names: Vec<String>,
    },
}

fn default_subject_alt_names() -> Vec<String> {
    vec!["localhost".to_string()]
}
