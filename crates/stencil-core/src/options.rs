use crate::names::DEFAULT_TEMP_PREFIX;
use serde::{Deserialize, Serialize};

/// Knobs shared by every compilation unit of a [`crate::Compiler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Prefix of deterministic temporaries (`<prefix>_<n>`).
    pub temp_prefix: String,
    pub vtl: VtlOptions,
    pub asl: AslOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
            vtl: VtlOptions::default(),
            asl: AslOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VtlOptions {
    /// Variable bound to the function's first parameter.
    pub input_variable: String,
    /// `version` stamped into resolver request documents.
    pub request_version: String,
}

impl Default for VtlOptions {
    fn default() -> Self {
        Self {
            input_variable: "context".to_string(),
            request_version: "2018-05-29".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AslOptions {
    /// Task resource prefix; the operation's method name is appended.
    pub resource_prefix: String,
}

impl Default for AslOptions {
    fn default() -> Self {
        Self {
            resource_prefix: "arn:aws:states:::aws-sdk:dynamodb:".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_options_fill_defaults() {
        let options: CompileOptions =
            serde_json::from_value(json!({"vtl": {"input_variable": "ctx"}}))
                .expect("options should parse");
        assert_eq!(options.vtl.input_variable, "ctx");
        assert_eq!(options.vtl.request_version, "2018-05-29");
        assert_eq!(options.temp_prefix, "fnl_tmp");
        assert_eq!(options.asl, AslOptions::default());
    }
}
