//! JSON response of the execution engine.
//!
//! ```json
//! {"success": true, "steps": [...], "nnModels": [...], "recursiveFuncs": ["fact"]}
//! {"success": false, "error": "ZeroDivisionError: division by zero", "traceback": "..."}
//! ```
//!
//! Both camelCase and snake_case spellings of the optional fields are
//! accepted.

use serde::Deserialize;

use crate::engine::{RunError, RunOutput};
use crate::event::ExecutionLog;
use crate::network::NeuralNetworkDescriptor;

#[derive(Debug, Clone, Deserialize)]
pub struct RunResponse {
    pub success: bool,
    #[serde(default)]
    pub steps: Option<ExecutionLog>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
    #[serde(default, rename = "nnModels", alias = "nn_models")]
    pub nn_models: Option<Vec<NeuralNetworkDescriptor>>,
    #[serde(default, rename = "recursiveFuncs", alias = "recursive_funcs")]
    pub recursive_funcs: Option<Vec<String>>,
}

impl RunResponse {
    pub fn from_json(text: &str) -> Result<Self, RunError> {
        serde_json::from_str(text).map_err(|error| RunError::Protocol(error.to_string()))
    }

    pub fn into_result(self) -> Result<RunOutput, RunError> {
        if !self.success {
            return Err(RunError::Execution {
                message: self.error.unwrap_or_else(|| "execution failed".to_owned()),
                traceback: self.traceback,
            });
        }
        let log = self
            .steps
            .ok_or_else(|| RunError::Protocol("successful response without steps".to_owned()))?;
        Ok(RunOutput {
            log,
            nn_models: self.nn_models.unwrap_or_default(),
            recursive_funcs: self.recursive_funcs,
        })
    }
}

/// Parse a complete engine response.
pub fn parse_response(text: &str) -> Result<RunOutput, RunError> {
    RunResponse::from_json(text)?.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_response() {
        let output = parse_response(
            r#"{
                "success": true,
                "steps": [{"event": "line", "lineno": 1, "locals": {"x": 1}}],
                "nnModels": [{"model_name": "m", "layers": []}],
                "recursiveFuncs": ["fact"]
            }"#,
        )
        .unwrap();
        assert_eq!(output.log.len(), 1);
        assert_eq!(output.nn_models.len(), 1);
        assert_eq!(output.recursive_funcs, Some(vec!["fact".to_owned()]));
    }

    #[test]
    fn snake_case_aliases() {
        let output = parse_response(
            r#"{"success": true, "steps": [], "nn_models": [], "recursive_funcs": []}"#,
        )
        .unwrap();
        assert!(output.log.is_empty());
        assert_eq!(output.recursive_funcs, Some(vec![]));
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let output = parse_response(r#"{"success": true, "steps": []}"#).unwrap();
        assert!(output.nn_models.is_empty());
        assert_eq!(output.recursive_funcs, None);
    }

    #[test]
    fn failure_keeps_message_verbatim() {
        let err = parse_response(
            r#"{"success": false, "error": "ZeroDivisionError: division by zero", "traceback": "Traceback ..."}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        assert_eq!(err.traceback(), Some("Traceback ..."));
    }

    #[test]
    fn malformed_responses() {
        assert!(matches!(parse_response("not json"), Err(RunError::Protocol(_))));
        assert!(matches!(
            parse_response(r#"{"success": true}"#),
            Err(RunError::Protocol(_))
        ));
        // A bad step invalidates the whole log
        assert!(matches!(
            parse_response(r#"{"success": true, "steps": [{"event": "bogus"}]}"#),
            Err(RunError::Protocol(_))
        ));
    }
}
