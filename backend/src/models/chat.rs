//! Request and response bodies of the chat API.

use serde::{Deserialize, Serialize};

pub use model_gateway_common::{QuestionParameters, StopSequences};

/// Body of `POST /v1/chat`. Sampling parameters sit beside the question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub model_name: String,
    #[serde(flatten)]
    pub parameters: QuestionParameters,
}

/// Body of `/v1/chat/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub data: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_request_with_parameters() {
        let req: AskRequest = serde_json::from_str(
            r#"{"question": "Hi", "model_name": "m1", "temperature": 0.2, "stop": ["a", "b"]}"#,
        )
        .unwrap();
        assert_eq!(req.question, "Hi");
        assert_eq!(req.model_name, "m1");
        assert_eq!(req.parameters.temperature, Some(0.2));
        assert!(matches!(req.parameters.stop, Some(StopSequences::Many(ref s)) if s.len() == 2));
        assert!(req.parameters.top_p.is_none());
    }

    #[test]
    fn test_question_and_model_name_are_required() {
        let err = serde_json::from_str::<AskRequest>(r#"{"model_name": "m1"}"#).unwrap_err();
        assert!(err.to_string().contains("question"), "{err}");

        let err = serde_json::from_str::<AskRequest>(r#"{"question": "Hi"}"#).unwrap_err();
        assert!(err.to_string().contains("model_name"), "{err}");
    }
}
