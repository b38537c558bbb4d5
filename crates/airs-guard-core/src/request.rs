use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Namespace prepended to every generated trace id.
pub const TRACE_ID_PREFIX: &str = "airs-guard-";

/// What the caller is asking the service to scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScanKind {
    Prompt,
    Response,
    /// Source code, scanned as if it were model output.
    Code,
    Conversation,
    /// Any kind label this crate does not know. Built with the prompt mapping.
    Other(String),
}

impl ScanKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Prompt => "prompt",
            Self::Response => "response",
            Self::Code => "code",
            Self::Conversation => "conversation",
            Self::Other(raw) => raw,
        }
    }
}

impl From<&str> for ScanKind {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prompt" => Self::Prompt,
            "response" => Self::Response,
            "code" => Self::Code,
            "conversation" => Self::Conversation,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text handed over by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPayload {
    Content(String),
    Conversation { prompt: String, response: String },
}

/// Caller intent for a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequestSpec {
    pub kind: ScanKind,
    pub profile: String,
    pub payload: ScanPayload,
}

impl ScanRequestSpec {
    pub fn content(kind: ScanKind, profile: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            profile: profile.into(),
            payload: ScanPayload::Content(content.into()),
        }
    }

    pub fn conversation(
        profile: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            kind: ScanKind::Conversation,
            profile: profile.into(),
            payload: ScanPayload::Conversation {
                prompt: prompt.into(),
                response: response.into(),
            },
        }
    }

    /// Check the caller-side invariants. Must run before [`RequestBuilder::build`],
    /// which never rejects anything.
    pub fn validate(&self) -> Result<(), InputError> {
        match (&self.kind, &self.payload) {
            (ScanKind::Conversation, ScanPayload::Conversation { prompt, response }) => {
                if prompt.is_empty() || response.is_empty() {
                    return Err(InputError::IncompleteConversation);
                }
            }
            (ScanKind::Conversation, ScanPayload::Content(_)) => {
                return Err(InputError::IncompleteConversation);
            }
            (kind, ScanPayload::Content(content)) => {
                if content.is_empty() {
                    return Err(InputError::MissingContent {
                        kind: kind.to_string(),
                    });
                }
            }
            (kind, ScanPayload::Conversation { .. }) => {
                return Err(InputError::MissingContent {
                    kind: kind.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Problems with what the caller supplied, caught before a request is built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("scan type `{kind}` requires non-empty content (--content or --file)")]
    MissingContent { kind: String },
    #[error("conversation scans require both a prompt and a response")]
    IncompleteConversation,
    #[error("failed to read input file {path}: {reason}")]
    UnreadableFile { path: String, reason: String },
}

/// Informational fields forwarded to the service with each request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// One unit of text to scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentUnit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct AiProfile {
    profile_name: String,
}

/// Wire-ready scan request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRequest {
    tr_id: String,
    ai_profile: AiProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<ScanMetadata>,
    contents: Vec<ContentUnit>,
}

impl ScanRequest {
    pub fn trace_id(&self) -> &str {
        &self.tr_id
    }

    pub fn profile_name(&self) -> &str {
        &self.ai_profile.profile_name
    }

    pub fn metadata(&self) -> Option<&ScanMetadata> {
        self.metadata.as_ref()
    }

    pub fn contents(&self) -> &[ContentUnit] {
        &self.contents
    }
}

/// Maps a [`ScanRequestSpec`] onto the service's request document.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    metadata: Option<ScanMetadata>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach metadata to every request. `source` is overwritten with the scan kind.
    pub fn with_metadata(mut self, metadata: ScanMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn build(&self, spec: &ScanRequestSpec) -> ScanRequest {
        self.build_with_trace_id(spec, generate_trace_id())
    }

    pub fn build_with_trace_id(
        &self,
        spec: &ScanRequestSpec,
        trace_id: impl Into<String>,
    ) -> ScanRequest {
        let metadata = self.metadata.clone().map(|metadata| ScanMetadata {
            source: Some(spec.kind.to_string()),
            ..metadata
        });
        ScanRequest {
            tr_id: trace_id.into(),
            ai_profile: AiProfile {
                profile_name: spec.profile.clone(),
            },
            metadata,
            contents: vec![content_unit(&spec.kind, &spec.payload)],
        }
    }
}

fn content_unit(kind: &ScanKind, payload: &ScanPayload) -> ContentUnit {
    match kind {
        ScanKind::Conversation => {
            let (prompt, response) = match payload {
                ScanPayload::Conversation { prompt, response } => {
                    (prompt.clone(), response.clone())
                }
                ScanPayload::Content(content) => (content.clone(), String::new()),
            };
            ContentUnit {
                prompt: Some(prompt),
                response: Some(response),
            }
        }
        ScanKind::Response | ScanKind::Code => {
            let response = match payload {
                ScanPayload::Content(content) => content,
                ScanPayload::Conversation { response, .. } => response,
            };
            ContentUnit {
                prompt: None,
                response: Some(response.clone()),
            }
        }
        ScanKind::Prompt | ScanKind::Other(_) => {
            let prompt = match payload {
                ScanPayload::Content(content) => content,
                ScanPayload::Conversation { prompt, .. } => prompt,
            };
            ContentUnit {
                prompt: Some(prompt.clone()),
                response: None,
            }
        }
    }
}

/// Random hex trace id in the crate's namespace.
pub fn generate_trace_id() -> String {
    format!("{TRACE_ID_PREFIX}{}", Uuid::new_v4().simple())
}
