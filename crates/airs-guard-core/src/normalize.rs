use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::transport::{Failure, RawReply};

/// Detector keys with a fixed category and severity, in emission order.
const RECOGNIZED_KEYS: [&str; 3] = ["injection", "dlp", "url_cats"];

/// Severity of a single finding. Ordered `unknown < low < medium < high < critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

/// Highest severity across a result's findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallSeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl OverallSeverity {
    /// Findings of unknown severity still count as a detection and report `low`.
    pub fn from_findings(findings: &[ThreatFinding]) -> Self {
        match findings.iter().map(|finding| finding.severity).max() {
            None => Self::None,
            Some(Severity::Critical) => Self::Critical,
            Some(Severity::High) => Self::High,
            Some(Severity::Medium) => Self::Medium,
            Some(Severity::Low | Severity::Unknown) => Self::Low,
        }
    }
}

/// Which side of the exchange a finding was reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Prompt,
    Response,
}

impl Location {
    fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Response => "response",
        }
    }

    fn detection_field(self) -> &'static str {
        match self {
            Self::Prompt => "prompt_detected",
            Self::Response => "response_detected",
        }
    }

    fn masked_field(self) -> &'static str {
        match self {
            Self::Prompt => "prompt_masked_data",
            Self::Response => "response_masked_data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThreatCategory {
    PromptInjection,
    /// Sensitive-data exposure.
    Dlp,
    MaliciousUrl,
    /// Provider detector this crate has no mapping for, kept as the raw key.
    Other(String),
}

impl ThreatCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::PromptInjection => "prompt_injection",
            Self::Dlp => "dlp",
            Self::MaliciousUrl => "malicious_url",
            Self::Other(raw) => raw,
        }
    }

    /// Map a detector key onto its category and fixed severity.
    pub fn from_detector(key: &str) -> (Self, Severity) {
        match key {
            "injection" => (Self::PromptInjection, Severity::High),
            "dlp" => (Self::Dlp, Severity::High),
            "url_cats" => (Self::MaliciousUrl, Severity::Medium),
            other => (Self::Other(other.to_string()), Severity::Unknown),
        }
    }

    fn describe(&self, location: Location) -> String {
        match (self, location) {
            (Self::PromptInjection, Location::Prompt) => {
                "Potential prompt injection attack detected".into()
            }
            (Self::PromptInjection, Location::Response) => {
                "Potential prompt injection detected in response".into()
            }
            (Self::Dlp, location) => format!(
                "Sensitive data detected in {} (PII, credentials, or secrets)",
                location.as_str()
            ),
            (Self::MaliciousUrl, location) => format!(
                "Potentially malicious or suspicious URL detected in {}",
                location.as_str()
            ),
            (Self::Other(key), location) => {
                format!("Provider reported detection `{key}` in {}", location.as_str())
            }
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ThreatCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One detected threat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreatFinding {
    pub category: ThreatCategory,
    pub severity: Severity,
    pub location: Location,
    pub description: String,
}

impl ThreatFinding {
    pub fn new(category: ThreatCategory, severity: Severity, location: Location) -> Self {
        let description = category.describe(location);
        Self {
            category,
            severity,
            location,
            description,
        }
    }
}

/// Action advised by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanAction {
    Allow,
    Alert,
    Block,
}

impl ScanAction {
    /// Case-insensitive parse of the provider's action label.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "alert" => Some(Self::Alert),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Safe,
    ThreatDetected,
    Blocked,
    Error,
}

impl ScanStatus {
    /// Status of a completed scan. Detections under `allow` still report
    /// `threat_detected` while the action stays `allow`.
    pub fn derive(action: ScanAction, has_findings: bool) -> Self {
        match action {
            ScanAction::Block => Self::Blocked,
            ScanAction::Alert => Self::ThreatDetected,
            ScanAction::Allow if has_findings => Self::ThreatDetected,
            ScanAction::Allow => Self::Safe,
        }
    }
}

/// Normalized verdict of a completed scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub status: ScanStatus,
    pub action: ScanAction,
    pub category: String,
    pub scan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub findings: Vec<ThreatFinding>,
    pub overall_severity: OverallSeverity,
    /// Redacted prompt text, returned when the profile masks sensitive data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_response: Option<String>,
}

/// Origin of an [`ErrorOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing credential or profile, unusable settings.
    Configuration,
    /// Caller supplied nothing scannable.
    Input,
    /// Unusable endpoint, detected before any network attempt.
    Config,
    Http,
    Network,
    Protocol,
    /// The service answered but reported an error itself.
    Provider,
}

/// Fail-closed artifact for any scan that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorOutcome {
    status: ScanStatus,
    action: ScanAction,
    kind: ErrorKind,
    #[serde(rename = "error")]
    message: String,
}

impl ErrorOutcome {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: ScanStatus::Error,
            action: ScanAction::Block,
            kind,
            message: message.into(),
        }
    }

    pub fn status(&self) -> ScanStatus {
        self.status
    }

    pub fn action(&self) -> ScanAction {
        self.action
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&Failure> for ErrorOutcome {
    fn from(failure: &Failure) -> Self {
        Self::new(failure.kind(), failure.to_string())
    }
}

/// Output of the normalizer: a verdict or a fail-closed error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Normalized {
    Scan(ScanResult),
    Error(ErrorOutcome),
}

impl Normalized {
    pub fn status(&self) -> ScanStatus {
        match self {
            Self::Scan(result) => result.status,
            Self::Error(outcome) => outcome.status(),
        }
    }

    pub fn action(&self) -> ScanAction {
        match self {
            Self::Scan(result) => result.action,
            Self::Error(outcome) => outcome.action(),
        }
    }
}

/// Turn the outcome of an exchange into a verdict. Failures never reach the
/// reply parsing and always come out as a blocking error.
pub fn normalize(reply: Result<RawReply, Failure>) -> Normalized {
    match reply {
        Ok(reply) => normalize_reply(&reply),
        Err(failure) => Normalized::Error(ErrorOutcome::from(&failure)),
    }
}

/// Normalize a reply the service delivered. Total over any JSON object.
pub fn normalize_reply(reply: &RawReply) -> Normalized {
    let top = reply.fields();
    // Some deployments wrap the verdict in a `result` envelope.
    let verdict = top.get("result").and_then(Value::as_object).unwrap_or(top);

    let action = parse_action(verdict.get("action"));
    if let Some(error) = top.get("error").filter(|value| is_truthy(value)) {
        if action != ScanAction::Block {
            let message = match error {
                Value::String(message) => message.clone(),
                other => other.to_string(),
            };
            warn!(error = %message, "scan service reported an error");
            return Normalized::Error(ErrorOutcome::new(ErrorKind::Provider, message));
        }
    }

    let mut findings = detections(verdict, Location::Prompt);
    findings.extend(detections(verdict, Location::Response));

    let result = ScanResult {
        status: ScanStatus::derive(action, !findings.is_empty()),
        action,
        category: text_field(verdict, "category").unwrap_or_else(|| "unknown".into()),
        scan_id: id_field(top, verdict, "scan_id").unwrap_or_else(|| "unknown".into()),
        request_id: id_field(top, verdict, "req_id"),
        report_id: id_field(top, verdict, "report_id"),
        profile: text_field(verdict, "profile_name"),
        overall_severity: OverallSeverity::from_findings(&findings),
        findings,
        masked_prompt: masked_data(top, verdict, Location::Prompt),
        masked_response: masked_data(top, verdict, Location::Response),
    };
    debug!(
        scan_id = %result.scan_id,
        action = ?result.action,
        findings = result.findings.len(),
        "normalized scan reply"
    );
    Normalized::Scan(result)
}

fn parse_action(value: Option<&Value>) -> ScanAction {
    match value {
        None | Some(Value::Null) => ScanAction::Allow,
        Some(Value::String(raw)) => ScanAction::parse(raw).unwrap_or_else(|| {
            warn!(action = %raw, "unrecognized action in scan reply, treating as block");
            ScanAction::Block
        }),
        Some(other) => {
            warn!(action = %other, "non-string action in scan reply, treating as block");
            ScanAction::Block
        }
    }
}

fn detections(verdict: &Map<String, Value>, location: Location) -> Vec<ThreatFinding> {
    let Some(detected) = verdict
        .get(location.detection_field())
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    let mut findings: Vec<ThreatFinding> = RECOGNIZED_KEYS
        .iter()
        .filter(|key| detected.get(**key).is_some_and(is_truthy))
        .map(|key| {
            let (category, severity) = ThreatCategory::from_detector(key);
            ThreatFinding::new(category, severity, location)
        })
        .collect();

    let mut unrecognized: Vec<&String> = detected
        .iter()
        .filter(|(key, value)| !RECOGNIZED_KEYS.contains(&key.as_str()) && is_truthy(value))
        .map(|(key, _)| key)
        .collect();
    unrecognized.sort();
    for key in unrecognized {
        debug!(
            detector = %key,
            location = location.as_str(),
            "passing through unrecognized detector"
        );
        let (category, severity) = ThreatCategory::from_detector(key);
        findings.push(ThreatFinding::new(category, severity, location));
    }
    findings
}

/// Redacted text is either `{"data": "..."}` or a bare string.
fn masked_data(
    top: &Map<String, Value>,
    verdict: &Map<String, Value>,
    location: Location,
) -> Option<String> {
    let entry = verdict
        .get(location.masked_field())
        .or_else(|| top.get(location.masked_field()))?;
    let text = match entry {
        Value::String(text) => text,
        Value::Object(masked) => masked.get("data")?.as_str()?,
        _ => return None,
    };
    (!text.is_empty()).then(|| text.to_string())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map_or(true, |n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn id_field(top: &Map<String, Value>, verdict: &Map<String, Value>, key: &str) -> Option<String> {
    text_field(top, key).or_else(|| text_field(verdict, key))
}
