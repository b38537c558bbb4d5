use tracing::{debug, info, warn};

use crate::normalize::{normalize, ErrorOutcome, Normalized};
use crate::policy::{resolve, PolicyOutcome};
use crate::request::{RequestBuilder, ScanRequestSpec};
use crate::settings::AirsSettings;
use crate::transport::{Failure, HttpTransport, RawReply, ScanTransport};

/// Everything a caller needs to report one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReport {
    /// `None` when the scan was rejected before a request was built.
    pub trace_id: Option<String>,
    pub outcome: Normalized,
    pub policy: PolicyOutcome,
    /// Provider reply as received, when the exchange succeeded.
    pub raw: Option<RawReply>,
}

impl GatewayReport {
    /// Report for a scan that never reached the service.
    pub fn rejected(outcome: ErrorOutcome) -> Self {
        let outcome = Normalized::Error(outcome);
        Self {
            trace_id: None,
            policy: resolve(&outcome),
            outcome,
            raw: None,
        }
    }

    pub fn failed(failure: &Failure) -> Self {
        Self::rejected(ErrorOutcome::from(failure))
    }

    pub fn exit_code(&self) -> i32 {
        self.policy.exit_code
    }
}

/// Runs build → send → normalize → resolve for each scan.
pub struct Gateway {
    builder: RequestBuilder,
    transport: Box<dyn ScanTransport>,
}

impl Gateway {
    pub fn new(builder: RequestBuilder, transport: Box<dyn ScanTransport>) -> Self {
        Self { builder, transport }
    }

    /// HTTP gateway for the configured endpoint. Fails only on an unusable endpoint.
    pub fn from_settings(settings: &AirsSettings) -> Result<Self, Failure> {
        let transport =
            HttpTransport::new(&settings.endpoint, &settings.api_key, settings.timeout)?;
        let builder = RequestBuilder::new().with_metadata(settings.metadata());
        Ok(Self::new(builder, Box::new(transport)))
    }

    /// Scan once. Always terminates with a determinate outcome.
    pub async fn scan(&self, spec: &ScanRequestSpec) -> GatewayReport {
        let request = self.builder.build(spec);
        let trace_id = request.trace_id().to_string();
        debug!(
            trace_id = %trace_id,
            kind = %spec.kind,
            profile = %spec.profile,
            "built scan request"
        );

        let reply = self.transport.send(&request).await;
        if let Err(failure) = &reply {
            warn!(trace_id = %trace_id, error = %failure, "scan exchange failed");
        }
        let raw = reply.as_ref().ok().cloned();
        let outcome = normalize(reply);
        let policy = resolve(&outcome);
        info!(
            trace_id = %trace_id,
            status = ?policy.status,
            exit_code = policy.exit_code,
            "scan complete"
        );
        GatewayReport {
            trace_id: Some(trace_id),
            outcome,
            policy,
            raw,
        }
    }
}
