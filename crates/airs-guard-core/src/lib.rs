pub mod gateway;
pub mod normalize;
pub mod policy;
pub mod report;
pub mod request;
pub mod settings;
pub mod transport;

pub use gateway::{Gateway, GatewayReport};
pub use normalize::{
    normalize, normalize_reply, ErrorKind, ErrorOutcome, Location, Normalized, OverallSeverity,
    ScanAction, ScanResult, ScanStatus, Severity, ThreatCategory, ThreatFinding,
};
pub use policy::{resolve, PolicyOutcome, EXIT_BLOCKED, EXIT_ERROR, EXIT_OK};
pub use report::{render_report, OutputFormat};
pub use request::{
    ContentUnit, InputError, RequestBuilder, ScanKind, ScanMetadata, ScanPayload, ScanRequest,
    ScanRequestSpec,
};
pub use settings::{AirsSettings, ConfigurationError, SettingsLayer, DEFAULT_ENDPOINT};
pub use transport::{Failure, HttpTransport, RawReply, ScanTransport};
