pub mod config;
pub mod directive;
pub mod error;
pub mod hash;
pub mod node;
pub mod normalize;
pub mod path;
pub mod result;
pub mod schema;
pub mod snapshot;
pub mod sort_key;

pub use config::{
    ConsolidationConfig, ExtractorConfig, NormalizerConfig, PARSER_ID, ParserConfig,
    PipelineConfig,
};
pub use directive::{AmendmentDirective, Confidence, DirectiveKind, WordSubstitution};
pub use error::CoreError;
pub use node::{NodeType, ProvisionNode};
pub use normalize::{ContentClass, NormalizedText, extract_blocks, normalize};
pub use path::{Level, ROOT_PATH, build_path, compare_paths, parent_path};
pub use result::{
    Coverage, DocumentMetadata, InstrumentKind, ParseResult, ParseStatus, ParserIdentity,
    UnparsedSegment, Warning, WarningCode,
};
pub use snapshot::{
    ChangeKind, ComputationStatus, ConsolidatedSnapshot, ProvenanceSpan, SnapshotWindow,
    Tombstone, VersionPlan,
};
pub use sort_key::normalize_provision;
